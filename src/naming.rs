//! `output_<N><ext>` file naming.
//!
//! The next index is one past the largest trailing number found among the
//! directory's files with the same extension, or 0 when there are none.
//! [`NumberedFiles::create_next`] claims the name with create-new semantics
//! so two runs sharing a directory never write to the same file.

use std::{
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::Result;

pub const DEFAULT_PREFIX: &str = "output_";

/// Gives up after this many consecutive name collisions.
const MAX_CLAIM_ATTEMPTS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedFiles {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl NumberedFiles {
    /// `extension` includes the leading dot, e.g. `".xlsx"`.
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            extension: extension.into(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: u64) -> PathBuf {
        self.dir
            .join(format!("{}{index}{}", self.prefix, self.extension))
    }

    /// Scans the directory for the next free index.
    pub fn next_index(&self) -> Result<u64> {
        let mut highest = None;
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(number) = name.to_str().and_then(|name| self.number_of(name)) else {
                continue;
            };
            highest = highest.max(Some(number));
        }
        Ok(highest.map_or(0, |n| n.saturating_add(1)))
    }

    pub fn next_path(&self) -> Result<PathBuf> {
        Ok(self.path_for(self.next_index()?))
    }

    /// Creates the next numbered file and returns it opened for writing.
    ///
    /// If another writer takes the scanned name first, the following
    /// index is tried instead.
    pub fn create_next(&self) -> Result<(PathBuf, File)> {
        self.claim_from(self.next_index()?)
    }

    /// Claims the next numbered file and fills it with `write`. When `write`
    /// fails the claimed file is removed, so a failed run leaves no numbered
    /// file behind.
    pub fn write_next<F>(&self, write: F) -> Result<PathBuf>
    where
        F: FnOnce(File) -> Result<()>,
    {
        let (path, file) = self.create_next()?;
        if let Err(err) = write(file) {
            if let Err(remove_err) = fs::remove_file(&path) {
                log::warn!("Failed to remove {}: {remove_err}", path.display());
            }
            return Err(err);
        }
        Ok(path)
    }

    fn claim_from(&self, mut index: u64) -> Result<(PathBuf, File)> {
        let mut attempts = 0;
        loop {
            let path = self.path_for(index);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    attempts += 1;
                    if attempts >= MAX_CLAIM_ATTEMPTS {
                        return Err(err.into());
                    }
                    log::debug!("{} was taken, trying the next index", path.display());
                    index = index.saturating_add(1);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Trailing digits of a file name's stem, if it carries our extension.
    fn number_of(&self, name: &str) -> Option<u64> {
        let stem = name.strip_suffix(self.extension.as_str())?;
        let digits_start = stem
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        stem[digits_start..].parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn empty_directory_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let files = NumberedFiles::new(dir.path(), ".xlsx");
        assert_eq!(files.next_path().unwrap(), dir.path().join("output_0.xlsx"));
    }

    #[test]
    fn continues_past_the_highest_number() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "output_0.xlsx");
        touch(dir.path(), "output_2.xlsx");
        let files = NumberedFiles::new(dir.path(), ".xlsx");
        assert_eq!(files.next_path().unwrap(), dir.path().join("output_3.xlsx"));
    }

    #[test]
    fn other_extensions_and_unnumbered_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "output_9.png");
        touch(dir.path(), "notes.xlsx");
        touch(dir.path(), "output_1.xlsx");
        let files = NumberedFiles::new(dir.path(), ".xlsx");
        assert_eq!(files.next_index().unwrap(), 2);
    }

    #[test]
    fn any_numbered_file_with_the_extension_counts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "scan_12.png");
        let files = NumberedFiles::new(dir.path(), ".png");
        assert_eq!(files.next_path().unwrap(), dir.path().join("output_13.png"));
    }

    #[test]
    fn create_next_claims_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = NumberedFiles::new(dir.path(), ".png");
        let (first, _) = files.create_next().unwrap();
        let (second, _) = files.create_next().unwrap();
        assert_eq!(first, dir.path().join("output_0.png"));
        assert_eq!(second, dir.path().join("output_1.png"));
    }

    #[test]
    fn claim_skips_names_taken_after_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let files = NumberedFiles::new(dir.path(), ".png");
        // Scanned 0, but a concurrent run wrote output_0 and output_1 since.
        touch(dir.path(), "output_0.png");
        touch(dir.path(), "output_1.png");
        let (path, _) = files.claim_from(0).unwrap();
        assert_eq!(path, dir.path().join("output_2.png"));
    }

    #[test]
    fn failed_write_removes_the_claimed_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = NumberedFiles::new(dir.path(), ".xlsx");
        let result = files.write_next(|_| {
            Err(std::io::Error::new(ErrorKind::Other, "disk full").into())
        });
        assert!(result.is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(files.next_path().unwrap(), dir.path().join("output_0.xlsx"));
    }

    #[test]
    fn write_next_keeps_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = NumberedFiles::new(dir.path(), ".txt");
        let path = files
            .write_next(|mut file| {
                use std::io::Write;
                file.write_all(b"rows")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(path, dir.path().join("output_0.txt"));
        assert_eq!(fs::read(path).unwrap(), b"rows");
    }

    #[test]
    fn only_the_trailing_number_counts() {
        // `scan2_12` numbers as 12, not as its first digit run.
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "scan2_12.png");
        let files = NumberedFiles::new(dir.path(), ".png");
        assert_eq!(files.next_path().unwrap(), dir.path().join("output_13.png"));
    }

    #[test]
    fn custom_prefix() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "page-4.png");
        let files = NumberedFiles::new(dir.path(), ".png").with_prefix("page-");
        assert_eq!(files.next_path().unwrap(), dir.path().join("page-5.png"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let files = NumberedFiles::new("/nonexistent/ocr-sheet", ".png");
        assert!(files.next_index().is_err());
    }
}

use std::path::PathBuf;

/// Extensions offered by the native picker.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Source of the image to process. `None` means nothing was chosen and the
/// run should end quietly.
pub trait ImageSelector {
    fn select(&mut self) -> Option<PathBuf>;
}

/// Yields a fixed path once.
#[derive(Debug, Clone, Default)]
pub struct PathSelector {
    path: Option<PathBuf>,
}

impl PathSelector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A selector that never yields anything, like a cancelled dialog.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl ImageSelector for PathSelector {
    fn select(&mut self) -> Option<PathBuf> {
        self.path.take()
    }
}

/// Native "open file" dialog. Blocks until the user picks a file or
/// cancels.
#[cfg(feature = "dialog")]
#[derive(Debug, Clone)]
pub struct DialogSelector {
    title: String,
}

#[cfg(feature = "dialog")]
impl DialogSelector {
    pub fn new() -> Self {
        Self {
            title: "Select an image".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

#[cfg(feature = "dialog")]
impl Default for DialogSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "dialog")]
impl ImageSelector for DialogSelector {
    fn select(&mut self) -> Option<PathBuf> {
        rfd::FileDialog::new()
            .set_title(self.title.as_str())
            .add_filter("Image files", &IMAGE_EXTENSIONS)
            .pick_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_selector_yields_once() {
        let mut selector = PathSelector::new("scan.png");
        assert_eq!(selector.select(), Some(PathBuf::from("scan.png")));
        assert_eq!(selector.select(), None);
    }

    #[test]
    fn empty_selector_yields_nothing() {
        assert_eq!(PathSelector::empty().select(), None);
    }
}

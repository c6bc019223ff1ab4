use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use image::ImageFormat;
use rust_xlsxwriter::{Format, Workbook};
use tracing::instrument;

use crate::{naming::NumberedFiles, Detection, Result};

pub const IMAGES_DIR: &str = "original_images";
pub const SHEETS_DIR: &str = "excel_files";

const COLUMNS: [&str; 5] = ["Text", "Box", "X1", "Y1", "Score"];

/// Persists the artifacts of one run: a PNG copy of the input image and a
/// spreadsheet of the recognized fragments.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    images: NumberedFiles,
    sheets: NumberedFiles,
}

impl OutputWriter {
    pub fn new(images_dir: impl Into<PathBuf>, sheets_dir: impl Into<PathBuf>) -> Self {
        Self {
            images: NumberedFiles::new(images_dir, ".png"),
            sheets: NumberedFiles::new(sheets_dir, ".xlsx"),
        }
    }

    /// `<base>/original_images` and `<base>/excel_files`.
    pub fn in_base_dir(base: &Path) -> Self {
        Self::new(base.join(IMAGES_DIR), base.join(SHEETS_DIR))
    }

    pub fn images_dir(&self) -> &Path {
        self.images.dir()
    }

    pub fn sheets_dir(&self) -> &Path {
        self.sheets.dir()
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.images.dir())?;
        fs::create_dir_all(self.sheets.dir())?;
        Ok(())
    }

    /// Re-encodes `source` as an RGB PNG under the next free name.
    #[instrument(level = "debug", skip(self))]
    pub fn save_image(&self, source: &Path) -> Result<PathBuf> {
        let image = image::open(source)?.to_rgb8();
        let path = self.images.write_next(|file| {
            let mut writer = BufWriter::new(file);
            image.write_to(&mut writer, ImageFormat::Png)?;
            writer.flush()?;
            Ok(())
        })?;
        log::info!("Saved original image to '{}'", path.display());
        Ok(path)
    }

    /// Writes one row per detection, in the order given by `order`, and
    /// returns the sheet's path with the number of data rows written.
    #[instrument(level = "debug", skip(self, detections, order), fields(rows = order.len()))]
    pub fn write_sheet(&self, detections: &[Detection], order: &[usize]) -> Result<(PathBuf, usize)> {
        let (mut workbook, rows) = build_workbook(detections, order)?;
        let path = self.sheets.write_next(|file| {
            workbook.save_to_writer(BufWriter::new(file))?;
            Ok(())
        })?;
        log::info!("Saved OCR results to '{}'", path.display());
        Ok((path, rows))
    }
}

fn build_workbook(detections: &[Detection], order: &[usize]) -> Result<(Workbook, usize)> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, name) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header)?;
    }

    let mut rows = 0;
    for detection in order.iter().filter_map(|&i| detections.get(i)) {
        rows += 1;
        let row = rows as u32;
        let lead = detection.leading_point();
        worksheet.write_string(row, 0, &detection.text)?;
        worksheet.write_string(row, 1, detection.format_box())?;
        worksheet.write_number(row, 2, lead.x as f64)?;
        worksheet.write_number(row, 3, lead.y as f64)?;
        worksheet.write_number(row, 4, detection.score as f64)?;
    }

    Ok((workbook, rows))
}

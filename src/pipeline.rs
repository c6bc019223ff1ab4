//! One run: select an image, recognize it, write the results.

use std::path::PathBuf;

use tracing::instrument;

use crate::{
    output::OutputWriter, selector::ImageSelector, LineOrdering, Result, TextRecognizer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The selector returned nothing; no output was written.
    NothingSelected,
    /// The OCR engine failed; no output was written.
    OcrFailed,
    Written {
        image: PathBuf,
        sheet: PathBuf,
        rows: usize,
    },
}

/// Runs the pipeline once.
///
/// Recognition errors are logged and end the run without output. Errors
/// while writing output are returned.
#[instrument(skip_all)]
pub fn run(
    selector: &mut dyn ImageSelector,
    recognizer: &dyn TextRecognizer,
    writer: &OutputWriter,
    ordering: &LineOrdering,
) -> Result<Outcome> {
    let Some(path) = selector.select() else {
        log::warn!("No file selected.");
        return Ok(Outcome::NothingSelected);
    };

    log::info!("Processing image: {}", path.display());

    let detections = match recognizer.recognize(&path) {
        Ok(detections) => detections,
        Err(err) => {
            log::error!("OCR failed: {err}");
            return Ok(Outcome::OcrFailed);
        }
    };
    if detections.is_empty() {
        log::warn!("No text found in {}", path.display());
    } else {
        log::info!("Recognized {} text fragments", detections.len());
    }

    let image = writer.save_image(&path)?;
    let order = ordering.order(&detections);
    let (sheet, rows) = writer.write_sheet(&detections, &order)?;

    Ok(Outcome::Written { image, sheet, rows })
}

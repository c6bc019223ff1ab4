use std::path::{Path, PathBuf};

use clap::Parser;

use crate::{
    output::OutputWriter, reading_order::DEFAULT_LINE_THRESHOLD, LineOrdering, ModelLayout,
    OcrEngineBuilder, DEFAULT_LANGUAGE,
};

/// Recognize the text in an image and save it to a spreadsheet.
///
/// Without an IMAGE argument a file picker opens.
#[derive(Debug, Clone, Parser)]
#[command(version, long_about = None)]
pub struct Settings {
    /// Image to process instead of asking with a file picker
    pub image: Option<PathBuf>,

    /// Directory holding `original_images/` and `excel_files/`
    /// [default: the executable's directory]
    #[arg(long, env = "OCR_SHEET_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Model directory [default: <base-dir>/models]
    #[arg(long, env = "OCR_SHEET_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Recognition language; selects `<model-dir>/<lang>/`
    #[arg(long, env = "OCR_SHEET_LANG", default_value = DEFAULT_LANGUAGE)]
    pub lang: String,

    /// Skip the text direction classifier
    #[arg(long, env = "OCR_SHEET_NO_ANGLE_CLS")]
    pub no_angle_cls: bool,

    /// Largest vertical step, in pixels, between fragments on one line
    #[arg(long, env = "OCR_SHEET_LINE_THRESHOLD", default_value_t = DEFAULT_LINE_THRESHOLD)]
    pub line_threshold: f32,

    /// ONNX Runtime threads per model
    #[arg(long, env = "OCR_SHEET_THREADS", default_value_t = 4)]
    pub threads: usize,

    /// Longest image side fed to the detector
    #[arg(long, env = "OCR_SHEET_MAX_SIDE_LEN", default_value_t = 1024)]
    pub max_side_len: u32,
}

impl Settings {
    /// Directory of the running executable, or the working directory if it
    /// cannot be determined.
    pub fn default_base_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(Self::default_base_dir)
    }

    pub fn model_layout(&self) -> ModelLayout {
        let root = self
            .model_dir
            .clone()
            .unwrap_or_else(|| self.base_dir().join("models"));
        ModelLayout::new(root, self.lang.as_str())
    }

    pub fn engine_builder(&self) -> OcrEngineBuilder {
        OcrEngineBuilder::new()
            .layout(&self.model_layout(), !self.no_angle_cls)
            .threads(self.threads)
            .max_side_len(self.max_side_len)
    }

    pub fn output_writer(&self) -> OutputWriter {
        OutputWriter::in_base_dir(&self.base_dir())
    }

    pub fn line_ordering(&self) -> LineOrdering {
        LineOrdering {
            line_threshold: self.line_threshold,
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while recognizing an image or writing its results.
#[derive(Debug, Error)]
pub enum Error {
    /// ONNX Runtime failed to load a model or run inference.
    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),

    #[error("model '{model}' produced no output tensor")]
    MissingOutput { model: &'static str },

    #[error("unexpected tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("failed to read character dictionary {path}")]
    Dictionary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("spreadsheet error: {0}")]
    Sheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The box and text sequences handed to the reorderer differ in length.
    #[error("got {boxes} boxes but {texts} texts")]
    LengthMismatch { boxes: usize, texts: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

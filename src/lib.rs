use std::path::{Path, PathBuf};

use angle_net::AngleNet;
use crnn_net::CrnnNet;
use dbnet::DbNet;

mod angle_net;
pub mod config;
mod crnn_net;
pub mod dbnet;
mod detection;
mod error;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod reading_order;
pub mod selector;
pub mod util;

pub use detection::*;
pub use error::{Error, Result};
use image::DynamicImage;
pub use reading_order::LineOrdering;
use tracing::instrument;
use util::{pad_image, part_image, scale_normalized, unpad_box};

pub use ort as runtime;

pub const DEFAULT_LANGUAGE: &str = "tr";

/// Anything that turns an image file into recognized text fragments.
pub trait TextRecognizer {
    fn recognize(&self, path: &Path) -> Result<Vec<Detection>>;
}

/// Where the engine finds its models.
///
/// ```text
/// <root>/det.onnx
/// <root>/cls.onnx
/// <root>/<lang>/rec.onnx
/// <root>/<lang>/dict.txt
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLayout {
    pub root: PathBuf,
    pub language: String,
}

impl ModelLayout {
    pub fn new(root: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            language: language.into(),
        }
    }

    pub fn det_model(&self) -> PathBuf {
        self.root.join("det.onnx")
    }

    pub fn cls_model(&self) -> PathBuf {
        self.root.join("cls.onnx")
    }

    pub fn rec_model(&self) -> PathBuf {
        self.root.join(&self.language).join("rec.onnx")
    }

    pub fn dictionary(&self) -> PathBuf {
        self.root.join(&self.language).join("dict.txt")
    }
}

#[derive(Debug, Clone)]
pub struct OcrEngineBuilder {
    threads: usize,
    det_path: Option<PathBuf>,
    cls_path: Option<PathBuf>,
    rec_paths: Option<(PathBuf, PathBuf)>,
    max_side_len: u32,
    most_angle: bool,
    cache_path: Option<PathBuf>,
    execution_providers: Vec<ExecutionProvider>,
    options: DetectionOptions,
}

impl OcrEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points every model path at `layout`. With `angle_cls` off the
    /// direction classifier is not loaded.
    pub fn layout(self, layout: &ModelLayout, angle_cls: bool) -> Self {
        let builder = self
            .det_model(layout.det_model())
            .rec_model(layout.rec_model(), layout.dictionary());
        if angle_cls {
            builder.cls_model(layout.cls_model())
        } else {
            builder.without_cls_model()
        }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_path = Some(path.into());
        self
    }

    pub fn cls_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.cls_path = Some(path.into());
        self
    }

    pub fn without_cls_model(mut self) -> Self {
        self.cls_path = None;
        self
    }

    pub fn rec_model(
        mut self,
        model_path: impl Into<PathBuf>,
        keys_path: impl Into<PathBuf>,
    ) -> Self {
        self.rec_paths = Some((model_path.into(), keys_path.into()));
        self
    }

    pub fn most_angle(mut self, most_angle: bool) -> Self {
        self.most_angle = most_angle;
        self
    }

    pub fn max_side_len(mut self, max_side_len: u32) -> Self {
        self.max_side_len = max_side_len;
        self
    }

    /// Options used by [`TextRecognizer::recognize`].
    pub fn detection_options(mut self, options: DetectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    #[instrument(skip(self), level = "debug")]
    fn init_models(&mut self) -> Result<(DbNet, Option<AngleNet>, CrnnNet)> {
        let defaults = ModelLayout::new("models", DEFAULT_LANGUAGE);
        let det_path = self.det_path.take().unwrap_or_else(|| defaults.det_model());
        let cls_path = self.cls_path.take();
        let (rec_path, keys_path) = self
            .rec_paths
            .take()
            .unwrap_or_else(|| (defaults.rec_model(), defaults.dictionary()));
        Ok((
            DbNet::init(
                det_path,
                self.threads,
                self.max_side_len,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
            cls_path
                .map(|cls_path| AngleNet::init(cls_path, self.threads))
                .transpose()?,
            CrnnNet::init(
                rec_path,
                keys_path,
                self.threads,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
        ))
    }

    #[instrument(skip(self))]
    pub fn build(mut self) -> Result<OcrEngine> {
        let (det_model, cls_model, rec_model) = self.init_models()?;
        log::info!(
            "OCR engine ready (angle classification {})",
            if cls_model.is_some() { "on" } else { "off" }
        );
        Ok(OcrEngine {
            det_model,
            cls_model,
            rec_model,
            max_side_len: self.max_side_len,
            most_angle: self.most_angle,
            options: self.options,
        })
    }
}

impl Default for OcrEngineBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            det_path: None,
            cls_path: None,
            rec_paths: None,
            max_side_len: 1024,
            most_angle: false,
            cache_path: None,
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
            options: DetectionOptions::default(),
        }
    }
}

/// PaddleOCR-style pipeline: detect boxes, optionally fix upside-down
/// crops, recognize each crop.
pub struct OcrEngine {
    det_model: DbNet,
    cls_model: Option<AngleNet>,
    rec_model: CrnnNet,
    max_side_len: u32,
    most_angle: bool,
    options: DetectionOptions,
}

impl OcrEngine {
    /// Fragments come back in detector order; see [`reading_order`] for
    /// putting them into reading order.
    #[instrument(skip(self, image))]
    pub fn detect(&self, image: &DynamicImage, options: DetectionOptions) -> Result<Vec<Detection>> {
        let DetectionOptions {
            padding,
            max_side_len,
            box_threshold,
            box_score_threshold,
            unclip_ratio,
            most_angle,
        } = options;
        let padded = pad_image(image, padding);
        let image = &padded;
        let max_side_len = if max_side_len != 0 {
            max_side_len.min(self.max_side_len)
        } else {
            self.max_side_len
        };
        let scale = if max_side_len > 0 {
            scale_normalized(image, max_side_len)
        } else {
            scale_normalized(image, u32::MAX)
        };
        let boxes = self.det_model.get_text_boxes(
            image,
            scale,
            box_threshold,
            box_score_threshold,
            unclip_ratio,
        )?;
        let mut part_images = boxes
            .iter()
            .map(|it| part_image(image, &it.rect))
            .collect::<Vec<_>>();
        let boxes = boxes.into_iter().map(|mut it| {
            it.rect = unpad_box(&it.rect, padding);
            it
        });
        #[cfg(feature = "debug")]
        for (i, image) in part_images.iter().enumerate() {
            if let Err(err) = image.save(format!("part_images/{i}.png")) {
                log::warn!("Failed to dump crop {i}: {err}");
            }
        }

        if let Some(angle_net) = &self.cls_model {
            angle_net.correct(&mut part_images, most_angle || self.most_angle)?;
        }

        let text_lines = self.rec_model.get_text_lines(&part_images)?;

        Ok(boxes
            .zip(text_lines)
            .map(|(bounds, line)| Detection::from_parts(bounds, line))
            .collect())
    }
}

/// Loads the models and recognizes in one step, so that model loading
/// failures are reported like any other recognition failure.
impl TextRecognizer for OcrEngineBuilder {
    fn recognize(&self, path: &Path) -> Result<Vec<Detection>> {
        self.clone().build()?.recognize(path)
    }
}

impl TextRecognizer for OcrEngine {
    fn recognize(&self, path: &Path) -> Result<Vec<Detection>> {
        let image = image::open(path)?;
        self.detect(&image, self.options)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    /// White border added around the image before detection. Returned
    /// boxes are in the unpadded image's coordinates.
    pub padding: u32,
    /// 0 keeps the engine's own limit.
    pub max_side_len: u32,
    pub box_score_threshold: f32,
    pub box_threshold: f32,
    pub unclip_ratio: f32,
    pub most_angle: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            padding: 50,
            max_side_len: 0,
            box_score_threshold: 0.5,
            box_threshold: 0.3,
            unclip_ratio: 1.6,
            most_angle: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];

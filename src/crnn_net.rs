use std::path::{Path, PathBuf};

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{ArrayView2, Axis};
use ort::ExecutionProviderDispatch;
use ort::{inputs, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::{util::subtract_mean_normalize, Error, ExecutionProvider, Result, TextLine};

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

const DEST_HEIGHT: u32 = 48;

/// Text recognition model (CRNN with CTC head).
pub struct CrnnNet {
    session: Session,
    keys: Vec<String>,
}

#[cfg(feature = "tensorrt")]
fn setup_tensorrt(cache_path: PathBuf) -> ExecutionProviderDispatch {
    use ort::TensorRTExecutionProvider;

    TensorRTExecutionProvider::default()
        .with_profile_min_shapes("x:1x3x48x1")
        .with_profile_max_shapes(format!("x:1x3x48x{}", u16::MAX))
        .with_profile_opt_shapes("x:1x3x48x256")
        .with_engine_cache(true)
        .with_engine_cache_path(cache_path.to_string_lossy())
        .with_timing_cache(true)
        .with_builder_optimization_level(5)
        .with_detailed_build_log(true)
        .build()
}

#[cfg(feature = "coreml")]
fn setup_coreml() -> ExecutionProviderDispatch {
    use ort::CoreMLExecutionProvider;

    CoreMLExecutionProvider::default().build()
}

#[cfg(feature = "cuda")]
fn setup_cuda() -> ExecutionProviderDispatch {
    use ort::CUDAExecutionProvider;

    CUDAExecutionProvider::default().build()
}

#[cfg(feature = "directml")]
fn setup_directml() -> ExecutionProviderDispatch {
    use ort::DirectMLExecutionProvider;

    DirectMLExecutionProvider::default().build()
}

/// Reads a character dictionary, one symbol per line. Index 0 is the CTC
/// blank and a trailing space symbol is appended.
pub(crate) fn load_dictionary(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Dictionary {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(std::iter::once("#".to_string())
        .chain(contents.lines().map(|line| line.to_string()))
        .chain([" ".to_string()])
        .collect())
}

impl CrnnNet {
    #[instrument(level = "debug")]
    pub fn init(
        model_path: PathBuf,
        keys_path: PathBuf,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<PathBuf>,
    ) -> Result<Self> {
        #[cfg(feature = "directml")]
        let parallel = execution_providers.contains(&ExecutionProvider::DirectML);
        #[cfg(not(feature = "directml"))]
        let parallel = true;

        let execution_providers = execution_providers.iter().filter_map(
            |provider| -> Option<ExecutionProviderDispatch> {
                match provider {
                    ExecutionProvider::Default => None,
                    #[cfg(feature = "tensorrt")]
                    ExecutionProvider::TensorRT => {
                        Some(setup_tensorrt(cache_path.clone().unwrap_or_else(|| {
                            model_path.parent().unwrap_or(Path::new(".")).join(".cache")
                        })))
                    }
                    #[cfg(feature = "coreml")]
                    ExecutionProvider::CoreML => Some(setup_coreml()),
                    #[cfg(feature = "cuda")]
                    ExecutionProvider::Cuda => Some(setup_cuda()),
                    #[cfg(feature = "directml")]
                    ExecutionProvider::DirectML => Some(setup_directml()),
                }
            },
        );

        let keys = load_dictionary(&keys_path)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_parallel_execution(parallel)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .with_execution_providers(execution_providers)?
            .commit_from_file(&model_path)?;

        log::debug!("CRNN Inputs: {:?}", session.inputs);
        log::debug!("CRNN Outputs: {:?}", session.outputs);
        log::debug!("Loaded {} dictionary symbols", keys.len());

        Ok(Self { session, keys })
    }

    #[instrument(level = "debug", skip(self, images))]
    pub fn get_text_lines(&self, images: &[DynamicImage]) -> Result<Vec<TextLine>> {
        images
            .iter()
            .map(|image| self.get_text_line(image))
            .collect()
    }

    #[instrument(level = "trace", skip(self, image))]
    fn get_text_line(&self, image: &DynamicImage) -> Result<TextLine> {
        let scale = DEST_HEIGHT as f32 / image.height().max(1) as f32;
        let dest_width = ((image.width() as f32 * scale) as u32).clamp(1, u16::MAX as u32);
        let image = image.resize_exact(dest_width, DEST_HEIGHT, FilterType::Nearest);

        let tensor_values =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => tensor_values]?)?;
        let output_tensor = outputs
            .first_key_value()
            .ok_or(Error::MissingOutput { model: "rec" })?
            .1
            .try_extract_tensor::<f32>()?;

        log::trace!("Output tensor size: {:?}", output_tensor.dim());
        let steps = output_tensor.len_of(Axis(1));
        let classes = output_tensor.len_of(Axis(2));

        let output_tensor = output_tensor.remove_axis(Axis(0));
        let output = output_tensor.to_shape((steps, classes))?;

        Ok(ctc_greedy_decode(output.view(), &self.keys))
    }
}

/// Best-path CTC decoding: take the arg-max class at every time step, drop
/// blanks and collapse repeats of the same class.
fn ctc_greedy_decode(data: ArrayView2<f32>, keys: &[String]) -> TextLine {
    let mut text = String::new();
    let mut character_scores = Vec::new();
    let mut previous = None;

    for step in data.outer_iter() {
        let Some((index, score)) = step
            .indexed_iter()
            .max_by_key(|(_, value)| FloatOrd(**value))
            .map(|(index, value)| (index, *value))
        else {
            continue;
        };
        if previous != Some(index) && index > 0 && index < keys.len() {
            text.push_str(&keys[index]);
            character_scores.push(score);
        }
        previous = Some(index);
    }

    TextLine {
        text,
        character_scores,
    }
}

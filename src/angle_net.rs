use std::path::PathBuf;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Axis;
use ort::{inputs, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::{util::subtract_mean_normalize, Angle, Error, Result};

const DEST_WIDTH: u32 = 192;
const DEST_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

const UPSIDE_DOWN: usize = 1;

/// Text direction classifier (0 or 180 degrees).
pub struct AngleNet {
    session: Session,
}

impl AngleNet {
    #[instrument(level = "debug")]
    pub fn init(path: PathBuf, num_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_parallel_execution(true)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .commit_from_file(path)?;

        log::debug!("Angle session inputs: {:?}", session.inputs);
        log::debug!("Angle session outputs: {:?}", session.outputs);

        Ok(Self { session })
    }

    /// Rotates every crop classified as upside down by 180 degrees and
    /// returns how many were flipped.
    #[instrument(level = "debug", skip(self, crops))]
    pub fn correct(&self, crops: &mut [DynamicImage], most_angle: bool) -> Result<usize> {
        let angles = self.get_angles(crops, most_angle)?;
        let mut flipped = 0;
        for (crop, angle) in crops.iter_mut().zip(angles) {
            if angle.index == UPSIDE_DOWN {
                *crop = crop.rotate180();
                flipped += 1;
            }
        }
        log::debug!("Flipped {flipped} of {} crops", crops.len());
        Ok(flipped)
    }

    pub fn get_angles(&self, images: &[DynamicImage], most_angle: bool) -> Result<Vec<Angle>> {
        let mut angles = images
            .iter()
            .map(|image| self.get_angle(image))
            .collect::<Result<Vec<_>>>()?;

        if most_angle {
            let index = majority_index(&angles);
            angles.iter_mut().for_each(|angle| angle.index = index);
        }

        Ok(angles)
    }

    #[instrument(level = "trace", skip(self, image))]
    fn get_angle(&self, image: &DynamicImage) -> Result<Angle> {
        let image = image.resize_exact(DEST_WIDTH, DEST_HEIGHT, FilterType::Nearest);
        let tensor =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => tensor]?)?;
        let output = outputs
            .first_key_value()
            .ok_or(Error::MissingOutput { model: "cls" })?
            .1
            .try_extract_tensor::<f32>()?
            .remove_axis(Axis(0));

        Ok(output
            .iter()
            .enumerate()
            .max_by_key(|(_, score)| FloatOrd(**score))
            .map(|(index, score)| Angle {
                index,
                score: *score,
            })
            .unwrap_or(Angle {
                index: 0,
                score: 0.0,
            }))
    }
}

/// Upside down wins only when at least half of the crops vote for it.
fn majority_index(angles: &[Angle]) -> usize {
    if angles.is_empty() {
        return 0;
    }
    let votes = angles.iter().filter(|angle| angle.index == UPSIDE_DOWN).count() as f32;
    if votes < angles.len() as f32 / 2.0 {
        0
    } else {
        UPSIDE_DOWN
    }
}

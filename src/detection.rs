use geo::{Coord, Polygon};

use crate::util::quad_points;

/// A text region found by the detection model, in source image coordinates.
#[derive(Debug, Clone)]
pub struct TextBox {
    pub score: f32,
    pub rect: Polygon<f32>,
}

#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    pub character_scores: Vec<f32>,
}

impl TextLine {
    /// Mean of the per-character scores, or 0 when nothing was recognized.
    pub fn score(&self) -> f32 {
        if self.character_scores.is_empty() {
            return 0.0;
        }
        self.character_scores.iter().sum::<f32>() / self.character_scores.len() as f32
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Angle {
    pub index: usize,
    pub score: f32,
}

/// One recognized text fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Corner points, clockwise from the top-left.
    pub quad: [Coord<f32>; 4],
    pub text: String,
    /// Recognition confidence in `0..=1`.
    pub score: f32,
    /// Detector confidence for the region; 0 when the fragment did not come
    /// from the detection model.
    pub box_score: f32,
    pub character_scores: Vec<f32>,
}

impl Detection {
    /// A fragment with a known recognition score and no detector score.
    pub fn new(quad: [Coord<f32>; 4], text: impl Into<String>, score: f32) -> Self {
        Self {
            quad,
            text: text.into(),
            score,
            box_score: 0.0,
            character_scores: Vec::new(),
        }
    }

    pub fn with_box_score(mut self, box_score: f32) -> Self {
        self.box_score = box_score;
        self
    }

    pub(crate) fn from_parts(bounds: TextBox, line: TextLine) -> Self {
        let score = line.score();
        Self {
            quad: quad_points(&bounds.rect),
            text: line.text,
            score,
            box_score: bounds.score,
            character_scores: line.character_scores,
        }
    }

    /// The first corner of the quad. Reading order is keyed on this point.
    pub fn leading_point(&self) -> Coord<f32> {
        self.quad[0]
    }

    /// Renders the quad as `[[x, y], [x, y], [x, y], [x, y]]`.
    pub fn format_box(&self) -> String {
        let corners = self
            .quad
            .iter()
            .map(|point| format!("[{}, {}]", point.x, point.y))
            .collect::<Vec<_>>();
        format!("[{}]", corners.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn quad(x: f32, y: f32) -> [Coord<f32>; 4] {
        [
            Coord { x, y },
            Coord { x: x + 40.0, y },
            Coord { x: x + 40.0, y: y + 12.0 },
            Coord { x, y: y + 12.0 },
        ]
    }

    #[test]
    fn format_box_lists_all_corners() {
        let detection = Detection::new(quad(3.0, 4.5), "abc", 0.9);
        assert_eq!(
            detection.format_box(),
            "[[3, 4.5], [43, 4.5], [43, 16.5], [3, 16.5]]"
        );
    }

    #[test]
    fn detector_and_recognizer_scores_stay_separate() {
        let detection = Detection::new(quad(0.0, 0.0), "x", 0.9);
        assert_eq!(detection.score, 0.9);
        assert_eq!(detection.box_score, 0.0);

        let detection = detection.with_box_score(0.6);
        assert_eq!(detection.score, 0.9);
        assert_eq!(detection.box_score, 0.6);

        let parts = Detection::from_parts(
            TextBox {
                score: 0.4,
                rect: geo::polygon![
                    (x: 0.0f32, y: 0.0),
                    (x: 10.0, y: 0.0),
                    (x: 10.0, y: 5.0),
                    (x: 0.0, y: 5.0),
                ],
            },
            TextLine {
                text: "ok".into(),
                character_scores: vec![1.0, 0.5],
            },
        );
        assert_eq!(parts.box_score, 0.4);
        assert_eq!(parts.score, 0.75);
    }

    #[test]
    fn line_score_is_mean_of_characters() {
        let line = TextLine {
            text: "ab".into(),
            character_scores: vec![0.5, 1.0],
        };
        assert_eq!(line.score(), 0.75);

        let empty = TextLine {
            text: String::new(),
            character_scores: vec![],
        };
        assert_eq!(empty.score(), 0.0);
    }
}

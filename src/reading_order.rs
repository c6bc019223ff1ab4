//! Reading order for OCR fragments.
//!
//! Engines return fragments in scan or confidence order. Fragments are
//! clustered into lines by the `y` of their leading point, then each line
//! is read left to right. Two fragments share a line when their `y`
//! values chain within [`LineOrdering::line_threshold`] of each other.

use std::cmp::Ordering;

use geo::Coord;
use tracing::instrument;

use crate::{Detection, Error, Result};

pub const DEFAULT_LINE_THRESHOLD: f32 = 10.0;

/// Line grouping options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineOrdering {
    /// Largest `y` step, in pixels, between consecutive fragments of one line.
    pub line_threshold: f32,
}

impl Default for LineOrdering {
    fn default() -> Self {
        Self {
            line_threshold: DEFAULT_LINE_THRESHOLD,
        }
    }
}

/// Indices of the fragments judged to sit on one visual line, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineGroup {
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    y: f32,
    x: f32,
    index: usize,
}

fn by_x(a: &Anchor, b: &Anchor) -> Ordering {
    a.x.total_cmp(&b.x)
}

/// Clusters leading points into lines, top to bottom.
///
/// An empty input yields no groups.
pub fn group_lines(points: &[Coord<f32>], threshold: f32) -> Vec<LineGroup> {
    let mut anchors = points
        .iter()
        .enumerate()
        .map(|(index, point)| Anchor {
            y: point.y,
            x: point.x,
            index,
        })
        .collect::<Vec<_>>();
    anchors.sort_by(|a, b| a.y.total_cmp(&b.y).then_with(|| by_x(a, b)));

    let mut groups = Vec::new();
    let mut current: Vec<Anchor> = Vec::new();
    for anchor in anchors {
        if let Some(previous) = current.last() {
            if (anchor.y - previous.y).abs() > threshold {
                groups.push(close_line(std::mem::take(&mut current)));
            }
        }
        current.push(anchor);
    }
    if !current.is_empty() {
        groups.push(close_line(current));
    }
    groups
}

fn close_line(mut line: Vec<Anchor>) -> LineGroup {
    line.sort_by(by_x);
    LineGroup {
        members: line.into_iter().map(|anchor| anchor.index).collect(),
    }
}

/// Permutation of `0..points.len()` in reading order.
pub fn reading_order(points: &[Coord<f32>], threshold: f32) -> Vec<usize> {
    group_lines(points, threshold)
        .into_iter()
        .flat_map(|group| group.members)
        .collect()
}

/// Reorders `texts` by the leading point of the matching box.
pub fn order_texts<S: AsRef<str>>(
    boxes: &[[Coord<f32>; 4]],
    texts: &[S],
    threshold: f32,
) -> Result<Vec<String>> {
    if boxes.len() != texts.len() {
        return Err(Error::LengthMismatch {
            boxes: boxes.len(),
            texts: texts.len(),
        });
    }
    let points = boxes.iter().map(|quad| quad[0]).collect::<Vec<_>>();
    Ok(reading_order(&points, threshold)
        .into_iter()
        .map(|index| texts[index].as_ref().to_string())
        .collect())
}

impl LineOrdering {
    /// Reading order of `detections`, as indices into the slice.
    #[instrument(level = "debug", skip(detections), fields(count = detections.len()))]
    pub fn order(&self, detections: &[Detection]) -> Vec<usize> {
        let points = detections
            .iter()
            .map(Detection::leading_point)
            .collect::<Vec<_>>();
        reading_order(&points, self.line_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(x: f32, y: f32) -> [Coord<f32>; 4] {
        [
            Coord { x, y },
            Coord { x: x + 30.0, y },
            Coord { x: x + 30.0, y: y + 10.0 },
            Coord { x, y: y + 10.0 },
        ]
    }

    fn order(boxes: &[[Coord<f32>; 4]], texts: &[&str]) -> Vec<String> {
        order_texts(boxes, texts, DEFAULT_LINE_THRESHOLD).unwrap()
    }

    #[test]
    fn same_line_reads_left_to_right() {
        let boxes = [quad(100.0, 52.0), quad(10.0, 45.0)];
        assert_eq!(order(&boxes, &["right", "left"]), vec!["left", "right"]);
    }

    #[test]
    fn earlier_line_comes_first_regardless_of_input_order() {
        let boxes = [quad(10.0, 200.0), quad(300.0, 20.0)];
        assert_eq!(order(&boxes, &["second", "first"]), vec!["first", "second"]);
    }

    #[test]
    fn equal_y_groups_sort_purely_by_x() {
        let points = [
            Coord { x: 50.0, y: 5.0 },
            Coord { x: 20.0, y: 5.0 },
            Coord { x: 80.0, y: 5.0 },
        ];
        let groups = group_lines(&points, DEFAULT_LINE_THRESHOLD);
        assert_eq!(groups, vec![LineGroup { members: vec![1, 0, 2] }]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let points = [Coord { x: 5.0, y: 10.0 }, Coord { x: 1.0, y: 20.0 }];
        assert_eq!(group_lines(&points, 10.0).len(), 1);
        assert_eq!(group_lines(&points, 9.5).len(), 2);
    }

    #[test]
    fn lines_chain_through_consecutive_fragments() {
        // Each step is within the threshold even though the ends are 16 apart.
        let points = [
            Coord { x: 30.0, y: 16.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 20.0, y: 8.0 },
        ];
        assert_eq!(
            group_lines(&points, 10.0),
            vec![LineGroup { members: vec![1, 2, 0] }]
        );
    }

    #[test]
    fn multi_line_page() {
        let boxes = [
            quad(220.0, 61.0),
            quad(15.0, 12.0),
            quad(15.0, 58.0),
            quad(120.0, 9.0),
            quad(120.0, 104.0),
        ];
        let texts = ["d", "a", "c", "b", "e"];
        assert_eq!(order(&boxes, &texts), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn single_fragment_is_a_singleton_line() {
        let groups = group_lines(&[Coord { x: 3.0, y: 4.0 }], DEFAULT_LINE_THRESHOLD);
        assert_eq!(groups, vec![LineGroup { members: vec![0] }]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let boxes: [[Coord<f32>; 4]; 0] = [];
        let texts: [&str; 0] = [];
        assert!(order(&boxes, &texts).is_empty());
        assert!(group_lines(&[], DEFAULT_LINE_THRESHOLD).is_empty());
    }

    #[test]
    fn output_is_a_permutation_of_input() {
        let points = (0..40)
            .map(|i| Coord {
                x: ((i * 37) % 11) as f32 * 25.0,
                y: ((i * 13) % 7) as f32 * 6.0,
            })
            .collect::<Vec<_>>();
        let mut order = reading_order(&points, DEFAULT_LINE_THRESHOLD);
        assert_eq!(order.len(), points.len());
        order.sort_unstable();
        assert_eq!(order, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn nan_coordinates_do_not_panic() {
        let points = [Coord { x: f32::NAN, y: 1.0 }, Coord { x: 0.0, y: f32::NAN }];
        assert_eq!(reading_order(&points, DEFAULT_LINE_THRESHOLD).len(), 2);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = order_texts(&[quad(0.0, 0.0)], &["a", "b"], 10.0).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { boxes: 1, texts: 2 }));
    }

    #[test]
    fn detections_use_their_leading_point() {
        let detections = vec![
            Detection::new(quad(90.0, 40.0), "world", 0.9),
            Detection::new(quad(5.0, 43.0), "hello", 0.8),
            Detection::new(quad(5.0, 3.0), "title", 0.95),
        ];
        assert_eq!(LineOrdering::default().order(&detections), vec![2, 1, 0]);
    }
}

use geo::{
    point, Area, BoundingRect, Contains, Coord, EuclideanLength, HasDimensions, LineString,
    MinimumRotatedRect, Polygon, Translate,
};
use geo_clipper::{Clipper, EndType, JoinType};
use image::{imageops, DynamicImage, GrayImage, Luma, Pixel, Rgb, RgbImage};
use imageproc::point::Point;
use ndarray::{s, Array3, ArrayView2};
use tracing::instrument;

/// Converts an image to a CHW tensor of `(pixel * norm) - (mean * norm)`.
#[instrument(level = "debug", skip(image))]
pub(crate) fn subtract_mean_normalize(
    image: &DynamicImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    let mut image = image.to_rgb32f();
    let norm = Rgb::<f32>(*norm_vals);
    let mean_vals = Rgb::<f32>(*mean_vals).map2(&norm, |c1, c2| c1 * c2);
    for pixel in image.pixels_mut() {
        *pixel = pixel
            .map2(&norm, |c1, c2| c1 * c2)
            .map2(&mean_vals, |c1, c2| c1 - c2);
    }
    Array3::<f32>::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| image.get_pixel(x as u32, y as u32).channels()[ch],
    )
}

/// Maps a `0..=1` probability map to an 8-bit grayscale image.
pub(crate) fn to_luma_image(data: ArrayView2<f32>) -> GrayImage {
    let (height, width) = data.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([(data[[y as usize, x as usize]] * 255.0) as u8])
    })
}

pub(crate) fn to_geo_poly(points: &[Point<i32>]) -> Polygon<f32> {
    let points = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(points), vec![])
}

pub(crate) fn max_side(rect: &Polygon<f32>) -> f32 {
    rect.exterior()
        .lines()
        .map(|it| it.euclidean_length() as i32)
        .max()
        .unwrap_or(0) as f32
}

/// Mean probability of the prediction map inside `rect`.
pub(crate) fn box_score_fast(rect: &Polygon<f32>, pred_data: ArrayView2<f32>) -> f32 {
    let Some(bounds) = rect.bounding_rect() else {
        return 0.0;
    };
    let (rows, cols) = pred_data.dim();
    let min = bounds.min();
    let max = bounds.max();
    let y0 = (min.y.max(0.0) as usize).min(rows);
    let y1 = (max.y.max(0.0) as usize).clamp(y0, rows);
    let x0 = (min.x.max(0.0) as usize).min(cols);
    let x1 = (max.x.max(0.0) as usize).clamp(x0, cols);

    let sliced = pred_data.slice(s![y0..y1, x0..x1]);
    let local_rect = rect.translate(-(x0 as f32), -(y0 as f32));

    let (sum, count) = sliced
        .indexed_iter()
        .filter(|((y, x), _)| local_rect.contains(&point![x: *x as f32, y: *y as f32]))
        .fold((0.0f32, 0usize), |(sum, count), (_, value)| {
            (sum + *value, count + 1)
        });

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Expands a detected region outwards, proportionally to its area over perimeter.
pub(crate) fn unclip(rect: Polygon<f32>, unclip_ratio: f32) -> Option<Polygon<f32>> {
    let distance = (rect.unsigned_area() * 0.5 * unclip_ratio) / rect.exterior().euclidean_length();

    let clipped_rect = rect.offset(distance, JoinType::Round(0.25), EndType::ClosedPolygon, 1.0);

    if clipped_rect.is_empty() {
        None
    } else {
        clipped_rect.minimum_rotated_rect()
    }
}

/// Orders the corners of a box clockwise starting at the top-left corner.
///
/// The two left-most points become top-left and bottom-left (smaller `y`
/// first), the remaining two top-right and bottom-right. Degenerate
/// polygons are padded by repeating their last point.
pub(crate) fn quad_points(rect: &Polygon<f32>) -> [Coord<f32>; 4] {
    let mut points = rect.exterior().coords().copied().collect::<Vec<_>>();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    let fill = points.last().copied().unwrap_or_else(Coord::zero);
    points.resize(4, fill);
    points.sort_by(|a, b| a.x.total_cmp(&b.x));

    let (top_left, bottom_left) = if points[0].y <= points[1].y {
        (points[0], points[1])
    } else {
        (points[1], points[0])
    };
    let (top_right, bottom_right) = if points[2].y <= points[3].y {
        (points[2], points[3])
    } else {
        (points[3], points[2])
    };
    [top_left, top_right, bottom_right, bottom_left]
}

#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub factor_x: f32,
    pub factor_y: f32,
    pub target_width: u32,
    pub target_height: u32,
}

/// Picks detector input dimensions: longest side capped at `target_size`,
/// both sides floored to a multiple of 32.
pub fn scale_normalized(image: &DynamicImage, target_size: u32) -> Scale {
    let aspect_ratio = image.width() as f32 / image.height() as f32;
    let (mut target_width, mut target_height) = if aspect_ratio >= 1.0 {
        let width = image.width().min(target_size);
        let height = (width as f32 / aspect_ratio) as u32;
        (width, height)
    } else {
        let height = image.height().min(target_size);
        let width = (height as f32 * aspect_ratio) as u32;
        (width, height)
    };
    if target_width % 32 != 0 {
        let new_width = (target_width / 32 * 32).max(32);
        log::debug!(
            "Target width of {target_width} wasn't a multiple of 32, flooring to {new_width}."
        );
        target_width = new_width;
    }
    if target_height % 32 != 0 {
        let new_height = (target_height / 32 * 32).max(32);
        log::debug!(
            "Target height of {target_height} wasn't a multiple of 32, flooring to {new_height}."
        );
        target_height = new_height;
    }
    let scale_x = image.width() as f32 / target_width as f32;
    let scale_y = image.height() as f32 / target_height as f32;
    log::debug!("Resize will change image dimensions from (w: {}, h: {}) to (w: {target_width}, h: {target_height}) with scaling factor ({scale_x}, {scale_y}).", image.width(), image.height());
    Scale {
        target_width,
        target_height,
        factor_x: scale_x,
        factor_y: scale_y,
    }
}

/// Surrounds `image` with a white border `padding` pixels wide, so text
/// touching the edges still gets a full detection context.
pub(crate) fn pad_image(image: &DynamicImage, padding: u32) -> DynamicImage {
    if padding == 0 {
        return image.clone();
    }
    let mut canvas = RgbImage::from_pixel(
        image.width() + 2 * padding,
        image.height() + 2 * padding,
        Rgb([255, 255, 255]),
    );
    imageops::overlay(&mut canvas, &image.to_rgb8(), padding as i64, padding as i64);
    DynamicImage::ImageRgb8(canvas)
}

/// Maps a box found on a [`pad_image`] canvas back to the unpadded image.
pub(crate) fn unpad_box(rect: &Polygon<f32>, padding: u32) -> Polygon<f32> {
    rect.translate(-(padding as f32), -(padding as f32))
}

/// Crops the axis-aligned bounds of `b_box` out of `image`.
pub(crate) fn part_image(image: &DynamicImage, b_box: &Polygon<f32>) -> DynamicImage {
    // TODO: perspective-crop rotated boxes instead of taking their bounding rect
    let Some(rect) = b_box.bounding_rect() else {
        return image.crop_imm(0, 0, 1, 1);
    };
    let x = (rect.min().x.max(0.0) as u32).min(image.width().saturating_sub(1));
    let y = (rect.min().y.max(0.0) as u32).min(image.height().saturating_sub(1));
    let width = (rect.width() as u32).clamp(1, (image.width() - x).max(1));
    let height = (rect.height() as u32).clamp(1, (image.height() - y).max(1));
    log::trace!("Slicing subimage to {rect:?}");
    image.crop_imm(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use ndarray::Array2;

    use super::*;

    #[test]
    fn quad_points_start_top_left_and_run_clockwise() {
        let rect = polygon![
            (x: 50.0f32, y: 30.0),
            (x: 10.0, y: 30.0),
            (x: 10.0, y: 20.0),
            (x: 50.0, y: 20.0),
        ];
        let [tl, tr, br, bl] = quad_points(&rect);
        assert_eq!((tl.x, tl.y), (10.0, 20.0));
        assert_eq!((tr.x, tr.y), (50.0, 20.0));
        assert_eq!((br.x, br.y), (50.0, 30.0));
        assert_eq!((bl.x, bl.y), (10.0, 30.0));
    }

    #[test]
    fn quad_points_pads_degenerate_polygons() {
        let rect = Polygon::new(LineString::new(vec![Coord { x: 1.0f32, y: 2.0 }]), vec![]);
        let quad = quad_points(&rect);
        assert!(quad.iter().all(|p| p.x == 1.0 && p.y == 2.0));
    }

    #[test]
    fn padding_adds_white_border_around_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([0, 0, 0])));
        let padded = pad_image(&image, 5).to_rgb8();
        assert_eq!(padded.dimensions(), (14, 13));
        assert_eq!(*padded.get_pixel(0, 0), Rgb([255, 255, 255]));
        assert_eq!(*padded.get_pixel(4, 12), Rgb([255, 255, 255]));
        assert_eq!(*padded.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*padded.get_pixel(8, 7), Rgb([0, 0, 0]));
        assert_eq!(*padded.get_pixel(9, 7), Rgb([255, 255, 255]));
    }

    #[test]
    fn zero_padding_keeps_image() {
        let image = DynamicImage::new_rgb8(7, 2);
        let padded = pad_image(&image, 0);
        assert_eq!((padded.width(), padded.height()), (7, 2));
    }

    #[test]
    fn unpadded_box_lands_on_original_coordinates() {
        let rect = polygon![
            (x: 60.0f32, y: 55.0),
            (x: 90.0, y: 55.0),
            (x: 90.0, y: 70.0),
            (x: 60.0, y: 70.0),
        ];
        let [tl, _, br, _] = quad_points(&unpad_box(&rect, 50));
        assert_eq!((tl.x, tl.y), (10.0, 5.0));
        assert_eq!((br.x, br.y), (40.0, 20.0));
    }

    #[test]
    fn scale_floors_to_multiples_of_32() {
        let image = DynamicImage::new_rgb8(1000, 500);
        let scale = scale_normalized(&image, 640);
        assert_eq!(scale.target_width, 640);
        assert_eq!(scale.target_height, 320);
        assert!(scale.factor_x > 1.0);
    }

    #[test]
    fn box_score_is_mean_inside_box() {
        let mut pred = Array2::<f32>::zeros((20, 20));
        pred.slice_mut(s![4..10, 4..10]).fill(1.0);
        let rect = polygon![
            (x: 5.0f32, y: 5.0),
            (x: 9.0, y: 5.0),
            (x: 9.0, y: 9.0),
            (x: 5.0, y: 9.0),
        ];
        let score = box_score_fast(&rect, pred.view());
        assert!((score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn part_image_never_returns_empty_crop() {
        let image = DynamicImage::new_rgb8(10, 10);
        let rect = polygon![
            (x: 9.5f32, y: 9.5),
            (x: 30.0, y: 9.5),
            (x: 30.0, y: 30.0),
            (x: 9.5, y: 30.0),
        ];
        let part = part_image(&image, &rect);
        assert!(part.width() >= 1 && part.height() >= 1);
    }
}

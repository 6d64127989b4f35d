//! Straightening scanned pages before OCR.
//!
//! We find the smallest rotated rectangle containing every non-white pixel,
//! and rotate the page so that rectangle is level. This works well for pages
//! of text, where the ink forms a block whose edges follow the text lines.
//!
//! Points are handled as `(row, column)` pairs, and rectangle angles use the
//! `[-90, 0)` convention, because [`normalize_angle`] expects them that way.

use image::{GrayImage, Luma};

use crate::prelude::*;

/// Angles smaller than this (in degrees) are treated as "already straight".
const MIN_ROTATION_DEGREES: f64 = 1e-6;

/// The `A` parameter of the bicubic convolution kernel.
const CUBIC_A: f64 = -0.75;

/// A point as `(row, column)`.
type Point = (f64, f64);

/// Straighten `image`. Returns the rotated image and the angle, in degrees,
/// by which it was rotated counter-clockwise.
///
/// Fails if the page has no foreground (non-white) pixels at all.
pub fn deskew(image: &GrayImage) -> Result<(GrayImage, f64)> {
    let angle = skew_angle(image)?;
    if angle.abs() < MIN_ROTATION_DEGREES {
        return Ok((image.clone(), 0.0));
    }
    debug!(angle, "Deskewing page");
    Ok((rotate_about_center(image, angle), angle))
}

/// How far should `image` be rotated counter-clockwise to straighten it?
pub fn skew_angle(image: &GrayImage) -> Result<f64> {
    let points = foreground_extremes(image);
    if points.is_empty() {
        return Err(anyhow!("cannot deskew a page with no foreground pixels"));
    }
    let hull = convex_hull(points);
    Ok(normalize_angle(min_area_rect_angle(&hull)))
}

/// The leftmost and rightmost foreground pixel of each row.
///
/// Foreground is anything that isn't pure white. These points have the same
/// convex hull as the full set of foreground pixels.
fn foreground_extremes(image: &GrayImage) -> Vec<Point> {
    let width = image.width() as usize;
    if width == 0 {
        return vec![];
    }
    let mut points = vec![];
    for (row, pixels) in image.as_raw().chunks(width).enumerate() {
        let first = pixels.iter().position(|&v| v < u8::MAX);
        let last = pixels.iter().rposition(|&v| v < u8::MAX);
        if let (Some(first), Some(last)) = (first, last) {
            points.push((row as f64, first as f64));
            if last != first {
                points.push((row as f64, last as f64));
            }
        }
    }
    points
}

/// Andrew's monotone chain. Returns the hull in counter-clockwise order,
/// without repeating the first point.
pub fn convex_hull(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    fn cross(o: Point, a: Point, b: Point) -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    }

    let mut hull: Vec<Point> = Vec::with_capacity(points.len() * 2);
    for &p in &points {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }

    // Never pop into the finished lower half.
    let lower_len = hull.len() + 1;
    for &p in points.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

/// The angle of the minimum-area rectangle around a convex `hull`, in the
/// `[-90, 0)` convention.
///
/// One side of the minimum-area rectangle is always collinear with a hull
/// edge, so we try each edge in turn.
pub fn min_area_rect_angle(hull: &[Point]) -> f64 {
    let mut best: Option<(f64, f64)> = None;
    for (i, &a) in hull.iter().enumerate() {
        let b = hull[(i + 1) % hull.len()];
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let len = dx.hypot(dy);
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / len, dy / len);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in hull {
            let u = p.0 * ux + p.1 * uy;
            let v = -p.0 * uy + p.1 * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }
        let area = (max_u - min_u) * (max_v - min_v);
        if best.is_none_or(|(best_area, _)| area < best_area) {
            best = Some((area, uy.atan2(ux).to_degrees()));
        }
    }

    // A single point has no edges, and counts as level.
    let edge_angle = best.map(|(_, angle)| angle).unwrap_or(0.0);
    edge_angle.rem_euclid(90.0) - 90.0
}

/// Convert a rectangle angle in `[-90, 0)` into the rotation that levels it.
pub fn normalize_angle(angle: f64) -> f64 {
    if angle < -45.0 {
        -(90.0 + angle)
    } else {
        -angle
    }
}

/// Rotate `image` counter-clockwise by `angle_deg` around `(w / 2, h / 2)`,
/// keeping its size. Uses bicubic sampling, and repeats edge pixels for
/// anything that comes from outside the original image.
pub fn rotate_about_center(image: &GrayImage, angle_deg: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    let cx = f64::from(width / 2);
    let cy = f64::from(height / 2);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    GrayImage::from_fn(width, height, |x, y| {
        let dx = f64::from(x) - cx;
        let dy = f64::from(y) - cy;
        let sx = cx + cos * dx - sin * dy;
        let sy = cy + sin * dx + cos * dy;
        Luma([sample_bicubic(image, sx, sy)])
    })
}

/// Sample `image` at a fractional position.
fn sample_bicubic(image: &GrayImage, x: f64, y: f64) -> u8 {
    let max_x = i64::from(image.width()) - 1;
    let max_y = i64::from(image.height()) - 1;
    let (x0, y0) = (x.floor(), y.floor());
    let wx = cubic_weights(x - x0);
    let wy = cubic_weights(y - y0);

    let mut acc = 0.0;
    for (j, wy) in wy.iter().enumerate() {
        let py = (y0 as i64 + j as i64 - 1).clamp(0, max_y) as u32;
        let mut row = 0.0;
        for (i, wx) in wx.iter().enumerate() {
            let px = (x0 as i64 + i as i64 - 1).clamp(0, max_x) as u32;
            row += wx * f64::from(image.get_pixel(px, py)[0]);
        }
        acc += wy * row;
    }
    acc.round().clamp(0.0, 255.0) as u8
}

/// Weights for the four neighbors at offsets -1, 0, 1 and 2, for a sample
/// `t` of the way from neighbor 0 to neighbor 1.
pub fn cubic_weights(t: f64) -> [f64; 4] {
    let a = CUBIC_A;
    let w0 = ((a * (t + 1.0) - 5.0 * a) * (t + 1.0) + 8.0 * a) * (t + 1.0) - 4.0 * a;
    let w1 = ((a + 2.0) * t - (a + 3.0)) * t * t + 1.0;
    let w2 = ((a + 2.0) * (1.0 - t) - (a + 3.0)) * (1.0 - t) * (1.0 - t) + 1.0;
    [w0, w1, w2, 1.0 - w0 - w1 - w2]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A white page with a filled black bar, tilted `degrees` counter-clockwise
    /// as seen on screen.
    fn tilted_bar(degrees: f64) -> GrayImage {
        let (sin, cos) = degrees.to_radians().sin_cos();
        GrayImage::from_fn(600, 400, |x, y| {
            let dx = f64::from(x) - 300.0;
            let dy = f64::from(y) - 200.0;
            let along = dx * cos - dy * sin;
            let across = dx * sin + dy * cos;
            if along.abs() <= 200.0 && across.abs() <= 20.0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn normalize_angle_matches_rect_convention() {
        assert_eq!(normalize_angle(-90.0), 0.0);
        assert_eq!(normalize_angle(-88.0), -2.0);
        assert_eq!(normalize_angle(-2.0), 2.0);
        assert_eq!(normalize_angle(-45.0), 45.0);
    }

    #[test]
    fn cubic_weights_interpolate_exactly_at_pixels() {
        assert_eq!(cubic_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
        let sum: f64 = cubic_weights(0.3).iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn convex_hull_drops_interior_points() {
        let hull = convex_hull(vec![
            (0.0, 0.0),
            (0.0, 4.0),
            (4.0, 4.0),
            (4.0, 0.0),
            (2.0, 2.0),
            (1.0, 3.0),
        ]);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&(2.0, 2.0)));
    }

    #[test]
    fn level_text_is_left_alone() {
        let image = tilted_bar(0.0);
        let (deskewed, angle) = deskew(&image).unwrap();
        assert_eq!(angle, 0.0);
        assert_eq!(deskewed, image);
    }

    #[test]
    fn tilted_text_is_straightened() {
        let image = tilted_bar(5.0);
        let angle = skew_angle(&image).unwrap();
        assert!((angle + 5.0).abs() < 0.5, "angle was {angle}");

        let (deskewed, applied) = deskew(&image).unwrap();
        assert_eq!(applied, angle);
        let remaining = skew_angle(&deskewed).unwrap();
        assert!(remaining.abs() < 1.0, "remaining angle was {remaining}");
    }

    #[test]
    fn tilt_direction_is_detected() {
        let angle = skew_angle(&tilted_bar(-3.0)).unwrap();
        assert!((angle - 3.0).abs() < 0.5, "angle was {angle}");
    }

    #[test]
    fn deskew_is_deterministic() {
        let image = tilted_bar(7.0);
        assert_eq!(deskew(&image).unwrap().0, deskew(&image).unwrap().0);
    }

    #[test]
    fn blank_page_is_an_error() {
        let image = GrayImage::from_pixel(50, 50, Luma([255]));
        assert!(deskew(&image).is_err());
        assert!(deskew(&GrayImage::new(0, 0)).is_err());
    }
}

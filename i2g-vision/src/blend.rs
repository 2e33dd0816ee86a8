//! Color transfer and feathered compositing of a donor face onto a target.

use anyhow::{ensure, Result};
use image::RgbImage;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use ndarray::Array2;

use crate::mask::{self, Mask};

fn ensure_same_size(a: &RgbImage, b: &RgbImage, mask: &Mask) -> Result<()> {
    ensure!(
        a.dimensions() == b.dimensions() && a.dimensions() == mask::dimensions(mask),
        "size mismatch: {:?} / {:?} / mask {:?}",
        a.dimensions(),
        b.dimensions(),
        mask::dimensions(mask)
    );
    Ok(())
}

fn masked_coords(mask: &Mask) -> impl Iterator<Item = (u32, u32)> + '_ {
    mask.indexed_iter()
        .filter(|(_, v)| **v != 0.0)
        .map(|((y, x), _)| (x as u32, y as u32))
}

/// Shift `dst`'s masked pixels so their per-channel mean matches `src`'s.
///
/// Pixels outside the mask are returned untouched.
pub fn color_transfer(src: &RgbImage, dst: &RgbImage, mask: &Mask) -> Result<RgbImage> {
    ensure_same_size(src, dst, mask)?;

    let mut sum_src = [0i64; 3];
    let mut sum_dst = [0i64; 3];
    let mut count = 0i64;
    for (x, y) in masked_coords(mask) {
        let s = src.get_pixel(x, y);
        let d = dst.get_pixel(x, y);
        for c in 0..3 {
            sum_src[c] += s[c] as i64;
            sum_dst[c] += d[c] as i64;
        }
        count += 1;
    }

    let mut out = dst.clone();
    if count == 0 {
        return Ok(out);
    }

    let mut shift = [0f64; 3];
    for c in 0..3 {
        shift[c] = (sum_src[c] - sum_dst[c]) as f64 / count as f64;
    }
    for (x, y) in masked_coords(mask) {
        let px = out.get_pixel_mut(x, y);
        for c in 0..3 {
            px[c] = (px[c] as f64 + shift[c]).clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Signed distance from `p` to a convex polygon: positive inside, zero on the
/// boundary, negative outside.
pub fn signed_distance(hull: &[Point<i32>], p: (f32, f32)) -> f32 {
    match hull.len() {
        0 => return f32::NEG_INFINITY,
        1 => {
            let d = dist_to_segment(hull[0], hull[0], p);
            return -d;
        }
        _ => {}
    }

    let mut min_edge = f32::INFINITY;
    let mut pos = false;
    let mut neg = false;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        min_edge = min_edge.min(dist_to_segment(a, b, p));
        let cross = (b.x - a.x) as f32 * (p.1 - a.y as f32) - (b.y - a.y) as f32 * (p.0 - a.x as f32);
        if cross > 0.0 {
            pos = true;
        } else if cross < 0.0 {
            neg = true;
        }
    }

    if min_edge == 0.0 {
        0.0
    } else if hull.len() >= 3 && !(pos && neg) {
        min_edge
    } else {
        -min_edge
    }
}

fn dist_to_segment(a: Point<i32>, b: Point<i32>, p: (f32, f32)) -> f32 {
    let (ax, ay) = (a.x as f32, a.y as f32);
    let (bx, by) = (b.x as f32, b.y as f32);
    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.0 - ax) * dx + (p.1 - ay) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Convex hull of the masked pixels. Only the left- and right-most pixel of
/// each row can be a hull vertex, so only those are handed to the hull.
pub fn mask_hull(mask: &Mask) -> Vec<Point<i32>> {
    let mut extremes = Vec::new();
    for (y, row) in mask.rows().into_iter().enumerate() {
        let mut first = None;
        let mut last = None;
        for (x, v) in row.iter().enumerate() {
            if *v != 0.0 {
                first.get_or_insert(x);
                last = Some(x);
            }
        }
        if let (Some(f), Some(l)) = (first, last) {
            extremes.push(Point::new(f as i32, y as i32));
            if l != f {
                extremes.push(Point::new(l as i32, y as i32));
            }
        }
    }
    if extremes.is_empty() {
        return extremes;
    }
    convex_hull(extremes.as_slice())
}

/// Per-pixel alpha for [`blend`]: the distance of each masked pixel to the
/// hull of the mask divided by the feather width, clipped to `[0, 1]`.
/// Unmasked pixels get zero.
pub fn feather_weights(mask: &Mask, feather_fraction: f32) -> Array2<f32> {
    let mut weights = Array2::zeros(mask.dim());
    let hull = mask_hull(mask);
    if hull.is_empty() {
        return weights;
    }

    let (min_x, max_x) = minmax(hull.iter().map(|p| p.x));
    let (min_y, max_y) = minmax(hull.iter().map(|p| p.y));
    let face_size = (max_x - min_x).max(max_y - min_y) as f32;
    let feather = (feather_fraction * face_size).max(1.0);

    for (x, y) in masked_coords(mask) {
        let d = signed_distance(&hull, (x as f32, y as f32));
        weights[[y as usize, x as usize]] = (d / feather).clamp(0.0, 1.0);
    }
    weights
}

fn minmax(values: impl Iterator<Item = i32>) -> (i32, i32) {
    values.fold((i32::MAX, i32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Composite `fg` over `bg` inside the mask with a feathered edge.
///
/// The feather width is `feather_fraction` of the larger side of the masked
/// region's bounding box. Unmasked pixels are copied from `bg`.
pub fn blend(fg: &RgbImage, bg: &RgbImage, mask: &Mask, feather_fraction: f32) -> Result<RgbImage> {
    ensure_same_size(fg, bg, mask)?;
    let weights = feather_weights(mask, feather_fraction);

    let mut out = bg.clone();
    for (x, y) in masked_coords(mask) {
        let w = weights[[y as usize, x as usize]];
        let f = fg.get_pixel(x, y);
        let px = out.get_pixel_mut(x, y);
        for c in 0..3 {
            px[c] = (w * f[c] as f32 + (1.0 - w) * px[c] as f32) as u8;
        }
    }
    Ok(out)
}

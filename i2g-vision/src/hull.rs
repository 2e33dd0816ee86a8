//! Face-region masks rasterized from landmark hulls.
//!
//! Four strategies share one contract: given a landmark set and an image size,
//! fill one or more convex hulls and return a binary mask. Every strategy is
//! clipped to the convex hull of the full landmark set.

use std::ops::Range;

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::landmarks::{gather, region, LandmarkSet, POINTS_68};
use crate::mask::{self, Mask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HullKind {
    /// Convex hull of every landmark.
    Full,
    /// Region hulls with the eyebrows pushed up towards the forehead.
    Extended,
    /// Union of per-region hulls: jaw halves, cheeks, eyes, nose.
    Components,
    /// Jaw and mouth, nose ridge, and the eye band, without the forehead.
    FaceHull,
}

impl HullKind {
    pub const ALL: [HullKind; 4] = [
        HullKind::Full,
        HullKind::Extended,
        HullKind::Components,
        HullKind::FaceHull,
    ];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Rasterize this strategy's polygons into a `width x height` 0/1 mask.
    ///
    /// Region tables assume the 68-point layout; any other point count is
    /// rasterized as [`HullKind::Full`].
    pub fn rasterize(self, landmarks: &LandmarkSet, width: u32, height: u32) -> Mask {
        let points = landmarks.pixel_points();
        let full = fill_hulls(&[points.clone()], width, height);

        let parts = match self {
            _ if points.len() != POINTS_68 => return mask::from_gray(&full),
            HullKind::Full => return mask::from_gray(&full),
            HullKind::Extended => component_parts(&raise_eyebrows(&points)),
            HullKind::Components => component_parts(&points),
            HullKind::FaceHull => face_hull_parts(&points),
        };

        let mut canvas = fill_hulls(&parts, width, height);
        for (px, clip) in canvas.pixels_mut().zip(full.pixels()) {
            px[0] = px[0].min(clip[0]);
        }
        mask::from_gray(&canvas)
    }
}

/// Pick a strategy uniformly at random and rasterize it.
pub fn synthesize<R: Rng + ?Sized>(
    landmarks: &LandmarkSet,
    width: u32,
    height: u32,
    rng: &mut R,
) -> (HullKind, Mask) {
    let kind = HullKind::random(rng);
    log::trace!("hull strategy {:?}", kind);
    (kind, kind.rasterize(landmarks, width, height))
}

fn single(i: usize) -> Range<usize> {
    i..i + 1
}

fn component_parts(p: &[Point<i32>]) -> Vec<Vec<Point<i32>>> {
    vec![
        // right jaw
        gather(p, &[0..9, single(17)]),
        // left jaw
        gather(p, &[8..17, single(26)]),
        // right cheek
        gather(p, &[17..20, single(8)]),
        // left cheek
        gather(p, &[24..27, single(8)]),
        // nose ridge
        gather(p, &[19..25, single(8)]),
        // right eye
        gather(p, &[region::RIGHT_EYEBROW, single(27), region::NOSTRILS, single(8)]),
        // left eye
        gather(p, &[region::LEFT_EYEBROW, single(27), region::NOSTRILS, single(8)]),
        // nose
        gather(p, &[region::NOSE_RIDGE, region::NOSTRILS]),
    ]
}

fn face_hull_parts(p: &[Point<i32>]) -> Vec<Vec<Point<i32>>> {
    vec![
        gather(p, &[region::JAW, region::MOUTH, single(0), single(8), single(16)]),
        gather(p, &[region::NOSE_RIDGE, single(33)]),
        gather(p, &[17..27, single(0), single(27), single(16), single(33)]),
    ]
}

fn mid(a: Point<i32>, b: Point<i32>) -> Point<i32> {
    Point::new((a.x + b.x).div_euclid(2), (a.y + b.y).div_euclid(2))
}

/// Move each eyebrow point away from the eye below it by half their offset.
fn raise_eyebrows(p: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut out = p.to_vec();

    let outer_right = mid(p[36], mid(p[36], p[0]));
    let outer_left = mid(p[45], mid(p[16], p[45]));
    let below_right = [outer_right, p[36], p[37], p[38], p[39]];
    let below_left = [p[42], p[43], p[44], p[45], outer_left];

    for (i, bot) in region::RIGHT_EYEBROW.zip(below_right) {
        let top = p[i];
        out[i] = Point::new(
            top.x + (top.x - bot.x).div_euclid(2),
            top.y + (top.y - bot.y).div_euclid(2),
        );
    }
    for (i, bot) in region::LEFT_EYEBROW.zip(below_left) {
        let top = p[i];
        out[i] = Point::new(
            top.x + (top.x - bot.x).div_euclid(2),
            top.y + (top.y - bot.y).div_euclid(2),
        );
    }
    out
}

fn fill_hulls(parts: &[Vec<Point<i32>>], width: u32, height: u32) -> GrayImage {
    let mut canvas = GrayImage::new(width, height);
    let white = Luma([255u8]);
    for part in parts {
        if part.is_empty() {
            continue;
        }
        let hull = convex_hull(part.as_slice());
        match hull.len() {
            0 => {}
            1 | 2 => {
                let a = hull[0];
                let b = hull[hull.len() - 1];
                draw_line_segment_mut(
                    &mut canvas,
                    (a.x as f32, a.y as f32),
                    (b.x as f32, b.y as f32),
                    white,
                );
            }
            _ => draw_polygon_mut(&mut canvas, &hull, white),
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn face() -> LandmarkSet {
        LandmarkSet::template_68(16.0, 12.0, 96.0, 104.0)
    }

    #[test]
    fn every_kind_is_binary_and_inside_full_hull() {
        let lm = face();
        let full = HullKind::Full.rasterize(&lm, 128, 128);
        for kind in HullKind::ALL {
            let m = kind.rasterize(&lm, 128, 128);
            assert_eq!(m.dim(), (128, 128));
            assert!(m.iter().all(|&v| v == 0.0 || v == 1.0), "{kind:?}");
            assert!(m.iter().any(|&v| v > 0.0), "{kind:?} empty");
            for (v, f) in m.iter().zip(full.iter()) {
                assert!(*v <= *f, "{kind:?} outside the full hull");
            }
        }
    }

    #[test]
    fn components_smaller_than_full() {
        let lm = face();
        let full: f32 = HullKind::Full.rasterize(&lm, 128, 128).sum();
        let comp: f32 = HullKind::Components.rasterize(&lm, 128, 128).sum();
        let face_hull: f32 = HullKind::FaceHull.rasterize(&lm, 128, 128).sum();
        assert!(comp < full);
        assert!(face_hull <= full);
    }

    #[test]
    fn order_within_group_does_not_matter() {
        let lm = face();
        let mut shuffled = lm.clone();
        // reverse the mouth points, which all land in a single hull
        for (i, j) in (48..68).zip((48..68).rev()) {
            shuffled.points[[i, 0]] = lm.points[[j, 0]];
            shuffled.points[[i, 1]] = lm.points[[j, 1]];
        }
        for kind in [HullKind::Full, HullKind::FaceHull] {
            assert_eq!(
                kind.rasterize(&lm, 128, 128),
                kind.rasterize(&shuffled, 128, 128)
            );
        }
    }

    #[test]
    fn order_within_region_parts_does_not_matter() {
        let lm = face();
        let mut shuffled = lm.clone();
        // reverse the nostrils (33 stays in the middle) and swap the lower
        // lid points of the right eye
        let swaps = region::NOSTRILS.zip(region::NOSTRILS.rev()).chain([(40, 41), (41, 40)]);
        for (i, j) in swaps {
            shuffled.points[[i, 0]] = lm.points[[j, 0]];
            shuffled.points[[i, 1]] = lm.points[[j, 1]];
        }
        assert_ne!(shuffled, lm);
        for kind in HullKind::ALL {
            assert_eq!(
                kind.rasterize(&lm, 128, 128),
                kind.rasterize(&shuffled, 128, 128),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn non_68_point_sets_fall_back_to_full() {
        let lm = LandmarkSet::from_points(&[(10.0, 10.0), (50.0, 12.0), (30.0, 60.0), (12.0, 40.0)]);
        let full = HullKind::Full.rasterize(&lm, 64, 64);
        assert_eq!(HullKind::Components.rasterize(&lm, 64, 64), full);
        assert!(full[[30, 30]] == 1.0);
        assert!(full[[2, 2]] == 0.0);
    }

    #[test]
    fn degenerate_points_do_not_panic() {
        let lm = LandmarkSet::from_points(&[(5.0, 5.0), (5.0, 5.0)]);
        let m = HullKind::Full.rasterize(&lm, 16, 16);
        assert!(m.sum() <= 1.0);
    }

    #[test]
    fn random_choice_covers_all_kinds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(HullKind::random(&mut rng));
        }
        assert_eq!(seen.len(), 4);
    }
}

use anyhow::Result;
use i2g_vision::postprocess::{self, PerturbParams};
use i2g_vision::{augment, blend, hull, mask, BlurParams, ElasticParams, HullKind, LandmarkSet};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn face() -> LandmarkSet {
    LandmarkSet::template_68(24.0, 20.0, 80.0, 88.0)
}

fn mean_inside(img: &RgbImage, m: &mask::Mask, c: usize) -> f64 {
    let mut sum = 0.0;
    let mut n = 0.0;
    for ((y, x), v) in m.indexed_iter() {
        if *v > 0.0 {
            sum += img.get_pixel(x as u32, y as u32)[c] as f64;
            n += 1.0;
        }
    }
    sum / n
}

/// Run the forged-sample steps on flat synthetic images.
#[test]
fn test_donor_is_color_matched_and_blended() -> Result<()> {
    env_logger::try_init().ok();
    let target = RgbImage::from_pixel(128, 128, Rgb([180, 120, 90]));
    let donor = RgbImage::from_fn(128, 128, |x, _| Rgb([60, 60 + (x % 20) as u8, 200]));

    let face_mask = HullKind::Full.rasterize(&face(), 128, 128);
    let matched = blend::color_transfer(&target, &donor, &face_mask)?;
    for c in 0..3 {
        let got = mean_inside(&matched, &face_mask, c);
        let want = mean_inside(&target, &face_mask, c);
        assert!((got - want).abs() < 1.5, "channel {}: {} vs {}", c, got, want);
    }

    let out = blend::blend(&matched, &target, &face_mask, 0.2)?;
    assert_eq!(out.dimensions(), (128, 128));
    // outside the face the target survives untouched
    assert_eq!(out.get_pixel(2, 2), target.get_pixel(2, 2));
    assert_eq!(out.get_pixel(125, 125), target.get_pixel(125, 125));
    // the face center takes the donor's texture
    let center = out.get_pixel(64, 64);
    assert_eq!(center, matched.get_pixel(64, 64));
    println!("✓ blended center {:?}", center);
    Ok(())
}

#[test]
fn test_every_strategy_yields_a_usable_soft_mask() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let elastic = ElasticParams::default();
    let blur = BlurParams::default();

    for _ in 0..12 {
        let (kind, hard) = hull::synthesize(&face(), 128, 128, &mut rng);
        let soft = postprocess::elastic_deform(&hard, &elastic, &mut rng);
        let soft = postprocess::gaussian_blur(&soft, &blur);
        assert_eq!(soft.dim(), (128, 128));
        assert!(soft.iter().all(|v| (-1e-4..=1.0 + 1e-4).contains(v)), "{kind:?}");
        assert!(soft.sum() > 0.0, "{kind:?} produced an empty mask");
        // corners stay outside every hull
        assert!(soft[[0, 0]] < 1e-3 && soft[[127, 127]] < 1e-3, "{kind:?}");
    }
    Ok(())
}

#[test]
fn test_mismatched_sizes_are_rejected() {
    let a = RgbImage::new(64, 64);
    let b = RgbImage::new(32, 64);
    let m = HullKind::Full.rasterize(&face(), 64, 64);
    assert!(blend::color_transfer(&a, &b, &m).is_err());
    assert!(blend::blend(&a, &b, &m, 0.2).is_err());
}

#[test]
fn test_flip_keeps_image_and_mask_aligned() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let img = RgbImage::from_fn(64, 64, |x, _| Rgb([(x * 4) as u8, 0, 0]));
    let m = postprocess::perturb(
        &HullKind::Components.rasterize(&LandmarkSet::template_68(4.0, 4.0, 40.0, 44.0), 64, 64),
        &PerturbParams::default(),
        &mut rng,
    );
    let (fi, fm) = augment::flip_pair(&img, &m);
    assert_eq!(fi.get_pixel(0, 10), img.get_pixel(63, 10));
    assert_eq!(fm[[10, 0]], m[[10, 63]]);
    assert_eq!(fm[[30, 20]], m[[30, 43]]);

    let jpeg = augment::random_jpeg(&fi, 60, 100, &mut rng)?;
    assert_eq!(jpeg.dimensions(), fi.dimensions());
    Ok(())
}

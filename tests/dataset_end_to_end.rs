use std::cell::Cell;
use std::path::{Path, PathBuf};

use anyhow::Result;
use i2g::config::Config;
use i2g::matcher::session_prefix;
use i2g::{cache, Error, I2gDataset, Label, LandmarkCache, LandmarkSet, SamplePipelines};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

const SIDE: u32 = 96;

fn face_landmarks() -> LandmarkSet {
    LandmarkSet::template_68(16.0, 12.0, 64.0, 72.0)
}

/// Write `sessions` x `per_session` gradient images named `s{k}_{j}.png`.
fn write_faces(root: &Path, prefix: &str, sessions: usize, per_session: usize) -> Result<PathBuf> {
    let dir = root.join("real");
    std::fs::create_dir_all(&dir)?;
    for k in 0..sessions {
        for j in 0..per_session {
            let base = (k * 40 + j * 7) as u32;
            let img = RgbImage::from_fn(SIDE, SIDE, |x, y| {
                Rgb([
                    ((base + x) % 256) as u8,
                    ((base * 3 + y) % 256) as u8,
                    ((base + x + y) % 256) as u8,
                ])
            });
            img.save(dir.join(format!("{prefix}{k}_{j}.png")))?;
        }
    }
    Ok(dir)
}

fn open_dataset(dir: &Path, cfg: Config, seed: u64) -> Result<I2gDataset> {
    let mut detector = |_: &RgbImage| -> anyhow::Result<Option<LandmarkSet>> { Ok(Some(face_landmarks())) };
    let path = cache::ensure_built(dir, &mut detector)?;
    let cache = LandmarkCache::load(&path)?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(I2gDataset::new(cfg, dir, cache, &mut rng))
}

#[test]
fn test_generates_balanced_labeled_samples() -> Result<()> {
    env_logger::try_init().ok();
    let tmp = tempfile::tempdir()?;
    let dir = write_faces(tmp.path(), "s", 5, 2)?;

    let cfg = Config {
        load_size: 256,
        max_dataset_size: Some(10),
        ..Config::default()
    };
    let dataset = open_dataset(&dir, cfg, 7)?;
    assert_eq!(dataset.len(), 10);

    let mut rng = StdRng::seed_from_u64(42);
    let mut real = 0;
    let mut forged = 0;
    for i in 0..100 {
        let dp = dataset.get_with_rng(i % dataset.len(), &mut rng)?;
        assert_eq!(dp.image.dimensions(), (256, 256));
        assert_eq!(dp.mask.dim(), (256, 256));
        assert!(dp.mask.iter().all(|v| (0.0..=1.0).contains(v)));

        match dp.label {
            Label::Real => {
                real += 1;
                assert!(dp.mask.iter().all(|&v| v == 1.0));
                assert!(dp.provenance.donor.is_none());
            }
            Label::Forged => {
                forged += 1;
                let donor = dp.provenance.donor.as_deref().expect("forged sample has a donor");
                assert_ne!(session_prefix(donor, '_'), session_prefix(&dp.provenance.id, '_'));
                assert!(dp.provenance.hull.is_some());
                // 1 marks authentic pixels: the corners lie outside every hull,
                // the face center inside all of them; both survive a flip
                for (y, x) in [(0, 0), (0, 255), (255, 0), (255, 255)] {
                    assert!(dp.mask[[y, x]] > 0.95, "corner ({}, {}) = {}", x, y, dp.mask[[y, x]]);
                }
                assert!(dp.mask[[128, 128]] < 0.05, "face center = {}", dp.mask[[128, 128]]);
            }
        }
    }

    println!("✓ {} real, {} forged", real, forged);
    assert!((35..=65).contains(&real), "real = {}", real);
    assert_eq!(real + forged, 100);
    Ok(())
}

#[test]
fn test_single_session_cannot_forge() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = write_faces(tmp.path(), "a", 1, 4)?;
    let dataset = open_dataset(&dir, Config::default(), 1)?;

    let mut rng = StdRng::seed_from_u64(9);
    let mut empty_pool = 0;
    for i in 0..20 {
        match dataset.get_with_rng(i % dataset.len(), &mut rng) {
            Ok(dp) => assert_eq!(dp.label, Label::Real),
            Err(Error::EmptyCandidatePool { .. }) => empty_pool += 1,
            Err(e) => return Err(e.into()),
        }
    }
    assert!(empty_pool > 0);
    Ok(())
}

#[test]
fn test_cache_is_built_once() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = write_faces(tmp.path(), "s", 5, 2)?;

    let calls = Cell::new(0);
    let mut detector = |_: &RgbImage| -> anyhow::Result<Option<LandmarkSet>> {
        calls.set(calls.get() + 1);
        Ok(Some(face_landmarks()))
    };

    let first = cache::ensure_built(&dir, &mut detector)?;
    assert_eq!(calls.get(), 10);
    let before = std::fs::read(&first)?;

    let second = cache::ensure_built(&dir, &mut detector)?;
    assert_eq!(first, second);
    assert_eq!(calls.get(), 10);
    assert_eq!(std::fs::read(&second)?, before);

    let cache = LandmarkCache::load(&second)?;
    assert_eq!(cache.len(), 10);
    assert_eq!(cache.ids()[0], "s0_0.png");
    assert_eq!(cache.get("s4_1.png"), Some(&face_landmarks()));
    Ok(())
}

#[test]
fn test_faceless_images_are_left_out() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = write_faces(tmp.path(), "s", 3, 2)?;
    std::fs::write(dir.join("notes.txt"), "not an image")?;

    let mut detector = |img: &RgbImage| -> anyhow::Result<Option<LandmarkSet>> {
        // only the first session has a red top-left value below 40
        Ok((img.get_pixel(0, 0)[0] >= 40).then(face_landmarks))
    };
    let path = cache::ensure_built(&dir, &mut detector)?;
    let cache = LandmarkCache::load(&path)?;
    assert_eq!(cache.len(), 4);
    assert!(cache.ids().iter().all(|id| !id.starts_with("s0_")));
    Ok(())
}

#[test]
fn test_open_and_sample_tensors() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = write_faces(tmp.path(), "s", 3, 2)?;
    let cfg = Config {
        load_size: 64,
        fine_size: 48,
        ..Config::default()
    };

    let mut detector = |_: &RgbImage| -> anyhow::Result<Option<LandmarkSet>> { Ok(Some(face_landmarks())) };
    let dataset = I2gDataset::open(cfg.clone(), &dir, &mut detector)?;
    let pipelines = SamplePipelines::new(&cfg, false);

    for i in 0..dataset.len() {
        let sample = dataset.sample(i, &pipelines)?;
        assert_eq!(sample.img.dim(), (3, 48, 48));
        assert_eq!(sample.mask.dim(), (1, 48, 48));
        assert!(sample.label <= 1);
        assert!(sample.img.iter().all(|v| (0.0..=1.0).contains(v)));
    }
    Ok(())
}

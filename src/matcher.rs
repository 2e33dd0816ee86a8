use i2g_vision::LandmarkSet;
use log::debug;
use rand::seq::index;
use rand::Rng;

use crate::cache::LandmarkCache;
use crate::error::{Error, Result};

/// Sum of the Euclidean distances between corresponding landmarks.
pub fn total_euclidean_distance(a: &LandmarkSet, b: &LandmarkSet) -> Result<f32> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            left: a.shape(),
            right: b.shape(),
        });
    }
    Ok(a.points
        .rows()
        .into_iter()
        .zip(b.points.rows())
        .map(|(p, q)| ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)).sqrt())
        .sum())
}

/// Capture session of an image: its file name up to the first `separator`.
pub fn session_prefix(id: &str, separator: char) -> &str {
    let name = id.rsplit('/').next().unwrap_or(id);
    name.split(separator).next().unwrap_or(name)
}

#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub sample_num: usize,
    pub separator: char,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            sample_num: 50,
            separator: '_',
        }
    }
}

fn best_of<'a>(
    target_id: &str,
    target: &LandmarkSet,
    candidates: impl Iterator<Item = &'a String>,
    cache: &LandmarkCache,
    separator: char,
) -> Result<Option<&'a String>> {
    let session = session_prefix(target_id, separator);
    let mut best: Option<(&String, f32)> = None;
    for candidate in candidates {
        if session_prefix(candidate, separator) == session {
            continue;
        }
        let Some(landmarks) = cache.get(candidate) else {
            continue;
        };
        let dist = total_euclidean_distance(landmarks, target)?;
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((candidate, dist));
        }
    }
    Ok(best.map(|(id, _)| id))
}

/// Find the donor whose landmarks are closest to `target`.
///
/// Draws `sample_num` ids from `pool` without replacement, drops those from
/// the target's session and returns the nearest one; ties go to the first
/// drawn. Fails with [`Error::EmptyCandidatePool`] when nothing is left.
pub fn find_best_match<R: Rng + ?Sized>(
    target_id: &str,
    target: &LandmarkSet,
    pool: &[String],
    cache: &LandmarkCache,
    params: &SearchParams,
    rng: &mut R,
) -> Result<String> {
    let amount = params.sample_num.min(pool.len());
    let drawn = index::sample(rng, pool.len(), amount);
    let candidates = drawn.iter().map(|i| &pool[i]);
    best_of(target_id, target, candidates, cache, params.separator)?
        .cloned()
        .ok_or_else(|| Error::EmptyCandidatePool {
            id: target_id.to_string(),
        })
}

/// [`find_best_match`], falling back to a scan of the whole pool when the
/// random draw only hit the target's own session.
pub fn find_best_match_relaxed<R: Rng + ?Sized>(
    target_id: &str,
    target: &LandmarkSet,
    pool: &[String],
    cache: &LandmarkCache,
    params: &SearchParams,
    rng: &mut R,
) -> Result<String> {
    match find_best_match(target_id, target, pool, cache, params, rng) {
        Err(Error::EmptyCandidatePool { .. }) => {
            debug!("no donor drawn for {}, scanning the whole pool", target_id);
            best_of(target_id, target, pool.iter(), cache, params.separator)?
                .cloned()
                .ok_or_else(|| Error::EmptyCandidatePool {
                    id: target_id.to_string(),
                })
        }
        other => other,
    }
}

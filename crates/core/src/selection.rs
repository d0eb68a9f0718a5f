//! Active-set selection policy: which questions to seed, backfill, and present.
//!
//! All functions are pure over an injected random source so callers can seed it.

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::HashSet;

use crate::model::QuestionId;

/// Removes duplicate ids, keeping the first occurrence of each.
#[must_use]
pub fn dedup_pool(pool: &[QuestionId]) -> Vec<QuestionId> {
    let mut seen = HashSet::with_capacity(pool.len());
    pool.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

/// Picks `min(size, distinct pool ids)` questions uniformly without replacement.
pub fn sample_initial<R: Rng + ?Sized>(
    pool: &[QuestionId],
    size: usize,
    rng: &mut R,
) -> Vec<QuestionId> {
    let mut candidates = dedup_pool(pool);
    let take = size.min(candidates.len());
    let (chosen, _) = candidates.partial_shuffle(rng, take);
    chosen.to_vec()
}

/// Pool ids that are neither mastered nor active, in pool order.
#[must_use]
pub fn available_candidates(pool: &[QuestionId], used: &HashSet<QuestionId>) -> Vec<QuestionId> {
    dedup_pool(pool)
        .into_iter()
        .filter(|id| !used.contains(id))
        .collect()
}

/// Picks one replacement question uniformly from the unused part of the pool.
///
/// Returns `None` once every pool id has been used.
pub fn pick_backfill<R: Rng + ?Sized>(
    pool: &[QuestionId],
    used: &HashSet<QuestionId>,
    rng: &mut R,
) -> Option<QuestionId> {
    available_candidates(pool, used).choose(rng).cloned()
}

/// Picks the next question to present from the active set.
pub fn pick_next<R: Rng + ?Sized>(active: &[QuestionId], rng: &mut R) -> Option<QuestionId> {
    active.choose(rng).cloned()
}

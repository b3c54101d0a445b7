//! Slot candidate selection and ranking.

use std::cmp::Reverse;

use crate::aspects::{Aspects, magnitude, magnitude_of, sphere_matches};
use crate::snapshot::SphereSpec;

/// What ranking needs to know about one element stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFacts {
    pub element_id: String,
    pub aspects: Aspects,
    pub aspects_and_self: Aspects,
}

/// A stack can fill `slot` if it satisfies the slot's constraints and
/// carries at least one of the recipe's requirement keys (counting its own
/// element id).
pub fn is_candidate(slot: &SphereSpec, facts: &CandidateFacts, requirement_keys: &[String]) -> bool {
    sphere_matches(slot, &facts.aspects_and_self)
        && requirement_keys
            .iter()
            .any(|key| facts.aspects_and_self.contains_key(key))
}

/// Order candidates best first: desired elements, then by the intensity of
/// the recipe's requirement aspects, then by total intensity. Ties keep
/// their input order.
pub fn rank_candidates<T>(
    mut candidates: Vec<(T, CandidateFacts)>,
    requirement_keys: &[String],
    desired_element_ids: &[String],
) -> Vec<T> {
    candidates.sort_by_cached_key(|(_, facts)| {
        Reverse((
            desired_element_ids.contains(&facts.element_id),
            magnitude_of(&facts.aspects, requirement_keys.iter().map(String::as_str)),
            magnitude(&facts.aspects),
        ))
    });
    candidates.into_iter().map(|(item, _)| item).collect()
}

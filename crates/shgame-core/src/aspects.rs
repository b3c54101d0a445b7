//! Aspect sets and the matching rules used by slots and terrain unlocks.
//!
//! A requirement maps aspect ids to intensities:
//!
//! - a positive value `v` asks for at least `v` of the aspect;
//! - a negative value `-v` asks for strictly less than `v`;
//! - zero asks for the aspect to be absent.
//!
//! A missing aspect counts as intensity 0.

use std::collections::BTreeMap;

use crate::snapshot::SphereSpec;

/// Ordered map of aspect id to intensity.
pub type Aspects = BTreeMap<String, i32>;

/// Aspects a recipe may require that only some workstations accept.
pub const DEFAULT_WORKSTATION_FILTER_ASPECTS: &[&str] = &[
    "edge", "film", "forge", "grail", "heart", "knock", "lantern", "moon", "moth", "nectar",
    "readable", "record.phonograph", "rose", "scale", "sky", "winter",
];

/// Sum of all intensities.
pub fn magnitude(aspects: &Aspects) -> i32 {
    aspects.values().sum()
}

/// Sum of the intensities of `keys` only.
pub fn magnitude_of<'a>(aspects: &Aspects, keys: impl IntoIterator<Item = &'a str>) -> i32 {
    keys.into_iter()
        .filter_map(|key| aspects.get(key))
        .sum()
}

fn intensity(aspects: &Aspects, key: &str) -> i32 {
    aspects.get(key).copied().unwrap_or(0)
}

fn matches_one(aspects: &Aspects, key: &str, required: i32) -> bool {
    let have = intensity(aspects, key);
    match required {
        v if v > 0 => have >= v,
        v if v < 0 => have < -v,
        _ => have <= 0,
    }
}

/// True if `aspects` satisfies every entry of `requirement`.
pub fn aspects_match(aspects: &Aspects, requirement: &Aspects) -> bool {
    requirement
        .iter()
        .all(|(key, &value)| matches_one(aspects, key, value))
}

/// True if `aspects` satisfies at least one entry of `requirement`. `None`
/// when the requirement is empty, so callers can treat "no constraint"
/// differently from "no match".
pub fn aspects_match_any(aspects: &Aspects, requirement: &Aspects) -> Option<bool> {
    if requirement.is_empty() {
        return None;
    }
    Some(
        requirement
            .iter()
            .any(|(key, &value)| matches_one(aspects, key, value)),
    )
}

/// Essential: all. Required: any, empty is unconstrained. Forbidden: none,
/// empty is unconstrained.
pub fn constraints_match(
    aspects: &Aspects,
    essential: &Aspects,
    required: &Aspects,
    forbidden: &Aspects,
) -> bool {
    aspects_match(aspects, essential)
        && aspects_match_any(aspects, required) != Some(false)
        && aspects_match_any(aspects, forbidden) != Some(true)
}

/// [`constraints_match`] against a slot's spec.
pub fn sphere_matches(spec: &SphereSpec, aspects: &Aspects) -> bool {
    constraints_match(aspects, &spec.essential, &spec.required, &spec.forbidden)
}

/// True if any of `keys` is present with a positive intensity.
pub fn has_any_aspect<'a>(aspects: &Aspects, keys: impl IntoIterator<Item = &'a str>) -> bool {
    keys.into_iter().any(|key| intensity(aspects, key) > 0)
}

/// Build an aspect map from pairs.
pub fn aspects<'a>(pairs: impl IntoIterator<Item = (&'a str, i32)>) -> Aspects {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

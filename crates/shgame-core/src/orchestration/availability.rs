//! Which situations can host a recipe.

use regex::Regex;

use crate::snapshot::SphereSpec;

use super::recipe::RecipeDef;

/// How a recipe's action id is compared to a situation's verb.
#[derive(Debug, Clone)]
enum VerbMatcher {
    Any,
    Exact(String),
    Pattern(Regex),
}

impl VerbMatcher {
    fn new(action_id: Option<&str>) -> Self {
        let Some(action_id) = action_id else {
            return VerbMatcher::Any;
        };
        if !action_id.contains('*') {
            return VerbMatcher::Exact(action_id.to_string());
        }
        let body = action_id
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("(?:.*)");
        match Regex::new(&format!("^{body}$")) {
            Ok(pattern) => VerbMatcher::Pattern(pattern),
            Err(_) => VerbMatcher::Exact(action_id.to_string()),
        }
    }

    fn matches(&self, verb_id: &str) -> bool {
        match self {
            VerbMatcher::Any => true,
            VerbMatcher::Exact(action_id) => action_id == verb_id,
            VerbMatcher::Pattern(pattern) => pattern.is_match(verb_id),
        }
    }
}

/// The recipe-derived half of the availability check, computed once per
/// orchestration.
#[derive(Debug, Clone)]
pub struct SituationRequirements {
    verb: VerbMatcher,
    /// Recipe requirement keys that workstations must accept.
    recipe_aspects: Vec<String>,
}

impl SituationRequirements {
    pub fn new(recipe: &RecipeDef, workstation_filter_aspects: &[String]) -> Self {
        let recipe_aspects = recipe
            .requirement_keys()
            .filter(|key| workstation_filter_aspects.iter().any(|a| a == *key))
            .map(str::to_string)
            .collect();
        Self {
            verb: VerbMatcher::new(recipe.action_id.as_deref()),
            recipe_aspects,
        }
    }

    /// True if a situation with `verb_id` and `thresholds` can run the
    /// recipe under the user's `aspects_filter`.
    pub fn is_available(
        &self,
        verb_id: &str,
        thresholds: &[SphereSpec],
        aspects_filter: &[String],
    ) -> bool {
        self.verb.matches(verb_id)
            && aspects_filter
                .iter()
                .chain(self.recipe_aspects.iter())
                .all(|aspect| accepts_aspect(thresholds, aspect))
    }
}

/// Some threshold lists `aspect` as essential or required without
/// forbidding it.
pub fn accepts_aspect(thresholds: &[SphereSpec], aspect: &str) -> bool {
    thresholds.iter().any(|threshold| {
        (threshold.essential.contains_key(aspect) || threshold.required.contains_key(aspect))
            && !threshold.forbidden.contains_key(aspect)
    })
}

//! Recipe definitions and the catalog they are looked up in.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::aspects::Aspects;
use crate::error::ConfigError;

/// Requirement keys with this prefix name a skill element.
const SKILL_PREFIX: &str = "s.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDef {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Verb the recipe runs on. A `*` matches any run of characters.
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub requirements: Aspects,
}

impl RecipeDef {
    pub fn requirement_keys(&self) -> impl Iterator<Item = &str> {
        self.requirements.keys().map(String::as_str)
    }

    /// The skill element this recipe is built around, if any.
    pub fn skill_requirement(&self) -> Option<&str> {
        self.requirement_keys()
            .find(|key| key.starts_with(SKILL_PREFIX))
    }
}

/// Lookup of recipes by id.
pub trait RecipeCatalog {
    fn recipe(&self, recipe_id: &str) -> Option<Rc<RecipeDef>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRecipeCatalog {
    recipes: BTreeMap<String, Rc<RecipeDef>>,
}

impl InMemoryRecipeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of recipe definitions.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let recipes: Vec<RecipeDef> =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                detail: e.to_string(),
            })?;
        let mut catalog = Self::new();
        for recipe in recipes {
            catalog.insert(recipe);
        }
        Ok(catalog)
    }

    /// Add or replace a recipe.
    pub fn insert(&mut self, recipe: RecipeDef) -> Rc<RecipeDef> {
        let recipe = Rc::new(recipe);
        self.recipes.insert(recipe.id.clone(), Rc::clone(&recipe));
        recipe
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl RecipeCatalog for InMemoryRecipeCatalog {
    fn recipe(&self, recipe_id: &str) -> Option<Rc<RecipeDef>> {
        self.recipes.get(recipe_id).cloned()
    }
}

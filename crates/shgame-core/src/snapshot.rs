//! Typed payloads decoded from [`Token`] fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::Token;
use crate::aspects::Aspects;
use crate::error::TokenError;

/// A slot on a situation (or an unlock requirement) expressed as aspect
/// constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SphereSpec {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub essential: Aspects,
    #[serde(default)]
    pub required: Aspects,
    #[serde(default)]
    pub forbidden: Aspects,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SituationState {
    #[default]
    Unstarted,
    RequiringExecution,
    Ongoing,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStackSnapshot {
    pub element_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub aspects: Aspects,
    #[serde(default)]
    pub element_aspects: Option<Aspects>,
}

fn one() -> u32 {
    1
}

impl ElementStackSnapshot {
    /// Aspects plus the element itself at intensity 1, so requirements can
    /// name a specific element.
    pub fn aspects_and_self(&self) -> Aspects {
        let mut aspects = self.aspects.clone();
        aspects.entry(self.element_id.clone()).or_insert(1);
        aspects
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationSnapshot {
    pub verb_id: String,
    #[serde(default)]
    pub verb_label: Option<String>,
    #[serde(default)]
    pub verb_description: Option<String>,
    #[serde(default)]
    pub aspects: Aspects,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub thresholds: Vec<SphereSpec>,
    pub state: SituationState,
    #[serde(default)]
    pub recipe_id: Option<String>,
    #[serde(default)]
    pub recipe_label: Option<String>,
    #[serde(default)]
    pub current_recipe_id: Option<String>,
    #[serde(default)]
    pub current_recipe_label: Option<String>,
    #[serde(default)]
    pub time_remaining: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainSnapshot {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub shrouded: bool,
    #[serde(default)]
    pub unlock_essentials: Aspects,
    #[serde(default)]
    pub unlock_requirements: Aspects,
    #[serde(default)]
    pub unlock_forbiddens: Aspects,
}

/// Latest known state of one token: its sphere path plus the decoded
/// payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenState<P> {
    pub path: String,
    pub payload: P,
}

impl<P: DeserializeOwned> TokenState<P> {
    pub fn decode(token: &Token) -> Result<Self, TokenError> {
        let payload = serde_json::from_value(serde_json::Value::Object(token.fields.clone()))
            .map_err(|e| TokenError::Decode {
                id: token.id.clone(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            path: token.path.clone(),
            payload,
        })
    }
}

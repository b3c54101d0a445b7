//! Request/response contract with the running game.
//!
//! The transport is out of scope; hosts implement [`GameApi`] over whatever
//! channel reaches the game. Futures are local (`!Send`) because every
//! consumer runs on the single-threaded model runtime.

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::id::TokenId;

/// One entity as reported by a poll. Variant-specific fields stay as raw
/// JSON until a model decodes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: TokenId,
    pub payload_type: String,
    pub path: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Which tokens a poll asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFilter {
    pub sphere_prefixes: Vec<String>,
    pub payload_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub executed_recipe_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("transport failure: {detail}")]
    Transport { detail: String },
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

pub trait GameApi {
    fn get_all_tokens<'a>(
        &'a self,
        filter: &'a TokenFilter,
    ) -> LocalBoxFuture<'a, Result<Vec<Token>, ApiError>>;

    fn execute_token_at_path<'a>(
        &'a self,
        path: &'a str,
    ) -> LocalBoxFuture<'a, Result<ExecuteResult, ApiError>>;

    fn conclude_token_at_path<'a>(&'a self, path: &'a str)
    -> LocalBoxFuture<'a, Result<(), ApiError>>;

    /// Unlock the terrain at `terrain_path` by spending the stack at
    /// `stack_path`.
    fn unlock_terrain<'a>(
        &'a self,
        terrain_path: &'a str,
        stack_path: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), ApiError>>;
}

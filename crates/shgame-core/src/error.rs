//! Error types for synchronization, actions and configuration.

use crate::api::ApiError;
use crate::id::TokenId;

/// Errors raised while reconciling snapshots with token models.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("update for {found} delivered to model {expected}")]
    IdentityMismatch { expected: TokenId, found: TokenId },
    #[error("token {id} has been retired")]
    Retired { id: TokenId },
    #[error("token {id} changed payload type from {from} to {to}")]
    PayloadTypeChanged {
        id: TokenId,
        from: String,
        to: String,
    },
    #[error("token {id} has unknown payload type {payload_type:?}")]
    UnknownPayloadType { id: TokenId, payload_type: String },
    #[error("token {id} could not be decoded: {detail}")]
    Decode { id: TokenId, detail: String },
    #[error(transparent)]
    Transport(#[from] ApiError),
}

impl TokenError {
    /// Identity-class errors mean the local model registry can no longer be
    /// trusted and synchronization must stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TokenError::Transport(_))
    }
}

/// Errors from the terrain unlock workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnlockError {
    #[error("stack {stack_id} is not a valid unlock candidate")]
    InvalidCandidate { stack_id: TokenId },
}

/// Errors from the orchestrator service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("unknown recipe: {recipe_id}")]
    UnknownRecipe { recipe_id: String },
}

/// Errors while loading [`SyncConfig`](crate::config::SyncConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {detail}")]
    Parse { detail: String },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

//! Shared test helpers for unit and integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests and, through the `test-utils` feature, in the
//! integration test crate.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use serde_json::{Value, json};

use crate::api::{ApiError, ExecuteResult, GameApi, Token, TokenFilter};
use crate::snapshot::SphereSpec;

// ===========================================================================
// Fake game API
// ===========================================================================

/// One recorded action call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Execute { path: String },
    Conclude { path: String },
    UnlockTerrain { terrain_path: String, stack_path: String },
}

/// In-memory [`GameApi`] serving a fixed token list.
#[derive(Default)]
pub struct FakeApi {
    tokens: RefCell<Vec<Token>>,
    fetches: Cell<usize>,
    fetch_failures: RefCell<VecDeque<ApiError>>,
    fetch_gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    action_failure: RefCell<Option<ApiError>>,
    executed_label: RefCell<Option<String>>,
    calls: RefCell<Vec<ApiCall>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: Vec<Token>) -> Self {
        let api = Self::new();
        api.set_tokens(tokens);
        api
    }

    /// Tokens served by every later fetch.
    pub fn set_tokens(&self, tokens: Vec<Token>) {
        *self.tokens.borrow_mut() = tokens;
    }

    pub fn fail_next_fetch(&self, error: ApiError) {
        self.fetch_failures.borrow_mut().push_back(error);
    }

    /// Hold the next fetch until the returned sender fires (or is dropped).
    /// The token list is read when the fetch resumes.
    pub fn defer_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.fetch_gates.borrow_mut().push_back(rx);
        tx
    }

    /// Make every action call fail with `error`, or succeed again on `None`.
    pub fn fail_actions(&self, error: Option<ApiError>) {
        *self.action_failure.borrow_mut() = error;
    }

    /// Recipe label reported by `execute_token_at_path`.
    pub fn set_executed_label(&self, label: Option<&str>) {
        *self.executed_label.borrow_mut() = label.map(str::to_string);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.borrow().clone()
    }

    fn action(&self, call: ApiCall) -> Result<(), ApiError> {
        self.calls.borrow_mut().push(call);
        match self.action_failure.borrow().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl GameApi for FakeApi {
    fn get_all_tokens<'a>(
        &'a self,
        filter: &'a TokenFilter,
    ) -> LocalBoxFuture<'a, Result<Vec<Token>, ApiError>> {
        self.fetches.set(self.fetches.get() + 1);
        let failure = self.fetch_failures.borrow_mut().pop_front();
        let gate = self.fetch_gates.borrow_mut().pop_front();
        Box::pin(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if let Some(error) = failure {
                return Err(error);
            }
            let tokens = self
                .tokens
                .borrow()
                .iter()
                .filter(|token| matches_filter(filter, token))
                .cloned()
                .collect();
            Ok(tokens)
        })
    }

    fn execute_token_at_path<'a>(
        &'a self,
        path: &'a str,
    ) -> LocalBoxFuture<'a, Result<ExecuteResult, ApiError>> {
        let result = self
            .action(ApiCall::Execute {
                path: path.to_string(),
            })
            .map(|()| ExecuteResult {
                executed_recipe_label: self.executed_label.borrow().clone(),
            });
        Box::pin(async move { result })
    }

    fn conclude_token_at_path<'a>(
        &'a self,
        path: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), ApiError>> {
        let result = self.action(ApiCall::Conclude {
            path: path.to_string(),
        });
        Box::pin(async move { result })
    }

    fn unlock_terrain<'a>(
        &'a self,
        terrain_path: &'a str,
        stack_path: &'a str,
    ) -> LocalBoxFuture<'a, Result<(), ApiError>> {
        let result = self.action(ApiCall::UnlockTerrain {
            terrain_path: terrain_path.to_string(),
            stack_path: stack_path.to_string(),
        });
        Box::pin(async move { result })
    }
}

fn matches_filter(filter: &TokenFilter, token: &Token) -> bool {
    let sphere_ok = filter.sphere_prefixes.is_empty()
        || filter
            .sphere_prefixes
            .iter()
            .any(|prefix| token.path.starts_with(prefix.as_str()));
    let type_ok = filter.payload_types.is_empty()
        || filter.payload_types.iter().any(|t| *t == token.payload_type);
    sphere_ok && type_ok
}

// ===========================================================================
// Token builders
// ===========================================================================

fn token(id: &str, payload_type: &str, path: &str, fields: Value) -> Token {
    let Value::Object(fields) = fields else {
        unreachable!("token fields are always built from an object literal");
    };
    Token {
        id: id.into(),
        payload_type: payload_type.to_string(),
        path: path.to_string(),
        fields,
    }
}

fn aspect_map(pairs: &[(&str, i32)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), json!(value)))
            .collect(),
    )
}

pub fn element_stack(id: &str, path: &str, element_id: &str, aspects: &[(&str, i32)]) -> Token {
    token(
        id,
        "ElementStack",
        path,
        json!({
            "elementId": element_id,
            "label": element_id,
            "quantity": 1,
            "aspects": aspect_map(aspects),
        }),
    )
}

pub fn situation(id: &str, path: &str, verb_id: &str) -> Token {
    situation_with_thresholds(id, path, verb_id, Vec::new())
}

pub fn situation_with_thresholds(
    id: &str,
    path: &str,
    verb_id: &str,
    thresholds: Vec<SphereSpec>,
) -> Token {
    token(
        id,
        "Situation",
        path,
        json!({
            "verbId": verb_id,
            "verbLabel": verb_id,
            "state": "Unstarted",
            "thresholds": thresholds,
        }),
    )
}

pub fn terrain(id: &str, path: &str, sealed: bool, shrouded: bool) -> Token {
    terrain_with_unlock(id, path, sealed, shrouded, &[], &[], &[])
}

pub fn terrain_with_unlock(
    id: &str,
    path: &str,
    sealed: bool,
    shrouded: bool,
    essentials: &[(&str, i32)],
    requirements: &[(&str, i32)],
    forbiddens: &[(&str, i32)],
) -> Token {
    token(
        id,
        "ConnectedTerrain",
        path,
        json!({
            "label": id,
            "sealed": sealed,
            "shrouded": shrouded,
            "unlockEssentials": aspect_map(essentials),
            "unlockRequirements": aspect_map(requirements),
            "unlockForbiddens": aspect_map(forbiddens),
        }),
    )
}

/// Replace one raw field on a token.
pub fn with_field(mut token: Token, key: &str, value: Value) -> Token {
    token.fields.insert(key.to_string(), value);
    token
}

pub fn threshold(
    id: &str,
    essential: &[(&str, i32)],
    required: &[(&str, i32)],
    forbidden: &[(&str, i32)],
) -> SphereSpec {
    let collect = |pairs: &[(&str, i32)]| {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    };
    SphereSpec {
        id: id.to_string(),
        label: None,
        essential: collect(essential),
        required: collect(required),
        forbidden: collect(forbidden),
    }
}

// ===========================================================================
// Tracing
// ===========================================================================

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

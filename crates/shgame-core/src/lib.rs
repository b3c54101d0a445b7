//! shgame-core -- live token synchronization and recipe orchestration.
//!
//! Mirrors the token state of a running game into long-lived, reactive
//! models and layers two interactive workflows on top: filling a recipe's
//! slots ([`orchestration`]) and unlocking terrains ([`unlocker`]).
//!
//! # Poll Cycle
//!
//! While the game reports running, [`source::TokensSource`] polls on a fixed
//! interval:
//!
//! 1. **Fetch** -- one full snapshot through [`api::GameApi`].
//! 2. **Diff** -- vanished ids are retired; known ids update their model in
//!    place; new ids are built by [`factory::TokenModelFactory`].
//! 3. **Publish** -- the id-sorted model list is emitted inside a batch, so
//!    every derived collection sees one consistent state.
//!
//! # Key Types
//!
//! - [`game::GameModel`] -- Composition root.
//! - [`model::TokenModel`] -- Element stack, situation or connected terrain.
//! - [`source::TokensSource`] -- Poll loop, model registry, derived lists.
//! - [`orchestration::RecipeOrchestration`] -- Situation and slot selection
//!   for one recipe.
//! - [`unlocker::TerrainUnlocker`] -- Terrain unlock workflow.
//! - [`config::SyncConfig`] -- Poll and classification settings (TOML).

pub mod api;
pub mod aspects;
pub mod config;
pub mod error;
pub mod factory;
pub mod game;
pub mod id;
pub mod model;
pub mod orchestration;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod terrains;
pub mod unlocker;
pub mod visibility;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

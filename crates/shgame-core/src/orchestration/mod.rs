//! Recipe orchestration: choosing a situation for a recipe and filling its
//! slots with element stacks.

mod availability;
mod candidates;
mod orchestrator;
mod recipe;
mod recipe_orchestration;

pub use availability::{SituationRequirements, accepts_aspect};
pub use candidates::{CandidateFacts, is_candidate, rank_candidates};
pub use orchestrator::{OrchestrationRequest, Orchestrator};
pub use recipe::{InMemoryRecipeCatalog, RecipeCatalog, RecipeDef};
pub use recipe_orchestration::{Assignments, OrchestrationSlot, RecipeOrchestration};

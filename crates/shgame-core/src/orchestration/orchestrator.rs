//! Service that opens and closes recipe orchestrations.

use std::rc::Rc;

use shgame_reactive::Observable;
use tracing::{debug, info};

use crate::error::OrchestratorError;
use crate::source::TokensSource;

use super::recipe::RecipeCatalog;
use super::recipe_orchestration::RecipeOrchestration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestrationRequest {
    pub recipe_id: String,
    /// Elements to rank first in every slot.
    pub desired_element_ids: Vec<String>,
}

impl OrchestrationRequest {
    pub fn recipe(recipe_id: impl Into<String>) -> Self {
        Self {
            recipe_id: recipe_id.into(),
            desired_element_ids: Vec::new(),
        }
    }
}

/// Holds at most one open orchestration.
pub struct Orchestrator {
    tokens: Rc<TokensSource>,
    catalog: Rc<dyn RecipeCatalog>,
    current: Observable<Option<Rc<RecipeOrchestration>>>,
}

impl Orchestrator {
    pub fn new(tokens: Rc<TokensSource>, catalog: Rc<dyn RecipeCatalog>) -> Self {
        Self {
            tokens,
            catalog,
            current: Observable::with_value(None),
        }
    }

    /// Open an orchestration for a recipe, replacing any open one.
    pub fn request_orchestration(
        &self,
        request: OrchestrationRequest,
    ) -> Result<Rc<RecipeOrchestration>, OrchestratorError> {
        let recipe = self.catalog.recipe(&request.recipe_id).ok_or_else(|| {
            OrchestratorError::UnknownRecipe {
                recipe_id: request.recipe_id.clone(),
            }
        })?;
        let orchestration = Rc::new(RecipeOrchestration::new(
            recipe,
            &self.tokens,
            request.desired_element_ids,
        ));
        info!(recipe = %request.recipe_id, "orchestration opened");
        self.current.set(Some(Rc::clone(&orchestration)));
        Ok(orchestration)
    }

    pub fn orchestration(&self) -> Observable<Option<Rc<RecipeOrchestration>>> {
        self.current.clone()
    }

    pub fn close(&self) {
        if self.current.get().flatten().is_some() {
            debug!("orchestration closed");
            self.current.set(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GameApi;
    use crate::config::SyncConfig;
    use crate::orchestration::{InMemoryRecipeCatalog, RecipeDef};
    use crate::test_utils::FakeApi;

    fn orchestrator() -> Orchestrator {
        let tokens = TokensSource::new(Rc::new(FakeApi::new()) as Rc<dyn GameApi>, SyncConfig::default());
        let mut catalog = InMemoryRecipeCatalog::new();
        catalog.insert(RecipeDef {
            id: "study".into(),
            action_id: Some("library.desk".into()),
            ..RecipeDef::default()
        });
        Orchestrator::new(tokens, Rc::new(catalog))
    }

    #[test]
    fn request_publishes_and_close_clears() {
        let orchestrator = orchestrator();
        let opened = orchestrator
            .request_orchestration(OrchestrationRequest {
                recipe_id: "study".into(),
                desired_element_ids: vec!["candle".into()],
            })
            .unwrap();
        assert_eq!(opened.desired_element_ids(), ["candle".to_string()]);
        let current = orchestrator.orchestration().get().unwrap().unwrap();
        assert!(Rc::ptr_eq(&current, &opened));

        orchestrator.close();
        assert!(orchestrator.orchestration().get().unwrap().is_none());
    }

    #[test]
    fn unknown_recipe_is_an_error() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .request_orchestration(OrchestrationRequest::recipe("nope"))
            .unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::UnknownRecipe {
                recipe_id: "nope".into()
            }
        );
        assert!(orchestrator.orchestration().get().unwrap().is_none());
    }
}

//! Composition root wiring the API, the synchronization source and the
//! interactive services together.

use std::rc::Rc;

use shgame_reactive::Observable;

use crate::api::GameApi;
use crate::config::SyncConfig;
use crate::orchestration::{Orchestrator, RecipeCatalog};
use crate::source::TokensSource;
use crate::unlocker::TerrainUnlocker;

pub struct GameModel {
    api: Rc<dyn GameApi>,
    tokens: Rc<TokensSource>,
    unlocker: TerrainUnlocker,
    orchestrator: Orchestrator,
}

impl GameModel {
    pub fn new(api: Rc<dyn GameApi>, config: SyncConfig, catalog: Rc<dyn RecipeCatalog>) -> Self {
        let tokens = TokensSource::new(Rc::clone(&api), config);
        let unlocker = TerrainUnlocker::new(&tokens);
        let orchestrator = Orchestrator::new(Rc::clone(&tokens), catalog);
        Self {
            api,
            tokens,
            unlocker,
            orchestrator,
        }
    }

    pub fn api(&self) -> &Rc<dyn GameApi> {
        &self.api
    }

    pub fn tokens(&self) -> &Rc<TokensSource> {
        &self.tokens
    }

    pub fn unlocker(&self) -> &TerrainUnlocker {
        &self.unlocker
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Poll the game while `running` is true. Must be called inside a
    /// `LocalSet`.
    pub fn attach_running(&self, running: &Observable<bool>) {
        self.tokens.attach_running(running);
    }
}

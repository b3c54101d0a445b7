use std::cell::OnceCell;

use shgame_reactive::Observable;
use tracing::debug;

use crate::api::Token;
use crate::aspects::Aspects;
use crate::error::TokenError;
use crate::id::TokenId;
use crate::snapshot::{TerrainSnapshot, TokenState};

use super::{ElementStackModel, ModelState, TokenCore};

/// A room or area that hosts other tokens once unlocked.
pub struct ConnectedTerrainModel {
    pub(super) core: TokenCore,
    state: ModelState<TerrainSnapshot>,
    label: OnceCell<Observable<Option<String>>>,
    description: OnceCell<Observable<Option<String>>>,
    sealed: OnceCell<Observable<bool>>,
    shrouded: OnceCell<Observable<bool>>,
    unlock_essentials: OnceCell<Observable<Aspects>>,
    unlock_requirements: OnceCell<Observable<Aspects>>,
    unlock_forbiddens: OnceCell<Observable<Aspects>>,
}

impl ConnectedTerrainModel {
    pub(crate) fn new(core: TokenCore, state: TokenState<TerrainSnapshot>) -> Self {
        Self {
            core,
            state: ModelState::new(state),
            label: OnceCell::new(),
            description: OnceCell::new(),
            sealed: OnceCell::new(),
            shrouded: OnceCell::new(),
            unlock_essentials: OnceCell::new(),
            unlock_requirements: OnceCell::new(),
            unlock_forbiddens: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.core.id
    }

    pub fn path(&self) -> String {
        self.state.path()
    }

    pub fn snapshot(&self) -> TerrainSnapshot {
        self.state.payload()
    }

    pub fn is_retired(&self) -> bool {
        self.core.retired.get()
    }

    pub(crate) fn prepare(&self, token: &Token) -> Result<TokenState<TerrainSnapshot>, TokenError> {
        self.core.check_update(token)?;
        TokenState::decode(token)
    }

    pub(crate) fn commit(&self, state: TokenState<TerrainSnapshot>, payload_type: &str) {
        self.state.replace(state);
        self.core.accept_payload_type(payload_type);
    }

    /// Spend `stack` to unlock this terrain. One request, no retry.
    pub async fn unlock_terrain(&self, stack: &ElementStackModel) -> Result<(), TokenError> {
        self.core.ensure_live()?;
        let terrain_path = self.path();
        let stack_path = stack.path();
        debug!(id = %self.core.id, stack = %stack.id(), "unlocking terrain");
        self.core
            .api()
            .unlock_terrain(&terrain_path, &stack_path)
            .await?;
        Ok(())
    }

    // -- Observed fields --

    pub fn path_changes(&self) -> Observable<String> {
        self.state.watch_path()
    }

    /// A terrain is visible while it is not shrouded.
    pub fn visible(&self) -> Observable<bool> {
        self.core
            .visible_with(|| self.shrouded().map(|shrouded| !shrouded))
    }

    pub fn label(&self) -> Observable<Option<String>> {
        self.state.watch(&self.label, |terrain| terrain.label.clone())
    }

    pub fn description(&self) -> Observable<Option<String>> {
        self.state
            .watch(&self.description, |terrain| terrain.description.clone())
    }

    pub fn sealed(&self) -> Observable<bool> {
        self.state.watch(&self.sealed, |terrain| terrain.sealed)
    }

    pub fn shrouded(&self) -> Observable<bool> {
        self.state.watch(&self.shrouded, |terrain| terrain.shrouded)
    }

    pub fn unlock_essentials(&self) -> Observable<Aspects> {
        self.state
            .watch(&self.unlock_essentials, |terrain| terrain.unlock_essentials.clone())
    }

    pub fn unlock_requirements(&self) -> Observable<Aspects> {
        self.state.watch(&self.unlock_requirements, |terrain| {
            terrain.unlock_requirements.clone()
        })
    }

    pub fn unlock_forbiddens(&self) -> Observable<Aspects> {
        self.state
            .watch(&self.unlock_forbiddens, |terrain| terrain.unlock_forbiddens.clone())
    }
}

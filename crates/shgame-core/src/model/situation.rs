use std::cell::OnceCell;
use std::rc::Rc;

use shgame_reactive::Observable;
use tracing::debug;

use crate::api::Token;
use crate::aspects::Aspects;
use crate::error::TokenError;
use crate::id::TokenId;
use crate::snapshot::{SituationSnapshot, SituationState, SphereSpec, TokenState};

use super::{ConnectedTerrainModel, ModelState, TokenCore};

/// A verb slot in the world: a workstation, harvest station or fixed verb,
/// together with whatever recipe it is running.
pub struct SituationModel {
    pub(super) core: TokenCore,
    state: ModelState<SituationSnapshot>,
    verb_id: OnceCell<Observable<String>>,
    label: OnceCell<Observable<Option<String>>>,
    description: OnceCell<Observable<Option<String>>>,
    aspects: OnceCell<Observable<Aspects>>,
    hints: OnceCell<Observable<Vec<String>>>,
    thresholds: OnceCell<Observable<Vec<SphereSpec>>>,
    situation_state: OnceCell<Observable<SituationState>>,
    recipe_id: OnceCell<Observable<Option<String>>>,
    recipe_label: OnceCell<Observable<Option<String>>>,
    current_recipe_id: OnceCell<Observable<Option<String>>>,
    current_recipe_label: OnceCell<Observable<Option<String>>>,
    time_remaining: OnceCell<Observable<f64>>,
}

impl SituationModel {
    pub(crate) fn new(core: TokenCore, state: TokenState<SituationSnapshot>) -> Self {
        Self {
            core,
            state: ModelState::new(state),
            verb_id: OnceCell::new(),
            label: OnceCell::new(),
            description: OnceCell::new(),
            aspects: OnceCell::new(),
            hints: OnceCell::new(),
            thresholds: OnceCell::new(),
            situation_state: OnceCell::new(),
            recipe_id: OnceCell::new(),
            recipe_label: OnceCell::new(),
            current_recipe_id: OnceCell::new(),
            current_recipe_label: OnceCell::new(),
            time_remaining: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.core.id
    }

    pub fn path(&self) -> String {
        self.state.path()
    }

    pub fn snapshot(&self) -> SituationSnapshot {
        self.state.payload()
    }

    pub fn verb(&self) -> String {
        self.state.read(|state| state.payload.verb_id.clone())
    }

    pub fn current_thresholds(&self) -> Vec<SphereSpec> {
        self.state.read(|state| state.payload.thresholds.clone())
    }

    pub fn current_state(&self) -> SituationState {
        self.state.read(|state| state.payload.state)
    }

    pub fn is_retired(&self) -> bool {
        self.core.retired.get()
    }

    pub(crate) fn prepare(&self, token: &Token) -> Result<TokenState<SituationSnapshot>, TokenError> {
        self.core.check_update(token)?;
        TokenState::decode(token)
    }

    pub(crate) fn commit(&self, state: TokenState<SituationSnapshot>, payload_type: &str) {
        self.state.replace(state);
        self.core.accept_payload_type(payload_type);
    }

    // -- Actions --

    /// Start the situation's recipe. On success the local state moves to
    /// `Ongoing` until the next poll reports the authoritative state.
    pub async fn execute(&self) -> Result<(), TokenError> {
        self.core.ensure_live()?;
        let path = self.path();
        let result = self.core.api().execute_token_at_path(&path).await?;
        // Retired while the request was in flight: nothing left to update.
        self.core.ensure_live()?;
        debug!(id = %self.core.id, label = ?result.executed_recipe_label, "situation executed");
        self.state.merge(|situation| {
            situation.recipe_label = result.executed_recipe_label;
            situation.state = SituationState::Ongoing;
        });
        Ok(())
    }

    /// Collect the situation's output and reset it to `Unstarted`.
    pub async fn conclude(&self) -> Result<(), TokenError> {
        self.core.ensure_live()?;
        let path = self.path();
        self.core.api().conclude_token_at_path(&path).await?;
        self.core.ensure_live()?;
        debug!(id = %self.core.id, "situation concluded");
        self.state.merge(|situation| {
            situation.current_recipe_id = None;
            situation.current_recipe_label = None;
            situation.state = SituationState::Unstarted;
        });
        Ok(())
    }

    // -- Observed fields --

    pub fn path_changes(&self) -> Observable<String> {
        self.state.watch_path()
    }

    pub fn visible(&self) -> Observable<bool> {
        self.core.visible_by_path(&self.state.watch_path())
    }

    pub fn parent_terrain(&self) -> Observable<Option<Rc<ConnectedTerrainModel>>> {
        self.core.parent_terrain(&self.state.watch_path())
    }

    pub fn verb_id(&self) -> Observable<String> {
        self.state.watch(&self.verb_id, |s| s.verb_id.clone())
    }

    pub fn label(&self) -> Observable<Option<String>> {
        self.state.watch(&self.label, |s| s.verb_label.clone())
    }

    pub fn description(&self) -> Observable<Option<String>> {
        self.state
            .watch(&self.description, |s| s.verb_description.clone())
    }

    pub fn aspects(&self) -> Observable<Aspects> {
        self.state.watch(&self.aspects, |s| s.aspects.clone())
    }

    pub fn hints(&self) -> Observable<Vec<String>> {
        self.state.watch(&self.hints, |s| s.hints.clone())
    }

    pub fn thresholds(&self) -> Observable<Vec<SphereSpec>> {
        self.state.watch(&self.thresholds, |s| s.thresholds.clone())
    }

    pub fn state(&self) -> Observable<SituationState> {
        self.state.watch(&self.situation_state, |s| s.state)
    }

    pub fn recipe_id(&self) -> Observable<Option<String>> {
        self.state.watch(&self.recipe_id, |s| s.recipe_id.clone())
    }

    pub fn recipe_label(&self) -> Observable<Option<String>> {
        self.state.watch(&self.recipe_label, |s| s.recipe_label.clone())
    }

    pub fn current_recipe_id(&self) -> Observable<Option<String>> {
        self.state
            .watch(&self.current_recipe_id, |s| s.current_recipe_id.clone())
    }

    pub fn current_recipe_label(&self) -> Observable<Option<String>> {
        self.state
            .watch(&self.current_recipe_label, |s| s.current_recipe_label.clone())
    }

    pub fn time_remaining(&self) -> Observable<f64> {
        self.state.watch(&self.time_remaining, |s| s.time_remaining)
    }
}

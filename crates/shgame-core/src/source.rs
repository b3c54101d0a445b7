//! The token synchronization source.
//!
//! Polls the game for a full token snapshot, reconciles it against the
//! live model registry (one model per id, updated in place, retired when it
//! disappears) and publishes the sorted model list. A library of derived
//! collections is built lazily on top of that list.
//!
//! # Poll pipeline
//!
//! 1. **Fetch** -- request every token matching the configured filter.
//! 2. **Epoch check** -- discard the result if polling was re-armed or
//!    cancelled while the request was in flight.
//! 3. **Validate** -- every token is checked against its model (or
//!    classified for a new one) and decoded; any failure aborts the poll
//!    before anything changes.
//! 4. **Publish** -- inside one batch scope the id-sorted list is set first,
//!    then vanished models are retired and existing ones take their new
//!    state. The flush delivers the membership before per-model changes.

use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use shgame_reactive::{
    BatchScope, Observable, Subscription, combine_latest4, same_option,
};
use tracing::{debug, error, info, warn};

use crate::api::{GameApi, Token, TokenFilter};
use crate::config::SyncConfig;
use crate::error::TokenError;
use crate::factory::TokenModelFactory;
use crate::id::TokenId;
use crate::model::{ConnectedTerrainModel, ElementStackModel, SituationModel, TokenModel};
use crate::scheduler::PollTask;
use crate::terrains::TerrainsSource;
use crate::visibility::TokenVisibility;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied {
        count: usize,
        added: usize,
        removed: usize,
    },
    /// Polling was re-armed or cancelled while the fetch was in flight.
    Stale,
}

type Models<T> = Observable<Vec<Rc<T>>>;

pub struct TokensSource {
    api: Rc<dyn GameApi>,
    config: Rc<SyncConfig>,
    filter: TokenFilter,
    models: RefCell<BTreeMap<TokenId, TokenModel>>,
    subject: Observable<Vec<TokenModel>>,
    tokens: Observable<Vec<TokenModel>>,
    terrains: TerrainsSource,
    factory: TokenModelFactory,
    poll_task: PollTask,
    running: RefCell<Option<Subscription>>,

    visible_tokens: OnceCell<Observable<Vec<TokenModel>>>,
    visible_element_stacks: OnceCell<Models<ElementStackModel>>,
    unlocked_workstations: OnceCell<Models<SituationModel>>,
    unlocked_harvest_stations: OnceCell<Models<SituationModel>>,
    consider_situation: OnceCell<Observable<Option<Rc<SituationModel>>>>,
    unlocking_terrain_situation: OnceCell<Observable<Option<Rc<SituationModel>>>>,
    visible_situations: OnceCell<Models<SituationModel>>,
    unsealed_terrains: OnceCell<Models<ConnectedTerrainModel>>,
    unlocked_terrains: OnceCell<Models<ConnectedTerrainModel>>,
}

impl TokensSource {
    pub fn new(api: Rc<dyn GameApi>, config: SyncConfig) -> Rc<Self> {
        let subject = Observable::new();
        let tokens = subject.distinct_until_shallow_array_changed();
        let terrains = TerrainsSource::new(&tokens);
        let visibility = Rc::new(TokenVisibility::new(
            &terrains.unlocked_terrains(),
            config.terrain_sphere_prefix.clone(),
        ));
        let factory = TokenModelFactory::new(Rc::clone(&api), visibility);
        let filter = TokenFilter {
            sphere_prefixes: config.sphere_prefixes.clone(),
            payload_types: config.payload_types.clone(),
        };

        Rc::new(Self {
            api,
            config: Rc::new(config),
            filter,
            models: RefCell::new(BTreeMap::new()),
            subject,
            tokens,
            terrains,
            factory,
            poll_task: PollTask::new(),
            running: RefCell::new(None),
            visible_tokens: OnceCell::new(),
            visible_element_stacks: OnceCell::new(),
            unlocked_workstations: OnceCell::new(),
            unlocked_harvest_stations: OnceCell::new(),
            consider_situation: OnceCell::new(),
            unlocking_terrain_situation: OnceCell::new(),
            visible_situations: OnceCell::new(),
            unsealed_terrains: OnceCell::new(),
            unlocked_terrains: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn terrains(&self) -> &TerrainsSource {
        &self.terrains
    }

    /// Live model for `id`, if any.
    pub fn model(&self, id: &TokenId) -> Option<TokenModel> {
        self.models.borrow().get(id).cloned()
    }

    pub fn model_count(&self) -> usize {
        self.models.borrow().len()
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Poll while `running` reports true. Must be called inside a `LocalSet`.
    pub fn attach_running(self: &Rc<Self>, running: &Observable<bool>) {
        let weak = Rc::downgrade(self);
        let subscription = running.subscribe(move |&is_running| {
            let Some(source) = weak.upgrade() else {
                return;
            };
            if !is_running {
                source.stop_polling();
            } else if !source.poll_task.is_armed() {
                source.start_polling();
            }
        });
        *self.running.borrow_mut() = Some(subscription);
    }

    pub fn start_polling(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.poll_task
            .arm(self.config.poll_interval(), move |epoch| {
                let weak = weak.clone();
                async move {
                    let Some(source) = weak.upgrade() else {
                        return false;
                    };
                    source.poll_tick(epoch).await
                }
            });
    }

    pub fn stop_polling(&self) {
        self.poll_task.cancel();
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.is_armed()
    }

    async fn poll_tick(&self, epoch: u64) -> bool {
        match self.poll_at(epoch).await {
            Ok(_) => true,
            Err(err) if !err.is_fatal() => {
                warn!(epoch, error = %err, "token poll failed");
                true
            }
            Err(err) => {
                error!(epoch, error = %err, "token synchronization stopped");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Fetch and apply one snapshot outside the scheduled loop.
    pub async fn poll_once(&self) -> Result<PollOutcome, TokenError> {
        self.poll_at(self.poll_task.epoch()).await
    }

    async fn poll_at(&self, epoch: u64) -> Result<PollOutcome, TokenError> {
        let tokens = self.api.get_all_tokens(&self.filter).await?;
        let current = self.poll_task.epoch();
        if current != epoch {
            debug!(epoch, current, "discarding stale poll result");
            return Ok(PollOutcome::Stale);
        }
        self.apply(&tokens)
    }

    /// Reconcile the registry with a full snapshot and publish the list. A
    /// snapshot that fails validation leaves everything as it was.
    pub fn apply(&self, tokens: &[Token]) -> Result<PollOutcome, TokenError> {
        let mut list = Vec::with_capacity(tokens.len());
        let mut created = Vec::new();
        let mut updates = Vec::new();
        {
            let models = self.models.borrow();
            for token in tokens {
                match models.get(&token.id) {
                    Some(model) => {
                        updates.push(model.prepare(token)?);
                        list.push(model.clone());
                    }
                    None => {
                        let model = self.factory.create(token)?;
                        created.push(model.clone());
                        list.push(model);
                    }
                }
            }
        }
        list.sort_by(|a, b| a.id().cmp(b.id()));

        let found: HashSet<&TokenId> = tokens.iter().map(|token| &token.id).collect();
        let removed: Vec<TokenModel> = {
            let mut models = self.models.borrow_mut();
            let gone: Vec<TokenId> = models
                .keys()
                .filter(|id| !found.contains(id))
                .cloned()
                .collect();
            let removed = gone.iter().filter_map(|id| models.remove(id)).collect();
            for model in &created {
                models.insert(model.id().clone(), model.clone());
            }
            removed
        };

        let count = list.len();
        let added = created.len();
        {
            let _scope = BatchScope::new();
            self.subject.set(list);
            for model in &removed {
                debug!(id = %model.id(), "retiring token");
                model.retire();
            }
            for update in updates {
                update.apply();
            }
        }

        debug!(count, added, removed = removed.len(), "poll applied");
        Ok(PollOutcome::Applied {
            count,
            added,
            removed: removed.len(),
        })
    }

    // -----------------------------------------------------------------------
    // Derived collections
    // -----------------------------------------------------------------------

    /// Every live model, sorted by id.
    pub fn tokens(&self) -> Observable<Vec<TokenModel>> {
        self.tokens.clone()
    }

    pub fn visible_tokens(&self) -> Observable<Vec<TokenModel>> {
        self.visible_tokens
            .get_or_init(|| {
                self.tokens
                    .filter_item_observations(TokenModel::visible)
                    .distinct_until_shallow_array_changed()
            })
            .clone()
    }

    pub fn visible_element_stacks(&self) -> Models<ElementStackModel> {
        self.visible_element_stacks
            .get_or_init(|| {
                self.visible_tokens()
                    .filter_items(|token| token.as_element_stack().cloned())
                    .distinct_until_shallow_array_changed()
            })
            .clone()
    }

    /// Visible situations usable as workstations.
    pub fn unlocked_workstations(&self) -> Models<SituationModel> {
        self.unlocked_workstations
            .get_or_init(|| {
                let config = Rc::clone(&self.config);
                self.visible_tokens()
                    .filter_items(move |token| {
                        token
                            .as_situation()
                            .filter(|situation| config.is_workstation_verb(&situation.verb()))
                            .cloned()
                    })
                    .distinct_until_shallow_array_changed()
            })
            .clone()
    }

    pub fn unlocked_harvest_stations(&self) -> Models<SituationModel> {
        self.unlocked_harvest_stations
            .get_or_init(|| {
                let config = Rc::clone(&self.config);
                self.visible_tokens()
                    .filter_items(move |token| {
                        token
                            .as_situation()
                            .filter(|situation| config.is_harvest_verb(&situation.verb()))
                            .cloned()
                    })
                    .distinct_until_shallow_array_changed()
            })
            .clone()
    }

    pub fn consider_situation(&self) -> Observable<Option<Rc<SituationModel>>> {
        self.consider_situation
            .get_or_init(|| {
                let prefix = self.config.consider_path_prefix.clone();
                self.tokens
                    .map(move |tokens| {
                        tokens
                            .iter()
                            .filter_map(TokenModel::as_situation)
                            .find(|situation| situation.path().starts_with(prefix.as_str()))
                            .cloned()
                    })
                    .distinct_until_changed_by(same_option)
            })
            .clone()
    }

    /// The first situation whose verb is the terrain-unlock verb.
    pub fn unlocking_terrain_situation(&self) -> Observable<Option<Rc<SituationModel>>> {
        self.unlocking_terrain_situation
            .get_or_init(|| {
                let verb = self.config.terrain_unlock_verb.clone();
                self.tokens
                    .filter_items(|token| token.as_situation().cloned())
                    .first_or_default(move |situation| situation.verb() == verb)
                    .distinct_until_changed_by(same_option)
            })
            .clone()
    }

    /// Workstations, then harvest stations, then the unlock and consider
    /// situations when present.
    pub fn visible_situations(&self) -> Models<SituationModel> {
        self.visible_situations
            .get_or_init(|| {
                combine_latest4(
                    &self.consider_situation(),
                    &self.unlocking_terrain_situation(),
                    &self.unlocked_workstations(),
                    &self.unlocked_harvest_stations(),
                )
                .map(|(consider, unlock, workstations, harvest)| {
                    let mut situations: Vec<Rc<SituationModel>> =
                        workstations.iter().chain(harvest.iter()).cloned().collect();
                    situations.extend(unlock.iter().cloned());
                    situations.extend(consider.iter().cloned());
                    situations
                })
                .distinct_until_shallow_array_changed()
            })
            .clone()
    }

    pub fn unsealed_terrains(&self) -> Models<ConnectedTerrainModel> {
        self.unsealed_terrains
            .get_or_init(|| {
                self.tokens
                    .filter_items(|token| token.as_terrain().cloned())
                    .filter_item_observations(|terrain: &Rc<ConnectedTerrainModel>| {
                        terrain.sealed().map(|sealed| !sealed)
                    })
                    .distinct_until_shallow_array_changed()
            })
            .clone()
    }

    /// All connected terrains, sealed or not.
    pub fn unlocked_terrains(&self) -> Models<ConnectedTerrainModel> {
        self.unlocked_terrains
            .get_or_init(|| {
                self.tokens
                    .filter_items(|token| token.as_terrain().cloned())
                    .distinct_until_shallow_array_changed()
            })
            .clone()
    }
}

impl Drop for TokensSource {
    fn drop(&mut self) {
        let models = std::mem::take(&mut *self.models.borrow_mut());
        info!(count = models.len(), "tokens source shutting down");
        for model in models.values() {
            model.retire();
        }
    }
}

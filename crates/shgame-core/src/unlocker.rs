//! The terrain unlock workflow: open a terrain, pick a stack that satisfies
//! its unlock requirements, spend it.

use std::rc::Rc;

use shgame_reactive::{Identity, Observable, Subscription, combine_latest3, first_match};
use tracing::{debug, info, warn};

use crate::aspects::{Aspects, constraints_match};
use crate::error::UnlockError;
use crate::model::{ConnectedTerrainModel, ElementStackModel};
use crate::source::TokensSource;

type Stacks = Vec<Rc<ElementStackModel>>;

/// Essentials, requirements and forbiddens of the open terrain.
type UnlockRequirements = (Aspects, Aspects, Aspects);

/// Unlock requirements follow the same rules as slot specs.
pub fn satisfies_unlock(aspects: &Aspects, (essentials, requirements, forbiddens): &UnlockRequirements) -> bool {
    constraints_match(aspects, essentials, requirements, forbiddens)
}

pub struct TerrainUnlocker {
    target: Observable<Option<Rc<ConnectedTerrainModel>>>,
    selected: Observable<Option<Rc<ElementStackModel>>>,
    candidates: Observable<Stacks>,
    unlocking_terrain_id: Observable<Option<String>>,
    _selection_guard: Subscription,
}

impl TerrainUnlocker {
    pub fn new(tokens: &TokensSource) -> Self {
        let target: Observable<Option<Rc<ConnectedTerrainModel>>> = Observable::with_value(None);
        let selected: Observable<Option<Rc<ElementStackModel>>> = Observable::with_value(None);

        let requirements = target.switch_map_some(|terrain| {
            combine_latest3(
                &terrain.unlock_essentials(),
                &terrain.unlock_requirements(),
                &terrain.unlock_forbiddens(),
            )
        });
        let visible = tokens.visible_element_stacks();
        let candidates = requirements
            .switch_map(move |requirements| match requirements {
                Some(requirements) => {
                    let requirements = Rc::new(requirements.clone());
                    visible.filter_item_observations(move |stack: &Rc<ElementStackModel>| {
                        let requirements = Rc::clone(&requirements);
                        stack
                            .aspects_and_self()
                            .map(move |aspects| satisfies_unlock(aspects, &requirements))
                    })
                }
                None => Observable::with_value(Vec::new()),
            })
            .distinct_until_shallow_array_changed();

        let weak_selected = selected.downgrade();
        let selection_guard = candidates.subscribe(move |stacks: &Stacks| {
            let Some(selected) = weak_selected.upgrade() else {
                return;
            };
            let stale = selected.peek(|current| {
                current
                    .cloned()
                    .flatten()
                    .is_some_and(|stack| !stacks.iter().any(|c| c.same(&stack)))
            });
            if stale {
                debug!("selected unlock stack is no longer a candidate");
                selected.set(None);
            }
        });

        let unlocking_terrain_id = tokens
            .unlocking_terrain_situation()
            .switch_map_some(|situation| situation.recipe_id())
            .map(|recipe_id| recipe_id.clone().flatten())
            .distinct_until_changed();

        Self {
            target,
            selected,
            candidates,
            unlocking_terrain_id,
            _selection_guard: selection_guard,
        }
    }

    pub fn target(&self) -> Observable<Option<Rc<ConnectedTerrainModel>>> {
        self.target.clone()
    }

    pub fn selected_stack(&self) -> Observable<Option<Rc<ElementStackModel>>> {
        self.selected.clone()
    }

    /// Recipe id currently running on the terrain-unlock situation.
    pub fn unlocking_terrain_id(&self) -> Observable<Option<String>> {
        self.unlocking_terrain_id.clone()
    }

    /// Visible stacks that can unlock the open terrain. Empty while closed.
    pub fn unlock_candidate_stacks(&self) -> Observable<Stacks> {
        self.candidates.clone()
    }

    pub fn is_open(&self) -> bool {
        self.target.get().flatten().is_some()
    }

    pub fn open(&self, terrain: Rc<ConnectedTerrainModel>) {
        debug!(terrain = %terrain.id(), "unlocker opened");
        self.target.set(Some(terrain));
    }

    pub fn close(&self) {
        self.target.set(None);
    }

    /// Select a stack to spend. Fails if the stack is not a current
    /// candidate.
    pub fn select_stack(&self, stack: Option<Rc<ElementStackModel>>) -> Result<(), UnlockError> {
        if let Some(stack) = &stack
            && first_match(&self.candidates, |candidate| candidate.same(stack)).is_none()
        {
            return Err(UnlockError::InvalidCandidate {
                stack_id: stack.id().clone(),
            });
        }
        self.selected.set(stack);
        Ok(())
    }

    /// Unlock the open terrain with the selected stack. False when nothing is
    /// selected, nothing is open, or the request fails.
    pub async fn execute(&self) -> bool {
        let Some(stack) = self.selected.get().flatten() else {
            return false;
        };
        let Some(target) = self.target.get().flatten() else {
            return false;
        };
        match target.unlock_terrain(&stack).await {
            Ok(()) => {
                info!(terrain = %target.id(), stack = %stack.id(), "terrain unlock requested");
                true
            }
            Err(err) => {
                warn!(terrain = %target.id(), stack = %stack.id(), error = %err, "terrain unlock failed");
                false
            }
        }
    }
}

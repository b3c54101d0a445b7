//! Interactive orchestration of one recipe: pick a situation, fill its
//! slots.
//!
//! The selected situation is always either `None` or available for the
//! current aspects filter. Selecting a situation (or losing one to
//! re-validation) clears every slot assignment in the same batch.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use shgame_reactive::{
    BatchScope, Observable, Subscription, combine_latest2, combine_latest3, same_option,
};
use tracing::debug;

use crate::model::{ElementStackModel, SituationModel, filter_has_any_aspect};
use crate::snapshot::SphereSpec;
use crate::source::TokensSource;

use super::availability::SituationRequirements;
use super::candidates::{CandidateFacts, is_candidate, rank_candidates};
use super::recipe::RecipeDef;

/// Threshold id of the skill slot.
const SKILL_SLOT_ID: &str = "s";

/// Slot id to assigned stack. A missing key means the slot may still take
/// its default; an explicit `None` means the user emptied it.
pub type Assignments = BTreeMap<String, Option<Rc<ElementStackModel>>>;

type Stacks = Vec<Rc<ElementStackModel>>;

/// One fillable slot of the selected situation.
#[derive(Clone)]
pub struct OrchestrationSlot {
    pub spec: SphereSpec,
    pub locked: bool,
    pub assignment: Observable<Option<Rc<ElementStackModel>>>,
    /// Candidates, best first.
    pub available_element_stacks: Observable<Stacks>,
    assign: Rc<dyn Fn(Option<Rc<ElementStackModel>>)>,
}

impl OrchestrationSlot {
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn assign(&self, stack: Option<Rc<ElementStackModel>>) {
        (self.assign)(stack);
    }
}

impl fmt::Debug for OrchestrationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestrationSlot")
            .field("id", &self.spec.id)
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

struct State {
    recipe: Rc<RecipeDef>,
    requirement_keys: Vec<String>,
    desired_element_ids: Vec<String>,
    requirements: SituationRequirements,
    aspects_filter: Observable<Vec<String>>,
    situation: Observable<Option<Rc<SituationModel>>>,
    assignments: Observable<Assignments>,
    /// Bumped on every situation change. Pending defaults compare against it.
    generation: Cell<u64>,
    visible_stacks: Observable<Stacks>,
    slot_defaults: RefCell<Vec<Subscription>>,
}

impl State {
    fn is_available(&self, situation: &SituationModel) -> bool {
        let filter = self.aspects_filter.get().unwrap_or_default();
        self.requirements
            .is_available(&situation.verb(), &situation.current_thresholds(), &filter)
    }

    fn apply_situation(&self, situation: Option<Rc<SituationModel>>) {
        self.generation.set(self.generation.get() + 1);
        let _scope = BatchScope::new();
        self.assignments.set(Assignments::new());
        self.situation.set(situation);
    }

    fn revalidate(&self) {
        let Some(current) = self.situation.get().flatten() else {
            return;
        };
        if !self.is_available(&current) {
            debug!(situation = %current.id(), recipe = %self.recipe.id, "situation no longer available");
            self.apply_situation(None);
        }
    }

    fn assign(&self, slot_id: &str, stack: Option<Rc<ElementStackModel>>) {
        self.assignments.modify(|assignments| {
            assignments.insert(slot_id.to_string(), stack);
        });
    }

    fn create_slots(state: &Rc<State>, thresholds: &[SphereSpec]) -> Vec<OrchestrationSlot> {
        let generation = state.generation.get();
        let mut defaults = Vec::with_capacity(thresholds.len());
        let slots = thresholds
            .iter()
            .map(|spec| {
                let (slot, default) = Self::create_slot(state, spec, generation);
                defaults.push(default);
                slot
            })
            .collect();
        *state.slot_defaults.borrow_mut() = defaults;
        slots
    }

    fn create_slot(
        state: &Rc<State>,
        spec: &SphereSpec,
        generation: u64,
    ) -> (OrchestrationSlot, Subscription) {
        let available = match state.recipe.skill_requirement() {
            Some(skill) if spec.id == SKILL_SLOT_ID => skill_candidates(&state.visible_stacks, skill),
            _ => ranked_candidates(state, spec),
        };

        let weak = Rc::downgrade(state);
        let slot_id = spec.id.clone();
        let default = available.take_first(move |stacks| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            if state.generation.get() != generation {
                return;
            }
            let Some(top) = stacks.first() else {
                return;
            };
            state.assignments.modify(|assignments| {
                assignments
                    .entry(slot_id)
                    .or_insert_with(|| Some(Rc::clone(top)));
            });
        });

        let slot_id = spec.id.clone();
        let assignment = state
            .assignments
            .map(move |assignments| assignments.get(&slot_id).cloned().flatten())
            .distinct_until_changed_by(same_option);

        let weak = Rc::downgrade(state);
        let slot_id = spec.id.clone();
        let slot = OrchestrationSlot {
            spec: spec.clone(),
            locked: false,
            assignment,
            available_element_stacks: available,
            assign: Rc::new(move |stack| {
                if let Some(state) = weak.upgrade() {
                    state.assign(&slot_id, stack);
                }
            }),
        };
        (slot, default)
    }
}

fn candidate_facts(stack: &Rc<ElementStackModel>) -> Observable<CandidateFacts> {
    combine_latest3(&stack.element_id(), &stack.aspects(), &stack.aspects_and_self()).map(
        |(element_id, aspects, aspects_and_self)| CandidateFacts {
            element_id: element_id.clone(),
            aspects: aspects.clone(),
            aspects_and_self: aspects_and_self.clone(),
        },
    )
}

fn ranked_candidates(state: &State, spec: &SphereSpec) -> Observable<Stacks> {
    let spec = spec.clone();
    let keys = state.requirement_keys.clone();
    let desired = state.desired_element_ids.clone();
    filter_has_any_aspect(&state.visible_stacks, &keys)
        .observe_items(candidate_facts)
        .map(move |stacks| {
            let matching = stacks
                .iter()
                .filter(|(_, facts)| is_candidate(&spec, facts, &keys))
                .cloned()
                .collect();
            rank_candidates(matching, &keys, &desired)
        })
}

/// Stacks that are the skill element itself.
fn skill_candidates(visible: &Observable<Stacks>, skill: &str) -> Observable<Stacks> {
    let skill = skill.to_string();
    visible
        .observe_items(|stack: &Rc<ElementStackModel>| stack.element_id())
        .map(move |stacks| {
            stacks
                .iter()
                .filter(|(_, element_id)| *element_id == skill)
                .map(|(stack, _)| Rc::clone(stack))
                .collect()
        })
}

pub struct RecipeOrchestration {
    state: Rc<State>,
    recipe: Observable<Rc<RecipeDef>>,
    available_situations: Observable<Vec<Rc<SituationModel>>>,
    slots: Observable<Vec<OrchestrationSlot>>,
    _thresholds_watch: (Observable<Option<Vec<SphereSpec>>>, Subscription),
    _default_situation: Subscription,
}

impl fmt::Debug for RecipeOrchestration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeOrchestration")
            .field("recipe", &self.state.recipe.id)
            .field("desired_element_ids", &self.state.desired_element_ids)
            .finish_non_exhaustive()
    }
}

impl RecipeOrchestration {
    pub fn new(
        recipe: Rc<RecipeDef>,
        tokens: &TokensSource,
        desired_element_ids: Vec<String>,
    ) -> Self {
        let requirements =
            SituationRequirements::new(&recipe, &tokens.config().workstation_filter_aspects);
        let state = Rc::new(State {
            requirement_keys: recipe.requirement_keys().map(str::to_string).collect(),
            recipe: Rc::clone(&recipe),
            desired_element_ids,
            requirements: requirements.clone(),
            aspects_filter: Observable::with_value(Vec::new()),
            situation: Observable::with_value(None),
            assignments: Observable::with_value(Assignments::new()),
            generation: Cell::new(0),
            visible_stacks: tokens.visible_element_stacks(),
            slot_defaults: RefCell::new(Vec::new()),
        });

        let workstations = tokens
            .unlocked_workstations()
            .observe_items(|situation: &Rc<SituationModel>| situation.thresholds());
        let available_situations = combine_latest2(&workstations, &state.aspects_filter)
            .map(move |(workstations, filter)| {
                workstations
                    .iter()
                    .filter(|(situation, thresholds)| {
                        requirements.is_available(&situation.verb(), thresholds, filter)
                    })
                    .map(|(situation, _)| Rc::clone(situation))
                    .collect::<Vec<_>>()
            })
            .distinct_until_shallow_array_changed();

        let weak = Rc::downgrade(&state);
        let slots = state
            .situation
            .switch_map(|situation| match situation {
                Some(situation) => {
                    let owner = Rc::clone(situation);
                    situation
                        .thresholds()
                        .map(move |thresholds| (Some(Rc::clone(&owner)), thresholds.clone()))
                }
                None => Observable::with_value((None, Vec::new())),
            })
            .distinct_until_changed_by(|a, b| same_option(&a.0, &b.0) && a.1 == b.1)
            .map(move |(_, thresholds)| match weak.upgrade() {
                Some(state) => State::create_slots(&state, thresholds),
                None => Vec::new(),
            });

        let weak = Rc::downgrade(&state);
        let thresholds = state
            .situation
            .switch_map_some(|situation| situation.thresholds());
        let watch = thresholds.subscribe(move |_| {
            if let Some(state) = weak.upgrade() {
                state.revalidate();
            }
        });

        let weak = Rc::downgrade(&state);
        let default_situation = available_situations.take_first(move |situations| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            if state.generation.get() != 0 {
                return;
            }
            if let Some(first) = situations.first() {
                debug!(situation = %first.id(), recipe = %state.recipe.id, "default situation selected");
                state.apply_situation(Some(Rc::clone(first)));
            }
        });

        Self {
            state,
            recipe: Observable::with_value(recipe),
            available_situations,
            slots,
            _thresholds_watch: (thresholds, watch),
            _default_situation: default_situation,
        }
    }

    pub fn recipe(&self) -> Observable<Rc<RecipeDef>> {
        self.recipe.clone()
    }

    pub fn desired_element_ids(&self) -> &[String] {
        &self.state.desired_element_ids
    }

    pub fn aspects_filter(&self) -> Observable<Vec<String>> {
        self.state.aspects_filter.clone()
    }

    pub fn situation(&self) -> Observable<Option<Rc<SituationModel>>> {
        self.state.situation.clone()
    }

    /// Unlocked workstations that can run the recipe under the current
    /// aspects filter.
    pub fn available_situations(&self) -> Observable<Vec<Rc<SituationModel>>> {
        self.available_situations.clone()
    }

    /// One slot per threshold of the selected situation.
    pub fn slots(&self) -> Observable<Vec<OrchestrationSlot>> {
        self.slots.clone()
    }

    pub fn assignments(&self) -> Observable<Assignments> {
        self.state.assignments.clone()
    }

    pub fn situation_is_available(&self, situation: &SituationModel) -> bool {
        self.state.is_available(situation)
    }

    /// Replace the aspects filter and drop the selected situation if it no
    /// longer qualifies.
    pub fn set_aspects_filter(&self, aspects: Vec<String>) {
        self.state.aspects_filter.set(aspects);
        self.state.revalidate();
    }

    /// Select a situation, clearing all assignments. A situation that is not
    /// available selects `None` instead.
    pub fn select_situation(&self, situation: Option<Rc<SituationModel>>) {
        let situation = situation.filter(|situation| {
            let available = self.state.is_available(situation);
            if !available {
                debug!(situation = %situation.id(), recipe = %self.state.recipe.id, "rejected unavailable situation");
            }
            available
        });
        self.state.apply_situation(situation);
    }

    /// Overwrite one slot's assignment. Not validated against the slot's
    /// candidates.
    pub fn assign_slot(&self, slot_id: &str, stack: Option<Rc<ElementStackModel>>) {
        self.state.assign(slot_id, stack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GameApi;
    use crate::config::SyncConfig;
    use crate::test_utils::{FakeApi, element_stack, situation_with_thresholds, threshold};
    use shgame_reactive::Identity;

    fn recipe(action_id: &str, requirements: &[(&str, i32)]) -> Rc<RecipeDef> {
        Rc::new(RecipeDef {
            id: "study".into(),
            label: None,
            action_id: Some(action_id.into()),
            requirements: requirements
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        })
    }

    fn source() -> Rc<TokensSource> {
        TokensSource::new(Rc::new(FakeApi::new()) as Rc<dyn GameApi>, SyncConfig::default())
    }

    fn desk(id: &str) -> crate::api::Token {
        situation_with_thresholds(
            id,
            &format!("~/portage1/{id}"),
            "library.desk",
            vec![
                threshold("s", &[], &[("skill", 1)], &[]),
                threshold("a", &[], &[("lantern", 1)], &[]),
            ],
        )
    }

    fn slot_ids(orchestration: &RecipeOrchestration) -> Vec<String> {
        orchestration
            .slots()
            .get()
            .unwrap()
            .iter()
            .map(|slot| slot.id().to_string())
            .collect()
    }

    #[test]
    fn defaults_pick_first_situation_and_top_candidates() {
        let tokens = source();
        tokens
            .apply(&[
                desk("desk"),
                element_stack("skill", "~/hand.skills/skill", "s.candle", &[("skill", 1)]),
                element_stack("dim", "~/hand.misc/dim", "dim", &[("lantern", 1)]),
                element_stack("bright", "~/hand.misc/bright", "bright", &[("lantern", 5)]),
            ])
            .unwrap();

        let orchestration = RecipeOrchestration::new(
            recipe("library.desk", &[("s.candle", 1), ("lantern", 1)]),
            &tokens,
            Vec::new(),
        );
        let situation = orchestration.situation().get().unwrap().unwrap();
        assert_eq!(situation.id().as_str(), "desk");
        assert_eq!(slot_ids(&orchestration), vec!["s", "a"]);

        let assignments = orchestration.assignments().get().unwrap();
        let skill = assignments["s"].clone().unwrap();
        assert_eq!(skill.id().as_str(), "skill");
        let a = assignments["a"].clone().unwrap();
        assert_eq!(a.id().as_str(), "bright");
    }

    #[test]
    fn select_clears_assignments_and_rejects_unavailable() {
        let tokens = source();
        tokens
            .apply(&[
                desk("desk"),
                situation_with_thresholds("bench", "~/portage1/bench", "workshop.bench", vec![]),
                element_stack("dim", "~/hand.misc/dim", "dim", &[("lantern", 1)]),
            ])
            .unwrap();
        let orchestration =
            RecipeOrchestration::new(recipe("library.desk", &[("lantern", 1)]), &tokens, Vec::new());
        orchestration.assign_slot("a", None);

        let bench = tokens.model(&"bench".into()).unwrap();
        orchestration.select_situation(bench.as_situation().cloned());
        assert!(orchestration.situation().get().unwrap().is_none());
        assert!(orchestration.assignments().get().unwrap().is_empty());
        assert!(slot_ids(&orchestration).is_empty());
    }

    #[test]
    fn user_selection_before_default_wins() {
        let tokens = source();
        let orchestration =
            RecipeOrchestration::new(recipe("library.desk", &[("lantern", 1)]), &tokens, Vec::new());
        // No poll yet: nothing to default to.
        assert!(orchestration.situation().get().unwrap().is_none());

        orchestration.select_situation(None);
        tokens.apply(&[desk("desk")]).unwrap();
        assert!(orchestration.situation().get().unwrap().is_none());
        assert_eq!(orchestration.available_situations().get().unwrap().len(), 1);
    }

    #[test]
    fn filter_change_drops_situation() {
        let tokens = source();
        tokens.apply(&[desk("desk")]).unwrap();
        let orchestration =
            RecipeOrchestration::new(recipe("library.desk", &[("lantern", 1)]), &tokens, Vec::new());
        assert!(orchestration.situation().get().unwrap().is_some());

        orchestration.set_aspects_filter(vec!["knock".into()]);
        assert!(orchestration.situation().get().unwrap().is_none());
        assert!(orchestration.available_situations().get().unwrap().is_empty());

        orchestration.set_aspects_filter(vec!["lantern".into()]);
        assert_eq!(orchestration.available_situations().get().unwrap().len(), 1);
    }

    #[test]
    fn assign_slot_is_unconditional() {
        let tokens = source();
        tokens
            .apply(&[
                desk("desk"),
                element_stack("rock", "~/hand.misc/rock", "rock", &[("stone", 1)]),
            ])
            .unwrap();
        let orchestration =
            RecipeOrchestration::new(recipe("library.desk", &[("lantern", 1)]), &tokens, Vec::new());
        let rock = tokens.model(&"rock".into()).unwrap();
        let rock = rock.as_element_stack().cloned();

        let slots = orchestration.slots().get().unwrap();
        let slot_a = slots.iter().find(|slot| slot.id() == "a").unwrap();
        assert!(slot_a.available_element_stacks.get().unwrap().is_empty());
        slot_a.assign(rock.clone());
        let assigned = slot_a.assignment.get().unwrap().unwrap();
        assert!(assigned.same(rock.as_ref().unwrap()));
    }

    #[test]
    fn switching_to_equal_thresholds_rebuilds_slots() {
        let tokens = source();
        tokens
            .apply(&[
                desk("desk1"),
                desk("desk2"),
                element_stack("bright", "~/hand.misc/bright", "bright", &[("lantern", 5)]),
            ])
            .unwrap();
        let orchestration =
            RecipeOrchestration::new(recipe("library.desk", &[("lantern", 1)]), &tokens, Vec::new());
        assert_eq!(orchestration.situation().get().unwrap().unwrap().id().as_str(), "desk1");
        orchestration.assign_slot("a", None);
        let before = orchestration.slots().version();

        let desk2 = tokens.model(&"desk2".into()).unwrap();
        orchestration.select_situation(desk2.as_situation().cloned());
        assert!(orchestration.slots().version() > before);
        assert_eq!(slot_ids(&orchestration), vec!["s", "a"]);
        let assignments = orchestration.assignments().get().unwrap();
        assert_eq!(assignments["a"].clone().unwrap().id().as_str(), "bright");
    }

    #[test]
    fn debug_names_the_recipe() {
        let tokens = source();
        let orchestration = RecipeOrchestration::new(
            recipe("library.desk", &[("lantern", 1)]),
            &tokens,
            vec!["candle".into()],
        );
        let debug = format!("{orchestration:?}");
        assert!(debug.starts_with("RecipeOrchestration"));
        assert!(debug.contains("\"study\""));
        assert!(debug.contains("candle"));
    }
}

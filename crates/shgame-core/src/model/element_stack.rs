use std::cell::OnceCell;
use std::rc::Rc;

use shgame_reactive::Observable;

use crate::api::Token;
use crate::aspects::{Aspects, has_any_aspect};
use crate::error::TokenError;
use crate::id::TokenId;
use crate::snapshot::{ElementStackSnapshot, TokenState};

use super::{ConnectedTerrainModel, ModelState, TokenCore};

/// A stack of one element somewhere in the world.
pub struct ElementStackModel {
    pub(super) core: TokenCore,
    state: ModelState<ElementStackSnapshot>,
    element_id: OnceCell<Observable<String>>,
    label: OnceCell<Observable<Option<String>>>,
    quantity: OnceCell<Observable<u32>>,
    aspects: OnceCell<Observable<Aspects>>,
    aspects_and_self: OnceCell<Observable<Aspects>>,
}

impl ElementStackModel {
    pub(crate) fn new(core: TokenCore, state: TokenState<ElementStackSnapshot>) -> Self {
        Self {
            core,
            state: ModelState::new(state),
            element_id: OnceCell::new(),
            label: OnceCell::new(),
            quantity: OnceCell::new(),
            aspects: OnceCell::new(),
            aspects_and_self: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.core.id
    }

    pub fn path(&self) -> String {
        self.state.path()
    }

    /// Current decoded payload.
    pub fn snapshot(&self) -> ElementStackSnapshot {
        self.state.payload()
    }

    pub fn is_retired(&self) -> bool {
        self.core.retired.get()
    }

    pub(crate) fn prepare(&self, token: &Token) -> Result<TokenState<ElementStackSnapshot>, TokenError> {
        self.core.check_update(token)?;
        TokenState::decode(token)
    }

    pub(crate) fn commit(&self, state: TokenState<ElementStackSnapshot>, payload_type: &str) {
        self.state.replace(state);
        self.core.accept_payload_type(payload_type);
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

    pub fn element_id(&self) -> Observable<String> {
        self.state
            .watch(&self.element_id, |stack| stack.element_id.clone())
    }

    pub fn label(&self) -> Observable<Option<String>> {
        self.state.watch(&self.label, |stack| stack.label.clone())
    }

    pub fn quantity(&self) -> Observable<u32> {
        self.state.watch(&self.quantity, |stack| stack.quantity)
    }

    pub fn aspects(&self) -> Observable<Aspects> {
        self.state.watch(&self.aspects, |stack| stack.aspects.clone())
    }

    pub fn aspects_and_self(&self) -> Observable<Aspects> {
        self.state
            .watch(&self.aspects_and_self, ElementStackSnapshot::aspects_and_self)
    }
}

/// Stacks carrying at least one of `keys` (own element id included).
/// Membership follows each stack's aspects.
pub fn filter_has_any_aspect(
    stacks: &Observable<Vec<Rc<ElementStackModel>>>,
    keys: &[String],
) -> Observable<Vec<Rc<ElementStackModel>>> {
    let keys: Rc<[String]> = keys.into();
    stacks.filter_item_observations(move |stack: &Rc<ElementStackModel>| {
        let keys = Rc::clone(&keys);
        stack
            .aspects_and_self()
            .map(move |aspects| has_any_aspect(aspects, keys.iter().map(String::as_str)))
    })
}

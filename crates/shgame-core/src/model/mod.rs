//! Identity-stable token models.
//!
//! One model exists per live token id. The synchronization source mutates it
//! in place on every poll that still reports the id and retires it when a
//! poll stops reporting it. Every field is exposed both as a synchronous
//! read and as a lazily built observable that only re-emits on change.

mod element_stack;
mod situation;
mod terrain;

pub use element_stack::{ElementStackModel, filter_has_any_aspect};
pub use situation::SituationModel;
pub use terrain::ConnectedTerrainModel;

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use shgame_reactive::{Identity, Observable};

use crate::api::{GameApi, Token};
use crate::error::TokenError;
use crate::id::TokenId;
use crate::snapshot::{ElementStackSnapshot, SituationSnapshot, TerrainSnapshot, TokenState};
use crate::visibility::TokenVisibility;

// ---------------------------------------------------------------------------
// Payload kinds
// ---------------------------------------------------------------------------

/// The closed set of model variants, keyed by the API's payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    ElementStack,
    Situation,
    ConnectedTerrain,
}

impl PayloadKind {
    pub fn classify(payload_type: &str) -> Option<Self> {
        match payload_type {
            "ElementStack" => Some(PayloadKind::ElementStack),
            "Situation" | "WorkstationSituation" | "RoomWorkSituation" => {
                Some(PayloadKind::Situation)
            }
            "ConnectedTerrain" => Some(PayloadKind::ConnectedTerrain),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared model plumbing
// ---------------------------------------------------------------------------

/// Identity, lifecycle and collaborators shared by every variant.
pub(crate) struct TokenCore {
    id: TokenId,
    kind: PayloadKind,
    payload_type: RefCell<String>,
    retired: Cell<bool>,
    api: Rc<dyn GameApi>,
    visibility: Rc<TokenVisibility>,
    // Both links reach back into the source's token list; they are dropped
    // on retirement so retired models do not keep the list alive.
    visible: RefCell<Option<Observable<bool>>>,
    parent_terrain: RefCell<Option<Observable<Option<Rc<ConnectedTerrainModel>>>>>,
}

impl TokenCore {
    pub(crate) fn new(
        token: &Token,
        kind: PayloadKind,
        api: Rc<dyn GameApi>,
        visibility: Rc<TokenVisibility>,
    ) -> Self {
        Self {
            id: token.id.clone(),
            kind,
            payload_type: RefCell::new(token.payload_type.clone()),
            retired: Cell::new(false),
            api,
            visibility,
            visible: RefCell::new(None),
            parent_terrain: RefCell::new(None),
        }
    }

    pub(crate) fn api(&self) -> &dyn GameApi {
        self.api.as_ref()
    }

    pub(crate) fn ensure_live(&self) -> Result<(), TokenError> {
        if self.retired.get() {
            return Err(TokenError::Retired {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Reject an update that does not belong to this model.
    pub(crate) fn check_update(&self, token: &Token) -> Result<(), TokenError> {
        if token.id != self.id {
            return Err(TokenError::IdentityMismatch {
                expected: self.id.clone(),
                found: token.id.clone(),
            });
        }
        self.ensure_live()?;
        if PayloadKind::classify(&token.payload_type) != Some(self.kind) {
            return Err(TokenError::PayloadTypeChanged {
                id: self.id.clone(),
                from: self.payload_type.borrow().clone(),
                to: token.payload_type.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn accept_payload_type(&self, payload_type: &str) {
        if *self.payload_type.borrow() != payload_type {
            *self.payload_type.borrow_mut() = payload_type.to_string();
        }
    }

    pub(crate) fn retire(&self) {
        self.retired.set(true);
        let visible = self.visible.borrow_mut().take();
        let parent = self.parent_terrain.borrow_mut().take();
        drop((visible, parent));
    }

    pub(crate) fn visible_with(&self, build: impl FnOnce() -> Observable<bool>) -> Observable<bool> {
        if self.retired.get() {
            return Observable::with_value(false);
        }
        if let Some(visible) = self.visible.borrow().as_ref() {
            return visible.clone();
        }
        let built = build();
        *self.visible.borrow_mut() = Some(built.clone());
        built
    }

    pub(crate) fn visible_by_path(&self, path: &Observable<String>) -> Observable<bool> {
        self.visible_with(|| self.visibility.visible(path))
    }

    pub(crate) fn parent_terrain(
        &self,
        path: &Observable<String>,
    ) -> Observable<Option<Rc<ConnectedTerrainModel>>> {
        if self.retired.get() {
            return Observable::with_value(None);
        }
        if let Some(parent) = self.parent_terrain.borrow().as_ref() {
            return parent.clone();
        }
        let built = self.visibility.parent_terrain(path);
        *self.parent_terrain.borrow_mut() = Some(built.clone());
        built
    }
}

/// Latest state of one model plus its change-suppressed field observables.
pub(crate) struct ModelState<P> {
    cell: Observable<TokenState<P>>,
    path: OnceCell<Observable<String>>,
}

impl<P: Clone + Default + PartialEq + 'static> ModelState<P> {
    pub(crate) fn new(state: TokenState<P>) -> Self {
        Self {
            cell: Observable::with_value(state),
            path: OnceCell::new(),
        }
    }

    pub(crate) fn read<R: Default>(&self, f: impl FnOnce(&TokenState<P>) -> R) -> R {
        self.cell.peek(|state| state.map(f).unwrap_or_default())
    }

    pub(crate) fn payload(&self) -> P {
        self.read(|state| state.payload.clone())
    }

    pub(crate) fn path(&self) -> String {
        self.read(|state| state.path.clone())
    }

    /// Store a new state; an identical state is not re-emitted.
    pub(crate) fn replace(&self, state: TokenState<P>) {
        let unchanged = self.cell.peek(|current| current == Some(&state));
        if !unchanged {
            self.cell.set(state);
        }
    }

    /// Apply a local prediction on top of the current payload.
    pub(crate) fn merge(&self, f: impl FnOnce(&mut P)) {
        self.cell.modify(|state| f(&mut state.payload));
    }

    pub(crate) fn watch<U: Clone + PartialEq + 'static>(
        &self,
        cell: &OnceCell<Observable<U>>,
        f: impl Fn(&P) -> U + 'static,
    ) -> Observable<U> {
        cell.get_or_init(|| {
            self.cell
                .map(move |state| f(&state.payload))
                .distinct_until_changed()
        })
        .clone()
    }

    pub(crate) fn watch_path(&self) -> Observable<String> {
        self.path
            .get_or_init(|| {
                self.cell
                    .map(|state| state.path.clone())
                    .distinct_until_changed()
            })
            .clone()
    }
}

// ---------------------------------------------------------------------------
// TokenModel
// ---------------------------------------------------------------------------

/// Handle to one live token model. Clones share the same model.
#[derive(Clone)]
pub enum TokenModel {
    ElementStack(Rc<ElementStackModel>),
    Situation(Rc<SituationModel>),
    ConnectedTerrain(Rc<ConnectedTerrainModel>),
}

impl TokenModel {
    pub fn id(&self) -> &TokenId {
        &self.core().id
    }

    pub fn kind(&self) -> PayloadKind {
        self.core().kind
    }

    /// The payload type last reported by the API.
    pub fn payload_type(&self) -> String {
        self.core().payload_type.borrow().clone()
    }

    pub fn path(&self) -> String {
        match self {
            TokenModel::ElementStack(m) => m.path(),
            TokenModel::Situation(m) => m.path(),
            TokenModel::ConnectedTerrain(m) => m.path(),
        }
    }

    pub fn visible(&self) -> Observable<bool> {
        match self {
            TokenModel::ElementStack(m) => m.visible(),
            TokenModel::Situation(m) => m.visible(),
            TokenModel::ConnectedTerrain(m) => m.visible(),
        }
    }

    /// Containing terrain. Terrains themselves have none.
    pub fn parent_terrain(&self) -> Observable<Option<Rc<ConnectedTerrainModel>>> {
        match self {
            TokenModel::ElementStack(m) => m.parent_terrain(),
            TokenModel::Situation(m) => m.parent_terrain(),
            TokenModel::ConnectedTerrain(_) => Observable::with_value(None),
        }
    }

    /// Apply a newer snapshot of the same token.
    pub fn update(&self, token: &Token) -> Result<(), TokenError> {
        self.prepare(token)?.apply();
        Ok(())
    }

    /// Check and decode a newer snapshot without touching the model.
    pub fn prepare(&self, token: &Token) -> Result<PreparedUpdate, TokenError> {
        let payload_type = token.payload_type.clone();
        Ok(match self {
            TokenModel::ElementStack(m) => {
                PreparedUpdate::ElementStack(Rc::clone(m), m.prepare(token)?, payload_type)
            }
            TokenModel::Situation(m) => {
                PreparedUpdate::Situation(Rc::clone(m), m.prepare(token)?, payload_type)
            }
            TokenModel::ConnectedTerrain(m) => {
                PreparedUpdate::ConnectedTerrain(Rc::clone(m), m.prepare(token)?, payload_type)
            }
        })
    }

    /// Mark the model as no longer live. Idempotent.
    pub fn retire(&self) {
        self.core().retire();
    }

    pub fn is_retired(&self) -> bool {
        self.core().retired.get()
    }

    pub fn as_element_stack(&self) -> Option<&Rc<ElementStackModel>> {
        match self {
            TokenModel::ElementStack(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_situation(&self) -> Option<&Rc<SituationModel>> {
        match self {
            TokenModel::Situation(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_terrain(&self) -> Option<&Rc<ConnectedTerrainModel>> {
        match self {
            TokenModel::ConnectedTerrain(m) => Some(m),
            _ => None,
        }
    }

    fn core(&self) -> &TokenCore {
        match self {
            TokenModel::ElementStack(m) => &m.core,
            TokenModel::Situation(m) => &m.core,
            TokenModel::ConnectedTerrain(m) => &m.core,
        }
    }
}

/// A validated snapshot waiting to be written to its model.
pub enum PreparedUpdate {
    ElementStack(Rc<ElementStackModel>, TokenState<ElementStackSnapshot>, String),
    Situation(Rc<SituationModel>, TokenState<SituationSnapshot>, String),
    ConnectedTerrain(Rc<ConnectedTerrainModel>, TokenState<TerrainSnapshot>, String),
}

impl PreparedUpdate {
    pub fn apply(self) {
        match self {
            PreparedUpdate::ElementStack(m, state, payload_type) => m.commit(state, &payload_type),
            PreparedUpdate::Situation(m, state, payload_type) => m.commit(state, &payload_type),
            PreparedUpdate::ConnectedTerrain(m, state, payload_type) => {
                m.commit(state, &payload_type)
            }
        }
    }
}

impl Identity for TokenModel {
    fn identity(&self) -> usize {
        match self {
            TokenModel::ElementStack(m) => m.identity(),
            TokenModel::Situation(m) => m.identity(),
            TokenModel::ConnectedTerrain(m) => m.identity(),
        }
    }
}

impl fmt::Debug for TokenModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenModel")
            .field("id", self.id())
            .field("kind", &self.kind())
            .field("retired", &self.is_retired())
            .finish()
    }
}

macro_rules! impl_model_debug {
    ($model:ty) => {
        impl std::fmt::Debug for $model {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($model))
                    .field("id", &self.core.id)
                    .field("path", &self.path())
                    .field("retired", &self.core.retired.get())
                    .finish()
            }
        }
    };
}

impl_model_debug!(ElementStackModel);
impl_model_debug!(SituationModel);
impl_model_debug!(ConnectedTerrainModel);

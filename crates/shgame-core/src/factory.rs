//! Construction of token models from snapshot records.

use std::rc::Rc;

use crate::api::{GameApi, Token};
use crate::error::TokenError;
use crate::model::{
    ConnectedTerrainModel, ElementStackModel, PayloadKind, SituationModel, TokenCore, TokenModel,
};
use crate::snapshot::TokenState;
use crate::visibility::TokenVisibility;

/// Builds the matching [`TokenModel`] variant for a token and wires it to
/// the API handle and the visibility service.
pub struct TokenModelFactory {
    api: Rc<dyn GameApi>,
    visibility: Rc<TokenVisibility>,
}

impl TokenModelFactory {
    pub fn new(api: Rc<dyn GameApi>, visibility: Rc<TokenVisibility>) -> Self {
        Self { api, visibility }
    }

    pub fn create(&self, token: &Token) -> Result<TokenModel, TokenError> {
        let kind = PayloadKind::classify(&token.payload_type).ok_or_else(|| {
            TokenError::UnknownPayloadType {
                id: token.id.clone(),
                payload_type: token.payload_type.clone(),
            }
        })?;
        let core = TokenCore::new(token, kind, Rc::clone(&self.api), Rc::clone(&self.visibility));

        let model = match kind {
            PayloadKind::ElementStack => TokenModel::ElementStack(Rc::new(
                ElementStackModel::new(core, TokenState::decode(token)?),
            )),
            PayloadKind::Situation => {
                TokenModel::Situation(Rc::new(SituationModel::new(core, TokenState::decode(token)?)))
            }
            PayloadKind::ConnectedTerrain => TokenModel::ConnectedTerrain(Rc::new(
                ConnectedTerrainModel::new(core, TokenState::decode(token)?),
            )),
        };
        Ok(model)
    }
}

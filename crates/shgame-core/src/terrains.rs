//! Unlocked terrains derived from the token list.

use std::rc::Rc;

use shgame_reactive::Observable;

use crate::model::{ConnectedTerrainModel, TokenModel};

pub struct TerrainsSource {
    unshrouded: Observable<Vec<Rc<ConnectedTerrainModel>>>,
}

impl TerrainsSource {
    pub fn new(tokens: &Observable<Vec<TokenModel>>) -> Self {
        let unshrouded = tokens
            .filter_items(|token| token.as_terrain().cloned())
            .filter_item_observations(|terrain: &Rc<ConnectedTerrainModel>| {
                terrain.shrouded().map(|shrouded| !shrouded)
            })
            .distinct_until_shallow_array_changed();
        Self { unshrouded }
    }

    /// Connected terrains that are not shrouded.
    pub fn unlocked_terrains(&self) -> Observable<Vec<Rc<ConnectedTerrainModel>>> {
        self.unshrouded.clone()
    }
}

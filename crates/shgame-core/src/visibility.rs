//! Visibility and containing-terrain resolution by sphere path.
//!
//! Tokens whose path lies under the terrain-hosted prefix exist inside some
//! connected terrain. Their parent is the unshrouded terrain whose path is
//! the longest prefix of the token's path, and they are visible only while
//! such a terrain exists. Everything else is always visible.

use std::rc::Rc;

use shgame_reactive::{Observable, WeakObservable, combine_latest2, same_option};

use crate::model::ConnectedTerrainModel;

/// Terrain path segments end at one of these separators.
const PATH_SEPARATORS: [char; 2] = ['/', '!'];

pub struct TokenVisibility {
    terrains: WeakObservable<Vec<Rc<ConnectedTerrainModel>>>,
    hosted_prefix: String,
}

impl TokenVisibility {
    /// `terrains` is the live list of unshrouded terrains. It is held weakly:
    /// the synchronization source owns it.
    pub fn new(
        terrains: &Observable<Vec<Rc<ConnectedTerrainModel>>>,
        hosted_prefix: impl Into<String>,
    ) -> Self {
        Self {
            terrains: terrains.downgrade(),
            hosted_prefix: hosted_prefix.into(),
        }
    }

    pub fn parent_terrain(
        &self,
        path: &Observable<String>,
    ) -> Observable<Option<Rc<ConnectedTerrainModel>>> {
        let Some(terrains) = self.terrains.upgrade() else {
            return Observable::with_value(None);
        };
        let prefix = self.hosted_prefix.clone();
        combine_latest2(path, &terrains)
            .map(move |(path, terrains)| find_parent_terrain(&prefix, path, terrains))
            .distinct_until_changed_by(same_option)
    }

    pub fn visible(&self, path: &Observable<String>) -> Observable<bool> {
        let Some(terrains) = self.terrains.upgrade() else {
            return Observable::with_value(false);
        };
        let prefix = self.hosted_prefix.clone();
        combine_latest2(path, &terrains)
            .map(move |(path, terrains)| {
                !path.starts_with(prefix.as_str())
                    || find_parent_terrain(&prefix, path, terrains).is_some()
            })
            .distinct_until_changed()
    }
}

/// True if `path` lies strictly inside the container at `container`.
pub fn is_within(path: &str, container: &str) -> bool {
    path.strip_prefix(container)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|next| PATH_SEPARATORS.contains(&next))
}

/// The deepest terrain containing `path`, for paths under `hosted_prefix`.
pub fn find_parent_terrain(
    hosted_prefix: &str,
    path: &str,
    terrains: &[Rc<ConnectedTerrainModel>],
) -> Option<Rc<ConnectedTerrainModel>> {
    if !path.starts_with(hosted_prefix) {
        return None;
    }
    terrains
        .iter()
        .map(|terrain| (terrain.path(), terrain))
        .filter(|(terrain_path, _)| is_within(path, terrain_path))
        .max_by_key(|(terrain_path, _)| terrain_path.len())
        .map(|(_, terrain)| Rc::clone(terrain))
}

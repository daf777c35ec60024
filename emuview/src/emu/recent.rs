use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

pub const MAX_RECENT_GAMES: usize = 10;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RecentGame {
    pub path: PathBuf,
    pub name: String,
}

/// Most recently opened content, newest first.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecentGameList {
    games: Vec<RecentGame>,
}

impl RecentGameList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `path` to the front, dropping the oldest entry when full.
    pub fn add_recent_game(
        &mut self,
        path: impl AsRef<Path>,
        name: impl Into<String>,
    ) {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return;
        }

        let name = name.into();
        info!(
            "adding {} @ {} to recent list, current size: {}",
            name,
            path.display(),
            self.games.len()
        );

        if let Some(index) = self.games.iter().position(|g| g.path == path) {
            self.games.remove(index);
        }
        self.games.truncate(MAX_RECENT_GAMES - 1);
        self.games.insert(
            0,
            RecentGame {
                path: path.to_path_buf(),
                name,
            },
        );
    }

    pub fn games(&self) -> &[RecentGame] {
        &self.games
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn clear(&mut self) {
        self.games.clear();
    }
}

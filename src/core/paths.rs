// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filesystem layout for cores, games and save states
//!
//! Save files live at `<saves>/<session id>.dat`. Ids that are not already
//! safe file stems are sanitised and tagged with a short digest of the raw
//! id, so `room 1`, `room/1` and `room_1` get separate save files.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use serde::{Deserialize, Serialize};

/// Save state file extension
pub const SAVE_EXTENSION: &str = "dat";

/// Directory roots used by a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPaths {
    pub assets: PathBuf,
    pub cores: PathBuf,
    pub games: PathBuf,
    pub saves: PathBuf,
}

impl Default for SessionPaths {
    fn default() -> Self {
        Self::with_assets("assets")
    }
}

impl SessionPaths {
    /// Lay out the standard tree under an assets root
    ///
    /// ```
    /// use coresync::core::paths::SessionPaths;
    /// use std::path::Path;
    ///
    /// let paths = SessionPaths::with_assets("/srv/assets");
    /// assert_eq!(paths.games, Path::new("/srv/assets/games"));
    /// ```
    pub fn with_assets<P: AsRef<Path>>(assets: P) -> Self {
        let assets = assets.as_ref().to_path_buf();
        Self {
            cores: assets.join("cores"),
            games: assets.join("games"),
            saves: assets.join("saves"),
            assets,
        }
    }

    /// Deterministic save path for a session id
    ///
    /// ```
    /// use coresync::core::paths::SessionPaths;
    ///
    /// let paths = SessionPaths::with_assets("assets");
    /// assert!(paths.save_path("room_42").ends_with("room_42.dat"));
    /// assert_ne!(paths.save_path("room/42"), paths.save_path("room_42"));
    /// ```
    pub fn save_path(&self, session_id: &str) -> PathBuf {
        save_path_in(&self.saves, session_id)
    }

    pub fn core_path(&self, core: &str) -> PathBuf {
        self.cores.join(clean_path(core))
    }

    pub fn game_path(&self, rom: &str) -> PathBuf {
        self.games.join(clean_path(rom))
    }
}

/// Save path for `session_id` inside `dir`
pub fn save_path_in(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("{}.{}", save_stem(session_id), SAVE_EXTENSION))
}

/// File stem for a session's save
///
/// Safe ids are used as is. Anything [`sanitize_id`] had to change gets the
/// first 8 hex digits of the raw id's MD5 appended.
///
/// ```
/// use coresync::core::paths::save_stem;
///
/// assert_eq!(save_stem("test_load_00"), "test_load_00");
/// assert!(save_stem("room 1").starts_with("room_1-"));
/// assert_ne!(save_stem("room 1"), save_stem("room/1"));
/// ```
pub fn save_stem(session_id: &str) -> String {
    let stem = sanitize_id(session_id);
    if stem == session_id {
        return stem;
    }
    let digest = format!("{:x}", md5::compute(session_id.as_bytes()));
    format!("{}-{}", stem, &digest[..8])
}

/// Map a session id to a safe file stem
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
/// A leading dot is replaced too, so ids can't produce hidden files or `..`.
pub fn sanitize_id(id: &str) -> String {
    let mut out: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Convert a slash-separated path into the platform's separator
pub fn clean_path(path: &str) -> PathBuf {
    if MAIN_SEPARATOR == '/' {
        PathBuf::from(path)
    } else {
        PathBuf::from(path.replace('/', &MAIN_SEPARATOR.to_string()))
    }
}

/// Temporary sibling used while writing `path`
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_safe_chars() {
        assert_eq!(sanitize_id("test_load_00"), "test_load_00");
        assert_eq!(sanitize_id("room-1.v2"), "room-1.v2");
    }

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_id("../etc/passwd"), "_._etc_passwd");
        assert_eq!(sanitize_id("a b\\c"), "a_b_c");
        assert_eq!(sanitize_id(""), "_");
    }

    #[test]
    fn test_save_path_is_deterministic() {
        let paths = SessionPaths::with_assets("assets");
        assert_eq!(paths.save_path("room"), paths.save_path("room"));
        assert_eq!(
            paths.save_path("room"),
            Path::new("assets").join("saves").join("room.dat")
        );
    }

    #[test]
    fn test_distinct_ids_get_distinct_paths() {
        let paths = SessionPaths::with_assets("assets");
        let ids = ["room_1", "room 1", "room/1", "room\\1", ".room_1", "_room_1"];
        let saves: std::collections::HashSet<_> =
            ids.iter().map(|id| paths.save_path(id)).collect();
        assert_eq!(saves.len(), ids.len());
    }

    #[test]
    fn test_sanitized_stem_is_stable() {
        assert_eq!(save_stem("room 1"), save_stem("room 1"));
        let stem = save_stem("room 1");
        assert_eq!(stem.len(), "room_1-".len() + 8);
        assert_eq!(sanitize_id(&stem), stem);
    }

    #[test]
    fn test_core_and_game_paths() {
        let paths = SessionPaths::with_assets("assets");
        assert_eq!(
            paths.core_path("nestopia_libretro.so"),
            Path::new("assets").join("cores").join("nestopia_libretro.so")
        );
        assert!(paths.game_path("nes/mario.nes").ends_with(clean_path("nes/mario.nes")));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let path = Path::new("saves").join("room.dat");
        assert_eq!(temp_path(&path), Path::new("saves").join("room.dat.tmp"));
    }
}

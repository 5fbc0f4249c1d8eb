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

//! Session configuration
//!
//! Configuration is read from a TOML file. Every section is optional and
//! falls back to the defaults below.
//!
//! ```toml
//! [paths]
//! assets = "assets"
//! cores = "assets/cores"
//! games = "assets/games"
//! saves = "assets/saves"
//!
//! [channels]
//! video = 30
//! audio = 30
//! input = 100
//!
//! [session]
//! fps = 60
//! verify_loads = true
//! remove_save_on_close = false
//!
//! [emulators.nes]
//! core = "nestopia_libretro.so"
//! width = 256
//! height = 240
//! ```
//!
//! # Environment overrides
//!
//! - `CORESYNC_CONFIG`: path of the configuration file to load
//! - `CORESYNC_SAVE_DIR`: replaces `paths.saves`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::handle::CoreFlags;
use super::paths::SessionPaths;
use super::sink::{
    ChannelKind, DEFAULT_AUDIO_CAPACITY, DEFAULT_INPUT_CAPACITY, DEFAULT_VIDEO_CAPACITY,
};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CORESYNC_CONFIG";

/// Environment variable overriding the save directory
pub const SAVE_DIR_ENV: &str = "CORESYNC_SAVE_DIR";

/// Default frame rate of the driver loop
pub const DEFAULT_FPS: u32 = 60;

/// Highest accepted driver frame rate
pub const MAX_FPS: u32 = 1000;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: SessionPaths,
    pub channels: ChannelConfig,
    pub session: SessionConfig,
    pub emulators: BTreeMap<String, EmulatorMeta>,
}

/// Frame sink channel capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub video: usize,
    pub audio: usize,
    pub input: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            video: DEFAULT_VIDEO_CAPACITY,
            audio: DEFAULT_AUDIO_CAPACITY,
            input: DEFAULT_INPUT_CAPACITY,
        }
    }
}

impl ChannelConfig {
    pub fn capacity(&self, kind: ChannelKind) -> usize {
        match kind {
            ChannelKind::Video => self.video,
            ChannelKind::Audio => self.audio,
            ChannelKind::Input => self.input,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in [ChannelKind::Video, ChannelKind::Audio, ChannelKind::Input] {
            let capacity = self.capacity(kind);
            if capacity == 0 {
                return Err(ConfigError::InvalidCapacity { kind, capacity });
            }
        }
        Ok(())
    }
}

/// Session behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Driver frame rate; 0 runs unthrottled
    pub fps: u32,

    /// Re-hash the live state after every load and reject loads that
    /// didn't take effect
    pub verify_loads: bool,

    /// Delete the session's save file when the session closes
    pub remove_save_on_close: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            verify_loads: true,
            remove_save_on_close: false,
        }
    }
}

/// Per-system emulator metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorMeta {
    /// Core library file name, relative to `paths.cores`
    pub core: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub gl: bool,
    #[serde(default)]
    pub libco: bool,
}

impl EmulatorMeta {
    pub fn new(core: &str, width: u32, height: u32) -> Self {
        Self {
            core: core.to_string(),
            width,
            height,
            gl: false,
            libco: false,
        }
    }

    /// Flags to pass when loading this system's core
    pub fn flags(&self) -> CoreFlags {
        let mut flags = CoreFlags::empty();
        flags.set(CoreFlags::GL_ALLOWED, self.gl);
        flags.set(CoreFlags::USE_LIBCO, self.libco);
        flags
    }
}

impl Default for Config {
    fn default() -> Self {
        let emulators = [
            ("gba", EmulatorMeta::new("mgba_libretro.so", 240, 160)),
            ("gb", EmulatorMeta::new("gambatte_libretro.so", 160, 144)),
            ("nes", EmulatorMeta::new("nestopia_libretro.so", 256, 240)),
            ("snes", EmulatorMeta::new("snes9x_libretro.so", 256, 224)),
        ]
        .into_iter()
        .map(|(name, meta)| (name.to_string(), meta))
        .collect();

        Self {
            paths: SessionPaths::default(),
            channels: ChannelConfig::default(),
            session: SessionConfig::default(),
            emulators,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Config: reading {}", path.display());
        let data = std::fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    /// Resolve configuration from the environment
    ///
    /// Loads the file named by `CORESYNC_CONFIG` if set, otherwise uses the
    /// defaults, then applies `CORESYNC_SAVE_DIR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                info!("Config: loading {}", PathBuf::from(&path).display());
                Self::load(path)?
            }
            None => Self::default(),
        };

        if let Some(dir) = std::env::var_os(SAVE_DIR_ENV) {
            config.paths.saves = PathBuf::from(dir);
            info!("Config: save directory overridden to {}", config.paths.saves.display());
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.channels.validate()?;
        if self.session.fps > MAX_FPS {
            return Err(ConfigError::InvalidFrameRate(self.session.fps));
        }
        Ok(())
    }

    /// Look up a system's metadata
    pub fn emulator(&self, system: &str) -> Result<&EmulatorMeta, ConfigError> {
        self.emulators
            .get(system)
            .ok_or_else(|| ConfigError::UnknownSystem(system.to_string()))
    }
}

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

//! Error types for core sessions and save states
use std::path::PathBuf;

use thiserror::Error;

use super::sink::ChannelKind;

/// Result type for core session operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for core sessions
#[derive(Error, Debug)]
pub enum CoreError {
    /// The core could not produce a snapshot (e.g. no ROM loaded)
    #[error("Failed to serialize core state: {0}")]
    Serialize(String),

    /// The core rejected snapshot bytes (corrupt or incompatible)
    #[error("Core rejected state snapshot: {0}")]
    Deserialize(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Load attempted with no prior save
    #[error("No save state found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Core load error: {0}")]
    CoreLoad(String),

    #[error("ROM load error: {0}")]
    RomLoad(String),

    #[error("Frame advance failed: {0}")]
    Advance(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("The {0} channel is closed")]
    ChannelClosed(ChannelKind),

    #[error("The {0} channel already has a consumer")]
    ConsumerTaken(ChannelKind),

    #[error("Failed to spawn consumer thread: {0}")]
    Thread(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown system: {0}")]
    UnknownSystem(String),

    #[error("Invalid {kind} channel capacity: {capacity} (must be at least 1)")]
    InvalidCapacity { kind: ChannelKind, capacity: usize },

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True for errors that mean the session has been shut down
    pub fn is_closed(&self) -> bool {
        matches!(self, CoreError::SessionClosed)
    }
}

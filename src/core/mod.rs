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

//! Core session components
//!
//! This module contains the concurrency and consistency layer around an
//! emulation core:
//! - Core handle contract
//! - Core session (the critical section)
//! - State snapshot service (save/load and content hashing)
//! - Frame sink channels (video, audio, input)
//! - Driver loop and termination signal
//! - Configuration and filesystem layout
//! - A deterministic software core

pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod handle;
pub mod paths;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod termination;
pub mod virtual_core;

// Re-export commonly used types
pub use config::Config;
pub use driver::Driver;
pub use error::{ConfigError, CoreError, Result};
pub use frame::{AudioBatch, Frame, InputEvent, InputState};
pub use handle::{CoreFlags, CoreHandle};
pub use session::{CoreSession, SessionSettings};
pub use snapshot::{hash, SnapshotService, StateHash};
pub use termination::Termination;
pub use virtual_core::VirtualCore;

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

//! Core handle contract
//!
//! A [`CoreHandle`] wraps one emulation engine instance. The engine itself
//! (opcode interpretation, rendering, audio synthesis) is opaque to this
//! crate; the session only relies on the operations below.
//!
//! # Contract
//!
//! - `advance_frame` runs exactly one frame, reading the supplied input
//!   state, and returns the frame it produced plus any audio batches.
//! - `serialize_state` returns the complete machine state, or
//!   [`CoreError::Serialize`](super::error::CoreError::Serialize) when the
//!   core has nothing to snapshot (no ROM loaded).
//! - `deserialize_state` is atomic: it either applies the bytes completely
//!   or fails with [`CoreError::Deserialize`](super::error::CoreError::Deserialize)
//!   and leaves the live state untouched.
//! - Handles are not reentrant. The session guarantees that at most one
//!   operation runs at a time.

use std::path::Path;

use bitflags::bitflags;

use super::error::Result;
use super::frame::{FrameOutput, InputState};

bitflags! {
    /// Options passed when loading a core
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CoreFlags: u8 {
        /// Core may use a hardware-accelerated GL context
        const GL_ALLOWED = 1 << 0;
        /// Core runs on a cooperative-threading (libco) context
        const USE_LIBCO  = 1 << 1;
    }
}

/// Operations the session needs from an emulation engine
pub trait CoreHandle: Send {
    /// Load the engine implementation from `path`
    fn load_core(&mut self, path: &Path, flags: CoreFlags) -> Result<()>;

    /// Load a game image
    fn load_rom(&mut self, path: &Path) -> Result<()>;

    /// Run one frame
    fn advance_frame(&mut self, input: &InputState) -> Result<FrameOutput>;

    /// Snapshot the full machine state
    fn serialize_state(&mut self) -> Result<Vec<u8>>;

    /// Replace the full machine state
    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<()>;

    /// Release engine resources
    ///
    /// Called once by the session on close. Further calls on the handle are
    /// not made.
    fn shutdown(&mut self);
}

impl<C: CoreHandle + ?Sized> CoreHandle for Box<C> {
    fn load_core(&mut self, path: &Path, flags: CoreFlags) -> Result<()> {
        (**self).load_core(path, flags)
    }

    fn load_rom(&mut self, path: &Path) -> Result<()> {
        (**self).load_rom(path)
    }

    fn advance_frame(&mut self, input: &InputState) -> Result<FrameOutput> {
        (**self).advance_frame(input)
    }

    fn serialize_state(&mut self) -> Result<Vec<u8>> {
        (**self).serialize_state()
    }

    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).deserialize_state(bytes)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}

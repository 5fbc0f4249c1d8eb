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

//! Lock-serialized emulation core sessions
//!
//! This library wraps a stateful, non-reentrant emulation core so that it can
//! be driven one frame at a time while its output is consumed concurrently,
//! and so that its full state can be saved and restored even while other
//! threads race against it. Restores are verified with content hashes.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use coresync::core::{CoreSession, SessionSettings, SnapshotService, VirtualCore};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let settings = SessionSettings::new(16, 16, dir.path().join("room.dat"));
//! let session = CoreSession::new("room", VirtualCore::new(16, 16), settings).unwrap();
//! session
//!     .with_core(|core| core.load_rom_bytes("demo", b"demo rom"))
//!     .unwrap()
//!     .unwrap();
//! session.handle_video(|_frame| {}).unwrap();
//! session.handle_audio(|_batch| {}).unwrap();
//!
//! let snapshots = SnapshotService::new(Arc::new(session));
//! snapshots.session().advance_frame().unwrap();
//! snapshots.save().unwrap();
//! let saved = snapshots.current_state_hash().unwrap();
//!
//! snapshots.session().advance_frame().unwrap();
//! snapshots.load().unwrap();
//! assert_eq!(snapshots.current_state_hash().unwrap(), saved);
//! ```

pub mod core;

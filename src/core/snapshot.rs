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

//! State snapshot service
//!
//! Snapshots are compared through content digests rather than byte for
//! byte. A [`StateHash`] is the hex-encoded MD5 of a snapshot; equal hashes
//! mean equal states. Hashing happens outside the core lock, so comparing
//! a pre-save state with a post-load state never holds the critical
//! section longer than one serialize call.
//!
//! # Ordering
//!
//! `save()` followed by `load()` reproduces the saved hash only if no frame
//! advance ran in between. When a driver is advancing concurrently, either
//! serialize the save/load/hash sequence against it, or use
//! [`SnapshotService::verify_round_trip`], which does all three under one
//! lock hold.

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::{CoreError, Result};
use super::handle::CoreHandle;
use super::session::{read_save, CoreSession};

/// Hex-encoded content digest of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHash(String);

impl StateHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Digest a snapshot
///
/// ```
/// use coresync::core::snapshot::hash;
///
/// assert_eq!(hash(b"").as_str(), "d41d8cd98f00b204e9800998ecf8427e");
/// assert_eq!(hash(b"state"), hash(b"state"));
/// ```
pub fn hash(bytes: &[u8]) -> StateHash {
    StateHash(format!("{:x}", md5::compute(bytes)))
}

/// Save, load and fingerprint the state of a shared session
pub struct SnapshotService<C: CoreHandle> {
    session: Arc<CoreSession<C>>,
}

impl<C: CoreHandle> Clone for SnapshotService<C> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
        }
    }
}

impl<C: CoreHandle> SnapshotService<C> {
    pub fn new(session: Arc<CoreSession<C>>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<CoreSession<C>> {
        &self.session
    }

    /// Persist the live state (see [`CoreSession::save`])
    pub fn save(&self) -> Result<()> {
        self.session.save()
    }

    /// Restore the persisted state (see [`CoreSession::load`])
    pub fn load(&self) -> Result<()> {
        self.session.load()
    }

    /// Hash of the live state
    ///
    /// Holds the core lock only while serializing.
    pub fn current_state_hash(&self) -> Result<StateHash> {
        let bytes = self.session.snapshot()?;
        Ok(hash(&bytes))
    }

    /// Hash of the save file
    ///
    /// Reads the file without taking the core lock.
    pub fn persisted_state_hash(&self) -> Result<StateHash> {
        let bytes = read_save(self.session.save_path())?;
        Ok(hash(&bytes))
    }

    /// Live hash and, if a save exists, persisted hash
    pub fn dump_state(&self) -> Result<(StateHash, Option<StateHash>)> {
        let live = self.current_state_hash()?;
        let persisted = match self.persisted_state_hash() {
            Ok(hash) => Some(hash),
            Err(CoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        debug!(
            "Session {}: mem: {}, dat: {}",
            self.session.id(),
            live,
            persisted.as_ref().map_or("-", StateHash::as_str)
        );
        Ok((live, persisted))
    }

    /// Save, load and confirm the live state matches the save file
    ///
    /// Runs under a single lock hold, so it is safe while a driver is
    /// advancing frames. Returns the verified hash.
    pub fn verify_round_trip(&self) -> Result<StateHash> {
        let (persisted, live) = self.session.round_trip()?;
        if persisted != live {
            return Err(CoreError::Deserialize(format!(
                "restored state {} differs from saved state {}",
                live, persisted
            )));
        }
        Ok(live)
    }
}

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

//! Single-shot termination signal
//!
//! Once triggered the signal stays triggered. Every clone observes it, and
//! every thread blocked in [`Termination::wait`] or
//! [`Termination::wait_timeout`] is woken.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    triggered: Mutex<bool>,
    cond: Condvar,
}

/// Broadcast-once stop flag shared between a session and its driver
#[derive(Clone, Default)]
pub struct Termination {
    inner: Arc<Inner>,
}

impl Termination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal
    ///
    /// Returns `true` for the call that actually flipped it.
    pub fn trigger(&self) -> bool {
        let mut triggered = self.flag();
        if *triggered {
            return false;
        }
        *triggered = true;
        self.inner.cond.notify_all();
        true
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag()
    }

    /// Block until triggered
    pub fn wait(&self) {
        let mut triggered = self.flag();
        while !*triggered {
            triggered = self
                .inner
                .cond
                .wait(triggered)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until triggered or `timeout` elapses
    ///
    /// Returns whether the signal is triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self.flag();
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            triggered = guard;
        }
        true
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        // A bool can't be left half-written
        self.inner
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Termination")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

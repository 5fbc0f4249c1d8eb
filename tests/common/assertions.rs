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

//! Custom assertions for save state testing

use coresync::core::snapshot::StateHash;

/// Assert two state hashes are equal, naming the checkpoint on failure
#[allow(dead_code)]
pub fn assert_same_state(expected: &StateHash, actual: &StateHash, checkpoint: &str) {
    assert_eq!(
        expected, actual,
        "State mismatch at {}: expected {}, got {}",
        checkpoint, expected, actual
    );
}

/// Assert frames arrived with consecutive sequence numbers starting at 1
#[allow(dead_code)]
pub fn assert_in_order(seqs: &[u64]) {
    for (i, &seq) in seqs.iter().enumerate() {
        assert_eq!(
            seq,
            i as u64 + 1,
            "Frame {} out of order: got sequence {}",
            i,
            seq
        );
    }
}

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

//! Test ROM images
//!
//! The virtual core accepts any non-empty byte string as a ROM. These
//! helpers produce distinct, deterministic images and write them where a
//! session can load them.

use std::path::{Path, PathBuf};

/// Deterministic pseudo-random ROM image derived from `name`
#[allow(dead_code)]
pub fn rom_image(name: &str, len: usize) -> Vec<u8> {
    let mut x = name.bytes().fold(0x9E37_79B9_7F4A_7C15u64, |acc, b| {
        (acc ^ u64::from(b)).wrapping_mul(0x100_0000_01B3)
    });
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            x as u8
        })
        .collect()
}

/// Write a 4 KiB ROM image named `name` into `dir`
#[allow(dead_code)]
pub fn write_rom(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, rom_image(name, 4096)).expect("Failed to write test ROM");
    path
}

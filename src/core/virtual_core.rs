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

//! Deterministic software core
//!
//! `VirtualCore` implements the [`CoreHandle`] contract without a native
//! engine. It models a tiny machine whose work RAM is seeded from the ROM
//! image and scrambled every frame by a PRNG, the latched controller state
//! and the ROM contents. Video and audio are derived from work RAM, so any
//! difference in machine state shows up in its output as well as in its
//! snapshots.
//!
//! # Save State Format
//!
//! Snapshots are a bincode encoding (standard config) of `MachineState`:
//!
//! ```text
//! version     u32       VIRTUAL_STATE_VERSION
//! rom_digest  [u8; 16]  MD5 of the loaded ROM image
//! frame       u64       frames executed since ROM load
//! rng         u64       xorshift64 state
//! ram         Vec<u8>   WORK_RAM_SIZE bytes
//! buttons     [u16; 4]  controller buttons latched on the last frame
//! ```
//!
//! Restoring decodes into a temporary, with the decoder capped at
//! [`MAX_STATE_SIZE`], and validates it completely before the live state is
//! replaced.

use std::path::{Path, PathBuf};

use bincode::{config, Decode, Encode};
use log::{debug, info};

use super::error::{CoreError, Result};
use super::frame::{AudioBatch, Frame, FrameOutput, InputState, BYTES_PER_PIXEL, MAX_PORTS};
use super::handle::{CoreFlags, CoreHandle};

/// Save state version for compatibility checking
pub const VIRTUAL_STATE_VERSION: u32 = 1;

/// Work RAM size in bytes
pub const WORK_RAM_SIZE: usize = 8 * 1024;

/// Stereo sample pairs produced per frame (44.1 kHz at 60 fps)
pub const SAMPLE_PAIRS_PER_FRAME: usize = 735;

/// Upper bound on an encoded state accepted by restore
///
/// Work RAM plus a generous allowance for the fixed fields. Length prefixes
/// claiming more than this are rejected before anything is allocated.
pub const MAX_STATE_SIZE: usize = WORK_RAM_SIZE + 8 * 1024;

/// RAM bytes scrambled per frame
const MUTATIONS_PER_FRAME: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct MachineState {
    version: u32,
    rom_digest: [u8; 16],
    frame: u64,
    rng: u64,
    ram: Vec<u8>,
    buttons: [u16; MAX_PORTS],
}

impl MachineState {
    fn boot(rom: &[u8]) -> Self {
        let digest = md5::compute(rom).0;
        let seed = digest
            .iter()
            .fold(0u64, |acc, &b| acc.rotate_left(8) ^ u64::from(b));

        let ram = rom.iter().copied().cycle().take(WORK_RAM_SIZE).collect();

        Self {
            version: VIRTUAL_STATE_VERSION,
            rom_digest: digest,
            frame: 0,
            // xorshift gets stuck at zero
            rng: seed | 1,
            ram,
            buttons: [0; MAX_PORTS],
        }
    }

    fn next_random(&mut self) -> u64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        x
    }

    fn step(&mut self, rom: &[u8], input: &InputState) {
        for (latched, port) in self.buttons.iter_mut().zip(input.ports.iter()) {
            *latched = port.buttons.bits();
        }
        let pad = self.buttons.iter().fold(0u16, |acc, b| acc ^ b);

        self.frame += 1;
        for i in 0..MUTATIONS_PER_FRAME {
            let r = self.next_random();
            let addr = (r as usize) % self.ram.len();
            let rom_byte = rom[((self.frame + i) as usize) % rom.len()];
            self.ram[addr] = self.ram[addr]
                .wrapping_add(rom_byte)
                .wrapping_add((r >> 32) as u8)
                ^ (pad as u8);
        }
    }

    fn render(&self, width: u32, height: u32) -> Vec<u8> {
        let pixels = width as usize * height as usize;
        let mut out = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        let len = self.ram.len();
        for i in 0..pixels {
            out.push(self.ram[i % len]);
            out.push(self.ram[(i + 1) % len]);
            out.push(self.frame as u8);
            out.push(0xFF);
        }
        out
    }

    fn mix(&self, batch: usize) -> AudioBatch {
        let len = self.ram.len();
        let base = (self.frame as usize).wrapping_mul(31).wrapping_add(batch * 997);
        (0..SAMPLE_PAIRS_PER_FRAME * 2)
            .map(|i| {
                let lo = self.ram[(base + i) % len];
                let hi = self.ram[(base + i + 1) % len];
                i16::from_le_bytes([lo, hi]) >> 2
            })
            .collect()
    }
}

/// Software implementation of [`CoreHandle`]
///
/// # Example
///
/// ```
/// use coresync::core::handle::CoreHandle;
/// use coresync::core::frame::InputState;
/// use coresync::core::virtual_core::VirtualCore;
///
/// let mut core = VirtualCore::new(32, 16);
/// core.load_rom_bytes("demo", b"demo rom image").unwrap();
///
/// let before = core.serialize_state().unwrap();
/// core.advance_frame(&InputState::new()).unwrap();
/// core.deserialize_state(&before).unwrap();
/// assert_eq!(core.serialize_state().unwrap(), before);
/// ```
pub struct VirtualCore {
    width: u32,
    height: u32,
    core_path: Option<PathBuf>,
    flags: CoreFlags,
    rom_name: Option<String>,
    rom: Vec<u8>,
    state: Option<MachineState>,
    audio_batches: usize,
    attach_audio: bool,
}

impl VirtualCore {
    /// Create a core rendering `width` x `height` frames
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            core_path: None,
            flags: CoreFlags::empty(),
            rom_name: None,
            rom: Vec::new(),
            state: None,
            audio_batches: 1,
            attach_audio: false,
        }
    }

    /// Number of separate audio batches emitted per frame (default 1)
    pub fn with_audio_batches(mut self, batches: usize) -> Self {
        self.audio_batches = batches;
        self
    }

    /// Also attach the first audio batch of each frame to the video frame
    pub fn with_attached_audio(mut self, attach: bool) -> Self {
        self.attach_audio = attach;
        self
    }

    /// Load a ROM image from memory
    pub fn load_rom_bytes(&mut self, name: &str, rom: &[u8]) -> Result<()> {
        if rom.is_empty() {
            return Err(CoreError::RomLoad(format!("{}: empty ROM image", name)));
        }

        let state = MachineState::boot(rom);
        info!(
            "VirtualCore: loaded ROM '{}' ({} bytes, digest {})",
            name,
            rom.len(),
            hex_digest(&state.rom_digest)
        );

        self.rom = rom.to_vec();
        self.rom_name = Some(name.to_string());
        self.state = Some(state);
        Ok(())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn core_path(&self) -> Option<&Path> {
        self.core_path.as_deref()
    }

    pub fn flags(&self) -> CoreFlags {
        self.flags
    }

    pub fn rom_name(&self) -> Option<&str> {
        self.rom_name.as_deref()
    }

    /// Frames executed since the ROM was loaded (or the state restored)
    pub fn frame(&self) -> Option<u64> {
        self.state.as_ref().map(|s| s.frame)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }
}

impl CoreHandle for VirtualCore {
    fn load_core(&mut self, path: &Path, flags: CoreFlags) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(CoreError::CoreLoad("empty core path".to_string()));
        }
        info!("VirtualCore: core '{}' attached ({:?})", path.display(), flags);
        self.core_path = Some(path.to_path_buf());
        self.flags = flags;
        Ok(())
    }

    fn load_rom(&mut self, path: &Path) -> Result<()> {
        if self.core_path.is_none() {
            return Err(CoreError::CoreLoad("no core loaded".to_string()));
        }
        let rom = std::fs::read(path)
            .map_err(|e| CoreError::RomLoad(format!("{}: {}", path.display(), e)))?;
        self.load_rom_bytes(&path.display().to_string(), &rom)
    }

    fn advance_frame(&mut self, input: &InputState) -> Result<FrameOutput> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| CoreError::Advance("no ROM loaded".to_string()))?;

        state.step(&self.rom, input);

        let audio: Vec<AudioBatch> = (0..self.audio_batches).map(|b| state.mix(b)).collect();
        let mut video = Frame::new(self.width, self.height, state.render(self.width, self.height));
        if self.attach_audio {
            if let Some(first) = audio.first() {
                video = video.with_audio(first.clone());
            }
        }

        Ok(FrameOutput { video, audio })
    }

    fn serialize_state(&mut self) -> Result<Vec<u8>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| CoreError::Serialize("no ROM loaded".to_string()))?;

        bincode::encode_to_vec(state, config::standard())
            .map_err(|e| CoreError::Serialize(e.to_string()))
    }

    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<()> {
        let live = self
            .state
            .as_ref()
            .ok_or_else(|| CoreError::Deserialize("no ROM loaded".to_string()))?;

        let (decoded, read): (MachineState, usize) =
            bincode::decode_from_slice(bytes, config::standard().with_limit::<MAX_STATE_SIZE>())
                .map_err(|e| CoreError::Deserialize(e.to_string()))?;

        if read != bytes.len() {
            return Err(CoreError::Deserialize(format!(
                "{} trailing bytes after state",
                bytes.len() - read
            )));
        }
        if decoded.version != VIRTUAL_STATE_VERSION {
            return Err(CoreError::Deserialize(format!(
                "Incompatible save state version: expected {}, got {}",
                VIRTUAL_STATE_VERSION, decoded.version
            )));
        }
        if decoded.rom_digest != live.rom_digest {
            return Err(CoreError::Deserialize(format!(
                "state belongs to ROM {}, loaded ROM is {}",
                hex_digest(&decoded.rom_digest),
                hex_digest(&live.rom_digest)
            )));
        }
        if decoded.ram.len() != WORK_RAM_SIZE {
            return Err(CoreError::Deserialize(format!(
                "invalid work RAM size: {} bytes (expected {})",
                decoded.ram.len(),
                WORK_RAM_SIZE
            )));
        }

        debug!("VirtualCore: restored state at frame {}", decoded.frame);
        self.state = Some(decoded);
        Ok(())
    }

    fn shutdown(&mut self) {
        info!("VirtualCore: shutdown");
        self.state = None;
        self.rom.clear();
        self.rom_name = None;
        self.core_path = None;
    }
}

fn hex_digest(digest: &[u8; 16]) -> String {
    format!("{:x}", md5::Digest(*digest))
}

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

//! Test fixtures for common session scenarios

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use coresync::core::error::Result;
use coresync::core::frame::{FrameOutput, InputState};
use coresync::core::handle::{CoreFlags, CoreHandle};
use coresync::core::session::{CoreSession, SessionSettings};
use coresync::core::snapshot::SnapshotService;
use coresync::core::virtual_core::VirtualCore;
use tempfile::TempDir;

use super::test_roms::write_rom;

/// Frame dimensions used by test sessions
pub const TEST_WIDTH: u32 = 32;
pub const TEST_HEIGHT: u32 = 24;

/// A session with its save directory and consumer threads
pub struct TestSession<C: CoreHandle + 'static> {
    pub dir: TempDir,
    pub session: Arc<CoreSession<C>>,
    pub snapshots: SnapshotService<C>,
    consumers: Vec<JoinHandle<u64>>,
}

#[allow(dead_code)]
impl<C: CoreHandle + 'static> TestSession<C> {
    /// Advance `n` frames
    pub fn run_frames(&self, n: u64) {
        for _ in 0..n {
            self.session.advance_frame().expect("Frame advance failed");
        }
    }

    /// Keep a consumer thread to join on shutdown
    pub fn adopt(&mut self, consumer: JoinHandle<u64>) {
        self.consumers.push(consumer);
    }

    /// Close the session and return each consumer's item count
    pub fn shutdown(self) -> Vec<u64> {
        self.session.close();
        self.consumers
            .into_iter()
            .map(|c| c.join().expect("Consumer panicked"))
            .collect()
    }
}

/// Create a session around `core` without loading anything
#[allow(dead_code)]
pub fn bare_session<C: CoreHandle + 'static>(
    room: &str,
    core: C,
    settings: impl FnOnce(SessionSettings) -> SessionSettings,
) -> TestSession<C> {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let save_path = dir.path().join("saves").join(format!("{}.dat", room));
    let base = SessionSettings::new(TEST_WIDTH, TEST_HEIGHT, save_path);
    let session = Arc::new(
        CoreSession::new(room, core, settings(base)).expect("Failed to create session"),
    );
    let snapshots = SnapshotService::new(Arc::clone(&session));
    TestSession {
        dir,
        session,
        snapshots,
        consumers: Vec::new(),
    }
}

/// Load the core and `rom` into a bare session
#[allow(dead_code)]
pub fn boot<C: CoreHandle + 'static>(test: &TestSession<C>, rom: &str) {
    let rom_path = write_rom(test.dir.path(), rom);
    test.session
        .load_core(Path::new("virtual_libretro.so"), CoreFlags::empty())
        .expect("Failed to load core");
    test.session.load_rom(&rom_path).expect("Failed to load ROM");
}

/// Session with `rom` loaded and no-op video/audio consumers attached
#[allow(dead_code)]
pub fn default_session(room: &str, rom: &str) -> TestSession<VirtualCore> {
    session_with_core(room, rom, VirtualCore::new(TEST_WIDTH, TEST_HEIGHT))
}

/// Same as [`default_session`] around a custom core
#[allow(dead_code)]
pub fn session_with_core<C: CoreHandle + 'static>(
    room: &str,
    rom: &str,
    core: C,
) -> TestSession<C> {
    let mut test = bare_session(room, core, |s| s);
    boot(&test, rom);
    let video = test
        .session
        .handle_video(|_| {})
        .expect("Failed to attach video consumer");
    let audio = test
        .session
        .handle_audio(|_| {})
        .expect("Failed to attach audio consumer");
    test.adopt(video);
    test.adopt(audio);
    test
}

/// Core whose restore reports success without applying the bytes
pub struct IgnoringRestoreCore {
    inner: VirtualCore,
}

#[allow(dead_code)]
impl IgnoringRestoreCore {
    pub fn new() -> Self {
        Self {
            inner: VirtualCore::new(TEST_WIDTH, TEST_HEIGHT),
        }
    }
}

impl CoreHandle for IgnoringRestoreCore {
    fn load_core(&mut self, path: &Path, flags: CoreFlags) -> Result<()> {
        self.inner.load_core(path, flags)
    }

    fn load_rom(&mut self, path: &Path) -> Result<()> {
        self.inner.load_rom(path)
    }

    fn advance_frame(&mut self, input: &InputState) -> Result<FrameOutput> {
        self.inner.advance_frame(input)
    }

    fn serialize_state(&mut self) -> Result<Vec<u8>> {
        self.inner.serialize_state()
    }

    fn deserialize_state(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

/// Core whose first restore runs a stray frame after applying the bytes
///
/// Reports success either way. Later restores behave normally.
pub struct GlitchingRestoreCore {
    inner: VirtualCore,
    glitches: usize,
}

#[allow(dead_code)]
impl GlitchingRestoreCore {
    pub fn new() -> Self {
        Self {
            inner: VirtualCore::new(TEST_WIDTH, TEST_HEIGHT),
            glitches: 1,
        }
    }
}

impl CoreHandle for GlitchingRestoreCore {
    fn load_core(&mut self, path: &Path, flags: CoreFlags) -> Result<()> {
        self.inner.load_core(path, flags)
    }

    fn load_rom(&mut self, path: &Path) -> Result<()> {
        self.inner.load_rom(path)
    }

    fn advance_frame(&mut self, input: &InputState) -> Result<FrameOutput> {
        self.inner.advance_frame(input)
    }

    fn serialize_state(&mut self) -> Result<Vec<u8>> {
        self.inner.serialize_state()
    }

    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.deserialize_state(bytes)?;
        if self.glitches > 0 {
            self.glitches -= 1;
            self.inner.advance_frame(&InputState::new())?;
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

/// Core that flags any snapshot taken while a frame is mid-advance
pub struct TearDetectingCore {
    inner: VirtualCore,
    in_frame: Arc<AtomicBool>,
    torn: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl TearDetectingCore {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let torn = Arc::new(AtomicUsize::new(0));
        let core = Self {
            inner: VirtualCore::new(TEST_WIDTH, TEST_HEIGHT),
            in_frame: Arc::new(AtomicBool::new(false)),
            torn: Arc::clone(&torn),
        };
        (core, torn)
    }

    fn check(&self) {
        if self.in_frame.load(Ordering::SeqCst) {
            self.torn.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl CoreHandle for TearDetectingCore {
    fn load_core(&mut self, path: &Path, flags: CoreFlags) -> Result<()> {
        self.inner.load_core(path, flags)
    }

    fn load_rom(&mut self, path: &Path) -> Result<()> {
        self.inner.load_rom(path)
    }

    fn advance_frame(&mut self, input: &InputState) -> Result<FrameOutput> {
        self.in_frame.store(true, Ordering::SeqCst);
        // Widen the window a racing snapshot would fall into
        thread::sleep(Duration::from_micros(200));
        let output = self.inner.advance_frame(input);
        self.in_frame.store(false, Ordering::SeqCst);
        output
    }

    fn serialize_state(&mut self) -> Result<Vec<u8>> {
        self.check();
        self.inner.serialize_state()
    }

    fn deserialize_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.check();
        self.inner.deserialize_state(bytes)
    }

    fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}

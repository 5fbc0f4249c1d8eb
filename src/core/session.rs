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

//! Core session: the critical section around a core handle
//!
//! A [`CoreSession`] owns one [`CoreHandle`] behind a single mutex. Every
//! operation that touches the handle (frame advance, save, load, volatile
//! snapshots, ROM loading, shutdown) runs while holding that mutex, so they
//! are mutually exclusive and no snapshot can ever observe a half-advanced
//! frame.
//!
//! Output leaves the critical section through three bounded channels
//! (video, audio, input). Consumers never take the core lock; they only
//! drain their channel. The lock gives no fairness guarantee: frame advance
//! and save/load compete for it as equals.
//!
//! # Save files
//!
//! `save()` persists the raw serialized state to the session's save path and
//! `load()` restores whatever that file holds. Frame advance never persists
//! anything, so a `load()` without a preceding `save()` restores the last
//! *persisted* state, not the latest live one.
//!
//! # Consumers
//!
//! The session holds each channel's receiver until a consumer claims it.
//! Attach video and audio consumers before driving the session: once an
//! unclaimed channel is full, `advance_frame` blocks.
//!
//! # Example
//!
//! ```
//! use coresync::core::handle::CoreFlags;
//! use coresync::core::session::{CoreSession, SessionSettings};
//! use coresync::core::virtual_core::VirtualCore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let rom = dir.path().join("demo.rom");
//! std::fs::write(&rom, b"demo rom image").unwrap();
//!
//! let settings = SessionSettings::new(32, 16, dir.path().join("demo.dat"));
//! let session = CoreSession::new("demo", VirtualCore::new(32, 16), settings).unwrap();
//! session.load_core("virtual".as_ref(), CoreFlags::empty()).unwrap();
//! session.load_rom(&rom).unwrap();
//!
//! let video = session.handle_video(|_frame| {}).unwrap();
//! let audio = session.handle_audio(|_batch| {}).unwrap();
//!
//! session.advance_frame().unwrap();
//! session.save().unwrap();
//! session.advance_frame().unwrap();
//! session.load().unwrap();
//!
//! session.close();
//! assert_eq!(video.join().unwrap(), 2);
//! assert_eq!(audio.join().unwrap(), 2);
//! ```

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use super::config::{ChannelConfig, Config};
use super::error::{ConfigError, CoreError, Result};
use super::frame::{AudioBatch, Frame, FrameOutput, InputEvent, InputState};
use super::handle::{CoreFlags, CoreHandle};
use super::paths::temp_path;
use super::sink::{self, ChannelKind, SinkReceiver, SinkSender};
use super::snapshot::{hash, StateHash};
use super::termination::Termination;

/// Construction parameters for a [`CoreSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub width: u32,
    pub height: u32,
    pub save_path: PathBuf,
    pub channels: ChannelConfig,
    pub verify_loads: bool,
    pub remove_save_on_close: bool,
}

impl SessionSettings {
    /// Settings with default channel capacities and load verification on
    pub fn new<P: Into<PathBuf>>(width: u32, height: u32, save_path: P) -> Self {
        Self {
            width,
            height,
            save_path: save_path.into(),
            channels: ChannelConfig::default(),
            verify_loads: true,
            remove_save_on_close: false,
        }
    }

    /// Derive settings for `system` from a loaded configuration
    pub fn from_config(
        config: &Config,
        system: &str,
        session_id: &str,
    ) -> std::result::Result<Self, ConfigError> {
        let meta = config.emulator(system)?;
        config.validate()?;
        Ok(Self {
            width: meta.width,
            height: meta.height,
            save_path: config.paths.save_path(session_id),
            channels: config.channels,
            verify_loads: config.session.verify_loads,
            remove_save_on_close: config.session.remove_save_on_close,
        })
    }

    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_verify_loads(mut self, verify: bool) -> Self {
        self.verify_loads = verify;
        self
    }

    pub fn with_remove_save_on_close(mut self, remove: bool) -> Self {
        self.remove_save_on_close = remove;
        self
    }
}

/// Everything guarded by the core lock
struct CoreSlot<C> {
    /// `None` once the session is closed
    handle: Option<C>,
    video: Option<SinkSender<Frame>>,
    audio: Option<SinkSender<AudioBatch>>,
}

/// Receivers not yet claimed by a consumer
struct Receivers {
    video: Option<SinkReceiver<Frame>>,
    audio: Option<SinkReceiver<AudioBatch>>,
    input: Option<SinkReceiver<InputEvent>>,
}

/// Lock-serialized owner of a core handle
pub struct CoreSession<C: CoreHandle> {
    id: String,
    settings: SessionSettings,
    core: Mutex<CoreSlot<C>>,
    input_tx: Mutex<Option<SinkSender<InputEvent>>>,
    receivers: Mutex<Receivers>,
    controllers: Arc<Mutex<InputState>>,
    termination: Termination,
    frames: AtomicU64,
    closed: AtomicBool,
}

impl<C: CoreHandle> CoreSession<C> {
    /// Attach `core` to a new session
    ///
    /// The session takes ownership of the handle; it is shut down when the
    /// session closes.
    pub fn new<S: Into<String>>(id: S, core: C, settings: SessionSettings) -> Result<Self> {
        settings.channels.validate()?;

        let (video_tx, video_rx) = sink::channel(ChannelKind::Video, settings.channels.video);
        let (audio_tx, audio_rx) = sink::channel(ChannelKind::Audio, settings.channels.audio);
        let (input_tx, input_rx) = sink::channel(ChannelKind::Input, settings.channels.input);

        let id = id.into();
        info!(
            "Session {}: created ({}x{}, save path {})",
            id,
            settings.width,
            settings.height,
            settings.save_path.display()
        );

        Ok(Self {
            id,
            settings,
            core: Mutex::new(CoreSlot {
                handle: Some(core),
                video: Some(video_tx),
                audio: Some(audio_tx),
            }),
            input_tx: Mutex::new(Some(input_tx)),
            receivers: Mutex::new(Receivers {
                video: Some(video_rx),
                audio: Some(audio_rx),
                input: Some(input_rx),
            }),
            controllers: Arc::new(Mutex::new(InputState::new())),
            termination: Termination::new(),
            frames: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.settings.width, self.settings.height)
    }

    pub fn save_path(&self) -> &Path {
        &self.settings.save_path
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Frames advanced so far
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    /// Controller state polled by the core on every frame advance
    pub fn controllers(&self) -> Arc<Mutex<InputState>> {
        Arc::clone(&self.controllers)
    }

    /// Load the engine implementation into the handle
    pub fn load_core(&self, path: &Path, flags: CoreFlags) -> Result<()> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        handle.load_core(path, flags)?;
        info!("Session {}: core {} loaded", self.id, path.display());
        Ok(())
    }

    /// Load a game image into the handle
    pub fn load_rom(&self, path: &Path) -> Result<()> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        handle.load_rom(path)?;
        info!("Session {}: ROM {} loaded", self.id, path.display());
        Ok(())
    }

    /// Run one frame inside the critical section
    ///
    /// Pushes the produced frame onto the video channel and every audio
    /// batch onto the audio channel before releasing the lock. Returns the
    /// frame's sequence number.
    pub fn advance_frame(&self) -> Result<u64> {
        let input = *lock(&self.controllers);

        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        let FrameOutput { mut video, audio } = handle.advance_frame(&input)?;

        // Incremented under the core lock, so sequence numbers follow
        // production order
        let seq = self.frames.fetch_add(1, Ordering::AcqRel) + 1;
        video.seq = seq;

        if let Some(tx) = &slot.video {
            if tx.send(video).is_err() {
                warn!("Session {}: video consumer gone, frame {} dropped", self.id, seq);
            }
        }
        if let Some(tx) = &slot.audio {
            for batch in audio {
                if tx.send(batch).is_err() {
                    warn!("Session {}: audio consumer gone, frame {} audio dropped", self.id, seq);
                    break;
                }
            }
        }

        Ok(seq)
    }

    /// Persist the live state to the save path
    ///
    /// # Errors
    ///
    /// - `Serialize` if the handle cannot produce a snapshot
    /// - `Io` if the file cannot be written; any previous save is kept
    pub fn save(&self) -> Result<()> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        let bytes = handle.serialize_state()?;
        write_save(&self.settings.save_path, &bytes)?;
        info!(
            "Session {}: saved {} bytes to {}",
            self.id,
            bytes.len(),
            self.settings.save_path.display()
        );
        Ok(())
    }

    /// Restore the state persisted at the save path
    ///
    /// # Errors
    ///
    /// - `NotFound` if there is no save file
    /// - `Io` if it cannot be read
    /// - `Deserialize` if the handle rejects the bytes, or (with load
    ///   verification) the restored state doesn't match the file
    pub fn load(&self) -> Result<()> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        let bytes = read_save(&self.settings.save_path)?;
        self.apply_snapshot(handle, &bytes)?;
        info!(
            "Session {}: loaded {} bytes from {}",
            self.id,
            bytes.len(),
            self.settings.save_path.display()
        );
        Ok(())
    }

    /// Volatile in-memory snapshot of the live state
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        handle.serialize_state()
    }

    /// Restore a volatile snapshot
    pub fn restore(&self, bytes: &[u8]) -> Result<()> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        self.apply_snapshot(handle, bytes)
    }

    /// Save, load back and re-hash without releasing the lock
    ///
    /// Returns `(persisted, live)`: the hash of the bytes written and the
    /// hash of the live state after restoring them. No frame advance can run
    /// in between, so the two are equal for any correct handle.
    pub fn round_trip(&self) -> Result<(StateHash, StateHash)> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;

        let saved = handle.serialize_state()?;
        write_save(&self.settings.save_path, &saved)?;
        let persisted = read_save(&self.settings.save_path)?;
        handle.deserialize_state(&persisted)?;
        let live = handle.serialize_state()?;

        Ok((hash(&persisted), hash(&live)))
    }

    /// Run `f` with exclusive access to the handle
    pub fn with_core<R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R> {
        let mut slot = self.lock_core();
        let handle = slot.handle.as_mut().ok_or(CoreError::SessionClosed)?;
        Ok(f(handle))
    }

    /// Enqueue an input event
    ///
    /// Blocks while the input channel is full. Never holds the core lock.
    pub fn push_input(&self, event: InputEvent) -> Result<()> {
        let tx = lock(&self.input_tx)
            .clone()
            .ok_or(CoreError::SessionClosed)?;
        tx.send(event)
            .map_err(|_| CoreError::ChannelClosed(ChannelKind::Input))
    }

    /// Claim the video receiver for manual draining
    pub fn take_video(&self) -> Result<SinkReceiver<Frame>> {
        self.claim(ChannelKind::Video, |r| r.video.take())
    }

    /// Claim the audio receiver for manual draining
    pub fn take_audio(&self) -> Result<SinkReceiver<AudioBatch>> {
        self.claim(ChannelKind::Audio, |r| r.audio.take())
    }

    /// Claim the input receiver for manual draining
    pub fn take_input(&self) -> Result<SinkReceiver<InputEvent>> {
        self.claim(ChannelKind::Input, |r| r.input.take())
    }

    /// Spawn the video consumer
    ///
    /// `handler` sees every frame exactly once, in production order. The
    /// returned thread yields the number of frames handled.
    pub fn handle_video<F>(&self, handler: F) -> Result<JoinHandle<u64>>
    where
        F: FnMut(Frame) + Send + 'static,
    {
        spawn(self.take_video()?, handler)
    }

    /// Spawn the audio consumer
    pub fn handle_audio<F>(&self, handler: F) -> Result<JoinHandle<u64>>
    where
        F: FnMut(AudioBatch) + Send + 'static,
    {
        spawn(self.take_audio()?, handler)
    }

    /// Spawn the input consumer
    pub fn handle_input<F>(&self, handler: F) -> Result<JoinHandle<u64>>
    where
        F: FnMut(InputEvent) + Send + 'static,
    {
        spawn(self.take_input()?, handler)
    }

    /// Spawn an input consumer that applies every event to the controller
    /// state the core polls
    pub fn route_input(&self) -> Result<JoinHandle<u64>> {
        let controllers = self.controllers();
        self.handle_input(move |event| {
            if !lock(&controllers).apply(&event) {
                debug!("Input event for unknown port {} ignored", event.port);
            }
        })
    }

    /// Shut the session down
    ///
    /// Triggers the termination signal, waits for any in-flight critical
    /// section, shuts the handle down and closes every channel. Consumers
    /// still receive whatever was buffered. Calling it again is a no-op.
    pub fn close(&self) {
        self.termination.trigger();

        let mut slot = self.lock_core();
        let Some(mut handle) = slot.handle.take() else {
            return;
        };
        handle.shutdown();
        slot.video = None;
        slot.audio = None;
        self.closed.store(true, Ordering::Release);
        drop(slot);

        lock(&self.input_tx).take();

        if self.settings.remove_save_on_close {
            match fs::remove_file(&self.settings.save_path) {
                Ok(()) => debug!("Session {}: removed save file", self.id),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Session {}: failed to remove save file: {}", self.id, e),
            }
        }

        info!(
            "Session {}: closed after {} frames",
            self.id,
            self.frame_count()
        );
    }

    fn apply_snapshot(&self, handle: &mut C, bytes: &[u8]) -> Result<()> {
        if !self.settings.verify_loads {
            return handle.deserialize_state(bytes);
        }

        let previous = handle.serialize_state().ok();
        handle.deserialize_state(bytes)?;

        let expected = hash(bytes);
        let failure = match handle.serialize_state() {
            Ok(live) => {
                let actual = hash(&live);
                if actual == expected {
                    return Ok(());
                }
                format!(
                    "state did not take effect (expected {}, live {})",
                    expected, actual
                )
            }
            Err(e) => format!("live state unreadable after load: {}", e),
        };

        error!("Session {}: {}", self.id, failure);
        if let Some(previous) = previous {
            if let Err(e) = handle.deserialize_state(&previous) {
                error!("Session {}: rollback failed: {}", self.id, e);
            }
        }
        Err(CoreError::Deserialize(failure))
    }

    fn claim<T>(
        &self,
        kind: ChannelKind,
        select: impl FnOnce(&mut Receivers) -> Option<SinkReceiver<T>>,
    ) -> Result<SinkReceiver<T>> {
        let receiver = select(&mut lock(&self.receivers)).ok_or(CoreError::ConsumerTaken(kind))?;
        debug!("Session {}: {} consumer attached", self.id, kind);
        Ok(receiver)
    }

    fn lock_core(&self) -> MutexGuard<'_, CoreSlot<C>> {
        self.core.lock().unwrap_or_else(|poisoned| {
            // Handle operations are atomic, so the handle is still usable
            warn!("Session {}: core lock poisoned, recovering", self.id);
            poisoned.into_inner()
        })
    }
}

impl<C: CoreHandle> Drop for CoreSession<C> {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}

fn spawn<T, F>(receiver: SinkReceiver<T>, handler: F) -> Result<JoinHandle<u64>>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    sink::spawn_consumer(receiver, handler).map_err(|e| CoreError::Thread(e.to_string()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write a save file through a temporary sibling and rename it into place
fn write_save(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let tmp = temp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });

    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Read a save file, mapping a missing file to `NotFound`
pub(crate) fn read_save(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
        _ => CoreError::Io(e),
    })
}

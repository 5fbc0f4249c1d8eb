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

//! Frame-advance driver loop
//!
//! The driver calls [`CoreSession::advance_frame`] at a fixed rate until the
//! session's termination signal fires (or an optional frame limit is
//! reached), then closes the session. Save/load requests from other threads
//! compete with it for the core lock on equal terms.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use super::error::Result;
use super::handle::CoreHandle;
use super::session::CoreSession;

/// Frame pacing for the driver loop
///
/// Tracks when the next frame is due and measures the achieved frame rate.
/// A target of 0 fps disables pacing.
///
/// # Example
///
/// ```
/// use coresync::core::driver::FrameTimer;
///
/// let mut timer = FrameTimer::new(60);
/// assert!(timer.should_run_frame());
/// timer.tick();
/// assert_eq!(timer.frame_count(), 1);
/// ```
pub struct FrameTimer {
    /// `None` when unthrottled
    target_frame_time: Option<Duration>,
    /// When the last frame ran; `None` before the first
    last_frame: Option<Instant>,
    frame_count: u64,
    fps: f32,
    fps_start: Instant,
    fps_frame_count: u64,
}

impl FrameTimer {
    pub fn new(target_fps: u32) -> Self {
        let target_frame_time =
            (target_fps > 0).then(|| Duration::from_nanos(1_000_000_000 / u64::from(target_fps)));

        Self {
            target_frame_time,
            last_frame: None,
            frame_count: 0,
            fps: 0.0,
            fps_start: Instant::now(),
            fps_frame_count: 0,
        }
    }

    /// Record that a frame just ran
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.frame_count += 1;
        self.fps_frame_count += 1;

        // Recompute roughly once per second
        let fps_elapsed = now.duration_since(self.fps_start);
        if fps_elapsed >= Duration::from_secs(1) {
            self.fps = self.fps_frame_count as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = 0;
            self.fps_start = now;
        }

        self.last_frame = Some(now);
    }

    /// Instant the next frame is due, if paced
    pub fn next_frame_instant(&self) -> Option<Instant> {
        Some(self.last_frame? + self.target_frame_time?)
    }

    /// Time left until the next frame is due
    pub fn time_until_next_frame(&self) -> Duration {
        self.next_frame_instant()
            .map(|due| due.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn should_run_frame(&self) -> bool {
        self.time_until_next_frame().is_zero()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Most recent measured frame rate
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

/// Summary of a driver run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DriverStats {
    /// Frames advanced by this driver
    pub frames: u64,
    pub elapsed: Duration,
}

impl DriverStats {
    /// Average frames per second over the run
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Fixed-rate frame-advance loop over a shared session
pub struct Driver<C: CoreHandle> {
    session: Arc<CoreSession<C>>,
    fps: u32,
    max_frames: Option<u64>,
    close_on_exit: bool,
}

impl<C: CoreHandle + 'static> Driver<C> {
    /// Drive `session` at `fps` frames per second (0 = as fast as possible)
    pub fn new(session: Arc<CoreSession<C>>, fps: u32) -> Self {
        Self {
            session,
            fps,
            max_frames: None,
            close_on_exit: true,
        }
    }

    /// Stop after `frames` frame advances
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    /// Whether to close the session when the loop ends (default: yes)
    pub fn with_close_on_exit(mut self, close: bool) -> Self {
        self.close_on_exit = close;
        self
    }

    /// Run the loop on the current thread
    ///
    /// Ends when the termination signal fires, the frame limit is reached,
    /// or a frame advance fails. In-flight save/load calls finish before the
    /// session closes.
    pub fn run(&self) -> Result<DriverStats> {
        let termination = self.session.termination().clone();
        let mut timer = FrameTimer::new(self.fps);
        let start = Instant::now();

        info!(
            "Driver: session {} at {} fps{}",
            self.session.id(),
            self.fps,
            self.max_frames
                .map(|n| format!(", {} frames", n))
                .unwrap_or_default()
        );

        let outcome = loop {
            if termination.is_triggered() {
                debug!("Driver: termination signalled");
                break Ok(());
            }
            if self.max_frames.is_some_and(|max| timer.frame_count() >= max) {
                break Ok(());
            }

            let wait = timer.time_until_next_frame();
            if !wait.is_zero() && termination.wait_timeout(wait) {
                debug!("Driver: termination signalled while waiting");
                break Ok(());
            }

            match self.session.advance_frame() {
                Ok(_) => timer.tick(),
                // Closed underneath us by another thread
                Err(e) if e.is_closed() => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let stats = DriverStats {
            frames: timer.frame_count(),
            elapsed: start.elapsed(),
        };

        if self.close_on_exit {
            self.session.close();
        }

        info!(
            "Driver: stopped after {} frames ({:.1} fps)",
            stats.frames,
            stats.average_fps()
        );
        outcome.map(|()| stats)
    }

    /// Run the loop on a dedicated thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<DriverStats>>> {
        thread::Builder::new()
            .name("frame-driver".to_string())
            .spawn(move || self.run())
    }
}

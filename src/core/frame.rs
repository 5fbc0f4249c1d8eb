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

//! Output and input data carried through the frame sink channels
//!
//! A [`Frame`] owns its pixel buffer. Once the session enqueues it, nothing
//! else holds a reference to it, so consumers can keep or mutate it freely.

use bitflags::bitflags;

/// Bytes per pixel in frame buffers (RGBA8888)
pub const BYTES_PER_PIXEL: usize = 4;

/// Maximum number of controller ports tracked by [`InputState`]
pub const MAX_PORTS: usize = 4;

/// Number of analog axes per controller
pub const AXES_PER_CONTROLLER: usize = 4;

/// Batch of interleaved stereo samples
pub type AudioBatch = Vec<i16>;

/// One video frame produced by a frame advance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Session sequence number (1-based), stamped by the session
    pub seq: u64,

    pub width: u32,
    pub height: u32,

    /// RGBA8888 pixels, row-major, `width * height * 4` bytes
    pub pixels: Vec<u8>,

    /// Audio produced alongside this frame, if the core attaches it
    pub audio: Option<AudioBatch>,
}

impl Frame {
    /// Create an unsequenced frame
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            seq: 0,
            width,
            height,
            pixels,
            audio: None,
        }
    }

    /// Attach an audio batch to this frame
    pub fn with_audio(mut self, audio: AudioBatch) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Expected pixel buffer length for the frame's dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Everything one frame advance produced
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub video: Frame,
    /// Zero or more audio batches, delivered in order
    pub audio: Vec<AudioBatch>,
}

bitflags! {
    /// Digital joypad buttons
    ///
    /// Bit positions follow the common retro joypad layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u16 {
        const B      = 1 << 0;
        const Y      = 1 << 1;
        const SELECT = 1 << 2;
        const START  = 1 << 3;
        const UP     = 1 << 4;
        const DOWN   = 1 << 5;
        const LEFT   = 1 << 6;
        const RIGHT  = 1 << 7;
        const A      = 1 << 8;
        const X      = 1 << 9;
        const L      = 1 << 10;
        const R      = 1 << 11;
        const L2     = 1 << 12;
        const R2     = 1 << 13;
        const L3     = 1 << 14;
        const R3     = 1 << 15;
    }
}

/// Analog axis identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
}

/// The control an input event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Button(Buttons),
    Axis(Axis),
}

/// A single input change from an external input source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Controller port index
    pub port: usize,
    pub control: Control,
    /// Non-zero means pressed for buttons; axis position otherwise
    pub value: i16,
}

impl InputEvent {
    pub fn button(port: usize, button: Buttons, pressed: bool) -> Self {
        Self {
            port,
            control: Control::Button(button),
            value: i16::from(pressed),
        }
    }

    pub fn axis(port: usize, axis: Axis, value: i16) -> Self {
        Self {
            port,
            control: Control::Axis(axis),
            value,
        }
    }

    pub fn pressed(&self) -> bool {
        self.value != 0
    }
}

/// Latched state of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerState {
    pub buttons: Buttons,
    pub axes: [i16; AXES_PER_CONTROLLER],
}

/// Controller state the core polls during a frame advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputState {
    pub ports: [ControllerState; MAX_PORTS],
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an input event
    ///
    /// Returns `false` if the event targets a port outside `0..MAX_PORTS`;
    /// such events are ignored.
    pub fn apply(&mut self, event: &InputEvent) -> bool {
        let Some(port) = self.ports.get_mut(event.port) else {
            return false;
        };

        match event.control {
            Control::Button(button) => port.buttons.set(button, event.pressed()),
            Control::Axis(axis) => port.axes[axis as usize] = event.value,
        }
        true
    }

    pub fn port(&self, index: usize) -> Option<&ControllerState> {
        self.ports.get(index)
    }

    /// Release every button and center every axis
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

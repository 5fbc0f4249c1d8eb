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

//! Frame sink channels
//!
//! Bounded, ordered queues that carry core output (video frames, audio
//! batches) and input events between the session and its consumers.
//!
//! # Delivery guarantees
//!
//! - Items are delivered in production order, exactly once.
//! - A full channel blocks the producer; nothing is ever dropped.
//! - Dropping the sender closes the channel, but buffered items are still
//!   delivered before the receiver observes the closure.
//!
//! Each channel has a single logical consumer. Fan-out, if needed, is the
//! consumer's job.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace};

/// Default video channel capacity (frames)
pub const DEFAULT_VIDEO_CAPACITY: usize = 30;

/// Default audio channel capacity (sample batches)
pub const DEFAULT_AUDIO_CAPACITY: usize = 30;

/// Default input channel capacity (events)
pub const DEFAULT_INPUT_CAPACITY: usize = 100;

/// Identifies one of the three session channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Video,
    Audio,
    Input,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Video => "video",
            ChannelKind::Audio => "audio",
            ChannelKind::Input => "input",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`SinkSender::send`] when the receiving side is gone
///
/// Carries the undelivered item back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct Disconnected<T>(pub T);

/// Producer half of a frame sink channel
pub struct SinkSender<T> {
    tx: SyncSender<T>,
    kind: ChannelKind,
}

// Manual impl: `T` itself doesn't need to be `Clone`
impl<T> Clone for SinkSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            kind: self.kind,
        }
    }
}

impl<T> SinkSender<T> {
    /// Push an item, blocking while the channel is full
    pub fn send(&self, item: T) -> Result<(), Disconnected<T>> {
        self.tx.send(item).map_err(|mpsc::SendError(item)| {
            debug!("{} channel: receiver gone, item not delivered", self.kind);
            Disconnected(item)
        })
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
}

/// Consumer half of a frame sink channel
pub struct SinkReceiver<T> {
    rx: Receiver<T>,
    kind: ChannelKind,
}

impl<T> SinkReceiver<T> {
    /// Block until the next item arrives
    ///
    /// Returns `None` once the channel is closed and fully drained.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Non-blocking receive
    ///
    /// `Ok(None)` means the channel is empty but still open.
    pub fn try_recv(&self) -> Result<Option<T>, Closed> {
        match self.rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Closed),
        }
    }

    /// Receive with a deadline
    ///
    /// `Ok(None)` means the timeout elapsed with the channel still open.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<T>, Closed> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Closed),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Blocking iterator over the remaining items until closure
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.iter()
    }
}

impl<T> IntoIterator for SinkReceiver<T> {
    type Item = T;
    type IntoIter = mpsc::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}

/// The channel has been closed and drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closed;

/// Create a bounded frame sink channel
///
/// # Panics
///
/// Panics if `capacity` is 0. A zero-capacity channel would turn every push
/// into a rendezvous with the consumer while the core lock is held.
pub fn channel<T>(kind: ChannelKind, capacity: usize) -> (SinkSender<T>, SinkReceiver<T>) {
    assert!(capacity > 0, "{} channel capacity must be at least 1", kind);
    let (tx, rx) = mpsc::sync_channel(capacity);
    (SinkSender { tx, kind }, SinkReceiver { rx, kind })
}

/// Spawn a consumer thread that runs `handler` for every item
///
/// The thread exits once the channel is closed and drained. Joining it
/// yields the number of items handled.
pub fn spawn_consumer<T, F>(receiver: SinkReceiver<T>, mut handler: F) -> std::io::Result<JoinHandle<u64>>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    let kind = receiver.kind();
    thread::Builder::new()
        .name(format!("{}-consumer", kind))
        .spawn(move || {
            let mut handled = 0u64;
            for item in receiver {
                handler(item);
                handled += 1;
                trace!("{} consumer: handled item {}", kind, handled);
            }
            debug!("{} consumer: channel closed after {} items", kind, handled);
            handled
        })
}

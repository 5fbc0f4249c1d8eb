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

//! Frame sink channel integration tests

mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::assertions::assert_in_order;
use common::fixtures::{bare_session, boot};
use coresync::core::config::ChannelConfig;
use coresync::core::frame::{Buttons, InputEvent};
use coresync::core::virtual_core::VirtualCore;
use coresync::core::CoreError;
use proptest::prelude::*;

fn virtual_core() -> VirtualCore {
    VirtualCore::new(common::fixtures::TEST_WIDTH, common::fixtures::TEST_HEIGHT)
}

#[test]
fn test_every_frame_delivered_in_order() {
    let mut test = bare_session("ordering", virtual_core(), |s| s);
    boot(&test, "A.rom");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let video = test
        .session
        .handle_video(move |frame| {
            assert_eq!(frame.pixels.len(), frame.expected_len());
            sink.lock().unwrap().push(frame.seq);
        })
        .unwrap();
    let audio = test.session.handle_audio(|_| {}).unwrap();
    test.adopt(video);
    test.adopt(audio);

    test.run_frames(500);
    let counts = test.shutdown();

    assert_eq!(counts, vec![500, 500]);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 500);
    assert_in_order(&seen);
}

#[test]
fn test_frames_are_never_empty() {
    let mut test = bare_session("non_empty", virtual_core(), |s| s);
    boot(&test, "A.rom");
    let video = test
        .session
        .handle_video(|frame| assert!(!frame.is_empty(), "empty video frame"))
        .unwrap();
    let audio = test
        .session
        .handle_audio(|batch| assert!(!batch.is_empty(), "empty audio batch"))
        .unwrap();
    test.adopt(video);
    test.adopt(audio);

    test.run_frames(60);
    assert_eq!(test.shutdown(), vec![60, 60]);
}

#[test]
fn test_close_drains_buffered_frames() {
    let test = bare_session("drain", virtual_core(), |s| s);
    boot(&test, "A.rom");
    let video = test.session.take_video().unwrap();
    let audio = test.session.take_audio().unwrap();

    // Fits entirely in the default buffers, so no consumer is needed yet
    test.run_frames(20);
    test.session.close();

    let frames: Vec<u64> = video.into_iter().map(|frame| frame.seq).collect();
    assert_eq!(frames.len(), 20);
    assert_in_order(&frames);
    assert_eq!(audio.into_iter().count(), 20);
    test.shutdown();
}

#[test]
fn test_slow_consumer_applies_backpressure() {
    let channels = ChannelConfig {
        video: 2,
        audio: 2,
        input: 2,
    };
    let mut test = bare_session("backpressure", virtual_core(), |s| s.with_channels(channels));
    boot(&test, "A.rom");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let video = test
        .session
        .handle_video(move |frame| {
            thread::sleep(Duration::from_millis(2));
            sink.lock().unwrap().push(frame.seq);
        })
        .unwrap();
    let audio = test.session.handle_audio(|_| {}).unwrap();
    test.adopt(video);
    test.adopt(audio);

    test.run_frames(40);
    assert_eq!(test.shutdown(), vec![40, 40]);
    assert_in_order(&seen.lock().unwrap());
}

#[test]
fn test_multiple_audio_batches_per_frame() {
    let core = virtual_core().with_audio_batches(3);
    let mut test = bare_session("audio_batches", core, |s| s);
    boot(&test, "A.rom");
    let video = test.session.handle_video(|_| {}).unwrap();
    let audio = test.session.handle_audio(|_| {}).unwrap();
    test.adopt(video);
    test.adopt(audio);

    test.run_frames(10);
    assert_eq!(test.shutdown(), vec![10, 30]);
}

#[test]
fn test_input_events_in_order() {
    let mut test = bare_session("input_order", virtual_core(), |s| s);
    boot(&test, "A.rom");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let input = test
        .session
        .handle_input(move |event: InputEvent| sink.lock().unwrap().push(event.value))
        .unwrap();
    test.adopt(input);

    for value in 0..300i16 {
        test.session
            .push_input(InputEvent::button(0, Buttons::A, value % 2 == 1))
            .unwrap();
    }

    assert_eq!(test.shutdown(), vec![300]);
    let expected: Vec<i16> = (0..300).map(|v| v % 2).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn test_routed_input_reaches_core() {
    let mut plain = bare_session("input_plain", virtual_core(), |s| s);
    let mut pressed = bare_session("input_pressed", virtual_core(), |s| s);

    for test in [&mut plain, &mut pressed] {
        boot(test, "A.rom");
        let video = test.session.handle_video(|_| {}).unwrap();
        let audio = test.session.handle_audio(|_| {}).unwrap();
        test.adopt(video);
        test.adopt(audio);
    }

    // Apply the press directly so it is in effect before the first frame
    pressed
        .session
        .controllers()
        .lock()
        .unwrap()
        .apply(&InputEvent::button(0, Buttons::START, true));

    plain.run_frames(5);
    pressed.run_frames(5);
    assert_ne!(
        plain.snapshots.current_state_hash().unwrap(),
        pressed.snapshots.current_state_hash().unwrap()
    );

    plain.shutdown();
    pressed.shutdown();
}

#[test]
fn test_input_after_consumer_gone() {
    let test = bare_session("input_gone", virtual_core(), |s| s);
    drop(test.session.take_input().unwrap());
    assert!(matches!(
        test.session.push_input(InputEvent::button(0, Buttons::B, true)),
        Err(CoreError::ChannelClosed(_))
    ));
    test.shutdown();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_consumer_sees_every_frame(frames in 1u64..120, capacity in 1usize..8) {
        let channels = ChannelConfig { video: capacity, audio: capacity, input: 1 };
        let test = bare_session("prop_channels", virtual_core(), |s| s.with_channels(channels));
        boot(&test, "P.rom");

        let video = test.session.take_video().unwrap();
        let audio = test.session.handle_audio(|_| {}).unwrap();
        let collector = thread::spawn(move || video.into_iter().map(|f| f.seq).collect::<Vec<_>>());

        test.run_frames(frames);
        test.session.close();

        let seen = collector.join().unwrap();
        prop_assert_eq!(seen.len() as u64, frames);
        prop_assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
        prop_assert_eq!(audio.join().unwrap(), frames);
        test.shutdown();
    }
}

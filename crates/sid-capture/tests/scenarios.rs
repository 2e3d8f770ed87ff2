//! End-to-end capture sessions over hand-assembled driver routines.
//!
//! Each fixture loads at $1000 with the init routine first and the play
//! routine at $1001 unless noted. All addresses are little-endian in the
//! assembled bytes; SID registers live at $D400.

mod common;

use common::parse_psid;
use sid_capture::{capture, capture_bytes, CaptureConfig, CaptureError, SidRegisters};

fn config(frames: u32) -> CaptureConfig {
    CaptureConfig {
        frames,
        ..CaptureConfig::default()
    }
}

#[test]
fn frequency_halves_resolve_at_frame_end() {
    // init: RTS
    // play: LDA #$00, STA $D400, LDA #$10, STA $D401, RTS
    let sid = parse_psid(
        0x1000,
        0x1000,
        0x1001,
        &[
            0x60, //
            0xA9, 0x00, 0x8D, 0x00, 0xD4, //
            0xA9, 0x10, 0x8D, 0x01, 0xD4, //
            0x60,
        ],
    );

    let trace = capture(&sid, &config(1)).expect("capture succeeds");
    assert_eq!(trace.frames.len(), 1);
    assert_eq!(trace.frames[0].voices[0].frequency, 0x1000);
    assert_eq!(trace.frames[0].writes.len(), 2);
}

#[test]
fn high_then_low_order_resolves_the_same() {
    // play: LDA #$12, STA $D401, LDA #$34, STA $D400, RTS
    let sid = parse_psid(
        0x1000,
        0x1000,
        0x1001,
        &[
            0x60, //
            0xA9, 0x12, 0x8D, 0x01, 0xD4, //
            0xA9, 0x34, 0x8D, 0x00, 0xD4, //
            0x60,
        ],
    );

    let trace = capture(&sid, &config(1)).expect("capture succeeds");
    assert_eq!(trace.frames[0].voices[0].frequency, 0x1234);
}

/// Play routine that writes the frequency low byte on its first call and
/// the high byte on every later call, using $10 as a call counter.
fn split_write_fixture() -> format_sid::SidFile {
    parse_psid(
        0x1000,
        0x1000,
        0x1001,
        &[
            0x60, // init: RTS
            0xA5, 0x10, // LDA $10
            0xD0, 0x08, // BNE +8
            0xE6, 0x10, // INC $10
            0xA9, 0x34, 0x8D, 0x00, 0xD4, // LDA #$34, STA $D400
            0x60, // RTS
            0xA9, 0x12, 0x8D, 0x01, 0xD4, // LDA #$12, STA $D401
            0x60, // RTS
        ],
    )
}

#[test]
fn half_written_field_is_not_observable_across_frames() {
    let trace = capture(&split_write_fixture(), &config(2)).expect("capture succeeds");

    // Frame 0 saw only the low half: the high half reads as power-on zero
    assert_eq!(trace.frames[0].voices[0].frequency, 0x0034);
    // Frame 1 completes the pair
    assert_eq!(trace.frames[1].voices[0].frequency, 0x1234);
}

#[test]
fn identical_inputs_give_byte_identical_traces() {
    let sid = split_write_fixture();
    let first = capture(&sid, &config(5)).expect("capture succeeds");
    let second = capture(&sid, &config(5)).expect("capture succeeds");

    assert_eq!(first, second);
    assert_eq!(
        first.to_json().expect("serializes"),
        second.to_json().expect("serializes")
    );
}

#[test]
fn successful_capture_has_exactly_the_requested_frames() {
    // init: RTS / play: RTS — a driver that never touches the chip
    let sid = parse_psid(0x1000, 0x1000, 0x1001, &[0x60, 0x60]);

    let trace = capture(&sid, &config(5)).expect("capture succeeds");
    assert_eq!(trace.requested_frames, 5);
    assert_eq!(trace.frames.len(), 5);
    for (i, frame) in trace.frames.iter().enumerate() {
        // Indices are gap-free and every frame has a snapshot, writes or not
        assert_eq!(frame.index, i as u32);
        assert!(frame.writes.is_empty());
        assert_eq!(frame.voices[0].frequency, 0);
        assert!(!frame.voices[0].gate);
    }
}

#[test]
fn hung_play_routine_times_out_with_empty_trace() {
    // play: JMP $1001 — never returns
    let sid = parse_psid(0x1000, 0x1000, 0x1001, &[0x60, 0x4C, 0x01, 0x10]);

    let partial = capture(&sid, &config(3)).expect_err("capture must fail");
    assert!(partial.trace.frames.is_empty());
    assert!(matches!(
        partial.error,
        CaptureError::FrameTimeout { frame: 0, .. }
    ));
}

#[test]
fn failure_after_some_frames_keeps_them() {
    // play: INC $10, LDA $10, CMP #$03, BNE +1, JAM($02), RTS
    // Frames 0 and 1 return normally; the third call executes the JAM.
    let sid = parse_psid(
        0x1000,
        0x1000,
        0x1001,
        &[
            0x60, // init: RTS
            0xE6, 0x10, // INC $10
            0xA5, 0x10, // LDA $10
            0xC9, 0x03, // CMP #$03
            0xD0, 0x01, // BNE +1
            0x02, // JAM
            0x60, // RTS
        ],
    );

    let partial = capture(&sid, &config(5)).expect_err("capture must fail");
    assert_eq!(partial.trace.frames.len(), 2);
    assert!(matches!(
        partial.error,
        CaptureError::Frame { frame: 2, .. }
    ));
}

#[test]
fn init_writes_belong_to_frame_zero() {
    // init: LDA #$0F, STA $D418, RTS / play at $1006: RTS
    let sid = parse_psid(
        0x1000,
        0x1000,
        0x1006,
        &[0xA9, 0x0F, 0x8D, 0x18, 0xD4, 0x60, 0x60],
    );

    let trace = capture(&sid, &config(1)).expect("capture succeeds");
    assert_eq!(trace.frames[0].filter.mode_volume, 0x0F);
    assert!(trace.frames[0]
        .writes
        .iter()
        .any(|w| w.reg == 0x18 && w.value == 0x0F));
}

#[test]
fn init_receives_the_song_index_in_a() {
    // init: STA $D418, RTS / play at $1004: RTS
    let sid = parse_psid(0x1000, 0x1000, 0x1004, &[0x8D, 0x18, 0xD4, 0x60, 0x60]);

    let cfg = CaptureConfig {
        frames: 1,
        song: 4, // 1-based; A gets 3
        ..CaptureConfig::default()
    };
    let trace = capture(&sid, &cfg).expect("capture succeeds");
    assert_eq!(trace.frames[0].filter.mode_volume, 0x03);
}

#[test]
fn replaying_frame_events_reproduces_snapshots() {
    let trace = capture(&split_write_fixture(), &config(4)).expect("capture succeeds");

    for upto in &trace.frames {
        let mut replay = SidRegisters::new();
        for frame in &trace.frames[..=upto.index as usize] {
            for write in &frame.writes {
                replay.on_write(0xD400 | u16::from(write.reg), write.value);
            }
            if frame.index < upto.index {
                replay.end_frame();
            }
        }
        assert_eq!(replay.voice_state(0), upto.voices[0]);
        assert_eq!(replay.voice_state(1), upto.voices[1]);
        assert_eq!(replay.voice_state(2), upto.voices[2]);
        assert_eq!(replay.filter_state(), upto.filter);
    }
}

#[test]
fn garbage_bytes_fail_as_format_error() {
    let partial = capture_bytes(b"not a sid file", &config(1)).expect_err("must fail");
    assert!(partial.trace.frames.is_empty());
    assert!(matches!(partial.error, CaptureError::Format(_)));
}

#[test]
fn json_round_trip_of_a_captured_trace() {
    let trace = capture(&split_write_fixture(), &config(3)).expect("capture succeeds");
    let json = trace.to_json().expect("serializes");
    let back = sid_capture::Trace::from_json(&json).expect("parses");
    assert_eq!(back, trace);
}

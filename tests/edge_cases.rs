//! Edge case tests: command rejection, framing robustness, and fault
//! surfacing.

use scanrig::{
    hal::{MockCounter, MockHost, MockIrq, MockSensor, MockStepper},
    protocol::{self, decode_header, encode_header, resync, HEADER_LEN, HEADER_TAG},
    CaptureController, Error, ProtocolError, ScanConfig, ScanDevice, ScanState,
};

type Device = ScanDevice<MockStepper, MockStepper, MockSensor, MockHost, MockCounter, MockIrq>;

fn device() -> Device {
    let config = ScanConfig::default()
        .with_resolution(2, 2)
        .with_steps_per_pixel(1, 1);
    let controller = CaptureController::new(
        MockStepper::new(),
        MockStepper::new(),
        MockSensor::new(),
        MockHost::new(),
        config,
    );
    ScanDevice::new(controller, MockCounter::new(), MockIrq::new())
}

// ============================================================================
// Command rejection
// ============================================================================

#[test]
fn start_rejected_while_homing() {
    let mut dev = device();
    dev.on_string_command("start").unwrap();
    assert_eq!(dev.controller().state(), ScanState::Homing);
    assert_eq!(dev.on_string_command("start"), Err(Error::Busy));
}

#[test]
fn manual_move_rejected_during_scan() {
    let mut dev = device();
    dev.on_string_command("start").unwrap();
    assert_eq!(dev.on_string_command("motor-move 1 1"), Err(Error::Busy));
}

#[test]
fn config_rejected_during_scan() {
    let mut dev = device();
    dev.on_string_command("start").unwrap();
    assert_eq!(
        dev.on_string_command("config resolution 4 4"),
        Err(Error::Busy)
    );
}

#[test]
fn oversized_resolution_rejected() {
    let mut dev = device();
    assert_eq!(
        dev.on_string_command("config resolution 100 4"),
        Err(Error::Unsupported)
    );
    // Configuration unchanged.
    assert_eq!(dev.controller().config().width, 2);
}

#[test]
fn stop_while_idle_is_a_no_op() {
    let mut dev = device();
    dev.on_string_command("stop").unwrap();
    assert_eq!(dev.controller().state(), ScanState::Idle);
    assert!(dev.controller().host().frames.is_empty());
}

#[test]
fn pause_outside_scan_is_a_no_op() {
    let mut dev = device();
    dev.on_string_command("pause").unwrap();
    assert_eq!(dev.controller().state(), ScanState::Idle);
}

#[test]
fn malformed_arguments_rejected() {
    let mut dev = device();
    assert_eq!(
        dev.on_string_command("motor-move 1"),
        Err(Error::Protocol(ProtocolError::BadArgument))
    );
    assert_eq!(
        dev.on_string_command("config precision 2"),
        Err(Error::Protocol(ProtocolError::BadArgument))
    );
    assert_eq!(
        dev.on_string_command("config bogus-key 1"),
        Err(Error::Protocol(ProtocolError::BadArgument))
    );
}

#[test]
fn unknown_binary_id_rejected() {
    let mut dev = device();
    assert_eq!(
        dev.on_binary_payload(&0x7777u16.to_le_bytes()),
        Err(Error::Protocol(ProtocolError::UnknownCommand))
    );
}

// ============================================================================
// Framing robustness
// ============================================================================

#[test]
fn resync_finds_frame_after_corruption() {
    // A torn frame tail followed by a complete valid header.
    let mut stream = Vec::new();
    stream.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x42]);
    stream.extend_from_slice(&encode_header(true, 5));
    stream.extend_from_slice(b"start");

    let skip = resync(&stream);
    assert_eq!(skip, 5);
    let header = decode_header(&stream[skip..]).unwrap();
    assert!(header.is_string);
    assert_eq!(header.len, 5);
    assert_eq!(&stream[skip + HEADER_LEN..], b"start");
}

#[test]
fn resync_is_not_fooled_by_stray_tag_bytes() {
    // A tag byte whose would-be header fails the reserved-byte check,
    // and nothing after it qualifies either.
    let stream = [0x00, HEADER_TAG, 0x02, 0x00, 0x55, 0x01];
    assert_eq!(resync(&stream), stream.len());
}

#[test]
fn resync_keeps_trailing_partial_header() {
    let mut stream = vec![0x13u8, 0x37];
    stream.extend_from_slice(&encode_header(false, 10)[..2]);
    assert_eq!(resync(&stream), 2);
}

#[test]
fn header_length_word_separates_string_and_binary() {
    let binary = encode_header(false, 300);
    let string = encode_header(true, 300);
    assert_ne!(binary, string);
    assert!(!decode_header(&binary).unwrap().is_string);
    assert!(decode_header(&string).unwrap().is_string);
    assert_eq!(decode_header(&string).unwrap().len, 300);
}

// ============================================================================
// Fault surfacing
// ============================================================================

#[test]
fn dropped_events_flagged_in_status() {
    let mut dev = device();
    // Flood the queue past capacity from interrupt context.
    for _ in 0..32 {
        dev.on_sensor_irq();
    }
    assert!(dev.dropped_events() > 0);
    dev.poll();

    dev.on_string_command("report").unwrap();
    let frame = dev.controller().host().frames.last().unwrap();
    let report = protocol::decode_status_payload(&frame[HEADER_LEN..]).unwrap();
    assert!(report.flags.contains(protocol::StatusFlags::FAULT));

    // A delivered report clears the counter; the flag does not latch.
    assert_eq!(dev.dropped_events(), 0);
    dev.on_string_command("report").unwrap();
    let frame = dev.controller().host().frames.last().unwrap();
    let report = protocol::decode_status_payload(&frame[HEADER_LEN..]).unwrap();
    assert!(!report.flags.contains(protocol::StatusFlags::FAULT));
}

#[test]
fn transmit_failure_does_not_abort_the_scan() {
    let config = ScanConfig::default()
        .with_resolution(2, 1)
        .with_steps_per_pixel(1, 1);
    let mut controller = CaptureController::new(
        MockStepper::new(),
        MockStepper::new(),
        MockSensor::new(),
        MockHost::new(),
        config,
    );
    // A status report on a dead link is logged and dropped.
    controller.host_mut().fail = true;
    controller.send_status(0, false).unwrap();
    assert!(controller.host().frames.is_empty());
    assert_eq!(controller.state(), ScanState::Idle);
}

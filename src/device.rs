//! Device assembly: the one value a firmware binary owns.
//!
//! [`ScanDevice`] wires the interrupt gate, the wide clock, the timer
//! pool, the event queue, and the capture controller together. The
//! platform layer calls exactly three kinds of entry point:
//!
//! - `on_timer_irq` / `on_sensor_irq` from interrupt context — these
//!   only move work onto the event queue and return immediately;
//! - `poll` from the main loop — drains the queue and runs the
//!   controller;
//! - `on_string_command` / `on_binary_payload` from the transport — parse
//!   and dispatch one host command.
//!
//! Nothing here is a static: the binary constructs the device, and
//! desktop tests construct one over the mock HAL.

use heapless::Vec;

use crate::capture::CaptureController;
use crate::clock::WideClock;
use crate::error::Result;
use crate::event::{Event, EventQueue, SchedCtx, ScanTimerWheel, EVENT_CAPACITY, TIMER_SLOTS};
use crate::irq::IrqGate;
use crate::protocol::{self, Command};
use crate::traits::{Clock, CycleCounter, HostLink, InterruptMask, ScanSensor, StepperDrive};

/// The assembled scan device.
pub struct ScanDevice<X, Y, S, H, C, M>
where
    X: StepperDrive,
    Y: StepperDrive,
    S: ScanSensor,
    H: HostLink,
    C: CycleCounter,
    M: InterruptMask,
{
    gate: IrqGate<M>,
    clock: WideClock<C>,
    wheel: ScanTimerWheel,
    queue: EventQueue<EVENT_CAPACITY>,
    controller: CaptureController<X, Y, S, H>,
    dropped_events: u32,
}

impl<X, Y, S, H, C, M> ScanDevice<X, Y, S, H, C, M>
where
    X: StepperDrive,
    Y: StepperDrive,
    S: ScanSensor,
    H: HostLink,
    C: CycleCounter,
    M: InterruptMask,
{
    /// Assembles a device from its parts.
    pub fn new(controller: CaptureController<X, Y, S, H>, counter: C, mask: M) -> Self {
        Self {
            gate: IrqGate::new(mask),
            clock: WideClock::new(counter),
            wheel: ScanTimerWheel::new(),
            queue: EventQueue::new(),
            controller,
            dropped_events: 0,
        }
    }

    /// The capture controller (state inspection).
    pub fn controller(&self) -> &CaptureController<X, Y, S, H> {
        &self.controller
    }

    /// The widened clock.
    pub fn clock(&self) -> &WideClock<C> {
        &self.clock
    }

    /// Events lost to a full queue since the last status report.
    pub fn dropped_events(&self) -> u32 {
        self.dropped_events
    }

    /// Hardware-timer interrupt entry point.
    ///
    /// Pops every due deadline into the event queue and returns the next
    /// pending deadline so the platform layer can re-arm its compare
    /// register. Runs with the caller's interrupt context; does not
    /// dispatch anything.
    pub fn on_timer_irq(&mut self) -> Option<u64> {
        let now = self.clock.now_us();
        let mut fired: Vec<Event, TIMER_SLOTS> = Vec::new();
        let next = self.wheel.update(&mut self.gate, now, &mut fired);
        for event in fired {
            if self.queue.enqueue(&mut self.gate, event).is_err() {
                self.dropped_events = self.dropped_events.saturating_add(1);
                log::error!("event queue full; dropped {:?}", event);
            }
        }
        next
    }

    /// Sensor completion interrupt entry point.
    pub fn on_sensor_irq(&mut self) {
        if self
            .queue
            .enqueue(&mut self.gate, Event::SensorDone)
            .is_err()
        {
            self.dropped_events = self.dropped_events.saturating_add(1);
            log::error!("event queue full; dropped sensor completion");
        }
    }

    /// Main-loop iteration: drains the events present at entry and
    /// dispatches each to the controller. Returns the number of events
    /// handled.
    pub fn poll(&mut self) -> usize {
        let snapshot = self.queue.len(&mut self.gate);
        let mut handled = 0;
        for _ in 0..snapshot {
            let Some(event) = self.queue.pop(&mut self.gate) else {
                break;
            };
            let now = self.clock.now_us();
            self.controller.handle_event(
                event,
                &mut SchedCtx {
                    gate: &mut self.gate,
                    wheel: &mut self.wheel,
                    now_us: now,
                },
            );
            handled += 1;
        }
        handled
    }

    /// Parses and dispatches one string-frame command line.
    pub fn on_string_command(&mut self, line: &str) -> Result<()> {
        let command = protocol::parse_string_command(line)?;
        self.dispatch(command)
    }

    /// Parses and dispatches one binary-frame command payload.
    pub fn on_binary_payload(&mut self, payload: &[u8]) -> Result<()> {
        let command = protocol::parse_binary_command(payload)?;
        self.dispatch(command)
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        let now = self.clock.now_us();
        match command {
            Command::Start => {
                let mut ctx = SchedCtx {
                    gate: &mut self.gate,
                    wheel: &mut self.wheel,
                    now_us: now,
                };
                self.controller.start(&mut ctx)
            }
            Command::Stop => {
                let mut ctx = SchedCtx {
                    gate: &mut self.gate,
                    wheel: &mut self.wheel,
                    now_us: now,
                };
                self.controller.stop(&mut ctx)
            }
            Command::Pause => self.controller.pause(),
            Command::Report => {
                // The degradation marker covers the window since the
                // previous report; a delivered report resets it.
                self.controller.send_status(now, self.dropped_events > 0)?;
                self.dropped_events = 0;
                Ok(())
            }
            Command::Ping => self.controller.send_pong(),
            Command::MotorMove { x, y } => {
                let mut ctx = SchedCtx {
                    gate: &mut self.gate,
                    wheel: &mut self.wheel,
                    now_us: now,
                };
                self.controller.jog(x, y, &mut ctx)
            }
            Command::Config { key, values } => self.controller.apply_config(key, &values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ScanState;
    use crate::config::ScanConfig;
    use crate::error::{Error, ProtocolError};
    use crate::hal::{MockCounter, MockHost, MockIrq, MockSensor, MockStepper};

    type TestDevice =
        ScanDevice<MockStepper, MockStepper, MockSensor, MockHost, MockCounter, MockIrq>;

    fn device() -> TestDevice {
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

    #[test]
    fn timer_irq_defers_events_to_poll() {
        let mut dev = device();
        dev.on_string_command("start").unwrap();
        assert_eq!(dev.controller().state(), ScanState::Homing);

        // The interrupt only queues; the state machine advances in poll.
        dev.on_timer_irq();
        assert_eq!(dev.controller().state(), ScanState::Homing);
        let handled = dev.poll();
        assert_eq!(handled, 2);
        assert!(matches!(dev.controller().state(), ScanState::Scanning(_)));
    }

    #[test]
    fn sensor_irq_round_trip() {
        let mut dev = device();
        dev.on_string_command("start").unwrap();
        dev.on_timer_irq();
        dev.poll();
        assert!(dev.controller().session().outstanding());

        dev.clock().counter().advance(10_000);
        dev.on_sensor_irq();
        dev.poll();
        assert!(!dev.controller().session().outstanding());
        assert_eq!(dev.controller().scan_position(), (1, 0));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut dev = device();
        assert_eq!(
            dev.on_string_command("launch"),
            Err(Error::Protocol(ProtocolError::UnknownCommand))
        );
    }

    #[test]
    fn report_command_emits_status_frame() {
        let mut dev = device();
        dev.on_string_command("report").unwrap();
        assert_eq!(dev.controller().host().frames.len(), 1);
    }

    #[test]
    fn binary_and_string_surfaces_dispatch_identically() {
        let mut dev = device();
        dev.on_string_command("motor-move 3 4").unwrap();
        dev.on_timer_irq();
        // Deadlines are in the future; advance past them.
        dev.clock().counter().advance(10_000);
        dev.on_timer_irq();
        dev.poll();
        assert_eq!(dev.controller().x_axis().position(), 3);
        assert_eq!(dev.controller().y_axis().position(), 4);

        let mut payload = heapless::Vec::<u8, 16>::new();
        payload
            .extend_from_slice(&protocol::CMD_MOTOR_MOVE.to_le_bytes())
            .unwrap();
        payload.extend_from_slice(&(-3i32).to_le_bytes()).unwrap();
        payload.extend_from_slice(&(-4i32).to_le_bytes()).unwrap();
        dev.on_binary_payload(&payload).unwrap();
        dev.clock().counter().advance(10_000);
        dev.on_timer_irq();
        dev.poll();
        assert_eq!(dev.controller().x_axis().position(), 0);
        assert_eq!(dev.controller().y_axis().position(), 0);
    }

    #[test]
    fn dropped_events_are_counted_and_reported() {
        let mut dev = device();
        for _ in 0..EVENT_CAPACITY {
            dev.on_sensor_irq();
        }
        assert_eq!(dev.dropped_events(), 0);
        dev.on_sensor_irq();
        assert_eq!(dev.dropped_events(), 1);

        // The degraded flag reaches the status report.
        dev.poll();
        dev.on_string_command("report").unwrap();
        let frame = dev.controller().host().frames.last().unwrap();
        let report =
            protocol::decode_status_payload(&frame[protocol::HEADER_LEN..]).unwrap();
        assert!(report.flags.contains(protocol::StatusFlags::FAULT));

        // Reporting acknowledges the loss; the next report is clean.
        assert_eq!(dev.dropped_events(), 0);
        dev.on_string_command("report").unwrap();
        let frame = dev.controller().host().frames.last().unwrap();
        let report =
            protocol::decode_status_payload(&frame[protocol::HEADER_LEN..]).unwrap();
        assert!(!report.flags.contains(protocol::StatusFlags::FAULT));
    }
}

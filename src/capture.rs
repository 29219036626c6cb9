//! Raster capture state machine.
//!
//! [`CaptureController`] owns both motor axes, the sensor session, and
//! the host link, and sequences them into a serpentine raster scan:
//! measure a cell, step the X axis, measure the next cell, and at each
//! row end flush the buffered line to the host, advance the Y axis one
//! row, and reverse direction. After the last row both axes are homed
//! back to the configured begin offset and a done marker is emitted.
//!
//! The controller runs entirely in the main loop. All hardware
//! completions reach it as drained [`Event`]s; it never blocks and never
//! runs in interrupt context.
//!
//! # State machine
//!
//! ```text
//!            start                rows done
//!  Idle ───────────▶ Homing ─┐  ┌──────────▶ Homing ──▶ Idle (done)
//!    ▲                       ▼  │
//!    │                     Scanning ◀──────▶ Paused
//!    │     stop              │     pause/start
//!    └────────── PendingStop ◀┘
//! ```
//!
//! Pause requests are honored only at a motor-movement boundary, never
//! mid-measurement, so a resumed scan continues with no lost or
//! duplicated cells. Stop discards any partially buffered line and homes
//! both axes before going idle.

use crate::axis::{AxisId, MotorAxis};
use crate::config::{ConfigKey, ScanConfig};
use crate::error::{Error, ProtocolError, Result};
use crate::event::{Event, SchedCtx};
use crate::fixed::PixelSample;
use crate::protocol::{self, StatusFlags, StatusReport};
use crate::sensor::{Completion, SensorSession};
use crate::traits::{
    HostLink, InterruptMask, PrecisionMode, SampleStatus, ScanSensor, StepperDrive,
};

/// Widest image row the line buffer can hold, in pixels.
pub const MAX_LINE_WIDTH: usize = 64;

/// Delay before a sensor re-initialization attempt after a fatal fault.
pub const REINIT_DELAY_US: u64 = 250_000;

/// Horizontal travel direction of the current row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanDirection {
    /// Columns left to right (increasing X).
    Forward,
    /// Columns right to left (decreasing X).
    Backward,
}

impl ScanDirection {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// Capture controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    /// No scan in progress; manual moves and configuration allowed.
    Idle,
    /// Both axes are traveling to the begin offset.
    Homing,
    /// Measuring and stepping along the current row.
    Scanning(ScanDirection),
    /// Stopped at a movement boundary; `start` resumes.
    Paused,
    /// A stop was requested; waiting for in-flight work, then homing.
    PendingStop,
}

/// What to do once a homing pass completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AfterHome {
    /// Begin the first row.
    Begin,
    /// Emit the done marker and go idle.
    Finish,
}

/// The scan engine: two axes, one sensor session, one host link.
pub struct CaptureController<X, Y, S, H>
where
    X: StepperDrive,
    Y: StepperDrive,
    S: ScanSensor,
    H: HostLink,
{
    x_axis: MotorAxis<X>,
    y_axis: MotorAxis<Y>,
    session: SensorSession<S>,
    host: H,
    config: ScanConfig,
    state: ScanState,
    paused_dir: ScanDirection,
    cur_x: u32,
    cur_y: u32,
    line: [PixelSample; MAX_LINE_WIDTH],
    num_buffered: u32,
    pending_pause: bool,
    homing_left: u8,
    after_home: AfterHome,
    fault: bool,
    scan_began_us: Option<u64>,
}

impl<X, Y, S, H> CaptureController<X, Y, S, H>
where
    X: StepperDrive,
    Y: StepperDrive,
    S: ScanSensor,
    H: HostLink,
{
    /// Builds an idle controller. The sensor session picks up the
    /// configured timing on its first initialization.
    pub fn new(x_drive: X, y_drive: Y, sensor: S, host: H, config: ScanConfig) -> Self {
        let mut session = SensorSession::new(sensor);
        session.set_timing(config.measure_delay_us, config.precision);
        Self {
            x_axis: MotorAxis::new(AxisId::X, x_drive),
            y_axis: MotorAxis::new(AxisId::Y, y_drive),
            session,
            host,
            config,
            state: ScanState::Idle,
            paused_dir: ScanDirection::Forward,
            cur_x: 0,
            cur_y: 0,
            line: [PixelSample::INVALID; MAX_LINE_WIDTH],
            num_buffered: 0,
            pending_pause: false,
            homing_left: 0,
            after_home: AfterHome::Begin,
            fault: false,
            scan_began_us: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether a fault was recorded since the last scan began.
    pub fn fault(&self) -> bool {
        self.fault
    }

    /// Active configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Grid coordinate of the next cell to be measured.
    pub fn scan_position(&self) -> (u32, u32) {
        (self.cur_x, self.cur_y)
    }

    /// Number of samples buffered for the current row.
    pub fn buffered(&self) -> u32 {
        self.num_buffered
    }

    /// The X axis.
    pub fn x_axis(&self) -> &MotorAxis<X> {
        &self.x_axis
    }

    /// The Y axis.
    pub fn y_axis(&self) -> &MotorAxis<Y> {
        &self.y_axis
    }

    /// The sensor session.
    pub fn session(&self) -> &SensorSession<S> {
        &self.session
    }

    /// The host link (mock inspection).
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host link (mock setup).
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    // ========================================================================
    // Host commands
    // ========================================================================

    /// Begins a scan, resumes a paused one, or — while already scanning —
    /// requests a pause at the next movement boundary.
    pub fn start<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) -> Result<()> {
        match self.state {
            ScanState::Idle => self.begin_scan(ctx),
            ScanState::Paused => {
                self.pending_pause = false;
                self.state = ScanState::Scanning(self.paused_dir);
                log::info!("scan resumed at column {}, row {}", self.cur_x, self.cur_y);
                self.trigger_or_fault(ctx);
                Ok(())
            }
            ScanState::Scanning(_) => {
                self.pending_pause = true;
                Ok(())
            }
            ScanState::Homing | ScanState::PendingStop => Err(Error::Busy),
        }
    }

    /// Requests a pause at the next movement boundary.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            ScanState::Scanning(_) => {
                self.pending_pause = true;
                Ok(())
            }
            ScanState::Paused => Ok(()),
            _ => {
                log::debug!("pause ignored in {:?}", self.state);
                Ok(())
            }
        }
    }

    /// Aborts the scan. Any partially buffered line is discarded, both
    /// axes home to the begin offset, and the controller goes idle.
    pub fn stop<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) -> Result<()> {
        match self.state {
            ScanState::Idle | ScanState::PendingStop => Ok(()),
            ScanState::Homing => {
                // Let the homing moves land; the completion handler then
                // goes idle instead of continuing.
                self.state = ScanState::PendingStop;
                Ok(())
            }
            ScanState::Scanning(_) => {
                self.pending_pause = false;
                self.state = ScanState::PendingStop;
                if self.session.outstanding()
                    || !self.x_axis.is_idle()
                    || !self.y_axis.is_idle()
                {
                    // In-flight work completes first; its event handler
                    // begins the homing pass.
                    return Ok(());
                }
                self.begin_stop_homing(ctx);
                Ok(())
            }
            ScanState::Paused => {
                self.state = ScanState::PendingStop;
                self.begin_stop_homing(ctx);
                Ok(())
            }
        }
    }

    /// Relative manual move of both axes, only while idle.
    pub fn jog<M: InterruptMask>(
        &mut self,
        dx: i32,
        dy: i32,
        ctx: &mut SchedCtx<M>,
    ) -> Result<()> {
        if self.state != ScanState::Idle {
            return Err(Error::Busy);
        }
        if !self.x_axis.is_idle() || !self.y_axis.is_idle() {
            return Err(Error::Busy);
        }
        self.x_axis.move_by(dx, ctx)?;
        if let Err(e) = self.y_axis.move_by(dy, ctx) {
            log::warn!("manual Y move rejected after X was issued: {}", e);
            self.x_axis.emergency_stop(ctx);
            return Err(e);
        }
        log::debug!("manual move: x {:+}, y {:+}", dx, dy);
        Ok(())
    }

    /// Applies one configuration parameter, only while idle.
    pub fn apply_config(&mut self, key: ConfigKey, values: &[u32]) -> Result<()> {
        if self.state != ScanState::Idle {
            return Err(Error::Busy);
        }
        if values.len() != key.arity() {
            return Err(Error::Protocol(ProtocolError::BadArgument));
        }
        match key {
            ConfigKey::Resolution => {
                let candidate = self.config.with_resolution(values[0], values[1]);
                candidate.validate()?;
                self.config = candidate;
            }
            ConfigKey::StepsPerPixel => {
                let x = u16::try_from(values[0])
                    .map_err(|_| Error::Protocol(ProtocolError::BadArgument))?;
                let y = u16::try_from(values[1])
                    .map_err(|_| Error::Protocol(ProtocolError::BadArgument))?;
                let candidate = self.config.with_steps_per_pixel(x, y);
                candidate.validate()?;
                self.config = candidate;
            }
            ConfigKey::BeginOffset => {
                if values[0] > i32::MAX as u32 || values[1] > i32::MAX as u32 {
                    return Err(Error::Protocol(ProtocolError::BadArgument));
                }
                self.config = self.config.with_begin_offset(values[0], values[1]);
            }
            ConfigKey::MeasureDelay => {
                let candidate = self.config.with_measure_delay_us(values[0]);
                candidate.validate()?;
                self.config = candidate;
                self.session.set_timing(values[0], self.config.precision);
            }
            ConfigKey::Precision => {
                let mode = match values[0] {
                    0 => PrecisionMode::Standard,
                    1 => PrecisionMode::High,
                    _ => return Err(Error::Protocol(ProtocolError::BadArgument)),
                };
                self.config = self.config.with_precision(mode);
                self.session.set_timing(self.config.measure_delay_us, mode);
            }
            ConfigKey::MotorClock => {
                let hz = values[0];
                self.x_axis.set_clock_speed(hz)?;
                self.y_axis.set_clock_speed(hz)?;
                self.config = self.config.with_motor_clock_hz(hz);
            }
        }
        log::info!("config updated: {:?} = {:?}", key, values);
        Ok(())
    }

    /// Emits a status report frame.
    ///
    /// `degraded` folds transport-level trouble (dropped events) into
    /// the fault flag without latching it.
    pub fn send_status(&mut self, now_us: u64, degraded: bool) -> Result<()> {
        let mut flags = StatusFlags::empty();
        if self.config.precision == PrecisionMode::High {
            flags |= StatusFlags::PRECISION_HIGH;
        }
        if self.state == ScanState::Idle {
            flags |= StatusFlags::IDLE;
        }
        if self.session.initialized() {
            flags |= StatusFlags::SENSOR_INITIALIZED;
        }
        if self.state == ScanState::Paused {
            flags |= StatusFlags::PAUSED;
        }
        if self.fault || degraded {
            flags |= StatusFlags::FAULT;
        }
        let report = StatusReport {
            steps_per_pixel: (self.config.steps_per_pixel_x, self.config.steps_per_pixel_y),
            image_size: (self.config.width, self.config.height),
            begin_offset: (self.config.begin_offset_x, self.config.begin_offset_y),
            measure_delay_us: self.config.measure_delay_us,
            angle_per_step: (self.config.angle_per_step_x, self.config.angle_per_step_y),
            motor_position: (self.x_axis.position(), self.y_axis.position()),
            elapsed_time_us: self
                .scan_began_us
                .map(|t| now_us.wrapping_sub(t) as i64)
                .unwrap_or(0),
            flags,
        };
        let frame = protocol::encode_status_frame(&report)?;
        self.transmit(&frame);
        Ok(())
    }

    /// Answers a liveness ping.
    pub fn send_pong(&mut self) -> Result<()> {
        let frame = protocol::encode_string_frame("pong")?;
        self.transmit(&frame);
        Ok(())
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    /// Dispatches one drained event.
    pub fn handle_event<M: InterruptMask>(&mut self, event: Event, ctx: &mut SchedCtx<M>) {
        match event {
            Event::AxisDone(id) => {
                match id {
                    AxisId::X => self.x_axis.on_deadline(ctx.now_us),
                    AxisId::Y => self.y_axis.on_deadline(ctx.now_us),
                }
                self.on_axis_complete(id, ctx);
            }
            Event::SensorDone => self.on_sensor_complete(ctx),
            Event::SensorWatchdog => match self.session.on_watchdog(ctx) {
                Ok(_) => {}
                Err(Error::Exhausted) => self.fatal_sensor_fault(ctx),
                Err(e) => log::warn!("watchdog handling failed: {}", e),
            },
            Event::SensorReinit => self.on_reinit_due(ctx),
        }
    }

    fn on_axis_complete<M: InterruptMask>(&mut self, id: AxisId, ctx: &mut SchedCtx<M>) {
        match self.state {
            ScanState::Homing => {
                self.mark_axis_homed(id);
                self.homing_left = self.homing_left.saturating_sub(1);
                if self.homing_left == 0 {
                    match self.after_home {
                        AfterHome::Begin => {
                            self.state = ScanState::Scanning(ScanDirection::Forward);
                            log::info!("axes homed; raster begins");
                            self.trigger_or_fault(ctx);
                        }
                        AfterHome::Finish => {
                            self.emit_done();
                            self.scan_began_us = None;
                            self.state = ScanState::Idle;
                            log::info!("scan complete");
                        }
                    }
                }
            }
            ScanState::PendingStop => {
                if self.homing_left > 0 {
                    self.mark_axis_homed(id);
                    self.homing_left -= 1;
                    if self.homing_left == 0 {
                        self.scan_began_us = None;
                        self.state = ScanState::Idle;
                        log::info!("scan stopped; axes homed");
                    }
                } else {
                    self.begin_stop_homing(ctx);
                }
            }
            ScanState::Scanning(dir) => {
                if self.pending_pause {
                    self.pending_pause = false;
                    self.paused_dir = dir;
                    self.state = ScanState::Paused;
                    log::info!("scan paused at column {}, row {}", self.cur_x, self.cur_y);
                } else {
                    self.trigger_or_fault(ctx);
                }
            }
            // Manual move completion; position is already booked.
            ScanState::Idle | ScanState::Paused => {}
        }
    }

    fn on_sensor_complete<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) {
        let sample = match self.session.on_complete(ctx) {
            Completion::Stale => return,
            Completion::Sample(raw) => {
                if raw.status != SampleStatus::Valid {
                    log::debug!(
                        "sample at ({}, {}) flagged {:?}",
                        self.cur_x,
                        self.cur_y,
                        raw.status
                    );
                }
                PixelSample::from_raw(raw.range, raw.amplitude)
            }
            Completion::EvalFailed => PixelSample::INVALID,
        };
        match self.state {
            ScanState::Scanning(dir) => self.advance_raster(dir, sample, ctx),
            ScanState::PendingStop => self.begin_stop_homing(ctx),
            _ => log::warn!("measurement completed outside a scan; discarded"),
        }
    }

    /// Stores the sample at the current grid cell and issues the next
    /// movement.
    fn advance_raster<M: InterruptMask>(
        &mut self,
        dir: ScanDirection,
        sample: PixelSample,
        ctx: &mut SchedCtx<M>,
    ) {
        // cur_x is a host coordinate, so the buffered line is always
        // ordered left to right regardless of travel direction.
        self.line[self.cur_x as usize] = sample;
        self.num_buffered += 1;

        let row_end = match dir {
            ScanDirection::Forward => self.cur_x == self.config.width - 1,
            ScanDirection::Backward => self.cur_x == 0,
        };

        if !row_end {
            let step = self.config.steps_per_pixel_x as i32;
            let delta = match dir {
                ScanDirection::Forward => {
                    self.cur_x += 1;
                    step
                }
                ScanDirection::Backward => {
                    self.cur_x -= 1;
                    -step
                }
            };
            if let Err(e) = self.x_axis.move_by(delta, ctx) {
                self.movement_fault(e);
            }
            return;
        }

        self.flush_line();
        self.num_buffered = 0;

        if self.cur_y == self.config.height - 1 {
            self.after_home = AfterHome::Finish;
            if let Err(e) = self.home_axes(ctx) {
                self.movement_fault(e);
            }
            return;
        }

        self.cur_y += 1;
        self.state = ScanState::Scanning(dir.reversed());
        if let Err(e) = self.y_axis.move_by(self.config.steps_per_pixel_y as i32, ctx) {
            self.movement_fault(e);
        }
    }

    fn on_reinit_due<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) {
        if self.session.initialized() {
            return;
        }
        match self.session.initialize() {
            Ok(()) => log::info!("sensor recovered after fault"),
            Err(_) => {
                if ctx
                    .wheel
                    .schedule(ctx.gate, ctx.now_us, REINIT_DELAY_US, Event::SensorReinit)
                    .is_err()
                {
                    log::warn!("no timer slot for sensor re-init; waiting for host");
                }
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn begin_scan<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) -> Result<()> {
        self.config.validate()?;
        self.fault = false;
        if !self.session.initialized() {
            if let Err(e) = self.session.initialize() {
                self.fault = true;
                return Err(e);
            }
        }
        self.cur_x = 0;
        self.cur_y = 0;
        self.num_buffered = 0;
        self.pending_pause = false;
        self.after_home = AfterHome::Begin;
        self.home_axes(ctx)?;
        self.scan_began_us = Some(ctx.now_us);
        log::info!(
            "scan started: {}x{} px, {} us per frame",
            self.config.width,
            self.config.height,
            self.config.measure_delay_us
        );
        Ok(())
    }

    /// Issues homing moves for both axes and enters [`ScanState::Homing`].
    fn home_axes<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) -> Result<()> {
        let ox = self.config.begin_offset_x as i32;
        let oy = self.config.begin_offset_y as i32;
        self.x_axis.move_to(ox, ctx)?;
        if let Err(e) = self.y_axis.move_to(oy, ctx) {
            self.x_axis.emergency_stop(ctx);
            return Err(e);
        }
        self.homing_left = 2;
        self.state = ScanState::Homing;
        Ok(())
    }

    /// Discards buffered data and homes both axes on the way out of a
    /// stop request. The state stays [`ScanState::PendingStop`] until the
    /// homing moves land.
    fn begin_stop_homing<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) {
        self.num_buffered = 0;
        self.homing_left = 0;
        let ox = self.config.begin_offset_x as i32;
        let oy = self.config.begin_offset_y as i32;
        if let Err(e) = self.x_axis.move_to(ox, ctx) {
            self.movement_fault(e);
            return;
        }
        if let Err(e) = self.y_axis.move_to(oy, ctx) {
            self.x_axis.emergency_stop(ctx);
            self.movement_fault(e);
            return;
        }
        self.homing_left = 2;
    }

    fn trigger_or_fault<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) {
        match self.session.trigger_measurement(ctx) {
            Ok(()) => {}
            Err(Error::Exhausted) => self.fatal_sensor_fault(ctx),
            Err(e) => {
                log::error!("measurement trigger failed: {}", e);
                self.fault = true;
                self.scan_began_us = None;
                self.state = ScanState::Idle;
            }
        }
    }

    /// Sensor retries exhausted mid-scan: abort, flag the fault, and
    /// schedule a background re-initialization attempt.
    fn fatal_sensor_fault<M: InterruptMask>(&mut self, ctx: &mut SchedCtx<M>) {
        log::error!("sensor retry budget exhausted; scan aborted");
        self.fault = true;
        self.num_buffered = 0;
        self.scan_began_us = None;
        self.state = ScanState::Idle;
        if ctx
            .wheel
            .schedule(ctx.gate, ctx.now_us, REINIT_DELAY_US, Event::SensorReinit)
            .is_err()
        {
            log::warn!("no timer slot for sensor re-init; waiting for host");
        }
    }

    fn movement_fault(&mut self, err: Error) {
        log::error!("movement scheduling failed: {}; scan aborted", err);
        self.fault = true;
        self.num_buffered = 0;
        self.scan_began_us = None;
        self.state = ScanState::Idle;
    }

    fn flush_line(&mut self) {
        let width = self.config.width as usize;
        match protocol::encode_line_frame(self.cur_y, 0, &self.line[..width]) {
            Ok(frame) => self.transmit(&frame),
            Err(e) => log::error!("line frame encoding failed: {}", e),
        }
    }

    fn emit_done(&mut self) {
        match protocol::encode_done_frame() {
            Ok(frame) => self.transmit(&frame),
            Err(e) => log::error!("done frame encoding failed: {}", e),
        }
    }

    /// Link failures are logged, not propagated: the scan carries on and
    /// the host resynchronizes from the next frame.
    fn transmit(&mut self, frame: &[u8]) {
        if let Err(e) = self.host.transmit(frame) {
            log::error!("host transmit failed: {:?}", e);
        }
    }

    fn mark_axis_homed(&mut self, id: AxisId) {
        match id {
            AxisId::X => self.x_axis.mark_homed(),
            AxisId::Y => self.y_axis.mark_homed(),
        }
    }
}

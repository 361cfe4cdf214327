//! Acquisition orchestrator.
//!
//! Drives both sensors over the shared bus once per interval. Each cycle sleeps
//! for the interval, then polls readiness, reads and converts every measuring
//! sensor in turn. A failing sensor only costs its own reading for that cycle:
//! the fault is emitted as an [`ErrorEvent`] and the other sensor carries on.

use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::reading::Reading;
use crate::sensor::{DriverError, SensorDriver, SensorId, SensorState};
use crate::sink::{Event, Sink};

pub const SENSOR_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    StartFailure,
    ReadinessCheckFailure,
    /// Readiness polls all answered "not ready".
    ReadinessTimeout,
    MeasurementReadFailure,
    StopFailure,
}

impl ErrorKind {
    pub fn step(&self) -> &'static str {
        match self {
            ErrorKind::StartFailure => "start measurement",
            ErrorKind::ReadinessCheckFailure => "data ready check",
            ErrorKind::ReadinessTimeout => "data ready timeout",
            ErrorKind::MeasurementReadFailure => "read measurement",
            ErrorKind::StopFailure => "stop measurement",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub sensor: SensorId,
    pub cause: DriverError,
}

impl ErrorEvent {
    pub fn new(kind: ErrorKind, sensor: SensorId, cause: DriverError) -> Self {
        Self { kind, sensor, cause }
    }
}

/// Sensors that failed to start during [`Monitor::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StartupFailures {
    events: Vec<ErrorEvent, SENSOR_COUNT>,
}

impl StartupFailures {
    pub fn failed(&self, sensor: SensorId) -> bool {
        self.events.iter().any(|e| e.sensor == sensor)
    }

    pub fn events(&self) -> &[ErrorEvent] {
        &self.events
    }
}

/// Bound for the readiness poll of one sensor within one cycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadinessPolicy {
    /// Number of readiness checks, at least one.
    pub attempts: u8,
    /// Wait between two checks.
    pub spacing: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            spacing: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonitorConfig {
    pub interval: Duration,
    pub readiness: ReadinessPolicy,
    /// Re-issue start at the end of each cycle for sensors that failed to start.
    pub restart_degraded: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(crate::config::POLL_INTERVAL_SECS),
            readiness: ReadinessPolicy::default(),
            restart_degraded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// A reading was emitted.
    Reading,
    /// An error event was emitted.
    Failed(ErrorKind),
    /// Not measuring, nothing was attempted.
    Stopped,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    pub cycle: u32,
    pub started: Instant,
    pub particulate: Outcome,
    pub co2: Outcome,
}

impl CycleReport {
    pub fn outcome(&self, sensor: SensorId) -> Outcome {
        match sensor {
            SensorId::Particulate => self.particulate,
            SensorId::Co2 => self.co2,
        }
    }

    pub fn produced(&self, sensor: SensorId) -> bool {
        self.outcome(sensor) == Outcome::Reading
    }

    pub fn readings(&self) -> usize {
        [self.particulate, self.co2].iter().filter(|o| **o == Outcome::Reading).count()
    }
}

struct Slot<T> {
    driver: T,
    state: SensorState,
    degraded: bool,
}

impl<T: SensorDriver> Slot<T> {
    fn new(driver: T) -> Self {
        Self {
            driver,
            state: SensorState::Stopped,
            degraded: false,
        }
    }

    async fn start(&mut self) -> Result<(), ErrorEvent> {
        let sensor = self.driver.id();
        match self.driver.start_measurement().await {
            Ok(()) => {
                info!("{} measuring", sensor.name());
                self.state = SensorState::Measuring;
                self.degraded = false;
                Ok(())
            }
            Err(cause) => {
                error!("{} start failed: {:?}", sensor.name(), cause);
                self.state = SensorState::Stopped;
                self.degraded = true;
                Err(ErrorEvent::new(ErrorKind::StartFailure, sensor, cause))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), ErrorEvent> {
        let sensor = self.driver.id();
        if self.state == SensorState::Stopped {
            debug!("{} already stopped", sensor.name());
            return Ok(());
        }
        let result = self.driver.stop_measurement().await;
        // a failed stop leaves the sensor in an unknown mode => no further reads
        self.state = SensorState::Stopped;
        self.degraded = false;
        match result {
            Ok(()) => {
                info!("{} stopped", sensor.name());
                Ok(())
            }
            Err(cause) => {
                error!("{} stop failed: {:?}", sensor.name(), cause);
                Err(ErrorEvent::new(ErrorKind::StopFailure, sensor, cause))
            }
        }
    }

    async fn wait_ready<D: DelayNs>(&mut self, delay: &mut D, policy: &ReadinessPolicy) -> Result<(), ErrorEvent> {
        let sensor = self.driver.id();
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            match self.driver.is_data_ready().await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    trace!("{} not ready ({}/{})", sensor.name(), attempt, attempts);
                    if attempt < attempts {
                        delay.delay_ms(u32::try_from(policy.spacing.as_millis()).unwrap_or(u32::MAX)).await;
                    }
                }
                Err(cause) => return Err(ErrorEvent::new(ErrorKind::ReadinessCheckFailure, sensor, cause)),
            }
        }
        Err(ErrorEvent::new(ErrorKind::ReadinessTimeout, sensor, DriverError::Timeout))
    }

    async fn poll<D: DelayNs, S: Sink>(&mut self, delay: &mut D, sink: &mut S, policy: &ReadinessPolicy) -> Outcome {
        let sensor = self.driver.id();
        if self.state != SensorState::Measuring {
            trace!("{} stopped => skip", sensor.name());
            return Outcome::Stopped;
        }

        let result: Result<Reading, ErrorEvent> = match self.wait_ready(delay, policy).await {
            Ok(()) => self
                .driver
                .read_measurement()
                .await
                .map(Into::into)
                .map_err(|cause| ErrorEvent::new(ErrorKind::MeasurementReadFailure, sensor, cause)),
            Err(event) => Err(event),
        };

        match result {
            Ok(reading) => {
                debug!("{} reading {:?}", sensor.name(), reading);
                sink.emit(Event::Reading(reading)).await;
                Outcome::Reading
            }
            Err(event) => {
                warn!("{} {} failed: {:?}", sensor.name(), event.kind.step(), event.cause);
                sink.emit(Event::Error(event)).await;
                Outcome::Failed(event.kind)
            }
        }
    }
}

pub struct Monitor<P, C, D, S> {
    particulate: Slot<P>,
    co2: Slot<C>,
    delay: D,
    sink: S,
    config: MonitorConfig,
    cycle: u32,
}

impl<P: SensorDriver, C: SensorDriver, D: DelayNs, S: Sink> Monitor<P, C, D, S> {
    pub fn new(particulate: P, co2: C, delay: D, sink: S, config: MonitorConfig) -> Self {
        Self {
            particulate: Slot::new(particulate),
            co2: Slot::new(co2),
            delay,
            sink,
            config,
            cycle: 0,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn state(&self, sensor: SensorId) -> SensorState {
        match sensor {
            SensorId::Particulate => self.particulate.state,
            SensorId::Co2 => self.co2.state,
        }
    }

    /// Stopped because start failed, as opposed to an explicit stop.
    pub fn is_degraded(&self, sensor: SensorId) -> bool {
        match sensor {
            SensorId::Particulate => self.particulate.degraded,
            SensorId::Co2 => self.co2.degraded,
        }
    }

    /// Starts both sensors. A sensor that fails stays stopped; the other one is
    /// started regardless.
    pub async fn initialize(&mut self) -> Result<(), StartupFailures> {
        info!("initialize, polling every {} ms", self.config.interval.as_millis());
        let mut failures = StartupFailures { events: Vec::new() };
        for sensor in [SensorId::Particulate, SensorId::Co2] {
            if self.state(sensor) == SensorState::Measuring {
                warn!("{} already measuring", sensor.name());
                continue;
            }
            if let Err(event) = self.start(sensor).await {
                // at most one failure per sensor
                let _ = failures.events.push(event);
            }
        }
        if failures.events.is_empty() { Ok(()) } else { Err(failures) }
    }

    /// Issues start-measurement to one sensor; failures are emitted as well.
    /// A sensor already measuring is left alone.
    pub async fn start(&mut self, sensor: SensorId) -> Result<(), ErrorEvent> {
        if self.state(sensor) == SensorState::Measuring {
            debug!("{} already measuring", sensor.name());
            return Ok(());
        }
        let result = match sensor {
            SensorId::Particulate => self.particulate.start().await,
            SensorId::Co2 => self.co2.start().await,
        };
        if let Err(event) = result {
            self.sink.emit(Event::Error(event)).await;
        }
        result
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.delay.delay_ms(u32::try_from(self.config.interval.as_millis()).unwrap_or(u32::MAX)).await;

        self.cycle = self.cycle.wrapping_add(1);
        let started = Instant::now();
        trace!("cycle {} start", self.cycle);

        let policy = self.config.readiness;
        let particulate = self.particulate.poll(&mut self.delay, &mut self.sink, &policy).await;
        let co2 = self.co2.poll(&mut self.delay, &mut self.sink, &policy).await;

        if self.config.restart_degraded {
            for sensor in [SensorId::Particulate, SensorId::Co2] {
                if self.is_degraded(sensor) {
                    info!("{} degraded => restart", sensor.name());
                    let _ = self.start(sensor).await;
                }
            }
        }

        let report = CycleReport {
            cycle: self.cycle,
            started,
            particulate,
            co2,
        };
        debug!("cycle {} done: {:?}", self.cycle, report);
        report
    }

    /// Stops the particulate sensor. The CO2 sensor needs no stop step and is
    /// left as is.
    pub async fn shutdown(&mut self) -> Result<(), ErrorEvent> {
        info!("shutdown");
        let result = self.particulate.stop().await;
        if let Err(event) = result {
            self.sink.emit(Event::Error(event)).await;
        }
        result
    }

    /// Runs cycles until `cancel` is signaled, then shuts down. Cancellation is
    /// checked before each cycle.
    pub async fn run<M: RawMutex>(&mut self, cancel: &Signal<M, ()>) -> Result<(), ErrorEvent> {
        while !cancel.signaled() {
            self.run_cycle().await;
        }
        info!("cancel requested after cycle {}", self.cycle);
        self.shutdown().await
    }
}

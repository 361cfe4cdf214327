#![allow(async_fn_in_trait)]

pub mod scd4x;
pub mod sen5x;
pub(crate) mod sensirion;

use crate::reading::Reading;

/// Identity of one of the two sensor subsystems sharing the bus.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorId {
    /// SEN5x particulate matter / VOC / NOx sensor
    Particulate,
    /// SCD4x CO2 / temperature / humidity sensor
    Co2,
}

impl SensorId {
    pub fn name(&self) -> &'static str {
        match self {
            SensorId::Particulate => "SEN5x",
            SensorId::Co2 => "SCD4x",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorState {
    #[default]
    Stopped,
    Measuring,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DriverError {
    /// The I2C transaction itself failed.
    Bus(embedded_hal::i2c::ErrorKind),
    /// A received word did not match its checksum.
    Crc,
    /// The sensor never reported data ready within the polling bound.
    Timeout,
}

impl DriverError {
    pub fn from_i2c<E: embedded_hal::i2c::Error>(err: E) -> Self {
        DriverError::Bus(err.kind())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DriverError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            DriverError::Bus(kind) => defmt::write!(f, "Bus({})", defmt::Debug2Format(kind)),
            DriverError::Crc => defmt::write!(f, "Crc"),
            DriverError::Timeout => defmt::write!(f, "Timeout"),
        }
    }
}

/// Driver adapter for one sensor family.
///
/// Every call is a complete bus interaction: it returns only after the command
/// has been written, the sensor's execution time has elapsed and any response
/// has been read back.
pub trait SensorDriver {
    /// Raw fixed-point measurement as delivered by the sensor.
    type Raw: Into<Reading>;

    fn id(&self) -> SensorId;

    async fn start_measurement(&mut self) -> Result<(), DriverError>;

    async fn stop_measurement(&mut self) -> Result<(), DriverError>;

    async fn is_data_ready(&mut self) -> Result<bool, DriverError>;

    async fn read_measurement(&mut self) -> Result<Self::Raw, DriverError>;
}

#[cfg(test)]
pub mod mocks {
    use core::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Clone, Copy, Eq, PartialEq)]
    pub enum Call {
        Start,
        Stop,
        IsDataReady,
        Read,
    }

    struct Script<Raw> {
        start: VecDeque<Result<(), DriverError>>,
        stop: VecDeque<Result<(), DriverError>>,
        ready: VecDeque<Result<bool, DriverError>>,
        read: VecDeque<Result<Raw, DriverError>>,
        calls: Vec<Call>,
    }

    /// Scripted driver; a clone shares the script so tests can inspect the
    /// calls after handing the mock to a monitor.
    pub struct SensorMock<Raw> {
        id: SensorId,
        script: Rc<RefCell<Script<Raw>>>,
    }

    impl<Raw> Clone for SensorMock<Raw> {
        fn clone(&self) -> Self {
            Self {
                id: self.id,
                script: self.script.clone(),
            }
        }
    }

    impl<Raw: Clone> SensorMock<Raw> {
        pub fn new(id: SensorId) -> Self {
            Self {
                id,
                script: Rc::new(RefCell::new(Script {
                    start: VecDeque::new(),
                    stop: VecDeque::new(),
                    ready: VecDeque::new(),
                    read: VecDeque::new(),
                    calls: Vec::new(),
                })),
            }
        }

        pub fn on_start(self, result: Result<(), DriverError>) -> Self {
            self.script.borrow_mut().start.push_back(result);
            self
        }

        pub fn on_stop(self, result: Result<(), DriverError>) -> Self {
            self.script.borrow_mut().stop.push_back(result);
            self
        }

        pub fn on_ready(self, result: Result<bool, DriverError>) -> Self {
            self.script.borrow_mut().ready.push_back(result);
            self
        }

        pub fn on_read(self, result: Result<Raw, DriverError>) -> Self {
            self.script.borrow_mut().read.push_back(result);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.script.borrow().calls.clone()
        }

        pub fn count(&self, call: Call) -> usize {
            self.script.borrow().calls.iter().filter(|c| **c == call).count()
        }
    }

    impl<Raw: Clone + Into<Reading>> SensorDriver for SensorMock<Raw> {
        type Raw = Raw;

        fn id(&self) -> SensorId {
            self.id
        }

        async fn start_measurement(&mut self) -> Result<(), DriverError> {
            let mut script = self.script.borrow_mut();
            script.calls.push(Call::Start);
            script.start.pop_front().unwrap_or(Ok(()))
        }

        async fn stop_measurement(&mut self) -> Result<(), DriverError> {
            let mut script = self.script.borrow_mut();
            script.calls.push(Call::Stop);
            script.stop.pop_front().unwrap_or(Ok(()))
        }

        async fn is_data_ready(&mut self) -> Result<bool, DriverError> {
            let mut script = self.script.borrow_mut();
            script.calls.push(Call::IsDataReady);
            script.ready.pop_front().unwrap_or(Ok(true))
        }

        async fn read_measurement(&mut self) -> Result<Raw, DriverError> {
            let mut script = self.script.borrow_mut();
            script.calls.push(Call::Read);
            script.read.pop_front().expect("unexpected read_measurement")
        }
    }
}

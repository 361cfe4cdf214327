//! SCD4x CO2 sensor in periodic measurement mode.

use embassy_time::Duration;
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use crate::sensor::{
    DriverError, SensorDriver, SensorId,
    sensirion::{SensirionI2c, words_to_u64},
};

pub const DEFAULT_ADDRESS: u8 = 0x62;

const CMD_START_PERIODIC_MEASUREMENT: u16 = 0x21B1;
const CMD_STOP_PERIODIC_MEASUREMENT: u16 = 0x3F86;
const CMD_GET_DATA_READY_STATUS: u16 = 0xE4B8;
const CMD_READ_MEASUREMENT: u16 = 0xEC05;
const CMD_GET_SERIAL_NUMBER: u16 = 0x3682;
const CMD_REINIT: u16 = 0x3646;

const DATA_READY_MASK: u16 = 0x07FF;

/// Measurement with temperature and humidity already scaled to milli-units.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Scd4xRaw {
    pub co2_ppm: u16,
    pub temperature_m_deg_c: i32,
    pub humidity_m_percent_rh: i32,
}

impl Scd4xRaw {
    fn from_ticks(co2_ppm: u16, temperature_ticks: u16, humidity_ticks: u16) -> Self {
        Self {
            co2_ppm,
            temperature_m_deg_c: ((21875 * temperature_ticks as i32) >> 13) - 45000,
            humidity_m_percent_rh: (12500 * humidity_ticks as i32) >> 13,
        }
    }
}

pub struct Scd4x<I2C, D> {
    bus: SensirionI2c<I2C, D>,
}

impl<I2C: I2c, D: DelayNs> Scd4x<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            bus: SensirionI2c::new(i2c, delay, address),
        }
    }

    pub fn release(self) -> (I2C, D) {
        self.bus.release()
    }

    /// Brings the sensor back to idle mode after a warm reset of the host, when
    /// it may still be in periodic measurement mode.
    ///
    /// A failing stop is not an error: an idle sensor may refuse it during its
    /// power-up time. The reinit that follows must succeed.
    pub async fn enter_idle(&mut self) -> Result<(), DriverError> {
        if let Err(e) = self.stop_measurement().await {
            debug!("SCD4x stop before reinit refused: {:?}", e);
        }
        self.bus.write_command(CMD_REINIT, Duration::from_millis(30)).await
    }

    /// 48 bit serial number. Only answered while periodic measurement is stopped.
    pub async fn serial_number(&mut self) -> Result<u64, DriverError> {
        let mut words = [0u16; 3];
        self.bus
            .read_words(CMD_GET_SERIAL_NUMBER, Duration::from_millis(1), &mut words)
            .await?;
        Ok(words_to_u64(&words))
    }
}

impl<I2C: I2c, D: DelayNs> SensorDriver for Scd4x<I2C, D> {
    type Raw = Scd4xRaw;

    fn id(&self) -> SensorId {
        SensorId::Co2
    }

    async fn start_measurement(&mut self) -> Result<(), DriverError> {
        self.bus
            .write_command(CMD_START_PERIODIC_MEASUREMENT, Duration::from_ticks(0))
            .await
    }

    async fn stop_measurement(&mut self) -> Result<(), DriverError> {
        self.bus
            .write_command(CMD_STOP_PERIODIC_MEASUREMENT, Duration::from_millis(500))
            .await
    }

    async fn is_data_ready(&mut self) -> Result<bool, DriverError> {
        let mut words = [0u16; 1];
        self.bus
            .read_words(CMD_GET_DATA_READY_STATUS, Duration::from_millis(1), &mut words)
            .await?;
        Ok(words[0] & DATA_READY_MASK != 0)
    }

    async fn read_measurement(&mut self) -> Result<Scd4xRaw, DriverError> {
        let mut words = [0u16; 3];
        self.bus
            .read_words(CMD_READ_MEASUREMENT, Duration::from_millis(1), &mut words)
            .await?;
        Ok(Scd4xRaw::from_ticks(words[0], words[1], words[2]))
    }
}

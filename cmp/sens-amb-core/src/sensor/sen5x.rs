//! SEN5x particulate matter, VOC and NOx sensor.

use embassy_time::Duration;
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use crate::sensor::{DriverError, SensorDriver, SensorId, sensirion::SensirionI2c};

pub const DEFAULT_ADDRESS: u8 = 0x69;

/// Raw value reported for humidity, temperature, VOC and NOx while the value is
/// outside the measurable range (e.g. during warm-up).
pub const NOT_AVAILABLE: i16 = 0x7FFF;

const CMD_START_MEASUREMENT: u16 = 0x0021;
const CMD_STOP_MEASUREMENT: u16 = 0x0104;
const CMD_READ_DATA_READY: u16 = 0x0202;
const CMD_READ_MEASURED_VALUES: u16 = 0x03C4;

/// Measured values in the sensor's fixed-point encoding.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sen5xRaw {
    pub mass_concentration_pm1p0: u16,  // µg/m³ x10
    pub mass_concentration_pm2p5: u16,  // µg/m³ x10
    pub mass_concentration_pm4p0: u16,  // µg/m³ x10
    pub mass_concentration_pm10p0: u16, // µg/m³ x10
    pub ambient_humidity: i16,          // %RH x100
    pub ambient_temperature: i16,       // °C x200
    pub voc_index: i16,                 // x10
    pub nox_index: i16,                 // x10
}

pub struct Sen5x<I2C, D> {
    bus: SensirionI2c<I2C, D>,
}

impl<I2C: I2c, D: DelayNs> Sen5x<I2C, D> {
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
}

impl<I2C: I2c, D: DelayNs> SensorDriver for Sen5x<I2C, D> {
    type Raw = Sen5xRaw;

    fn id(&self) -> SensorId {
        SensorId::Particulate
    }

    async fn start_measurement(&mut self) -> Result<(), DriverError> {
        self.bus.write_command(CMD_START_MEASUREMENT, Duration::from_millis(50)).await
    }

    async fn stop_measurement(&mut self) -> Result<(), DriverError> {
        self.bus.write_command(CMD_STOP_MEASUREMENT, Duration::from_millis(200)).await
    }

    async fn is_data_ready(&mut self) -> Result<bool, DriverError> {
        let mut words = [0u16; 1];
        self.bus.read_words(CMD_READ_DATA_READY, Duration::from_millis(20), &mut words).await?;
        // first byte is padding, second byte carries the flag
        Ok(words[0] & 0x00FF != 0)
    }

    async fn read_measurement(&mut self) -> Result<Sen5xRaw, DriverError> {
        let mut words = [0u16; 8];
        self.bus
            .read_words(CMD_READ_MEASURED_VALUES, Duration::from_millis(20), &mut words)
            .await?;
        Ok(Sen5xRaw {
            mass_concentration_pm1p0: words[0],
            mass_concentration_pm2p5: words[1],
            mass_concentration_pm4p0: words[2],
            mass_concentration_pm10p0: words[3],
            ambient_humidity: words[4] as i16,
            ambient_temperature: words[5] as i16,
            voc_index: words[6] as i16,
            nox_index: words[7] as i16,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use super::*;
    use crate::sensor::sensirion::tests::response;

    #[tokio::test]
    async fn start_and_stop_write_their_commands() {
        let expectations = [
            I2cTransaction::write(DEFAULT_ADDRESS, vec![0x00, 0x21]),
            I2cTransaction::write(DEFAULT_ADDRESS, vec![0x01, 0x04]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Sen5x::new(i2c.clone(), NoopDelay::new());

        sensor.start_measurement().await.unwrap();
        sensor.stop_measurement().await.unwrap();

        i2c.done();
    }

    #[tokio::test]
    async fn data_ready_flag_is_the_low_byte() {
        let expectations = [
            I2cTransaction::write(DEFAULT_ADDRESS, vec![0x02, 0x02]),
            I2cTransaction::read(DEFAULT_ADDRESS, response(&[0x0001])),
            I2cTransaction::write(DEFAULT_ADDRESS, vec![0x02, 0x02]),
            I2cTransaction::read(DEFAULT_ADDRESS, response(&[0x0000])),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Sen5x::new(i2c.clone(), NoopDelay::new());

        assert!(sensor.is_data_ready().await.unwrap());
        assert!(!sensor.is_data_ready().await.unwrap());

        i2c.done();
    }

    #[tokio::test]
    async fn read_measured_values_decodes_signed_fields() {
        let expectations = [
            I2cTransaction::write(DEFAULT_ADDRESS, vec![0x03, 0xC4]),
            I2cTransaction::read(
                DEFAULT_ADDRESS,
                response(&[15, 123, 140, 150, 4500, (-2000i16) as u16, 0x7FFF, 10]),
            ),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Sen5x::new(i2c.clone(), NoopDelay::new());

        let raw = sensor.read_measurement().await.unwrap();
        assert_eq!(
            raw,
            Sen5xRaw {
                mass_concentration_pm1p0: 15,
                mass_concentration_pm2p5: 123,
                mass_concentration_pm4p0: 140,
                mass_concentration_pm10p0: 150,
                ambient_humidity: 4500,
                ambient_temperature: -2000,
                voc_index: NOT_AVAILABLE,
                nox_index: 10,
            }
        );

        i2c.done();
    }

    #[tokio::test]
    async fn nack_is_reported_as_bus_error() {
        let expectations = [I2cTransaction::write(DEFAULT_ADDRESS, vec![0x02, 0x02]).with_error(ErrorKind::Other)];
        let mut i2c = I2cMock::new(&expectations);
        let mut sensor = Sen5x::new(i2c.clone(), NoopDelay::new());

        assert_eq!(sensor.is_data_ready().await, Err(DriverError::Bus(ErrorKind::Other)));

        i2c.done();
    }
}

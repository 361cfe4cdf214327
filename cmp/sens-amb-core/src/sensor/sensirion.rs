use embassy_time::Duration;
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

use crate::sensor::DriverError;

const CRC8_POLYNOMIAL: u8 = 0x31;
const CRC8_INIT: u8 = 0xFF;
const WORD_SIZE: usize = 3;
const MAX_WORDS: usize = 9;

pub(crate) fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = CRC8_INIT;

    for &b in data {
        crc ^= b;
        for _ in 0..8 {
            crc = if (crc & 0x80) != 0 { (crc << 1) ^ CRC8_POLYNOMIAL } else { crc << 1 };
        }
    }

    crc
}

/// Packs up to four words big-endian into one integer (serial numbers).
pub(crate) fn words_to_u64(words: &[u16]) -> u64 {
    words.iter().take(4).fold(0u64, |acc, word| (acc << 16) | *word as u64)
}

/// Command/response framing shared by the Sensirion sensors: 16 bit commands,
/// responses as 16 bit words each followed by a CRC byte.
pub(crate) struct SensirionI2c<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> SensirionI2c<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self { i2c, delay, address }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub async fn write_command(&mut self, command: u16, execution_time: Duration) -> Result<(), DriverError> {
        trace!("I2C[{:02X}].TX> {:04X}", self.address, command);
        self.i2c
            .write(self.address, &command.to_be_bytes())
            .await
            .map_err(DriverError::from_i2c)?;
        self.wait(execution_time).await;
        Ok(())
    }

    pub async fn read_words(&mut self, command: u16, execution_time: Duration, words: &mut [u16]) -> Result<(), DriverError> {
        debug_assert!(words.len() <= MAX_WORDS);
        self.write_command(command, execution_time).await?;

        let mut buffer = [0u8; MAX_WORDS * WORD_SIZE];
        let buffer = &mut buffer[..words.len() * WORD_SIZE];
        self.i2c.read(self.address, buffer).await.map_err(DriverError::from_i2c)?;
        trace!("I2C[{:02X}].RX> {:?}", self.address, &*buffer);

        for (word, chunk) in words.iter_mut().zip(buffer.chunks_exact(WORD_SIZE)) {
            if crc8(&chunk[..2]) != chunk[2] {
                warn!("I2C[{:02X}] checksum mismatch for command {:04X}", self.address, command);
                return Err(DriverError::Crc);
            }
            *word = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Ok(())
    }

    async fn wait(&mut self, execution_time: Duration) {
        if execution_time.as_ticks() > 0 {
            self.delay
                .delay_ms(u32::try_from(execution_time.as_millis()).unwrap_or(u32::MAX))
                .await;
        }
    }
}

#[cfg(test)]
pub mod tests {
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use super::*;

    pub fn word(value: u16) -> [u8; 3] {
        let [hi, lo] = value.to_be_bytes();
        [hi, lo, crc8(&[hi, lo])]
    }

    pub fn response(values: &[u16]) -> std::vec::Vec<u8> {
        values.iter().flat_map(|v| word(*v)).collect()
    }

    #[derive(Default)]
    struct RecordingDelay {
        waits_ms: std::vec::Vec<u32>,
    }

    impl DelayNs for RecordingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.waits_ms.push(ns / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.waits_ms.push(ms);
        }
    }

    #[tokio::test]
    async fn execution_time_is_waited_in_full() {
        let expectations = [
            I2cTransaction::write(0x62, vec![0x3F, 0x86]),
            I2cTransaction::write(0x62, vec![0x21, 0xB1]),
            I2cTransaction::write(0x62, vec![0x36, 0x46]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();
        {
            let mut bus = SensirionI2c::new(i2c.clone(), &mut delay, 0x62);
            bus.write_command(0x3F86, Duration::from_millis(500)).await.unwrap();
            bus.write_command(0x21B1, Duration::from_ticks(0)).await.unwrap();
            bus.write_command(0x3646, Duration::from_secs(2 * 60 * 60)).await.unwrap();
        }
        assert_eq!(delay.waits_ms, [500, 7_200_000]);

        i2c.done();
    }

    #[test]
    fn crc_matches_datasheet_example() {
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn words_pack_big_endian() {
        assert_eq!(words_to_u64(&[0x1234, 0x5678, 0x9ABC]), 0x1234_5678_9ABC);
        assert_eq!(words_to_u64(&[]), 0);
    }

    #[tokio::test]
    async fn read_words_checks_every_crc() {
        let mut bad = response(&[0x0102, 0x0304]);
        bad[5] ^= 0xFF;
        let expectations = [
            I2cTransaction::write(0x69, vec![0x03, 0xC4]),
            I2cTransaction::read(0x69, response(&[0x0102, 0x0304])),
            I2cTransaction::write(0x69, vec![0x03, 0xC4]),
            I2cTransaction::read(0x69, bad),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = SensirionI2c::new(i2c.clone(), NoopDelay::new(), 0x69);

        let mut words = [0u16; 2];
        bus.read_words(0x03C4, Duration::from_millis(20), &mut words).await.unwrap();
        assert_eq!(words, [0x0102, 0x0304]);

        let result = bus.read_words(0x03C4, Duration::from_millis(20), &mut words).await;
        assert_eq!(result, Err(DriverError::Crc));

        i2c.done();
    }

    #[tokio::test]
    async fn bus_errors_keep_their_kind() {
        let expectations = [I2cTransaction::write(0x62, vec![0x21, 0xB1]).with_error(ErrorKind::Other)];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = SensirionI2c::new(i2c.clone(), NoopDelay::new(), 0x62);

        let result = bus.write_command(0x21B1, Duration::from_ticks(0)).await;
        assert_eq!(result, Err(DriverError::Bus(ErrorKind::Other)));

        i2c.done();
    }
}

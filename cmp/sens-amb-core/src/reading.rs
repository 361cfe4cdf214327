//! Engineering-unit readings and the fixed-point conversions producing them.

use heapless::Vec;

use crate::sensor::{SensorId, scd4x::Scd4xRaw, sen5x, sen5x::Sen5xRaw};

pub const MAX_CHANNELS: usize = 8;

const MASS_CONCENTRATION_SCALE: f32 = 10.0;
const HUMIDITY_SCALE: f32 = 100.0;
const TEMPERATURE_SCALE: f32 = 200.0;
const INDEX_SCALE: f32 = 10.0;
const MILLI_SCALE: f32 = 1000.0;

/// A channel value: either measured, or explicitly flagged by the sensor as out
/// of its measurable range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Available(f32),
    NotAvailable,
}

impl Sample {
    /// Scales a signed raw value unless it is the sentinel.
    pub fn from_raw(raw: i16, sentinel: i16, divisor: f32) -> Self {
        if raw == sentinel {
            Sample::NotAvailable
        } else {
            Sample::Available(raw as f32 / divisor)
        }
    }

    pub fn value(&self) -> Option<f32> {
        match self {
            Sample::Available(v) => Some(*v),
            Sample::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Sample::Available(_))
    }
}

impl core::fmt::Display for Sample {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Sample::Available(v) => write!(f, "{:.1}", v),
            Sample::NotAvailable => write!(f, "n/a"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Sample {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Sample::Available(v) => defmt::write!(f, "{=f32}", v),
            Sample::NotAvailable => defmt::write!(f, "n/a"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unit {
    MicrogramsPerCubicMeter,
    PercentRelativeHumidity,
    DegreesCelsius,
    Index,
    PartsPerMillion,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::MicrogramsPerCubicMeter => "µg/m³",
            Unit::PercentRelativeHumidity => "%RH",
            Unit::DegreesCelsius => "°C",
            Unit::Index => "",
            Unit::PartsPerMillion => "ppm",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelName {
    Pm1p0,
    Pm2p5,
    Pm4p0,
    Pm10p0,
    AmbientHumidity,
    AmbientTemperature,
    VocIndex,
    NoxIndex,
    Co2,
    Co2Temperature,
    Co2Humidity,
}

impl ChannelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelName::Pm1p0 => "pm1p0",
            ChannelName::Pm2p5 => "pm2p5",
            ChannelName::Pm4p0 => "pm4p0",
            ChannelName::Pm10p0 => "pm10p0",
            ChannelName::AmbientHumidity => "humidity",
            ChannelName::AmbientTemperature => "temperature",
            ChannelName::VocIndex => "voc_index",
            ChannelName::NoxIndex => "nox_index",
            ChannelName::Co2 => "co2",
            ChannelName::Co2Temperature => "co2_temperature",
            ChannelName::Co2Humidity => "co2_humidity",
        }
    }
}

/// One named value of a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    pub name: ChannelName,
    pub value: Sample,
    pub unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParticulateReading {
    pub pm1p0: f32,  // µg/m³
    pub pm2p5: f32,  // µg/m³
    pub pm4p0: f32,  // µg/m³
    pub pm10p0: f32, // µg/m³
    pub humidity: Sample,
    pub temperature: Sample,
    pub voc_index: Sample,
    pub nox_index: Sample,
}

impl From<Sen5xRaw> for ParticulateReading {
    fn from(raw: Sen5xRaw) -> Self {
        Self {
            pm1p0: raw.mass_concentration_pm1p0 as f32 / MASS_CONCENTRATION_SCALE,
            pm2p5: raw.mass_concentration_pm2p5 as f32 / MASS_CONCENTRATION_SCALE,
            pm4p0: raw.mass_concentration_pm4p0 as f32 / MASS_CONCENTRATION_SCALE,
            pm10p0: raw.mass_concentration_pm10p0 as f32 / MASS_CONCENTRATION_SCALE,
            humidity: Sample::from_raw(raw.ambient_humidity, sen5x::NOT_AVAILABLE, HUMIDITY_SCALE),
            temperature: Sample::from_raw(raw.ambient_temperature, sen5x::NOT_AVAILABLE, TEMPERATURE_SCALE),
            voc_index: Sample::from_raw(raw.voc_index, sen5x::NOT_AVAILABLE, INDEX_SCALE),
            nox_index: Sample::from_raw(raw.nox_index, sen5x::NOT_AVAILABLE, INDEX_SCALE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Co2Reading {
    pub co2_ppm: u16,
    pub temperature: f32, // °C
    pub humidity: f32,    // %RH
}

impl From<Scd4xRaw> for Co2Reading {
    fn from(raw: Scd4xRaw) -> Self {
        Self {
            co2_ppm: raw.co2_ppm,
            temperature: raw.temperature_m_deg_c as f32 / MILLI_SCALE,
            humidity: raw.humidity_m_percent_rh as f32 / MILLI_SCALE,
        }
    }
}

/// Snapshot of one sensor's output for one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reading {
    Particulate(ParticulateReading),
    Co2(Co2Reading),
}

impl Reading {
    pub fn sensor(&self) -> SensorId {
        match self {
            Reading::Particulate(_) => SensorId::Particulate,
            Reading::Co2(_) => SensorId::Co2,
        }
    }

    pub fn channels(&self) -> Vec<Channel, MAX_CHANNELS> {
        let mut channels = Vec::new();
        let mut push = |name, value, unit| {
            // never more than MAX_CHANNELS per reading
            let _ = channels.push(Channel { name, value, unit });
        };
        match self {
            Reading::Particulate(r) => {
                push(ChannelName::Pm1p0, Sample::Available(r.pm1p0), Unit::MicrogramsPerCubicMeter);
                push(ChannelName::Pm2p5, Sample::Available(r.pm2p5), Unit::MicrogramsPerCubicMeter);
                push(ChannelName::Pm4p0, Sample::Available(r.pm4p0), Unit::MicrogramsPerCubicMeter);
                push(ChannelName::Pm10p0, Sample::Available(r.pm10p0), Unit::MicrogramsPerCubicMeter);
                push(ChannelName::AmbientHumidity, r.humidity, Unit::PercentRelativeHumidity);
                push(ChannelName::AmbientTemperature, r.temperature, Unit::DegreesCelsius);
                push(ChannelName::VocIndex, r.voc_index, Unit::Index);
                push(ChannelName::NoxIndex, r.nox_index, Unit::Index);
            }
            Reading::Co2(r) => {
                push(ChannelName::Co2, Sample::Available(r.co2_ppm as f32), Unit::PartsPerMillion);
                push(ChannelName::Co2Temperature, Sample::Available(r.temperature), Unit::DegreesCelsius);
                push(ChannelName::Co2Humidity, Sample::Available(r.humidity), Unit::PercentRelativeHumidity);
            }
        }
        channels
    }

    pub fn channel(&self, name: ChannelName) -> Option<Sample> {
        self.channels().iter().find(|c| c.name == name).map(|c| c.value)
    }
}

impl From<Sen5xRaw> for Reading {
    fn from(raw: Sen5xRaw) -> Self {
        Reading::Particulate(raw.into())
    }
}

impl From<Scd4xRaw> for Reading {
    fn from(raw: Scd4xRaw) -> Self {
        Reading::Co2(raw.into())
    }
}

#![allow(async_fn_in_trait)]

use core::fmt::Write;

use embassy_futures::yield_now;
use embassy_sync::{
    blocking_mutex::raw::RawMutex,
    channel::{Channel, Receiver, Sender},
};
use heapless::String;

use crate::monitor::ErrorEvent;
use crate::reading::{ChannelName, Reading, Sample};

const LINE_SIZE: usize = 96;

/// What the monitor hands over per sensor and cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Reading(Reading),
    Error(ErrorEvent),
}

impl From<Reading> for Event {
    fn from(reading: Reading) -> Self {
        Event::Reading(reading)
    }
}

impl From<ErrorEvent> for Event {
    fn from(error: ErrorEvent) -> Self {
        Event::Error(error)
    }
}

/// Receives every reading and error event; owns all formatting and display.
pub trait Sink {
    async fn emit(&mut self, event: Event);
}

impl<S: Sink> Sink for &mut S {
    async fn emit(&mut self, event: Event) {
        (**self).emit(event).await
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PrintConfig {
    /// Print temperature and humidity as measured by the CO2 sensor.
    pub co2_diagnostics: bool,
    /// Print pm1p0 and pm4p0 next to pm2p5 and pm10p0.
    pub all_mass_channels: bool,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            co2_diagnostics: true,
            all_mass_channels: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Severity {
    Info,
    Error,
}

fn label(name: ChannelName) -> &'static str {
    match name {
        ChannelName::Pm1p0 => "Mass concentration pm1p0",
        ChannelName::Pm2p5 => "Mass concentration pm2p5",
        ChannelName::Pm4p0 => "Mass concentration pm4p0",
        ChannelName::Pm10p0 => "Mass concentration pm10p0",
        ChannelName::AmbientHumidity => "Ambient humidity",
        ChannelName::AmbientTemperature => "Ambient temperature",
        ChannelName::VocIndex => "Voc index",
        ChannelName::NoxIndex => "Nox index",
        ChannelName::Co2 => "CO2 concentration [ppm]",
        ChannelName::Co2Temperature => "Temperature scd4x [°C]",
        ChannelName::Co2Humidity => "Humidity scd4x [%RH]",
    }
}

fn line<F: FnMut(Severity, &str)>(out: &mut F, severity: Severity, args: core::fmt::Arguments<'_>) {
    let mut line = String::<LINE_SIZE>::new();
    if line.write_fmt(args).is_err() {
        warn!("Sink> line truncated to {} bytes", LINE_SIZE);
    }
    out(severity, line.as_str());
}

/// Renders an event into the text lines of the console print-out.
pub fn render<F: FnMut(Severity, &str)>(event: &Event, config: &PrintConfig, mut out: F) {
    match event {
        Event::Reading(reading @ Reading::Particulate(_)) => {
            line(&mut out, Severity::Info, format_args!("{} DATA:", reading.sensor().name()));
            for channel in reading.channels() {
                if !config.all_mass_channels && matches!(channel.name, ChannelName::Pm1p0 | ChannelName::Pm4p0) {
                    continue;
                }
                match channel.value {
                    Sample::Available(_) if channel.unit.symbol().is_empty() => {
                        line(&mut out, Severity::Info, format_args!("{}: {}", label(channel.name), channel.value))
                    }
                    Sample::Available(_) => line(
                        &mut out,
                        Severity::Info,
                        format_args!("{}: {} {}", label(channel.name), channel.value, channel.unit.symbol()),
                    ),
                    Sample::NotAvailable => line(&mut out, Severity::Info, format_args!("{}: n/a", label(channel.name))),
                }
            }
        }
        Event::Reading(reading @ Reading::Co2(co2)) => {
            line(&mut out, Severity::Info, format_args!("{} DATA:", reading.sensor().name()));
            line(&mut out, Severity::Info, format_args!("{}: {}", label(ChannelName::Co2), co2.co2_ppm));
            if config.co2_diagnostics {
                line(
                    &mut out,
                    Severity::Info,
                    format_args!("{}: {:.2}", label(ChannelName::Co2Temperature), co2.temperature),
                );
                line(
                    &mut out,
                    Severity::Info,
                    format_args!("{}: {:.2}", label(ChannelName::Co2Humidity), co2.humidity),
                );
            }
        }
        Event::Error(error) => line(
            &mut out,
            Severity::Error,
            format_args!("Error {} {}: {:?}", error.sensor.name(), error.kind.step(), error.cause),
        ),
    }
}

/// Prints events through the crate's logging backend.
pub struct LogSink {
    config: PrintConfig,
}

impl LogSink {
    pub fn new(config: PrintConfig) -> Self {
        Self { config }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(PrintConfig::default())
    }
}

impl Sink for LogSink {
    async fn emit(&mut self, event: Event) {
        render(&event, &self.config, |severity, text| match severity {
            Severity::Info => info!("{}", text),
            Severity::Error => error!("{}", text),
        });
    }
}

/// Hands events over to a presenter task through a channel.
pub struct ChannelSink<'a, M: RawMutex, const N: usize> {
    sender: Sender<'a, M, Event, N>,
}

impl<'a, M: RawMutex, const N: usize> ChannelSink<'a, M, N> {
    pub fn new(sender: Sender<'a, M, Event, N>) -> Self {
        Self { sender }
    }
}

impl<M: RawMutex, const N: usize> Sink for ChannelSink<'_, M, N> {
    async fn emit(&mut self, event: Event) {
        self.sender.send(event).await;
    }
}

pub struct State<M: RawMutex, const N: usize> {
    channel: Channel<M, Event, N>,
}

impl<M: RawMutex, const N: usize> State<M, N> {
    pub fn new() -> Self {
        State { channel: Channel::new() }
    }
}

impl<M: RawMutex, const N: usize> Default for State<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Presenter task: drains the channel into the wrapped sink.
pub struct Runner<'a, M: RawMutex, S: Sink, const N: usize> {
    receiver: Receiver<'a, M, Event, N>,
    sink: S,
}

pub fn new<'a, M: RawMutex, S: Sink, const N: usize>(state: &'a mut State<M, N>, sink: S) -> (ChannelSink<'a, M, N>, Runner<'a, M, S, N>) {
    (
        ChannelSink::new(state.channel.sender()),
        Runner {
            receiver: state.channel.receiver(),
            sink,
        },
    )
}

impl<'a, M: RawMutex, S: Sink, const N: usize> Runner<'a, M, S, N> {
    pub async fn run(mut self) {
        loop {
            yield_now().await;
            let event = self.receiver.receive().await;
            self.sink.emit(event).await;
        }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;

    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Vec<Event>,
    }

    impl RecordingSink {
        pub fn readings(&self) -> Vec<Reading> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Reading(r) => Some(*r),
                    Event::Error(_) => None,
                })
                .collect()
        }

        pub fn errors(&self) -> Vec<ErrorEvent> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Error(err) => Some(*err),
                    Event::Reading(_) => None,
                })
                .collect()
        }
    }

    impl Sink for RecordingSink {
        async fn emit(&mut self, event: Event) {
            self.events.push(event);
        }
    }
}

#![no_std]
#![no_main]

use defmt::*;
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_executor::Spawner;
use embassy_futures::join::join3;
use embassy_rp::{
    bind_interrupts,
    gpio::{Input, Pull},
    i2c,
    peripherals::I2C0,
};
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, mutex::Mutex, signal::Signal};
use embassy_time::Delay;
use sens_amb_core::{
    config,
    monitor::{Monitor, MonitorConfig},
    sensor::{scd4x::Scd4x, sen5x::Sen5x},
    sink::{self, LogSink, PrintConfig},
};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    I2C0_IRQ => i2c::InterruptHandler<I2C0>;
});

type I2cBus = Mutex<NoopRawMutex, i2c::I2c<'static, I2C0, i2c::Async>>;

static I2C_BUS: StaticCell<I2cBus> = StaticCell::new();

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("sens-amb version {}", config::VERSION);

    let mut i2c_config = i2c::Config::default();
    i2c_config.frequency = config::I2C_FREQUENCY_HZ;
    // SDA on GPIO4, SCL on GPIO5
    let i2c = i2c::I2c::new_async(p.I2C0, p.PIN_5, p.PIN_4, Irqs, i2c_config);
    let bus = I2C_BUS.init(Mutex::new(i2c));

    let sen5x = Sen5x::new(I2cDevice::new(bus), Delay);
    let mut scd4x = Scd4x::new(I2cDevice::new(bus), Delay);

    // a warm reset leaves the SCD4x measuring, serial and start are only
    // answered in idle mode
    if let Err(e) = scd4x.enter_idle().await {
        warn!("SCD4x not idle: {}", e);
    }
    match scd4x.serial_number().await {
        Ok(serial) => info!("SCD4x serial: {=u64:#x}", serial),
        Err(e) => warn!("SCD4x serial not available: {}", e),
    }

    // pressing the button on GPIO15 stops acquisition
    let mut button = Input::new(p.PIN_15, Pull::Up);
    let cancel = Signal::<NoopRawMutex, ()>::new();

    let mut state = sink::State::<NoopRawMutex, 4>::new();
    let (events, presenter) = sink::new(&mut state, LogSink::new(PrintConfig::default()));
    let mut monitor = Monitor::new(sen5x, scd4x, Delay, events, MonitorConfig::default());

    let acquisition = async {
        if let Err(failures) = monitor.initialize().await {
            warn!("started degraded: {}", failures);
        }
        match monitor.run(&cancel).await {
            Ok(()) => info!("acquisition stopped"),
            Err(e) => error!("acquisition stopped with {}", e),
        }
    };

    let stop = async {
        button.wait_for_falling_edge().await;
        info!("stop requested");
        cancel.signal(());
    };

    join3(presenter.run(), acquisition, stop).await;
}

#![cfg_attr(target_os = "none", no_std)]

pub(crate) mod fmt;

pub mod monitor;
pub mod reading;
pub mod sensor;
pub mod sink;

pub mod config {
    include!(concat!(env!("OUT_DIR"), "/consts.rs"));

    /// Firmware version reported at startup.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
pub mod tests {

    #[cfg(feature = "log")]
    #[cfg_attr(feature = "log", ctor::ctor)]
    fn init() {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_thread_names(true)
            .with_level(true)
            .pretty()
            .init();
    }
}

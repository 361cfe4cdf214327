use std::path::PathBuf;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_I2C_FREQUENCY_HZ: u32 = 100_000;

fn main() {
    println!("cargo:rerun-if-env-changed=SENS_AMB_POLL_INTERVAL_SECS");
    println!("cargo:rerun-if-env-changed=SENS_AMB_I2C_FREQUENCY_HZ");

    let poll_interval_secs: u64 = match std::env::var("SENS_AMB_POLL_INTERVAL_SECS") {
        Ok(value) => value.parse().expect("SENS_AMB_POLL_INTERVAL_SECS is not a number of seconds"),
        Err(_) => DEFAULT_POLL_INTERVAL_SECS,
    };
    assert!(poll_interval_secs > 0, "SENS_AMB_POLL_INTERVAL_SECS must be at least 1");

    let i2c_frequency_hz: u32 = match std::env::var("SENS_AMB_I2C_FREQUENCY_HZ") {
        Ok(value) => value.parse().expect("SENS_AMB_I2C_FREQUENCY_HZ is not a frequency in Hz"),
        Err(_) => DEFAULT_I2C_FREQUENCY_HZ,
    };

    let out_dir_path = PathBuf::from(std::env::var_os("OUT_DIR").unwrap());
    let out_file_path = out_dir_path.join("consts.rs");

    std::fs::write(
        out_file_path,
        format!(
            "
            // generated from env vars
            pub const POLL_INTERVAL_SECS: u64 = {poll_interval_secs};
            pub const I2C_FREQUENCY_HZ: u32 = {i2c_frequency_hz};"
        ),
    )
    .unwrap();
}

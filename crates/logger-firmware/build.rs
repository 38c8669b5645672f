//! Bakes the optional commissioning datetime into the firmware.
//!
//! `LOGGER_COMMISSION_DATETIME` (`YYYY-MM-DD HH:MM:SS`) is taken from the
//! environment or from a `.env` file next to this crate's `Cargo.toml`. The
//! firmware only applies it when the BOOT button is held at power-on.

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=LOGGER_COMMISSION_DATETIME");

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            println!("cargo:warning=unable to read .env: {e}");
        }
    }

    if let Ok(datetime) = std::env::var("LOGGER_COMMISSION_DATETIME") {
        println!("cargo:rustc-env=LOGGER_COMMISSION_DATETIME={datetime}");
    }
}

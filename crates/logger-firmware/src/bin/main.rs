#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::timer::timg::TimerGroup;
use log::{LevelFilter, info};
use rtt_target::{rprintln, rtt_init, set_print_channel};

use logger_core::config::BootMode;
use logger_core::{LoggerParts, startup};
use logger_firmware::{COMMISSION_DATETIME, hardware};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    // Channel 0 carries log output, channel 1 the console (data rows and
    // startup messages), so a host can capture the CSV stream on its own.
    let channels = rtt_init! {
        up: {
            0: { size: 1024, name: "Terminal" }
            1: { size: 1024, name: "Console" }
        }
    };
    set_print_channel(channels.up.0);
    rtt_target::init_logger_with_level(LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    // Sampled once: holding BOOT through reset asks for commissioning.
    let button = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );
    let mode = BootMode::select(button.is_low(), COMMISSION_DATETIME);
    drop(button);

    let sensors = hardware::init_i2c_sensors(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9);
    let storage = hardware::init_sd_storage(
        peripherals.SPI2,
        peripherals.GPIO12,
        peripherals.GPIO11,
        peripherals.GPIO13,
        peripherals.GPIO10,
    );

    let parts = LoggerParts {
        climate: hardware::init_dht11(peripherals.GPIO4),
        pressure: sensors.pressure,
        clock: sensors.clock,
        storage,
        console: channels.up.1,
        indicator: Output::new(peripherals.GPIO2, Level::Low, OutputConfig::default()),
    };

    match startup::initialize(parts, mode).await {
        Ok(logger) => logger.run().await,
        Err(e) => {
            log::error!("{}", e);
            startup::halt().await
        }
    }
}

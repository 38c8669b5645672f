//! Hardware initialization for the logger board
//!
//! | Function          | Pins                                            |
//! |-------------------|-------------------------------------------------|
//! | I2C0 (100 kHz)    | SDA GPIO8, SCL GPIO9 (BMP180, DS3231)           |
//! | SPI2 (SD card)    | SCK GPIO12, MOSI GPIO11, MISO GPIO13, CS GPIO10 |
//! | DHT11 data        | GPIO4, open drain with pull-up                  |
//! | Status LED        | GPIO2                                           |
//! | Commission button | GPIO0 (BOOT), active low                        |

use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use embedded_sdmmc::SdCard;
use esp_hal::Async;
use esp_hal::Blocking;
use esp_hal::delay::Delay;
use esp_hal::gpio::{DriveMode, Flex, Level, Output, OutputConfig, Pull};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::peripherals::{GPIO4, GPIO8, GPIO9, GPIO10, GPIO11, GPIO12, GPIO13, I2C0, SPI2};
use esp_hal::spi::Mode as SpiMode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use log::info;
use static_cell::StaticCell;

use logger_core::sensors::{Bmp180, Dht11, Ds3231};
use logger_core::storage::{ClockTimeSource, SdCardStorage};

pub type I2cBus = I2c<'static, Async>;
pub type SharedBus = I2cDevice<'static, CriticalSectionRawMutex, I2cBus>;
pub type SdSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, NoDelay>;
pub type Storage = SdCardStorage<SdSpi, Delay, ClockTimeSource>;

/// The two I2C parts, each with its own handle on the shared bus.
pub struct I2cSensors {
    pub clock: Ds3231<SharedBus>,
    pub pressure: Bmp180<SharedBus, embassy_time::Delay>,
}

/// Create the I2C bus and the drivers of the parts on it.
pub fn init_i2c_sensors(
    i2c0: I2C0<'static>,
    sda: GPIO8<'static>,
    scl: GPIO9<'static>,
) -> I2cSensors {
    // The DS3231 and BMP180 are both rated for standard mode.
    let i2c = I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(100)))
        .expect("valid I2C configuration")
        .with_sda(sda)
        .with_scl(scl)
        .into_async();

    static I2C0_BUS: StaticCell<AsyncMutex<CriticalSectionRawMutex, I2cBus>> = StaticCell::new();
    let bus = I2C0_BUS.init(AsyncMutex::new(i2c));

    info!("I2C bus ready");
    I2cSensors {
        clock: Ds3231::new(I2cDevice::new(bus)),
        pressure: Bmp180::new(I2cDevice::new(bus), embassy_time::Delay),
    }
}

/// SD card on SPI2. The card itself is only probed on first access, which
/// is the mount during startup.
pub fn init_sd_storage(
    spi2: SPI2<'static>,
    sck: GPIO12<'static>,
    mosi: GPIO11<'static>,
    miso: GPIO13<'static>,
    cs: GPIO10<'static>,
) -> Storage {
    // SD cards must be initialized at 100-400 kHz.
    let spi = Spi::new(
        spi2,
        SpiConfig::default()
            .with_frequency(Rate::from_khz(400))
            .with_mode(SpiMode::_0),
    )
    .expect("valid SPI configuration")
    .with_sck(sck)
    .with_mosi(mosi)
    .with_miso(miso);

    let cs = Output::new(cs, Level::High, OutputConfig::default());
    let device = ExclusiveDevice::new_no_delay(spi, cs).expect("CS pin is infallible");

    SdCardStorage::new(SdCard::new(device, Delay::new()), ClockTimeSource)
}

/// DHT11 on an open-drain line. The module's own pull-up is usually
/// present; the internal one is enabled as well.
pub fn init_dht11(data: GPIO4<'static>) -> Dht11<Flex<'static>, Delay> {
    let mut pin = Flex::new(data);
    pin.apply_output_config(
        &OutputConfig::default()
            .with_drive_mode(DriveMode::OpenDrain)
            .with_pull(Pull::Up),
    );
    pin.set_input_enable(true);
    pin.set_output_enable(true);

    Dht11::new(pin, Delay::new())
}

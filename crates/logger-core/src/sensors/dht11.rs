//! DHT11 humidity/temperature sensor on a single open-drain data line.
//!
//! The line needs a pull-up so it idles high. A transfer is:
//!
//! 1. host pulls the line low for at least 18 ms, then releases it
//! 2. sensor answers low ~80 µs, high ~80 µs
//! 3. 40 data bits, each a ~50 µs low followed by a high pulse of ~27 µs
//!    (`0`) or ~70 µs (`1`)
//!
//! The five bytes are humidity integer/decimal, temperature integer/decimal
//! and a checksum (sum of the first four, truncated to 8 bits).
//!
//! Bit timing is measured by polling the line once per microsecond, so this
//! driver is blocking and should not be preempted while it reads.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, error};

use super::{ClimateReadings, Sensor, SensorError};

const SENSOR: &str = "DHT11";

/// Host start signal length.
const START_LOW_MS: u32 = 18;
/// Upper bound for any single level while waiting on the sensor.
const EDGE_TIMEOUT_US: u32 = 100;
/// A high pulse still present this long after its rising edge is a `1`.
const BIT_THRESHOLD_US: u32 = 30;

pub struct Dht11<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> Dht11<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    /// Wrap an open-drain pin. The line is released so it idles high.
    pub fn new(mut pin: P, delay: D) -> Self {
        if pin.set_high().is_err() {
            error!("{}: failed to release data line", SENSOR);
        }
        Self { pin, delay }
    }

    /// Perform one full transfer and decode it.
    pub fn measure(&mut self) -> Result<ClimateReadings, SensorError> {
        let frame = self.read_frame()?;
        debug!("{}: raw frame {:02x?}", SENSOR, frame);
        decode(&frame)
    }

    fn read_frame(&mut self) -> Result<[u8; 5], SensorError> {
        self.pin.set_low().map_err(|_| bus("start signal"))?;
        self.delay.delay_ms(START_LOW_MS);
        self.pin.set_high().map_err(|_| bus("start signal"))?;

        // Response: the sensor pulls low, then high, then low again before
        // the first data bit.
        self.wait_for(false, "response low")?;
        self.wait_for(true, "response high")?;
        self.wait_for(false, "first data bit")?;

        let mut frame = [0_u8; 5];
        for byte in frame.iter_mut() {
            for _ in 0..8 {
                self.wait_for(true, "data bit")?;
                self.delay.delay_us(BIT_THRESHOLD_US);
                let bit = self.pin.is_high().map_err(|_| bus("data bit"))?;
                *byte = (*byte << 1) | u8::from(bit);
                if bit {
                    self.wait_for(false, "end of data bit")?;
                }
            }
        }

        Ok(frame)
    }

    /// Poll until the line reaches `high`, giving up after `EDGE_TIMEOUT_US`.
    fn wait_for(&mut self, high: bool, operation: &'static str) -> Result<(), SensorError> {
        for _ in 0..EDGE_TIMEOUT_US {
            if self.pin.is_high().map_err(|_| bus(operation))? == high {
                return Ok(());
            }
            self.delay.delay_us(1);
        }
        Err(SensorError::Timeout {
            sensor: SENSOR,
            operation,
        })
    }
}

fn bus(operation: &'static str) -> SensorError {
    SensorError::Bus {
        sensor: SENSOR,
        operation,
    }
}

fn decode(frame: &[u8; 5]) -> Result<ClimateReadings, SensorError> {
    let sum = frame[..4].iter().fold(0_u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(SensorError::ChecksumMismatch { sensor: SENSOR });
    }

    let humidity_percent = f32::from(frame[0]) + f32::from(frame[1]) * 0.1;
    let magnitude = f32::from(frame[2]) + f32::from(frame[3] & 0x0f) * 0.1;
    let temperature_celsius = if frame[3] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };

    Ok(ClimateReadings {
        temperature_celsius,
        humidity_percent,
    })
}

impl<P, D> Sensor for Dht11<P, D>
where
    P: InputPin + OutputPin,
    D: DelayNs,
{
    type Readings = ClimateReadings;

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        self.measure().map_err(|e| {
            error!("DHT11 measurement failed: {}", e);
            e
        })
    }
}

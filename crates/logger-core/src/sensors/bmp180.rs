//! Bosch BMP180 barometric pressure sensor (I2C, address 0x77)
//!
//! The part returns uncompensated temperature and pressure words. Turning them
//! into °C and Pa needs the 11 factory calibration coefficients stored in its
//! EEPROM and the integer compensation routine from the datasheet, which is
//! reproduced here step for step.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, error, info};

use super::{PressureEvent, PressureSensor, Sensor, SensorError};

const SENSOR: &str = "BMP180";

pub const ADDRESS: u8 = 0x77;

const REG_CHIP_ID: u8 = 0xD0;
const REG_CALIBRATION: u8 = 0xAA;
const REG_CONTROL: u8 = 0xF4;
const REG_RESULT: u8 = 0xF6;

const CHIP_ID: u8 = 0x55;
const CMD_TEMPERATURE: u8 = 0x2E;
const CMD_PRESSURE: u8 = 0x34;

/// Temperature conversion time, rounded up from 4.5 ms.
const TEMPERATURE_WAIT_MS: u32 = 5;

/// Pressure oversampling setting (`oss`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    UltraLowPower = 0,
    Standard = 1,
    HighResolution = 2,
    #[default]
    UltraHighResolution = 3,
}

impl Oversampling {
    const fn oss(self) -> u8 {
        self as u8
    }

    /// Worst-case conversion time from the datasheet, rounded up.
    const fn wait_ms(self) -> u32 {
        match self {
            Self::UltraLowPower => 5,
            Self::Standard => 8,
            Self::HighResolution => 14,
            Self::UltraHighResolution => 26,
        }
    }
}

/// Factory calibration coefficients, read once at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    /// Decode the 22-byte big-endian block starting at 0xAA.
    pub fn from_bytes(raw: &[u8; 22]) -> Self {
        let word = |i: usize| u16::from_be_bytes([raw[2 * i], raw[2 * i + 1]]);
        Self {
            ac1: word(0) as i16,
            ac2: word(1) as i16,
            ac3: word(2) as i16,
            ac4: word(3),
            ac5: word(4),
            ac6: word(5),
            b1: word(6) as i16,
            b2: word(7) as i16,
            mb: word(8) as i16,
            mc: word(9) as i16,
            md: word(10) as i16,
        }
    }

    /// An erased or absent EEPROM reads as all zeros or all ones.
    fn is_plausible(&self, raw: &[u8; 22]) -> bool {
        !raw.iter().all(|&b| b == 0x00) && !raw.iter().all(|&b| b == 0xFF) && self.md != 0
    }

    /// Intermediate `B5`, shared by the temperature and pressure formulas.
    fn b5(&self, ut: i32) -> Option<i64> {
        let x1 = ((i64::from(ut) - i64::from(self.ac6)) * i64::from(self.ac5)) >> 15;
        let divisor = x1 + i64::from(self.md);
        if divisor == 0 {
            return None;
        }
        let x2 = (i64::from(self.mc) << 11) / divisor;
        Some(x1 + x2)
    }

    /// Temperature in 0.1 °C.
    pub fn temperature_decicelsius(&self, ut: i32) -> Option<i32> {
        let b5 = self.b5(ut)?;
        Some(((b5 + 8) >> 4) as i32)
    }

    /// Pressure in Pa.
    pub fn pressure_pa(&self, ut: i32, up: i32, oversampling: Oversampling) -> Option<i32> {
        let oss = u32::from(oversampling.oss());
        let b6 = self.b5(ut)? - 4000;

        let x1 = (i64::from(self.b2) * ((b6 * b6) >> 12)) >> 11;
        let x2 = (i64::from(self.ac2) * b6) >> 11;
        let x3 = x1 + x2;
        let b3 = (((i64::from(self.ac1) * 4 + x3) << oss) + 2) >> 2;

        let x1 = (i64::from(self.ac3) * b6) >> 13;
        let x2 = (i64::from(self.b1) * ((b6 * b6) >> 12)) >> 16;
        let x3 = ((x1 + x2) + 2) >> 2;
        let b4 = ((u64::from(self.ac4) * ((x3 + 32768) as u32 as u64)) >> 15) as u32;
        if b4 == 0 {
            return None;
        }

        // Unsigned 32-bit arithmetic, as in the reference implementation.
        let b7 = (up as u32)
            .wrapping_sub(b3 as u32)
            .wrapping_mul(50_000 >> oss);
        let p = i64::from(if b7 < 0x8000_0000 {
            (b7 * 2) / b4
        } else {
            (b7 / b4) * 2
        });

        let x1 = (p >> 8) * (p >> 8);
        let x1 = (x1 * 3038) >> 16;
        let x2 = (-7357 * p) >> 16;

        Some((p + ((x1 + x2 + 3791) >> 4)) as i32)
    }
}

pub struct Bmp180<I, D> {
    i2c: I,
    delay: D,
    oversampling: Oversampling,
    calibration: Option<Calibration>,
}

impl<I: I2c, D: DelayNs> Bmp180<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self::with_oversampling(i2c, delay, Oversampling::default())
    }

    pub fn with_oversampling(i2c: I, delay: D, oversampling: Oversampling) -> Self {
        Self {
            i2c,
            delay,
            oversampling,
            calibration: None,
        }
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    fn calibrated(&self) -> Result<Calibration, SensorError> {
        self.calibration
            .ok_or(SensorError::NotInitialized { sensor: SENSOR })
    }

    async fn read_register<const N: usize>(
        &mut self,
        register: u8,
        operation: &'static str,
    ) -> Result<[u8; N], SensorError> {
        let mut buf = [0_u8; N];
        self.i2c
            .write_read(ADDRESS, &[register], &mut buf)
            .await
            .map_err(|e| {
                error!("{} {} failed: {:?}", SENSOR, operation, e);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation,
                }
            })?;
        Ok(buf)
    }

    async fn start_conversion(
        &mut self,
        command: u8,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        self.i2c
            .write(ADDRESS, &[REG_CONTROL, command])
            .await
            .map_err(|e| {
                error!("{} {} failed: {:?}", SENSOR, operation, e);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation,
                }
            })
    }

    /// Uncompensated temperature word.
    async fn read_raw_temperature(&mut self) -> Result<i32, SensorError> {
        self.start_conversion(CMD_TEMPERATURE, "start temperature conversion")
            .await?;
        self.delay.delay_ms(TEMPERATURE_WAIT_MS).await;
        let raw: [u8; 2] = self
            .read_register(REG_RESULT, "read temperature result")
            .await?;
        Ok(i32::from(u16::from_be_bytes(raw)))
    }

    /// Uncompensated pressure word, already shifted for the oversampling.
    async fn read_raw_pressure(&mut self) -> Result<i32, SensorError> {
        let oss = self.oversampling.oss();
        self.start_conversion(CMD_PRESSURE + (oss << 6), "start pressure conversion")
            .await?;
        self.delay.delay_ms(self.oversampling.wait_ms()).await;
        let raw: [u8; 3] = self
            .read_register(REG_RESULT, "read pressure result")
            .await?;
        let word = (i32::from(raw[0]) << 16) | (i32::from(raw[1]) << 8) | i32::from(raw[2]);
        Ok(word >> (8 - oss))
    }
}

fn invalid_calibration() -> SensorError {
    SensorError::ReadFailed {
        sensor: SENSOR,
        operation: "compensate reading",
        details: "calibration coefficients produce a division by zero",
    }
}

impl<I: I2c, D: DelayNs> Sensor for Bmp180<I, D> {
    type Readings = PressureEvent;

    async fn read(&mut self) -> Result<PressureEvent, SensorError> {
        let calibration = self.calibrated()?;
        let ut = self.read_raw_temperature().await?;
        let up = self.read_raw_pressure().await?;
        let pa = calibration
            .pressure_pa(ut, up, self.oversampling)
            .ok_or_else(invalid_calibration)?;

        debug!("BMP180: ut={} up={} pressure={} Pa", ut, up, pa);

        // A zero or negative result means there was nothing to report.
        let pressure_hpa = (pa > 0).then(|| pa as f32 / 100.0);
        Ok(PressureEvent { pressure_hpa })
    }
}

impl<I: I2c, D: DelayNs> PressureSensor for Bmp180<I, D> {
    async fn init(&mut self) -> Result<(), SensorError> {
        let [id] = self.read_register::<1>(REG_CHIP_ID, "read chip id").await?;
        if id != CHIP_ID {
            error!("BMP180: unexpected chip id {:#04x}", id);
            return Err(SensorError::InvalidChipId {
                sensor: SENSOR,
                found: id,
            });
        }

        let raw: [u8; 22] = self
            .read_register(REG_CALIBRATION, "read calibration")
            .await?;
        let calibration = Calibration::from_bytes(&raw);
        if !calibration.is_plausible(&raw) {
            return Err(SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "calibration EEPROM is blank",
            });
        }

        info!("BMP180: calibration loaded {:?}", calibration);
        self.calibration = Some(calibration);
        Ok(())
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let calibration = self.calibrated()?;
        let ut = self.read_raw_temperature().await?;
        let deci = calibration
            .temperature_decicelsius(ut)
            .ok_or_else(invalid_calibration)?;
        Ok(deci as f32 / 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockI2c, SimClock};
    use embassy_futures::block_on;

    /// Coefficients and raw words from the datasheet's worked example.
    const DATASHEET_CALIBRATION: [u8; 22] = [
        0x01, 0x98, 0xff, 0xb8, 0xc7, 0xd1, 0x7f, 0xe5, 0x7f, 0xf5, 0x5a, 0x71, 0x18, 0x2e, 0x00,
        0x04, 0x80, 0x00, 0xdd, 0xf9, 0x0b, 0x34,
    ];
    const UT: [u8; 2] = [0x6c, 0xfa]; // 27898
    const UP: [u8; 3] = [0x5d, 0x23, 0x00]; // 23843 at oss = 0

    fn datasheet_bus() -> MockI2c {
        let bus = MockI2c::new();
        bus.add_device(ADDRESS);
        bus.set_registers(ADDRESS, REG_CHIP_ID, &[CHIP_ID]);
        bus.set_registers(ADDRESS, REG_CALIBRATION, &DATASHEET_CALIBRATION);
        bus.on_write(ADDRESS, REG_CONTROL, CMD_TEMPERATURE, REG_RESULT, &UT);
        bus.on_write(ADDRESS, REG_CONTROL, CMD_PRESSURE, REG_RESULT, &UP);
        bus
    }

    fn datasheet_sensor(bus: MockI2c) -> Bmp180<MockI2c, SimClock> {
        Bmp180::with_oversampling(bus, SimClock::default(), Oversampling::UltraLowPower)
    }

    #[test]
    fn test_calibration_decoding() {
        let cal = Calibration::from_bytes(&DATASHEET_CALIBRATION);
        assert_eq!(cal.ac1, 408);
        assert_eq!(cal.ac2, -72);
        assert_eq!(cal.ac3, -14383);
        assert_eq!(cal.ac4, 32741);
        assert_eq!(cal.ac5, 32757);
        assert_eq!(cal.ac6, 23153);
        assert_eq!(cal.b1, 6190);
        assert_eq!(cal.b2, 4);
        assert_eq!(cal.mb, -32768);
        assert_eq!(cal.mc, -8711);
        assert_eq!(cal.md, 2868);
    }

    #[test]
    fn test_datasheet_compensation() {
        let cal = Calibration::from_bytes(&DATASHEET_CALIBRATION);
        assert_eq!(cal.temperature_decicelsius(27898), Some(150));
        assert_eq!(
            cal.pressure_pa(27898, 23843, Oversampling::UltraLowPower),
            Some(69964)
        );
    }

    #[test]
    fn test_init_and_read() {
        let mut bmp = datasheet_sensor(datasheet_bus());
        block_on(bmp.init()).unwrap();
        assert!(bmp.calibration().is_some());

        let event = block_on(bmp.read()).unwrap();
        assert_eq!(event.pressure_hpa, Some(699.64));

        let temperature = block_on(bmp.read_temperature()).unwrap();
        assert_eq!(temperature, 15.0);
    }

    #[test]
    fn test_wrong_chip_id() {
        let bus = datasheet_bus();
        bus.set_registers(ADDRESS, REG_CHIP_ID, &[0x58]);
        let mut bmp = datasheet_sensor(bus);
        assert_eq!(
            block_on(bmp.init()),
            Err(SensorError::InvalidChipId {
                sensor: "BMP180",
                found: 0x58,
            })
        );
    }

    #[test]
    fn test_blank_calibration() {
        let bus = datasheet_bus();
        bus.set_registers(ADDRESS, REG_CALIBRATION, &[0xFF; 22]);
        let mut bmp = datasheet_sensor(bus);
        assert!(matches!(
            block_on(bmp.init()),
            Err(SensorError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_missing_device() {
        let mut bmp = datasheet_sensor(MockI2c::new());
        assert!(matches!(block_on(bmp.init()), Err(SensorError::Bus { .. })));
    }

    #[test]
    fn test_read_before_init() {
        let mut bmp = datasheet_sensor(datasheet_bus());
        assert_eq!(
            block_on(bmp.read()),
            Err(SensorError::NotInitialized { sensor: "BMP180" })
        );
        assert_eq!(
            block_on(bmp.read_temperature()),
            Err(SensorError::NotInitialized { sensor: "BMP180" })
        );
    }

    #[test]
    fn test_ultra_high_resolution_command() {
        let bus = datasheet_bus();
        // oss = 3: command 0xF4 and the result shifted by 5 bits instead of 8.
        bus.on_write(
            ADDRESS,
            REG_CONTROL,
            CMD_PRESSURE + (3 << 6),
            REG_RESULT,
            &[0x5d, 0x23, 0x00],
        );
        let mut bmp = Bmp180::new(bus.clone(), SimClock::default());
        block_on(bmp.init()).unwrap();
        let event = block_on(bmp.read()).unwrap();
        assert!(event.pressure_hpa.is_some());
        assert!(bus.writes(ADDRESS).contains(&std::vec![REG_CONTROL, 0xF4]));
    }
}

//! In-crate test doubles: simulated time, GPIO, I2C, storage and sensors.

use core::convert::Infallible;
use core::fmt;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType as I2cErrorType, I2c, Operation};

use crate::sensors::{
    ClimateReadings, Clock, PressureEvent, PressureSensor, Sensor, SensorError,
};
use crate::storage::{LogStorage, StorageError};
use crate::time::DateTime;

/// Simulated monotonic time. Delays advance it instead of sleeping.
#[derive(Clone, Default)]
pub struct SimClock {
    now_ns: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn now_ns(&self) -> u64 {
        self.now_ns.get()
    }

    fn advance(&self, ns: u32) {
        self.now_ns.set(self.now_ns.get() + u64::from(ns));
    }
}

impl embedded_hal::delay::DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(ns);
    }
}

impl embedded_hal_async::delay::DelayNs for SimClock {
    async fn delay_ns(&mut self, ns: u32) {
        self.advance(ns);
    }
}

/// Open-drain line with a pull-up and a device that replays a waveform.
///
/// `levels` are `(high, duration_us)` pairs measured from the moment the
/// host last released the line. The line reads low while the host drives it
/// low and high (pulled up) once the waveform is exhausted.
pub struct WaveformPin {
    clock: SimClock,
    levels: Vec<(bool, u32)>,
    driven_low: bool,
    released_at_ns: u64,
}

impl WaveformPin {
    pub fn new(clock: SimClock, levels: Vec<(bool, u32)>) -> Self {
        Self {
            clock,
            levels,
            driven_low: false,
            released_at_ns: 0,
        }
    }

    fn level(&self) -> bool {
        if self.driven_low {
            return false;
        }
        let elapsed_ns = self.clock.now_ns() - self.released_at_ns;
        let mut start_ns = 0_u64;
        for &(high, duration_us) in &self.levels {
            let end_ns = start_ns + u64::from(duration_us) * 1_000;
            if elapsed_ns < end_ns {
                return high;
            }
            start_ns = end_ns;
        }
        true
    }
}

impl PinErrorType for WaveformPin {
    type Error = Infallible;
}

impl OutputPin for WaveformPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.driven_low = true;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.driven_low = false;
        self.released_at_ns = self.clock.now_ns();
        Ok(())
    }
}

impl InputPin for WaveformPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level())
    }
}

/// Output pin that records every level it is driven to.
#[derive(Clone, Default)]
pub struct RecordingPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl RecordingPin {
    pub fn levels(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }
}

impl PinErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

struct WriteTrigger {
    address: u8,
    register: u8,
    value: u8,
    target: u8,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct I2cState {
    devices: HashSet<u8>,
    registers: HashMap<u8, [u8; 256]>,
    pointers: HashMap<u8, u8>,
    triggers: Vec<WriteTrigger>,
    writes: Vec<(u8, Vec<u8>)>,
}

/// Register-file I2C bus. Every device has 256 byte registers and an
/// auto-incrementing register pointer, like the parts on the logger board.
#[derive(Clone, Default)]
pub struct MockI2c {
    state: Rc<RefCell<I2cState>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, address: u8) {
        let mut state = self.state.borrow_mut();
        state.devices.insert(address);
        state.registers.entry(address).or_insert([0; 256]);
    }

    pub fn set_registers(&self, address: u8, register: u8, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let file = state.registers.entry(address).or_insert([0; 256]);
        for (offset, byte) in bytes.iter().enumerate() {
            file[usize::from(register.wrapping_add(offset as u8))] = *byte;
        }
    }

    pub fn registers(&self, address: u8, register: u8, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        let file = state.registers.get(&address).copied().unwrap_or([0; 256]);
        (0..len)
            .map(|offset| file[usize::from(register.wrapping_add(offset as u8))])
            .collect()
    }

    /// Writing `value` to `register` loads `bytes` at `target`, the way a
    /// conversion command makes a result appear.
    pub fn on_write(&self, address: u8, register: u8, value: u8, target: u8, bytes: &[u8]) {
        self.state.borrow_mut().triggers.push(WriteTrigger {
            address,
            register,
            value,
            target,
            bytes: bytes.to_vec(),
        });
    }

    /// Register writes (pointer byte followed by data) sent to `address`.
    pub fn writes(&self, address: u8) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    fn apply_write(&self, address: u8, bytes: &[u8]) {
        let Some((&register, data)) = bytes.split_first() else {
            return;
        };
        self.state.borrow_mut().pointers.insert(address, register);
        if data.is_empty() {
            return;
        }

        self.set_registers(address, register, data);
        self.state
            .borrow_mut()
            .writes
            .push((address, bytes.to_vec()));

        let fired: Vec<(u8, Vec<u8>)> = self
            .state
            .borrow()
            .triggers
            .iter()
            .filter(|t| t.address == address && t.register == register && t.value == data[0])
            .map(|t| (t.target, t.bytes.clone()))
            .collect();
        for (target, bytes) in fired {
            self.set_registers(address, target, &bytes);
        }
    }

    fn apply_read(&self, address: u8, buffer: &mut [u8]) {
        let register = self.state.borrow().pointers.get(&address).copied().unwrap_or(0);
        buffer.copy_from_slice(&self.registers(address, register, buffer.len()));
        self.state
            .borrow_mut()
            .pointers
            .insert(address, register.wrapping_add(buffer.len() as u8));
    }
}

impl I2cErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), ErrorKind> {
        if !self.state.borrow().devices.contains(&address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.apply_write(address, bytes),
                Operation::Read(buffer) => self.apply_read(address, buffer),
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct StorageState {
    mount_fails: bool,
    fail_appends: usize,
    mounts: usize,
    files: HashMap<String, Vec<u8>>,
    appends: Vec<(String, Vec<u8>)>,
}

/// In-memory volume. Clones share the same files.
#[derive(Clone, Default)]
pub struct MockStorage {
    state: Rc<RefCell<StorageState>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mount_fails(&self, fails: bool) {
        self.state.borrow_mut().mount_fails = fails;
    }

    /// Make the next `count` appends fail to open the file.
    pub fn fail_next_appends(&self, count: usize) {
        self.state.borrow_mut().fail_appends = count;
    }

    pub fn set_contents(&self, name: &str, contents: &str) {
        self.state
            .borrow_mut()
            .files
            .insert(name.into(), contents.as_bytes().to_vec());
    }

    pub fn contents(&self, name: &str) -> String {
        let state = self.state.borrow();
        let bytes = state.files.get(name).cloned().unwrap_or_default();
        String::from_utf8(bytes).unwrap()
    }

    /// Every successful append, in order.
    pub fn appends(&self) -> Vec<String> {
        self.state
            .borrow()
            .appends
            .iter()
            .map(|(_, bytes)| String::from_utf8(bytes.clone()).unwrap())
            .collect()
    }

    pub fn mounts(&self) -> usize {
        self.state.borrow().mounts
    }
}

impl LogStorage for MockStorage {
    fn mount(&mut self) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        if state.mount_fails {
            return Err(StorageError::mount(&"no card"));
        }
        state.mounts += 1;
        Ok(())
    }

    fn is_empty(&mut self, file_name: &str) -> Result<bool, StorageError> {
        let state = self.state.borrow();
        Ok(state.files.get(file_name).is_none_or(|f| f.is_empty()))
    }

    fn append(
        &mut self,
        file_name: &str,
        data: &[u8],
        on_open: impl FnOnce(),
    ) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();
        if state.fail_appends > 0 {
            state.fail_appends -= 1;
            return Err(StorageError::open(&"card removed"));
        }
        on_open();
        state
            .files
            .entry(file_name.into())
            .or_default()
            .extend_from_slice(data);
        state.appends.push((file_name.into(), data.to_vec()));
        Ok(())
    }
}

/// Console that keeps everything written to it.
#[derive(Clone, Default)]
pub struct SharedConsole {
    text: Rc<RefCell<String>>,
}

impl SharedConsole {
    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.text.borrow().lines().map(String::from).collect()
    }
}

impl fmt::Write for SharedConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.text.borrow_mut().push_str(s);
        Ok(())
    }
}

/// Environmental sensor returning a scripted result.
#[derive(Clone)]
pub struct FakeClimate {
    result: Rc<Cell<Result<ClimateReadings, SensorError>>>,
}

impl FakeClimate {
    pub fn new(temperature_celsius: f32, humidity_percent: f32) -> Self {
        Self {
            result: Rc::new(Cell::new(Ok(ClimateReadings {
                temperature_celsius,
                humidity_percent,
            }))),
        }
    }

    pub fn set(&self, result: Result<ClimateReadings, SensorError>) {
        self.result.set(result);
    }
}

impl Sensor for FakeClimate {
    type Readings = ClimateReadings;

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        self.result.get()
    }
}

pub const FAKE_FAILURE: SensorError = SensorError::ReadFailed {
    sensor: "fake",
    operation: "read",
    details: "scripted failure",
};

/// Pressure sensor returning scripted results and counting its calls.
#[derive(Clone)]
pub struct FakePressure {
    init: Result<(), SensorError>,
    event: Rc<Cell<Result<PressureEvent, SensorError>>>,
    temperature: Rc<Cell<Result<f32, SensorError>>>,
    temperature_reads: Rc<Cell<usize>>,
}

impl FakePressure {
    pub fn new(pressure_hpa: Option<f32>, temperature: f32) -> Self {
        Self {
            init: Ok(()),
            event: Rc::new(Cell::new(Ok(PressureEvent { pressure_hpa }))),
            temperature: Rc::new(Cell::new(Ok(temperature))),
            temperature_reads: Rc::new(Cell::new(0)),
        }
    }

    pub fn absent() -> Self {
        Self {
            init: Err(SensorError::Bus {
                sensor: "fake",
                operation: "read chip id",
            }),
            ..Self::new(None, f32::NAN)
        }
    }

    pub fn set_event(&self, event: Result<PressureEvent, SensorError>) {
        self.event.set(event);
    }

    pub fn set_temperature(&self, temperature: Result<f32, SensorError>) {
        self.temperature.set(temperature);
    }

    pub fn temperature_reads(&self) -> usize {
        self.temperature_reads.get()
    }
}

impl Sensor for FakePressure {
    type Readings = PressureEvent;

    async fn read(&mut self) -> Result<PressureEvent, SensorError> {
        self.event.get()
    }
}

impl PressureSensor for FakePressure {
    async fn init(&mut self) -> Result<(), SensorError> {
        self.init
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.temperature_reads.set(self.temperature_reads.get() + 1);
        self.temperature.get()
    }
}

/// Clock with a settable time. `set` succeeds and moves the time.
#[derive(Clone)]
pub struct FakeClock {
    now: Rc<Cell<Result<DateTime, SensorError>>>,
    temperature: Rc<Cell<Result<i16, SensorError>>>,
    sets: Rc<RefCell<Vec<DateTime>>>,
}

impl FakeClock {
    pub fn new(now: DateTime, temperature: i16) -> Self {
        Self {
            now: Rc::new(Cell::new(Ok(now))),
            temperature: Rc::new(Cell::new(Ok(temperature))),
            sets: Rc::default(),
        }
    }

    pub fn set_now(&self, now: Result<DateTime, SensorError>) {
        self.now.set(now);
    }

    pub fn set_temperature(&self, temperature: Result<i16, SensorError>) {
        self.temperature.set(temperature);
    }

    pub fn sets(&self) -> Vec<DateTime> {
        self.sets.borrow().clone()
    }
}

impl Clock for FakeClock {
    async fn now(&mut self) -> Result<DateTime, SensorError> {
        self.now.get()
    }

    async fn temperature(&mut self) -> Result<i16, SensorError> {
        self.temperature.get()
    }

    async fn set(&mut self, datetime: &DateTime) -> Result<(), SensorError> {
        self.sets.borrow_mut().push(*datetime);
        self.now.set(Ok(*datetime));
        Ok(())
    }
}

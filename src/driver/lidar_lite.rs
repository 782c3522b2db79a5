//! Garmin LIDAR-Lite v3HP driver
//!
//! Sequences [`RegisterBus`] accesses into the sensor protocol:
//!
//! # Presets
//! Six operating modes, each a bundle of three register values
//! (acquisition count maximum, reference mode, threshold override).
//!
//! # Measurement
//! A measurement writes an acquisition command to register `0x00`, waits for
//! the busy flag to clear and reads the big-endian distance from `0x8f`. Bias
//! correction is slower but compensates receiver drift, so callers should
//! request it periodically. The driver leaves that cadence to the caller.
//!
//! # Failures
//! Bus faults are logged by the transport and returned. Nothing is retried
//! here, the next acquisition simply issues the whole sequence again.

use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use thiserror_no_std::Error;

use super::bus::{BusError, BusStats, RegisterBus, DEFAULT_ADDRESS};

/// Time the device needs after [`LidarLite::reset`] before it accepts commands
pub const RESET_SETTLE_MS: u32 = 22;

/// Upper bound on samples in one correlation record
pub const MAX_CORRELATION_READINGS: u16 = 1024;

mod reg {
    pub const ACQ_COMMAND: u8 = 0x00;
    pub const ACQ_COUNT_MAX: u8 = 0x02;
    pub const REFERENCE_MODE: u8 = 0x04;
    pub const THRESHOLD_OVERRIDE: u8 = 0x1c;
    pub const TEST_COMMAND: u8 = 0x40;
    pub const MEMORY_BANK: u8 = 0x5d;
    /// Distance high byte, auto-increments into the low byte
    pub const DISTANCE: u8 = 0x8f;
    pub const CORRELATION_DATA: u8 = 0xd2;
}

mod cmd {
    pub const RESET: u8 = 0x00;
    pub const MEASURE: u8 = 0x03;
    pub const MEASURE_BIAS_CORRECTED: u8 = 0x04;
    pub const CORRELATION_BANK: u8 = 0xc0;
    pub const TEST_MODE_ENABLE: u8 = 0x07;
    pub const TEST_MODE_DISABLE: u8 = 0x00;
}

/// Errors raised by the sensor driver
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LidarError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("unknown preset id {0}")]
    UnknownPreset(u8),

    #[error("{0} correlation readings requested, at most 1024 allowed")]
    TooManyReadings(u16),

    /// The correlation sink refused a write
    #[error("correlation output failed")]
    Output,
}

/// Register values applied by a [`Preset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PresetRegisters {
    pub acquisition_count_max: u8,
    pub reference_mode: u8,
    pub threshold_override: u8,
}

/// Sensor operating mode, trading range against speed and sensitivity
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Preset {
    /// Default mode, balanced performance
    #[default]
    Balanced = 0,
    /// Short range, high speed
    ShortRangeFast = 1,
    /// Default range, higher speed short range
    DefaultRangeFastShort = 2,
    /// Maximum range
    MaximumRange = 3,
    /// High sensitivity detection, more erroneous measurements
    HighSensitivity = 4,
    /// Low sensitivity detection, fewer erroneous measurements
    LowSensitivity = 5,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::Balanced,
        Preset::ShortRangeFast,
        Preset::DefaultRangeFastShort,
        Preset::MaximumRange,
        Preset::HighSensitivity,
        Preset::LowSensitivity,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub const fn registers(self) -> PresetRegisters {
        let (acquisition_count_max, reference_mode, threshold_override) = match self {
            Preset::Balanced => (0x80, 0x08, 0x00),
            Preset::ShortRangeFast => (0x1d, 0x08, 0x00),
            Preset::DefaultRangeFastShort => (0x80, 0x00, 0x00),
            Preset::MaximumRange => (0xff, 0x08, 0x00),
            Preset::HighSensitivity => (0x80, 0x08, 0x80),
            Preset::LowSensitivity => (0x80, 0x08, 0xb0),
        };
        PresetRegisters {
            acquisition_count_max,
            reference_mode,
            threshold_override,
        }
    }
}

impl TryFrom<u8> for Preset {
    type Error = LidarError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.id() == id)
            .ok_or(LidarError::UnknownPreset(id))
    }
}

/// I2C clock selection for the sensor bus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusSpeed {
    /// 100 kHz
    Standard,
    /// 400 kHz
    #[default]
    Fast,
}

impl BusSpeed {
    pub const fn from_high_speed(high_speed: bool) -> Self {
        if high_speed {
            BusSpeed::Fast
        } else {
            BusSpeed::Standard
        }
    }

    pub const fn frequency_hz(self) -> u32 {
        match self {
            BusSpeed::Standard => 100_000,
            BusSpeed::Fast => 400_000,
        }
    }
}

/// Decode one correlation sample.
///
/// The low byte holds the magnitude, a high byte of 1 marks a negative value.
pub fn decode_correlation_sample(raw: [u8; 2]) -> i16 {
    let [low, high] = raw;
    if high == 1 {
        (0xff00 | u16::from(low)) as i16
    } else {
        i16::from(low)
    }
}

/// LIDAR-Lite v3HP on an async I2C bus
pub struct LidarLite<I2C, D> {
    bus: RegisterBus<I2C, D>,
    preset: Option<Preset>,
}

impl<I2C, D> LidarLite<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Sensor at the factory address [`DEFAULT_ADDRESS`]
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    /// Sensor that was moved to another 7-bit address
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self::from_bus(RegisterBus::new(i2c, delay, address))
    }

    /// Wrap an already configured transport, e.g. one with a custom poll bound.
    /// No preset is applied until [`LidarLite::configure`] runs.
    pub fn from_bus(bus: RegisterBus<I2C, D>) -> Self {
        Self { bus, preset: None }
    }

    pub fn address(&self) -> u8 {
        self.bus.address()
    }

    /// The preset applied last, `None` until configured or after a reset
    pub fn preset(&self) -> Option<Preset> {
        self.preset
    }

    pub fn stats(&self) -> BusStats {
        self.bus.stats()
    }

    pub fn release(self) -> (I2C, D) {
        self.bus.release()
    }

    /// Bring the sensor up in `preset`.
    ///
    /// The bus clock is fixed when the I2C peripheral is built, see
    /// [`BusSpeed::frequency_hz`].
    pub async fn initialize(&mut self, preset: Preset) -> Result<(), LidarError> {
        info!("lidar at {} initializing with preset {:?}", self.address(), preset);
        self.configure(preset).await
    }

    /// Apply the three register values of `preset`
    pub async fn configure(&mut self, preset: Preset) -> Result<(), LidarError> {
        let regs = preset.registers();
        self.bus
            .write_register(reg::ACQ_COUNT_MAX, regs.acquisition_count_max)
            .await?;
        self.bus
            .write_register(reg::REFERENCE_MODE, regs.reference_mode)
            .await?;
        self.bus
            .write_register(reg::THRESHOLD_OVERRIDE, regs.threshold_override)
            .await?;
        self.preset = Some(preset);
        debug!("lidar preset {:?} applied", preset);
        Ok(())
    }

    /// Reset the sensor to its factory defaults.
    ///
    /// The caller must wait [`RESET_SETTLE_MS`] before the next command.
    pub async fn reset(&mut self) -> Result<(), LidarError> {
        self.bus.write_register(reg::ACQ_COMMAND, cmd::RESET).await?;
        self.preset = None;
        Ok(())
    }

    /// Take one distance measurement
    pub async fn measure_distance(&mut self, bias_correction: bool) -> Result<u16, LidarError> {
        let command = if bias_correction {
            cmd::MEASURE_BIAS_CORRECTED
        } else {
            cmd::MEASURE
        };
        self.bus.write_register(reg::ACQ_COMMAND, command).await?;

        let mut raw = [0u8; 2];
        self.bus.read_registers(reg::DISTANCE, &mut raw, true).await?;
        Ok(u16::from_be_bytes(raw))
    }

    /// Stream a correlation record into `out`.
    ///
    /// Each sample is written followed by `separator`. Test mode is switched
    /// off again even when streaming failed part way.
    pub async fn correlation_record<W: Write>(
        &mut self,
        separator: char,
        readings: u16,
        out: &mut W,
    ) -> Result<(), LidarError> {
        if readings > MAX_CORRELATION_READINGS {
            return Err(LidarError::TooManyReadings(readings));
        }

        self.bus
            .write_register(reg::MEMORY_BANK, cmd::CORRELATION_BANK)
            .await?;
        self.bus
            .write_register(reg::TEST_COMMAND, cmd::TEST_MODE_ENABLE)
            .await?;

        let streamed = self.stream_correlation(separator, readings, out).await;
        let disabled = self
            .bus
            .write_register(reg::TEST_COMMAND, cmd::TEST_MODE_DISABLE)
            .await;

        streamed?;
        disabled?;
        Ok(())
    }

    async fn stream_correlation<W: Write>(
        &mut self,
        separator: char,
        readings: u16,
        out: &mut W,
    ) -> Result<(), LidarError> {
        let mut raw = [0u8; 2];
        for _ in 0..readings {
            self.bus
                .read_registers(reg::CORRELATION_DATA, &mut raw, false)
                .await?;
            write!(out, "{}{}", decode_correlation_sample(raw), separator)
                .map_err(|_| LidarError::Output)?;
        }
        Ok(())
    }
}

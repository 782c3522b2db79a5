//! Register transport for the LIDAR-Lite bus
//!
//! Every transfer is a plain register access at one 7-bit address:
//!
//! - a write is one transaction carrying `[register, value]`, followed by a
//!   fixed 1 ms turnaround delay
//! - a read writes the register pointer, then reads one or two bytes
//!
//! Reads that depend on a finished acquisition first poll the status register
//! until the busy bit clears. The poll is bounded by an iteration count, and
//! running out of polls is reported once per read, not once per poll.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{Error as _, ErrorKind, I2c};
use thiserror_no_std::Error;

/// Factory default 7-bit address of the LIDAR-Lite v3HP
pub const DEFAULT_ADDRESS: u8 = 0x62;

/// Maximum number of busy polls before a read is abandoned
pub const BUSY_POLL_LIMIT: u32 = 9_999;

/// Ceiling for [`RegisterBus::with_busy_poll_limit`]
pub const MAX_BUSY_POLL_LIMIT: u32 = 100_000;

/// Status register, bit 0 is the busy flag
pub const STATUS_REGISTER: u8 = 0x01;
const STATUS_BUSY: u8 = 0x01;

/// Turnaround delay after every register write
const WRITE_SETTLE_US: u32 = 1_000;

/// Errors raised by the register transport
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The device did not acknowledge an address or data byte
    #[error("device did not acknowledge")]
    Nack,

    /// Any other bus fault (arbitration loss, overrun, ...)
    #[error("bus transfer failed")]
    Transfer,

    /// The busy flag never cleared within the poll bound
    #[error("device still busy after {polls} status polls")]
    BusyTimeout { polls: u32 },

    /// Register reads move one or two bytes only
    #[error("register read of {len} bytes is not supported")]
    InvalidLength { len: usize },
}

/// Failure counters kept by the transport
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStats {
    pub nacks: u32,
    pub transfer_errors: u32,
    pub busy_timeouts: u32,
}

/// Register-level access to one device on an async I2C bus
pub struct RegisterBus<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    busy_poll_limit: u32,
    stats: BusStats,
}

impl<I2C, D> RegisterBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Bind the transport to the device at 7-bit `address`
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            busy_poll_limit: BUSY_POLL_LIMIT,
            stats: BusStats::default(),
        }
    }

    /// Override the busy poll bound. A limit of `n` gives up after `n + 1` busy reads.
    /// Limits above [`MAX_BUSY_POLL_LIMIT`] are clamped to it.
    pub fn with_busy_poll_limit(mut self, limit: u32) -> Self {
        self.busy_poll_limit = limit.min(MAX_BUSY_POLL_LIMIT);
        self
    }

    /// Effective busy poll bound
    pub fn busy_poll_limit(&self) -> u32 {
        self.busy_poll_limit
    }

    /// 7-bit address every transfer goes to
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Failure counters since the transport was created
    pub fn stats(&self) -> BusStats {
        self.stats
    }

    /// Give back the bus and the delay provider
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// Write one register.
    ///
    /// The turnaround delay runs whether or not the device acknowledged, so a
    /// failed write never shortens the spacing between commands.
    pub async fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        let result = self.i2c.write(self.address, &[register, value]).await;
        self.delay.delay_us(WRITE_SETTLE_US).await;
        result.map_err(|e| self.record(e.kind(), register))
    }

    /// Read one or two bytes starting at `register`.
    ///
    /// With `monitor_busy` the status register is polled first. On a busy
    /// timeout `buffer` is left untouched and the caller keeps its last value.
    pub async fn read_registers(
        &mut self,
        register: u8,
        buffer: &mut [u8],
        monitor_busy: bool,
    ) -> Result<(), BusError> {
        if !(1..=2).contains(&buffer.len()) {
            return Err(BusError::InvalidLength { len: buffer.len() });
        }

        if monitor_busy {
            self.wait_until_idle().await?;
        }

        self.read_raw(register, buffer).await
    }

    /// Poll the status register until the busy bit clears.
    ///
    /// Returns the number of status reads it took.
    pub async fn wait_until_idle(&mut self) -> Result<u32, BusError> {
        let mut status = [0u8; 1];
        let mut polls: u32 = 0;

        loop {
            self.read_raw(STATUS_REGISTER, &mut status).await?;
            polls = polls.saturating_add(1);

            if status[0] & STATUS_BUSY == 0 {
                return Ok(polls);
            }

            if polls > self.busy_poll_limit {
                self.stats.busy_timeouts += 1;
                error!("> read failed, device busy after {} polls", polls);
                return Err(BusError::BusyTimeout { polls });
            }
        }
    }

    async fn read_raw(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), BusError> {
        self.i2c
            .write(self.address, &[register])
            .await
            .map_err(|e| self.record(e.kind(), register))?;
        self.i2c
            .read(self.address, buffer)
            .await
            .map_err(|e| self.record(e.kind(), register))
    }

    fn record(&mut self, kind: ErrorKind, register: u8) -> BusError {
        match kind {
            ErrorKind::NoAcknowledge(_) => {
                self.stats.nacks += 1;
                warn!("> nack on register {}", register);
                BusError::Nack
            }
            _ => {
                self.stats.transfer_errors += 1;
                warn!("> bus fault on register {}", register);
                BusError::Transfer
            }
        }
    }
}

//! Simulated LIDAR-Lite for host tests

use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use super::bus::{DEFAULT_ADDRESS, STATUS_REGISTER};

const ACQ_COMMAND: u8 = 0x00;
const DISTANCE: u8 = 0x8f;
const CORRELATION_DATA: u8 = 0xd2;

/// Register-file model of the sensor.
///
/// An acquisition command (0x03 or 0x04 written to register 0x00) pops the
/// next queued distance and keeps the busy bit set for `busy_for` status reads.
pub struct FakeLidar {
    pub address: u8,
    pub registers: [u8; 256],
    pub writes: Vec<(u8, u8)>,
    pub distances: VecDeque<u16>,
    pub correlation: VecDeque<[u8; 2]>,
    pub busy_for: u32,
    pub stuck_busy: bool,
    /// Get stuck busy on the first acquisition after `distances` ran out
    pub stall_when_empty: bool,
    pub nack_register: Option<u8>,
    pub fail_reads_at: Option<u8>,
    pub status_polls: u32,
    busy_remaining: u32,
    distance: u16,
    pointer: u8,
}

impl FakeLidar {
    pub fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            registers: [0; 256],
            writes: Vec::new(),
            distances: VecDeque::new(),
            correlation: VecDeque::new(),
            busy_for: 0,
            stuck_busy: false,
            stall_when_empty: false,
            nack_register: None,
            fail_reads_at: None,
            status_polls: 0,
            busy_remaining: 0,
            distance: 0,
            pointer: 0,
        }
    }

    pub fn with_distances(distances: &[u16]) -> Self {
        let mut device = Self::new();
        device.distances.extend(distances.iter().copied());
        device
    }

    /// Commands written to the acquisition register, in order
    pub fn commands(&self) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(reg, _)| *reg == ACQ_COMMAND)
            .map(|(_, value)| *value)
            .collect()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        match *bytes {
            [register] => {
                self.pointer = register;
                Ok(())
            }
            [register, value] => {
                if self.nack_register == Some(register) {
                    return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                }
                self.writes.push((register, value));
                self.registers[register as usize] = value;
                if register == ACQ_COMMAND && (value == 0x03 || value == 0x04) {
                    match self.distances.pop_front() {
                        Some(next) => self.distance = next,
                        None if self.stall_when_empty => self.stuck_busy = true,
                        None => {}
                    }
                    self.busy_remaining = self.busy_for;
                }
                Ok(())
            }
            _ => Err(ErrorKind::Other),
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<(), ErrorKind> {
        if self.fail_reads_at == Some(self.pointer) {
            return Err(ErrorKind::Bus);
        }
        match self.pointer {
            STATUS_REGISTER => {
                self.status_polls += 1;
                let busy = if self.stuck_busy {
                    true
                } else if self.busy_remaining > 0 {
                    self.busy_remaining -= 1;
                    true
                } else {
                    false
                };
                buffer[0] = busy as u8;
            }
            DISTANCE => {
                let bytes = self.distance.to_be_bytes();
                buffer.copy_from_slice(&bytes[..buffer.len()]);
            }
            CORRELATION_DATA => {
                let sample = self.correlation.pop_front().unwrap_or([0, 0]);
                buffer.copy_from_slice(&sample[..buffer.len()]);
            }
            start => {
                for (offset, byte) in buffer.iter_mut().enumerate() {
                    *byte = self.registers[(start as usize + offset) & 0xff];
                }
            }
        }
        Ok(())
    }
}

impl ErrorType for FakeLidar {
    type Error = ErrorKind;
}

impl I2c for FakeLidar {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.write(bytes)?,
                Operation::Read(buffer) => self.read(buffer)?,
            }
        }
        Ok(())
    }
}

/// Delay provider that returns immediately and sums what was asked for
#[derive(Default)]
pub struct RecordingDelay {
    pub total_ns: u64,
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

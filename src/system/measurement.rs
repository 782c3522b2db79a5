//! Shared distance cell
//!
//! Single writer (the acquisition loop), any number of readers (HTTP handlers,
//! the diagnostic reporter). The lock is held for the copy only, so a reader
//! never blocks the writer for more than a few instructions.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex;

/// Latest filtered distance behind a blocking mutex
pub struct SharedDistance<M: RawMutex> {
    value: Mutex<M, Cell<u16>>,
}

/// Cell type used by the firmware statics
pub type DistanceCell = SharedDistance<CriticalSectionRawMutex>;

impl<M: RawMutex> SharedDistance<M> {
    /// New cell holding 0
    pub const fn new() -> Self {
        Self {
            value: Mutex::new(Cell::new(0)),
        }
    }

    /// Publish a new value, replacing the previous one
    pub fn write(&self, distance: u16) {
        self.value.lock(|cell| cell.set(distance));
    }

    /// Copy out the last published value
    pub fn read(&self) -> u16 {
        self.value.lock(|cell| cell.get())
    }
}

impl<M: RawMutex> Default for SharedDistance<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    static STRESS_CELL: DistanceCell = DistanceCell::new();

    #[test]
    fn starts_at_zero_and_keeps_last_write() {
        let cell = DistanceCell::new();
        assert_eq!(cell.read(), 0);
        cell.write(120);
        cell.write(121);
        assert_eq!(cell.read(), 121);
    }

    #[test]
    fn readers_only_see_written_values() {
        const WRITES: u16 = 50_000;
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut last = 0;
                        while !done.load(Ordering::Acquire) {
                            let seen = STRESS_CELL.read();
                            // the writer counts up, anything else would be torn or invented
                            assert!(seen <= WRITES);
                            assert!(seen >= last);
                            last = seen;
                        }
                    })
                })
                .collect();

            for value in 1..=WRITES {
                STRESS_CELL.write(value);
            }
            done.store(true, Ordering::Release);

            for reader in readers {
                reader.join().unwrap();
            }
        });

        assert_eq!(STRESS_CELL.read(), WRITES);
    }
}

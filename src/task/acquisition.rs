//! Distance acquisition
//!
//! Drives sensor → filter → shared cell at a fixed cadence. A failed
//! measurement is logged and skipped, the cell keeps the last good value
//! and the next tick tries again.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Ticker};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::driver::lidar_lite::{LidarError, LidarLite};
use crate::system::kalman::{KalmanConfig, ScalarKalman};
use crate::system::measurement::SharedDistance;

/// Time between measurements
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_millis(10);

/// Every Nth measurement runs with receiver bias correction
pub const DEFAULT_BIAS_CORRECTION_INTERVAL: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionConfig {
    pub period: Duration,
    pub bias_correction_interval: u32,
    pub kalman: KalmanConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            bias_correction_interval: DEFAULT_BIAS_CORRECTION_INTERVAL,
            kalman: KalmanConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Period limited to 1..=10 ms
    pub fn clamped_period(&self) -> Duration {
        self.period.clamp(MIN_PERIOD, MAX_PERIOD)
    }

    fn interval(&self) -> u32 {
        self.bias_correction_interval.max(1)
    }
}

/// The measurement pipeline, owning the sensor and the filter state
pub struct Acquisition<'a, I2C, D, M: RawMutex> {
    sensor: LidarLite<I2C, D>,
    filter: ScalarKalman,
    cell: &'a SharedDistance<M>,
    config: AcquisitionConfig,
    cycle: u32,
}

impl<'a, I2C, D, M> Acquisition<'a, I2C, D, M>
where
    I2C: I2c,
    D: DelayNs,
    M: RawMutex,
{
    pub fn new(
        sensor: LidarLite<I2C, D>,
        cell: &'a SharedDistance<M>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            sensor,
            filter: ScalarKalman::new(config.kalman),
            cell,
            config,
            cycle: 0,
        }
    }

    /// Number of cycles run so far, failed ones included
    pub fn cycles(&self) -> u32 {
        self.cycle
    }

    pub fn filter(&self) -> &ScalarKalman {
        &self.filter
    }

    pub fn sensor(&self) -> &LidarLite<I2C, D> {
        &self.sensor
    }

    fn bias_correction_due(&self) -> bool {
        self.cycle % self.config.interval() == 0
    }

    /// Run one measure, filter, publish step and return the published value
    pub async fn cycle(&mut self) -> Result<u16, LidarError> {
        let bias_correction = self.bias_correction_due();
        self.cycle = self.cycle.wrapping_add(1);

        let raw = match self.sensor.measure_distance(bias_correction).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("distance measurement failed: {}", e);
                return Err(e);
            }
        };

        let estimate = self.filter.update(f32::from(raw));
        // saturating float cast, truncates toward zero
        let published = estimate as u16;
        self.cell.write(published);
        trace!("raw {} filtered {}", raw, published);
        Ok(published)
    }

    /// Measure forever at the configured period
    pub async fn run(&mut self) -> ! {
        let period = self.config.clamped_period();
        info!("acquisition running every {} ms", period.as_millis());
        let mut ticker = Ticker::every(period);
        loop {
            // errors are logged inside cycle, the cell keeps its value
            let _ = self.cycle().await;
            ticker.next().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::bus::RegisterBus;
    use crate::driver::mock::{FakeLidar, RecordingDelay};
    use crate::driver::BusError;
    use crate::system::measurement::DistanceCell;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    const MEASURE: u8 = 0x03;
    const MEASURE_BIAS_CORRECTED: u8 = 0x04;

    fn sensor(device: FakeLidar) -> LidarLite<FakeLidar, RecordingDelay> {
        LidarLite::new(device, RecordingDelay::default())
    }

    fn commands(
        acquisition: Acquisition<'_, FakeLidar, RecordingDelay, CriticalSectionRawMutex>,
    ) -> std::vec::Vec<u8> {
        let (device, _) = acquisition.sensor.release();
        device.commands()
    }

    #[test]
    fn first_value_is_published_unfiltered() {
        let cell = DistanceCell::new();
        let mut acquisition = Acquisition::new(
            sensor(FakeLidar::with_distances(&[250])),
            &cell,
            AcquisitionConfig::default(),
        );

        assert_eq!(block_on(acquisition.cycle()), Ok(250));
        assert_eq!(cell.read(), 250);
    }

    #[test]
    fn published_value_is_truncated_estimate() {
        let cell = DistanceCell::new();
        let mut acquisition = Acquisition::new(
            sensor(FakeLidar::with_distances(&[100, 101])),
            &cell,
            AcquisitionConfig::default(),
        );

        block_on(acquisition.cycle()).unwrap();
        let published = block_on(acquisition.cycle()).unwrap();
        let estimate = acquisition.filter().estimate().unwrap();
        assert!(estimate > 100.0 && estimate < 101.0);
        assert_eq!(published, 100);
        assert_eq!(cell.read(), 100);
    }

    #[test]
    fn bias_correction_on_first_and_every_hundredth_cycle() {
        let cell = DistanceCell::new();
        let mut acquisition = Acquisition::new(
            sensor(FakeLidar::with_distances(&[10; 201])),
            &cell,
            AcquisitionConfig::default(),
        );
        for _ in 0..201 {
            block_on(acquisition.cycle()).unwrap();
        }

        let commands = commands(acquisition);
        assert_eq!(commands.len(), 201);
        for (cycle, command) in commands.iter().enumerate() {
            let expected = if cycle % 100 == 0 {
                MEASURE_BIAS_CORRECTED
            } else {
                MEASURE
            };
            assert_eq!(*command, expected, "cycle {}", cycle);
        }
    }

    #[test]
    fn zero_interval_means_every_cycle() {
        let cell = DistanceCell::new();
        let config = AcquisitionConfig {
            bias_correction_interval: 0,
            ..AcquisitionConfig::default()
        };
        let mut acquisition = Acquisition::new(sensor(FakeLidar::with_distances(&[1, 2, 3])), &cell, config);
        for _ in 0..3 {
            block_on(acquisition.cycle()).unwrap();
        }
        assert_eq!(commands(acquisition), [MEASURE_BIAS_CORRECTED; 3]);
    }

    #[test]
    fn timeout_keeps_last_good_value() {
        let cell = DistanceCell::new();
        let mut device = FakeLidar::with_distances(&[320]);
        device.stall_when_empty = true;
        let mut acquisition = Acquisition::new(sensor(device), &cell, AcquisitionConfig::default());
        block_on(acquisition.cycle()).unwrap();

        let result = block_on(acquisition.cycle());
        assert!(matches!(
            result,
            Err(LidarError::Bus(BusError::BusyTimeout { .. }))
        ));
        assert_eq!(cell.read(), 320);
        assert_eq!(acquisition.cycles(), 2);
        assert_eq!(acquisition.sensor().stats().busy_timeouts, 1);
    }

    #[test]
    fn nack_keeps_last_good_value() {
        let cell = DistanceCell::new();
        cell.write(42);
        let mut device = FakeLidar::with_distances(&[99]);
        device.nack_register = Some(0x00);
        let bus = RegisterBus::new(device, RecordingDelay::default(), 0x62);
        let mut acquisition = Acquisition::new(LidarLite::from_bus(bus), &cell, AcquisitionConfig::default());

        assert!(block_on(acquisition.cycle()).is_err());
        assert_eq!(cell.read(), 42);
        assert!(acquisition.filter().estimate().is_none());
    }

    #[test]
    fn period_is_clamped() {
        let mut config = AcquisitionConfig::default();
        assert_eq!(config.clamped_period(), Duration::from_millis(10));
        config.period = Duration::from_millis(50);
        assert_eq!(config.clamped_period(), Duration::from_millis(10));
        config.period = Duration::from_micros(10);
        assert_eq!(config.clamped_period(), Duration::from_millis(1));
    }
}

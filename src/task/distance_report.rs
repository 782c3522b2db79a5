//! Diagnostic distance log
//!
//! Polls the shared cell and logs the distance with its zone whenever it
//! moved noticeably since the last line. Zone bounds saved over HTTP arrive
//! through a [`Signal`] and take effect on the next tick.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

use crate::system::config::{ScaleDivisor, ZoneThresholds};
use crate::system::measurement::SharedDistance;

pub const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum change that produces a new log line
pub const REPORT_THRESHOLD: u16 = 2;

/// One line worth of distance information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DistanceReport {
    pub distance: u16,
    pub scaled: u16,
    /// 1-based zone number, `None` outside every zone
    pub zone: Option<usize>,
}

/// Change detector deciding which readings are worth logging
pub struct DistanceReporter {
    last: Option<u16>,
    threshold: u16,
    zones: ZoneThresholds,
    divisor: ScaleDivisor,
}

impl DistanceReporter {
    pub fn new(zones: ZoneThresholds, divisor: ScaleDivisor) -> Self {
        Self {
            last: None,
            threshold: REPORT_THRESHOLD,
            zones,
            divisor,
        }
    }

    pub fn with_threshold(mut self, threshold: u16) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replace the zone bounds. The next reading is reported unconditionally.
    pub fn set_zones(&mut self, zones: ZoneThresholds) {
        self.zones = zones;
        self.last = None;
    }

    /// A report for `distance` if it is the first reading or moved by at
    /// least the threshold since the last report
    pub fn observe(&mut self, distance: u16) -> Option<DistanceReport> {
        if let Some(last) = self.last {
            if last.abs_diff(distance) < self.threshold {
                return None;
            }
        }
        self.last = Some(distance);
        Some(DistanceReport {
            distance,
            scaled: self.divisor.scaled(distance),
            zone: self.zones.zone_for(distance),
        })
    }

    /// Poll `cell` forever, picking up new zone bounds from `zone_updates`
    pub async fn run<M: RawMutex>(
        &mut self,
        cell: &SharedDistance<M>,
        zone_updates: &Signal<M, ZoneThresholds>,
    ) -> ! {
        let mut ticker = Ticker::every(REPORT_INTERVAL);
        loop {
            if let Some(zones) = zone_updates.try_take() {
                info!("zone bounds updated");
                self.set_zones(zones);
            }
            if let Some(report) = self.observe(cell.read()) {
                match report.zone {
                    Some(zone) => info!(
                        "distance {} ({} scaled), zone {}",
                        report.distance,
                        report.scaled,
                        zone
                    ),
                    None => info!(
                        "distance {} ({} scaled), outside zones",
                        report.distance,
                        report.scaled
                    ),
                }
            }
            ticker.next().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::config::Zone;
    use core::num::NonZeroU16;

    fn reporter() -> DistanceReporter {
        DistanceReporter::new(ZoneThresholds::default(), ScaleDivisor::default())
    }

    #[test]
    fn first_reading_is_always_reported() {
        let mut reporter = reporter();
        assert_eq!(
            reporter.observe(0),
            Some(DistanceReport {
                distance: 0,
                scaled: 0,
                zone: None
            })
        );
    }

    #[test]
    fn small_changes_are_suppressed() {
        let mut reporter = reporter();
        reporter.observe(100);
        assert_eq!(reporter.observe(101), None);
        assert_eq!(reporter.observe(99), None);
        assert!(reporter.observe(102).is_some());
        // the reference moved to 102
        assert_eq!(reporter.observe(101), None);
        assert!(reporter.observe(100).is_some());
    }

    #[test]
    fn report_carries_zone_and_scaled_value() {
        let divisor = ScaleDivisor::new(NonZeroU16::new(10).unwrap());
        let mut reporter = DistanceReporter::new(ZoneThresholds::default(), divisor);
        let report = reporter.observe(25).unwrap();
        assert_eq!(report.zone, Some(2));
        assert_eq!(report.scaled, 2);
    }

    #[test]
    fn custom_threshold() {
        let mut reporter = reporter().with_threshold(10);
        reporter.observe(50);
        assert_eq!(reporter.observe(59), None);
        assert!(reporter.observe(60).is_some());
    }

    #[test]
    fn new_zones_apply_to_the_next_reading() {
        let mut reporter = reporter();
        assert_eq!(reporter.observe(25).unwrap().zone, Some(2));
        assert_eq!(reporter.observe(25), None);

        reporter.set_zones(ZoneThresholds {
            zones: [
                Zone { begin: 0, end: 5 },
                Zone { begin: 5, end: 20 },
                Zone { begin: 20, end: 100 },
            ],
        });
        // same distance, reported again with its new zone
        assert_eq!(reporter.observe(25).unwrap().zone, Some(3));
    }
}

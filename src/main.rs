//! Gauge firmware entry point
//!
//! Loads the settings, brings the network up and spawns the measurement,
//! reporting and HTTP tasks.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::block::ImageDef;
use embassy_rp::config::Config;
use embassy_rp::flash::Flash;
use embassy_sync::signal::Signal;
use embassy_time::{Delay, Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use lidar_gauge::api::GaugeApi;
use lidar_gauge::driver::lidar_lite::RESET_SETTLE_MS;
use lidar_gauge::driver::{LidarLite, Preset};
use lidar_gauge::system::config::{ScaleDivisor, Settings, ZoneThresholds};
use lidar_gauge::system::measurement::DistanceCell;
use lidar_gauge::system::storage::FlashStore;
use lidar_gauge::task::{Acquisition, AcquisitionConfig, DistanceReporter};

use board::resources::{self, AssignedResources, FlashResources, LidarResources};
use board::{BoardFlash, SettingsMutex, ZoneSignal, STORAGE_RANGE};

/// Board support
mod board;

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// Latest filtered distance, written by acquisition only
static DISTANCE: DistanceCell = DistanceCell::new();

static SETTINGS: StaticCell<SettingsMutex> = StaticCell::new();

/// Zone bounds from the HTTP handlers to the reporter
static ZONE_UPDATES: ZoneSignal = Signal::new();

/// Wait after power-up before the first register write
const SENSOR_STARTUP: Duration = Duration::from_millis(RESET_SETTLE_MS as u64);

#[embassy_executor::task]
async fn acquisition(r: LidarResources) -> ! {
    let i2c = resources::lidar_i2c(r);
    let mut sensor = LidarLite::new(i2c, Delay);

    Timer::after(SENSOR_STARTUP).await;
    if let Err(e) = sensor.initialize(Preset::default()).await {
        // measurements still run, each failure is logged on its own
        error!("lidar initialization failed: {}", e);
    }

    let mut acquisition = Acquisition::new(sensor, &DISTANCE, AcquisitionConfig::default());
    acquisition.run().await
}

#[embassy_executor::task]
async fn distance_report(zones: ZoneThresholds) -> ! {
    let mut reporter = DistanceReporter::new(zones, ScaleDivisor::default());
    reporter.run(&DISTANCE, &ZONE_UPDATES).await
}

fn settings_store(r: FlashResources) -> FlashStore<BoardFlash> {
    let flash = Flash::new(r.flash, r.dma);
    FlashStore::new(flash, STORAGE_RANGE)
}

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());
    let r = split_resources!(p);

    // measurement does not depend on the network
    unwrap!(spawner.spawn(acquisition(r.lidar)));

    let settings: &'static SettingsMutex = SETTINGS.init(SettingsMutex::new(settings_store(r.flash)));
    let stored = {
        let mut store = settings.lock().await;
        match Settings::load(&mut *store).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("could not load settings, using defaults: {}", e);
                Settings::defaults()
            }
        }
    };

    unwrap!(spawner.spawn(distance_report(stored.zones())));

    let (stack, mode) = board::wifi::start(spawner, r.radio, &stored, settings).await;
    info!("serving the gauge API in {} mode", mode);

    let api = GaugeApi::new(&DISTANCE, settings).with_zone_updates(&ZONE_UPDATES);
    for worker_id in 0..board::web::HTTP_WORKERS {
        unwrap!(spawner.spawn(board::web::http_worker(stack, api, worker_id)));
    }
}

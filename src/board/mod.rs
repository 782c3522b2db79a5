//! Board support for the Raspberry Pi Pico 2 W

pub mod resources;
pub mod web;
pub mod wifi;

use embassy_rp::flash::{Async, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;

use lidar_gauge::api::GaugeApi;
use lidar_gauge::system::config::ZoneThresholds;
use lidar_gauge::system::storage::FlashStore;

/// On-board flash of the Pico 2 W
pub const FLASH_SIZE: usize = 4 * 1024 * 1024;

/// Sectors reserved for settings at the very end of flash
const STORAGE_SECTORS: usize = 2;

/// Flash range handed to the settings store, must stay clear of the image
pub const STORAGE_RANGE: core::ops::Range<u32> =
    (FLASH_SIZE - STORAGE_SECTORS * ERASE_SIZE) as u32..FLASH_SIZE as u32;

pub type BoardFlash = Flash<'static, FLASH, Async, FLASH_SIZE>;

pub type SettingsMutex = Mutex<CriticalSectionRawMutex, FlashStore<BoardFlash>>;

pub type BoardApi = GaugeApi<'static, CriticalSectionRawMutex, FlashStore<BoardFlash>>;

pub type ZoneSignal = Signal<CriticalSectionRawMutex, ZoneThresholds>;

//! Wi-Fi bring-up
//!
//! Joins the configured network as a station. When no SSID is stored, or
//! joining keeps failing, the stored credentials are cleared and an open
//! access point is started instead so the gauge can be reconfigured.
//!
//! The CYW43439 firmware and CLM blobs are not linked into the image. Flash
//! them once next to it:
//!
//! ```text
//! probe-rs download 43439A0.bin --binary-format bin --chip RP235x --base-address 0x10100000
//! probe-rs download 43439A0_clm.bin --binary-format bin --chip RP235x --base-address 0x10140000
//! ```

use cyw43::{JoinOptions, PowerManagementMode};
use cyw43_pio::{PioSpi, DEFAULT_CLOCK_DIVIDER};
use defmt::*;
use embassy_executor::Spawner;
use embassy_net::{
    Config as NetConfig, Ipv4Address, Ipv4Cidr, Stack, StackResources, StaticConfigV4,
};
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{DMA_CH0, PIO0};
use embassy_rp::pio::Pio;
use embassy_time::{Duration, Timer};
use rand_core::RngCore;
use static_cell::StaticCell;

use lidar_gauge::system::config::{SettingKey, Settings};
use lidar_gauge::system::storage::SettingsStore;

use super::resources::{Irqs, RadioResources};
use super::SettingsMutex;

/// SSID of the fallback configuration network
pub const AP_SSID: &str = "LidarGauge-Config";
const AP_CHANNEL: u8 = 5;
const AP_ADDRESS: Ipv4Address = Ipv4Address::new(192, 168, 4, 1);
const AP_PREFIX_LEN: u8 = 24;

const JOIN_ATTEMPTS: u32 = 10;
const JOIN_RETRY_DELAY: Duration = Duration::from_secs(1);

const FIRMWARE_ADDRESS: usize = 0x1010_0000;
const FIRMWARE_LEN: usize = 231_077;
const CLM_ADDRESS: usize = 0x1014_0000;
const CLM_LEN: usize = 984;

/// Sockets: the HTTP workers plus DHCP and one spare
const SOCKET_COUNT: usize = 5;

static CYW43_STATE: StaticCell<cyw43::State> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<SOCKET_COUNT>> = StaticCell::new();

/// How the gauge ended up on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum NetworkMode {
    Station,
    AccessPoint,
}

#[embassy_executor::task]
async fn cyw43_task(
    runner: cyw43::Runner<'static, Output<'static>, PioSpi<'static, PIO0, 0, DMA_CH0>>,
) -> ! {
    runner.run().await
}

#[embassy_executor::task]
async fn net_task(mut runner: embassy_net::Runner<'static, cyw43::NetDriver<'static>>) -> ! {
    runner.run().await
}

/// Power up the radio, join or open a network and start the IP stack
pub async fn start(
    spawner: Spawner,
    r: RadioResources,
    stored: &Settings,
    settings: &'static SettingsMutex,
) -> (Stack<'static>, NetworkMode) {
    // SAFETY: both blobs are flashed at these addresses, see the module docs
    let firmware = unsafe { core::slice::from_raw_parts(FIRMWARE_ADDRESS as *const u8, FIRMWARE_LEN) };
    let clm = unsafe { core::slice::from_raw_parts(CLM_ADDRESS as *const u8, CLM_LEN) };

    let pwr = Output::new(r.pwr, Level::Low);
    let cs = Output::new(r.cs, Level::High);
    let mut pio = Pio::new(r.pio, Irqs);
    let spi = PioSpi::new(
        &mut pio.common,
        pio.sm0,
        DEFAULT_CLOCK_DIVIDER,
        pio.irq0,
        cs,
        r.dio,
        r.clk,
        r.dma,
    );

    let state = CYW43_STATE.init(cyw43::State::new());
    let (device, mut control, runner) = cyw43::new(state, pwr, spi, firmware).await;
    unwrap!(spawner.spawn(cyw43_task(runner)));

    control.init(clm).await;
    control
        .set_power_management(PowerManagementMode::PowerSave)
        .await;

    let mut mode = NetworkMode::AccessPoint;
    if let Some((ssid, password)) = stored.wifi_credentials() {
        if join(&mut control, ssid, password).await {
            mode = NetworkMode::Station;
        } else {
            warn!("could not join {}, clearing credentials", ssid);
            clear_credentials(settings).await;
        }
    } else {
        info!("no Wi-Fi credentials stored");
    }

    let config = match mode {
        NetworkMode::Station => NetConfig::dhcpv4(Default::default()),
        NetworkMode::AccessPoint => {
            info!("starting access point {}", AP_SSID);
            control.start_ap_open(AP_SSID, AP_CHANNEL).await;
            NetConfig::ipv4_static(StaticConfigV4 {
                address: Ipv4Cidr::new(AP_ADDRESS, AP_PREFIX_LEN),
                gateway: None,
                dns_servers: heapless::Vec::new(),
            })
        }
    };

    let seed = RoscRng.next_u64();
    let resources = NET_RESOURCES.init(StackResources::new());
    let (stack, runner) = embassy_net::new(device, config, resources, seed);
    unwrap!(spawner.spawn(net_task(runner)));

    stack.wait_config_up().await;
    if let Some(config) = stack.config_v4() {
        info!("network up ({}), address {}", mode, config.address);
    }

    (stack, mode)
}

/// Try to join `ssid`, returns whether it worked
async fn join(control: &mut cyw43::Control<'static>, ssid: &str, password: &str) -> bool {
    for attempt in 1..=JOIN_ATTEMPTS {
        let options = if password.is_empty() {
            JoinOptions::new_open()
        } else {
            JoinOptions::new(password.as_bytes())
        };
        match control.join(ssid, options).await {
            Ok(()) => {
                info!("joined {} on attempt {}", ssid, attempt);
                return true;
            }
            Err(e) => {
                warn!("join attempt {} failed with status {}", attempt, e.status);
                Timer::after(JOIN_RETRY_DELAY).await;
            }
        }
    }
    false
}

async fn clear_credentials(settings: &'static SettingsMutex) {
    let mut store = settings.lock().await;
    for key in [SettingKey::Ssid, SettingKey::Password] {
        if let Err(e) = store.put_string(key, "").await {
            error!("could not clear {}: {}", key.name(), e);
        }
    }
}

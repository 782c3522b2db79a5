//! Pin and peripheral assignment for the Pico 2 W
//!
//! # Resource Groups
//! - LIDAR: I2C0 on GPIO4 (SDA) / GPIO5 (SCL)
//! - Radio: the CYW43439 behind PIO0 and one DMA channel
//! - Flash: settings storage at the end of the on-board flash

use assign_resources::assign_resources;
use embassy_rp::bind_interrupts;
use embassy_rp::i2c::{self, Async as I2cAsync, I2c, InterruptHandler as I2cInterruptHandler};
use embassy_rp::peripherals::{self, I2C0, PIO0};
use embassy_rp::pio::InterruptHandler as PioInterruptHandler;

use lidar_gauge::driver::BusSpeed;

/// Selects the 400 kHz bus clock
pub const HIGH_SPEED_I2C: bool = true;

assign_resources! {
    /// LIDAR-Lite v3HP on I2C0
    lidar: LidarResources {
        i2c: I2C0,
        sda: PIN_4,
        scl: PIN_5,
    },
    /// CYW43439 Wi-Fi chip
    radio: RadioResources {
        pwr: PIN_23,
        dio: PIN_24,
        cs: PIN_25,
        clk: PIN_29,
        pio: PIO0,
        dma: DMA_CH0,
    },
    /// On-board flash holding the settings
    flash: FlashResources {
        flash: FLASH,
        dma: DMA_CH1,
    },
}

bind_interrupts!(pub struct Irqs {
    I2C0_IRQ => I2cInterruptHandler<I2C0>;
    PIO0_IRQ_0 => PioInterruptHandler<PIO0>;
});

/// Build the async I2C bus for the sensor
pub fn lidar_i2c(r: LidarResources) -> I2c<'static, I2C0, I2cAsync> {
    let mut config = i2c::Config::default();
    config.frequency = BusSpeed::from_high_speed(HIGH_SPEED_I2C).frequency_hz();
    I2c::new_async(r.i2c, r.scl, r.sda, Irqs, config)
}

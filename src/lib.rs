//! LIDAR-Lite v3HP distance gauge
//!
//! Core of the gauge firmware, kept free of any board specifics so it runs
//! on the host under `cargo test`:
//!
//! - [`driver`]: register transport and the LIDAR-Lite protocol
//! - [`system`]: Kalman smoothing, the shared distance cell and persisted settings
//! - [`task`]: the acquisition loop and the diagnostic reporter
//! - [`api`]: HTTP request handlers over the shared cell and the settings store
//!
//! The RP2350 binary in `main.rs` wires these to real peripherals.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

mod fmt; // must be first module!

pub mod api;
pub mod driver;
pub mod system;
pub mod task;

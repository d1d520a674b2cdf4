//! Modbus TCP simulator of field devices, built on [tokio-modbus](https://github.com/slowtec/tokio-modbus).

//! ## Devices
//!
//! Each device answers to its own unit id and evolves once per second:
//!
//! - [`devices::ClimateControl`] - an HVAC fan cooling a room, with outside conditions
//!   optionally refreshed from OpenWeatherMap,
//! - [`devices::PulseCounter`] - three independently enabled pulse counters,
//! - [`devices::WaterTank`] - a tank drained by a valve and filled by a pump, with an
//!   automatic mode and a high level alarm.
//!
//! ## Traits
//!
//! - [`core::Device`] is the request handling and simulation step contract of a device,
//! - [`codec::InputRegisterModel`] maps a struct onto read only input registers.
//!
//! ## Derive macro
//!
//! `InputRegisterModel` can be derived. The derive macro depends on the `modbus` field attribute.
//!
//! The `modbus` attribute **can** be added to struct fields to link them with input register entries.
//! Then, the field `modbus` **must** contain the following key-values pairs:
//! - `addr` - input register start address, `u16` integer,
//! - `ty` - modbus data type, one of `"i16"`, `"i32"`, `"i64"`, `"u16"`, `"u32"`, `"u64"`, `"f32"` or `"f64"`,
//!
//! and **can** contain:
//! - `ord` - word order, either `"be"` for big-endian (default) or `"le"` for little-endian,
//! - `unit` - measurement unit of the value.
//!
//! The `modbus_doc` attribute is to create documentation (by adding doc attribute) from `modbus` field attributes information.

extern crate self as fieldsim;

/// Utilities for encoding from and decoding to Modbus registers
pub mod codec;
pub mod config;
/// Core request types and the device trait
pub mod core;
pub mod devices;
mod error;
/// Unit routing and the Modbus TCP server
pub mod simulator;
pub mod ticker;
pub mod weather;

pub use error::{Error, Result};

pub mod derive {
    /// Re-export.
    pub use fieldsim_derive::{modbus_doc, InputRegisterModel};
}

//! DSMR P1 to D-Bus bridge library
//!
//! Maps smart-meter readings published on MQTT onto a grid meter service
//! exported on D-Bus, so other processes can read grid power, per-phase
//! current/voltage/power and cumulative energy.

pub mod bridge;
pub mod config;
pub mod dbus;
pub mod error;
pub mod mapping;
pub mod registry;
pub mod service;

// Re-export commonly used types for easier access
pub use bridge::IngressBridge;
pub use config::Config;
pub use dbus::{BusKind, DeviceBusExporter};
pub use error::{BridgeError, Result};
pub use registry::{DeviceValue, ExposedValueRegistry, PathChange};
pub use service::ServiceIdentity;

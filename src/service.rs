use crate::error::Result;
use crate::registry::{DeviceValue, ExposedValueRegistry, TextFormatter};
use tracing::debug;

pub const DEFAULT_SERVICE_NAME: &str = "com.victronenergy.grid.dsmr";
pub const DEFAULT_PRODUCT_NAME: &str = "P1 Bridge";

/// Device type code reported on `/DeviceType`.
pub const DEVICE_TYPE: i32 = 71;

/// Identity of the grid meter service exported on the device bus.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceIdentity {
    pub service_name: String,
    pub device_instance: i32,
    pub product_name: String,
    /// Human readable description of where readings come from
    pub connection: String,
    pub process_name: String,
}

impl ServiceIdentity {
    pub fn new(service_name: impl Into<String>, device_instance: i32) -> Self {
        Self {
            service_name: service_name.into(),
            device_instance,
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            connection: "P1 service".to_string(),
            process_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = connection.into();
        self
    }
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME, 0)
    }
}

fn with_unit(value: &DeviceValue, unit: &str) -> String {
    match value {
        DeviceValue::Invalid => value.to_string(),
        value => format!("{value}{unit}"),
    }
}

fn kilowatt_hours(value: &DeviceValue) -> String {
    with_unit(value, "kWh")
}

fn watts(value: &DeviceValue) -> String {
    with_unit(value, "W")
}

fn amps(value: &DeviceValue) -> String {
    with_unit(value, "A")
}

fn volts(value: &DeviceValue) -> String {
    with_unit(value, "V")
}

/// Measurement paths and their display units.
pub const MEASUREMENT_PATHS: &[(&str, TextFormatter)] = &[
    ("/Ac/Energy/Forward", kilowatt_hours),
    ("/Ac/Energy/Reverse", kilowatt_hours),
    ("/Ac/Power", watts),
    ("/Ac/L1/Current", amps),
    ("/Ac/L1/Power", watts),
    ("/Ac/L1/Voltage", volts),
    ("/Ac/L2/Current", amps),
    ("/Ac/L2/Power", watts),
    ("/Ac/L2/Voltage", volts),
    ("/Ac/L3/Current", amps),
    ("/Ac/L3/Power", watts),
    ("/Ac/L3/Voltage", volts),
];

/// Registers the management, mandatory and measurement paths of the meter.
pub fn register_paths(registry: &ExposedValueRegistry, identity: &ServiceIdentity) -> Result<()> {
    debug!(
        "{} /DeviceInstance = {}",
        identity.service_name, identity.device_instance
    );

    registry.register("/Mgmt/ProcessName", identity.process_name.as_str(), None)?;
    registry.register("/Mgmt/ProcessVersion", env!("CARGO_PKG_VERSION"), None)?;
    registry.register("/Mgmt/Connection", identity.connection.as_str(), None)?;

    registry.register("/DeviceInstance", identity.device_instance, None)?;
    registry.register("/ProductId", 0, None)?;
    registry.register("/ProductName", identity.product_name.as_str(), None)?;
    registry.register("/FirmwareVersion", 0, None)?;
    registry.register("/HardwareVersion", 0, None)?;
    registry.register("/Connected", 1, None)?;
    registry.register("/DeviceType", DEVICE_TYPE, None)?;

    for (path, formatter) in MEASUREMENT_PATHS {
        registry.register(path, DeviceValue::Invalid, Some(*formatter))?;
    }
    Ok(())
}

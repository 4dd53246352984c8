use crate::error::{BridgeError, Result};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// A value held by one exported path.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeviceValue {
    /// No reading yet; exported as an empty array on the device bus
    #[default]
    Invalid,
    Int(i32),
    Double(f64),
    Text(String),
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceValue::Invalid => f.write_str("---"),
            DeviceValue::Int(value) => write!(f, "{value}"),
            DeviceValue::Double(value) => write!(f, "{value}"),
            DeviceValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<f64> for DeviceValue {
    fn from(value: f64) -> Self {
        DeviceValue::Double(value)
    }
}

impl From<i32> for DeviceValue {
    fn from(value: i32) -> Self {
        DeviceValue::Int(value)
    }
}

impl From<&str> for DeviceValue {
    fn from(value: &str) -> Self {
        DeviceValue::Text(value.to_string())
    }
}

impl From<String> for DeviceValue {
    fn from(value: String) -> Self {
        DeviceValue::Text(value)
    }
}

/// Renders a value as human readable text, usually with a unit suffix.
pub type TextFormatter = fn(&DeviceValue) -> String;

/// An applied change, handed to whoever exports the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct PathChange {
    pub path: String,
    pub value: DeviceValue,
    pub text: String,
}

#[derive(Debug)]
struct ExposedValue {
    value: DeviceValue,
    formatter: Option<TextFormatter>,
}

impl ExposedValue {
    fn text(&self) -> String {
        match self.formatter {
            Some(formatter) => formatter(&self.value),
            None => self.value.to_string(),
        }
    }
}

/// The set of named values exported on the device bus.
///
/// Clones share the same values and the same change stream, so the bridge
/// and the device bus exporter can each hold one.
#[derive(Clone)]
pub struct ExposedValueRegistry {
    values: Arc<Mutex<HashMap<String, ExposedValue>>>,
    changes: UnboundedSender<PathChange>,
}

impl ExposedValueRegistry {
    /// Creates an empty registry together with the stream of applied changes.
    pub fn new() -> (Self, UnboundedReceiver<PathChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                values: Arc::new(Mutex::new(HashMap::new())),
                changes: tx,
            },
            rx,
        )
    }

    /// Declares a path. Registering the same path twice is a configuration error.
    pub fn register(
        &self,
        path: &str,
        initial_value: impl Into<DeviceValue>,
        formatter: Option<TextFormatter>,
    ) -> Result<()> {
        let mut values = self.lock();
        if values.contains_key(path) {
            return Err(BridgeError::Configuration(format!(
                "path {path} registered twice"
            )));
        }
        let initial_value = initial_value.into();
        debug!("Registered {path} = {initial_value}");
        values.insert(
            path.to_string(),
            ExposedValue {
                value: initial_value,
                formatter,
            },
        );
        Ok(())
    }

    /// Stores `value` and publishes it if it differs from the current value.
    ///
    /// Returns whether a change was published.
    pub fn update(&self, path: &str, value: impl Into<DeviceValue>) -> Result<bool> {
        self.apply(path, value.into())
    }

    /// Accepts a write coming from a device bus consumer.
    pub fn external_write(&self, path: &str, value: DeviceValue) -> Result<bool> {
        debug!("someone else updated {path} to {value}");
        self.apply(path, value)
    }

    pub fn value(&self, path: &str) -> Option<DeviceValue> {
        self.lock().get(path).map(|entry| entry.value.clone())
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.lock().get(path).map(ExposedValue::text)
    }

    /// All registered paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Current value and text of every path, ordered by path.
    pub fn snapshot(&self) -> BTreeMap<String, (DeviceValue, String)> {
        self.lock()
            .iter()
            .map(|(path, entry)| (path.clone(), (entry.value.clone(), entry.text())))
            .collect()
    }

    fn apply(&self, path: &str, value: DeviceValue) -> Result<bool> {
        let change = {
            let mut values = self.lock();
            let entry = values
                .get_mut(path)
                .ok_or_else(|| BridgeError::UnknownPath(path.to_string()))?;
            if entry.value == value {
                return Ok(false);
            }
            entry.value = value;
            PathChange {
                path: path.to_string(),
                value: entry.value.clone(),
                text: entry.text(),
            }
        };
        if self.changes.send(change).is_err() {
            debug!("No observer for change of {path}");
        }
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ExposedValue>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watts(value: &DeviceValue) -> String {
        format!("{value}W")
    }

    #[test]
    fn test_register_twice_is_configuration_error() {
        let (registry, _changes) = ExposedValueRegistry::new();
        registry
            .register("/Ac/Power", DeviceValue::Invalid, Some(watts))
            .unwrap();

        let result = registry.register("/Ac/Power", 0.0, None);
        assert!(matches!(result, Err(BridgeError::Configuration(_))));
    }

    #[test]
    fn test_register_does_not_publish() {
        let (registry, mut changes) = ExposedValueRegistry::new();
        registry.register("/ProductId", 0, None).unwrap();

        assert!(changes.try_recv().is_err());
        assert_eq!(registry.value("/ProductId"), Some(DeviceValue::Int(0)));
    }

    #[test]
    fn test_update_unknown_path() {
        let (registry, _changes) = ExposedValueRegistry::new();

        let result = registry.update("/Ac/Power", 1500.0);
        assert!(matches!(result, Err(BridgeError::UnknownPath(path)) if path == "/Ac/Power"));
    }

    #[test]
    fn test_update_with_stored_value_is_suppressed() {
        let (registry, mut changes) = ExposedValueRegistry::new();
        registry.register("/Ac/Power", 1500.0, Some(watts)).unwrap();

        assert!(!registry.update("/Ac/Power", 1500.0).unwrap());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_identical_updates_publish_once() {
        let (registry, mut changes) = ExposedValueRegistry::new();
        registry
            .register("/Ac/Power", DeviceValue::Invalid, Some(watts))
            .unwrap();

        assert!(registry.update("/Ac/Power", 230.0).unwrap());
        assert!(!registry.update("/Ac/Power", 230.0).unwrap());

        let change = changes.try_recv().unwrap();
        assert_eq!(change.path, "/Ac/Power");
        assert_eq!(change.value, DeviceValue::Double(230.0));
        assert_eq!(change.text, "230W");
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_different_updates_publish_each_time() {
        let (registry, mut changes) = ExposedValueRegistry::new();
        registry
            .register("/Ac/L1/Voltage", DeviceValue::Invalid, None)
            .unwrap();

        registry.update("/Ac/L1/Voltage", 230.1).unwrap();
        registry.update("/Ac/L1/Voltage", 229.8).unwrap();

        assert_eq!(changes.try_recv().unwrap().value, DeviceValue::Double(230.1));
        assert_eq!(changes.try_recv().unwrap().value, DeviceValue::Double(229.8));
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_external_write_is_accepted() {
        let (registry, mut changes) = ExposedValueRegistry::new();
        registry
            .register("/Ac/Power", DeviceValue::Invalid, Some(watts))
            .unwrap();

        assert!(registry
            .external_write("/Ac/Power", DeviceValue::Double(42.0))
            .unwrap());
        assert_eq!(registry.value("/Ac/Power"), Some(DeviceValue::Double(42.0)));
        assert_eq!(changes.try_recv().unwrap().text, "42W");

        // The bridge keeps working on top of an external write
        assert!(registry.update("/Ac/Power", 100.0).unwrap());
    }

    #[test]
    fn test_update_without_observer_still_stores() {
        let (registry, changes) = ExposedValueRegistry::new();
        registry
            .register("/Ac/Power", DeviceValue::Invalid, None)
            .unwrap();
        drop(changes);

        assert!(registry.update("/Ac/Power", 12.5).unwrap());
        assert_eq!(registry.value("/Ac/Power"), Some(DeviceValue::Double(12.5)));
    }

    #[test]
    fn test_text_and_snapshot() {
        let (registry, _changes) = ExposedValueRegistry::new();
        registry
            .register("/ProductName", "P1 Bridge", None)
            .unwrap();
        registry
            .register("/Ac/Power", DeviceValue::Invalid, Some(watts))
            .unwrap();

        assert_eq!(registry.text("/ProductName").as_deref(), Some("P1 Bridge"));
        assert_eq!(registry.text("/Missing"), None);
        assert_eq!(registry.paths(), vec!["/Ac/Power", "/ProductName"]);

        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot.get("/Ac/Power"),
            Some(&(DeviceValue::Invalid, "---W".to_string()))
        );
    }
}

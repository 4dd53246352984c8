//! Exports the registry on D-Bus using the `com.victronenergy.BusItem`
//! conventions: one object per path plus a root object listing all items.

use crate::error::Result;
use crate::registry::{DeviceValue, ExposedValueRegistry, PathChange};
use crate::service::ServiceIdentity;
use std::{collections::HashMap, env};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use zbus::{
    connection, interface,
    object_server::SignalContext,
    zvariant::{OwnedValue, Value},
    Connection,
};

/// `SetValue` result for an accepted write.
pub const SET_VALUE_OK: i32 = 0;
/// `SetValue` result for a value that cannot be stored.
pub const SET_VALUE_REJECTED: i32 = 1;

/// Which bus the service is exported on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    System,
    Session,
}

impl BusKind {
    /// Session bus when asked for, or when a session bus address is set.
    pub fn select(force_session: bool) -> Self {
        if force_session || env::var_os("DBUS_SESSION_BUS_ADDRESS").is_some() {
            BusKind::Session
        } else {
            BusKind::System
        }
    }
}

/// Converts a stored value to its D-Bus representation. Invalid values are
/// sent as an empty integer array.
pub fn to_variant(value: &DeviceValue) -> Value<'static> {
    match value {
        DeviceValue::Invalid => Value::from(Vec::<i32>::new()),
        DeviceValue::Int(value) => Value::from(*value),
        DeviceValue::Double(value) => Value::from(*value),
        DeviceValue::Text(value) => Value::from(value.clone()),
    }
}

/// Converts a value written by a bus client. Returns `None` for types the
/// registry cannot hold.
pub fn from_variant(value: &Value<'_>) -> Option<DeviceValue> {
    match value {
        Value::F64(value) => Some(DeviceValue::Double(*value)),
        Value::I32(value) => Some(DeviceValue::Int(*value)),
        Value::I16(value) => Some(DeviceValue::Int(i32::from(*value))),
        Value::U16(value) => Some(DeviceValue::Int(i32::from(*value))),
        Value::U8(value) => Some(DeviceValue::Int(i32::from(*value))),
        Value::Bool(value) => Some(DeviceValue::Int(i32::from(*value))),
        Value::U32(value) => i32::try_from(*value).ok().map(DeviceValue::Int),
        Value::I64(value) => i32::try_from(*value).ok().map(DeviceValue::Int),
        Value::U64(value) => i32::try_from(*value).ok().map(DeviceValue::Int),
        Value::Str(value) => Some(DeviceValue::Text(value.as_str().to_string())),
        Value::Array(array) if array.is_empty() => Some(DeviceValue::Invalid),
        Value::Value(inner) => from_variant(inner),
        _ => None,
    }
}

/// A single exported path.
struct BusItem {
    path: String,
    registry: ExposedValueRegistry,
}

#[interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    fn get_value(&self) -> Value<'static> {
        to_variant(&self.registry.value(&self.path).unwrap_or_default())
    }

    fn get_text(&self) -> String {
        self.registry.text(&self.path).unwrap_or_default()
    }

    fn set_value(&self, value: OwnedValue) -> i32 {
        let Some(value) = from_variant(&value) else {
            warn!("Rejected write of unsupported value to {}", self.path);
            return SET_VALUE_REJECTED;
        };
        match self.registry.external_write(&self.path, value) {
            Ok(_) => SET_VALUE_OK,
            Err(e) => {
                warn!("Rejected write to {}: {e}", self.path);
                SET_VALUE_REJECTED
            }
        }
    }

    #[zbus(signal)]
    async fn properties_changed(
        ctxt: &SignalContext<'_>,
        changes: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<()>;
}

/// The `/` object, answering for the whole tree at once.
struct RootItem {
    registry: ExposedValueRegistry,
}

#[interface(name = "com.victronenergy.BusItem")]
impl RootItem {
    fn get_items(&self) -> HashMap<String, HashMap<String, Value<'static>>> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(path, (value, text))| {
                let mut item = HashMap::new();
                item.insert("Value".to_string(), to_variant(&value));
                item.insert("Text".to_string(), Value::from(text));
                (path, item)
            })
            .collect()
    }

    /// Values keyed by path without the leading slash.
    fn get_value(&self) -> HashMap<String, Value<'static>> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(path, (value, _))| (relative(&path), to_variant(&value)))
            .collect()
    }

    fn get_text(&self) -> HashMap<String, String> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|(path, (_, text))| (relative(&path), text))
            .collect()
    }
}

fn relative(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// Keeps the device bus connection alive and relays registry changes to it.
pub struct DeviceBusExporter {
    connection: Connection,
}

impl DeviceBusExporter {
    /// Connects to `bus`, exports every registered path and claims the
    /// service name.
    pub async fn start(
        identity: &ServiceIdentity,
        registry: ExposedValueRegistry,
        changes: UnboundedReceiver<PathChange>,
        bus: BusKind,
    ) -> Result<Self> {
        let builder = match bus {
            BusKind::System => connection::Builder::system()?,
            BusKind::Session => connection::Builder::session()?,
        };
        let connection = builder.build().await?;
        info!("Connected to the {bus:?} bus");

        let exporter = Self::serve(connection, registry, changes).await?;
        exporter
            .connection
            .request_name(identity.service_name.as_str())
            .await?;
        info!(
            "Registered {} with device instance {}",
            identity.service_name, identity.device_instance
        );
        Ok(exporter)
    }

    /// Serves the registry on an established connection and starts
    /// forwarding `changes` as `PropertiesChanged` signals.
    pub async fn serve(
        connection: Connection,
        registry: ExposedValueRegistry,
        changes: UnboundedReceiver<PathChange>,
    ) -> Result<Self> {
        {
            let object_server = connection.object_server();
            object_server
                .at(
                    "/",
                    RootItem {
                        registry: registry.clone(),
                    },
                )
                .await?;
            for path in registry.paths() {
                object_server
                    .at(
                        path.as_str(),
                        BusItem {
                            path: path.clone(),
                            registry: registry.clone(),
                        },
                    )
                    .await?;
            }
        }

        let signal_connection = connection.clone();
        tokio::spawn(async move {
            Self::forward_changes(signal_connection, changes).await;
        });

        Ok(Self { connection })
    }

    async fn forward_changes(connection: Connection, mut changes: UnboundedReceiver<PathChange>) {
        debug!("Starting device bus change forwarder");
        while let Some(change) = changes.recv().await {
            if let Err(e) = Self::emit_change(&connection, &change).await {
                warn!("Failed to signal change of {}: {e}", change.path);
            }
        }
        debug!("Device bus change forwarder exiting");
    }

    async fn emit_change(connection: &Connection, change: &PathChange) -> zbus::Result<()> {
        let ctxt = SignalContext::new(connection, change.path.as_str())?;
        let mut properties = HashMap::new();
        properties.insert("Value", to_variant(&change.value));
        properties.insert("Text", Value::from(change.text.as_str()));
        BusItem::properties_changed(&ctxt, properties).await
    }
}

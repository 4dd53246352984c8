use thiserror::Error;

/// Errors raised by the bridge and the exported device service.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The fixed path layout is inconsistent, e.g. a path registered twice.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An update targeted a path that was never registered.
    #[error("Unknown path: {0}")]
    UnknownPath(String),

    #[error("Payload on {topic} is not a number: {payload:?}")]
    PayloadParse { topic: String, payload: String },

    #[error("MQTT subscribe failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    #[error("MQTT connection lost: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("D-Bus error: {0}")]
    DeviceBus(#[from] zbus::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

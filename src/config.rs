use crate::bridge::DEFAULT_TOPIC_ROOT;
use crate::service::{ServiceIdentity, DEFAULT_SERVICE_NAME};
use clap::Parser;
use rumqttc::MqttOptions;
use std::time::Duration;

/// Publishes DSMR P1 readings from MQTT as a grid meter on D-Bus.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    /// MQTT host
    pub host: String,

    /// MQTT port
    #[arg(long, env = "P1_MQTT_PORT", default_value_t = 1883)]
    pub port: u16,

    /// Topic root the DSMR readings are published under
    #[arg(long, env = "P1_TOPIC_ROOT", default_value = DEFAULT_TOPIC_ROOT)]
    pub topic_root: String,

    /// MQTT client id, defaults to one derived from the process id
    #[arg(long, env = "P1_CLIENT_ID")]
    pub client_id: Option<String>,

    /// MQTT keep alive in seconds
    #[arg(long, default_value_t = 60)]
    pub keep_alive: u64,

    /// Well-known D-Bus service name
    #[arg(long, default_value = DEFAULT_SERVICE_NAME)]
    pub service_name: String,

    #[arg(long, default_value_t = 0)]
    pub device_instance: i32,

    /// Export on the session bus instead of the system bus
    #[arg(long)]
    pub session_bus: bool,

    /// Log every converted reading
    #[arg(long)]
    pub debug: bool,
}

impl Config {
    pub fn mqtt_options(&self) -> MqttOptions {
        let client_id = self
            .client_id
            .clone()
            .unwrap_or_else(|| format!("dbus-p1-bridge-{}", std::process::id()));
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive));
        options
    }

    pub fn identity(&self) -> ServiceIdentity {
        ServiceIdentity::new(self.service_name.clone(), self.device_instance)
            .with_connection(format!("MQTT {}:{}", self.host, self.port))
    }

    /// Default filter directive when `RUST_LOG` is not set.
    pub fn log_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_required() {
        assert!(Config::try_parse_from(["dbus_p1_bridge"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["dbus_p1_bridge", "venus.local"]).unwrap();
        assert_eq!(config.host, "venus.local");
        assert_eq!(config.service_name, "com.victronenergy.grid.dsmr");
        assert_eq!(config.device_instance, 0);
        assert!(!config.session_bus);
        assert_eq!(config.log_directive(), "info");

        let identity = config.identity();
        assert_eq!(identity.service_name, "com.victronenergy.grid.dsmr");
        assert_eq!(identity.connection, format!("MQTT venus.local:{}", config.port));
    }

    #[test]
    fn test_overrides() {
        let config = Config::try_parse_from([
            "dbus_p1_bridge",
            "broker",
            "--port",
            "1884",
            "--topic-root",
            "meter",
            "--client-id",
            "p1",
            "--device-instance",
            "3",
            "--session-bus",
            "--debug",
        ])
        .unwrap();
        assert_eq!(config.port, 1884);
        assert_eq!(config.topic_root, "meter");
        assert_eq!(config.device_instance, 3);
        assert!(config.session_bus);
        assert_eq!(config.log_directive(), "debug");

        let options = config.mqtt_options();
        assert_eq!(options.client_id(), "p1");
        assert_eq!(options.broker_address(), ("broker".to_string(), 1884));
    }
}

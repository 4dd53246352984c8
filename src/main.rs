use anyhow::Context;
use clap::Parser;
use dbus_p1_bridge::{
    service, BusKind, Config, DeviceBusExporter, ExposedValueRegistry, IngressBridge,
};
use rumqttc::AsyncClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_directive())),
        )
        .init();

    info!("Starting DSMR P1 bridge for MQTT host {}", config.host);

    let identity = config.identity();
    let (registry, changes) = ExposedValueRegistry::new();
    service::register_paths(&registry, &identity).context("Registering device paths")?;

    let _exporter = DeviceBusExporter::start(
        &identity,
        registry.clone(),
        changes,
        BusKind::select(config.session_bus),
    )
    .await
    .context("Exporting the meter service on D-Bus")?;

    // MQTT connection
    let (client, eventloop) = AsyncClient::new(config.mqtt_options(), 10);
    let bridge = IngressBridge::new(registry, config.topic_root.clone());

    info!("Connected to dbus, switching over to the MQTT event loop");
    bridge
        .run(eventloop, client)
        .await
        .context("MQTT bridge stopped")?;

    Ok(())
}

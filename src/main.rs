use std::sync::Arc;

use homeautomation_mqtt::bridge::{EventMqttPublisher, EventTranslator};
use homeautomation_mqtt::events::EventBus;
use homeautomation_mqtt::mqtt::MqttSession;
use homeautomation_mqtt::repository::StaticPropertyRepository;
use homeautomation_mqtt::shutdown::{ShutdownHandler, perform_graceful_shutdown};
use homeautomation_mqtt::utils::{Config, VersionInfo, init_tracing};
use tracing::{debug, info, warn};

const EVENT_BUS_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    init_tracing(&config.log_level)?;
    info!("Starting {}", VersionInfo::current().banner());
    debug!(
        "Broker {}:{}, event topic '{}'",
        config.server.host, config.server.port, config.event_topic
    );

    let bus = EventBus::new(EVENT_BUS_CAPACITY);
    let repository = Arc::new(StaticPropertyRepository::from_config(&config.properties));
    if repository.is_empty() {
        warn!("No [[property]] entries configured, device property events will be skipped");
    } else {
        info!("Loaded metadata for {} device properties", repository.len());
    }

    let session = MqttSession::new(config.server.clone(), Arc::new(bus.clone()));

    let publisher = EventMqttPublisher::new(
        EventTranslator::new(repository),
        session.clone(),
        config.event_topic.clone(),
    )
    .with_ignored(config.ignored_event_kinds()?);
    let bridge_handle = tokio::spawn(publisher.run(bus.subscribe()));

    for filter in &config.subscriptions {
        session.subscribe(filter, |topic, payload| {
            let payload = payload.map(String::from_utf8_lossy).unwrap_or_default();
            info!("Message on topic '{}': {}", topic, payload);
            Ok(())
        });
    }

    session.connect();

    let mut shutdown_handler = ShutdownHandler::new()?;
    let signal = shutdown_handler.wait_for_shutdown_signal().await;
    info!("{}", signal.description());

    perform_graceful_shutdown(&session, bridge_handle).await;
    Ok(())
}

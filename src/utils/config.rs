use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::bridge::TranslateError;
use crate::events::EventKind;

const CONFIG_PATH_ENV: &str = "HOMEAUTOMATION_MQTT_CONFIG";

fn default_port() -> u16 {
    1883
}

fn default_subscription_topic_prefix() -> String {
    "$share/ha/".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_reconnect_initial_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    120_000
}

fn default_publish_timeout_secs() -> u64 {
    30
}

fn default_request_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_topic() -> String {
    "homeautomation/event".to_string()
}

/// Broker connection settings.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_subscription_topic_prefix")]
    pub subscription_topic_prefix: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
}

impl ServerSettings {
    /// Settings for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: None,
            password: None,
            subscription_topic_prefix: default_subscription_topic_prefix(),
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            publish_timeout_secs: default_publish_timeout_secs(),
            request_capacity: default_request_capacity(),
        }
    }

    /// Username and password to authenticate with. The password is only used
    /// together with a username.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|username| (username, self.password.as_deref().unwrap_or("")))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("server.host must not be empty".to_string());
        }
        if self.keep_alive_secs < 5 {
            return Err(format!(
                "server.keep_alive_secs must be at least 5, got {}",
                self.keep_alive_secs
            ));
        }
        if self.reconnect_initial_delay_ms == 0 {
            return Err("server.reconnect_initial_delay_ms must be greater than 0".to_string());
        }
        if self.reconnect_max_delay_ms < self.reconnect_initial_delay_ms {
            return Err(format!(
                "server.reconnect_max_delay_ms ({}) must not be below reconnect_initial_delay_ms ({})",
                self.reconnect_max_delay_ms, self.reconnect_initial_delay_ms
            ));
        }
        if self.request_capacity == 0 {
            return Err("server.request_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Metadata of one device property, as listed in `[[property]]` tables.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PropertyConfig {
    pub id: u64,
    pub label: String,
    pub device_type: String,
    pub device_id: String,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_event_topic")]
    pub event_topic: String,
    /// Inbound topic filters the service subscribes to and logs.
    #[serde(default)]
    pub subscriptions: Vec<String>,
    /// Stable event names that are not published.
    #[serde(default)]
    pub ignored_events: Vec<String>,
    pub server: ServerSettings,
    #[serde(default, rename = "property")]
    pub properties: Vec<PropertyConfig>,
}

impl Config {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path()?;
        Self::load_from_file(&config_path)
    }

    pub fn get_config_path() -> Result<String, Box<dyn std::error::Error>> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(path);
        }

        #[cfg(debug_assertions)]
        {
            // In debug mode, look for config.toml in the current directory
            Ok("config.toml".to_string())
        }

        #[cfg(not(debug_assertions))]
        {
            // In release mode, look for config.toml in $HOME/.config/homeautomation-mqtt
            let home = std::env::var("HOME").map_err(|_| "HOME environment variable not set")?;
            let config_path = format!("{}/.config/homeautomation-mqtt/config.toml", home);

            Ok(config_path)
        }
    }

    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path, e))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(contents)?;

        config
            .server
            .validate()
            .map_err(|e| format!("Configuration error: {}", e))?;
        config
            .ignored_event_kinds()
            .map_err(|e| format!("Configuration error in ignored_events: {}", e))?;

        Ok(config)
    }

    /// Parses `ignored_events` into event kinds.
    pub fn ignored_event_kinds(&self) -> Result<Vec<EventKind>, TranslateError> {
        self.ignored_events.iter().map(|name| name.parse()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{PropertyKind, Trigger};

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [server]
            host = "broker.local"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.event_topic, "homeautomation/event");
        assert!(config.subscriptions.is_empty());
        assert!(config.properties.is_empty());
        assert_eq!(config.server, ServerSettings::new("broker.local"));
        assert_eq!(config.server.port, 1883);
        assert_eq!(config.server.subscription_topic_prefix, "$share/ha/");
        assert_eq!(config.server.credentials(), None);
    }

    #[test]
    fn full_config_parses() {
        let config = Config::from_toml_str(
            r#"
            log_level = "debug"
            event_topic = "house/events"
            subscriptions = ["sensors/#"]
            ignored_events = ["TemperatureUpdatedEvent"]

            [server]
            host = "broker.local"
            port = 8883
            username = "bridge"
            password = "secret"
            subscription_topic_prefix = "$share/house/"

            [[property]]
            id = 3
            label = "Kitchen"
            device_type = "thermometer"
            device_id = "sensor-7"
            "#,
        )
        .unwrap();

        assert_eq!(config.event_topic, "house/events");
        assert_eq!(config.server.port, 8883);
        assert_eq!(config.server.credentials(), Some(("bridge", "secret")));
        assert_eq!(config.properties.len(), 1);
        assert_eq!(config.properties[0].device_id, "sensor-7");
        assert_eq!(
            config.ignored_event_kinds().unwrap(),
            vec![EventKind::new(PropertyKind::Temperature, Trigger::Updated)]
        );
    }

    #[test]
    fn password_without_username_is_ignored() {
        let mut settings = ServerSettings::new("broker.local");
        settings.password = Some("secret".to_string());
        assert_eq!(settings.credentials(), None);

        settings.username = Some("bridge".to_string());
        settings.password = None;
        assert_eq!(settings.credentials(), Some(("bridge", "")));
    }

    #[test]
    fn missing_host_is_rejected() {
        assert!(Config::from_toml_str("log_level = \"info\"").is_err());
        assert!(Config::from_toml_str("[server]\nhost = \"\"").is_err());
    }

    #[test]
    fn unknown_ignored_event_is_rejected_at_startup() {
        let err = Config::from_toml_str(
            r#"
            ignored_events = ["SnowDepthChangedEvent"]
            [server]
            host = "broker.local"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("SnowDepthChangedEvent"));
    }

    #[test]
    fn reconnect_delays_must_be_ordered() {
        let mut settings = ServerSettings::new("broker.local");
        settings.reconnect_initial_delay_ms = 5_000;
        settings.reconnect_max_delay_ms = 1_000;
        assert!(settings.validate().is_err());

        settings.reconnect_max_delay_ms = 5_000;
        assert!(settings.validate().is_ok());
    }
}

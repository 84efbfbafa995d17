use anyhow::{Context, Result};
use rumqttc::{Client, MqttOptions, QoS};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    host: String,
    #[serde(default = "MqttConfig::default_port")]
    port: u16,
    username: Option<String>,
    password: Option<String>,
    #[serde(default = "MqttConfig::default_topic")]
    topic: String,
    #[serde(default = "MqttConfig::default_qos")]
    qos: u8,
    #[serde(default = "MqttConfig::default_client_id")]
    client_id: String,
    #[serde(
        default = "MqttConfig::default_keep_alive_interval",
        with = "humantime_serde"
    )]
    keep_alive_interval: Duration,
}

impl MqttConfig {
    fn default_port() -> u16 {
        1883
    }

    fn default_topic() -> String {
        "jkbms".into()
    }

    fn default_qos() -> u8 {
        0
    }

    fn generate_random_string(len: usize) -> String {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn default_client_id() -> String {
        format!("jkbms-{}", Self::generate_random_string(8))
    }

    fn default_keep_alive_interval() -> Duration {
        Duration::from_secs(30)
    }

    pub const DEFAULT_CONFIG_FILE: &str = "mqtt.yaml";

    pub fn load(config_file_path: &str) -> Result<Self> {
        log::debug!("Loading config file from {config_file_path:?}");
        let config_file = std::fs::File::open(config_file_path)
            .with_context(|| format!("Cannot open MQTT config file {config_file_path:?}"))?;
        let config: Self = serde_yaml::from_reader(&config_file)
            .with_context(|| format!("Cannot read MQTT config from file: {config_file_path:?}"))?;
        Ok(config)
    }

    fn qos(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }

    pub fn create_client(&self) -> Client {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive_interval);
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or(""));
        }

        log::info!(
            "Connecting to MQTT broker {}:{} with client_id: {}",
            self.host,
            self.port,
            self.client_id
        );

        let (client, mut connection) = Client::new(options, 10);

        // The connection has to be polled for the client to make progress;
        // drain it on a background thread.
        std::thread::spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(event) => log::trace!("MQTT event: {event:?}"),
                    Err(err) => {
                        log::warn!("MQTT connection error: {err}");
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        });

        client
    }
}

pub struct MqttPublisher {
    client: Client,
    config: MqttConfig,
}

impl MqttPublisher {
    pub fn new(config: MqttConfig) -> Self {
        let client = config.create_client();
        Self { client, config }
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        log::debug!(
            "Publishing to MQTT: Topic='{}', Payload='{payload}', QoS={}",
            topic,
            self.config.qos
        );

        self.client
            .publish(topic, self.config.qos(), false, payload.as_bytes())
            .with_context(|| format!("Failed to publish message to MQTT topic: {}", topic))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn config_defaults_are_filled_in() {
        let mut config_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(config_file, "host: broker.local").unwrap();

        let config = MqttConfig::load(config_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic, "jkbms");
        assert_eq!(config.qos, 0);
        assert!(config.client_id.starts_with("jkbms-"));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(30));
    }

    #[test]
    fn config_overrides_take_precedence() {
        let mut config_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(config_file, "host: broker.local").unwrap();
        writeln!(config_file, "port: 8883").unwrap();
        writeln!(config_file, "topic: battery/shed").unwrap();
        writeln!(config_file, "qos: 1").unwrap();
        writeln!(config_file, "keep_alive_interval: 1m").unwrap();

        let config = MqttConfig::load(config_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 8883);
        assert_eq!(config.topic, "battery/shed");
        assert_eq!(config.qos, 1);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(60));
    }
}

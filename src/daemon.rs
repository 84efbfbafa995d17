use anyhow::{bail, Context, Result};
use jkbms_lib::bluetooth::JkBms;
use jkbms_lib::protocol;
use log::{error, info, warn};
use serde_json::json;
use std::collections::HashMap;

use crate::{commandline, mqtt};

const AVAILABLE_METRICS: &[&str] = &["cell-data", "settings", "device-info"];

#[derive(Debug)]
enum FetchedData {
    CellData(protocol::CellData),
    Settings(protocol::Settings),
    DeviceInfo(protocol::DeviceInfo),
}

impl FetchedData {
    fn to_json_value(&self) -> Result<serde_json::Value> {
        match self {
            FetchedData::CellData(s) => serde_json::to_value(s).map_err(Into::into),
            FetchedData::Settings(s) => serde_json::to_value(s).map_err(Into::into),
            FetchedData::DeviceInfo(s) => serde_json::to_value(s).map_err(Into::into),
        }
    }

    fn as_debug_string(&self) -> String {
        match self {
            FetchedData::CellData(s) => format!("{s:?}"),
            FetchedData::Settings(s) => format!("{s:?}"),
            FetchedData::DeviceInfo(s) => format!("{s:?}"),
        }
    }
}

async fn fetch_metric(bms: &mut JkBms, metric_name: &str) -> Result<FetchedData> {
    match metric_name {
        "cell-data" => Ok(bms.get_cell_data().await.map(FetchedData::CellData)?),
        "settings" => Ok(bms.get_settings().await.map(FetchedData::Settings)?),
        "device-info" => Ok(bms.get_device_info().await.map(FetchedData::DeviceInfo)?),
        _ => bail!("Unknown metric name '{}'", metric_name),
    }
}

fn publish_simple_format(
    publisher: &mut mqtt::MqttPublisher,
    base_topic: &str,
    metric_name: &str,
    value: &serde_json::Value,
) {
    fn publish_recursive(
        publisher: &mut mqtt::MqttPublisher,
        topic: &str,
        val: &serde_json::Value,
    ) {
        match val {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let sub_topic = format!("{topic}/{k}");
                    publish_recursive(publisher, &sub_topic, v);
                }
            }
            serde_json::Value::Array(arr) => {
                for (i, v) in arr.iter().enumerate() {
                    let sub_topic = format!("{topic}/{i}");
                    publish_recursive(publisher, &sub_topic, v);
                }
            }
            serde_json::Value::String(s) => {
                if let Err(e) = publisher.publish(topic, s) {
                    error!("Failed to publish message to topic {topic}: {e}");
                }
            }
            serde_json::Value::Number(n) => {
                if let Err(e) = publisher.publish(topic, &n.to_string()) {
                    error!("Failed to publish message to topic {topic}: {e}");
                }
            }
            serde_json::Value::Bool(b) => {
                if let Err(e) = publisher.publish(topic, &b.to_string()) {
                    error!("Failed to publish message to topic {topic}: {e}");
                }
            }
            serde_json::Value::Null => {
                // Do not publish null values
            }
        }
    }
    let root_topic = format!("{base_topic}/{metric_name}");
    publish_recursive(publisher, &root_topic, value);
}

pub async fn run(
    mut bms: JkBms,
    output: commandline::DaemonOutput,
    interval: std::time::Duration,
    metrics_to_fetch: Vec<String>,
) -> Result<()> {
    info!(
        "Starting daemon mode: output={output:?}, interval={interval:?}, metrics={metrics_to_fetch:?}"
    );

    let mut mqtt_publisher: Option<mqtt::MqttPublisher> = None;

    if let commandline::DaemonOutput::Mqtt { config_file, .. } = &output {
        let config = mqtt::MqttConfig::load(config_file)
            .with_context(|| format!("Failed to open MQTT config file at '{config_file}'"))?;
        info!("Successfully loaded MQTT config from {config_file}: {config:?}");
        mqtt_publisher = Some(mqtt::MqttPublisher::new(config));
    }

    loop {
        let mut fetched_data: HashMap<String, FetchedData> = HashMap::new();
        let mut metrics_to_process = metrics_to_fetch.clone();

        if metrics_to_process.iter().any(|m| m == "all") {
            info!("Fetching all metrics due to 'all' flag.");
            metrics_to_process = AVAILABLE_METRICS.iter().map(|s| s.to_string()).collect();
        }

        for metric_name in &metrics_to_process {
            info!("Fetching metric: {metric_name}");
            match fetch_metric(&mut bms, metric_name).await {
                Ok(data) => {
                    fetched_data.insert(metric_name.to_string(), data);
                }
                Err(e) => error!("Error fetching metric '{metric_name}': {e}"),
            }
        }

        match &output {
            commandline::DaemonOutput::Console => {
                println!("--- Data at {} ---", chrono::Local::now().to_rfc3339());
                for (name, data) in &fetched_data {
                    println!("{}: {}", name, data.as_debug_string());
                }
                println!("--------------------------");
            }
            commandline::DaemonOutput::Mqtt { format, .. } => {
                if let Some(publisher) = mqtt_publisher.as_mut() {
                    match format {
                        commandline::MqttFormat::Json => {
                            let mut data_to_publish = serde_json::Map::new();
                            data_to_publish.insert(
                                "timestamp".to_string(),
                                json!(chrono::Utc::now().to_rfc3339()),
                            );

                            for (name, data) in &fetched_data {
                                match data.to_json_value() {
                                    Ok(val) => {
                                        data_to_publish.insert(name.clone(), val);
                                    }
                                    Err(e) => error!("Failed to serialize '{name}': {e}"),
                                }
                            }

                            if data_to_publish.len() > 1 {
                                match serde_json::to_string(&data_to_publish) {
                                    Ok(json_payload) => {
                                        let topic = publisher.topic().to_string();
                                        if let Err(e) = publisher.publish(&topic, &json_payload) {
                                            error!("Failed to publish data to MQTT: {e:?}");
                                        }
                                    }
                                    Err(e) => {
                                        error!("Failed to serialize data to JSON string: {e}");
                                    }
                                }
                            } else {
                                info!("No data fetched in this cycle to publish via MQTT.");
                            }
                        }
                        commandline::MqttFormat::Simple => {
                            let base_topic = publisher.topic().to_string();
                            for (name, data) in &fetched_data {
                                match data.to_json_value() {
                                    Ok(value) => {
                                        publish_simple_format(publisher, &base_topic, name, &value);
                                    }
                                    Err(e) => error!("Failed to serialize '{name}': {e}"),
                                }
                            }
                        }
                    }
                } else {
                    warn!(
                        "MQTT output selected, but publisher is not initialized. Skipping publish."
                    );
                }
            }
        }
        tokio::time::sleep(interval).await;
    }
}

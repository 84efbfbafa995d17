use crate::mqtt;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show real-time pack telemetry: cell voltages, current, temperatures, state of charge
    CellData,
    /// Show device identity: vendor, versions, serial number, passcodes
    DeviceInfo,
    /// Show configured protection thresholds and limits
    Settings,
    /// Show all available BMS information by running every read command
    All,
    /// Enable or disable the charge switch
    SetChargeSwitch {
        /// Enable charging. If this flag is not present, it will be disabled.
        #[clap(long, short, action)]
        enable: bool,
    },
    /// Enable or disable the discharge switch
    SetDischargeSwitch {
        /// Enable discharging. If this flag is not present, it will be disabled.
        #[clap(long, short, action)]
        enable: bool,
    },
    /// Enable or disable the balancer
    SetBalanceSwitch {
        /// Enable balancing. If this flag is not present, it will be disabled.
        #[clap(long, short, action)]
        enable: bool,
    },
    /// Enable charging, discharging and balancing in one go
    EnableAll,
    /// Run in daemon mode, periodically fetching and outputting metrics
    Daemon {
        /// Output destination for metrics
        #[command(subcommand)]
        output: DaemonOutput,
        /// Interval for fetching metrics (e.g., "10s", "1m")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "10s")]
        interval: Duration,
        /// Comma-separated list of metrics to fetch (e.g., cell-data,settings or all)
        #[clap(long, short, use_value_delimiter = true, default_value = "cell-data")]
        metrics: Vec<String>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum MqttFormat {
    Simple,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Continuously read metrics and print them to the standard output (console).
    Console,
    /// Continuously read metrics and publish them to an MQTT broker.
    Mqtt {
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
        /// Output format for MQTT messages
        #[arg(long, value_enum, default_value_t = MqttFormat::Simple)]
        format: MqttFormat,
    },
}

const fn about_text() -> &'static str {
    "JK BMS command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Advertised Bluetooth name of the BMS (e.g. "JK-B2A8S20P")
    #[arg(short, long, default_value = "JK-BMS")]
    pub device: String,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Timeout for a single request round-trip (e.g., "500ms", "5s")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "10s")]
    pub timeout: Duration,

    /// Number of retries for failed requests
    #[arg(long, default_value = "3")]
    pub retries: u8,
}

use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::{ops::Deref, panic};

mod commandline;
mod daemon;
mod mqtt;

use commandline::{CliArgs, CliCommands};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

macro_rules! print_cell_data {
    ($bms:expr) => {
        println!(
            "Cell data: {:?}",
            $bms.get_cell_data()
                .await
                .with_context(|| "Cannot get cell data")?
        )
    };
}
macro_rules! print_device_info {
    ($bms:expr) => {
        println!(
            "Device info: {:?}",
            $bms.get_device_info()
                .await
                .with_context(|| "Cannot get device info")?
        )
    };
}
macro_rules! print_settings {
    ($bms:expr) => {
        println!(
            "Settings: {:?}",
            $bms.get_settings()
                .await
                .with_context(|| "Cannot get settings")?
        )
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let mut bms = jkbms_lib::bluetooth::JkBms::connect(&args.device)
        .await
        .with_context(|| format!("Cannot connect to BMS '{}'", args.device))?;
    bms.set_timeout(args.timeout);
    bms.set_retries(args.retries);

    match args.command {
        CliCommands::CellData => print_cell_data!(bms),
        CliCommands::DeviceInfo => print_device_info!(bms),
        CliCommands::Settings => print_settings!(bms),
        CliCommands::All => {
            print_device_info!(bms);
            print_settings!(bms);
            print_cell_data!(bms);
        }
        CliCommands::SetChargeSwitch { enable } => bms
            .set_charge_switch(enable)
            .await
            .with_context(|| "Cannot set charge switch")?,
        CliCommands::SetDischargeSwitch { enable } => bms
            .set_discharge_switch(enable)
            .await
            .with_context(|| "Cannot set discharge switch")?,
        CliCommands::SetBalanceSwitch { enable } => bms
            .set_balance_switch(enable)
            .await
            .with_context(|| "Cannot set balance switch")?,
        CliCommands::EnableAll => bms
            .enable_all()
            .await
            .with_context(|| "Cannot enable BMS functions")?,
        CliCommands::Daemon {
            output,
            interval,
            metrics,
        } => daemon::run(bms, output, interval, metrics).await?,
    }

    Ok(())
}

//! Provides an asynchronous client for interacting with a JK BMS over
//! Bluetooth Low Energy, using Tokio and the `bluest` crate.
//!
//! The BMS exposes a vendor serial service (`ffe0`) with a single
//! characteristic (`ffe1`) used for both command writes and notifications.
//! Responses arrive as notification chunks of arbitrary length and are
//! reassembled by this client before decoding.
//!
//! # Example
//!
//! ```no_run
//! use jkbms_lib::bluetooth::{JkBms, Error};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let mut bms = JkBms::connect("JK-B2A8S20P").await?;
//!     bms.set_timeout(Duration::from_secs(5));
//!
//!     let cell_data = bms.get_cell_data().await?;
//!     println!("Cell data: {:?}", cell_data);
//!
//!     let device_info = bms.get_device_info().await?;
//!     println!("Device info: {:?}", device_info);
//!
//!     Ok(())
//! }
//! ```

use crate::protocol::{
    CellData, DeviceInfo, FrameType, Response, SetBalanceSwitch, SetChargeSwitch,
    SetDischargeSwitch, Settings, COMMAND_LENGTH,
};
use crate::reassembly::Reassembler;
use bluest::{Adapter, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

const SERIAL_SERVICE_UUID: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";
const SERIAL_CHARACTERISTIC_UUID: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

/// How long to scan for the device before giving up.
const SCAN_TIMEOUT: Duration = Duration::from_secs(30);
/// Connection attempts before reporting failure.
const CONNECT_ATTEMPTS: u32 = 3;

/// Errors specific to the asynchronous Bluetooth client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No default Bluetooth adapter is available on this system.
    #[error("no default Bluetooth adapter available")]
    NoAdapter,
    /// No advertising device with the requested name was seen within the scan window.
    #[error("device '{0}' not found")]
    DeviceNotFound(String),
    /// The connected device does not expose the vendor serial service.
    #[error("device does not expose service {SERIAL_SERVICE_UUID}")]
    ServiceNotFound,
    /// The serial service lacks the expected characteristic.
    #[error("device does not expose characteristic {SERIAL_CHARACTERISTIC_UUID}")]
    CharacteristicNotFound,
    /// An error originating from the JK BMS protocol library.
    #[error("protocol error: {0}")]
    Protocol(#[from] crate::Error),
    /// An error from the underlying Bluetooth stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),
    /// No response of the expected type arrived before the timeout.
    #[error("timed out waiting for a response")]
    ResponseTimeout,
}

/// A specialized `Result` type for operations within the `bluetooth` module.
type Result<T> = std::result::Result<T, Error>;

/// The main struct for interacting asynchronously with a JK BMS.
///
/// Each instance exclusively owns the reassembly state for one device; do not
/// share an instance across devices.
pub struct JkBms {
    adapter: Adapter,
    device: Device,
    characteristic: Characteristic,
    reassembler: Reassembler,
    timeout: Duration,
    retries: u8,
}

impl JkBms {
    /// Discovers the device by its advertised name, connects and resolves the
    /// serial characteristic.
    pub async fn connect(device_name: &str) -> Result<Self> {
        let adapter = Adapter::default().await.ok_or(Error::NoAdapter)?;
        adapter.wait_available().await?;

        log::info!("Scanning for '{device_name}'...");
        let device = timeout(SCAN_TIMEOUT, Self::discover_device(&adapter, device_name))
            .await
            .map_err(|_| Error::DeviceNotFound(device_name.to_string()))??;

        let mut attempt = 0;
        loop {
            attempt += 1;
            log::debug!("Connection attempt {attempt}/{CONNECT_ATTEMPTS} to '{device_name}'");
            match adapter.connect_device(&device).await {
                Ok(()) => break,
                Err(err) if attempt < CONNECT_ATTEMPTS => {
                    log::warn!("Connection attempt {attempt} failed: {err}");
                    // progressive back-off between attempts
                    tokio::time::sleep(Duration::from_secs(1 + attempt as u64)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
        log::info!("Connected to '{device_name}'");

        let service = device
            .discover_services_with_uuid(uuid(SERIAL_SERVICE_UUID))
            .await?
            .first()
            .cloned()
            .ok_or(Error::ServiceNotFound)?;
        let characteristic = service
            .discover_characteristics_with_uuid(uuid(SERIAL_CHARACTERISTIC_UUID))
            .await?
            .first()
            .cloned()
            .ok_or(Error::CharacteristicNotFound)?;

        Ok(Self {
            adapter,
            device,
            characteristic,
            reassembler: Reassembler::new(),
            timeout: Duration::from_secs(10),
            retries: 3,
        })
    }

    /// Sets the per-notification timeout for request round-trips.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sets the number of retries for failed requests.
    pub fn set_retries(&mut self, retries: u8) {
        self.retries = retries;
    }

    /// Disconnect from the BMS.
    pub async fn disconnect(self) -> Result<()> {
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }

    pub async fn get_cell_data(&mut self) -> Result<CellData> {
        match self.request(CellData::request(), FrameType::CellData).await? {
            Response::CellData(cell_data) => Ok(cell_data),
            _ => unreachable!(),
        }
    }

    pub async fn get_device_info(&mut self) -> Result<DeviceInfo> {
        match self
            .request(DeviceInfo::request(), FrameType::DeviceInfo)
            .await?
        {
            Response::DeviceInfo(device_info) => Ok(device_info),
            _ => unreachable!(),
        }
    }

    pub async fn get_settings(&mut self) -> Result<Settings> {
        match self.request(Settings::request(), FrameType::Settings).await? {
            Response::Settings(settings) => Ok(settings),
            _ => unreachable!(),
        }
    }

    pub async fn set_charge_switch(&mut self, enable: bool) -> Result<()> {
        self.write(&SetChargeSwitch::request(enable)).await
    }

    pub async fn set_discharge_switch(&mut self, enable: bool) -> Result<()> {
        self.write(&SetDischargeSwitch::request(enable)).await
    }

    pub async fn set_balance_switch(&mut self, enable: bool) -> Result<()> {
        self.write(&SetBalanceSwitch::request(enable)).await
    }

    /// Turns on charging, discharging and balancing, spacing the commands out
    /// as the device needs a short pause between writes.
    pub async fn enable_all(&mut self) -> Result<()> {
        self.set_charge_switch(true).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.set_discharge_switch(true).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.set_balance_switch(true).await?;
        Ok(())
    }

    async fn discover_device(adapter: &Adapter, name: &str) -> Result<Device> {
        let mut scan = adapter.scan(&[]).await?;
        while let Some(discovered) = scan.next().await {
            let device_name = discovered.device.name_async().await.unwrap_or_default();
            log::trace!("BLE device found: '{device_name}'");
            if device_name == name {
                return Ok(discovered.device);
            }
        }
        Err(Error::DeviceNotFound(name.to_string()))
    }

    async fn write(&mut self, frame: &[u8; COMMAND_LENGTH]) -> Result<()> {
        log::trace!("TX: {frame:02X?}");
        self.characteristic.write(frame).await?;
        Ok(())
    }

    /// Sends a request and reads notification chunks until a response of the
    /// expected type is reassembled, retrying the whole round-trip on failure.
    async fn request(
        &mut self,
        request: [u8; COMMAND_LENGTH],
        expected: FrameType,
    ) -> Result<Response> {
        let mut last_error = None;
        for attempt in 1..=u32::from(self.retries.max(1)) {
            match self.request_once(&request, expected).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    log::debug!("Failed try {attempt} of {}, repeating ({err})", self.retries);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(Error::ResponseTimeout))
    }

    async fn request_once(
        &mut self,
        request: &[u8; COMMAND_LENGTH],
        expected: FrameType,
    ) -> Result<Response> {
        self.reassembler.reset();

        let mut notifications = self.characteristic.notify().await?;

        log::trace!("TX: {request:02X?}");
        self.characteristic.write(request).await?;

        loop {
            let chunk = match timeout(self.timeout, notifications.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(err))) => return Err(err.into()),
                // end of notification stream or silence: treat both as timeout
                Ok(None) | Err(_) => return Err(Error::ResponseTimeout),
            };
            log::trace!("RX notification: {:02X?}", chunk);

            if let Some(response) = self.reassembler.feed(&chunk) {
                if response.frame_type() == expected {
                    return Ok(response);
                }
                // the device also pushes unsolicited frames; keep listening
                log::debug!(
                    "Discarding {:?} frame while waiting for {expected:?}",
                    response.frame_type()
                );
            }
        }
    }
}

fn uuid(uuid: &str) -> Uuid {
    Uuid::parse_str(uuid).unwrap()
}

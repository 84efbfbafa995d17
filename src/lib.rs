#![cfg_attr(docsrs, feature(doc_cfg))]
//! # jkbms_lib
//!
//! This crate provides a library for interacting with JK BMS (Battery Management System)
//! devices over Bluetooth Low Energy. The wire codec (frame reassembly, decoding and
//! command construction) is transport-independent; an asynchronous BLE client is
//! available behind a feature flag.
//!
//! ## Features
//!
//! This crate uses a feature-based system to keep dependencies minimal.
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `jkbms`
//!   command-line tool and pulls in `bluetooth` and `serde`.
//!
//! ### Client Features
//! - `bluetooth`: Enables the **asynchronous** BLE client using `bluest` and `tokio`.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` support for serializing/deserializing decoded records.
//! - `bin-dependencies`: Enables all features required by the `jkbms` binary executable.

/// Contains error types for the library.
mod error;
/// Defines the communication protocol for JK BMS devices.
pub mod protocol;
/// Reassembles logical frames from transport-layer notification chunks.
pub mod reassembly;

pub use error::Error;

/// Asynchronous Bluetooth Low Energy client for JK BMS communication.
#[cfg_attr(docsrs, doc(cfg(feature = "bluetooth")))]
#[cfg(feature = "bluetooth")]
pub mod bluetooth;

//! Vayu Sync Library
//!
//! Ingestion pipeline for a Bluetooth PM2.5 sensor: parses the sensor's text
//! output, aggregates readings into 5-minute buckets, keeps them in a local
//! store, pushes them to the backend and reconciles both for reporting.

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod helpers;
pub mod services;

pub use error::{Error, Result};

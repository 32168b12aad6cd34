//! # CoDrone Link Library
//!
//! Drive a CoDrone/Petrone drone from the host through its serial link dongle.
//!
//! The library frames and checks packets, keeps the latest value of every
//! telemetry type, correlates requests with their replies and raises flight
//! events from the drone's state reports. [`link::Link`] is the entry point.

pub mod config;
pub mod error;
pub mod link;
pub mod packet;
pub mod serial;
pub mod telemetry;

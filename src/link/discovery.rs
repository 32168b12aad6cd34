//! # Discovery and Connection
//!
//! Tracks what the link dongle reports about nearby drones and drives the
//! scan, select and connect sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{lock, Link};
use crate::error::{LinkError, Result};
use crate::packet::payload::{LinkDiscoveredDevice, LinkEvent, LinkEventAddress, Payload};
use crate::packet::protocol::{EventLink, ModeLinkBroadcast};

/// Device names are compared on this many characters
pub const DEVICE_NAME_LENGTH: usize = 12;

/// Wait after a dongle reset before talking to it again
const SYSTEM_RESET_SETTLE: Duration = Duration::from_secs(3);

/// Wait after switching the dongle to passive broadcast
const BROADCAST_SETTLE: Duration = Duration::from_millis(100);

/// Link-layer view maintained from `LinkEvent` and discovery packets
#[derive(Debug, Default)]
pub struct LinkStatus {
    devices: Mutex<Vec<LinkDiscoveredDevice>>,
    discovering: AtomicBool,
    connected: AtomicBool,
}

impl LinkStatus {
    /// Update from a decoded packet; other payloads are ignored
    pub fn observe(&self, payload: &Payload) {
        match payload {
            Payload::LinkEvent(LinkEvent { event, .. })
            | Payload::LinkEventAddress(LinkEventAddress { event, .. }) => {
                self.on_link_event(*event)
            }
            Payload::LinkDiscoveredDevice(device) => {
                debug!(
                    "Discovered {} (index {}, {} dBm)",
                    device.name(),
                    device.index,
                    device.rssi
                );
                lock(&self.devices).push(*device);
            }
            _ => {}
        }
    }

    fn on_link_event(&self, event: EventLink) {
        debug!("Link event: {:?}", event);

        match event {
            EventLink::Scanning => {
                lock(&self.devices).clear();
                self.discovering.store(true, Ordering::Release);
            }
            EventLink::ScanStop => self.discovering.store(false, Ordering::Release),
            EventLink::Connected => {
                info!("Drone connected");
                self.connected.store(true, Ordering::Release);
            }
            EventLink::Disconnected => {
                warn!("Drone disconnected");
                self.connected.store(false, Ordering::Release);
            }
            _ => {}
        }
    }

    pub fn devices(&self) -> Vec<LinkDiscoveredDevice> {
        lock(&self.devices).clone()
    }

    pub fn clear_devices(&self) {
        lock(&self.devices).clear();
    }

    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::Acquire)
    }

    pub fn set_discovering(&self, discovering: bool) {
        self.discovering.store(discovering, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

/// Check a device name before any I/O happens
///
/// # Errors
///
/// Returns `InvalidDeviceName` unless the name is exactly 12 characters
pub fn validate_device_name(name: &str) -> Result<()> {
    if name.chars().count() == DEVICE_NAME_LENGTH {
        Ok(())
    } else {
        Err(LinkError::InvalidDeviceName(name.to_string()))
    }
}

/// Pick the named device, or the strongest signal when no name is given
pub fn select_device(
    devices: &[LinkDiscoveredDevice],
    name: Option<&str>,
) -> Option<LinkDiscoveredDevice> {
    match name {
        Some(name) => devices.iter().find(|d| d.name().starts_with(name)).copied(),
        None => devices.iter().max_by_key(|d| d.rssi).copied(),
    }
}

impl Link {
    /// Scan for drones and connect to one
    ///
    /// With `device_name` the matching drone is used; without it, the drone
    /// with the strongest signal. Returns whether the dongle reports a
    /// connection at the end.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeviceName` before any I/O if the name is not 12
    /// characters, or a transmit error.
    pub async fn connect(&self, device_name: Option<&str>) -> Result<bool> {
        if let Some(name) = device_name {
            validate_device_name(name)?;
        }

        let config = &self.config().link;

        if config.system_reset {
            info!("Resetting link dongle");
            self.send_link_system_reset().await?;
            sleep(SYSTEM_RESET_SETTLE).await;
        }

        self.send_link_mode_broadcast(ModeLinkBroadcast::Passive).await?;
        sleep(BROADCAST_SETTLE).await;

        let status = &self.shared.status;
        status.clear_devices();
        status.set_discovering(true);
        self.send_link_discover_start().await?;
        info!("Scanning for drones...");

        let discover_timeout = Duration::from_millis(config.discover_timeout_ms);
        if !self.wait_for(discover_timeout, |s| !s.is_discovering()).await {
            warn!("Scan did not stop within {:?}", discover_timeout);
        }
        sleep(Duration::from_millis(config.discover_settle_ms)).await;

        let devices = status.devices();
        let Some(device) = select_device(&devices, device_name) else {
            match device_name {
                Some(name) => warn!("Drone {} not found among {} devices", name, devices.len()),
                None => warn!("No drones found"),
            }
            return Ok(false);
        };

        info!(
            "Connecting to {} (index {}, {} dBm)",
            device.name(),
            device.index,
            device.rssi
        );
        // Only a Connected event for this attempt counts
        status.set_connected(false);
        self.send_link_connect(device.index).await?;

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        if !self.wait_for(connect_timeout, LinkStatus::is_connected).await {
            warn!("Connection to {} timed out", device.name());
            return Ok(false);
        }
        sleep(Duration::from_millis(config.connect_settle_ms)).await;

        let connected = status.is_connected();
        if connected {
            let threshold = self.config().events.low_battery_percent;
            match self.battery_percentage().await {
                Some(percent) if percent < threshold => {
                    warn!("Battery low: {}% (below {}%)", percent, threshold)
                }
                Some(percent) => info!("Battery: {}%", percent),
                None => debug!("Battery level not reported"),
            }
        }

        Ok(connected)
    }
}

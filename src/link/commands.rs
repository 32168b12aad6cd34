//! # Command Surface
//!
//! Typed senders, telemetry getters, callback registration and accessors.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::watchdog::Event;
use super::{write, Link};
use crate::error::Result;
use crate::packet::decoder::DecodedPacket;
use crate::packet::payload::*;
use crate::packet::protocol::*;

impl Link {
    // Protocol

    pub async fn send_ping(&self, system_time: u64) -> Result<Bytes> {
        self.send(Ping { system_time }).await
    }

    pub async fn send_request(&self, data_type: DataType) -> Result<Bytes> {
        self.send(Request { data_type }).await
    }

    // Flight control

    /// Stick input, each axis -100..=100
    pub async fn send_control(&self, roll: i8, pitch: i8, yaw: i8, throttle: i8) -> Result<Bytes> {
        self.send(Control::new(roll, pitch, yaw, throttle)).await
    }

    pub async fn send_command(&self, command_type: CommandType, option: u8) -> Result<Bytes> {
        self.send(Command::new(command_type, option)).await
    }

    pub async fn send_mode_vehicle(&self, mode: ModeVehicle) -> Result<Bytes> {
        self.send_command(CommandType::ModeVehicle, mode.into()).await
    }

    pub async fn send_headless(&self, headless: Headless) -> Result<Bytes> {
        self.send_command(CommandType::Headless, headless.into()).await
    }

    pub async fn send_flight_event(&self, event: FlightEvent) -> Result<Bytes> {
        self.send_command(CommandType::FlightEvent, event.into()).await
    }

    pub async fn send_clear_trim(&self) -> Result<Bytes> {
        self.send_command(CommandType::ClearTrim, 0).await
    }

    pub async fn send_clear_gyro_bias(&self) -> Result<Bytes> {
        self.send_command(CommandType::ClearGyroBias, 0).await
    }

    pub async fn send_trim_flight(&self, roll: i16, pitch: i16, yaw: i16, throttle: i16) -> Result<Bytes> {
        self.send(TrimFlight {
            roll,
            pitch,
            yaw,
            throttle,
        })
        .await
    }

    pub async fn send_trim_drive(&self, wheel: i16) -> Result<Bytes> {
        self.send(TrimDrive { wheel }).await
    }

    // Other outputs

    pub async fn send_motor(&self, motors: [MotorSpeed; 4]) -> Result<Bytes> {
        self.send(Motor { motors }).await
    }

    pub async fn send_ir_message(&self, ir_data: u32) -> Result<Bytes> {
        self.send(IrMessage { ir_data }).await
    }

    // Lights

    pub async fn send_light_mode(&self, mode: u8, colors: u8, interval: u8) -> Result<Bytes> {
        self.send(LightMode {
            mode,
            colors,
            interval,
        })
        .await
    }

    pub async fn send_light_mode_color(&self, mode: u8, color: Rgb, interval: u8) -> Result<Bytes> {
        self.send(LightModeColor {
            mode,
            color,
            interval,
        })
        .await
    }

    /// Set the LED mode the drone starts with after power-on
    pub async fn send_light_mode_default_color(&self, mode: u8, color: Rgb, interval: u8) -> Result<Bytes> {
        self.send(LightModeDefaultColor {
            mode,
            color,
            interval,
        })
        .await
    }

    pub async fn send_light_event(&self, event: u8, colors: u8, interval: u8, repeat: u8) -> Result<Bytes> {
        self.send(LightEvent {
            event,
            colors,
            interval,
            repeat,
        })
        .await
    }

    pub async fn send_light_event_color(
        &self,
        event: u8,
        color: Rgb,
        interval: u8,
        repeat: u8,
    ) -> Result<Bytes> {
        self.send(LightEventColor {
            event,
            color,
            interval,
            repeat,
        })
        .await
    }

    // Link layer

    pub async fn send_link_mode_broadcast(&self, mode: ModeLinkBroadcast) -> Result<Bytes> {
        self.send_command(CommandType::LinkModeBroadcast, mode.into()).await
    }

    pub async fn send_link_system_reset(&self) -> Result<Bytes> {
        self.send_command(CommandType::LinkSystemReset, 0).await
    }

    pub async fn send_link_discover_start(&self) -> Result<Bytes> {
        self.send_command(CommandType::LinkDiscoverStart, 0).await
    }

    pub async fn send_link_discover_stop(&self) -> Result<Bytes> {
        self.send_command(CommandType::LinkDiscoverStop, 0).await
    }

    /// Connect to the device at `index` in the discovery list
    pub async fn send_link_connect(&self, index: u8) -> Result<Bytes> {
        self.send_command(CommandType::LinkConnect, index).await
    }

    pub async fn send_link_disconnect(&self) -> Result<Bytes> {
        self.send_command(CommandType::LinkDisconnect, 0).await
    }

    pub async fn send_link_rssi_polling_start(&self) -> Result<Bytes> {
        self.send_command(CommandType::LinkRssiPollingStart, 0).await
    }

    pub async fn send_link_rssi_polling_stop(&self) -> Result<Bytes> {
        self.send_command(CommandType::LinkRssiPollingStop, 0).await
    }

    // Flight events

    /// Take off; arms the `Takeoff` event for the next state sample
    pub async fn takeoff(&self) -> Result<Bytes> {
        self.shared.watchdog.arm_takeoff();
        self.send_flight_event(FlightEvent::TakeOff).await
    }

    pub async fn land(&self) -> Result<Bytes> {
        self.send_flight_event(FlightEvent::Landing).await
    }

    /// Cut the motors; arms the `EmergencyStop` event for the next state sample
    pub async fn emergency_stop(&self) -> Result<Bytes> {
        self.shared.watchdog.arm_stop();
        self.send_command(CommandType::Stop, 0).await
    }

    // Getters

    /// Fetch a record, falling back to the last stored value
    async fn get<T>(&self, min_interval: Option<Duration>) -> Option<T>
    where
        T: Record + TryFrom<Payload>,
    {
        self.fetch(T::DATA_TYPE, min_interval).await;
        self.latest::<T>()
    }

    pub async fn state(&self) -> Option<State> {
        self.get(None).await
    }

    pub async fn attitude(&self) -> Option<Attitude> {
        let interval = self.config().fetch.attitude_interval_ms;
        self.get(Some(Duration::from_millis(interval))).await
    }

    pub async fn battery(&self) -> Option<Battery> {
        let interval = self.config().fetch.battery_interval_ms;
        self.get(Some(Duration::from_millis(interval))).await
    }

    pub async fn imu(&self) -> Option<Imu> {
        self.get(None).await
    }

    pub async fn pressure(&self) -> Option<Pressure> {
        let interval = self.config().fetch.pressure_interval_ms;
        self.get(Some(Duration::from_millis(interval))).await
    }

    pub async fn range(&self) -> Option<Range> {
        self.get(None).await
    }

    pub async fn trim(&self) -> Option<TrimFlight> {
        self.get(None).await
    }

    pub async fn image_flow(&self) -> Option<ImageFlow> {
        self.get(None).await
    }

    pub async fn address(&self) -> Option<Address> {
        self.get(None).await
    }

    /// Battery level in percent, from the battery packet
    ///
    /// Rate-limited like [`battery`](Link::battery), so repeated calls within
    /// the interval return the cached level.
    pub async fn battery_percentage(&self) -> Option<u8> {
        self.battery().await.map(|battery| battery.percent.max(0) as u8)
    }

    /// Battery voltage in millivolts
    pub async fn battery_voltage(&self) -> Option<i16> {
        self.battery().await.map(|battery| battery.voltage)
    }

    /// Height above ground from the bottom range sensor, in millimetres
    pub async fn height(&self) -> Option<u16> {
        self.range().await.map(|range| range.bottom)
    }

    /// Barometer temperature as reported by the drone
    pub async fn temperature(&self) -> Option<i32> {
        self.pressure().await.map(|pressure| pressure.temperature)
    }

    pub async fn flight_mode(&self) -> Option<ModeFlight> {
        self.state().await.map(|state| state.mode_flight)
    }

    // Registration

    /// Call `callback` whenever the watchdog raises `event`
    pub fn on_event<F>(&self, event: Event, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.watchdog.on_event(event, Arc::new(callback));
    }

    /// Call `callback` with every decoded packet of `data_type`
    ///
    /// Replaces any callback previously registered for the type.
    pub fn on_packet<F>(&self, data_type: DataType, callback: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        write(&self.shared.handlers).insert(data_type, Arc::new(callback));
    }

    /// Observe every decoded packet together with its per-type count
    pub fn set_packet_tap<F>(&self, tap: F)
    where
        F: Fn(&DecodedPacket, u64) + Send + Sync + 'static,
    {
        *write(&self.shared.tap) = Some(Arc::new(tap));
    }

    // Accessors

    pub fn header(&self, data_type: DataType) -> Option<Header> {
        self.shared.storage.header(data_type)
    }

    pub fn count(&self, data_type: DataType) -> u64 {
        self.shared.storage.count(data_type)
    }

    /// Last stored record of type `T`, without touching the line
    pub fn latest<T>(&self) -> Option<T>
    where
        T: Record + TryFrom<Payload>,
    {
        self.shared.storage.latest::<T>()
    }

    /// Devices found by the last discovery scan
    pub fn devices(&self) -> Vec<LinkDiscoveredDevice> {
        self.shared.status.devices()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.is_connected()
    }

    /// Frames rejected by the decoder plus discarded receive buffers
    pub fn decode_failures(&self) -> u64 {
        self.shared
            .decode_failures
            .load(std::sync::atomic::Ordering::Relaxed)
    }
}

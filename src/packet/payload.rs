//! # Payload Records
//!
//! One fixed-size record per [`DataType`], plus the closed [`Payload`] sum
//! type that carries any of them. All multi-byte fields are little-endian and
//! are written in declaration order.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

use super::decoder::DecodeError;
use super::protocol::*;

/// Fixed-layout payload record
pub trait Record: Sized {
    /// Data type this record is sent and received as
    const DATA_TYPE: DataType;

    /// Append the record's wire bytes to `buf`
    fn encode(&self, buf: &mut BytesMut);

    /// Read the record from `buf`
    ///
    /// The caller guarantees `buf` holds exactly `DATA_TYPE.payload_size()` bytes.
    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError>;
}

/// Read one byte and convert it into a wire enum
fn wire_field<E>(buf: &mut &[u8], data_type: DataType, field: &'static str) -> Result<E, DecodeError>
where
    E: TryFrom<u8, Error = u8>,
{
    E::try_from(buf.get_u8()).map_err(|value| DecodeError::InvalidField {
        data_type,
        field,
        value,
    })
}

fn get_array<const N: usize>(buf: &mut &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    out
}

/// RGB colour triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.r);
        buf.put_u8(self.g);
        buf.put_u8(self.b);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        Self {
            r: buf.get_u8(),
            g: buf.get_u8(),
            b: buf.get_u8(),
        }
    }
}

/// Liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ping {
    pub system_time: u64,
}

impl Record for Ping {
    const DATA_TYPE: DataType = DataType::Ping;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.system_time);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            system_time: buf.get_u64_le(),
        })
    }
}

/// Acknowledgement of a received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub system_time: u64,
    /// Raw data type byte of the acknowledged packet
    pub data_type: u8,
    pub crc16: u16,
}

impl Record for Ack {
    const DATA_TYPE: DataType = DataType::Ack;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.system_time);
        buf.put_u8(self.data_type);
        buf.put_u16_le(self.crc16);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            system_time: buf.get_u64_le(),
            data_type: buf.get_u8(),
            crc16: buf.get_u16_le(),
        })
    }
}

/// Ask the drone to send one packet of `data_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Request {
    pub data_type: DataType,
}

impl Record for Request {
    const DATA_TYPE: DataType = DataType::Request;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.data_type.into());
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            data_type: wire_field(buf, Self::DATA_TYPE, "data_type")?,
        })
    }
}

/// Stick input, each axis -100..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Control {
    pub roll: i8,
    pub pitch: i8,
    pub yaw: i8,
    pub throttle: i8,
}

impl Control {
    pub const fn new(roll: i8, pitch: i8, yaw: i8, throttle: i8) -> Self {
        Self {
            roll,
            pitch,
            yaw,
            throttle,
        }
    }
}

impl Record for Control {
    const DATA_TYPE: DataType = DataType::Control;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i8(self.roll);
        buf.put_i8(self.pitch);
        buf.put_i8(self.yaw);
        buf.put_i8(self.throttle);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            roll: buf.get_i8(),
            pitch: buf.get_i8(),
            yaw: buf.get_i8(),
            throttle: buf.get_i8(),
        })
    }
}

/// Generic command with a single option byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Command {
    pub command_type: CommandType,
    pub option: u8,
}

impl Command {
    pub const fn new(command_type: CommandType, option: u8) -> Self {
        Self {
            command_type,
            option,
        }
    }
}

impl Record for Command {
    const DATA_TYPE: DataType = DataType::Command;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.command_type.into());
        buf.put_u8(self.option);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            command_type: wire_field(buf, Self::DATA_TYPE, "command_type")?,
            option: buf.get_u8(),
        })
    }
}

/// LED mode using a palette colour index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightMode {
    pub mode: u8,
    pub colors: u8,
    pub interval: u8,
}

impl Record for LightMode {
    const DATA_TYPE: DataType = DataType::LightMode;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.mode);
        buf.put_u8(self.colors);
        buf.put_u8(self.interval);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            mode: buf.get_u8(),
            colors: buf.get_u8(),
            interval: buf.get_u8(),
        })
    }
}

/// LED mode with an explicit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightModeColor {
    pub mode: u8,
    pub color: Rgb,
    pub interval: u8,
}

impl Record for LightModeColor {
    const DATA_TYPE: DataType = DataType::LightModeColor;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.mode);
        self.color.encode(buf);
        buf.put_u8(self.interval);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            mode: buf.get_u8(),
            color: Rgb::decode(buf),
            interval: buf.get_u8(),
        })
    }
}

/// Power-on LED mode, stored on the drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightModeDefaultColor {
    pub mode: u8,
    pub color: Rgb,
    pub interval: u8,
}

impl Record for LightModeDefaultColor {
    const DATA_TYPE: DataType = DataType::LightModeDefaultColor;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.mode);
        self.color.encode(buf);
        buf.put_u8(self.interval);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            mode: buf.get_u8(),
            color: Rgb::decode(buf),
            interval: buf.get_u8(),
        })
    }
}

/// One-off LED effect using a palette colour index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightEvent {
    pub event: u8,
    pub colors: u8,
    pub interval: u8,
    pub repeat: u8,
}

impl Record for LightEvent {
    const DATA_TYPE: DataType = DataType::LightEvent;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.event);
        buf.put_u8(self.colors);
        buf.put_u8(self.interval);
        buf.put_u8(self.repeat);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            event: buf.get_u8(),
            colors: buf.get_u8(),
            interval: buf.get_u8(),
            repeat: buf.get_u8(),
        })
    }
}

/// One-off LED effect with an explicit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightEventColor {
    pub event: u8,
    pub color: Rgb,
    pub interval: u8,
    pub repeat: u8,
}

impl Record for LightEventColor {
    const DATA_TYPE: DataType = DataType::LightEventColor;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.event);
        self.color.encode(buf);
        buf.put_u8(self.interval);
        buf.put_u8(self.repeat);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            event: buf.get_u8(),
            color: Rgb::decode(buf),
            interval: buf.get_u8(),
            repeat: buf.get_u8(),
        })
    }
}

/// Device BLE address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Address {
    pub address: [u8; 6],
}

impl Record for Address {
    const DATA_TYPE: DataType = DataType::Address;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.address);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            address: get_array(buf),
        })
    }
}

/// Current vehicle state, polled by the keep-alive loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct State {
    pub mode_vehicle: ModeVehicle,
    pub mode_system: u8,
    pub mode_flight: ModeFlight,
    pub mode_drive: u8,
    pub sensor_orientation: SensorOrientation,
    pub coordinate: u8,
    /// Battery level in percent
    pub battery: u8,
}

impl Record for State {
    const DATA_TYPE: DataType = DataType::State;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.mode_vehicle.into());
        buf.put_u8(self.mode_system);
        buf.put_u8(self.mode_flight.into());
        buf.put_u8(self.mode_drive);
        buf.put_u8(self.sensor_orientation.into());
        buf.put_u8(self.coordinate);
        buf.put_u8(self.battery);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            mode_vehicle: wire_field(buf, Self::DATA_TYPE, "mode_vehicle")?,
            mode_system: buf.get_u8(),
            mode_flight: wire_field(buf, Self::DATA_TYPE, "mode_flight")?,
            mode_drive: buf.get_u8(),
            sensor_orientation: wire_field(buf, Self::DATA_TYPE, "sensor_orientation")?,
            coordinate: buf.get_u8(),
            battery: buf.get_u8(),
        })
    }
}

/// Orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Attitude {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
}

impl Record for Attitude {
    const DATA_TYPE: DataType = DataType::Attitude;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i16_le(self.roll);
        buf.put_i16_le(self.pitch);
        buf.put_i16_le(self.yaw);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            roll: buf.get_i16_le(),
            pitch: buf.get_i16_le(),
            yaw: buf.get_i16_le(),
        })
    }
}

/// Flight trim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrimFlight {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub throttle: i16,
}

impl Record for TrimFlight {
    const DATA_TYPE: DataType = DataType::TrimFlight;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i16_le(self.roll);
        buf.put_i16_le(self.pitch);
        buf.put_i16_le(self.yaw);
        buf.put_i16_le(self.throttle);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            roll: buf.get_i16_le(),
            pitch: buf.get_i16_le(),
            yaw: buf.get_i16_le(),
            throttle: buf.get_i16_le(),
        })
    }
}

/// Drive-mode wheel trim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TrimDrive {
    pub wheel: i16,
}

impl Record for TrimDrive {
    const DATA_TYPE: DataType = DataType::TrimDrive;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i16_le(self.wheel);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            wheel: buf.get_i16_le(),
        })
    }
}

/// Infrared message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IrMessage {
    pub ir_data: u32,
}

impl Record for IrMessage {
    const DATA_TYPE: DataType = DataType::IrMessage;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.ir_data);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            ir_data: buf.get_u32_le(),
        })
    }
}

/// Raw accelerometer and gyro readings with the fused angles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Imu {
    pub accel_x: i16,
    pub accel_y: i16,
    pub accel_z: i16,
    pub gyro_roll: i16,
    pub gyro_pitch: i16,
    pub gyro_yaw: i16,
    pub angle_roll: i16,
    pub angle_pitch: i16,
    pub angle_yaw: i16,
}

impl Record for Imu {
    const DATA_TYPE: DataType = DataType::Imu;

    fn encode(&self, buf: &mut BytesMut) {
        for value in [
            self.accel_x,
            self.accel_y,
            self.accel_z,
            self.gyro_roll,
            self.gyro_pitch,
            self.gyro_yaw,
            self.angle_roll,
            self.angle_pitch,
            self.angle_yaw,
        ] {
            buf.put_i16_le(value);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            accel_x: buf.get_i16_le(),
            accel_y: buf.get_i16_le(),
            accel_z: buf.get_i16_le(),
            gyro_roll: buf.get_i16_le(),
            gyro_pitch: buf.get_i16_le(),
            gyro_yaw: buf.get_i16_le(),
            angle_roll: buf.get_i16_le(),
            angle_pitch: buf.get_i16_le(),
            angle_yaw: buf.get_i16_le(),
        })
    }
}

/// Barometer readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Pressure {
    pub d1: i32,
    pub d2: i32,
    pub temperature: i32,
    pub pressure: i32,
}

impl Record for Pressure {
    const DATA_TYPE: DataType = DataType::Pressure;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.d1);
        buf.put_i32_le(self.d2);
        buf.put_i32_le(self.temperature);
        buf.put_i32_le(self.pressure);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            d1: buf.get_i32_le(),
            d2: buf.get_i32_le(),
            temperature: buf.get_i32_le(),
            pressure: buf.get_i32_le(),
        })
    }
}

/// Optical flow position estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImageFlow {
    pub position_x: i32,
    pub position_y: i32,
}

impl Record for ImageFlow {
    const DATA_TYPE: DataType = DataType::ImageFlow;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.position_x);
        buf.put_i32_le(self.position_y);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            position_x: buf.get_i32_le(),
            position_y: buf.get_i32_le(),
        })
    }
}

/// Battery calibration and level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Battery {
    pub v30: i16,
    pub v33: i16,
    pub gradient: i16,
    pub y_intercept: i16,
    pub calibrated: bool,
    pub raw: i32,
    /// Remaining charge in percent
    pub percent: i8,
    /// Voltage in millivolts
    pub voltage: i16,
}

impl Record for Battery {
    const DATA_TYPE: DataType = DataType::Battery;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i16_le(self.v30);
        buf.put_i16_le(self.v33);
        buf.put_i16_le(self.gradient);
        buf.put_i16_le(self.y_intercept);
        buf.put_u8(self.calibrated as u8);
        buf.put_i32_le(self.raw);
        buf.put_i8(self.percent);
        buf.put_i16_le(self.voltage);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            v30: buf.get_i16_le(),
            v33: buf.get_i16_le(),
            gradient: buf.get_i16_le(),
            y_intercept: buf.get_i16_le(),
            calibrated: buf.get_u8() != 0,
            raw: buf.get_i32_le(),
            percent: buf.get_i8(),
            voltage: buf.get_i16_le(),
        })
    }
}

/// Forward/reverse power of one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MotorSpeed {
    pub forward: i16,
    pub reverse: i16,
}

/// Direct motor power, four motors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Motor {
    pub motors: [MotorSpeed; 4],
}

impl Record for Motor {
    const DATA_TYPE: DataType = DataType::Motor;

    fn encode(&self, buf: &mut BytesMut) {
        for motor in &self.motors {
            buf.put_i16_le(motor.forward);
            buf.put_i16_le(motor.reverse);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut motors = [MotorSpeed::default(); 4];
        for motor in motors.iter_mut() {
            motor.forward = buf.get_i16_le();
            motor.reverse = buf.get_i16_le();
        }
        Ok(Self { motors })
    }
}

/// Distance sensors in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Range {
    pub left: u16,
    pub front: u16,
    pub right: u16,
    pub rear: u16,
    pub top: u16,
    pub bottom: u16,
}

impl Record for Range {
    const DATA_TYPE: DataType = DataType::Range;

    fn encode(&self, buf: &mut BytesMut) {
        for value in [self.left, self.front, self.right, self.rear, self.top, self.bottom] {
            buf.put_u16_le(value);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            left: buf.get_u16_le(),
            front: buf.get_u16_le(),
            right: buf.get_u16_le(),
            rear: buf.get_u16_le(),
            top: buf.get_u16_le(),
            bottom: buf.get_u16_le(),
        })
    }
}

/// Link dongle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkState {
    pub state: u8,
    pub broadcast: ModeLinkBroadcast,
}

impl Record for LinkState {
    const DATA_TYPE: DataType = DataType::LinkState;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.state);
        buf.put_u8(self.broadcast.into());
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            state: buf.get_u8(),
            broadcast: wire_field(buf, Self::DATA_TYPE, "broadcast")?,
        })
    }
}

/// Link-layer event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkEvent {
    pub event: EventLink,
    pub result: u8,
}

impl Record for LinkEvent {
    const DATA_TYPE: DataType = DataType::LinkEvent;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.event.into());
        buf.put_u8(self.result);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            event: wire_field(buf, Self::DATA_TYPE, "event")?,
            result: buf.get_u8(),
        })
    }
}

/// Link-layer event about a specific peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkEventAddress {
    pub event: EventLink,
    pub result: u8,
    pub address: [u8; 6],
}

impl Record for LinkEventAddress {
    const DATA_TYPE: DataType = DataType::LinkEventAddress;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.event.into());
        buf.put_u8(self.result);
        buf.put_slice(&self.address);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            event: wire_field(buf, Self::DATA_TYPE, "event")?,
            result: buf.get_u8(),
            address: get_array(buf),
        })
    }
}

/// Signal strength of the connected drone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkRssi {
    pub rssi: i8,
}

impl Record for LinkRssi {
    const DATA_TYPE: DataType = DataType::LinkRssi;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i8(self.rssi);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            rssi: buf.get_i8(),
        })
    }
}

/// A drone found during a discovery scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkDiscoveredDevice {
    /// Index to pass to `LinkConnect`
    pub index: u8,
    pub address: [u8; 6],
    /// NUL-padded device name
    pub name: [u8; 20],
    pub rssi: i8,
}

impl LinkDiscoveredDevice {
    /// Device name up to the first NUL
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl Record for LinkDiscoveredDevice {
    const DATA_TYPE: DataType = DataType::LinkDiscoveredDevice;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.index);
        buf.put_slice(&self.address);
        buf.put_slice(&self.name);
        buf.put_i8(self.rssi);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            index: buf.get_u8(),
            address: get_array(buf),
            name: get_array(buf),
            rssi: buf.get_i8(),
        })
    }
}

/// Builds [`Payload`] from the record list.
///
/// Each record struct, its `Payload` variant and its `DataType` variant share
/// one name.
macro_rules! payloads {
    ( $( $record:ident ),+ $(,)? ) => {
        /// Any payload record
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum Payload {
            $( $record($record), )+
        }

        impl Payload {
            /// Data type this payload is sent and received as
            pub fn data_type(&self) -> DataType {
                match self {
                    $( Payload::$record(_) => DataType::$record, )+
                }
            }

            fn encode_record(&self, buf: &mut BytesMut) {
                match self {
                    $( Payload::$record(record) => record.encode(buf), )+
                }
            }

            fn decode_record(data_type: DataType, buf: &mut &[u8]) -> Result<Self, DecodeError> {
                match data_type {
                    $( DataType::$record => $record::decode(buf).map(Payload::$record), )+
                }
            }
        }

        $(
            impl From<$record> for Payload {
                fn from(record: $record) -> Self {
                    Payload::$record(record)
                }
            }

            impl TryFrom<Payload> for $record {
                type Error = Payload;

                fn try_from(payload: Payload) -> Result<Self, Payload> {
                    match payload {
                        Payload::$record(record) => Ok(record),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

payloads! {
    Ping,
    Ack,
    Request,
    Control,
    Command,
    LightMode,
    LightModeColor,
    LightEvent,
    LightEventColor,
    LightModeDefaultColor,
    Address,
    State,
    Attitude,
    TrimFlight,
    TrimDrive,
    IrMessage,
    Imu,
    Pressure,
    ImageFlow,
    Battery,
    Motor,
    Range,
    LinkState,
    LinkEvent,
    LinkEventAddress,
    LinkRssi,
    LinkDiscoveredDevice,
}

impl Header {
    /// Header describing `payload`
    pub fn for_payload(payload: &Payload) -> Self {
        Self::new(payload.data_type())
    }
}

impl Payload {
    /// Encoded size in bytes
    pub fn size(&self) -> u8 {
        self.data_type().payload_size()
    }

    /// Append the wire bytes to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        self.encode_record(buf);
    }

    /// Parse a payload of `data_type` from exactly its declared size
    pub fn parse(data_type: DataType, bytes: &[u8]) -> Result<Self, DecodeError> {
        let expected = data_type.payload_size();
        if bytes.len() != expected as usize {
            return Err(DecodeError::LengthMismatch {
                data_type,
                declared: bytes.len(),
                expected,
            });
        }

        let mut buf = bytes;
        Self::decode_record(data_type, &mut buf)
    }
}

/// One sample payload per data type
#[cfg(test)]
pub(crate) fn samples() -> Vec<Payload> {
    let mut name = [0u8; 20];
    name[..15].copy_from_slice(b"PETRONE_8A2F001");

    vec![
        Ping { system_time: 0x0102_0304_0506_0708 }.into(),
        Ack { system_time: 42, data_type: 0x31, crc16: 0xBEEF }.into(),
        Request { data_type: DataType::Battery }.into(),
        Control::new(10, -5, 0, 50).into(),
        Command::new(CommandType::FlightEvent, FlightEvent::TakeOff.into()).into(),
        LightMode { mode: 0x43, colors: 7, interval: 100 }.into(),
        LightModeColor { mode: 0x43, color: Rgb::new(255, 0, 128), interval: 50 }.into(),
        LightEvent { event: 0x11, colors: 3, interval: 20, repeat: 2 }.into(),
        LightEventColor { event: 0x11, color: Rgb::new(1, 2, 3), interval: 20, repeat: 4 }.into(),
        LightModeDefaultColor { mode: 0x21, color: Rgb::new(0, 255, 0), interval: 10 }.into(),
        Address { address: [0xA0, 0xB1, 0xC2, 0xD3, 0xE4, 0xF5] }.into(),
        State {
            mode_vehicle: ModeVehicle::FlightGuard,
            mode_system: 4,
            mode_flight: ModeFlight::Flight,
            mode_drive: 0,
            sensor_orientation: SensorOrientation::Normal,
            coordinate: 1,
            battery: 87,
        }
        .into(),
        Attitude { roll: -12, pitch: 7, yaw: -179 }.into(),
        TrimFlight { roll: 1, pitch: -2, yaw: 3, throttle: -4 }.into(),
        TrimDrive { wheel: -300 }.into(),
        IrMessage { ir_data: 0xDEAD_BEEF }.into(),
        Imu {
            accel_x: 1,
            accel_y: -2,
            accel_z: 1000,
            gyro_roll: 4,
            gyro_pitch: -5,
            gyro_yaw: 6,
            angle_roll: -7,
            angle_pitch: 8,
            angle_yaw: -90,
        }
        .into(),
        Pressure { d1: 1, d2: -2, temperature: 2512, pressure: 101_325 }.into(),
        ImageFlow { position_x: -150, position_y: 320 }.into(),
        Battery {
            v30: 3000,
            v33: 3300,
            gradient: -12,
            y_intercept: 77,
            calibrated: true,
            raw: 123_456,
            percent: 64,
            voltage: 3812,
        }
        .into(),
        Motor {
            motors: [
                MotorSpeed { forward: 100, reverse: 0 },
                MotorSpeed { forward: 0, reverse: 200 },
                MotorSpeed { forward: -1, reverse: 1 },
                MotorSpeed { forward: 4095, reverse: -4095 },
            ],
        }
        .into(),
        Range { left: 1, front: 2, right: 3, rear: 4, top: 5, bottom: 640 }.into(),
        LinkState { state: 2, broadcast: ModeLinkBroadcast::Passive }.into(),
        LinkEvent { event: EventLink::Connected, result: 0 }.into(),
        LinkEventAddress { event: EventLink::Disconnected, result: 1, address: [1, 2, 3, 4, 5, 6] }.into(),
        LinkRssi { rssi: -61 }.into(),
        LinkDiscoveredDevice { index: 2, address: [9, 8, 7, 6, 5, 4], name, rssi: -48 }.into(),
    ]
}

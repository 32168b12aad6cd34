//! # Protocol Constants and Types
//!
//! Core protocol definitions for the CoDrone link: sync bytes, the packet
//! header, the closed set of data types and the enumerated field values
//! carried inside payloads.

use serde::Serialize;

/// First frame sync byte
pub const SYNC_BYTE_1: u8 = 0x0A;

/// Second frame sync byte
pub const SYNC_BYTE_2: u8 = 0x55;

/// Header size on the wire: data type (1) + length (1)
pub const HEADER_SIZE: usize = 2;

/// CRC16 trailer size
pub const CRC_SIZE: usize = 2;

/// Bytes a frame adds around its payload: sync(2) + header(2) + crc(2)
pub const FRAME_OVERHEAD: usize = 2 + HEADER_SIZE + CRC_SIZE;

/// Largest possible frame (payload length is a single byte)
pub const MAX_FRAME_SIZE: usize = FRAME_OVERHEAD + u8::MAX as usize;

/// Declares a `#[repr(u8)]` wire enum together with its byte conversions.
///
/// `TryFrom<u8>` hands the unknown byte back as the error.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> std::result::Result<Self, u8> {
                match value {
                    $( v if v == $value => Ok(Self::$variant), )+
                    other => Err(other),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

wire_enum! {
    /// Packet data type, the first header byte
    pub enum DataType {
        Ping = 0x01,
        Ack = 0x02,
        Request = 0x04,
        Control = 0x10,
        Command = 0x11,
        LightMode = 0x20,
        LightModeColor = 0x24,
        LightEvent = 0x26,
        LightEventColor = 0x29,
        LightModeDefaultColor = 0x2B,
        Address = 0x30,
        State = 0x31,
        Attitude = 0x32,
        TrimFlight = 0x35,
        TrimDrive = 0x36,
        IrMessage = 0x40,
        Imu = 0x50,
        Pressure = 0x51,
        ImageFlow = 0x52,
        Battery = 0x54,
        Motor = 0x55,
        Range = 0x57,
        LinkState = 0xE0,
        LinkEvent = 0xE1,
        LinkEventAddress = 0xE2,
        LinkRssi = 0xE3,
        LinkDiscoveredDevice = 0xE4,
    }
}

impl DataType {
    /// Every data type, in wire-value order
    pub const ALL: [DataType; 27] = [
        DataType::Ping,
        DataType::Ack,
        DataType::Request,
        DataType::Control,
        DataType::Command,
        DataType::LightMode,
        DataType::LightModeColor,
        DataType::LightEvent,
        DataType::LightEventColor,
        DataType::LightModeDefaultColor,
        DataType::Address,
        DataType::State,
        DataType::Attitude,
        DataType::TrimFlight,
        DataType::TrimDrive,
        DataType::IrMessage,
        DataType::Imu,
        DataType::Pressure,
        DataType::ImageFlow,
        DataType::Battery,
        DataType::Motor,
        DataType::Range,
        DataType::LinkState,
        DataType::LinkEvent,
        DataType::LinkEventAddress,
        DataType::LinkRssi,
        DataType::LinkDiscoveredDevice,
    ];

    /// Fixed payload size for this data type
    ///
    /// Used to fill `Header::length` when sending and to tell the decoder how
    /// many payload bytes follow a header.
    pub const fn payload_size(self) -> u8 {
        match self {
            DataType::Ping => 8,
            DataType::Ack => 11,
            DataType::Request => 1,
            DataType::Control => 4,
            DataType::Command => 2,
            DataType::LightMode => 3,
            DataType::LightModeColor => 5,
            DataType::LightEvent => 4,
            DataType::LightEventColor => 6,
            DataType::LightModeDefaultColor => 5,
            DataType::Address => 6,
            DataType::State => 7,
            DataType::Attitude => 6,
            DataType::TrimFlight => 8,
            DataType::TrimDrive => 2,
            DataType::IrMessage => 4,
            DataType::Imu => 18,
            DataType::Pressure => 16,
            DataType::ImageFlow => 8,
            DataType::Battery => 16,
            DataType::Motor => 16,
            DataType::Range => 12,
            DataType::LinkState => 2,
            DataType::LinkEvent => 2,
            DataType::LinkEventAddress => 8,
            DataType::LinkRssi => 1,
            DataType::LinkDiscoveredDevice => 28,
        }
    }
}

/// Packet header: identifies the payload type and its encoded size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    /// Payload data type
    pub data_type: DataType,

    /// Payload length in bytes
    pub length: u8,
}

impl Header {
    /// Header for a payload of `data_type`, with its declared size
    pub const fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            length: data_type.payload_size(),
        }
    }

    /// Wire representation
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        [self.data_type.into(), self.length]
    }
}

wire_enum! {
    /// Command type carried by `Command` payloads
    pub enum CommandType {
        ModeVehicle = 0x10,
        Headless = 0x11,
        Trim = 0x12,
        ClearGyroBias = 0x13,
        ClearTrim = 0x14,
        FlightEvent = 0x22,
        DriveEvent = 0x23,
        Stop = 0x24,
        ResetHeading = 0x50,
        ClearGyroBiasAndTrim = 0x51,
        PairingActivate = 0x80,
        PairingDeactivate = 0x81,
        TerminateConnection = 0x82,
        Request = 0x90,
        LinkModeBroadcast = 0xE0,
        LinkSystemReset = 0xE1,
        LinkDiscoverStart = 0xE2,
        LinkDiscoverStop = 0xE3,
        LinkConnect = 0xE4,
        LinkDisconnect = 0xE5,
        LinkRssiPollingStart = 0xE6,
        LinkRssiPollingStop = 0xE7,
    }
}

wire_enum! {
    /// Vehicle operating mode
    pub enum ModeVehicle {
        Unset = 0x00,
        FlightGuard = 0x10,
        FlightNoGuard = 0x11,
        FlightFpv = 0x12,
        Drive = 0x20,
        DriveFpv = 0x21,
        Test = 0x30,
    }
}

wire_enum! {
    /// Flight state reported in `State` packets
    pub enum ModeFlight {
        Unset = 0x00,
        Ready = 0x10,
        TakeOff = 0x11,
        Flight = 0x12,
        Flip = 0x13,
        Stop = 0x14,
        Landing = 0x15,
        Reverse = 0x16,
        Accident = 0x17,
        Error = 0x18,
    }
}

wire_enum! {
    /// Which way up the sensor board is
    pub enum SensorOrientation {
        Unset = 0x00,
        Normal = 0x01,
        ReverseStart = 0x02,
        Reverse = 0x03,
    }
}

wire_enum! {
    /// Headless (heading-independent) control mode
    pub enum Headless {
        Unset = 0x00,
        Headless = 0x01,
        Normal = 0x02,
    }
}

wire_enum! {
    /// Option byte of `CommandType::FlightEvent`
    pub enum FlightEvent {
        Unset = 0x00,
        TakeOff = 0x01,
        FlipFront = 0x02,
        FlipRear = 0x03,
        FlipLeft = 0x04,
        FlipRight = 0x05,
        Stop = 0x06,
        Landing = 0x07,
        TurnOver = 0x08,
        Shot = 0x09,
        UnderAttack = 0x0A,
        Square = 0x0B,
        CircleLeft = 0x0C,
        CircleRight = 0x0D,
        Rotate180 = 0x0E,
    }
}

wire_enum! {
    /// How the link dongle reports traffic to the host
    pub enum ModeLinkBroadcast {
        Unset = 0x00,
        Mute = 0x01,
        Active = 0x02,
        Passive = 0x03,
    }
}

wire_enum! {
    /// Link-layer event reported by the dongle
    pub enum EventLink {
        Unset = 0x00,
        SystemReset = 0x01,
        Initialized = 0x02,
        Scanning = 0x03,
        ScanStop = 0x04,
        FoundDroneService = 0x05,
        Connecting = 0x06,
        Connected = 0x07,
        ConnectionFailed = 0x08,
        ConnectionFailedNoDevices = 0x09,
        ConnectionFailedNotReady = 0x0A,
        PairingStart = 0x0B,
        PairingSuccess = 0x0C,
        PairingFailed = 0x0D,
        BondingSuccess = 0x0E,
        LookupAttribute = 0x0F,
        RssiPollingStart = 0x10,
        RssiPollingStop = 0x11,
        DiscoverService = 0x12,
        DiscoverCharacteristic = 0x13,
        DiscoverCharacteristicDroneData = 0x14,
        DiscoverCharacteristicDroneConfig = 0x15,
        DiscoverCharacteristicUnknown = 0x16,
        DiscoverCccd = 0x17,
        ReadyToControl = 0x18,
        Disconnecting = 0x19,
        Disconnected = 0x1A,
        GapLinkParamUpdate = 0x1B,
        RspReadError = 0x1C,
        RspReadSuccess = 0x1D,
        RspWriteError = 0x1E,
        RspWriteSuccess = 0x1F,
        SetNotify = 0x20,
        Write = 0x21,
    }
}

//! Latest packet per data type, with arrival counters

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::time::Instant;

use super::lock;
use crate::packet::decoder::DecodedPacket;
use crate::packet::payload::{Payload, Record};
use crate::packet::protocol::{DataType, Header};

/// Last packet received for one data type
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub header: Header,
    pub payload: Payload,
    /// Packets of this type decoded so far
    pub count: u64,
    pub received_at: Instant,
}

/// One slot per data type behind a single lock, so header, payload and
/// count are always read as a consistent set
#[derive(Debug, Default)]
pub struct Storage {
    slots: Mutex<HashMap<DataType, Slot>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a decoded packet and return the new count for its type
    pub fn record(&self, packet: &DecodedPacket) -> u64 {
        let mut slots = lock(&self.slots);
        let data_type = packet.header.data_type;
        let count = slots.get(&data_type).map_or(0, |slot| slot.count) + 1;

        slots.insert(
            data_type,
            Slot {
                header: packet.header,
                payload: packet.payload.clone(),
                count,
                received_at: packet.received_at,
            },
        );
        count
    }

    pub fn slot(&self, data_type: DataType) -> Option<Slot> {
        lock(&self.slots).get(&data_type).cloned()
    }

    pub fn count(&self, data_type: DataType) -> u64 {
        lock(&self.slots).get(&data_type).map_or(0, |slot| slot.count)
    }

    pub fn header(&self, data_type: DataType) -> Option<Header> {
        lock(&self.slots).get(&data_type).map(|slot| slot.header)
    }

    pub fn payload(&self, data_type: DataType) -> Option<Payload> {
        lock(&self.slots).get(&data_type).map(|slot| slot.payload.clone())
    }

    pub fn received_at(&self, data_type: DataType) -> Option<Instant> {
        lock(&self.slots).get(&data_type).map(|slot| slot.received_at)
    }

    /// Latest record of type `T`
    pub fn latest<T>(&self) -> Option<T>
    where
        T: Record + TryFrom<Payload>,
    {
        self.payload(T::DATA_TYPE)
            .and_then(|payload| T::try_from(payload).ok())
    }
}

//! Distributed fan-out bridge and table ownership.
//!
//! Every externally visible state transition is published on a named channel
//! as a bincode payload. Subscribers (the transport edge on each process)
//! forward payloads to the right room or user channel; they never re-derive
//! engine state. The bridge is also the only path by which cross-seat power
//! delivery travels, so seats simulated on different processes stay correct.

use log::debug;
use shared::{channels, FanoutEvent, TableId};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

pub struct FanoutBridge {
    senders: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl FanoutBridge {
    pub fn new() -> Self {
        let mut senders = HashMap::new();
        for name in channels::ALL {
            let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            senders.insert(name.to_string(), tx);
        }
        Self {
            senders: Mutex::new(senders),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        let mut senders = match self.senders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        senders
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Serializes the event's payload and fans it out on the event's channel.
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: &FanoutEvent) -> bincode::Result<usize> {
        let bytes = event.encode()?;
        let sender = self.sender(event.channel());
        let delivered = sender.send(bytes).unwrap_or(0);
        debug!(
            "published {} to {} subscriber(s)",
            event.channel(),
            delivered
        );
        Ok(delivered)
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Vec<u8>> {
        self.sender(channel).subscribe()
    }
}

impl Default for FanoutBridge {
    fn default() -> Self {
        Self::new()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Decides which process owns a table's authoritative state.
///
/// Rendezvous hashing: every process scores `(table, candidate)` and the
/// highest score wins, so all processes agree on a single owner without any
/// coordination. Only the owner runs the table's runtime and applies
/// power-used events arriving over the bridge; everyone else just forwards
/// observations to their local audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableAffinity {
    pub process_id: u32,
    pub process_count: u32,
}

impl TableAffinity {
    pub fn new(process_id: u32, process_count: u32) -> Self {
        Self {
            process_id,
            process_count: process_count.max(1),
        }
    }

    pub fn single_process() -> Self {
        Self::new(0, 1)
    }

    fn score(table: TableId, process: u32) -> u64 {
        let mut bytes = [0u8; 12];
        bytes[..8].copy_from_slice(&table.to_le_bytes());
        bytes[8..].copy_from_slice(&process.to_le_bytes());
        fnv1a(&bytes)
    }

    pub fn owner_of(&self, table: TableId) -> u32 {
        (0..self.process_count)
            .max_by_key(|&process| Self::score(table, process))
            .unwrap_or(0)
    }

    pub fn owns(&self, table: TableId) -> bool {
        self.owner_of(table) == self.process_id
    }
}

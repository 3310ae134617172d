// MIT License - Copyright (c) 2026 Peter Wright
// Partition state and event history

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::buffer::EvictingBuffer;
use crate::event::serialize_timestamp;

/// Overall state of a partition as last reported by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionState {
    Alarm,
    Ready,
    NotReady,
    Busy,
    Armed,
    Disarmed,
    #[default]
    Unknown,
}

impl PartitionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Alarm => "ALARM",
            Self::Ready => "READY",
            Self::NotReady => "NOTREADY",
            Self::Busy => "BUSY",
            Self::Armed => "ARMED",
            Self::Disarmed => "DISARMED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Arming mode carried by the second digit of a `652` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ArmMode {
    #[serde(rename = "AWAYARMED")]
    AwayArmed,
    #[serde(rename = "STAYARMED")]
    StayArmed,
    #[serde(rename = "ZERO_ENTRY_AWAY")]
    ZeroEntryAway,
    #[serde(rename = "ZERO_ENTRY_STAY")]
    ZeroEntryStay,
    #[default]
    #[serde(rename = "NONE")]
    None,
}

impl ArmMode {
    /// Map the panel's mode index (0-3). Anything else is not a known mode.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::AwayArmed),
            1 => Some(Self::StayArmed),
            2 => Some(Self::ZeroEntryAway),
            3 => Some(Self::ZeroEntryStay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PartitionDelay {
    #[default]
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "EXITDELAY")]
    Exit,
    #[serde(rename = "ENTRYDELAY")]
    Entry,
}

impl PartitionDelay {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Exit => "EXITDELAY",
            Self::Entry => "ENTRYDELAY",
        }
    }
}

/// One entry of a partition's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionEvent {
    #[serde(serialize_with = "serialize_timestamp")]
    pub ts: DateTime<Local>,
    pub msg: String,
}

/// Snapshot of a single alarm partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub id: u8,
    pub state: PartitionState,
    pub arm: ArmMode,
    pub delay: PartitionDelay,
    pub keypad_lockout: bool,
    pub installer_mode: bool,
    pub trouble: bool,
    /// Event history, oldest first
    #[serde(skip)]
    pub events: Vec<PartitionEvent>,
}

impl Partition {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            state: PartitionState::Unknown,
            arm: ArmMode::None,
            delay: PartitionDelay::None,
            keypad_lockout: false,
            installer_mode: false,
            trouble: false,
            events: Vec::new(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Live partition owned by the panel update task.
#[derive(Debug)]
pub(crate) struct PartitionRecord {
    pub(crate) partition: Partition,
    pub(crate) events: EvictingBuffer<PartitionEvent>,
}

impl PartitionRecord {
    pub(crate) fn new(id: u8, event_capacity: usize) -> Self {
        Self {
            partition: Partition::new(id),
            events: EvictingBuffer::new(event_capacity),
        }
    }

    pub(crate) fn log_event(&mut self, msg: impl Into<String>) {
        self.events.push(PartitionEvent {
            ts: Local::now(),
            msg: msg.into(),
        });
    }

    pub(crate) fn snapshot(&self) -> Partition {
        Partition {
            events: self.events.to_vec(),
            ..self.partition.clone()
        }
    }
}

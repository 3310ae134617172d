// MIT License - Copyright (c) 2026 Peter Wright
// Panel entity model

pub mod keypad;
pub mod partition;
pub mod zone;

pub use keypad::{KeypadLedStates, KeypadLeds, LedState};
pub use partition::{ArmMode, Partition, PartitionDelay, PartitionEvent, PartitionState};
pub use zone::{AlarmState, FaultState, TamperState, Zone, ZoneState};

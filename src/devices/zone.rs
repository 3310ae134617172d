// MIT License - Copyright (c) 2026 Peter Wright
// Zone state

use serde::Serialize;

/// General open/closed state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZoneState {
    Closed,
    Open,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmState {
    Normal,
    Alarm,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TamperState {
    Normal,
    Tamper,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaultState {
    Normal,
    Fault,
    #[default]
    Unknown,
}

/// A single alarm zone.
///
/// Every field starts out unknown; the panel fills them in as it reports
/// changes or answers a status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub id: u16,
    pub state: ZoneState,
    pub alarm: AlarmState,
    pub tamper: TamperState,
    pub fault: FaultState,
    /// Partition reported with the last alarm/tamper event, if any
    pub partition: Option<u8>,
}

impl Zone {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            state: ZoneState::Unknown,
            alarm: AlarmState::Unknown,
            tamper: TamperState::Unknown,
            fault: FaultState::Unknown,
            partition: None,
        }
    }

    /// Fault, tamper or alarm is active.
    pub fn has_problem(&self) -> bool {
        self.fault == FaultState::Fault
            || self.tamper == TamperState::Tamper
            || self.alarm == AlarmState::Alarm
    }

    pub fn is_open(&self) -> bool {
        self.state == ZoneState::Open
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zone_is_unknown() {
        let zone = Zone::new(12);
        assert_eq!(zone.state, ZoneState::Unknown);
        assert_eq!(zone.alarm, AlarmState::Unknown);
        assert!(!zone.has_problem());
        assert!(!zone.is_open());
    }

    #[test]
    fn test_has_problem() {
        let mut zone = Zone::new(1);
        zone.tamper = TamperState::Tamper;
        assert!(zone.has_problem());
        zone.tamper = TamperState::Normal;
        zone.fault = FaultState::Fault;
        assert!(zone.has_problem());
        zone.fault = FaultState::Normal;
        zone.alarm = AlarmState::Alarm;
        assert!(zone.has_problem());
        zone.alarm = AlarmState::Normal;
        assert!(!zone.has_problem());
    }

    #[test]
    fn test_zone_json() {
        let mut zone = Zone::new(5);
        zone.state = ZoneState::Open;
        zone.partition = Some(1);
        let value: serde_json::Value = serde_json::from_str(&zone.to_json()).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["state"], "OPEN");
        assert_eq!(value["alarm"], "UNKNOWN");
        assert_eq!(value["tamper"], "UNKNOWN");
        assert_eq!(value["fault"], "UNKNOWN");
        assert_eq!(value["partition"], 1);
    }
}

// MIT License - Copyright (c) 2026 Peter Wright
// Keypad LED bitmap

use bitflags::bitflags;
use serde::ser::{Serialize, SerializeMap, Serializer};

bitflags! {
    /// Keypad LED bitmap carried by `510` (steady) and `511` (flashing).
    ///
    /// Two hex digits, bit 0 is READY and bit 7 is BACKLIGHT.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeypadLeds: u8 {
        const READY     = 0b0000_0001;
        const ARMED     = 0b0000_0010;
        const MEMORY    = 0b0000_0100;
        const BYPASS    = 0b0000_1000;
        const TROUBLE   = 0b0001_0000;
        const PROGRAM   = 0b0010_0000;
        const FIRE      = 0b0100_0000;
        const BACKLIGHT = 0b1000_0000;
    }
}

/// LED names in bit order.
pub const LED_NAMES: [(&str, KeypadLeds); 8] = [
    ("READY", KeypadLeds::READY),
    ("ARMED", KeypadLeds::ARMED),
    ("MEMORY", KeypadLeds::MEMORY),
    ("BYPASS", KeypadLeds::BYPASS),
    ("TROUBLE", KeypadLeds::TROUBLE),
    ("PROGRAM", KeypadLeds::PROGRAM),
    ("FIRE", KeypadLeds::FIRE),
    ("BACKLIGHT", KeypadLeds::BACKLIGHT),
];

impl KeypadLeds {
    /// Parse the leading two hex digits of a `510`/`511` payload.
    pub fn from_hex(data: &str) -> Option<Self> {
        let digits = data.get(0..2)?;
        u8::from_str_radix(digits, 16).ok().map(Self::from_bits_retain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedState {
    Off,
    On,
    Flash,
    #[default]
    Unknown,
}

/// State of all eight keypad LEDs.
///
/// Serializes as a JSON object keyed by LED name in bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeypadLedStates {
    states: [LedState; 8],
}

impl KeypadLedStates {
    /// Apply a bitmap: set bits become ON (or FLASH), clear bits OFF.
    pub fn apply(&mut self, bitmap: KeypadLeds, flashing: bool) {
        let lit = if flashing { LedState::Flash } else { LedState::On };
        for (i, (_, led)) in LED_NAMES.iter().enumerate() {
            self.states[i] = if bitmap.contains(*led) { lit } else { LedState::Off };
        }
    }

    /// State of one LED by name, case-insensitive.
    pub fn get(&self, name: &str) -> Option<LedState> {
        LED_NAMES
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|i| self.states[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, LedState)> + '_ {
        LED_NAMES.iter().zip(self.states.iter()).map(|((n, _), s)| (*n, *s))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for KeypadLedStates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(LED_NAMES.len()))?;
        for (name, state) in self.iter() {
            map.serialize_entry(name, &state)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        assert_eq!(KeypadLeds::from_hex("81"), Some(KeypadLeds::READY | KeypadLeds::BACKLIGHT));
        assert_eq!(KeypadLeds::from_hex("00"), Some(KeypadLeds::empty()));
        assert_eq!(KeypadLeds::from_hex("8"), None);
        assert_eq!(KeypadLeds::from_hex("zz"), None);
    }

    #[test]
    fn test_apply_steady_and_flash() {
        let mut leds = KeypadLedStates::default();
        assert_eq!(leds.get("READY"), Some(LedState::Unknown));

        leds.apply(KeypadLeds::READY | KeypadLeds::BACKLIGHT, false);
        assert_eq!(leds.get("ready"), Some(LedState::On));
        assert_eq!(leds.get("BACKLIGHT"), Some(LedState::On));
        assert_eq!(leds.get("ARMED"), Some(LedState::Off));

        leds.apply(KeypadLeds::TROUBLE, true);
        assert_eq!(leds.get("TROUBLE"), Some(LedState::Flash));
        assert_eq!(leds.get("READY"), Some(LedState::Off));
        assert_eq!(leds.get("SIREN"), None);
    }

    #[test]
    fn test_json_order() {
        let mut leds = KeypadLedStates::default();
        leds.apply(KeypadLeds::READY, false);
        let json = leds.to_json();
        assert!(json.starts_with("{\"READY\":\"ON\",\"ARMED\":\"OFF\""));
        assert!(json.ends_with("\"BACKLIGHT\":\"OFF\"}"));
    }
}

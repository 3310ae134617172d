// MIT License - Copyright (c) 2026 Peter Wright
// Error types and the TPI system error table

use std::fmt;

use crate::protocol::Packet;

/// System error sub-codes carried by a `502` packet.
///
/// Codes below 20 are keybus/buffer conditions reported for information only.
/// Codes 20 and above are API errors and reject the command that caused them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemErrorCode {
    /// 000 - No Error
    NoError,
    /// 001 - Receive Buffer Overrun
    ReceiveBufferOverrun,
    /// 002 - Receive Buffer Overflow
    ReceiveBufferOverflow,
    /// 003 - Transmit Buffer Overflow
    TransmitBufferOverflow,
    /// 010 - Keybus Transmit Buffer Overrun
    KeybusTransmitBufferOverrun,
    /// 011 - Keybus Transmit Time Timeout
    KeybusTransmitTimeTimeout,
    /// 012 - Keybus Transmit Mode Timeout
    KeybusTransmitModeTimeout,
    /// 013 - Keybus Transmit Keystring Timeout
    KeybusTransmitKeystringTimeout,
    /// 014 - Keybus Interface Not Functioning
    KeybusNotFunctioning,
    /// 015 - Keybus Busy (arming or disarming with a user code)
    KeybusBusy,
    /// 016 - Keybus Busy - Lockout
    KeybusBusyLockout,
    /// 017 - Keybus Busy - Installers Mode
    KeybusBusyInstallersMode,
    /// 018 - Keybus Busy - General Busy
    KeybusBusyGeneral,
    /// 020 - API Command Syntax Error
    ApiSyntaxError,
    /// 021 - API Command Partition Error
    ApiPartitionError,
    /// 022 - API Command Not Supported
    ApiNotSupported,
    /// 023 - API System Not Armed
    ApiSystemNotArmed,
    /// 024 - API System Not Ready to Arm
    ApiNotReadyToArm,
    /// 025 - API Command Invalid Length
    ApiInvalidLength,
    /// 026 - API User Code not Required
    ApiCodeNotRequired,
    /// 027 - API Invalid Characters in Command
    ApiInvalidCharacters,
}

impl SystemErrorCode {
    /// Look up a numeric sub-code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::NoError),
            1 => Some(Self::ReceiveBufferOverrun),
            2 => Some(Self::ReceiveBufferOverflow),
            3 => Some(Self::TransmitBufferOverflow),
            10 => Some(Self::KeybusTransmitBufferOverrun),
            11 => Some(Self::KeybusTransmitTimeTimeout),
            12 => Some(Self::KeybusTransmitModeTimeout),
            13 => Some(Self::KeybusTransmitKeystringTimeout),
            14 => Some(Self::KeybusNotFunctioning),
            15 => Some(Self::KeybusBusy),
            16 => Some(Self::KeybusBusyLockout),
            17 => Some(Self::KeybusBusyInstallersMode),
            18 => Some(Self::KeybusBusyGeneral),
            20 => Some(Self::ApiSyntaxError),
            21 => Some(Self::ApiPartitionError),
            22 => Some(Self::ApiNotSupported),
            23 => Some(Self::ApiSystemNotArmed),
            24 => Some(Self::ApiNotReadyToArm),
            25 => Some(Self::ApiInvalidLength),
            26 => Some(Self::ApiCodeNotRequired),
            27 => Some(Self::ApiInvalidCharacters),
            _ => None,
        }
    }

    /// The numeric sub-code as sent by the panel.
    pub fn code(&self) -> u16 {
        match self {
            Self::NoError => 0,
            Self::ReceiveBufferOverrun => 1,
            Self::ReceiveBufferOverflow => 2,
            Self::TransmitBufferOverflow => 3,
            Self::KeybusTransmitBufferOverrun => 10,
            Self::KeybusTransmitTimeTimeout => 11,
            Self::KeybusTransmitModeTimeout => 12,
            Self::KeybusTransmitKeystringTimeout => 13,
            Self::KeybusNotFunctioning => 14,
            Self::KeybusBusy => 15,
            Self::KeybusBusyLockout => 16,
            Self::KeybusBusyInstallersMode => 17,
            Self::KeybusBusyGeneral => 18,
            Self::ApiSyntaxError => 20,
            Self::ApiPartitionError => 21,
            Self::ApiNotSupported => 22,
            Self::ApiSystemNotArmed => 23,
            Self::ApiNotReadyToArm => 24,
            Self::ApiInvalidLength => 25,
            Self::ApiCodeNotRequired => 26,
            Self::ApiInvalidCharacters => 27,
        }
    }

    /// Human-readable description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NoError => "No Error",
            Self::ReceiveBufferOverrun => {
                "Receive Buffer Overrun (a command is received while another is still being processed)"
            }
            Self::ReceiveBufferOverflow => "Receive Buffer Overflow",
            Self::TransmitBufferOverflow => "Transmit Buffer Overflow",
            Self::KeybusTransmitBufferOverrun => "Keybus Transmit Buffer Overrun",
            Self::KeybusTransmitTimeTimeout => "Keybus Transmit Time Timeout",
            Self::KeybusTransmitModeTimeout => "Keybus Transmit Mode Timeout",
            Self::KeybusTransmitKeystringTimeout => "Keybus Transmit Keystring Timeout",
            Self::KeybusNotFunctioning => {
                "Keybus Interface Not Functioning (the TPI cannot communicate with the security system)"
            }
            Self::KeybusBusy => "Keybus Busy (Attempting to Disarm or Arm with user code)",
            Self::KeybusBusyLockout => {
                "Keybus Busy - Lockout (The panel is currently in Keypad Lockout - too many disarm attempts)"
            }
            Self::KeybusBusyInstallersMode => {
                "Keybus Busy - Installers Mode (Panel is in installers mode, most functions are unavailable)"
            }
            Self::KeybusBusyGeneral => "Keybus Busy - General Busy (The requested partition is busy)",
            Self::ApiSyntaxError => "API Command Syntax Error",
            Self::ApiPartitionError => {
                "API Command Partition Error (Requested Partition is out of bounds)"
            }
            Self::ApiNotSupported => "API Command Not Supported",
            Self::ApiSystemNotArmed => {
                "API System Not Armed (sent in response to a disarm command)"
            }
            Self::ApiNotReadyToArm => {
                "API System Not Ready to Arm (system is either not-secure, in exit-delay, or already armed)"
            }
            Self::ApiInvalidLength => "API Command Invalid Length",
            Self::ApiCodeNotRequired => "API User Code not Required",
            Self::ApiInvalidCharacters => {
                "API Invalid Characters in Command (no alpha characters are allowed except for checksum)"
            }
        }
    }

    /// Whether a `502` carrying this code rejects the command that caused it.
    pub fn is_rejection(&self) -> bool {
        self.code() >= SYSTEM_ERROR_REJECT_THRESHOLD
    }
}

/// Sub-codes at or above this value are API errors.
pub const SYSTEM_ERROR_REJECT_THRESHOLD: u16 = 20;

/// Describe a raw system error sub-code, including ones missing from the table.
pub fn describe_system_error(code: u16) -> &'static str {
    SystemErrorCode::from_code(code)
        .map(|c| c.description())
        .unwrap_or("unknown")
}

impl fmt::Display for SystemErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}: {}", self.code(), self.description())
    }
}

/// Why the panel refused the login password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// `505` data `0`
    IncorrectPassword,
    /// `505` data `2` - no password was sent within 10 seconds
    TimedOut,
    /// `505` data `3` after the password was sent
    NoPassword,
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncorrectPassword => write!(f, "password provided was incorrect"),
            Self::TimedOut => write!(f, "password was not sent within 10 seconds"),
            Self::NoPassword => write!(f, "password not provided"),
        }
    }
}

/// All errors that can occur in the evl-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum EvlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectTimeout,

    #[error("Malformed frame {line:?}: {reason}")]
    Frame { line: String, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Login interaction timed out")]
    LoginTimeout,

    #[error("Login protocol error: {details}")]
    LoginProtocol { details: String },

    #[error("Login failed: {0}")]
    LoginFailed(LoginFailure),

    #[error("Command {packet} received negative ack {reply}{}", .reason.map(|r| format!(" ({r})")).unwrap_or_default())]
    NegativeAck {
        packet: Packet,
        reply: Packet,
        reason: Option<&'static str>,
    },

    #[error("Invalid payload for event {code}: {data:?}")]
    InvalidPayload { code: u16, data: String },

    #[error("No reply completed flow {packet} within {timeout:?}")]
    FlowTimeout { packet: Packet, timeout: std::time::Duration },

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Channel closed")]
    ChannelClosed,
}

impl EvlError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EvlError::Io(_)
                | EvlError::ConnectTimeout
                | EvlError::LoginTimeout
                | EvlError::Disconnected
                | EvlError::ChannelClosed
        )
    }

    pub(crate) fn frame(line: &str, reason: impl Into<String>) -> Self {
        EvlError::Frame {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        EvlError::Validation(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, EvlError>;

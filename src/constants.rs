// MIT License - Copyright (c) 2026 Peter Wright
// TPI protocol constants

use std::time::Duration;

/// Line terminator appended to every outbound frame.
pub const EOT: &str = "\r\n";

/// Default TPI listening port on the interface module.
pub const DEFAULT_PORT: u16 = 4025;

/// How long a send waits for the panel to acknowledge a command.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound for the whole login interaction.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a confirmed send waits for a flow's continuation chain to finish.
pub const FLOW_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest inbound line accepted; anything longer is dropped up to the next newline.
pub const MAX_FRAME_LEN: usize = 1024;

/// Number of event strings retained per partition.
pub const EVENT_LOG_CAPACITY: usize = 100;

/// Capacity of the notification broadcast channel.
pub const NOTIFICATION_CAPACITY: usize = 256;

/// Highest command code representable in three digits.
pub const MAX_COMMAND_CODE: u16 = 999;

/// Command codes sent by the client.
pub mod client {
    pub const POLL: u16 = 0;
    pub const STATUS_REPORT: u16 = 1;
    pub const DUMP_ZONE_TIMERS: u16 = 8;
    pub const NETWORK_LOGIN: u16 = 5;
    pub const SET_DATE_TIME: u16 = 10;
    pub const COMMAND_OUTPUT: u16 = 20;
    pub const AWAY_ARM: u16 = 30;
    pub const STAY_ARM: u16 = 31;
    pub const ARM_NO_ENTRY_DELAY: u16 = 32;
    pub const ARM_WITH_CODE: u16 = 33;
    pub const DISARM: u16 = 40;
    pub const BROADCAST_TIME: u16 = 56;
    pub const BROADCAST_TEMPERATURE: u16 = 57;
    pub const PANIC: u16 = 60;
    pub const SEND_KEY: u16 = 70;
    pub const SEND_KEYS: u16 = 71;
    pub const ACCESS_CODE_PROGRAMMING: u16 = 72;
    pub const USER_FUNCTION_PROGRAMMING: u16 = 73;
    pub const KEEP_ALIVE: u16 = 74;
    pub const HVAC_BROADCAST: u16 = 80;
    pub const CODE_SEND: u16 = 200;
}

/// Acknowledgement and control codes sent by the panel.
pub mod ack {
    pub const COMMAND_ACK: u16 = 500;
    pub const BAD_CHECKSUM: u16 = 501;
    pub const SYSTEM_ERROR: u16 = 502;
    pub const LOGIN_INTERACTION: u16 = 505;
    pub const INVALID_ACCESS_CODE: u16 = 670;
}

/// Panel codes asking the client for an access code.
pub const CODE_REQUIRED: [u16; 4] = [900, 912, 921, 922];

/// Data values of the `505` login interaction packet.
pub mod login {
    pub const INCORRECT_PASSWORD: &str = "0";
    pub const SUCCESS: &str = "1";
    pub const TIMED_OUT: &str = "2";
    pub const PASSWORD_REQUEST: &str = "3";
}

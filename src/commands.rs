// MIT License - Copyright (c) 2026 Peter Wright
// Outbound command builders

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::constants::{client, CODE_REQUIRED};
use crate::error::{EvlError, Result};
use crate::flow::{validate_code, CommandFlow};
use crate::protocol::Packet;

/// Supplies an access code when the panel asks for one.
pub type CodeSupplier = Arc<dyn Fn() -> String + Send + Sync>;

/// Format used by the set date/time command.
pub const DATE_TIME_FORMAT: &str = "%H%M%S%m%d%y";

/// Panic alarm variants for command 060.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicType {
    Fire,
    Ambulance,
    Police,
}

impl PanicType {
    fn wire_digit(&self) -> char {
        match self {
            PanicType::Fire => '1',
            PanicType::Ambulance => '2',
            PanicType::Police => '3',
        }
    }
}

impl std::str::FromStr for PanicType {
    type Err = EvlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fire" => Ok(PanicType::Fire),
            "ambulance" => Ok(PanicType::Ambulance),
            "police" => Ok(PanicType::Police),
            other => Err(EvlError::validation(format!("unknown panic type: {}", other))),
        }
    }
}

/// Single-packet commands that can be sent to the panel.
///
/// # Traffic
///
/// Every command is acknowledged by `500` carrying the command code, or
/// rejected with `501`/`502`/`670`. Commands protected by an access code are
/// not listed here; they are built as flows (see [`away_arm`]) because the
/// panel asks for the code with a `900`-family packet after the command.
#[derive(Debug, Clone)]
pub enum Command {
    /// `000` - Poll.
    Poll,
    /// `001` - Status report; the panel replays every zone and partition state.
    StatusReport,
    /// `008` - Dump zone timers.
    DumpZoneTimers,
    /// `010` - Set panel date and time.
    SetDateTime(NaiveDateTime),
    /// `033` - Arm partition with an access code.
    ArmWithCode { partition: u8, code: String },
    /// `040` - Disarm partition with an access code.
    Disarm { partition: u8, code: String },
    /// `056` - Enable/disable time stamp broadcast.
    BroadcastTime(bool),
    /// `057` - Enable/disable temperature broadcast.
    BroadcastTemperature(bool),
    /// `060` - Trigger a panic alarm.
    Panic(PanicType),
    /// `070` - Send a single keystroke.
    SendKey(char),
    /// `071` - Send up to six keystrokes to a partition.
    SendKeys { partition: u8, keys: String },
    /// `074` - Keep-alive for a partition.
    KeepAlive { partition: u8 },
    /// `080` - Request an HVAC broadcast.
    RequestHvacBroadcast,
    /// `200` - Send an access code in answer to a code request.
    CodeEntry { code: String },
}

/// Largest partition number the panel supports.
pub const MAX_PARTITION: u8 = 8;

/// Keystrokes accepted by a single `071` command.
pub const MAX_KEYS: usize = 6;

fn partition_digit(partition: u8) -> Result<String> {
    if (1..=MAX_PARTITION).contains(&partition) {
        Ok(partition.to_string())
    } else {
        Err(EvlError::validation(format!(
            "partition {} out of range [1-{}]",
            partition, MAX_PARTITION
        )))
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled { "1" } else { "0" }
}

impl Command {
    /// Build the wire packet, validating ids and codes first.
    pub fn to_packet(&self) -> Result<Packet> {
        let packet = match self {
            Command::Poll => Packet::command(client::POLL),
            Command::StatusReport => Packet::command(client::STATUS_REPORT),
            Command::DumpZoneTimers => Packet::command(client::DUMP_ZONE_TIMERS),
            Command::SetDateTime(at) => {
                Packet::with_data(client::SET_DATE_TIME, at.format(DATE_TIME_FORMAT).to_string())
            }
            Command::ArmWithCode { partition, code } => Packet::with_data(
                client::ARM_WITH_CODE,
                format!("{}{}", partition_digit(*partition)?, validate_code(code)?),
            ),
            Command::Disarm { partition, code } => Packet::with_data(
                client::DISARM,
                format!("{}{}", partition_digit(*partition)?, validate_code(code)?),
            ),
            Command::BroadcastTime(enabled) => {
                Packet::with_data(client::BROADCAST_TIME, flag(*enabled))
            }
            Command::BroadcastTemperature(enabled) => {
                Packet::with_data(client::BROADCAST_TEMPERATURE, flag(*enabled))
            }
            Command::Panic(kind) => Packet::with_data(client::PANIC, kind.wire_digit().to_string()),
            Command::SendKey(key) => {
                if !key.is_ascii() || key.is_ascii_control() {
                    return Err(EvlError::validation(format!("invalid key {:?}", key)));
                }
                Packet::with_data(client::SEND_KEY, key.to_string())
            }
            Command::SendKeys { partition, keys } => {
                if keys.is_empty() || !keys.is_ascii() {
                    return Err(EvlError::validation(format!("invalid key sequence {:?}", keys)));
                }
                let capped: String = keys.chars().take(MAX_KEYS).collect();
                Packet::with_data(
                    client::SEND_KEYS,
                    format!("{}{}", partition_digit(*partition)?, capped),
                )
            }
            Command::KeepAlive { partition } => {
                Packet::with_data(client::KEEP_ALIVE, partition_digit(*partition)?)
            }
            Command::RequestHvacBroadcast => Packet::command(client::HVAC_BROADCAST),
            Command::CodeEntry { code } => {
                Packet::with_data(client::CODE_SEND, validate_code(code)?)
            }
        };
        Ok(packet)
    }

    /// Wrap the command in a fire-and-forget flow.
    pub fn to_flow(&self) -> Result<CommandFlow> {
        self.to_packet().map(CommandFlow::single)
    }
}

/// Whether the panel is asking for an access code.
pub fn is_code_request(packet: &Packet) -> bool {
    CODE_REQUIRED.contains(&packet.code())
}

/// A flow sending `code`/`data`, answering the panel's code request with
/// `200<code>`. The code is read and validated only when the panel asks.
fn code_flow(code: u16, data: String, supplier: CodeSupplier) -> CommandFlow {
    let code_entry = CommandFlow::deferred(move || {
        let code = supplier();
        Command::CodeEntry { code }.to_packet()
    });
    CommandFlow::chained(Packet::with_data(code, data), is_code_request, code_entry)
}

/// `020` - Activate a command output, answering the code request.
pub fn activate_output(partition: u8, output: u8, code: CodeSupplier) -> Result<CommandFlow> {
    if !(1..=4).contains(&output) {
        return Err(EvlError::validation(format!(
            "output {} out of range [1-4]",
            output
        )));
    }
    let data = format!("{}{}", partition_digit(partition)?, output);
    Ok(code_flow(client::COMMAND_OUTPUT, data, code))
}

/// `030` - Away arm.
pub fn away_arm(partition: u8, code: CodeSupplier) -> Result<CommandFlow> {
    Ok(code_flow(client::AWAY_ARM, partition_digit(partition)?, code))
}

/// `031` - Stay arm.
pub fn stay_arm(partition: u8, code: CodeSupplier) -> Result<CommandFlow> {
    Ok(code_flow(client::STAY_ARM, partition_digit(partition)?, code))
}

/// `032` - Away arm without entry delay.
pub fn away_arm_no_entry_delay(partition: u8, code: CodeSupplier) -> Result<CommandFlow> {
    Ok(code_flow(
        client::ARM_NO_ENTRY_DELAY,
        partition_digit(partition)?,
        code,
    ))
}

fn enter_access_code_programming(partition: u8, master: CodeSupplier) -> Result<CommandFlow> {
    Ok(code_flow(
        client::ACCESS_CODE_PROGRAMMING,
        partition_digit(partition)?,
        master,
    ))
}

/// `073` - Enter user function programming.
pub fn enter_user_function_programming(
    partition: u8,
    master: CodeSupplier,
) -> Result<CommandFlow> {
    Ok(code_flow(
        client::USER_FUNCTION_PROGRAMMING,
        partition_digit(partition)?,
        master,
    ))
}

fn keys(partition: u8, keys: impl Into<String>) -> Result<CommandFlow> {
    Command::SendKeys {
        partition,
        keys: keys.into(),
    }
    .to_flow()
}

fn exit_programming(partition: u8) -> Result<CommandFlow> {
    keys(partition, "#")
}

fn set_access_code(
    partition: u8,
    master: CodeSupplier,
    slot: u8,
    code: &str,
) -> Result<Vec<CommandFlow>> {
    let code = validate_code(code)?;
    Ok(vec![
        enter_access_code_programming(partition, master)?,
        keys(partition, format!("{:02}", slot))?,
        keys(partition, code)?,
        exit_programming(partition)?,
    ])
}

/// Program a user access code (users 1-32).
///
/// Returns the steps in order; send them with
/// [`EvlConnection::send_all`](crate::transport::direct::EvlConnection::send_all),
/// which holds the slot and code keys until the panel has asked for and
/// received the master code.
pub fn set_user_access_code(
    partition: u8,
    master: CodeSupplier,
    user: u8,
    code: &str,
) -> Result<Vec<CommandFlow>> {
    check_user(user)?;
    set_access_code(partition, master, user, code)
}

/// Change the master code (slot 40).
pub fn set_master_code(partition: u8, master: CodeSupplier, new_master: &str) -> Result<Vec<CommandFlow>> {
    set_access_code(partition, master, 40, new_master)
}

/// Program a duress code (duress slot 0-1, codes 33-34).
pub fn set_duress_code(
    partition: u8,
    master: CodeSupplier,
    duress: u8,
    code: &str,
) -> Result<Vec<CommandFlow>> {
    if duress > 1 {
        return Err(EvlError::validation("DuressId must be in the range [0-1]"));
    }
    set_access_code(partition, master, 33 + duress, code)
}

/// Program a partition master code (slot 0-1, codes 41-42).
pub fn set_partition_master_code(
    partition: u8,
    master: CodeSupplier,
    slot: u8,
    code: &str,
) -> Result<Vec<CommandFlow>> {
    if slot > 1 {
        return Err(EvlError::validation("PartMasterId must be in the range [0-1]"));
    }
    set_access_code(partition, master, 41 + slot, code)
}

/// Delete a user's access code.
pub fn remove_user_access(partition: u8, master: CodeSupplier, user: u8) -> Result<Vec<CommandFlow>> {
    check_user(user)?;
    Ok(vec![
        enter_access_code_programming(partition, master)?,
        keys(partition, format!("{:02}*", user))?,
        exit_programming(partition)?,
    ])
}

fn check_user(user: u8) -> Result<()> {
    if (1..=32).contains(&user) {
        Ok(())
    } else {
        Err(EvlError::validation("UserId must be in the range [01-32]"))
    }
}

/// Wrap a fixed code into a supplier.
pub fn fixed_code(code: impl Into<String>) -> CodeSupplier {
    let code = code.into();
    Arc::new(move || code.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_simple_command_packets() {
        assert_eq!(Command::Poll.to_packet().unwrap().serialize(), "00090");
        assert_eq!(Command::StatusReport.to_packet().unwrap().code(), 1);
        assert_eq!(Command::DumpZoneTimers.to_packet().unwrap().code(), 8);
        assert_eq!(Command::RequestHvacBroadcast.to_packet().unwrap().code(), 80);
        assert_eq!(Command::BroadcastTime(true).to_packet().unwrap().data(), "1");
        assert_eq!(Command::BroadcastTemperature(false).to_packet().unwrap().data(), "0");
        assert_eq!(Command::KeepAlive { partition: 2 }.to_packet().unwrap().data(), "2");
    }

    #[test]
    fn test_panic_digits() {
        assert_eq!(Command::Panic(PanicType::Fire).to_packet().unwrap().data(), "1");
        assert_eq!(Command::Panic(PanicType::Ambulance).to_packet().unwrap().data(), "2");
        assert_eq!(Command::Panic(PanicType::Police).to_packet().unwrap().data(), "3");
        assert_eq!("Police".parse::<PanicType>().unwrap(), PanicType::Police);
        assert!("flood".parse::<PanicType>().is_err());
    }

    #[test]
    fn test_set_date_time_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(21, 5, 9)
            .unwrap();
        let packet = Command::SetDateTime(at).to_packet().unwrap();
        assert_eq!(packet.code(), 10);
        assert_eq!(packet.data(), "210509030724");
    }

    #[test]
    fn test_arm_and_disarm_with_code() {
        let arm = Command::ArmWithCode { partition: 1, code: "1234".into() };
        assert_eq!(arm.to_packet().unwrap().data(), "11234");
        let disarm = Command::Disarm { partition: 3, code: "123456".into() };
        assert_eq!(disarm.to_packet().unwrap().data(), "3123456");
        let bad = Command::Disarm { partition: 1, code: "12a4".into() };
        assert!(matches!(bad.to_packet(), Err(EvlError::Validation(_))));
    }

    #[test]
    fn test_partition_range() {
        assert!(Command::KeepAlive { partition: 0 }.to_packet().is_err());
        assert!(Command::KeepAlive { partition: 9 }.to_packet().is_err());
        assert!(away_arm(9, fixed_code("1234")).is_err());
    }

    #[test]
    fn test_send_keys_capped() {
        let packet = Command::SendKeys { partition: 1, keys: "123456789".into() }
            .to_packet()
            .unwrap();
        assert_eq!(packet.data(), "1123456");
        assert!(Command::SendKeys { partition: 1, keys: String::new() }.to_packet().is_err());
    }

    #[test]
    fn test_away_arm_flow_answers_code_request() {
        let flow = away_arm(1, fixed_code("1234")).unwrap();
        assert_eq!(flow.packet().unwrap(), Packet::new(30, "1").unwrap());
        let (pred, next) = flow.continuation().unwrap();
        for code in CODE_REQUIRED {
            assert!(pred(&Packet::new(code, "").unwrap()));
        }
        assert!(!pred(&Packet::new(500, "030").unwrap()));
        assert_eq!(next.packet().unwrap(), Packet::new(200, "1234").unwrap());
    }

    #[test]
    fn test_bad_code_rejected_when_materialized() {
        let flow = stay_arm(1, fixed_code("12a4")).unwrap();
        let (_, next) = flow.continuation().unwrap();
        assert!(matches!(next.packet(), Err(EvlError::Validation(_))));
    }

    #[test]
    fn test_activate_output() {
        let flow = activate_output(1, 2, fixed_code("1234")).unwrap();
        assert_eq!(flow.packet().unwrap().serialize(), Packet::new(20, "12").unwrap().serialize());
        assert!(activate_output(1, 5, fixed_code("1234")).is_err());
    }

    #[test]
    fn test_set_user_access_code_steps() {
        let steps = set_user_access_code(1, fixed_code("5555"), 5, "4321").unwrap();
        let packets: Vec<Packet> = steps.iter().map(|s| s.packet().unwrap()).collect();
        assert_eq!(
            packets,
            vec![
                Packet::new(72, "1").unwrap(),
                Packet::new(71, "105").unwrap(),
                Packet::new(71, "14321").unwrap(),
                Packet::new(71, "1#").unwrap(),
            ]
        );
        assert!(steps[0].continuation().is_some());
    }

    #[test]
    fn test_access_code_validation() {
        assert!(set_user_access_code(1, fixed_code("5555"), 0, "4321").is_err());
        assert!(set_user_access_code(1, fixed_code("5555"), 33, "4321").is_err());
        assert!(set_user_access_code(1, fixed_code("5555"), 1, "43").is_err());
        assert!(set_duress_code(1, fixed_code("5555"), 2, "4321").is_err());
        assert!(set_partition_master_code(1, fixed_code("5555"), 2, "4321").is_err());
    }

    #[test]
    fn test_special_slots() {
        let master = set_master_code(1, fixed_code("5555"), "9999").unwrap();
        assert_eq!(master[1].packet().unwrap().data(), "140");
        let duress = set_duress_code(1, fixed_code("5555"), 1, "9999").unwrap();
        assert_eq!(duress[1].packet().unwrap().data(), "134");
        let part_master = set_partition_master_code(2, fixed_code("5555"), 0, "9999").unwrap();
        assert_eq!(part_master[1].packet().unwrap().data(), "241");
    }

    #[test]
    fn test_remove_user_access() {
        let steps = remove_user_access(1, fixed_code("5555"), 7).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].packet().unwrap().data(), "107*");
        assert_eq!(steps[2].packet().unwrap().data(), "1#");
    }

    #[test]
    fn test_user_function_programming() {
        let flow = enter_user_function_programming(1, fixed_code("5555")).unwrap();
        assert_eq!(flow.packet().unwrap().code(), 73);
        assert_eq!(flow.depth(), 2);
    }
}

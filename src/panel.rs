// MIT License - Copyright (c) 2026 Peter Wright
// DSC panel state machine

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::devices::partition::PartitionRecord;
use crate::devices::{
    AlarmState, ArmMode, FaultState, KeypadLedStates, KeypadLeds, Partition, PartitionDelay,
    PartitionState, TamperState, Zone, ZoneState,
};
use crate::error::{EvlError, Result};
use crate::event::{
    notification_channel, Notification, NotificationReceiver, NotificationSender, NotificationType,
};
use crate::protocol::{parse_field, parse_partition, Packet};
use crate::transport::{Dispatch, UnsolicitedHandler};

/// How long `close()` lets queued updates drain before aborting.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// State of a named system trouble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TroubleState {
    Normal,
    Trouble,
    #[default]
    Unknown,
}

/// An unsolicited event code resolved to the update it performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Update {
    Leds { flashing: bool },
    DateTime,
    Temperature,
    ZoneAlarm(AlarmState),
    ZoneTamper(TamperState),
    ZoneFault(FaultState),
    ZoneGeneral(ZoneState),
    Alarm { name: &'static str, active: bool },
    Partition(PartitionState),
    Delay(PartitionDelay),
    KeypadLockout,
    InstallerMode,
    Event(u16),
    Trouble { name: &'static str, active: bool },
    TroubleLed(bool),
}

fn update_for(code: u16) -> Option<Update> {
    use Update::*;
    let update = match code {
        510 => Leds { flashing: false },
        511 => Leds { flashing: true },
        550 => DateTime,
        561 | 562 => Temperature,

        601 => ZoneAlarm(AlarmState::Alarm),
        602 => ZoneAlarm(AlarmState::Normal),
        603 => ZoneTamper(TamperState::Tamper),
        604 => ZoneTamper(TamperState::Normal),
        605 => ZoneFault(FaultState::Fault),
        606 => ZoneFault(FaultState::Normal),
        609 => ZoneGeneral(ZoneState::Open),
        610 => ZoneGeneral(ZoneState::Closed),

        620 => Alarm { name: "Duress", active: true },
        621 => Alarm { name: "Fire", active: true },
        622 => Alarm { name: "Fire", active: false },
        623 => Alarm { name: "Auxillary", active: true },
        624 => Alarm { name: "Auxillary", active: false },
        625 => Alarm { name: "Panic", active: true },
        626 => Alarm { name: "Panic", active: false },
        631 => Alarm { name: "Smoke", active: true },
        632 => Alarm { name: "Smoke", active: false },

        650 | 653 => Partition(PartitionState::Ready),
        651 => Partition(PartitionState::NotReady),
        652 => Partition(PartitionState::Armed),
        654 => Partition(PartitionState::Alarm),
        655 => Partition(PartitionState::Disarmed),
        673 => Partition(PartitionState::Busy),
        656 => Delay(PartitionDelay::Exit),
        657 => Delay(PartitionDelay::Entry),
        658 => KeypadLockout,
        680 => InstallerMode,

        659 | 660 | 663 | 664 | 671 | 672 | 674 | 700 | 701 | 702 | 750 | 751 => Event(code),

        800 => Trouble { name: "Panel Battery", active: true },
        801 => Trouble { name: "Panel Battery", active: false },
        802 => Trouble { name: "Panel AC", active: true },
        803 => Trouble { name: "Panel AC", active: false },
        806 => Trouble { name: "System Bell", active: true },
        807 => Trouble { name: "System Bell", active: false },
        808 => Trouble { name: "FTC", active: true },
        816 => Trouble { name: "Buffer Near Full", active: true },
        829 => Trouble { name: "General System Tamper", active: true },
        830 => Trouble { name: "General System Tamper", active: false },
        842 => Trouble { name: "Fire", active: true },
        843 => Trouble { name: "Fire", active: false },
        840 => TroubleLed(true),
        841 => TroubleLed(false),
        _ => return None,
    };
    Some(update)
}

/// Partition event log text for an informational event code.
fn event_message(code: u16, data: &str) -> Option<String> {
    let msg = match code {
        659 => "659 - Partition Failed to Arm. An attempt to arm the partition has failed.".to_string(),
        660 => "660 - PGM Output is in Progress.".to_string(),
        663 => "663 - Chime Enabled. The door chime feature has been enabled.".to_string(),
        664 => "664 - Chime Disabled. The door chime feature has been disabled.".to_string(),
        671 => "671 - Function Not Available. A function that was selected is not available."
            .to_string(),
        672 => "672 - Failure to Arm. An attempt was made to arm the partition and it failed."
            .to_string(),
        674 => "674 - System Arming in Progress. This system is auto-arming and is in arm warning delay."
            .to_string(),
        700 => format!(
            "700 - User Closing. A partition has been armed by user {} at the end of exit delay.",
            user_number(data)?
        ),
        701 => "701 - Special Closing. A partition has been armed by one of the following methods: \
                Quick Arm, Auto Arm, Keyswitch, DLS software, Wireless Key."
            .to_string(),
        702 => "702 - Partial Closing. A partition has been armed but one or more zones have been bypassed."
            .to_string(),
        750 => format!(
            "750 - User Opening. A partition has been disarmed by user {}.",
            user_number(data)?
        ),
        751 => "751 - Special Opening. A partition has been disarmed by one of the following methods: \
                Keyswitch, DLS software, Wireless Key."
            .to_string(),
        _ => return None,
    };
    Some(msg)
}

fn user_number(data: &str) -> Option<&str> {
    data.get(1..5).filter(|u| u.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse the panel clock broadcast: `hhmmssMMDDYY`, or `hhmmMMDDYY` without seconds.
pub fn parse_panel_time(data: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(data, "%H%M%S%m%d%y")
        .or_else(|_| NaiveDateTime::parse_from_str(data, "%H%M%m%d%y"))
        .ok()
}

fn name_of(value: &impl Debug) -> String {
    format!("{:?}", value).to_uppercase()
}

/// Entity model rebuilt from unsolicited events.
#[derive(Debug)]
pub struct PanelState {
    leds: KeypadLedStates,
    zones: BTreeMap<u16, Zone>,
    partitions: BTreeMap<u8, PartitionRecord>,
    alarms: BTreeMap<&'static str, AlarmState>,
    troubles: BTreeMap<&'static str, TroubleState>,
    date_time: Option<NaiveDateTime>,
    event_log_capacity: usize,
}

impl PanelState {
    pub fn new(event_log_capacity: usize) -> Self {
        Self {
            leds: KeypadLedStates::default(),
            zones: BTreeMap::new(),
            partitions: BTreeMap::new(),
            alarms: BTreeMap::new(),
            troubles: BTreeMap::new(),
            date_time: None,
            event_log_capacity,
        }
    }

    fn zone_mut(&mut self, id: u16) -> &mut Zone {
        self.zones.entry(id).or_insert_with(|| Zone::new(id))
    }

    /// Resolve a `<partition digit><3-digit zone>` payload, recording the partition.
    fn partition_zone(&mut self, data: &str) -> Option<(u8, &mut Zone)> {
        let partition = parse_partition(data)?;
        let id = parse_field(data, 1..4)?;
        let zone = self.zone_mut(id);
        zone.partition = Some(partition);
        Some((partition, zone))
    }

    fn partition_mut(&mut self, id: u8) -> &mut PartitionRecord {
        let capacity = self.event_log_capacity;
        self.partitions
            .entry(id)
            .or_insert_with(|| PartitionRecord::new(id, capacity))
    }

    /// Fold one packet into the model.
    ///
    /// Returns a description of the change and the notification to publish.
    /// A packet with a malformed payload leaves the state untouched.
    pub fn apply(&mut self, packet: &Packet) -> Result<(String, Notification)> {
        let code = packet.code();
        let data = packet.data();
        let invalid = || EvlError::InvalidPayload {
            code,
            data: data.to_string(),
        };
        let update = update_for(code).ok_or_else(invalid)?;

        let (description, kind, msg) = match update {
            Update::Leds { flashing } => {
                let bitmap = KeypadLeds::from_hex(data).ok_or_else(invalid)?;
                self.leds.apply(bitmap, flashing);
                (
                    format!("Keypad LEDs {}", self.leds.to_json()),
                    NotificationType::Led,
                    "leds updated".to_string(),
                )
            }
            Update::DateTime => {
                let at = parse_panel_time(data).ok_or_else(invalid)?;
                self.date_time = Some(at);
                let msg = format!("Panel time {}", at);
                (msg.clone(), NotificationType::Misc, msg)
            }
            Update::Temperature => {
                let msg = format!("Ignoring temperature reading {}", data);
                (msg.clone(), NotificationType::Misc, msg)
            }
            Update::ZoneAlarm(alarm) => {
                let (partition, zone) = self.partition_zone(data).ok_or_else(invalid)?;
                zone.alarm = alarm;
                let msg = format!("Zone {} alarm: {}", zone.id, name_of(&alarm));
                (
                    format!("Updating zone partition={}: {}", partition, msg),
                    NotificationType::Zone,
                    msg,
                )
            }
            Update::ZoneTamper(tamper) => {
                let (partition, zone) = self.partition_zone(data).ok_or_else(invalid)?;
                zone.tamper = tamper;
                let msg = format!("Zone {} tamper: {}", zone.id, name_of(&tamper));
                (
                    format!("Updating zone partition={}: {}", partition, msg),
                    NotificationType::Zone,
                    msg,
                )
            }
            Update::ZoneFault(fault) => {
                let id = parse_field(data, 0..3).ok_or_else(invalid)?;
                self.zone_mut(id).fault = fault;
                let msg = format!("Zone {} fault: {}", id, name_of(&fault));
                (msg.clone(), NotificationType::Zone, msg)
            }
            Update::ZoneGeneral(state) => {
                let id = parse_field(data, 0..3).ok_or_else(invalid)?;
                self.zone_mut(id).state = state;
                let msg = format!("Zone {} state: {}", id, name_of(&state));
                (msg.clone(), NotificationType::Zone, msg)
            }
            Update::Alarm { name, active } => {
                let state = if active { AlarmState::Alarm } else { AlarmState::Normal };
                self.alarms.insert(name, state);
                let msg = format!("{} {}", name, name_of(&state));
                (format!("Updating alarm {}", msg), NotificationType::Alarm, msg)
            }
            Update::Partition(state) => {
                let id = parse_partition(data).ok_or_else(invalid)?;
                let mode = if state == PartitionState::Armed {
                    let index = data.get(1..2).and_then(|d| d.parse::<u8>().ok());
                    match index.and_then(ArmMode::from_index) {
                        Some(mode) => Some(mode),
                        None => {
                            warn!("Ignoring unknown arm mode {:?} for partition {}", index, id);
                            None
                        }
                    }
                } else {
                    None
                };
                let record = self.partition_mut(id);
                record.partition.state = state;
                if state == PartitionState::Armed {
                    if let Some(mode) = mode {
                        record.partition.arm = mode;
                    }
                    record.partition.delay = PartitionDelay::None;
                }
                let kind = if state == PartitionState::Alarm {
                    NotificationType::Alarm
                } else {
                    NotificationType::Arm
                };
                let msg = match mode {
                    Some(mode) => format!("Partition {} {} ({})", id, state.name(), name_of(&mode)),
                    None => format!("Partition {} {}", id, state.name()),
                };
                (format!("Updating {}", msg), kind, msg)
            }
            Update::Delay(delay) => {
                let id = parse_partition(data).ok_or_else(invalid)?;
                self.partition_mut(id).partition.delay = delay;
                let msg = format!("Partition {} {}", id, delay.name());
                (format!("Updating {}", msg), NotificationType::Arm, msg)
            }
            Update::KeypadLockout => {
                let id = parse_partition(data).ok_or_else(invalid)?;
                self.partition_mut(id).partition.keypad_lockout = true;
                let msg = format!("Partition {} keypad locked out", id);
                (msg.clone(), NotificationType::Misc, msg)
            }
            Update::InstallerMode => {
                let id = parse_partition(data).ok_or_else(invalid)?;
                self.partition_mut(id).partition.installer_mode = true;
                let msg = format!("Partition {} installer mode", id);
                (msg.clone(), NotificationType::Misc, msg)
            }
            Update::Event(event) => {
                let id = parse_partition(data).ok_or_else(invalid)?;
                let msg = event_message(event, data).ok_or_else(invalid)?;
                self.partition_mut(id).log_event(msg.clone());
                (
                    format!("Partition {} event: {}", id, msg),
                    NotificationType::Misc,
                    msg,
                )
            }
            Update::Trouble { name, active } => {
                let state = if active { TroubleState::Trouble } else { TroubleState::Normal };
                self.troubles.insert(name, state);
                let msg = format!("{} {}", name, name_of(&state));
                (format!("Updating trouble {}", msg), NotificationType::Trouble, msg)
            }
            Update::TroubleLed(on) => {
                let id = parse_partition(data).ok_or_else(invalid)?;
                self.partition_mut(id).partition.trouble = on;
                let msg = if on {
                    format!("Partition {} is in trouble", id)
                } else {
                    format!("Partition {} trouble cleared", id)
                };
                (msg.clone(), NotificationType::Misc, msg)
            }
        };
        Ok((description, Notification::new(kind, msg)))
    }

    /// Clear the keypad lockout and installer mode flags of a partition.
    pub fn reset_latches(&mut self, id: u8) -> Notification {
        let record = self.partition_mut(id);
        record.partition.keypad_lockout = false;
        record.partition.installer_mode = false;
        Notification::new(
            NotificationType::Misc,
            format!("Partition {} latches reset", id),
        )
    }

    pub fn keypad_leds(&self) -> KeypadLedStates {
        self.leds
    }

    pub fn active_alarms(&self) -> Vec<String> {
        self.alarms
            .iter()
            .filter(|(_, s)| **s == AlarmState::Alarm)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn active_troubles(&self) -> Vec<String> {
        self.troubles
            .iter()
            .filter(|(_, s)| **s == TroubleState::Trouble)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn problem_zones(&self) -> Vec<u16> {
        self.zones.values().filter(|z| z.has_problem()).map(|z| z.id).collect()
    }

    pub fn open_zones(&self) -> Vec<u16> {
        self.zones.values().filter(|z| z.is_open()).map(|z| z.id).collect()
    }

    pub fn zone(&self, id: u16) -> Option<Zone> {
        self.zones.get(&id).cloned()
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.zones.values().cloned().collect()
    }

    pub fn partition(&self, id: u8) -> Option<Partition> {
        self.partitions.get(&id).map(PartitionRecord::snapshot)
    }

    pub fn partitions(&self) -> Vec<Partition> {
        self.partitions.values().map(PartitionRecord::snapshot).collect()
    }

    pub fn date_time(&self) -> Option<NaiveDateTime> {
        self.date_time
    }
}

/// Work items for the update task, processed strictly in order.
enum PanelCommand {
    Apply(Packet),
    ResetLatches(u8),
    Stop,
}

/// Live model of a DSC panel, fed by the connection's receive loop.
///
/// Register a clone as the connection's unsolicited handler. Packets are
/// queued without blocking the receive loop and folded into the model by a
/// single update task in arrival order; each change is published as a
/// [`Notification`].
///
/// # Example
///
/// ```no_run
/// use evl_bridge::{Command, ConnectionConfig, DscPanel, EvlConnection};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ConnectionConfig::builder().host("192.168.0.50").build();
///     let panel = DscPanel::from_config(&config);
///
///     let mut notifications = panel.subscribe();
///     tokio::spawn(async move {
///         while let Ok(n) = notifications.recv().await {
///             println!("{}", n.to_json());
///         }
///     });
///
///     let conn = EvlConnection::open(&config, || "user".to_string(), panel.clone()).await?;
///     conn.send(&Command::StatusReport.to_packet()?).await?;
///
///     tokio::signal::ctrl_c().await?;
///     println!("open zones: {:?}", panel.open_zones().await);
///     conn.close().await;
///     panel.close().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct DscPanel {
    state: Arc<RwLock<PanelState>>,
    update_tx: mpsc::UnboundedSender<PanelCommand>,
    notify_tx: NotificationSender,
    worker: Arc<StdMutex<Option<JoinHandle<()>>>>,
}

impl DscPanel {
    /// Create a panel model and start its update task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(event_log_capacity: usize, notification_capacity: usize) -> Self {
        let state = Arc::new(RwLock::new(PanelState::new(event_log_capacity)));
        let (notify_tx, _) = notification_channel(notification_capacity);
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let handle = spawn_update_task(state.clone(), update_rx, notify_tx.clone());

        Self {
            state,
            update_tx,
            notify_tx,
            worker: Arc::new(StdMutex::new(Some(handle))),
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.event_log_capacity, config.notification_capacity)
    }

    /// Subscribe to panel notifications.
    pub fn subscribe(&self) -> NotificationReceiver {
        self.notify_tx.subscribe()
    }

    /// Clear a partition's keypad lockout and installer mode latches.
    ///
    /// Queued behind any packets already received.
    pub fn reset_latches(&self, partition: u8) -> Result<()> {
        self.update_tx
            .send(PanelCommand::ResetLatches(partition))
            .map_err(|_| EvlError::ChannelClosed)
    }

    // --- Snapshot accessors ---

    pub async fn keypad_leds(&self) -> KeypadLedStates {
        self.state.read().await.keypad_leds()
    }

    /// Names of alarms currently active.
    pub async fn active_alarms(&self) -> Vec<String> {
        self.state.read().await.active_alarms()
    }

    /// Names of troubles currently active.
    pub async fn active_troubles(&self) -> Vec<String> {
        self.state.read().await.active_troubles()
    }

    /// Ids of zones in fault, tamper or alarm.
    pub async fn problem_zones(&self) -> Vec<u16> {
        self.state.read().await.problem_zones()
    }

    pub async fn open_zones(&self) -> Vec<u16> {
        self.state.read().await.open_zones()
    }

    pub async fn zone(&self, id: u16) -> Option<Zone> {
        self.state.read().await.zone(id)
    }

    pub async fn zones(&self) -> Vec<Zone> {
        self.state.read().await.zones()
    }

    pub async fn partition(&self, id: u8) -> Option<Partition> {
        self.state.read().await.partition(id)
    }

    pub async fn partitions(&self) -> Vec<Partition> {
        self.state.read().await.partitions()
    }

    /// Last time broadcast by the panel.
    pub async fn date_time(&self) -> Option<NaiveDateTime> {
        self.state.read().await.date_time()
    }

    /// Stop the update task after draining queued packets.
    pub async fn close(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut handle) = handle else {
            return;
        };
        let _ = self.update_tx.send(PanelCommand::Stop);
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
            warn!("Panel update task did not drain in time");
            handle.abort();
        }
        info!("Panel update task stopped");
    }
}

impl UnsolicitedHandler for DscPanel {
    fn handle(&self, packet: &Packet) -> Dispatch {
        if update_for(packet.code()).is_none() {
            return Dispatch::Unrecognized;
        }
        if self.update_tx.send(PanelCommand::Apply(packet.clone())).is_err() {
            warn!("Panel update task stopped, dropping {}", packet);
        }
        Dispatch::Handled
    }
}

fn spawn_update_task(
    state: Arc<RwLock<PanelState>>,
    mut update_rx: mpsc::UnboundedReceiver<PanelCommand>,
    notify_tx: NotificationSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = update_rx.recv().await {
            let notification = match command {
                PanelCommand::Apply(packet) => {
                    let result = state.write().await.apply(&packet);
                    match result {
                        Ok((description, notification)) => {
                            info!("{}", description);
                            notification
                        }
                        Err(e) => {
                            error!("Failed to process packet {}: {}", packet, e);
                            continue;
                        }
                    }
                }
                PanelCommand::ResetLatches(id) => state.write().await.reset_latches(id),
                PanelCommand::Stop => break,
            };
            if notify_tx.send(notification).is_err() {
                debug!("No notification subscribers");
            }
        }
    })
}

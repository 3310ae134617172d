// MIT License - Copyright (c) 2026 Peter Wright
// Envisalink TPI client
//
//! # evl-bridge
//!
//! Client for the Envisalink third-party interface (TPI) in front of a DSC
//! alarm panel: a checksummed, CRLF-terminated text protocol over TCP.
//!
//! The crate keeps one authenticated session open ([`EvlConnection`]),
//! sends commands and multi-step [`CommandFlow`]s with per-command
//! acknowledgement, and rebuilds a live model of zones, partitions, alarms
//! and troubles ([`DscPanel`]) from the panel's unsolicited events.
//!
//! ## Quick Start
//!
//! ```no_run
//! use evl_bridge::{commands, ConnectionConfig, DscPanel, EvlConnection};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConnectionConfig::builder().host("192.168.0.50").build();
//!     let panel = DscPanel::from_config(&config);
//!     let conn = EvlConnection::open(&config, || "user".to_string(), panel.clone()).await?;
//!
//!     // Away arm partition 1; the access code is sent when the panel asks for it
//!     let flow = commands::away_arm(1, commands::fixed_code("1234"))?;
//!     conn.send_flow(flow).await?;
//!
//!     let mut notifications = panel.subscribe();
//!     while let Ok(n) = notifications.recv().await {
//!         println!("{}", n.to_json());
//!     }
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod commands;
pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
pub mod flow;
pub mod panel;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use buffer::EvictingBuffer;
pub use commands::{Command, CodeSupplier, PanicType};
pub use config::{ConnectionConfig, ConnectionConfigBuilder};
pub use devices::{
    AlarmState, ArmMode, FaultState, KeypadLedStates, KeypadLeds, LedState, Partition,
    PartitionDelay, PartitionEvent, PartitionState, TamperState, Zone, ZoneState,
};
pub use error::{EvlError, LoginFailure, Result, SystemErrorCode};
pub use event::{Notification, NotificationReceiver, NotificationType};
pub use flow::CommandFlow;
pub use panel::{DscPanel, PanelState, TroubleState};
pub use protocol::Packet;
pub use transport::direct::{EvlConnection, SendHandle};
pub use transport::{ConnectionState, Dispatch, UnsolicitedHandler};

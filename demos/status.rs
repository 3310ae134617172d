//! Example: Connect to an Envisalink, request a status report and print the panel model.

use std::time::Duration;

use evl_bridge::{Command, ConnectionConfig, DscPanel, EvlConnection};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ConnectionConfig::builder()
        .host("192.168.0.100")
        .port(4025)
        .build();

    println!("Connecting to panel...");
    let panel = DscPanel::from_config(&config);
    let conn = EvlConnection::open(&config, || "user".to_string(), panel.clone()).await?;

    conn.send(&Command::StatusReport.to_packet()?).await?;

    // Give the panel time to report every zone and partition
    tokio::time::sleep(Duration::from_secs(3)).await;

    let zones = panel.zones().await;
    println!("\n--- Zones ({}) ---", zones.len());
    for zone in &zones {
        println!(
            "  Zone {:3}: state={:?} alarm={:?} tamper={:?} fault={:?} partition={:?}",
            zone.id, zone.state, zone.alarm, zone.tamper, zone.fault, zone.partition,
        );
    }

    let partitions = panel.partitions().await;
    println!("\n--- Partitions ({}) ---", partitions.len());
    for part in &partitions {
        println!(
            "  Partition {}: state={} arm={:?} delay={} lockout={} trouble={}",
            part.id,
            part.state.name(),
            part.arm,
            part.delay.name(),
            part.keypad_lockout,
            part.trouble,
        );
    }

    println!("\n--- Keypad LEDs ---");
    for (name, state) in panel.keypad_leds().await.iter() {
        println!("  {:10} {:?}", name, state);
    }

    println!("\nActive alarms:   {:?}", panel.active_alarms().await);
    println!("Active troubles: {:?}", panel.active_troubles().await);
    if let Some(time) = panel.date_time().await {
        println!("Panel time:      {}", time);
    }

    conn.close().await;
    panel.close().await;
    Ok(())
}

//! Example: Stay arm a partition, watch the notifications, then disarm it.

use std::time::Duration;

use evl_bridge::{commands, Command, ConnectionConfig, DscPanel, EvlConnection, NotificationType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ConnectionConfig::builder().host("192.168.0.100").build();
    let panel = DscPanel::from_config(&config);
    let conn = EvlConnection::open(&config, || "user".to_string(), panel.clone()).await?;

    let mut notifications = panel.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(n) = notifications.recv().await {
            if n.kind == NotificationType::Arm {
                println!("{}", n.to_json());
            }
        }
    });

    // The access code is only sent once the panel asks for it (900)
    println!("Stay arming partition 1...");
    conn.send_flow(commands::stay_arm(1, commands::fixed_code("1234"))?).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    if let Some(part) = panel.partition(1).await {
        println!("Partition 1: {} {:?}", part.state.name(), part.arm);
    }

    println!("Disarming partition 1...");
    conn.send(&Command::Disarm { partition: 1, code: "1234".to_string() }.to_packet()?)
        .await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    conn.close().await;
    panel.close().await;
    watcher.abort();
    Ok(())
}

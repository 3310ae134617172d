// Panel model fed through a live session

use std::time::Duration;

use evl_bridge::{
    AlarmState, ArmMode, ConnectionConfig, DscPanel, EvlConnection, LedState, NotificationReceiver,
    NotificationType, Packet, PartitionDelay, PartitionState, ZoneState,
};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::time::timeout;

async fn write_packet(writer: &mut OwnedWriteHalf, code: u16, data: &str) {
    let line = format!("{}\r\n", Packet::new(code, data).unwrap().serialize());
    writer.write_all(line.as_bytes()).await.unwrap();
}

/// Log in through a scripted panel and hand back its write half.
async fn connect(panel: &DscPanel) -> (EvlConnection, OwnedWriteHalf) {
    use tokio::io::AsyncBufReadExt;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ConnectionConfig::builder()
        .host("127.0.0.1")
        .port(listener.local_addr().unwrap().port())
        .ack_timeout(Duration::from_millis(100))
        .build();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        write_packet(&mut writer, 505, "3").await;
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        write_packet(&mut writer, 500, "005").await;
        write_packet(&mut writer, 505, "1").await;
        // Keep draining so client writes never block
        tokio::spawn(async move {
            let mut line = String::new();
            while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                line.clear();
            }
        });
        writer
    });

    let conn = EvlConnection::open(&config, || "user".to_string(), panel.clone())
        .await
        .unwrap();
    (conn, server.await.unwrap())
}

async fn next(rx: &mut NotificationReceiver) -> evl_bridge::Notification {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no notification")
        .unwrap()
}

#[tokio::test]
async fn test_notifications_follow_arrival_order() {
    let panel = DscPanel::new(100, 64);
    let mut rx = panel.subscribe();
    let (conn, mut writer) = connect(&panel).await;

    write_packet(&mut writer, 609, "003").await;
    write_packet(&mut writer, 656, "1").await;
    write_packet(&mut writer, 652, "101").await;
    write_packet(&mut writer, 610, "003").await;

    let kinds: Vec<NotificationType> = vec![
        next(&mut rx).await.kind,
        next(&mut rx).await.kind,
        next(&mut rx).await.kind,
        next(&mut rx).await.kind,
    ];
    assert_eq!(
        kinds,
        vec![
            NotificationType::Zone,
            NotificationType::Arm,
            NotificationType::Arm,
            NotificationType::Zone,
        ]
    );

    let partition = panel.partition(1).await.unwrap();
    assert_eq!(partition.state, PartitionState::Armed);
    assert_eq!(partition.arm, ArmMode::AwayArmed);
    assert_eq!(partition.delay, PartitionDelay::None);
    assert_eq!(panel.zone(3).await.unwrap().state, ZoneState::Closed);
    assert!(panel.open_zones().await.is_empty());

    conn.close().await;
    panel.close().await;
}

#[tokio::test]
async fn test_leds_alarms_and_troubles() {
    let panel = DscPanel::new(100, 64);
    let mut rx = panel.subscribe();
    let (conn, mut writer) = connect(&panel).await;

    write_packet(&mut writer, 510, "81").await;
    write_packet(&mut writer, 621, "").await;
    write_packet(&mut writer, 802, "").await;
    write_packet(&mut writer, 601, "1007").await;

    let led = next(&mut rx).await;
    assert_eq!(led.kind, NotificationType::Led);
    assert_eq!(next(&mut rx).await.kind, NotificationType::Alarm);
    assert_eq!(next(&mut rx).await.kind, NotificationType::Trouble);
    assert_eq!(next(&mut rx).await.kind, NotificationType::Zone);

    let leds = panel.keypad_leds().await;
    assert_eq!(leds.get("READY"), Some(LedState::On));
    assert_eq!(leds.get("BACKLIGHT"), Some(LedState::On));
    assert_eq!(leds.get("ARMED"), Some(LedState::Off));
    assert_eq!(panel.active_alarms().await, vec!["Fire".to_string()]);
    assert_eq!(panel.active_troubles().await, vec!["Panel AC".to_string()]);

    let zone = panel.zone(7).await.unwrap();
    assert_eq!(zone.alarm, AlarmState::Alarm);
    assert_eq!(zone.partition, Some(1));
    assert_eq!(panel.problem_zones().await, vec![7]);

    conn.close().await;
    panel.close().await;
}

#[tokio::test]
async fn test_bad_payload_does_not_stop_updates() {
    let panel = DscPanel::new(100, 64);
    let mut rx = panel.subscribe();
    let (conn, mut writer) = connect(&panel).await;

    write_packet(&mut writer, 609, "zz").await;
    write_packet(&mut writer, 609, "010").await;

    let n = next(&mut rx).await;
    assert_eq!(n.kind, NotificationType::Zone);
    assert!(n.msg.contains("Zone 10"));
    assert_eq!(panel.zones().await.len(), 1);

    conn.close().await;
    panel.close().await;
}

#[tokio::test]
async fn test_partition_event_log() {
    let panel = DscPanel::new(3, 64);
    let mut rx = panel.subscribe();
    let (conn, mut writer) = connect(&panel).await;

    write_packet(&mut writer, 663, "2").await;
    write_packet(&mut writer, 664, "2").await;
    write_packet(&mut writer, 700, "20012").await;
    write_packet(&mut writer, 750, "20012").await;
    for _ in 0..4 {
        assert_eq!(next(&mut rx).await.kind, NotificationType::Misc);
    }

    let partition = panel.partition(2).await.unwrap();
    let msgs: Vec<&str> = partition.events.iter().map(|e| e.msg.as_str()).collect();
    assert_eq!(msgs.len(), 3);
    assert!(msgs[0].starts_with("664 - Chime Disabled"));
    assert!(msgs[1].contains("armed by user 0012"));
    assert!(msgs[2].contains("disarmed by user 0012"));

    conn.close().await;
    panel.close().await;
}

#[tokio::test]
async fn test_latches_reset_after_queued_packets() {
    let panel = DscPanel::new(100, 64);
    let mut rx = panel.subscribe();
    let (conn, mut writer) = connect(&panel).await;

    write_packet(&mut writer, 658, "1").await;
    write_packet(&mut writer, 680, "1").await;
    next(&mut rx).await;
    next(&mut rx).await;
    let partition = panel.partition(1).await.unwrap();
    assert!(partition.keypad_lockout);
    assert!(partition.installer_mode);

    panel.reset_latches(1).unwrap();
    let n = next(&mut rx).await;
    assert_eq!(n.kind, NotificationType::Misc);
    let partition = panel.partition(1).await.unwrap();
    assert!(!partition.keypad_lockout);
    assert!(!partition.installer_mode);

    conn.close().await;
    panel.close().await;
}

#[tokio::test]
async fn test_notification_json_shape() {
    let panel = DscPanel::new(100, 64);
    let mut rx = panel.subscribe();
    let (conn, mut writer) = connect(&panel).await;

    write_packet(&mut writer, 654, "1").await;
    let n = next(&mut rx).await;
    let value: serde_json::Value = serde_json::from_str(&n.to_json()).unwrap();
    assert_eq!(value["type"], "ALARM");
    assert!(value["ts"].as_str().unwrap().len() == 19);
    assert_eq!(value["msg"], "Partition 1 ALARM");

    conn.close().await;
    panel.close().await;
}

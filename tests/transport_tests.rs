//! Transport manager tests

mod common;

use common::wait_until;

use std::sync::Arc;
use std::time::Duration;

use light_tower_link::codec::Message;
use light_tower_link::link::pipe::{duplex, pipe};
use light_tower_link::link::RxTarget;
use light_tower_link::{
    ElementType, LinkConfig, LinkError, LinkWriter, RxTxType, SyncItem, TransportManager, UpdateStoreType,
};

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn test_two_boards_converge_through_echo() {
    let (controller_end, renderer_end) = duplex();
    let mut controller = TransportManager::new(LinkConfig::named("controller"));
    let mut renderer = TransportManager::new(LinkConfig::named("renderer"));

    let setting = SyncItem::builder("BT_Source_En", [false])
        .policy(RxTxType::TxOnChange, UpdateStoreType::OnRx)
        .link(controller.handle())
        .build()
        .unwrap();
    let echo = SyncItem::builder("BT_Source_En", [false])
        .policy(RxTxType::RxEchoValue, UpdateStoreType::OnRx)
        .link(renderer.handle())
        .build()
        .unwrap();

    controller.start(controller_end.reader, controller_end.writer).unwrap();
    renderer.start(renderer_end.reader, renderer_end.writer).unwrap();
    assert!(echo.setup());
    assert!(setting.setup());

    let status = setting.update(&[true]);
    assert!(status.queued);
    assert!(!status.committed);

    assert!(wait_until(WAIT, || echo.value() == Some(true)));
    assert!(wait_until(WAIT, || setting.value() == Some(true)));
    assert_eq!(setting.change_count(), Some(1));
    assert_eq!(echo.change_count(), Some(1));
    assert!(wait_until(WAIT, || controller.handle().stats().transmitted >= 2));

    controller.stop();
    renderer.stop();
    assert!(!controller.handle().is_running());
}

#[test]
fn test_queue_full_drops_and_counts() {
    let mut config = LinkConfig::named("small");
    config.queue_capacity = 2;
    let manager = TransportManager::new(config);
    let link = manager.handle();

    assert!(link.queue_message("a".into()).is_ok());
    assert!(link.queue_message("b".into()).is_ok());
    assert!(matches!(link.queue_message("c".into()), Err(LinkError::QueueFull)));

    assert_eq!(link.pending(), 2);
    assert_eq!(link.stats().queue_full, 1);
    assert_eq!(link.take_outbound(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_oversized_outbound_refused() {
    let mut config = LinkConfig::named("short");
    config.max_message_len = 8;
    let manager = TransportManager::new(config);
    let link = manager.handle();

    assert!(matches!(
        link.queue_message("0123456789".into()),
        Err(LinkError::MessageTooLong { len: 10, max: 8 })
    ));
    assert_eq!(link.pending(), 0);
}

#[test]
fn test_unknown_item_counted() {
    let manager = TransportManager::new(LinkConfig::default());
    let link = manager.handle();
    let line = Message::new("Nobody", ElementType::Bool, 1, vec![1]).encode().unwrap();

    assert!(!link.dispatch_line(&line));
    assert_eq!(link.stats().unknown_item, 1);
    assert_eq!(link.stats().decoded, 0);
}

#[test]
fn test_bad_lines_counted_by_kind() {
    let manager = TransportManager::new(LinkConfig::default());
    let link = manager.handle();

    assert!(!link.dispatch_line("garbage"));
    assert!(!link.dispatch_line(r#"{"N":"X","C":1,"T":"Bool_t","D":["01"],"B":1,"S":9}"#));
    assert!(!link.dispatch_line("   "));

    let stats = link.stats();
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.checksum_mismatch, 1);
    assert_eq!(stats.rx_failures(), 2);
}

#[test]
fn test_duplicate_name_refused() {
    let manager = TransportManager::new(LinkConfig::default());
    let link = manager.handle();

    let first = SyncItem::builder("FFT Gain", [1.7f32]).link(link.clone()).build().unwrap();
    let second = SyncItem::builder("FFT Gain", [1.7f32]).link(link.clone()).build().unwrap();
    assert!(first.setup());
    assert!(!second.setup());

    let target: Arc<dyn RxTarget> = second.clone();
    assert!(matches!(
        link.register_for_rx(second.id(), &target),
        Err(LinkError::AlreadyRegistered(name)) if name == "FFT Gain"
    ));

    // Re-registering the holder is a no-op.
    let target: Arc<dyn RxTarget> = first.clone();
    assert!(link.register_for_rx(first.id(), &target).is_ok());
    assert_eq!(link.registered_names(), vec!["FFT Gain".to_string()]);
}

#[test]
fn test_dropped_item_frees_its_name() {
    let manager = TransportManager::new(LinkConfig::default());
    let link = manager.handle();

    let first = SyncItem::builder("Sound_State", [0u8]).link(link.clone()).build().unwrap();
    assert!(first.setup());
    drop(first);
    assert!(!link.is_registered("Sound_State"));

    let second = SyncItem::builder("Sound_State", [0u8]).link(link.clone()).build().unwrap();
    assert!(second.setup());
    assert!(link.is_registered("Sound_State"));
}

#[test]
fn test_overrun_discards_line_and_recovers() {
    let mut config = LinkConfig::named("overrun");
    config.max_message_len = 16;
    let mut manager = TransportManager::new(config);
    let link = manager.handle();

    let (mut into_link, reader) = pipe();
    let (writer, _out) = pipe();
    manager.start(reader, writer).unwrap();

    into_link.write_all(b"this line is far longer than sixteen bytes\n").unwrap();
    assert!(wait_until(WAIT, || link.stats().rx_overrun == 1));

    into_link.write_all(b"short\n").unwrap();
    assert!(wait_until(WAIT, || link.stats().malformed == 1));
    assert_eq!(link.stats().rx_overrun, 1);
}

#[test]
fn test_tx_task_appends_newline() {
    let mut manager = TransportManager::new(LinkConfig::named("tx"));
    let link = manager.handle();
    let (_into_link, reader) = pipe();
    let (writer, mut out) = pipe();
    manager.start(reader, writer).unwrap();

    link.queue_message("first".into()).unwrap();
    link.queue_message("second".into()).unwrap();

    let mut lines = Vec::new();
    assert!(wait_until(WAIT, || {
        lines.extend(out.take_lines());
        lines.len() == 2
    }));
    assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
    assert!(wait_until(WAIT, || link.stats().transmitted == 2));
}

#[test]
fn test_non_utf8_line_counted_as_malformed() {
    let mut manager = TransportManager::new(LinkConfig::named("utf8"));
    let link = manager.handle();
    let (mut into_link, reader) = pipe();
    let (writer, _out) = pipe();
    manager.start(reader, writer).unwrap();

    into_link.write_all(b"{\"N\":\"\xFF\xFE\"}\n").unwrap();
    into_link.write_all(b"garbage\n").unwrap();

    assert!(wait_until(WAIT, || link.stats().malformed == 2));
    assert_eq!(link.stats().rx_overrun, 0);
    assert_eq!(link.stats().decoded, 0);
}

//! End-to-end orchestrator behaviour with the `mock-adapter` builtin.

mod common;

use std::sync::mpsc;
use std::time::Duration;

use common::*;
use southbound::value::now_millis;
use southbound::{
    AdapterError, ChannelHandler, DataValue, OrchestratorError, OrchestratorState, Quality,
    StatusCode, TagValues, Value,
};

#[test]
fn test_read_through_orchestrator() {
    let plugins = tempfile::tempdir().unwrap();
    let pump_tag = tag("register_address:100,function_code:3,data_type:uint16");

    let orch = orchestrator();
    orch.initialize(&gateway(plugins.path(), vec![device("pump1").with_tag(pump_tag.clone())]))
        .unwrap();
    orch.start().unwrap();

    let before = now_millis();
    let values = orch.read_device_data("pump1", &[pump_tag]).unwrap();
    let after = now_millis();

    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value, Value::U32(u32::from(REGISTER_100)));
    assert_eq!(values[0].quality, Quality::Good);
    assert!(values[0].timestamp_ms >= before && values[0].timestamp_ms <= after);

    orch.stop();
}

#[test]
fn test_write_then_read_back() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    orch.initialize(&gateway(plugins.path(), vec![device("valve")]))
        .unwrap();
    orch.start().unwrap();

    let mut values = TagValues::new();
    values.insert(tag("register_address:20,function_code:6"), DataValue::new(42i32));
    values.insert(tag("register_address:3,function_code:5"), DataValue::new(true));
    orch.write_device_data("valve", &values).unwrap();

    let read = orch
        .read_device_data(
            "valve",
            &[
                tag("register_address:20,data_type:int16"),
                tag("register_address:3,function_code:1"),
            ],
        )
        .unwrap();
    assert_eq!(read[0].value, Value::I32(42));
    assert_eq!(read[1].value, Value::Bool(true));
}

#[test]
fn test_unknown_device() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    orch.initialize(&gateway(plugins.path(), vec![device("pump1")]))
        .unwrap();
    orch.start().unwrap();

    let t = tag("register_address:100");
    assert_eq!(
        orch.read_device_data("ghost", &[t.clone()]),
        Err(AdapterError::NotConnected)
    );
    let mut values = TagValues::new();
    values.insert(t.clone(), DataValue::new(1i32));
    assert_eq!(
        orch.write_device_data("ghost", &values),
        Err(AdapterError::NotConnected)
    );
    assert_eq!(
        orch.subscribe_device_data("ghost", &[t], |_: &TagValues| {}),
        Err(AdapterError::NotConnected)
    );
    assert_eq!(
        orch.unsubscribe_device_data("ghost"),
        Err(AdapterError::NotConnected)
    );
    assert_eq!(orch.device_status("ghost"), StatusCode::NotConnected);
}

#[test]
fn test_stop_without_start_is_noop() {
    let orch = orchestrator();
    orch.stop();
    assert_eq!(orch.state(), OrchestratorState::Uninitialized);

    let plugins = tempfile::tempdir().unwrap();
    orch.initialize(&gateway(plugins.path(), vec![device("pump1")]))
        .unwrap();
    orch.stop();
    assert_eq!(orch.state(), OrchestratorState::Initialized);
    assert_eq!(orch.device_names(), vec!["pump1"]);
}

#[test]
fn test_device_ops_before_start() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    orch.initialize(&gateway(plugins.path(), vec![device("pump1")]))
        .unwrap();

    assert_eq!(orch.device_status("pump1"), StatusCode::NotConnected);
    assert_eq!(
        orch.read_device_data("pump1", &[tag("register_address:100")]),
        Err(AdapterError::NotConnected)
    );
}

#[test]
fn test_start_fails_on_unreachable_device() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    orch.initialize(&gateway(
        plugins.path(),
        vec![
            device("first"),
            device("second").with_config("ip_address", UNREACHABLE),
            device("third"),
        ],
    ))
    .unwrap();

    let err = orch.start().unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Connect { ref device, status: StatusCode::Error } if device == "second"
    ));
    assert_eq!(orch.state(), OrchestratorState::Initialized);
    assert_eq!(orch.device_status("first"), StatusCode::Ok);
    assert_eq!(orch.device_status("third"), StatusCode::NotConnected);
}

#[test]
fn test_bad_adapter_config_aborts_initialize() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    let mut broken = device("broken");
    broken.config.remove("ip_address");

    let err = orch
        .initialize(&gateway(plugins.path(), vec![device("fine"), broken]))
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::AdapterInit { status: StatusCode::BadConfig, .. }
    ));
    assert_eq!(orch.state(), OrchestratorState::Uninitialized);
    assert!(orch.device_names().is_empty());
}

#[test]
fn test_subscription_through_channel() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    orch.initialize(&gateway(plugins.path(), vec![device("pump1")]))
        .unwrap();
    orch.start().unwrap();

    let t = tag("register_address:101,data_type:uint16");
    let (tx, rx) = mpsc::channel();
    orch.subscribe_device_data("pump1", &[t.clone()], ChannelHandler::new(tx))
        .unwrap();

    let payload = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(payload[&t].value, Value::U32(7));
    assert!(payload[&t].is_good());

    orch.unsubscribe_device_data("pump1").unwrap();
    while rx.try_recv().is_ok() {}
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_double_subscribe_keeps_one_loop() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    orch.initialize(&gateway(plugins.path(), vec![device("pump1")]))
        .unwrap();
    orch.start().unwrap();

    let old = tag("register_address:100");
    let new = tag("register_address:101");
    let (tx, rx) = mpsc::channel();
    orch.subscribe_device_data("pump1", &[old.clone()], ChannelHandler::new(tx.clone()))
        .unwrap();
    orch.subscribe_device_data("pump1", &[new.clone()], ChannelHandler::new(tx))
        .unwrap();

    // The first loop has been joined; anything it sent is already queued.
    let mut seen_new = 0;
    while seen_new < 3 {
        let payload = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        if payload.contains_key(&new) {
            seen_new += 1;
        } else {
            assert_eq!(seen_new, 0, "old subscription still delivering");
        }
    }
    orch.stop();
}

#[test]
fn test_stop_disconnects_and_restart_works() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    let config = gateway(plugins.path(), vec![device("pump1")]);

    orch.initialize(&config).unwrap();
    orch.start().unwrap();
    assert!(orch.is_running());
    orch.stop();
    assert_eq!(orch.state(), OrchestratorState::Stopped);
    assert!(!orch.is_initialized());
    assert_eq!(orch.device_status("pump1"), StatusCode::NotConnected);

    orch.initialize(&config).unwrap();
    orch.start().unwrap();
    assert_eq!(orch.device_status("pump1"), StatusCode::Ok);
}

#[test]
fn test_status_report() {
    let plugins = tempfile::tempdir().unwrap();
    let orch = orchestrator();
    orch.initialize(&gateway(plugins.path(), vec![device("a"), device("b")]))
        .unwrap();
    orch.start().unwrap();

    let report = orch.status_report();
    assert!(report.running);
    assert!(report.initialized);
    assert_eq!(report.loaded_plugins, 1);
    assert_eq!(report.devices, 2);
    assert!(orch.service_status().contains("Running: Yes"));
    assert_eq!(orch.loaded_plugins(), vec![MOCK_ADAPTER]);
}

//! Integration tests driving a `Supervisor` against in-memory mock serial
//! links, covering the concrete scenarios the dome supervisor must satisfy.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use domed::config::Config;
use domed::error::CommandOutcome;
use domed::logging::LogSink;
use domed::serial::SerialLink;
use domed::shutter::ShutterStatus;
use domed::supervisor::Supervisor;
use domed::testing::{FixedBeltSensor, MockSerialPort, RecordingLogSink};

fn caller_ip() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn base_config() -> Config {
    let mut sides = HashMap::new();
    sides.insert("east".to_string(), "a".to_string());
    sides.insert("west".to_string(), "b".to_string());
    sides.insert("both".to_string(), "ab".to_string());
    let mut side_labels = HashMap::new();
    side_labels.insert("a".to_string(), "East".to_string());
    side_labels.insert("b".to_string(), "West".to_string());

    Config {
        shutter_port: "mock-shutter".to_string(),
        shutter_baud: 9600,
        heartbeat_port: "mock-heartbeat".to_string(),
        heartbeat_baud: 9600,
        read_timeout: 0.02,
        command_delay: 0.01,
        step_command_delay: 0.02,
        shutter_timeout: 5.0,
        has_legacy_controller: false,
        has_bumper_guard: false,
        slow_open_steps: 0,
        sides,
        side_labels,
        invert_on_close: false,
        belt_sensors: HashMap::new(),
        control_ips: vec![caller_ip()],
        service_name: "domed-test".to_string(),
        log_level: domed::config::LogLevel::Info,
    }
}

fn link_over(mock: MockSerialPort, log: Arc<dyn LogSink>) -> SerialLink {
    let opener_mock = mock.clone();
    let opener: domed::serial::PortOpener =
        Box::new(move || Ok(Box::new(opener_mock.clone()) as Box<dyn domed::serial::SerialPortIo>));
    let link = SerialLink::new("mock", Duration::from_millis(20), opener, log);
    link.connect();
    link
}

struct Harness {
    supervisor: Arc<Supervisor>,
    shutter: MockSerialPort,
    heartbeat: MockSerialPort,
    log: RecordingLogSink,
}

fn harness(config: Config, belt_sensor: Arc<dyn domed::belt::BeltSensor>) -> Harness {
    let log = RecordingLogSink::new();
    let log_dyn: Arc<dyn LogSink> = Arc::new(log.clone());

    let shutter_mock = MockSerialPort::new();
    let heartbeat_mock = MockSerialPort::new();

    let shutter_link = Arc::new(link_over(shutter_mock.clone(), log_dyn.clone()));
    let heartbeat_link = Arc::new(link_over(heartbeat_mock.clone(), log_dyn.clone()));

    let supervisor = Arc::new(Supervisor::new(config, shutter_link, heartbeat_link, log_dyn, belt_sensor));
    supervisor.spawn_monitors();

    Harness {
        supervisor,
        shutter: shutter_mock,
        heartbeat: heartbeat_mock,
        log,
    }
}

#[test]
fn full_open_one_side_succeeds() {
    let h = harness(base_config(), Arc::new(domed::belt::NoBeltSensor));

    let shutter = h.shutter.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        shutter.push_inbound(b"a");
        thread::sleep(Duration::from_millis(80));
        shutter.push_inbound(b"x");
    });

    let outcome = h.supervisor.open_shutters(caller_ip(), "a", 0);
    assert_eq!(outcome, CommandOutcome::Succeeded);

    let status = h.supervisor.status().unwrap();
    assert_eq!(status.side_a.status, ShutterStatus::Open);
}

#[test]
fn timeout_open_fails_after_budget_elapses() {
    let mut config = base_config();
    config.shutter_timeout = 0.3;
    let h = harness(config, Arc::new(domed::belt::NoBeltSensor));

    h.shutter.push_inbound(b"a");

    let outcome = h.supervisor.open_shutters(caller_ip(), "a", 0);
    assert_eq!(outcome, CommandOutcome::Failed);

    let status = h.supervisor.status().unwrap();
    assert_eq!(status.side_a.status, ShutterStatus::Opening);
}

#[test]
fn stop_mid_movement_fails_open_and_frees_command_mutex() {
    let mut config = base_config();
    config.shutter_timeout = 5.0;
    let h = harness(config, Arc::new(domed::belt::NoBeltSensor));

    h.shutter.push_inbound(b"a");

    let supervisor_for_stop = h.supervisor.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let outcome = supervisor_for_stop.stop();
        assert_eq!(outcome, CommandOutcome::Succeeded);
    });

    let outcome = h.supervisor.open_shutters(caller_ip(), "a", 0);
    assert_eq!(outcome, CommandOutcome::Failed);

    // The command mutex must be immediately reacquirable (a non-blocking
    // try_lock against it must not come back `Blocked`).
    let outcome = h.supervisor.set_engineering_mode(false);
    assert_ne!(outcome, CommandOutcome::Blocked);
}

#[test]
fn heartbeat_trip_during_open_force_closes_and_fails_movement() {
    let h = harness(base_config(), Arc::new(domed::belt::NoBeltSensor));

    h.shutter.push_inbound(b"a");
    let heartbeat = h.heartbeat.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        heartbeat.push_inbound(&[254]);
    });

    let outcome = h.supervisor.open_shutters(caller_ip(), "a", 0);
    assert_eq!(outcome, CommandOutcome::Failed);

    thread::sleep(Duration::from_millis(50));
    let status = h.supervisor.status().unwrap();
    assert_eq!(status.side_a.status, ShutterStatus::HeartbeatMonitorForceClosing);
    assert_eq!(status.side_b.status, ShutterStatus::HeartbeatMonitorForceClosing);
    assert_eq!(status.heartbeat, domed::heartbeat::HeartbeatState::TrippedClosing);
}

#[test]
fn stepped_open_aborts_on_belt_slack() {
    let mut config = base_config();
    config.belt_sensors.insert("a".to_string(), "tension-a".to_string());
    let sensor = FixedBeltSensor::new();
    let h = harness(config, Arc::new(sensor.clone()));

    // No slack for the first two steps, slack from the third onward.
    sensor.set(domed::shutter::Side::A, true);
    let sensor_for_thread = sensor.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(35));
        sensor_for_thread.set(domed::shutter::Side::A, false);
    });

    let outcome = h.supervisor.open_shutters(caller_ip(), "a", 3);
    assert_eq!(outcome, CommandOutcome::Failed);
    assert!(h.log.contains("belt is slack"));
}

#[test]
fn stop_refused_while_heartbeat_closing() {
    let h = harness(base_config(), Arc::new(domed::belt::NoBeltSensor));

    h.heartbeat.push_inbound(&[254]);
    thread::sleep(Duration::from_millis(30));

    assert_eq!(h.supervisor.stop(), CommandOutcome::HeartbeatCloseInProgress);
}

#[test]
fn heartbeat_arm_refused_in_engineering_mode() {
    let h = harness(base_config(), Arc::new(domed::belt::NoBeltSensor));
    h.heartbeat.push_inbound(&[0]);
    thread::sleep(Duration::from_millis(30));

    assert_eq!(h.supervisor.set_engineering_mode(true), CommandOutcome::Succeeded);
    assert_eq!(
        h.supervisor.set_heartbeat_timer(10),
        CommandOutcome::EngineeringModeActive
    );
    assert!(h.heartbeat.outbound().is_empty());
}

#[test]
fn heartbeat_arm_bounds() {
    let h = harness(base_config(), Arc::new(domed::belt::NoBeltSensor));
    // Heartbeat state starts `Unavailable` until the monitor observes a byte.
    h.heartbeat.push_inbound(&[0]);
    thread::sleep(Duration::from_millis(30));

    assert_eq!(h.supervisor.set_heartbeat_timer(0), CommandOutcome::Succeeded);
    assert_eq!(h.supervisor.set_heartbeat_timer(119), CommandOutcome::Succeeded);
    assert_eq!(h.heartbeat.outbound(), vec![0x00, 0xEE]);

    assert_eq!(
        h.supervisor.set_heartbeat_timer(120),
        CommandOutcome::HeartbeatInvalidTimeout
    );
    assert_eq!(
        h.supervisor.set_heartbeat_timer(-1),
        CommandOutcome::HeartbeatInvalidTimeout
    );
    // No additional wire traffic from the two rejected calls.
    assert_eq!(h.heartbeat.outbound(), vec![0x00, 0xEE]);
}

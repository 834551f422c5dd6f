use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::{LastValueChannel, LocalChannel, LocalHub};
use crate::config::{MismatchPolicy, Verbosity};
use crate::environment::Environment;
use crate::error::LoopError;
use crate::record::{encode_record, record_size, HuboRef, JointSample};
use crate::session::{load_environment, ControlSession, SessionState};
use crate::tests::test_utils::{capture_logs, fast_config, ContactingRobot, StubRobot};

const SAMPLE: [f64; 10] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];

fn stub_environment(dof: usize) -> Environment {
    let mut environment = Environment::new();
    environment.add_body(Arc::new(StubRobot { dof }));
    environment
}

fn sample_session(hub: &LocalHub) -> ControlSession<LocalChannel, JointSample<10>> {
    ControlSession::with_environment(fast_config(), |name| hub.open(name), stub_environment(30))
        .expect("Session must start")
}

#[test]
fn test_short_record_updates_prefix_only() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new(SAMPLE))).unwrap();

    let mut session = sample_session(&hub);
    session.robot().state.write().unwrap().apply_prefix(&[-1.0; 30]);

    let outcome = session.cycle().unwrap();
    assert!(outcome.sample_applied());
    assert_eq!(outcome.joints_applied, 10);

    let values = session.joint_values();
    assert_eq!(&values[..10], &SAMPLE);
    assert!(values[10..].iter().all(|&v| v == -1.0), "Joints beyond the record must keep their values");
}

#[test]
fn test_wrong_frame_size_is_fatal() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", 1024);
    producer.publish(&[0u8; 79]).unwrap();

    let mut session = sample_session(&hub);
    match session.cycle() {
        Err(err @ LoopError::RecordSizeMismatch { expected: 80, found: 79 }) => assert_eq!(err.exit_code(), 4),
        other => panic!("Expected record size mismatch, got {:?}", other.map(|o| o.seq)),
    }
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.robot().state.read().unwrap().updates(), 0, "Nothing may be applied");
    assert_eq!(session.environment().steps(), 0);

    // A run stops at the first cycle as well
    assert!(matches!(session.run_cycles(3), Err(LoopError::RecordSizeMismatch { .. })));
}

#[test]
fn test_stale_channel_keeps_first_record() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new(SAMPLE))).unwrap();

    let mut session = sample_session(&hub);
    let stats = session.run_cycles(5).unwrap();
    assert_eq!(stats.cycles, 5);
    assert_eq!(&session.joint_values()[..10], &SAMPLE);
    assert_eq!(session.robot().state.read().unwrap().updates(), 5);
    assert_eq!(session.environment().steps(), 5);
    assert!((session.environment().sim_time() - 0.005).abs() < 1e-12);
}

#[test]
fn test_newest_record_wins() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    let mut session = sample_session(&hub);

    producer.publish(encode_record(&JointSample::new([0.1; 10]))).unwrap();
    producer.publish(encode_record(&JointSample::new([0.2; 10]))).unwrap();
    producer.publish(encode_record(&JointSample::new([0.3; 10]))).unwrap();

    let outcome = session.cycle().unwrap();
    assert_eq!(outcome.seq, Some(3));
    assert_eq!(&session.joint_values()[..10], &[0.3; 10]);
}

#[test]
fn test_nothing_published_still_steps() {
    let hub = LocalHub::new();
    hub.create("hubo", record_size::<JointSample<10>>());

    let mut session = sample_session(&hub);
    let outcome = session.cycle().unwrap();
    assert!(!outcome.sample_applied());
    assert_eq!(outcome.joints_applied, 0);
    assert!(!outcome.collision.in_collision);
    assert_eq!(session.environment().steps(), 1);
    assert!(session.joint_values().iter().all(|&v| v == 0.0));
}

#[test]
fn test_collision_does_not_stop_loop() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new([2.0; 10]))).unwrap();

    let mut config = fast_config();
    config.verbosity = Verbosity::Contacts;
    let mut session: ControlSession<LocalChannel, JointSample<10>> =
        ControlSession::with_environment(config, |name| hub.open(name), stub_environment(30)).unwrap();

    let stats = session.run_cycles(3).unwrap();
    assert_eq!(stats.colliding_cycles, 3);

    let summary = session.check_once().unwrap();
    assert!(summary.in_collision);
    assert_eq!(summary.contact_count, 1);
}

#[test]
fn test_first_hit_mode_has_no_contacts() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new([2.0; 10]))).unwrap();

    let mut config = fast_config();
    config.contact_details = false;
    let mut session: ControlSession<LocalChannel, JointSample<10>> =
        ControlSession::with_environment(config, |name| hub.open(name), stub_environment(30)).unwrap();

    let summary = session.check_once().unwrap();
    assert!(summary.in_collision);
    assert_eq!(summary.contact_count, 0);
}

#[test]
fn test_contacts_verbosity_requests_contacts() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new([2.0; 10]))).unwrap();

    let mut config = fast_config();
    config.contact_details = false;
    config.verbosity = Verbosity::Contacts;
    let mut session: ControlSession<LocalChannel, JointSample<10>> =
        ControlSession::with_environment(config, |name| hub.open(name), stub_environment(30)).unwrap();

    let summary = session.check_once().unwrap();
    assert!(summary.in_collision);
    assert_eq!(summary.contact_count, 1);
}

#[test]
fn test_cycle_logs_line_per_contact() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new(SAMPLE))).unwrap();

    let mut environment = Environment::new();
    environment.add_body(Arc::new(ContactingRobot { dof: 30, contacts: 3 }));
    let mut config = fast_config();
    config.verbosity = Verbosity::Contacts;
    let mut session: ControlSession<LocalChannel, JointSample<10>> =
        ControlSession::with_environment(config.clone(), |name| hub.open(name), environment).unwrap();

    let (outcome, logs) = capture_logs(|| session.cycle());
    assert!(outcome.unwrap().collision.in_collision);
    let contact_lines: Vec<_> = logs.lines()
        .filter(|line| line.contains("pos = [") && line.contains("norm = ["))
        .collect();
    assert_eq!(contact_lines.len(), 3, "Log:\n{}", logs);
    assert!(contact_lines.iter().all(|line| line.contains("INFO") && line.contains("l_hand-torso")));
    assert!(contact_lines[2].contains("pos = [2.0000, 0.0000, 1.0000]"));
    assert_eq!(logs.lines().filter(|line| line.contains("Self-collision:")).count(), 1);

    // Summary verbosity keeps the summary line only
    let mut environment = Environment::new();
    environment.add_body(Arc::new(ContactingRobot { dof: 30, contacts: 3 }));
    config.verbosity = Verbosity::Summary;
    let mut session: ControlSession<LocalChannel, JointSample<10>> =
        ControlSession::with_environment(config, |name| hub.open(name), environment).unwrap();
    let (_, logs) = capture_logs(|| session.cycle());
    assert!(!logs.contains("pos = ["), "Log:\n{}", logs);
    assert_eq!(logs.lines().filter(|line| line.contains("Self-collision:")).count(), 1);
}

#[test]
fn test_joint_count_policy() {
    let hub = LocalHub::new();
    hub.create("hubo", record_size::<JointSample<10>>());

    let mut config = fast_config();
    config.joint_mismatch = MismatchPolicy::Reject;
    let rejected: Result<ControlSession<LocalChannel, JointSample<10>>, _> =
        ControlSession::with_environment(config.clone(), |name| hub.open(name), stub_environment(30));
    match rejected {
        Err(err @ LoopError::JointCountMismatch { record: 10, robot: 30 }) => assert_eq!(err.exit_code(), 6),
        _ => panic!("Joint count mismatch must be rejected"),
    }

    // Matching counts pass under the strict policy
    let accepted: Result<ControlSession<LocalChannel, JointSample<10>>, _> =
        ControlSession::with_environment(config, |name| hub.open(name), stub_environment(10));
    assert!(accepted.is_ok());
}

#[test]
fn test_missing_channel() {
    let hub = LocalHub::new();
    let result: Result<ControlSession<LocalChannel>, _> =
        ControlSession::with_environment(fast_config(), |name| hub.open(name), stub_environment(42));
    match result {
        Err(err @ LoopError::ChannelOpenFailed { .. }) => assert_eq!(err.exit_code(), 1),
        _ => panic!("Missing channel must fail the start"),
    }
}

#[test]
fn test_no_bodies_loaded() {
    match load_environment(Path::new("src/tests/data/no_robots.xml")) {
        Err(err @ LoopError::NoBodiesLoaded { .. }) => assert_eq!(err.exit_code(), -3),
        _ => panic!("Model without robots must be refused"),
    }

    let hub = LocalHub::new();
    hub.create("hubo", record_size::<HuboRef>());
    let mut config = fast_config();
    config.model = "src/tests/data/no_robots.xml".into();
    let result: Result<ControlSession<LocalChannel>, _> = ControlSession::start(config, |name| hub.open(name));
    assert_eq!(result.err().map(|e| e.exit_code()), Some(-3));

    let empty: Result<ControlSession<LocalChannel>, _> =
        ControlSession::with_environment(fast_config(), |name| hub.open(name), Environment::new());
    assert!(matches!(empty, Err(LoopError::NoBodiesLoaded { .. })));
}

#[test]
fn test_unreadable_model() {
    let hub = LocalHub::new();
    hub.create("hubo", record_size::<HuboRef>());
    let mut config = fast_config();
    config.model = "src/tests/data/missing.robot.xml".into();
    let result: Result<ControlSession<LocalChannel>, _> = ControlSession::start(config, |name| hub.open(name));
    assert_eq!(result.err().map(|e| e.exit_code()), Some(2));
}

#[test]
fn test_first_robot_is_driven() {
    let hub = LocalHub::new();
    hub.create("hubo", record_size::<HuboRef>());
    let mut config = fast_config();
    config.model = "src/tests/data/two_robots.xml".into();
    let session: ControlSession<LocalChannel> = ControlSession::start(config, |name| hub.open(name)).unwrap();
    assert_eq!(session.environment().bodies().len(), 2);
    assert_eq!(session.robot().body.name(), "pendulum");
    assert_eq!(session.robot().body.dof(), 1);
}

#[test]
fn test_invalid_config_is_refused() {
    let hub = LocalHub::new();
    hub.create("hubo", record_size::<HuboRef>());
    let mut config = fast_config();
    config.period = Duration::ZERO;
    let result: Result<ControlSession<LocalChannel>, _> =
        ControlSession::with_environment(config, |name| hub.open(name), stub_environment(42));
    assert_eq!(result.err().map(|e| e.exit_code()), Some(7));
}

#[test]
fn test_run_until_cancelled() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new(SAMPLE))).unwrap();
    let mut session = sample_session(&hub);

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };
    let stats = session.run(&token).unwrap();
    canceller.join().unwrap();

    assert!(stats.cycles > 0);
    assert!(stats.overruns <= stats.cycles);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.environment().steps(), stats.cycles);
}

#[test]
fn test_viewer_reads_while_loop_writes() {
    let hub = LocalHub::new();
    let mut producer = hub.create("hubo", record_size::<JointSample<10>>());
    producer.publish(encode_record(&JointSample::new(SAMPLE))).unwrap();
    let mut session = sample_session(&hub);

    let token = CancellationToken::new();
    let viewer = crate::viewer::spawn_viewer(session.robot().clone(), Duration::from_millis(2), token.clone())
        .unwrap();
    session.run_cycles(20).unwrap();
    token.cancel();
    assert!(viewer.join().unwrap() >= 1);

    let frame = crate::viewer::observe(session.robot());
    assert_eq!(frame.updates, 20);
    assert_eq!(&frame.joints[..10], &SAMPLE);
}

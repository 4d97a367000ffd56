mod common;

use std::time::{Duration, SystemTime};

use common::{FakeDriver, controller, wait_for};
use mailswitch::switch::Power;
use mailswitch::switch::controller::StartOutcome;
use mailswitch::switch::expiry::{ExpiryMonitor, ExpiryOutcome};
use mailswitch::switch::marker::SwitchState;

const LONG: Duration = Duration::from_secs(3600);
const WAIT: Duration = Duration::from_secs(5);

#[test]
fn stop_without_marker_turns_off_once() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);

    ctl.stop().unwrap();

    assert_eq!(driver.commands(), vec![Power::Off]);
    assert_eq!(ctl.state().unwrap(), SwitchState::Off);
}

#[test]
fn stop_twice_is_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);
    ctl.marker().write(SystemTime::now()).unwrap();

    ctl.stop().unwrap();
    ctl.stop().unwrap();

    assert_eq!(driver.count(Power::Off), 2);
    assert_eq!(ctl.state().unwrap(), SwitchState::Off);
}

#[test]
fn start_turns_on_and_writes_marker() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);
    let before = SystemTime::now();

    assert_eq!(ctl.start().unwrap(), StartOutcome::Started);
    assert!(ctl.running());
    assert!(wait_for(WAIT, || ctl.state().unwrap() != SwitchState::Off));

    let SwitchState::On { since } = ctl.state().unwrap() else {
        unreachable!()
    };
    assert!(since.duration_since(before).unwrap_or_default() < Duration::from_secs(5));
    assert_eq!(driver.commands(), vec![Power::On]);

    ctl.stop().unwrap();
    assert!(!ctl.running());
    assert_eq!(ctl.state().unwrap(), SwitchState::Off);
    // the woken worker and the forced stop each send "off"
    assert_eq!(driver.commands(), vec![Power::On, Power::Off, Power::Off]);
}

#[test]
fn worker_runs_full_cycle_and_exits() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), Duration::from_millis(50));

    ctl.start().unwrap();
    ctl.wait();

    assert!(!ctl.running());
    assert_eq!(driver.commands(), vec![Power::On, Power::Off]);
    assert_eq!(ctl.state().unwrap(), SwitchState::Off);
}

#[test]
fn running_turns_false_once_worker_exits() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), Duration::from_millis(30));

    ctl.start().unwrap();
    assert!(wait_for(WAIT, || !ctl.running()));
    assert_eq!(ctl.active_since(), None);
}

#[test]
fn second_start_is_rejected_while_active() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);

    assert_eq!(ctl.start().unwrap(), StartOutcome::Started);
    assert_eq!(ctl.start().unwrap(), StartOutcome::AlreadyRunning);
    assert!(wait_for(WAIT, || driver.count(Power::On) == 1));

    ctl.stop().unwrap();
    assert_eq!(driver.count(Power::On), 1);
}

#[test]
fn start_works_again_after_a_finished_run() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), Duration::from_millis(20));

    ctl.start().unwrap();
    ctl.wait();
    assert_eq!(ctl.start().unwrap(), StartOutcome::Started);
    ctl.wait();

    assert_eq!(
        driver.commands(),
        vec![Power::On, Power::Off, Power::On, Power::Off]
    );
}

#[test]
fn unreachable_device_leaves_no_marker() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    driver.set_unreachable(true);
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);

    ctl.start().unwrap();
    ctl.wait();

    assert!(driver.commands().is_empty());
    assert_eq!(ctl.state().unwrap(), SwitchState::Off);
    assert!(ctl.stop().is_err());
}

#[test]
fn expiry_stops_only_past_the_budget() {
    let budget = Duration::from_secs(5 * 60);
    let t0 = whole_ms(SystemTime::now() - Duration::from_secs(7200));
    let ages = [
        (Duration::ZERO, false),
        (Duration::from_secs(60), false),
        (budget - Duration::from_secs(1), false),
        (budget, false),
        (budget + Duration::from_millis(1), true),
        (budget + Duration::from_secs(60), true),
        (Duration::from_secs(3600), true),
    ];

    for (age, should_stop) in ages {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::default();
        let ctl = controller(&driver, dir.path().join("on.status"), budget);
        ctl.marker().write(t0).unwrap();
        let monitor = ExpiryMonitor::new(ctl.clone(), budget);

        let outcome = monitor.check(t0 + age).unwrap();

        if should_stop {
            assert!(matches!(outcome, ExpiryOutcome::ForcedStop { .. }), "age {age:?}");
            assert_eq!(driver.commands(), vec![Power::Off], "age {age:?}");
            assert_eq!(ctl.state().unwrap(), SwitchState::Off);
        } else {
            assert!(matches!(outcome, ExpiryOutcome::Running { .. }), "age {age:?}");
            assert!(driver.commands().is_empty(), "age {age:?}");
            assert!(ctl.state().unwrap() != SwitchState::Off);
        }
    }
}

#[test]
fn expiry_is_idle_without_marker() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);
    let monitor = ExpiryMonitor::new(ctl, Duration::from_secs(60));

    assert_eq!(monitor.check(SystemTime::now()).unwrap(), ExpiryOutcome::Idle);
    assert!(driver.commands().is_empty());
}

#[test]
fn marker_from_the_future_counts_as_just_started() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);
    let now = SystemTime::now();
    ctl.marker().write(now + Duration::from_secs(600)).unwrap();
    let monitor = ExpiryMonitor::new(ctl, Duration::from_secs(60));

    assert_eq!(
        monitor.check(now).unwrap(),
        ExpiryOutcome::Running {
            elapsed: Duration::ZERO
        }
    );
}

#[test]
fn stale_marker_does_not_expire_a_fresh_activation() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);
    let now = SystemTime::now();
    ctl.marker().write(now - Duration::from_secs(3600)).unwrap();
    let monitor = ExpiryMonitor::new(ctl.clone(), Duration::from_secs(300));

    ctl.start().unwrap();
    let outcome = monitor.check(SystemTime::now()).unwrap();

    assert!(matches!(outcome, ExpiryOutcome::Running { .. }));
    assert!(ctl.running());
    ctl.stop().unwrap();
}

#[test]
fn failed_forced_stop_keeps_marker_for_retry() {
    let dir = tempfile::tempdir().unwrap();
    let driver = FakeDriver::default();
    let ctl = controller(&driver, dir.path().join("on.status"), LONG);
    let t0 = SystemTime::now() - Duration::from_secs(600);
    ctl.marker().write(t0).unwrap();
    let monitor = ExpiryMonitor::new(ctl.clone(), Duration::from_secs(300));

    driver.set_unreachable(true);
    assert!(monitor.check(SystemTime::now()).is_err());
    assert_eq!(ctl.state().unwrap(), SwitchState::On { since: whole_ms(t0) });

    driver.set_unreachable(false);
    assert!(matches!(
        monitor.check(SystemTime::now()).unwrap(),
        ExpiryOutcome::ForcedStop { .. }
    ));
    assert_eq!(ctl.state().unwrap(), SwitchState::Off);
}

/// The marker stores milliseconds.
fn whole_ms(t: SystemTime) -> SystemTime {
    let ms = t.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_millis() as u64;
    SystemTime::UNIX_EPOCH + Duration::from_millis(ms)
}

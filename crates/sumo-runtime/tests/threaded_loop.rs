//! End-to-end: real producer threads feeding `SensorState` while the control
//! loop runs on its own thread against the system clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use sumo_hal::sim::RecordingSink;
use sumo_hal::{MotionPrimitiveExecutor, ShutdownSignal, SystemClock};
use sumo_perception::SensorState;
use sumo_runtime::{
    ArbiterConfig, CommandGuard, ControlLoop, ControlLoopConfig, PriorityArbiter,
    StrategySelector,
};
use sumo_types::{OpponentObservation, RangeSnapshot, SumoError};

fn build_loop(sensors: Arc<SensorState>, sink: &RecordingSink) -> ControlLoop {
    let clock = Arc::new(SystemClock);
    let executor =
        MotionPrimitiveExecutor::new(Box::new(sink.clone()), clock.clone(), ShutdownSignal::new());
    let arbiter = PriorityArbiter::new(
        ArbiterConfig::default(),
        sensors,
        StrategySelector::seeded(2024),
        CommandGuard::standard(1.0, 2.0),
        executor,
    )
    .unwrap();
    ControlLoop::new(arbiter, clock, ControlLoopConfig::default())
}

#[test]
fn producers_drive_engagement_then_boundary_avoidance() {
    let sensors = Arc::new(SensorState::new());
    let sink = RecordingSink::new("cmd_vel");
    let mut control = build_loop(Arc::clone(&sensors), &sink);
    let shutdown = control.shutdown_signal();

    let breach = Arc::new(AtomicBool::new(false));
    let producers_done = Arc::new(AtomicBool::new(false));

    let vision = {
        let sensors = Arc::clone(&sensors);
        let done = Arc::clone(&producers_done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                sensors.update_opponent(OpponentObservation::sighted(170, 120, 600.0));
                thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let range = {
        let sensors = Arc::clone(&sensors);
        let done = Arc::clone(&producers_done);
        let breach = Arc::clone(&breach);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                let front = if breach.load(Ordering::Acquire) { 0.10 } else { 1.5 };
                sensors.update_range(RangeSnapshot::new(front, 1.5, 1.5, 1.5));
                thread::sleep(Duration::from_millis(10));
            }
        })
    };

    let runner = thread::spawn(move || control.run());

    thread::sleep(Duration::from_millis(400));
    breach.store(true, Ordering::Release);
    thread::sleep(Duration::from_millis(600));
    shutdown.trigger();

    let result = runner.join().unwrap();
    producers_done.store(true, Ordering::Release);
    vision.join().unwrap();
    range.join().unwrap();

    assert!(result.is_ok(), "loop ended with {result:?}");

    let sent = sink.sent();
    assert!(sent.last().unwrap().is_zero(), "last command must be a stop");
    assert!(
        sent.iter().any(|t| t.linear_x > 0.0),
        "expected forward engagement commands"
    );
    assert!(
        sent.iter()
            .any(|t| (t.linear_x + 0.4).abs() < 1e-6 && t.angular_z == 0.0),
        "expected a boundary reverse"
    );
    assert!(
        sent.iter()
            .all(|t| t.linear_x.abs() <= 1.0 && t.angular_z.abs() <= 2.0)
    );
}

#[test]
fn silent_producers_keep_robot_searching() {
    let sensors = Arc::new(SensorState::new());
    let sink = RecordingSink::new("cmd_vel");
    let mut control = build_loop(sensors, &sink);

    assert_eq!(control.run_for_ticks(3).unwrap(), 3);

    let sent = sink.sent();
    assert!(sent.iter().all(|t| t.linear_x == 0.0));
    assert!(sent.iter().any(|t| t.angular_z > 0.0));
    assert!(sent.last().unwrap().is_zero());
}

#[test]
fn dead_sink_escalates_instead_of_spinning() {
    let sensors = Arc::new(SensorState::new());
    let sink = RecordingSink::new("cmd_vel");
    sink.set_fault(sumo_hal::sim::FaultMode::All);
    let mut control = build_loop(sensors, &sink);

    let err = control.run().unwrap_err();
    assert_eq!(err, SumoError::ActuationEscalated { failures: 5 });
    assert!(sink.is_empty());
}

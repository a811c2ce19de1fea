//! 端到端测试
//!
//! 通过 `Dispatcher` 驱动完整的控制链路：
//! 1. 模拟器按键动作的起止时序
//! 2. 轴反向与定时动作并发
//! 3. moveTo 会话的闭环收敛
//! 4. 执行器链路上的实际指令帧

use minotaur_sdk::control::{Scene, SessionOutcome};
use minotaur_sdk::prelude::*;
use minotaur_sdk::protocol::ZaberFrame;
use std::thread;
use std::time::{Duration, Instant};

fn simulator_rig() -> SimulatorRig {
    MinotaurBuilder::new().build_simulator().unwrap()
}

/// 轮询直到条件成立或超时
fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_unbound_dispatcher_rejects_everything() {
    let dispatcher = Dispatcher::new();
    assert!(!dispatcher.send_movement(1, 0, 100));
    assert!(!dispatcher.send_actuation(0, 100, 0));
    assert!(!dispatcher.send_movement_to(10, 10, 100, 0));
    assert!(!dispatcher.reset_simulator());
    assert!(!dispatcher.set_proportion(1.0));
    assert!(dispatcher.calculate_currents(0.1, 0.0).is_none());
}

#[test]
fn test_actuation_holds_key_for_duration() {
    let rig = simulator_rig();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());

    let start = Instant::now();
    assert!(dispatcher.send_actuation(0, 100, 0));
    // delay 0：按键在调用返回前已按下
    assert!(rig.controller.is_key_down(Key::Left));

    assert!(wait_until(Duration::from_secs(2), || !rig
        .controller
        .is_key_down(Key::Left)));
    let held = start.elapsed();
    assert!(held >= Duration::from_millis(95), "released after {:?}", held);
    assert!(held < Duration::from_millis(600), "released after {:?}", held);
}

#[test]
fn test_inversion_concurrent_with_actuation() {
    let rig = simulator_rig();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());

    assert!(dispatcher.send_actuation(0, 100, 0));

    let togglers: Vec<_> = (0..4)
        .map(|_| {
            let controller = rig.controller.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    controller.invert_axis(Axis::X);
                }
            })
        })
        .collect();
    for t in togglers {
        t.join().unwrap();
    }

    // 偶数次翻转后回到初始值
    assert_eq!(rig.controller.inversion(), (1, 1));
    assert!(rig.controller.wait_idle(Duration::from_secs(2)));
    assert!(!rig.controller.is_key_down(Key::Left));
}

#[test]
fn test_delayed_actuation_does_not_press_early() {
    let rig = simulator_rig();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());

    assert!(dispatcher.send_actuation(2, 50, 100));
    assert!(!rig.controller.is_key_down(Key::Up));
    assert!(wait_until(Duration::from_secs(2), || rig
        .controller
        .is_key_down(Key::Up)));
    assert!(rig.controller.wait_idle(Duration::from_secs(2)));
    assert!(!rig.controller.is_key_down(Key::Up));
}

#[test]
fn test_move_to_converges() {
    let rig = simulator_rig();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());
    let simulator = rig.controller.as_simulator().unwrap();

    assert!(dispatcher.set_proportion(5.0));
    assert!(dispatcher.set_integral(0.0));
    assert!(dispatcher.set_derivative(0.0));
    assert_eq!(simulator.gains(), PidGains::new(5.0, 0.0, 0.0));

    let target = Vector2f::new(0.04, 0.0);
    let initial_error = (target - rig.scene.sam().position).norm();

    assert!(dispatcher.send_movement_to(40, 0, 2000, 0));
    assert!(rig.controller.wait_idle(Duration::from_secs(10)));

    let outcomes = simulator.take_finished();
    assert_eq!(outcomes.len(), 1);
    match outcomes[0] {
        SessionOutcome::Completed { final_error, ticks } => {
            assert!(ticks > 0);
            assert!(
                final_error.norm() < initial_error,
                "error {:?} did not shrink from {}",
                final_error,
                initial_error
            );
        },
        other => panic!("unexpected outcome {:?}", other),
    }

    // 会话结束后线圈归零，手动控制恢复
    assert!(!rig.scene.controls_suspended());
    assert!(!rig.keyboard.is_suspended());
    assert_eq!(rig.scene.currents(), [0.0; 4]);
}

fn simulator_rig_with_policy(policy: SessionPolicy) -> SimulatorRig {
    let mut config = MinotaurConfig::default();
    config.pid.kp = 5.0;
    config.pid.policy = policy;
    MinotaurBuilder::new().config(config).build_simulator().unwrap()
}

#[test]
fn test_overlapping_move_to_preempts() {
    let rig = simulator_rig_with_policy(SessionPolicy::Preempt);
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());
    let simulator = rig.controller.as_simulator().unwrap();

    let start = Instant::now();
    assert!(dispatcher.send_movement_to(40, 0, 2000, 0));
    thread::sleep(Duration::from_millis(100));
    assert!(rig.keyboard.is_suspended());

    assert!(dispatcher.send_movement_to(-20, 0, 200, 0));
    assert!(rig.controller.wait_idle(Duration::from_secs(10)));
    // 第一个会话被提前结束，而不是跑满 2 秒
    assert!(start.elapsed() < Duration::from_millis(1500), "took {:?}", start.elapsed());

    let outcomes = simulator.take_finished();
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(outcomes[0], SessionOutcome::Preempted { .. }), "{:?}", outcomes[0]);
    assert!(matches!(outcomes[1], SessionOutcome::Completed { .. }), "{:?}", outcomes[1]);

    // 只有最后一个会话负责恢复
    assert!(!rig.keyboard.is_suspended());
    assert!(!rig.scene.controls_suspended());
    assert_eq!(rig.scene.currents(), [0.0; 4]);
}

#[test]
fn test_overlapping_move_to_queues() {
    let rig = simulator_rig_with_policy(SessionPolicy::Queue);
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());
    let simulator = rig.controller.as_simulator().unwrap();

    let start = Instant::now();
    assert!(dispatcher.send_movement_to(20, 0, 200, 0));
    assert!(dispatcher.send_movement_to(-20, 0, 200, 50));
    assert!(rig.controller.wait_idle(Duration::from_secs(10)));

    // 第二个会话等第一个结束后才开始
    assert!(start.elapsed() >= Duration::from_millis(390), "took {:?}", start.elapsed());

    let outcomes = simulator.take_finished();
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(matches!(outcome, SessionOutcome::Completed { .. }), "{:?}", outcome);
    }
    assert!(!rig.keyboard.is_suspended());
    assert!(!rig.scene.controls_suspended());
}

#[test]
fn test_overlapping_move_to_rejected() {
    let rig = simulator_rig_with_policy(SessionPolicy::Reject);
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());

    assert!(dispatcher.send_movement_to(20, 0, 200, 0));
    assert!(!dispatcher.send_movement_to(-20, 0, 200, 0));
    assert!(rig.controller.wait_idle(Duration::from_secs(10)));

    assert_eq!(rig.controller.as_simulator().unwrap().take_finished().len(), 1);
    assert!(dispatcher.send_movement_to(-20, 0, 50, 0));
    assert!(rig.controller.wait_idle(Duration::from_secs(10)));
}

#[test]
fn test_non_finite_gain_is_refused() {
    let rig = simulator_rig();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());

    assert!(!dispatcher.execute(&"kp inf".parse().unwrap()));
    assert!(!dispatcher.execute(&"kd nan".parse().unwrap()));
    assert_eq!(rig.controller.as_simulator().unwrap().gains(), PidGains::default());

    assert!(dispatcher.send_movement_to(40, 0, 100, 0));
    assert!(rig.controller.wait_idle(Duration::from_secs(5)));
    assert!(rig.scene.sam().position.is_finite());
}

#[test]
fn test_reset_returns_to_center() {
    let rig = MinotaurBuilder::new().realtime(false).build_simulator().unwrap();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());

    rig.controller.key_pressed(Key::Right);
    rig.scene.step(Duration::from_millis(100));
    rig.controller.key_released(Key::Right);
    assert!(rig.scene.sam().position.x > 0.0);

    assert!(dispatcher.reset_simulator());
    assert_eq!(rig.scene.sam().position, Vector2f::ZERO);
}

#[test]
fn test_calculate_currents_at_center() {
    let rig = MinotaurBuilder::new().realtime(false).build_simulator().unwrap();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());

    let currents = dispatcher.calculate_currents(0.1, 0.0).unwrap();
    assert!(currents.horizontal > 0.0);
    assert!(currents.vertical.abs() < 1e-6);
}

#[test]
fn test_actuator_wire_frames() {
    let adapter = MockSerialAdapter::new();
    let serial = adapter.handle();
    let controller = MinotaurBuilder::new()
        .build_actuator(Box::new(adapter))
        .unwrap();
    let dispatcher = Dispatcher::with_controller(controller.clone());

    assert!(dispatcher.send_movement(2, -1, 100));
    assert_eq!(
        serial.sent_frames(),
        vec![
            ZaberFrame::relative_move(1, 10),
            ZaberFrame::relative_move(2, -5),
        ]
    );
    serial.clear();

    assert!(dispatcher.send_actuation(1, 30, 0));
    assert!(controller.wait_idle(Duration::from_secs(2)));
    assert_eq!(
        serial.sent_frames(),
        vec![ZaberFrame::constant_speed(1, 1000), ZaberFrame::stop(1)]
    );
    serial.clear();

    assert!(dispatcher.send_movement_to(12, -3, 1000, 0));
    assert_eq!(
        serial.sent_frames(),
        vec![ZaberFrame::absolute_move(1, 60), ZaberFrame::absolute_move(2, -15)]
    );

    // 模拟器专有指令在执行器上失败
    assert!(!dispatcher.reset_simulator());
    assert!(!dispatcher.set_proportion(2.0));
    assert!(dispatcher.calculate_currents(0.1, 0.0).is_none());
}

#[test]
fn test_actuator_disconnect_reports_false() {
    let adapter = MockSerialAdapter::new();
    let serial = adapter.handle();
    let controller = MinotaurBuilder::new()
        .build_actuator(Box::new(adapter))
        .unwrap();
    let dispatcher = Dispatcher::with_controller(controller);

    serial.set_disconnected(true);
    assert!(!dispatcher.send_movement(1, 0, 100));
    assert!(serial.sent_frames().is_empty());
}

#[test]
fn test_actuator_overflowing_move_reports_false() {
    let adapter = MockSerialAdapter::new();
    let serial = adapter.handle();
    let controller = MinotaurBuilder::new()
        .build_actuator(Box::new(adapter))
        .unwrap();
    let dispatcher = Dispatcher::with_controller(controller.clone());

    assert!(!dispatcher.send_movement(i32::MAX, 0, 100));
    controller.invert_axis(Axis::Y);
    assert!(!dispatcher.send_movement(0, i32::MIN, 100));
    assert!(serial.sent_frames().is_empty());

    assert!(dispatcher.send_movement(1, 0, 100));
    assert_eq!(serial.sent_frames(), vec![ZaberFrame::relative_move(1, 5)]);
}

#[test]
fn test_json_script_runs_against_simulator() {
    let script = r#"[
        {"type": "kp", "value": 2.5},
        {"type": "actuate", "index": 3, "duration": 20},
        {"type": "move", "x": 1, "y": 0, "dt": 20},
        {"type": "reset"}
    ]"#;
    let commands: Vec<Command> = serde_json::from_str(script).unwrap();

    let rig = simulator_rig();
    let dispatcher = Dispatcher::with_controller(rig.controller.clone());
    for command in &commands {
        assert!(dispatcher.execute(command), "{} failed", command.name());
    }
    assert!(rig.controller.wait_idle(Duration::from_secs(2)));

    let simulator = rig.controller.as_simulator().unwrap();
    assert_eq!(simulator.gains().kp, 2.5);
    assert!(!rig.controller.is_key_down(Key::Down));
    assert!(!rig.controller.is_key_down(Key::Right));
}

#[test]
fn test_rebind_switches_backend() {
    let dispatcher = Dispatcher::new();
    let sim = simulator_rig();
    let actuator = MinotaurBuilder::new()
        .build_actuator(Box::new(MockSerialAdapter::new()))
        .unwrap();

    dispatcher.bind(sim.controller.clone());
    assert!(dispatcher.reset_simulator());

    dispatcher.bind(actuator);
    assert!(!dispatcher.reset_simulator());

    assert!(dispatcher.unbind().is_some());
    assert!(!dispatcher.is_bound());
}

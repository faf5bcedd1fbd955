use logisim_core::peripherals::{Clock, Pin};
use logisim_core::{
    ClockListener, Port, SimulationError, Simulator, SimulatorConfig, SimulatorContext, WireValue,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn with_lock_is_not_reentrant_for_the_context() {
    init_logging();
    let sim = Simulator::new();
    let inner = sim
        .with_lock(|_ctx| sim.with_lock(|_nested| ()))
        .unwrap();
    assert!(matches!(inner, Err(SimulationError::ContextBusy)));
}

#[test]
fn clock_listener_must_use_its_context_argument() {
    init_logging();
    let sim = Simulator::new();
    let handle = sim.clone();
    let outcomes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    sim.add_clock_listener(Arc::new(move |ctx: &mut SimulatorContext, _value: &WireValue| {
        let busy = matches!(handle.has_links_to_update(), Err(SimulationError::ContextBusy));
        sink.lock().push((busy, ctx.clock_high()));
        Ok(())
    }))
    .unwrap();

    sim.tick_clock().unwrap();
    assert_eq!(*outcomes.lock(), vec![(true, true)]);
}

#[test]
fn handle_drives_a_circuit_to_quiescence() {
    init_logging();
    let sim = Simulator::new();
    let (top, a, b) = sim
        .with_lock(|ctx| {
            let circuit = ctx.add_circuit("main");
            let top = ctx.top_level_state(circuit)?;
            let a = ctx.add_component(circuit, Pin::input("a", 8))?;
            let b = ctx.add_component(circuit, Pin::output("b", 8))?;
            ctx.link_ports(Pin::port(a), Pin::port(b))?;
            Pin::set_value(ctx, a, top, &WireValue::of(0xA5, 8))?;
            Ok::<_, SimulationError>((top, a, b))
        })
        .unwrap()
        .unwrap();

    assert!(sim.has_links_to_update().unwrap());
    sim.step_all().unwrap();
    assert!(!sim.has_links_to_update().unwrap());

    let received = sim
        .with_lock(|ctx| ctx.last_received(top, Pin::port(b)))
        .unwrap()
        .unwrap();
    assert_eq!(received.value().unwrap(), 0xA5);
    assert_eq!(received.to_hex_string(), "a5");

    let snapshot = sim.with_lock(|ctx| ctx.snapshot_state(top)).unwrap().unwrap();
    assert_eq!(snapshot.last_pushed(Pin::port(a)).unwrap(), WireValue::of(0xA5, 8));

    sim.clear().unwrap();
    sim.step_all().unwrap();
}

#[test]
fn manual_ticks_reach_clock_listeners() {
    init_logging();
    let sim = Simulator::new();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    let listener: ClockListener = Arc::new(move |_ctx: &mut SimulatorContext, _value: &WireValue| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    sim.add_clock_listener(listener.clone()).unwrap();

    assert!(sim.tick_clock().unwrap());
    assert!(!sim.tick_clock().unwrap());
    assert_eq!(ticks.load(Ordering::SeqCst), 2);

    sim.remove_clock_listener(&listener).unwrap();
    sim.tick_clock().unwrap();
    assert_eq!(ticks.load(Ordering::SeqCst), 2);

    sim.reset_clock().unwrap();
    assert!(!sim.with_lock(|ctx| ctx.clock_high()).unwrap());
}

#[test]
fn background_clock_toggles_until_stopped() {
    init_logging();
    let sim = Simulator::with_config(SimulatorConfig::new().with_clock_hertz(500));
    let (top, out) = sim
        .with_lock(|ctx| {
            let circuit = ctx.add_circuit("clocked");
            let top = ctx.top_level_state(circuit)?;
            let clock = ctx.add_component(circuit, Clock::new("clk"))?;
            let out = ctx.add_component(circuit, Pin::output("out", 1))?;
            ctx.link_ports(Port::new(clock, Clock::PORT), Pin::port(out))?;
            Ok::<_, SimulationError>((top, out))
        })
        .unwrap()
        .unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    sim.add_clock_listener(Arc::new(move |ctx: &mut SimulatorContext, _value: &WireValue| {
        counter.fetch_add(1, Ordering::SeqCst);
        ctx.step_all()
    }))
    .unwrap();

    sim.start_default_clock().unwrap();
    assert!(sim.is_clock_running());
    thread::sleep(Duration::from_millis(100));
    sim.stop_clock();
    assert!(!sim.is_clock_running());

    let seen = ticks.load(Ordering::SeqCst);
    assert!(seen > 0, "Clock thread never ticked");
    thread::sleep(Duration::from_millis(20));
    assert_eq!(ticks.load(Ordering::SeqCst), seen, "No ticks after stop");

    let (high, received) = sim
        .with_lock(|ctx| (ctx.clock_high(), ctx.last_received(top, Pin::port(out))))
        .unwrap();
    assert_eq!(received.unwrap(), WireValue::of(high as u64, 1));
    assert_eq!(sim.last_tick_count(), 0);
}

// Tests for link topology, propagation and stepping
#[cfg(test)]
mod tests {
    use crate::core::components::{Component, ComponentContext};
    use crate::core::errors::{SimResult, SimulationError};
    use crate::core::execution::{SimulatorConfig, SimulatorContext};
    use crate::core::types::{CircuitId, Port, StateId};
    use crate::core::values::{BitState, WireValue};
    use crate::peripherals::{NotGate, Pin, PinChangeListener};
    use parking_lot::Mutex;
    use std::any::Any;
    use std::sync::Arc;

    fn setup() -> (SimulatorContext, CircuitId, StateId) {
        let mut sim = SimulatorContext::default();
        let circuit = sim.add_circuit("main");
        let top = sim.top_level_state(circuit).unwrap();
        (sim, circuit, top)
    }

    fn bit(value: u64) -> WireValue {
        WireValue::of(value, 1)
    }

    /// Fails whenever a high value reaches it
    struct Faulty;

    impl Component for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn port_widths(&self) -> Vec<usize> {
            vec![1]
        }

        fn value_changed(&self, _ctx: &mut ComponentContext<'_>, value: &WireValue, _port_index: usize) -> SimResult<()> {
            if value.bit(0) == BitState::One {
                return Err(SimulationError::Component("faulty input".to_string()));
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_linked_pins_share_a_value() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let b = sim.add_component(circuit, Pin::output("b", 1)).unwrap();

        sim.link_ports(Pin::port(a), Pin::port(b)).unwrap();
        assert_eq!(sim.port_link(Pin::port(a)).unwrap(), sim.port_link(Pin::port(b)).unwrap());

        sim.step_all().unwrap();
        assert_eq!(sim.last_received(top, Pin::port(b)).unwrap(), bit(0));

        Pin::set_value(&mut sim, a, top, &bit(1)).unwrap();
        sim.step_all().unwrap();
        assert_eq!(sim.last_received(top, Pin::port(b)).unwrap(), bit(1));
        assert_eq!(sim.merged_value(top, sim.port_link(Pin::port(a)).unwrap()).unwrap(), bit(1));
        assert!(!sim.has_links_to_update());
    }

    #[test]
    fn test_unlink_carves_port_into_own_link() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let observer = Arc::new(Pin::output("b", 1));
        let b = sim.add_shared_component(circuit, observer.clone()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: PinChangeListener = Arc::new(move |_sim: &mut SimulatorContext, value: &WireValue| {
            sink.lock().push(value.clone());
            Ok(())
        });
        observer.add_change_listener(top, listener);

        sim.link_ports(Pin::port(a), Pin::port(b)).unwrap();
        Pin::set_value(&mut sim, a, top, &bit(1)).unwrap();
        sim.step_all().unwrap();
        assert_eq!(seen.lock().last(), Some(&bit(1)));

        sim.unlink_ports(Pin::port(a), Pin::port(b)).unwrap();
        assert_ne!(sim.port_link(Pin::port(a)).unwrap(), sim.port_link(Pin::port(b)).unwrap());
        assert_eq!(seen.lock().last(), Some(&WireValue::new(1)), "Carved port is told synchronously");
        assert_eq!(sim.last_received(top, Pin::port(b)).unwrap(), WireValue::new(1));

        sim.step_all().unwrap();
        assert_eq!(sim.last_received(top, Pin::port(b)).unwrap(), WireValue::new(1));
        assert_eq!(sim.last_pushed(top, Pin::port(a)).unwrap(), bit(1));
    }

    #[test]
    fn test_unlink_of_foreign_port_is_noop() {
        let (mut sim, circuit, _) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let b = sim.add_component(circuit, Pin::output("b", 1)).unwrap();
        let c = sim.add_component(circuit, Pin::output("c", 1)).unwrap();
        sim.link_ports(Pin::port(a), Pin::port(b)).unwrap();

        let before = sim.port_link(Pin::port(a)).unwrap();
        sim.unlink_ports(Pin::port(a), Pin::port(c)).unwrap();
        sim.unlink_ports(Pin::port(c), Pin::port(c)).unwrap();
        assert_eq!(sim.port_link(Pin::port(a)).unwrap(), before);
        assert_eq!(sim.link(before).unwrap().len(), 2);
    }

    #[test]
    fn test_link_rejects_width_mismatch_and_foreign_circuit() {
        let (mut sim, circuit, _) = setup();
        let narrow = sim.add_component(circuit, Pin::input("narrow", 1)).unwrap();
        let wide = sim.add_component(circuit, Pin::output("wide", 4)).unwrap();
        assert!(matches!(
            sim.link_ports(Pin::port(narrow), Pin::port(wide)),
            Err(SimulationError::WidthMismatch { expected: 1, found: 4 })
        ));

        let other = sim.add_circuit("other");
        let foreign = sim.add_component(other, Pin::output("foreign", 1)).unwrap();
        assert!(matches!(
            sim.link_ports(Pin::port(narrow), Pin::port(foreign)),
            Err(SimulationError::DifferentCircuits { .. })
        ));
    }

    #[test]
    fn test_short_circuit_reported_then_resolved() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let b = sim.add_component(circuit, Pin::input("b", 1)).unwrap();
        sim.link_ports(Pin::port(a), Pin::port(b)).unwrap();
        sim.step_all().unwrap();

        Pin::set_value(&mut sim, a, top, &bit(1)).unwrap();
        let err = sim.step_all().unwrap_err();
        assert!(err.is_short_circuit(), "Expected short circuit, got {}", err);
        let link = sim.port_link(Pin::port(a)).unwrap();
        assert!(sim.is_short_circuited(top, link).unwrap());
        if let SimulationError::ShortCircuit(sc) = err {
            assert_eq!(sc.link, Some(link));
        }

        Pin::set_value(&mut sim, b, top, &bit(1)).unwrap();
        sim.step_all().unwrap();
        assert!(!sim.is_short_circuited(top, link).unwrap());
        assert_eq!(sim.merged_value(top, link).unwrap(), bit(1));
    }

    #[test]
    fn test_component_error_outranks_short_circuit() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let b = sim.add_component(circuit, Pin::input("b", 1)).unwrap();
        let c = sim.add_component(circuit, Pin::input("c", 1)).unwrap();
        let faulty = sim.add_component(circuit, Faulty).unwrap();
        sim.link_ports(Pin::port(a), Pin::port(b)).unwrap();
        sim.link_ports(Pin::port(c), Port::new(faulty, 0)).unwrap();
        sim.step_all().unwrap();

        Pin::set_value(&mut sim, a, top, &bit(1)).unwrap();
        Pin::set_value(&mut sim, c, top, &bit(1)).unwrap();
        let err = sim.step().unwrap_err();
        assert!(
            matches!(err, SimulationError::Component(_)),
            "Expected component error, got {}",
            err
        );
    }

    #[test]
    fn test_short_circuit_deferred_while_pending() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let b = sim.add_component(circuit, Pin::input("b", 1)).unwrap();
        let c = sim.add_component(circuit, Pin::input("c", 1)).unwrap();
        let not = sim.add_component(circuit, NotGate::new("not", 1)).unwrap();
        let d = sim.add_component(circuit, Pin::output("d", 1)).unwrap();
        sim.link_ports(Pin::port(a), Pin::port(b)).unwrap();
        sim.link_ports(Pin::port(c), Port::new(not, NotGate::INPUT)).unwrap();
        sim.link_ports(Port::new(not, NotGate::OUTPUT), Pin::port(d)).unwrap();
        sim.step_all().unwrap();

        let shorted = sim.port_link(Pin::port(a)).unwrap();
        Pin::set_value(&mut sim, a, top, &bit(1)).unwrap();
        Pin::set_value(&mut sim, c, top, &bit(1)).unwrap();

        sim.step().unwrap();
        assert!(sim.is_short_circuited(top, shorted).unwrap());
        assert!(
            sim.links_to_update().contains(&(top, shorted)),
            "Shorted link is retried while the gate output is pending"
        );

        match sim.step() {
            Err(SimulationError::ShortCircuit(sc)) => assert_eq!(sc.link, Some(shorted)),
            other => panic!("Expected short circuit, got {:?}", other),
        }
        assert_eq!(sim.last_received(top, Pin::port(d)).unwrap(), bit(0));
    }

    #[test]
    fn test_released_state_updates_are_skipped() {
        let (mut sim, circuit, _) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let b = sim.add_component(circuit, Pin::output("b", 1)).unwrap();
        sim.link_ports(Pin::port(a), Pin::port(b)).unwrap();
        sim.step_all().unwrap();

        let extra = sim.instantiate(circuit).unwrap();
        Pin::set_value(&mut sim, a, extra, &bit(1)).unwrap();
        assert!(sim.has_links_to_update());

        sim.release_state(extra).unwrap();
        assert!(!sim.has_links_to_update());

        let link = sim.port_link(Pin::port(a)).unwrap();
        sim.value_changed(extra, link);
        sim.step().unwrap();
        assert!(!sim.has_links_to_update());
    }

    #[test]
    fn test_updates_for_removed_link_are_skipped() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        sim.step_all().unwrap();
        let link = sim.port_link(Pin::port(a)).unwrap();

        sim.remove_component(circuit, a).unwrap();
        sim.value_changed(top, link);
        sim.step().unwrap();
        assert!(!sim.has_links_to_update());
    }

    #[test]
    fn test_step_runs_one_round() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        let not = sim.add_component(circuit, NotGate::new("not", 1)).unwrap();
        let b = sim.add_component(circuit, Pin::output("b", 1)).unwrap();
        sim.link_ports(Pin::port(a), Port::new(not, NotGate::INPUT)).unwrap();
        sim.link_ports(Port::new(not, NotGate::OUTPUT), Pin::port(b)).unwrap();
        sim.step_all().unwrap();
        assert_eq!(sim.last_received(top, Pin::port(b)).unwrap(), bit(1));

        Pin::set_value(&mut sim, a, top, &bit(1)).unwrap();
        sim.step().unwrap();
        assert!(sim.has_links_to_update(), "Gate output waits for the next round");
        assert_eq!(sim.last_received(top, Pin::port(b)).unwrap(), bit(1));

        sim.step().unwrap();
        assert!(!sim.has_links_to_update());
        assert_eq!(sim.last_received(top, Pin::port(b)).unwrap(), bit(0));
    }

    #[test]
    fn test_not_loop_oscillates() {
        let (mut sim, circuit, top) = setup();
        let not = sim.add_component(circuit, NotGate::new("not", 1)).unwrap();
        sim.link_ports(Port::new(not, NotGate::INPUT), Port::new(not, NotGate::OUTPUT))
            .unwrap();
        sim.push_value(top, Port::new(not, NotGate::OUTPUT), &bit(0)).unwrap();

        match sim.step_all() {
            Err(SimulationError::Oscillation { repeats }) => assert_eq!(repeats, 10),
            other => panic!("Expected oscillation, got {:?}", other),
        }
    }

    #[test]
    fn test_oscillation_threshold_is_configurable() {
        let config = SimulatorConfig::new().with_oscillation_threshold(3);
        let mut sim = SimulatorContext::new(config);
        let circuit = sim.add_circuit("loop");
        let top = sim.top_level_state(circuit).unwrap();
        let not = sim.add_component(circuit, NotGate::new("not", 1)).unwrap();
        sim.link_ports(Port::new(not, NotGate::INPUT), Port::new(not, NotGate::OUTPUT))
            .unwrap();
        sim.push_value(top, Port::new(not, NotGate::OUTPUT), &bit(1)).unwrap();

        assert!(matches!(
            sim.step_all(),
            Err(SimulationError::Oscillation { repeats: 3 })
        ));
    }

    #[test]
    fn test_removed_link_updates_are_dropped() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 1)).unwrap();
        assert!(sim.has_links_to_update());

        sim.remove_component(circuit, a).unwrap();
        assert!(!sim.has_links_to_update());
        assert!(sim.last_received(top, Pin::port(a)).is_err());
        sim.step_all().unwrap();
    }

    #[test]
    fn test_push_width_mismatch() {
        let (mut sim, circuit, top) = setup();
        let a = sim.add_component(circuit, Pin::input("a", 4)).unwrap();
        assert!(matches!(
            sim.push_value(top, Pin::port(a), &bit(1)),
            Err(SimulationError::WidthMismatch { expected: 4, found: 1 })
        ));
    }
}

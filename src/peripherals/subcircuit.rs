use crate::core::circuit::CircuitState;
use crate::core::components::{
    downcast_component, downcast_property, downcast_state, Component, ComponentContext, Property,
};
use crate::core::errors::{SimResult, SimulationError};
use crate::core::execution::SimulatorContext;
use crate::core::types::{CircuitId, ComponentId, Port, StateId};
use crate::core::values::WireValue;
use crate::peripherals::pin::{Pin, PinChangeListener};
use log::debug;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One boundary pin of the inner circuit, mirrored as a subcircuit port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSlot {
    pub pin: ComponentId,
    pub width: usize,
    pub is_input: bool,
}

/// Per-state property of a placed subcircuit
#[derive(Debug, Clone)]
pub struct SubcircuitState {
    /// Nested state of the inner circuit driven by this instance
    pub nested: Option<StateId>,
    /// The nested state as it was when the instance was last uninitialised
    pub retired: Option<CircuitState>,
}

/// A circuit embedded as a component of another circuit.
///
/// Port `i` mirrors the `i`-th pin of the inner circuit. Every state the
/// subcircuit is initialised in gets its own nested state of the inner
/// circuit: values arriving on input ports are driven onto the inner input
/// pins, and values reaching inner output pins are pushed back out.
pub struct Subcircuit {
    name: String,
    inner: CircuitId,
    pins: Vec<PinSlot>,
}

impl Subcircuit {
    pub fn new(sim: &SimulatorContext, name: impl Into<String>, inner: CircuitId) -> SimResult<Self> {
        let mut pins = Vec::new();
        for id in sim.components(inner)? {
            let handle = sim.component(id)?;
            if let Some(pin) = downcast_component::<Pin>(handle.as_ref()) {
                pins.push(PinSlot {
                    pin: id,
                    width: pin.width(),
                    is_input: pin.is_input(),
                });
            }
        }

        Ok(Self {
            name: name.into(),
            inner,
            pins,
        })
    }

    pub fn inner(&self) -> CircuitId {
        self.inner
    }

    pub fn pins(&self) -> &[PinSlot] {
        &self.pins
    }

    /// Subcircuit port index of an inner pin
    pub fn port_of(&self, pin: ComponentId) -> Option<usize> {
        self.pins.iter().position(|slot| slot.pin == pin)
    }

    /// Nested state backing this instance in an outer state
    pub fn nested_state(sim: &SimulatorContext, outer: StateId, component: ComponentId) -> SimResult<StateId> {
        let property = sim.component_property(outer, component)?;
        property
            .and_then(|property| downcast_state::<SubcircuitState>(property).ok())
            .and_then(|state| state.nested)
            .ok_or(SimulationError::StateNotFound(outer))
    }

    fn register_output_listeners(
        &self,
        sim: &SimulatorContext,
        outer: StateId,
        component: ComponentId,
        nested: StateId,
    ) -> SimResult<()> {
        for (index, slot) in self.pins.iter().enumerate().filter(|(_, slot)| !slot.is_input) {
            let handle = sim.component(slot.pin)?;
            if let Some(pin) = downcast_component::<Pin>(handle.as_ref()) {
                let target = Port::new(component, index);
                let listener: PinChangeListener =
                    Arc::new(move |sim: &mut SimulatorContext, value: &WireValue| sim.push_value(outer, target, value));
                pin.add_change_listener(nested, listener);
            }
        }
        Ok(())
    }

    fn clear_output_listeners(&self, sim: &SimulatorContext, nested: StateId) -> SimResult<()> {
        for slot in self.pins.iter().filter(|slot| !slot.is_input) {
            let handle = sim.component(slot.pin)?;
            if let Some(pin) = downcast_component::<Pin>(handle.as_ref()) {
                pin.clear_change_listeners(nested);
            }
        }
        Ok(())
    }
}

/// Whether `circuit` is reachable from `from` through nested subcircuits
fn reaches(sim: &SimulatorContext, from: CircuitId, circuit: CircuitId, visited: &mut HashSet<CircuitId>) -> bool {
    if from == circuit {
        return true;
    }
    if !visited.insert(from) {
        return false;
    }

    let Ok(components) = sim.components(from) else {
        return false;
    };
    components.into_iter().any(|id| {
        sim.component(id)
            .ok()
            .and_then(|handle| downcast_component::<Subcircuit>(handle.as_ref()).map(|sub| sub.inner))
            .map_or(false, |inner| reaches(sim, inner, circuit, visited))
    })
}

impl Component for Subcircuit {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_widths(&self) -> Vec<usize> {
        self.pins.iter().map(|slot| slot.width).collect()
    }

    fn check_placement(&self, sim: &SimulatorContext, circuit: CircuitId) -> SimResult<()> {
        if reaches(sim, self.inner, circuit, &mut HashSet::new()) {
            return Err(SimulationError::SubcircuitLoop(circuit));
        }
        Ok(())
    }

    fn init(&self, ctx: &mut ComponentContext<'_>, prior: Option<Property>) -> SimResult<()> {
        let priors: HashMap<ComponentId, Property> = match prior {
            Some(prior) => downcast_property::<SubcircuitState>(prior)?
                .retired
                .map(CircuitState::into_properties)
                .unwrap_or_default(),
            None => HashMap::new(),
        };

        let outer = ctx.state();
        let component = ctx.component();
        let nested = ctx.simulator().create_state(self.inner)?;
        ctx.put_property(SubcircuitState {
            nested: Some(nested),
            retired: None,
        })?;
        debug!("{} drives {} from {}", component, nested, outer);

        self.register_output_listeners(ctx.simulator_ref(), outer, component, nested)?;
        ctx.simulator().init_components(nested, priors)
    }

    fn uninit(&self, ctx: &mut ComponentContext<'_>) -> SimResult<()> {
        let Some(nested) = ctx
            .property::<SubcircuitState>()?
            .and_then(|state| state.nested)
        else {
            return Ok(());
        };

        let uninit = ctx.simulator().uninit_components(nested);
        self.clear_output_listeners(ctx.simulator_ref(), nested)?;
        let retired = ctx.simulator().release_state(nested)?;
        if let Some(state) = ctx.property_mut::<SubcircuitState>()? {
            state.nested = None;
            state.retired = Some(retired);
        }
        uninit
    }

    fn value_changed(&self, ctx: &mut ComponentContext<'_>, value: &WireValue, port_index: usize) -> SimResult<()> {
        let Some(slot) = self.pins.get(port_index) else {
            return Err(SimulationError::PortNotFound(ctx.port(port_index)));
        };
        if !slot.is_input {
            return Ok(());
        }

        let nested = Self::nested_state(ctx.simulator_ref(), ctx.state(), ctx.component())?;
        Pin::set_value(ctx.simulator(), slot.pin, nested, value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

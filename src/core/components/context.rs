use crate::core::components::state::{downcast_state, downcast_state_mut, ComponentState, Property};
use crate::core::errors::SimResult;
use crate::core::execution::context::SimulatorContext;
use crate::core::types::{CircuitId, ComponentId, Port, StateId};
use crate::core::values::WireValue;
use std::any::Any;

/// View of the simulator handed to a component callback.
///
/// Scoped to one circuit state and one component: port indices are resolved
/// against the component's own ports and the property slot is the
/// component's own slot in that state.
pub struct ComponentContext<'a> {
    sim: &'a mut SimulatorContext,
    state: StateId,
    component: ComponentId,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(sim: &'a mut SimulatorContext, state: StateId, component: ComponentId) -> Self {
        Self {
            sim,
            state,
            component,
        }
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    /// Circuit the current state instantiates
    pub fn circuit(&self) -> SimResult<CircuitId> {
        self.sim.state(self.state).map(|state| state.circuit())
    }

    /// Whether the current state is the top-level state of its circuit
    pub fn is_top_level(&self) -> bool {
        self.circuit()
            .and_then(|circuit| self.sim.top_level_state(circuit))
            .map(|top| top == self.state)
            .unwrap_or(false)
    }

    pub fn port(&self, index: usize) -> Port {
        Port::new(self.component, index)
    }

    /// Push a value onto one of this component's ports
    pub fn push_value(&mut self, index: usize, value: &WireValue) -> SimResult<()> {
        self.sim.push_value(self.state, self.port(index), value)
    }

    pub fn last_received(&self, index: usize) -> SimResult<WireValue> {
        self.sim.last_received(self.state, self.port(index))
    }

    pub fn last_pushed(&self, index: usize) -> SimResult<WireValue> {
        self.sim.last_pushed(self.state, self.port(index))
    }

    /// Typed read of this component's property in the current state
    pub fn property<T: Any>(&self) -> SimResult<Option<&T>> {
        match self.sim.component_property(self.state, self.component)? {
            Some(property) => Ok(Some(downcast_state::<T>(property)?)),
            None => Ok(None),
        }
    }

    pub fn property_mut<T: Any>(&mut self) -> SimResult<Option<&mut T>> {
        match self.sim.component_property_mut(self.state, self.component)? {
            Some(property) => Ok(Some(downcast_state_mut::<T>(property)?)),
            None => Ok(None),
        }
    }

    pub fn put_property<T: ComponentState + 'static>(&mut self, property: T) -> SimResult<()> {
        self.sim
            .put_component_property(self.state, self.component, Box::new(property))
    }

    pub fn remove_property(&mut self) -> SimResult<Option<Property>> {
        self.sim.remove_component_property(self.state, self.component)
    }

    /// Current simulator clock bit
    pub fn clock_high(&self) -> bool {
        self.sim.clock_high()
    }

    /// Full simulator access, for components that manage nested states
    pub fn simulator(&mut self) -> &mut SimulatorContext {
        self.sim
    }

    pub fn simulator_ref(&self) -> &SimulatorContext {
        self.sim
    }
}

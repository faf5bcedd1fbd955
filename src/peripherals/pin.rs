use crate::core::components::{Component, ComponentContext, Property};
use crate::core::errors::SimResult;
use crate::core::execution::SimulatorContext;
use crate::core::types::{ComponentId, Port, StateId};
use crate::core::values::WireValue;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback run when a pin receives a new value in one state.
///
/// Runs during propagation; use the context argument, not a `Simulator` handle.
pub type PinChangeListener = Arc<dyn Fn(&mut SimulatorContext, &WireValue) -> SimResult<()> + Send + Sync>;

/// Circuit boundary terminal.
///
/// Input pins drive a value into the circuit; output pins observe one. In
/// the top-level state an input pin starts at 0. Nested states get their
/// input values from the enclosing subcircuit instead.
pub struct Pin {
    name: String,
    width: usize,
    is_input: bool,
    listeners: Mutex<HashMap<StateId, Vec<PinChangeListener>>>,
}

impl Pin {
    pub const PORT: usize = 0;

    pub fn new(name: impl Into<String>, width: usize, is_input: bool) -> Self {
        Self {
            name: name.into(),
            width,
            is_input,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    pub fn input(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, width, true)
    }

    pub fn output(name: impl Into<String>, width: usize) -> Self {
        Self::new(name, width, false)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_input(&self) -> bool {
        self.is_input
    }

    /// Port of a placed pin
    pub fn port(id: ComponentId) -> Port {
        Port::new(id, Self::PORT)
    }

    /// Drive a value from a placed pin in the given state
    pub fn set_value(sim: &mut SimulatorContext, pin: ComponentId, state: StateId, value: &WireValue) -> SimResult<()> {
        sim.push_value(state, Self::port(pin), value)
    }

    pub fn add_change_listener(&self, state: StateId, listener: PinChangeListener) {
        self.listeners.lock().entry(state).or_default().push(listener);
    }

    pub fn remove_change_listener(&self, state: StateId, listener: &PinChangeListener) {
        if let Some(listeners) = self.listeners.lock().get_mut(&state) {
            listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
        }
    }

    /// Drop every listener registered for a state
    pub fn clear_change_listeners(&self, state: StateId) {
        self.listeners.lock().remove(&state);
    }
}

impl Component for Pin {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_widths(&self) -> Vec<usize> {
        vec![self.width]
    }

    fn init(&self, ctx: &mut ComponentContext<'_>, _prior: Option<Property>) -> SimResult<()> {
        if self.is_input && ctx.is_top_level() {
            ctx.push_value(Self::PORT, &WireValue::of(0, self.width))?;
        }
        Ok(())
    }

    fn value_changed(&self, ctx: &mut ComponentContext<'_>, value: &WireValue, _port_index: usize) -> SimResult<()> {
        let listeners = self
            .listeners
            .lock()
            .get(&ctx.state())
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(ctx.simulator(), value)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

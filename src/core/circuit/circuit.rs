use crate::core::circuit::CircuitState;
use crate::core::components::{Component, Property};
use crate::core::connections::Link;
use crate::core::errors::{SimResult, SimulationError};
use crate::core::execution::context::{ComponentEntry, SimulatorContext};
use crate::core::types::{CircuitId, ComponentId, LinkId, Port, StateId};
use indexmap::IndexSet;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Observer of structural changes to a circuit
pub trait CircuitChangeListener: Send + Sync {
    fn circuit_changed(&self, circuit: CircuitId, component: ComponentId, added: bool);
}

/// A component topology plus the states instantiated against it.
///
/// The top-level state is created together with the circuit; further states
/// come from nested instantiation (subcircuits) or explicit calls to
/// [`SimulatorContext::instantiate`].
pub struct Circuit {
    id: CircuitId,
    name: String,
    components: IndexSet<ComponentId>,
    states: IndexSet<StateId>,
    top_level: StateId,
    listeners: Vec<Arc<dyn CircuitChangeListener>>,
}

impl Circuit {
    pub fn id(&self) -> CircuitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn top_level_state(&self) -> StateId {
        self.top_level
    }

    /// Components in insertion order
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.iter().copied()
    }

    pub fn contains_component(&self, component: ComponentId) -> bool {
        self.components.contains(&component)
    }

    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.states.iter().copied()
    }

    pub fn contains_state(&self, state: StateId) -> bool {
        self.states.contains(&state)
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Circuit {}", self.name)
    }
}

impl SimulatorContext {
    /// Create a circuit together with its top-level state
    pub fn add_circuit(&mut self, name: impl Into<String>) -> CircuitId {
        let id = self.handles.circuit();
        let top_level = self.handles.state();

        let mut states = IndexSet::new();
        states.insert(top_level);
        self.states.insert(top_level, CircuitState::new(top_level, id));

        let circuit = Circuit {
            id,
            name: name.into(),
            components: IndexSet::new(),
            states,
            top_level,
            listeners: Vec::new(),
        };
        debug!("Created {} as {} with top-level {}", circuit, id, top_level);
        self.circuits.insert(id, circuit);
        id
    }

    /// Tear a circuit down: its components, links and states all go
    pub fn remove_circuit(&mut self, id: CircuitId) -> SimResult<()> {
        let cleared = self.clear_components(id);
        let circuit = self
            .circuits
            .shift_remove(&id)
            .ok_or(SimulationError::CircuitNotFound(id))?;
        for state in circuit.states() {
            self.states.remove(&state);
            self.state_removed(state);
        }
        debug!("Removed {}", circuit);
        cleared
    }

    pub fn circuit_name(&self, id: CircuitId) -> SimResult<&str> {
        Ok(self.circuit(id)?.name())
    }

    pub fn set_circuit_name(&mut self, id: CircuitId, name: impl Into<String>) -> SimResult<()> {
        self.circuit_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn top_level_state(&self, id: CircuitId) -> SimResult<StateId> {
        Ok(self.circuit(id)?.top_level_state())
    }

    pub fn add_circuit_listener(
        &mut self,
        id: CircuitId,
        listener: Arc<dyn CircuitChangeListener>,
    ) -> SimResult<()> {
        self.circuit_mut(id)?.listeners.push(listener);
        Ok(())
    }

    pub fn remove_circuit_listener(
        &mut self,
        id: CircuitId,
        listener: &Arc<dyn CircuitChangeListener>,
    ) -> SimResult<()> {
        self.circuit_mut(id)?
            .listeners
            .retain(|existing| !Arc::ptr_eq(existing, listener));
        Ok(())
    }

    fn notify_circuit_listeners(&self, id: CircuitId, component: ComponentId, added: bool) {
        if let Some(circuit) = self.circuits.get(&id) {
            for listener in &circuit.listeners {
                listener.circuit_changed(id, component, added);
            }
        }
    }

    /// Create a bare state for a circuit. No component is initialised in it.
    pub fn create_state(&mut self, circuit: CircuitId) -> SimResult<StateId> {
        let id = self.handles.state();
        self.circuit_mut(circuit)?.states.insert(id);
        self.states.insert(id, CircuitState::new(id, circuit));
        debug!("Created {} for {}", id, circuit);
        Ok(id)
    }

    /// Create a state and initialise every component of the circuit in it
    pub fn instantiate(&mut self, circuit: CircuitId) -> SimResult<StateId> {
        let state = self.create_state(circuit)?;
        self.init_components(state, HashMap::new())?;
        Ok(state)
    }

    /// Detach a state from its circuit and hand it back.
    ///
    /// Pending work for the state is dropped. Components are not told;
    /// callers run `uninit` first when that matters.
    pub fn release_state(&mut self, state: StateId) -> SimResult<CircuitState> {
        let released = self
            .states
            .remove(&state)
            .ok_or(SimulationError::StateNotFound(state))?;
        if let Some(circuit) = self.circuits.get_mut(&released.circuit()) {
            circuit.states.shift_remove(&state);
        }
        self.state_removed(state);
        debug!("Released {}", state);
        Ok(released)
    }

    pub(crate) fn init_component(
        &mut self,
        state: StateId,
        component: ComponentId,
        prior: Option<Property>,
    ) -> SimResult<()> {
        self.with_component(state, component, |handle, ctx| handle.init(ctx, prior))
    }

    pub(crate) fn uninit_component(&mut self, state: StateId, component: ComponentId) -> SimResult<()> {
        self.with_component(state, component, |handle, ctx| handle.uninit(ctx))
    }

    /// Initialise every component of the state's circuit, handing each the
    /// matching entry of `priors`. Failures are collected; the first is
    /// returned once every component has been initialised.
    pub fn init_components(
        &mut self,
        state: StateId,
        mut priors: HashMap<ComponentId, Property>,
    ) -> SimResult<()> {
        let circuit = self.state(state)?.circuit();
        let components: Vec<ComponentId> = self.circuit(circuit)?.components().collect();

        let mut first_error = None;
        for component in components {
            let prior = priors.remove(&component);
            if let Err(err) = self.init_component(state, component, prior) {
                warn!("Init of {} in {} failed: {}", component, state, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Uninitialise every component of the state's circuit
    pub fn uninit_components(&mut self, state: StateId) -> SimResult<()> {
        let circuit = self.state(state)?.circuit();
        let components: Vec<ComponentId> = self.circuit(circuit)?.components().collect();

        let mut first_error = None;
        for component in components {
            if let Err(err) = self.uninit_component(state, component) {
                warn!("Uninit of {} in {} failed: {}", component, state, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Components of a circuit, in insertion order
    pub fn components(&self, circuit: CircuitId) -> SimResult<Vec<ComponentId>> {
        Ok(self.circuit(circuit)?.components().collect())
    }

    /// Place a component into a circuit.
    ///
    /// Each port gets its own singleton link and the component is initialised
    /// in every existing state of the circuit. If some `init` fails the
    /// component stays placed and the first failure is returned.
    pub fn add_component<C: Component>(&mut self, circuit: CircuitId, component: C) -> SimResult<ComponentId> {
        self.add_shared_component(circuit, Arc::new(component))
    }

    pub fn add_shared_component(
        &mut self,
        circuit: CircuitId,
        component: Arc<dyn Component>,
    ) -> SimResult<ComponentId> {
        self.place_component(circuit, component, HashMap::new())
    }

    fn place_component(
        &mut self,
        circuit: CircuitId,
        component: Arc<dyn Component>,
        mut priors: HashMap<StateId, Property>,
    ) -> SimResult<ComponentId> {
        self.circuit(circuit)?;
        component.check_placement(self, circuit)?;

        let id = self.handles.component();
        let mut links = Vec::new();
        for (index, width) in component.port_widths().into_iter().enumerate() {
            let link = self.handles.link();
            self.links
                .insert(link, Link::singleton(link, circuit, width, Port::new(id, index)));
            links.push(link);
        }

        debug!("Adding {} '{}' to {}", id, component.name(), circuit);
        self.components.insert(
            id,
            ComponentEntry {
                component,
                circuit,
                links,
            },
        );

        let states: Vec<StateId> = {
            let target = self.circuit_mut(circuit)?;
            target.components.insert(id);
            target.states().collect()
        };

        let mut first_error = None;
        for state in states {
            let prior = priors.remove(&state);
            if let Err(err) = self.init_component(state, id, prior) {
                warn!("Init of {} in {} failed: {}", id, state, err);
                first_error.get_or_insert(err);
            }
        }

        self.notify_circuit_listeners(circuit, id, true);
        first_error.map_or(Ok(id), Err)
    }

    fn ensure_unlinked(&self, component: ComponentId) -> SimResult<()> {
        let entry = self
            .components
            .get(&component)
            .ok_or(SimulationError::ComponentNotFound(component))?;
        for (index, link) in entry.links.iter().enumerate() {
            if self.links.get(link).map_or(false, |link| link.len() > 1) {
                return Err(SimulationError::StillLinked(Port::new(component, index)));
            }
        }
        Ok(())
    }

    /// Take a component out of its circuit, returning its property in each
    /// state. Ports must be unlinked.
    fn detach_component(
        &mut self,
        circuit: CircuitId,
        component: ComponentId,
        first_error: &mut Option<SimulationError>,
    ) -> SimResult<HashMap<StateId, Property>> {
        self.ensure_unlinked(component)?;

        let states: Vec<StateId> = {
            let target = self.circuit_mut(circuit)?;
            target.components.shift_remove(&component);
            target.states().collect()
        };

        for &state in &states {
            if let Err(err) = self.uninit_component(state, component) {
                warn!("Uninit of {} in {} failed: {}", component, state, err);
                first_error.get_or_insert(err);
            }
        }

        let links: Vec<LinkId> = self
            .components
            .remove(&component)
            .map(|entry| entry.links)
            .unwrap_or_default();

        let mut properties = HashMap::new();
        for &state in &states {
            if let Some(circuit_state) = self.states.get_mut(&state) {
                for link in &links {
                    circuit_state.link_states.remove(link);
                }
                if let Some(property) = circuit_state.properties.remove(&component) {
                    properties.insert(state, property);
                }
            }
        }
        for link in links {
            self.links.remove(&link);
            self.link_removed(link);
        }

        self.notify_circuit_listeners(circuit, component, false);
        Ok(properties)
    }

    /// Remove a component from a circuit.
    ///
    /// No-op when the component is not in the circuit. Fails with
    /// `StillLinked` while any of its ports shares a link.
    pub fn remove_component(&mut self, circuit: CircuitId, component: ComponentId) -> SimResult<()> {
        if !self.circuit(circuit)?.contains_component(component) {
            return Ok(());
        }

        let mut first_error = None;
        self.detach_component(circuit, component, &mut first_error)?;
        debug!("Removed {} from {}", component, circuit);
        first_error.map_or(Ok(()), Err)
    }

    /// Replace `old` with `new` in place.
    ///
    /// `old` must be fully unlinked. Its property in every state is handed to
    /// `new.init` as the prior property. Returns the new component's handle.
    pub fn update_component(
        &mut self,
        circuit: CircuitId,
        old: ComponentId,
        new: Arc<dyn Component>,
    ) -> SimResult<ComponentId> {
        if !self.circuit(circuit)?.contains_component(old) {
            return Err(SimulationError::ComponentNotFound(old));
        }
        self.ensure_unlinked(old)?;
        new.check_placement(self, circuit)?;

        let mut first_error = None;
        let priors = self.detach_component(circuit, old, &mut first_error)?;
        let placed = self.place_component(circuit, new, priors);

        match (placed, first_error) {
            (Ok(id), None) => {
                debug!("Replaced {} with {} in {}", old, id, circuit);
                Ok(id)
            }
            (Ok(_), Some(err)) | (Err(err), _) => Err(err),
        }
    }

    /// Remove every component of a circuit, wired or not.
    ///
    /// Components are uninitialised in every state; all of the circuit's
    /// links go with them.
    pub fn clear_components(&mut self, circuit: CircuitId) -> SimResult<()> {
        let (components, states): (Vec<ComponentId>, Vec<StateId>) = {
            let target = self.circuit(circuit)?;
            (target.components().collect(), target.states().collect())
        };

        let mut first_error = None;
        for &component in &components {
            for &state in &states {
                if let Err(err) = self.uninit_component(state, component) {
                    warn!("Uninit of {} in {} failed: {}", component, state, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        let links: Vec<LinkId> = self
            .links
            .values()
            .filter(|link| link.circuit() == circuit)
            .map(|link| link.id())
            .collect();
        for link in &links {
            self.links.remove(link);
            self.link_removed(*link);
        }
        for &state in &states {
            if let Some(circuit_state) = self.states.get_mut(&state) {
                circuit_state.link_states.clear();
                circuit_state.properties.clear();
            }
        }
        for &component in &components {
            self.components.remove(&component);
        }
        if let Ok(target) = self.circuit_mut(circuit) {
            target.components.clear();
        }
        for component in components {
            self.notify_circuit_listeners(circuit, component, false);
        }

        debug!("Cleared {}", circuit);
        first_error.map_or(Ok(()), Err)
    }
}

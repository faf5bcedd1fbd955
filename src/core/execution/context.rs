use crate::core::circuit::{Circuit, CircuitState};
use crate::core::components::{Component, ComponentContext};
use crate::core::connections::Link;
use crate::core::errors::{SimResult, SimulationError};
use crate::core::execution::clock::ClockListener;
use crate::core::execution::config::SimulatorConfig;
use crate::core::types::{CircuitId, ComponentId, HandleAllocator, LinkId, StateId};
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// A pending propagation: one link in one circuit state
pub type UpdatePair = (StateId, LinkId);

/// A component placed in a circuit, with the link each of its ports is on
pub(crate) struct ComponentEntry {
    pub(crate) component: Arc<dyn Component>,
    pub(crate) circuit: CircuitId,
    pub(crate) links: Vec<LinkId>,
}

/// Everything the simulator owns.
///
/// Circuits, components, links, circuit states and the event queue all live
/// here and are addressed by handle. The [`Simulator`](crate::core::execution::Simulator)
/// guards one of these behind its lock; every mutation of simulation state
/// happens through a `&mut SimulatorContext`.
pub struct SimulatorContext {
    pub(crate) config: SimulatorConfig,
    pub(crate) handles: HandleAllocator,
    pub(crate) circuits: IndexMap<CircuitId, Circuit>,
    pub(crate) components: HashMap<ComponentId, ComponentEntry>,
    pub(crate) links: HashMap<LinkId, Link>,
    pub(crate) states: HashMap<StateId, CircuitState>,
    pub(crate) pending: IndexSet<UpdatePair>,
    pub(crate) scratch: IndexSet<UpdatePair>,
    pub(crate) short_circuited: IndexSet<UpdatePair>,
    pub(crate) history: IndexSet<Vec<UpdatePair>>,
    pub(crate) stepping: bool,
    pub(crate) clock_high: bool,
    pub(crate) clock_listeners: Vec<ClockListener>,
}

impl SimulatorContext {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            handles: HandleAllocator::default(),
            circuits: IndexMap::new(),
            components: HashMap::new(),
            links: HashMap::new(),
            states: HashMap::new(),
            pending: IndexSet::new(),
            scratch: IndexSet::new(),
            short_circuited: IndexSet::new(),
            history: IndexSet::new(),
            stepping: false,
            clock_high: false,
            clock_listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn circuit(&self, id: CircuitId) -> SimResult<&Circuit> {
        self.circuits
            .get(&id)
            .ok_or(SimulationError::CircuitNotFound(id))
    }

    pub(crate) fn circuit_mut(&mut self, id: CircuitId) -> SimResult<&mut Circuit> {
        self.circuits
            .get_mut(&id)
            .ok_or(SimulationError::CircuitNotFound(id))
    }

    /// Every circuit, in creation order
    pub fn circuits(&self) -> Vec<CircuitId> {
        self.circuits.keys().copied().collect()
    }

    pub fn state(&self, id: StateId) -> SimResult<&CircuitState> {
        self.states
            .get(&id)
            .ok_or(SimulationError::StateNotFound(id))
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> SimResult<&mut CircuitState> {
        self.states
            .get_mut(&id)
            .ok_or(SimulationError::StateNotFound(id))
    }

    /// Shared handle to a component
    pub fn component(&self, id: ComponentId) -> SimResult<Arc<dyn Component>> {
        self.components
            .get(&id)
            .map(|entry| Arc::clone(&entry.component))
            .ok_or(SimulationError::ComponentNotFound(id))
    }

    /// Circuit a component is placed in
    pub fn component_circuit(&self, id: ComponentId) -> SimResult<CircuitId> {
        self.components
            .get(&id)
            .map(|entry| entry.circuit)
            .ok_or(SimulationError::ComponentNotFound(id))
    }

    /// Run a component callback against one state.
    ///
    /// The component handle is cloned out first so the callback is free to
    /// mutate the context.
    pub(crate) fn with_component<R>(
        &mut self,
        state: StateId,
        component: ComponentId,
        f: impl FnOnce(&dyn Component, &mut ComponentContext<'_>) -> SimResult<R>,
    ) -> SimResult<R> {
        let handle = self.component(component)?;
        let mut ctx = ComponentContext::new(self, state, component);
        f(handle.as_ref(), &mut ctx)
    }

    /// Schedule a link of a state for propagation
    pub fn value_changed(&mut self, state: StateId, link: LinkId) {
        self.pending.insert((state, link));
    }

    /// Forget every pending update for a link that no longer exists
    pub fn link_removed(&mut self, link: LinkId) {
        self.pending.retain(|&(_, pending)| pending != link);
    }

    pub(crate) fn state_removed(&mut self, state: StateId) {
        self.pending.retain(|&(pending, _)| pending != state);
    }

    pub fn has_links_to_update(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Snapshot of the pending queue, in insertion order
    pub fn links_to_update(&self) -> Vec<UpdatePair> {
        self.pending.iter().copied().collect()
    }

    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    pub fn clock_high(&self) -> bool {
        self.clock_high
    }

    /// Drop every circuit and all queued work
    pub fn clear(&mut self) {
        self.circuits.clear();
        self.components.clear();
        self.links.clear();
        self.states.clear();
        self.pending.clear();
        self.scratch.clear();
        self.short_circuited.clear();
        self.history.clear();
        debug!("Simulator cleared");
    }

    /// Reset every state of every circuit
    pub fn reset(&mut self) {
        let states: Vec<StateId> = self
            .circuits
            .values()
            .flat_map(|circuit| circuit.states())
            .collect();
        for state in states {
            // Nested states may be released by an earlier reset in this pass
            if self.states.contains_key(&state) {
                if let Err(err) = self.reset_state(state) {
                    warn!("Failed to reset {}: {}", state, err);
                }
            }
        }
        debug!("Simulator reset");
    }

    /// Whether a queued pair no longer refers to live simulation state
    pub(crate) fn is_stale(&self, state: StateId, link: LinkId) -> bool {
        let Some(link) = self.links.get(&link) else {
            return true;
        };
        let Some(circuit_state) = self.states.get(&state) else {
            return true;
        };
        if circuit_state.circuit() != link.circuit() {
            return true;
        }
        self.circuits
            .get(&circuit_state.circuit())
            .map_or(true, |circuit| !circuit.contains_state(state))
    }
}

impl Default for SimulatorContext {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

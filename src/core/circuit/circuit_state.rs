use crate::core::circuit::LinkState;
use crate::core::components::{ComponentState, Property};
use crate::core::connections::PortValidator;
use crate::core::errors::{PropagationOutcome, SimResult, SimulationError};
use crate::core::execution::context::SimulatorContext;
use crate::core::types::{CircuitId, ComponentId, LinkId, Port, StateId};
use crate::core::values::WireValue;
use log::{trace, warn};
use std::collections::HashMap;

/// One simulation instance of a circuit.
///
/// Holds a property slot per component and a [`LinkState`] per link, created
/// lazily the first time a link is touched in this state.
pub struct CircuitState {
    id: StateId,
    circuit: CircuitId,
    pub(crate) properties: HashMap<ComponentId, Property>,
    pub(crate) link_states: HashMap<LinkId, LinkState>,
}

impl Clone for CircuitState {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            circuit: self.circuit,
            properties: self
                .properties
                .iter()
                .map(|(&id, property)| (id, property.clone_box()))
                .collect(),
            link_states: self.link_states.clone(),
        }
    }
}

impl std::fmt::Debug for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitState")
            .field("id", &self.id)
            .field("circuit", &self.circuit)
            .field("properties", &self.properties.len())
            .field("link_states", &self.link_states.len())
            .finish()
    }
}

impl CircuitState {
    pub(crate) fn new(id: StateId, circuit: CircuitId) -> Self {
        Self {
            id,
            circuit,
            properties: HashMap::new(),
            link_states: HashMap::new(),
        }
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn circuit(&self) -> CircuitId {
        self.circuit
    }

    /// Link state, if the link has been touched in this state
    pub fn link_state(&self, link: LinkId) -> Option<&LinkState> {
        self.link_states.get(&link)
    }

    pub fn property(&self, component: ComponentId) -> Option<&(dyn ComponentState + 'static)> {
        self.properties.get(&component).map(|property| property.as_ref())
    }

    /// Consume the state, keeping only its component properties
    pub fn into_properties(self) -> HashMap<ComponentId, Property> {
        self.properties
    }
}

impl SimulatorContext {
    /// Link state for `link` in `state`, created on first access
    pub(crate) fn ensure_link_state(&mut self, state: StateId, link: LinkId) -> SimResult<&mut LinkState> {
        let topology = self
            .links
            .get(&link)
            .ok_or(SimulationError::LinkNotFound(link))?;
        let circuit_state = self
            .states
            .get_mut(&state)
            .ok_or(SimulationError::StateNotFound(state))?;
        if topology.circuit() != circuit_state.circuit() {
            return Err(SimulationError::DifferentCircuits {
                first: circuit_state.circuit(),
                second: topology.circuit(),
            });
        }
        Ok(circuit_state
            .link_states
            .entry(link)
            .or_insert_with(|| LinkState::new(topology)))
    }

    /// Push a value from a port.
    ///
    /// When the value differs from what the port last pushed, the port's link
    /// is scheduled for propagation in this state.
    pub fn push_value(&mut self, state: StateId, port: Port, value: &WireValue) -> SimResult<()> {
        let link = self.port_link(port)?;
        PortValidator::validate_push(self.link(link)?, value)?;

        if self.ensure_link_state(state, link)?.set_pushed(port, value) {
            trace!("{} pushed {} in {}", port, value, state);
            self.value_changed(state, link);
        }
        Ok(())
    }

    fn read_port(
        &self,
        state: StateId,
        port: Port,
        read: impl Fn(&LinkState) -> Option<&WireValue>,
    ) -> SimResult<WireValue> {
        let link = self.link(self.port_link(port)?)?;
        let circuit_state = self.state(state)?;
        if link.circuit() != circuit_state.circuit() {
            return Err(SimulationError::DifferentCircuits {
                first: circuit_state.circuit(),
                second: link.circuit(),
            });
        }
        Ok(circuit_state
            .link_state(link.id())
            .and_then(read)
            .cloned()
            .unwrap_or_else(|| WireValue::new(link.width())))
    }

    /// Value last delivered to a port's component
    pub fn last_received(&self, state: StateId, port: Port) -> SimResult<WireValue> {
        self.read_port(state, port, |link_state| link_state.last_received(port))
    }

    /// Value last pushed by a port's component
    pub fn last_pushed(&self, state: StateId, port: Port) -> SimResult<WireValue> {
        self.read_port(state, port, |link_state| link_state.last_pushed(port))
    }

    /// Merge of every value driven onto a link. Fails if the link is shorted.
    pub fn merged_value(&mut self, state: StateId, link: LinkId) -> SimResult<WireValue> {
        Ok(self.ensure_link_state(state, link)?.merged_value()?)
    }

    pub fn is_short_circuited(&mut self, state: StateId, link: LinkId) -> SimResult<bool> {
        Ok(self.ensure_link_state(state, link)?.is_short_circuited())
    }

    pub fn component_property(
        &self,
        state: StateId,
        component: ComponentId,
    ) -> SimResult<Option<&(dyn ComponentState + 'static)>> {
        Ok(self.state(state)?.property(component))
    }

    pub fn component_property_mut(
        &mut self,
        state: StateId,
        component: ComponentId,
    ) -> SimResult<Option<&mut (dyn ComponentState + 'static)>> {
        Ok(self
            .state_mut(state)?
            .properties
            .get_mut(&component)
            .map(|property| property.as_mut()))
    }

    pub fn put_component_property(
        &mut self,
        state: StateId,
        component: ComponentId,
        property: Property,
    ) -> SimResult<()> {
        self.state_mut(state)?.properties.insert(component, property);
        Ok(())
    }

    pub fn remove_component_property(
        &mut self,
        state: StateId,
        component: ComponentId,
    ) -> SimResult<Option<Property>> {
        Ok(self.state_mut(state)?.properties.remove(&component))
    }

    /// Clear every link value of a state and re-run `uninit`/`init` on each
    /// component. Component failures are logged and swallowed.
    pub fn reset_state(&mut self, state: StateId) -> SimResult<()> {
        let circuit = self.state(state)?.circuit();
        let components: Vec<ComponentId> = self.circuit(circuit)?.components().collect();

        let links = &self.links;
        let circuit_state = self
            .states
            .get_mut(&state)
            .ok_or(SimulationError::StateNotFound(state))?;
        circuit_state
            .link_states
            .retain(|link, _| links.contains_key(link));
        for (link, link_state) in circuit_state.link_states.iter_mut() {
            if let Some(topology) = links.get(link) {
                *link_state = LinkState::new(topology);
            }
        }

        for component in components {
            if let Err(err) = self.uninit_component(state, component) {
                warn!("Reset of {}: uninit of {} failed: {}", state, component, err);
            }
            if let Err(err) = self.init_component(state, component, None) {
                warn!("Reset of {}: init of {} failed: {}", state, component, err);
            }
        }
        Ok(())
    }

    /// Propagate one link of one state.
    ///
    /// Pushed values become the propagated snapshot, every participant whose
    /// incoming merge changed is notified in port order, and finally the
    /// whole link is merged once more to catch drivers that directly
    /// disagree. An ordinary component error outranks a short circuit.
    pub(crate) fn propagate_signal(&mut self, state: StateId, link: LinkId) -> PropagationOutcome {
        let (notifications, mut short) = match self.ensure_link_state(state, link) {
            Ok(link_state) => {
                link_state.refresh_propagated();
                link_state.collect_notifications()
            }
            Err(err) => return PropagationOutcome::Fatal(err),
        };

        let mut fatal = None;
        for (port, value) in notifications {
            trace!("Notifying {} of {} in {}", port, value, state);
            let result = self.with_component(state, port.component, |component, ctx| {
                component.value_changed(ctx, &value, port.index)
            });
            match result {
                Ok(()) => {}
                Err(SimulationError::ShortCircuit(sc)) => {
                    let attributed = match sc.link {
                        Some(_) => sc,
                        None => sc.on_link(link),
                    };
                    short = Some(attributed);
                }
                Err(err) => {
                    warn!("Component error on {} in {}: {}", port, state, err);
                    fatal.get_or_insert(err);
                }
            }
        }

        if let Some(err) = fatal {
            return PropagationOutcome::Fatal(err);
        }
        if let Some(sc) = short {
            return PropagationOutcome::ShortCircuit(sc);
        }

        let merged = self
            .states
            .get_mut(&state)
            .and_then(|circuit_state| circuit_state.link_states.get_mut(&link))
            .map(|link_state| link_state.merged_value());
        match merged {
            Some(Err(sc)) => PropagationOutcome::ShortCircuit(sc),
            _ => PropagationOutcome::Settled,
        }
    }
}

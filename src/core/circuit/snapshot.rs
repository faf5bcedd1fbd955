use crate::core::circuit::{CircuitState, LinkState};
use crate::core::components::{downcast_state, ComponentState};
use crate::core::errors::{SimResult, SimulationError};
use crate::core::execution::context::SimulatorContext;
use crate::core::types::{CircuitId, ComponentId, LinkId, Port, StateId};
use crate::core::values::WireValue;
use std::any::Any;
use std::collections::HashMap;

/// Owned, read-only copy of a circuit state.
///
/// Taken under the simulator lock and inspected without it. There is no way
/// to push through a snapshot; it goes stale as soon as the simulation moves
/// on.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    state: CircuitState,
    port_links: HashMap<ComponentId, Vec<LinkId>>,
    link_widths: HashMap<LinkId, usize>,
}

impl StateSnapshot {
    pub fn state(&self) -> StateId {
        self.state.id()
    }

    pub fn circuit(&self) -> CircuitId {
        self.state.circuit()
    }

    pub fn port_link(&self, port: Port) -> SimResult<LinkId> {
        self.port_links
            .get(&port.component)
            .and_then(|links| links.get(port.index))
            .copied()
            .ok_or(SimulationError::PortNotFound(port))
    }

    fn link_width(&self, link: LinkId) -> SimResult<usize> {
        self.link_widths
            .get(&link)
            .copied()
            .ok_or(SimulationError::LinkNotFound(link))
    }

    fn read_port(
        &self,
        port: Port,
        read: impl Fn(&LinkState) -> Option<&WireValue>,
    ) -> SimResult<WireValue> {
        let link = self.port_link(port)?;
        let width = self.link_width(link)?;
        Ok(self
            .state
            .link_state(link)
            .and_then(read)
            .cloned()
            .unwrap_or_else(|| WireValue::new(width)))
    }

    pub fn last_received(&self, port: Port) -> SimResult<WireValue> {
        self.read_port(port, |link_state| link_state.last_received(port))
    }

    pub fn last_pushed(&self, port: Port) -> SimResult<WireValue> {
        self.read_port(port, |link_state| link_state.last_pushed(port))
    }

    pub fn merged_value(&self, link: LinkId) -> SimResult<WireValue> {
        let width = self.link_width(link)?;
        match self.state.link_state(link) {
            Some(link_state) => Ok(link_state.compute_merged()?),
            None => Ok(WireValue::new(width)),
        }
    }

    pub fn is_short_circuited(&self, link: LinkId) -> SimResult<bool> {
        self.link_width(link)?;
        Ok(self
            .state
            .link_state(link)
            .map_or(false, |link_state| link_state.compute_merged().is_err()))
    }

    pub fn component_property(&self, component: ComponentId) -> Option<&(dyn ComponentState + 'static)> {
        self.state.property(component)
    }

    /// Typed read of a component's property
    pub fn property<T: Any>(&self, component: ComponentId) -> SimResult<Option<&T>> {
        match self.state.property(component) {
            Some(property) => Ok(Some(downcast_state::<T>(property)?)),
            None => Ok(None),
        }
    }
}

impl SimulatorContext {
    /// Take a read-only snapshot of a state
    pub fn snapshot_state(&self, state: StateId) -> SimResult<StateSnapshot> {
        let circuit_state = self.state(state)?;
        let circuit = circuit_state.circuit();

        let port_links = self
            .components
            .iter()
            .filter(|(_, entry)| entry.circuit == circuit)
            .map(|(&id, entry)| (id, entry.links.clone()))
            .collect();
        let link_widths = self
            .links
            .values()
            .filter(|link| link.circuit() == circuit)
            .map(|link| (link.id(), link.width()))
            .collect();

        Ok(StateSnapshot {
            state: circuit_state.clone(),
            port_links,
            link_widths,
        })
    }
}

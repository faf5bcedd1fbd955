use crate::core::circuit::LinkState;
use crate::core::connections::PortValidator;
use crate::core::errors::{SimResult, SimulationError};
use crate::core::execution::context::SimulatorContext;
use crate::core::types::{CircuitId, ComponentId, LinkId, Port, StateId};
use crate::core::values::WireValue;
use indexmap::IndexSet;
use log::debug;

/// A set of equal-width ports treated as one electrical node.
///
/// Links carry topology only; the values flowing over a link live in the
/// [`LinkState`] of each circuit state.
#[derive(Debug, Clone)]
pub struct Link {
    id: LinkId,
    circuit: CircuitId,
    width: usize,
    participants: IndexSet<Port>,
}

impl Link {
    pub(crate) fn singleton(id: LinkId, circuit: CircuitId, width: usize, port: Port) -> Self {
        let mut participants = IndexSet::new();
        participants.insert(port);
        Self {
            id,
            circuit,
            width,
            participants,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn circuit(&self) -> CircuitId {
        self.circuit
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn participants(&self) -> impl Iterator<Item = Port> + '_ {
        self.participants.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, port: Port) -> bool {
        self.participants.contains(&port)
    }

    pub(crate) fn insert(&mut self, port: Port) {
        self.participants.insert(port);
    }

    pub(crate) fn remove(&mut self, port: Port) -> bool {
        self.participants.shift_remove(&port)
    }
}

impl SimulatorContext {
    /// Link a port is currently attached to
    pub fn port_link(&self, port: Port) -> SimResult<LinkId> {
        self.components
            .get(&port.component)
            .and_then(|entry| entry.links.get(port.index))
            .copied()
            .ok_or(SimulationError::PortNotFound(port))
    }

    pub fn link(&self, id: LinkId) -> SimResult<&Link> {
        self.links.get(&id).ok_or(SimulationError::LinkNotFound(id))
    }

    /// Ports of a component, in index order
    pub fn ports(&self, component: ComponentId) -> SimResult<Vec<Port>> {
        let entry = self
            .components
            .get(&component)
            .ok_or(SimulationError::ComponentNotFound(component))?;
        Ok((0..entry.links.len())
            .map(|index| Port::new(component, index))
            .collect())
    }

    fn set_port_link(&mut self, port: Port, link: LinkId) -> SimResult<()> {
        let slot = self
            .components
            .get_mut(&port.component)
            .and_then(|entry| entry.links.get_mut(port.index))
            .ok_or(SimulationError::PortNotFound(port))?;
        *slot = link;
        Ok(())
    }

    /// Wire two ports together, merging their links.
    ///
    /// Both links must belong to the same circuit and share a width. Every
    /// state of the circuit merges its link states and schedules the merged
    /// link for propagation.
    pub fn link_ports(&mut self, port: Port, other: Port) -> SimResult<()> {
        let kept = self.port_link(port)?;
        let absorbed = self.port_link(other)?;
        if kept == absorbed {
            return Ok(());
        }

        let circuit = {
            let left = self.link(kept)?;
            let right = self.link(absorbed)?;
            PortValidator::validate_link(left, right)?;
            left.circuit()
        };

        let states: Vec<StateId> = self.circuit(circuit)?.states().collect();
        for state in states {
            self.merge_link_states(state, kept, absorbed)?;
        }

        let absorbed_link = self
            .links
            .remove(&absorbed)
            .ok_or(SimulationError::LinkNotFound(absorbed))?;
        for moved in absorbed_link.participants() {
            self.set_port_link(moved, kept)?;
            if let Some(link) = self.links.get_mut(&kept) {
                link.insert(moved);
            }
        }

        debug!("Linked {} and {} into {}", port, other, kept);
        Ok(())
    }

    /// Carve `other` out of `port`'s link into a fresh singleton link.
    ///
    /// No-op when the link does not contain `other` or has a single
    /// participant. The carved port keeps driving its own last pushed value
    /// in every state; if what it received changes, its component is told
    /// immediately.
    pub fn unlink_ports(&mut self, port: Port, other: Port) -> SimResult<()> {
        let current = self.port_link(port)?;
        let (circuit, width) = {
            let link = self.link(current)?;
            if !link.contains(other) || link.len() == 1 {
                return Ok(());
            }
            (link.circuit(), link.width())
        };

        if let Some(link) = self.links.get_mut(&current) {
            link.remove(other);
        }
        let fresh = self.handles.link();
        self.links
            .insert(fresh, Link::singleton(fresh, circuit, width, other));
        self.set_port_link(other, fresh)?;

        let states: Vec<StateId> = self.circuit(circuit)?.states().collect();
        let mut first_error = None;
        for state in states {
            if let Err(err) = self.split_link_state(state, current, other) {
                first_error.get_or_insert(err);
            }
        }

        debug!("Unlinked {} from {} into {}", other, current, fresh);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn merge_link_states(&mut self, state: StateId, kept: LinkId, absorbed: LinkId) -> SimResult<()> {
        self.ensure_link_state(state, kept)?;
        self.ensure_link_state(state, absorbed)?;

        let circuit_state = self
            .states
            .get_mut(&state)
            .ok_or(SimulationError::StateNotFound(state))?;
        if let Some(other) = circuit_state.link_states.remove(&absorbed) {
            if let Some(target) = circuit_state.link_states.get_mut(&kept) {
                target.absorb(other);
            }
        }

        self.link_removed(absorbed);
        self.value_changed(state, kept);
        Ok(())
    }

    fn split_link_state(&mut self, state: StateId, link: LinkId, port: Port) -> SimResult<()> {
        let fresh = self.port_link(port)?;
        let (pushed, received) = {
            let circuit_state = self
                .states
                .get_mut(&state)
                .ok_or(SimulationError::StateNotFound(state))?;
            match circuit_state
                .link_states
                .get_mut(&link)
                .and_then(|link_state| link_state.detach(port))
            {
                Some(values) => values,
                None => return Ok(()),
            }
        };

        let carved = LinkState::carved(self.link(fresh)?, port, pushed);
        let floating = WireValue::new(carved.width());
        if let Some(circuit_state) = self.states.get_mut(&state) {
            circuit_state.link_states.insert(fresh, carved);
        }

        let mut result = Ok(());
        if received != floating {
            result = self.with_component(state, port.component, |component, ctx| {
                component.value_changed(ctx, &floating, port.index)
            });
        }

        let emptied = self
            .states
            .get(&state)
            .and_then(|circuit_state| circuit_state.link_states.get(&link))
            .map_or(false, |link_state| link_state.participant_count() == 0);
        if emptied {
            if let Some(circuit_state) = self.states.get_mut(&state) {
                circuit_state.link_states.remove(&link);
            }
            self.link_removed(link);
        } else {
            self.value_changed(state, link);
        }

        result
    }
}

use std::fmt;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl $name {
            /// Get the raw numeric handle
            pub fn raw(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// Handle for a circuit owned by a simulator
    CircuitId,
    "circuit"
);
define_handle!(
    /// Handle for one instantiation of a circuit
    StateId,
    "state"
);
define_handle!(
    /// Handle for a component placed in a circuit
    ComponentId,
    "component"
);
define_handle!(
    /// Handle for an electrical node shared by one or more ports
    LinkId,
    "link"
);

/// Handle for a component port.
///
/// A port is identified by its owning component and its fixed index. The link
/// it currently belongs to is tracked by the simulator and changes as ports
/// are linked and unlinked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port {
    pub component: ComponentId,
    pub index: usize,
}

impl Port {
    pub fn new(component: ComponentId, index: usize) -> Self {
        Self { component, index }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({}[{}])", self.component, self.index)
    }
}

/// Monotonic handle source. Handles are never reused, so a handle that
/// outlives its object can always be recognised as stale.
#[derive(Debug, Default)]
pub(crate) struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub(crate) fn next_raw(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    pub(crate) fn circuit(&mut self) -> CircuitId {
        CircuitId(self.next_raw())
    }

    pub(crate) fn state(&mut self) -> StateId {
        StateId(self.next_raw())
    }

    pub(crate) fn component(&mut self) -> ComponentId {
        ComponentId(self.next_raw())
    }

    pub(crate) fn link(&mut self) -> LinkId {
        LinkId(self.next_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_across_kinds() {
        let mut alloc = HandleAllocator::default();
        let circuit = alloc.circuit();
        let state = alloc.state();
        let link = alloc.link();
        assert_ne!(circuit.raw(), state.raw());
        assert_ne!(state.raw(), link.raw());
    }

    #[test]
    fn test_port_display() {
        let port = Port::new(ComponentId(7), 2);
        assert_eq!(port.to_string(), "Port(component#7[2])");
    }
}

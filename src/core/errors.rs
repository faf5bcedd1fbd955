use crate::core::components::state::StateError;
use crate::core::types::{CircuitId, ComponentId, LinkId, Port, StateId};
use crate::core::values::WireValue;

/// Two drivers asserting incompatible defined bits on the same node.
///
/// Carries both merge operands. `link` is filled in once the conflict has
/// been attributed to a link during propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortCircuit {
    pub link: Option<LinkId>,
    pub first: WireValue,
    pub second: WireValue,
}

impl ShortCircuit {
    pub fn new(first: WireValue, second: WireValue) -> Self {
        Self {
            link: None,
            first,
            second,
        }
    }

    /// Attribute this conflict to a link
    pub fn on_link(mut self, link: LinkId) -> Self {
        self.link = Some(link);
        self
    }
}

impl std::fmt::Display for ShortCircuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.link {
            Some(link) => write!(
                f,
                "Short circuit on {}: {} conflicts with {}",
                link, self.first, self.second
            ),
            None => write!(
                f,
                "Short circuit: {} conflicts with {}",
                self.first, self.second
            ),
        }
    }
}

/// Errors raised by the simulation core
#[derive(Debug, Clone)]
pub enum SimulationError {
    /// Conflicting defined bits on one link
    ShortCircuit(ShortCircuit),
    /// The pending queue kept repeating during `step_all`
    Oscillation { repeats: usize },
    /// Two values or ports of different bit widths met
    WidthMismatch { expected: usize, found: usize },
    /// Ports belong to different circuits
    DifferentCircuits { first: CircuitId, second: CircuitId },
    CircuitNotFound(CircuitId),
    ComponentNotFound(ComponentId),
    StateNotFound(StateId),
    PortNotFound(Port),
    LinkNotFound(LinkId),
    /// A component was removed or replaced while one of its ports is still wired
    StillLinked(Port),
    /// Integer conversion of a value with floating bits
    InvalidValue(String),
    /// Component property slot held an unexpected type
    Property(StateError),
    /// A subcircuit would end up containing itself
    SubcircuitLoop(CircuitId),
    /// The simulator context is already borrowed on this thread
    ContextBusy,
    /// The background clock thread could not be started
    Clock(String),
    /// Ordinary error raised by a component
    Component(String),
}

impl SimulationError {
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, SimulationError::ShortCircuit(_))
    }
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationError::ShortCircuit(sc) => write!(f, "{}", sc),
            SimulationError::Oscillation { repeats } => {
                write!(f, "Oscillation detected after {} repeated updates", repeats)
            }
            SimulationError::WidthMismatch { expected, found } => write!(
                f,
                "Bit width mismatch: expected {}, found {}",
                expected, found
            ),
            SimulationError::DifferentCircuits { first, second } => write!(
                f,
                "Cannot link ports from different circuits: {} and {}",
                first, second
            ),
            SimulationError::CircuitNotFound(id) => write!(f, "Circuit not found: {}", id),
            SimulationError::ComponentNotFound(id) => write!(f, "Component not found: {}", id),
            SimulationError::StateNotFound(id) => write!(f, "Circuit state not found: {}", id),
            SimulationError::PortNotFound(port) => write!(f, "Port not found: {}", port),
            SimulationError::LinkNotFound(id) => write!(f, "Link not found: {}", id),
            SimulationError::StillLinked(port) => {
                write!(f, "Must unlink {} before removing its component", port)
            }
            SimulationError::InvalidValue(value) => {
                write!(f, "Value {} has floating bits", value)
            }
            SimulationError::Property(err) => write!(f, "Component property error: {}", err),
            SimulationError::SubcircuitLoop(id) => {
                write!(f, "Subcircuit loop detected through {}", id)
            }
            SimulationError::ContextBusy => {
                write!(f, "Simulator context is already borrowed on this thread")
            }
            SimulationError::Clock(msg) => write!(f, "Clock thread unavailable: {}", msg),
            SimulationError::Component(msg) => write!(f, "Component error: {}", msg),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Property(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StateError> for SimulationError {
    fn from(err: StateError) -> Self {
        SimulationError::Property(err)
    }
}

impl From<ShortCircuit> for SimulationError {
    fn from(sc: ShortCircuit) -> Self {
        SimulationError::ShortCircuit(sc)
    }
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Result of propagating one `(state, link)` pair
#[derive(Debug)]
pub enum PropagationOutcome {
    Settled,
    ShortCircuit(ShortCircuit),
    Fatal(SimulationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_circuit_display() {
        let sc = ShortCircuit::new(WireValue::of(1, 1), WireValue::of(0, 1));
        assert_eq!(sc.to_string(), "Short circuit: 1 conflicts with 0");
        let sc = sc.on_link(LinkId(3));
        assert_eq!(sc.to_string(), "Short circuit on link#3: 1 conflicts with 0");
    }

    #[test]
    fn test_state_error_conversion() {
        let err: SimulationError = StateError::InvalidDowncast("u8".into()).into();
        assert!(matches!(err, SimulationError::Property(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_short_circuit());
    }
}

pub mod core;
pub mod peripherals;

// Re-export commonly used types
pub use crate::core::circuit::{Circuit, CircuitChangeListener, CircuitState, LinkState, StateSnapshot};
pub use crate::core::components::{Component, ComponentContext, ComponentState, Property};
pub use crate::core::errors::{ShortCircuit, SimResult, SimulationError};
pub use crate::core::execution::{ClockListener, Simulator, SimulatorConfig, SimulatorContext};
pub use crate::core::types::{CircuitId, ComponentId, LinkId, Port, StateId};
pub use crate::core::values::{BitState, WireValue};

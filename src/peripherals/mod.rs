//! Concrete components built on the simulation core.

pub mod clock;
pub mod constant;
pub mod gates;
pub mod pin;
pub mod random;
pub mod register;
pub mod subcircuit;

pub use clock::Clock;
pub use constant::Constant;
pub use gates::{Gate, GateKind, NotGate};
pub use pin::{Pin, PinChangeListener};
pub use random::RandomGenerator;
pub use register::Register;
pub use subcircuit::{PinSlot, Subcircuit, SubcircuitState};

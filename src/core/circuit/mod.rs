pub mod circuit;
pub mod circuit_state;
pub mod link_state;
pub mod snapshot;

pub use circuit::{Circuit, CircuitChangeListener};
pub use circuit_state::CircuitState;
pub use link_state::LinkState;
pub use snapshot::StateSnapshot;

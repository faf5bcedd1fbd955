pub mod context;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use context::ComponentContext;
pub use state::{downcast_property, downcast_state, downcast_state_mut, ComponentState, Property, StateError};
pub use traits::{downcast_component, Component};

use std::any::Any;

/// Trait for per-state component properties that allows dynamic downcasting.
///
/// Each circuit state holds one property slot per component. The core never
/// looks inside; components read their own slot back through the typed
/// accessors on [`ComponentContext`](crate::core::components::ComponentContext).
pub trait ComponentState: Send {
    /// Returns a reference to the state as Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to the state as Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Clone into a fresh box, used when a circuit state is snapshotted
    fn clone_box(&self) -> Box<dyn ComponentState>;
}

impl<T> ComponentState for T
where
    T: Any + Send + Clone,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ComponentState> {
        Box::new(self.clone())
    }
}

/// Boxed, type-erased component property
pub type Property = Box<dyn ComponentState>;

/// Errors that can occur while accessing a component property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Attempted to downcast to incorrect type
    InvalidDowncast(String),
    /// No property stored for the component
    StateNotFound(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::InvalidDowncast(msg) => write!(f, "Invalid downcast: {}", msg),
            StateError::StateNotFound(msg) => write!(f, "State not found: {}", msg),
        }
    }
}

impl std::error::Error for StateError {}

/// Helper function to safely downcast component state
pub fn downcast_state<T: Any>(state: &dyn ComponentState) -> Result<&T, StateError> {
    state.as_any().downcast_ref::<T>().ok_or_else(|| {
        StateError::InvalidDowncast(format!(
            "Cannot downcast state to {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Helper function to safely downcast mutable component state
pub fn downcast_state_mut<T: Any>(state: &mut dyn ComponentState) -> Result<&mut T, StateError> {
    state.as_any_mut().downcast_mut::<T>().ok_or_else(|| {
        StateError::InvalidDowncast(format!(
            "Cannot downcast mutable state to {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Take ownership of a boxed property as a concrete type
pub fn downcast_property<T: Any + Clone>(property: Property) -> Result<T, StateError> {
    downcast_state::<T>(property.as_ref()).map(|value| value.clone())
}

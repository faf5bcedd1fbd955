use crate::core::components::context::ComponentContext;
use crate::core::components::state::Property;
use crate::core::errors::SimResult;
use crate::core::execution::context::SimulatorContext;
use crate::core::types::CircuitId;
use crate::core::values::WireValue;
use std::any::Any;

/// Capability contract every simulated component implements.
///
/// The core owns components behind `Arc<dyn Component>` and drives them
/// through this trait. A component only ever talks back to the core through
/// the [`ComponentContext`] it is handed, which is scoped to one circuit state
/// and to the component's own ports.
///
/// Implementations hold no per-state data of their own; anything that must
/// survive between callbacks belongs in the property slot of the state.
pub trait Component: Any + Send + Sync {
    /// Display name, used in logs
    fn name(&self) -> &str;

    /// Bit width of each port. Fixed for the life of the component; the
    /// length defines the port count.
    fn port_widths(&self) -> Vec<usize>;

    /// Veto placement into a circuit before anything is allocated.
    fn check_placement(&self, _sim: &SimulatorContext, _circuit: CircuitId) -> SimResult<()> {
        Ok(())
    }

    /// Called once per (component, state) pair when the component is added,
    /// the state is instantiated or the state is reset. `prior` carries the
    /// property this slot held before a replace or re-instantiation.
    fn init(&self, _ctx: &mut ComponentContext<'_>, _prior: Option<Property>) -> SimResult<()> {
        Ok(())
    }

    /// Called before the component leaves a state.
    fn uninit(&self, _ctx: &mut ComponentContext<'_>) -> SimResult<()> {
        Ok(())
    }

    /// Called whenever the value received on one of this component's ports
    /// changes. This is where component logic pushes new values.
    fn value_changed(
        &self,
        ctx: &mut ComponentContext<'_>,
        value: &WireValue,
        port_index: usize,
    ) -> SimResult<()>;

    /// Port driven by the simulator clock, if this component is a clock source
    fn clock_port(&self) -> Option<usize> {
        None
    }

    /// Returns self as Any for downcasting to the concrete component
    fn as_any(&self) -> &dyn Any;
}

/// Helper to downcast a shared component handle to its concrete type
pub fn downcast_component<T: Component>(component: &dyn Component) -> Option<&T> {
    component.as_any().downcast_ref::<T>()
}

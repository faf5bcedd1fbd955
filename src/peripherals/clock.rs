use crate::core::components::{Component, ComponentContext, Property};
use crate::core::errors::SimResult;
use crate::core::values::WireValue;
use std::any::Any;

/// One-bit source that follows the simulator clock
pub struct Clock {
    name: String,
}

impl Clock {
    pub const PORT: usize = 0;

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Component for Clock {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_widths(&self) -> Vec<usize> {
        vec![1]
    }

    fn init(&self, ctx: &mut ComponentContext<'_>, _prior: Option<Property>) -> SimResult<()> {
        let bit = ctx.clock_high() as u64;
        ctx.push_value(Self::PORT, &WireValue::of(bit, 1))
    }

    fn value_changed(&self, _ctx: &mut ComponentContext<'_>, _value: &WireValue, _port_index: usize) -> SimResult<()> {
        Ok(())
    }

    fn clock_port(&self) -> Option<usize> {
        Some(Self::PORT)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

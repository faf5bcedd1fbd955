use crate::core::components::{Component, ComponentContext, Property};
use crate::core::errors::SimResult;
use crate::core::values::WireValue;
use std::any::Any;

/// Drives a fixed value
pub struct Constant {
    name: String,
    value: WireValue,
}

impl Constant {
    pub const PORT: usize = 0;

    pub fn new(name: impl Into<String>, value: WireValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn value(&self) -> &WireValue {
        &self.value
    }
}

impl Component for Constant {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_widths(&self) -> Vec<usize> {
        vec![self.value.width()]
    }

    fn init(&self, ctx: &mut ComponentContext<'_>, _prior: Option<Property>) -> SimResult<()> {
        ctx.push_value(Self::PORT, &self.value)
    }

    fn value_changed(&self, _ctx: &mut ComponentContext<'_>, _value: &WireValue, _port_index: usize) -> SimResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

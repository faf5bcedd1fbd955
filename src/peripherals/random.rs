use crate::core::components::{Component, ComponentContext, Property};
use crate::core::errors::SimResult;
use crate::core::values::{BitState, WireValue};
use rand::Rng;
use std::any::Any;

/// Emits a fresh random value at startup and on every high `CLK`
pub struct RandomGenerator {
    name: String,
    width: usize,
}

impl RandomGenerator {
    pub const CLK: usize = 0;
    pub const OUT: usize = 1;

    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }

    fn emit(&self, ctx: &mut ComponentContext<'_>) -> SimResult<()> {
        let raw: u64 = rand::thread_rng().gen();
        ctx.push_value(Self::OUT, &WireValue::of(raw, self.width))
    }
}

impl Component for RandomGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_widths(&self) -> Vec<usize> {
        vec![1, self.width]
    }

    fn init(&self, ctx: &mut ComponentContext<'_>, _prior: Option<Property>) -> SimResult<()> {
        self.emit(ctx)
    }

    fn value_changed(&self, ctx: &mut ComponentContext<'_>, value: &WireValue, port_index: usize) -> SimResult<()> {
        if port_index == Self::CLK && value.bit(0) == BitState::One {
            self.emit(ctx)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

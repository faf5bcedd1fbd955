use crate::core::components::{downcast_property, Component, ComponentContext, Property};
use crate::core::errors::SimResult;
use crate::core::values::{BitState, WireValue};
use std::any::Any;

/// Edge-triggered storage element.
///
/// Latches `IN` on a rising `CLK` edge while `ENABLE` is not low. A high
/// `ZERO` clears the stored value. The stored value is the component property
/// and is carried across component updates, resized to the new width.
pub struct Register {
    name: String,
    width: usize,
}

impl Register {
    pub const IN: usize = 0;
    pub const ENABLE: usize = 1;
    pub const CLK: usize = 2;
    pub const ZERO: usize = 3;
    pub const OUT: usize = 4;

    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn store(&self, ctx: &mut ComponentContext<'_>, value: WireValue) -> SimResult<()> {
        ctx.push_value(Self::OUT, &value)?;
        ctx.put_property(value)
    }
}

impl Component for Register {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_widths(&self) -> Vec<usize> {
        vec![self.width, 1, 1, 1, self.width]
    }

    fn init(&self, ctx: &mut ComponentContext<'_>, prior: Option<Property>) -> SimResult<()> {
        let value = match prior {
            Some(prior) => downcast_property::<WireValue>(prior)?.resized(self.width),
            None => WireValue::of(0, self.width),
        };
        self.store(ctx, value)
    }

    fn value_changed(&self, ctx: &mut ComponentContext<'_>, value: &WireValue, port_index: usize) -> SimResult<()> {
        if port_index == Self::OUT {
            return Ok(());
        }

        if ctx.last_received(Self::ZERO)?.bit(0) == BitState::One {
            return self.store(ctx, WireValue::of(0, self.width));
        }

        let enabled = ctx.last_received(Self::ENABLE)?.bit(0) != BitState::Zero;
        if enabled && port_index == Self::CLK && value.bit(0) == BitState::One {
            let input = ctx.last_received(Self::IN)?;
            self.store(ctx, input)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

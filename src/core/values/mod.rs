pub mod wire_value;

pub use wire_value::{BitState, WireValue};

use crate::core::components::{Component, ComponentContext};
use crate::core::errors::SimResult;
use crate::core::values::{BitState, WireValue};
use std::any::Any;

/// Bitwise operator a gate folds its inputs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
}

impl GateKind {
    fn combine(self, acc: BitState, bit: BitState) -> BitState {
        match self {
            GateKind::And | GateKind::Nand => {
                BitState::from_bool(acc == BitState::One && bit == BitState::One)
            }
            GateKind::Or | GateKind::Nor => {
                BitState::from_bool(acc == BitState::One || bit == BitState::One)
            }
            GateKind::Xor | GateKind::Xnor => BitState::from_bool(
                acc != BitState::Floating && bit != BitState::Floating && acc != bit,
            ),
        }
    }

    fn negates_output(self) -> bool {
        matches!(self, GateKind::Nand | GateKind::Nor | GateKind::Xnor)
    }

    pub fn label(self) -> &'static str {
        match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Xor => "XOR",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Xnor => "XNOR",
        }
    }
}

/// Multi-input logic gate.
///
/// Ports `0..num_inputs` are the inputs and port `num_inputs` is the output,
/// all `width` bits wide. Each output bit is floating when every input bit at
/// that position floats. Otherwise every input bit, floating ones included,
/// is folded with the gate operator from input 0 onwards. A floating operand
/// never counts as high: AND(1, z) and XOR(1, z) are both low.
pub struct Gate {
    name: String,
    kind: GateKind,
    width: usize,
    num_inputs: usize,
    negate_inputs: Vec<bool>,
    negate_output: bool,
}

impl Gate {
    pub fn new(name: impl Into<String>, kind: GateKind, width: usize, num_inputs: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            width,
            num_inputs,
            negate_inputs: vec![false; num_inputs],
            negate_output: kind.negates_output(),
        }
    }

    /// Invert selected inputs before folding
    pub fn with_negated_inputs(mut self, negated: &[bool]) -> Self {
        for (slot, &negate) in self.negate_inputs.iter_mut().zip(negated) {
            *slot = negate;
        }
        self
    }

    pub fn kind(&self) -> GateKind {
        self.kind
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn output_port(&self) -> usize {
        self.num_inputs
    }

    fn compute(&self, inputs: &[WireValue]) -> WireValue {
        let mut result = WireValue::new(self.width);
        for bit in 0..self.width {
            if inputs.iter().all(|input| input.bit(bit) == BitState::Floating) {
                continue;
            }

            let mut states = inputs
                .iter()
                .zip(&self.negate_inputs)
                .map(|(input, &negate)| match negate {
                    true => input.bit(bit).negate(),
                    false => input.bit(bit),
                });
            let Some(first) = states.next() else {
                continue;
            };
            let mut acc = states.fold(first, |acc, state| self.kind.combine(acc, state));
            if self.negate_output {
                acc = acc.negate();
            }
            result.set_bit(bit, acc);
        }
        result
    }
}

impl Component for Gate {
    fn name(&self) -> &str {
        &self.name
    }

    fn port_widths(&self) -> Vec<usize> {
        vec![self.width; self.num_inputs + 1]
    }

    fn value_changed(&self, ctx: &mut ComponentContext<'_>, _value: &WireValue, port_index: usize) -> SimResult<()> {
        if port_index == self.output_port() {
            return Ok(());
        }

        let inputs = (0..self.num_inputs)
            .map(|index| ctx.last_received(index))
            .collect::<SimResult<Vec<_>>>()?;
        let output = self.compute(&inputs);
        ctx.push_value(self.output_port(), &output)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Single-input inverter: port 0 in, port 1 out
pub struct NotGate {
    inner: Gate,
}

impl NotGate {
    pub const INPUT: usize = 0;
    pub const OUTPUT: usize = 1;

    pub fn new(name: impl Into<String>, width: usize) -> Self {
        let mut inner = Gate::new(name, GateKind::And, width, 1);
        inner.negate_output = true;
        Self { inner }
    }
}

impl Component for NotGate {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn port_widths(&self) -> Vec<usize> {
        self.inner.port_widths()
    }

    fn value_changed(&self, ctx: &mut ComponentContext<'_>, value: &WireValue, port_index: usize) -> SimResult<()> {
        self.inner.value_changed(ctx, value, port_index)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(gate: &Gate, inputs: &[&str]) -> String {
        let inputs: Vec<WireValue> = inputs
            .iter()
            .map(|repr| {
                let states: Vec<BitState> = repr
                    .chars()
                    .rev()
                    .map(|c| match c {
                        '1' => BitState::One,
                        '0' => BitState::Zero,
                        _ => BitState::Floating,
                    })
                    .collect();
                WireValue::from_bits(&states)
            })
            .collect();
        gate.compute(&inputs).to_string()
    }

    #[test]
    fn test_and_truth_table() {
        let gate = Gate::new("and", GateKind::And, 1, 2);
        assert_eq!(bits(&gate, &["0", "0"]), "0");
        assert_eq!(bits(&gate, &["0", "1"]), "0");
        assert_eq!(bits(&gate, &["1", "0"]), "0");
        assert_eq!(bits(&gate, &["1", "1"]), "1");
    }

    #[test]
    fn test_all_floating_bits_stay_floating() {
        let gate = Gate::new("or", GateKind::Or, 2, 2);
        assert_eq!(bits(&gate, &["zz", "zz"]), "zz");
        assert_eq!(bits(&gate, &["z1", "z0"]), "z1");
        assert_eq!(bits(&gate, &["1z", "0z"]), "1z");
    }

    #[test]
    fn test_floating_input_folds_as_not_high() {
        let and = Gate::new("and", GateKind::And, 1, 2);
        assert_eq!(bits(&and, &["1", "z"]), "0");
        assert_eq!(bits(&and, &["z", "1"]), "0");

        let or = Gate::new("or", GateKind::Or, 1, 2);
        assert_eq!(bits(&or, &["1", "z"]), "1");
        assert_eq!(bits(&or, &["0", "z"]), "0");

        let xor = Gate::new("xor", GateKind::Xor, 1, 2);
        assert_eq!(bits(&xor, &["1", "z"]), "0");

        let nand = Gate::new("nand", GateKind::Nand, 1, 2);
        assert_eq!(bits(&nand, &["1", "z"]), "1");
        assert_eq!(bits(&nand, &["z", "z"]), "z");
    }

    #[test]
    fn test_negated_kinds() {
        let nand = Gate::new("nand", GateKind::Nand, 1, 2);
        assert_eq!(bits(&nand, &["1", "1"]), "0");
        assert_eq!(bits(&nand, &["0", "1"]), "1");

        let xnor = Gate::new("xnor", GateKind::Xnor, 1, 2);
        assert_eq!(bits(&xnor, &["1", "1"]), "1");
        assert_eq!(bits(&xnor, &["1", "0"]), "0");

        let nor = Gate::new("nor", GateKind::Nor, 1, 3);
        assert_eq!(bits(&nor, &["0", "0", "0"]), "1");
        assert_eq!(bits(&nor, &["0", "1", "0"]), "0");
    }

    #[test]
    fn test_negated_inputs() {
        let gate = Gate::new("and", GateKind::And, 1, 2).with_negated_inputs(&[true, false]);
        assert_eq!(bits(&gate, &["0", "1"]), "1");
        assert_eq!(bits(&gate, &["1", "1"]), "0");
    }

    #[test]
    fn test_not_gate_inverts() {
        let not = NotGate::new("not", 4);
        assert_eq!(not.inner.output_port(), NotGate::OUTPUT);
        assert_eq!(bits(&not.inner, &["10z1"]), "01z0");
    }
}

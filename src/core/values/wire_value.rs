use crate::core::errors::{ShortCircuit, SimResult, SimulationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state value of a single wire bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitState {
    One,
    Zero,
    Floating,
}

impl BitState {
    /// Character used when rendering a wire value
    pub fn repr(self) -> char {
        match self {
            BitState::One => '1',
            BitState::Zero => '0',
            BitState::Floating => 'z',
        }
    }

    /// Logical inverse; a floating bit stays floating
    pub fn negate(self) -> BitState {
        match self {
            BitState::One => BitState::Zero,
            BitState::Zero => BitState::One,
            BitState::Floating => BitState::Floating,
        }
    }

    pub fn from_bool(bit: bool) -> BitState {
        if bit {
            BitState::One
        } else {
            BitState::Zero
        }
    }
}

/// Multi-bit tri-state value carried by a link.
///
/// Bit 0 is the least significant bit. Values are plain data: every push or
/// read hands out its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireValue {
    bits: Vec<BitState>,
}

impl WireValue {
    /// Create an all-floating value of the given width
    pub fn new(width: usize) -> Self {
        Self::filled(width, BitState::Floating)
    }

    pub fn filled(width: usize, state: BitState) -> Self {
        Self {
            bits: vec![state; width],
        }
    }

    /// Build a value from explicit bits, least significant first
    pub fn from_bits(bits: &[BitState]) -> Self {
        Self {
            bits: bits.to_vec(),
        }
    }

    /// Create a fully defined value from an unsigned integer.
    /// Bits above 64 are zero.
    pub fn of(value: u64, width: usize) -> Self {
        let mut wire = Self::new(width);
        wire.set_value(value);
        wire
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn bits(&self) -> &[BitState] {
        &self.bits
    }

    pub fn bit(&self, index: usize) -> BitState {
        self.bits[index]
    }

    pub fn set_bit(&mut self, index: usize, state: BitState) {
        self.bits[index] = state;
    }

    pub fn set_all_bits(&mut self, state: BitState) {
        self.bits.iter_mut().for_each(|bit| *bit = state);
    }

    /// Resize in place. New high bits are floating.
    pub fn set_width(&mut self, width: usize) {
        self.bits.resize(width, BitState::Floating);
    }

    /// Copy of this value at a new width. New high bits are zero.
    pub fn resized(&self, width: usize) -> WireValue {
        let mut bits = self.bits.clone();
        bits.resize(width, BitState::Zero);
        WireValue { bits }
    }

    /// Overwrite every bit from a value of the same width
    pub fn set(&mut self, other: &WireValue) -> SimResult<()> {
        if other.width() != self.width() {
            return Err(SimulationError::WidthMismatch {
                expected: self.width(),
                found: other.width(),
            });
        }
        self.bits.copy_from_slice(&other.bits);
        Ok(())
    }

    /// Overwrite every bit from an unsigned integer
    pub fn set_value(&mut self, value: u64) {
        for (i, bit) in self.bits.iter_mut().enumerate() {
            let one = i < 64 && (value >> i) & 1 == 1;
            *bit = BitState::from_bool(one);
        }
    }

    /// Merge another driver's value into this one.
    ///
    /// A floating bit takes the other side's bit; two defined bits must agree.
    /// On conflict nothing is modified and the short circuit carries both
    /// operands.
    pub fn merge(&mut self, other: &WireValue) -> SimResult<&mut Self> {
        if other.width() != self.width() {
            return Err(SimulationError::WidthMismatch {
                expected: self.width(),
                found: other.width(),
            });
        }

        let mut merged = Vec::with_capacity(self.bits.len());
        for (&mine, &theirs) in self.bits.iter().zip(&other.bits) {
            let bit = match (mine, theirs) {
                (BitState::Floating, bit) | (bit, BitState::Floating) => bit,
                (a, b) if a == b => a,
                _ => {
                    return Err(SimulationError::ShortCircuit(ShortCircuit::new(
                        self.clone(),
                        other.clone(),
                    )))
                }
            };
            merged.push(bit);
        }

        self.bits = merged;
        Ok(self)
    }

    /// Non-mutating form of [`WireValue::merge`]
    pub fn merged(&self, other: &WireValue) -> SimResult<WireValue> {
        let mut value = self.clone();
        value.merge(other)?;
        Ok(value)
    }

    /// Extract `length` bits starting at `offset`
    pub fn slice(&self, offset: usize, length: usize) -> SimResult<WireValue> {
        match offset.checked_add(length) {
            Some(end) if end <= self.bits.len() => Ok(WireValue {
                bits: self.bits[offset..end].to_vec(),
            }),
            _ => Err(SimulationError::WidthMismatch {
                expected: self.bits.len(),
                found: offset.saturating_add(length),
            }),
        }
    }

    /// True iff the value is non-empty and no bit is floating
    pub fn is_valid_value(&self) -> bool {
        !self.bits.is_empty() && self.bits.iter().all(|&bit| bit != BitState::Floating)
    }

    /// Unsigned integer value, LSB at bit 0. Bits above 64 are ignored.
    pub fn value(&self) -> SimResult<u64> {
        let mut value = 0u64;
        for (i, &bit) in self.bits.iter().enumerate() {
            match bit {
                BitState::Floating => return Err(SimulationError::InvalidValue(self.to_string())),
                BitState::One if i < 64 => value |= 1 << i,
                _ => {}
            }
        }
        Ok(value)
    }

    pub fn to_hex_string(&self) -> String {
        let digits = 1 + self.width().saturating_sub(1) / 4;
        match self.value() {
            Ok(value) if self.is_valid_value() => format!("{:0width$x}", value, width = digits),
            _ => "z".repeat(digits),
        }
    }

    pub fn to_dec_string(&self) -> String {
        let digits = (self.width() as f64 / 3.322).ceil() as usize;
        match self.value() {
            Ok(value) if self.is_valid_value() => format!("{:0width$}", value, width = digits),
            _ => "z".repeat(digits),
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.bits.iter().rev() {
            write!(f, "{}", bit.repr())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_value(rng: &mut StdRng, width: usize) -> WireValue {
        let bits: Vec<BitState> = (0..width)
            .map(|_| match rng.gen_range(0..3) {
                0 => BitState::One,
                1 => BitState::Zero,
                _ => BitState::Floating,
            })
            .collect();
        WireValue::from_bits(&bits)
    }

    #[test]
    fn test_basic_construction() {
        let value = WireValue::new(10);
        assert_eq!(value.width(), 10);
        assert!(value.bits().iter().all(|&b| b == BitState::Floating));

        let value = WireValue::filled(15, BitState::One);
        assert_eq!(value.width(), 15);
        assert!(value.bits().iter().all(|&b| b == BitState::One));
    }

    #[test]
    fn test_of_sets_lsb_first() {
        let value = WireValue::of(0b10101, 5);
        assert_eq!(
            value.bits(),
            &[
                BitState::One,
                BitState::Zero,
                BitState::One,
                BitState::Zero,
                BitState::One
            ]
        );
        assert_eq!(value.to_string(), "10101");
    }

    #[test]
    fn test_merge_resolves_floating_bits() {
        let mut a = WireValue::new(4);
        let mut b = WireValue::new(4);
        a.set_bit(0, BitState::One);
        b.set_bit(1, BitState::Zero);
        a.set_bit(2, BitState::Zero);
        b.set_bit(2, BitState::Zero);

        let merged = a.merged(&b).unwrap();
        assert_eq!(
            merged.bits(),
            &[
                BitState::One,
                BitState::Zero,
                BitState::Zero,
                BitState::Floating
            ]
        );
    }

    #[test]
    fn test_merge_width_mismatch() {
        let mut a = WireValue::new(3);
        let b = WireValue::new(4);
        assert!(matches!(
            a.merge(&b),
            Err(SimulationError::WidthMismatch { expected: 3, found: 4 })
        ));
    }

    #[test]
    fn test_merge_conflict_is_short_circuit_and_leaves_value_untouched() {
        let mut one = WireValue::of(1, 1);
        let zero = WireValue::of(0, 1);
        match one.merge(&zero) {
            Err(SimulationError::ShortCircuit(sc)) => {
                assert_eq!(sc.first, WireValue::of(1, 1));
                assert_eq!(sc.second, WireValue::of(0, 1));
            }
            other => panic!("expected short circuit, got {:?}", other),
        }
        assert_eq!(one, WireValue::of(1, 1));
    }

    #[test]
    fn test_floating_never_conflicts() {
        let mut rng = StdRng::seed_from_u64(7);
        for width in 1..=16 {
            let value = random_value(&mut rng, width);
            let floating = WireValue::new(width);
            assert_eq!(floating.merged(&value).unwrap(), value);
            assert_eq!(value.merged(&floating).unwrap(), value);
        }
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut checked = 0;
        while checked < 200 {
            let width = rng.gen_range(1..12);
            let a = random_value(&mut rng, width);
            let b = random_value(&mut rng, width);
            let c = random_value(&mut rng, width);

            let ab = a.merged(&b);
            let ba = b.merged(&a);
            assert_eq!(ab.is_ok(), ba.is_ok());

            let left = ab.and_then(|ab| ab.merged(&c));
            let right = b.merged(&c).and_then(|bc| a.merged(&bc));
            match (left, right) {
                (Ok(l), Ok(r)) => {
                    assert_eq!(l, r);
                    checked += 1;
                }
                (Err(_), Err(_)) => {}
                (l, r) => panic!("associativity broken: {:?} vs {:?}", l, r),
            }
        }
    }

    #[test]
    fn test_value_round_trip() {
        for width in 1..=10 {
            for v in 0..(1u64 << width) {
                assert_eq!(WireValue::of(v, width).value().unwrap(), v);
            }
        }
        assert_eq!(WireValue::of(u64::MAX, 64).value().unwrap(), u64::MAX);
    }

    #[test]
    fn test_invalid_value() {
        let value = WireValue::new(1);
        assert!(!value.is_valid_value());
        assert!(matches!(value.value(), Err(SimulationError::InvalidValue(_))));
        assert!(!WireValue::new(0).is_valid_value());
    }

    #[test]
    fn test_string_rendering() {
        assert_eq!(WireValue::of(0xab, 8).to_hex_string(), "ab");
        assert_eq!(WireValue::of(0x5, 9).to_hex_string(), "005");
        assert_eq!(WireValue::new(8).to_hex_string(), "zz");
        assert_eq!(WireValue::of(7, 8).to_dec_string(), "007");
        assert_eq!(WireValue::new(8).to_dec_string(), "zzz");
        assert_eq!(WireValue::new(3).to_string(), "zzz");
    }

    #[test]
    fn test_resize_and_slice() {
        let value = WireValue::of(0b1011, 4);
        assert_eq!(value.resized(6), WireValue::of(0b1011, 6));
        assert_eq!(value.resized(2), WireValue::of(0b11, 2));

        let mut grown = value.clone();
        grown.set_width(5);
        assert_eq!(grown.bit(4), BitState::Floating);

        assert_eq!(value.slice(1, 3).unwrap(), WireValue::of(0b101, 3));
        assert!(value.slice(2, 3).is_err());
    }

    #[test]
    fn test_negate() {
        assert_eq!(BitState::One.negate(), BitState::Zero);
        assert_eq!(BitState::Zero.negate(), BitState::One);
        assert_eq!(BitState::Floating.negate(), BitState::Floating);
    }
}

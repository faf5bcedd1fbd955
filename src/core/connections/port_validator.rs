use crate::core::connections::Link;
use crate::core::errors::{SimResult, SimulationError};
use crate::core::values::WireValue;

/// Port and link validation utilities
pub struct PortValidator;

impl PortValidator {
    /// Validate that two links may be merged into one node
    pub fn validate_link(left: &Link, right: &Link) -> SimResult<()> {
        Self::validate_same_circuit(left, right)?;
        Self::validate_width(left, right)
    }

    /// Validate that two links belong to the same circuit
    pub fn validate_same_circuit(left: &Link, right: &Link) -> SimResult<()> {
        if left.circuit() != right.circuit() {
            return Err(SimulationError::DifferentCircuits {
                first: left.circuit(),
                second: right.circuit(),
            });
        }
        Ok(())
    }

    /// Validate that two links carry the same number of bits
    pub fn validate_width(left: &Link, right: &Link) -> SimResult<()> {
        if left.width() != right.width() {
            return Err(SimulationError::WidthMismatch {
                expected: left.width(),
                found: right.width(),
            });
        }
        Ok(())
    }

    /// Validate that a pushed value fits the link it is pushed onto
    pub fn validate_push(link: &Link, value: &WireValue) -> SimResult<()> {
        if value.width() != link.width() {
            return Err(SimulationError::WidthMismatch {
                expected: link.width(),
                found: value.width(),
            });
        }
        Ok(())
    }
}

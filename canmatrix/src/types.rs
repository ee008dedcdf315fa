//! Core types for the canmatrix library
//!
//! This module defines the error type shared by every component, the values the
//! codec consumes and produces, and the record used to report statements the
//! DBC parser had to skip.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for canmatrix operations
pub type Result<T> = std::result::Result<T, CanMatrixError>;

/// Errors that can occur while converting or coding a matrix
#[derive(Debug, thiserror::Error)]
pub enum CanMatrixError {
    #[error("Frame `{frame}` is {expected} bytes long but {actual} bytes were given")]
    DecodingFrameLength {
        frame: String,
        expected: usize,
        actual: usize,
    },

    #[error("Signal `{signal}` not found in frame `{frame}`")]
    UnknownSignal { frame: String, signal: String },

    #[error("Value `{name}` is not in the value table of signal `{signal}`")]
    UnknownNamedValue { signal: String, name: String },

    #[error("Raw value {raw} of signal `{signal}` is outside [{min}, {max}]")]
    RawOutOfRange {
        signal: String,
        raw: String,
        min: String,
        max: String,
    },

    #[error("Signal `{signal}` does not fit in frame `{frame}`")]
    SignalOutOfBounds { frame: String, signal: String },

    #[error("Invalid layout for signal `{signal}`: {reason}")]
    InvalidSignalLayout { signal: String, reason: String },

    #[error("Arithmetic overflow while scaling signal `{signal}`")]
    ArithmeticOverflow { signal: String },

    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),

    #[error("Unrecognized file header: {0}")]
    UnrecognizedHeader(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A statement the DBC parser could not apply
///
/// Loading never aborts on one bad statement; these records are attached to
/// the returned matrix so callers can see what was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadError {
    /// 1-based line number where the statement starts
    pub line: usize,
    /// The statement text (identifier encoding, lossy)
    pub statement: String,
    /// Why the statement was rejected
    pub reason: String,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.reason, self.statement)
    }
}

/// Raw value of a signal, as packed in the frame payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    /// Unsigned integer signal
    Unsigned(u64),
    /// Two's complement signal, sign-extended
    Signed(i64),
    /// IEEE float signal (32-bit values are widened)
    Float(f64),
}

impl RawValue {
    /// Value as a multiplexer selector; negative and float raws never select
    pub fn as_selector(&self) -> Option<u64> {
        match *self {
            RawValue::Unsigned(v) => Some(v),
            RawValue::Signed(v) => u64::try_from(v).ok(),
            RawValue::Float(_) => None,
        }
    }

    /// Value as a value-table key
    pub fn as_table_key(&self) -> Option<i64> {
        match *self {
            RawValue::Unsigned(v) => i64::try_from(v).ok(),
            RawValue::Signed(v) => Some(v),
            RawValue::Float(_) => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Unsigned(v) => write!(f, "{}", v),
            RawValue::Signed(v) => write!(f, "{}", v),
            RawValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Value handed to the encoder for one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalValue {
    /// Physical value (`raw * factor + offset`)
    Physical(Decimal),
    /// Label from the signal's value table
    Named(String),
}

impl From<Decimal> for SignalValue {
    fn from(value: Decimal) -> Self {
        SignalValue::Physical(value)
    }
}

impl From<i64> for SignalValue {
    fn from(value: i64) -> Self {
        SignalValue::Physical(Decimal::from(value))
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        SignalValue::Named(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        SignalValue::Named(value)
    }
}

/// Physical value, optionally tagged with its value-table label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysValue {
    /// Plain scaled number
    Number(Decimal),
    /// Raw value matched an entry of the value table
    Named {
        raw: RawValue,
        phys: Decimal,
        name: String,
    },
}

impl PhysValue {
    /// The numeric physical value regardless of labelling
    pub fn phys(&self) -> Decimal {
        match self {
            PhysValue::Number(v) => *v,
            PhysValue::Named { phys, .. } => *phys,
        }
    }
}

impl fmt::Display for PhysValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysValue::Number(v) => write!(f, "{}", v),
            PhysValue::Named { name, .. } => write!(f, "{}", name),
        }
    }
}

/// A decoded signal with raw, physical and (optional) named value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSignal {
    /// Raw value as extracted from the payload
    pub raw: RawValue,
    /// Physical value after scaling; saturated (NaN as zero) when the
    /// scaled value is outside the decimal range
    pub phys: Decimal,
    /// Value description from the value table
    pub named: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_conversion() {
        assert_eq!(RawValue::Unsigned(3).as_selector(), Some(3));
        assert_eq!(RawValue::Signed(5).as_selector(), Some(5));
        assert_eq!(RawValue::Signed(-1).as_selector(), None);
        assert_eq!(RawValue::Float(1.0).as_selector(), None);
    }

    #[test]
    fn test_table_key_conversion() {
        assert_eq!(RawValue::Unsigned(u64::MAX).as_table_key(), None);
        assert_eq!(RawValue::Signed(-2).as_table_key(), Some(-2));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", RawValue::Signed(-42)), "-42");
        assert_eq!(format!("{}", PhysValue::Number(Decimal::new(125, 1))), "12.5");
        let named = PhysValue::Named {
            raw: RawValue::Unsigned(1),
            phys: Decimal::ONE,
            name: "On".to_string(),
        };
        assert_eq!(format!("{}", named), "On");
        assert_eq!(named.phys(), Decimal::ONE);
    }

    #[test]
    fn test_signal_value_from() {
        assert_eq!(SignalValue::from(7i64), SignalValue::Physical(Decimal::from(7)));
        assert_eq!(SignalValue::from("Off"), SignalValue::Named("Off".to_string()));
    }
}

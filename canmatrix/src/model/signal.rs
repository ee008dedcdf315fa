//! Signal definition

use super::attribute::{self, AttributeValue, Attributes};
use super::matrix::CanMatrix;
use super::AttributeScope;
use crate::bit_layout;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Byte order for signal packing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Numeric interpretation of the raw bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Unsigned integer
    Unsigned,
    /// Two's complement integer
    Signed,
    /// IEEE 754 float (32 or 64 bits)
    Float,
}

/// Multiplexing role of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplex {
    /// Selects which multiplexed signals are present (DBC `M`)
    Multiplexor,
    /// Present when the selector equals the value (DBC `m<N>`)
    Value(u64),
    /// Present when the selector equals the value, and itself a selector
    /// for a lower level (DBC `m<N>M`)
    ValueMultiplexor(u64),
}

/// Inclusive selector range of a complex multiplexed signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MuxRange {
    pub lo: u64,
    pub hi: u64,
}

impl MuxRange {
    pub fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.lo <= value && value <= self.hi
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Signal name
    pub name: String,
    /// Bit index of the least significant bit (bit 0 = LSB of byte 0)
    pub start_bit: u32,
    /// Length in bits
    pub size: u32,
    /// Byte order of the packed value
    pub byte_order: ByteOrder,
    /// Numeric interpretation of the raw bits
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: Decimal,
    /// Offset to add after scaling
    pub offset: Decimal,
    /// Explicit minimum physical value
    pub min: Option<Decimal>,
    /// Explicit maximum physical value
    pub max: Option<Decimal>,
    /// Engineering unit (e.g., "km/h", "V")
    pub unit: String,
    /// Receiving ECU names
    pub receivers: Vec<String>,
    /// Multiplexing role
    pub multiplex: Option<Multiplex>,
    /// Selector ranges for complex multiplexing
    pub mux_ranges: Vec<MuxRange>,
    /// Selector signal name for complex multiplexing
    pub muxer_for_signal: Option<String>,
    /// Value table (raw value -> label)
    pub values: BTreeMap<i64, String>,
    pub attributes: Attributes,
    pub comment: Option<String>,
    /// Physical start value
    pub initial_value: Option<Decimal>,
}

impl Signal {
    /// Create an unsigned little-endian signal with unit scaling
    pub fn new(name: impl Into<String>, start_bit: u32, size: u32) -> Self {
        Self {
            name: name.into(),
            start_bit,
            size,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: Decimal::ONE,
            offset: Decimal::ZERO,
            min: None,
            max: None,
            unit: String::new(),
            receivers: Vec::new(),
            multiplex: None,
            mux_ranges: Vec::new(),
            muxer_for_signal: None,
            values: BTreeMap::new(),
            attributes: Attributes::new(),
            comment: None,
            initial_value: None,
        }
    }

    /// Builder method: set the byte order
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Builder method: set the value type
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Builder method: set factor and offset
    pub fn with_scaling(mut self, factor: Decimal, offset: Decimal) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    /// Builder method: set an explicit physical range
    pub fn with_range(mut self, min: Decimal, max: Decimal) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Builder method: set the unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Builder method: add a receiver
    pub fn with_receiver(mut self, receiver: impl Into<String>) -> Self {
        self.add_receiver(receiver);
        self
    }

    /// Builder method: set the multiplexing role
    pub fn with_multiplex(mut self, multiplex: Multiplex) -> Self {
        self.multiplex = Some(multiplex);
        self
    }

    /// Builder method: add a complex multiplexing range
    pub fn with_mux_range(mut self, lo: u64, hi: u64) -> Self {
        self.mux_ranges.push(MuxRange::new(lo, hi));
        self
    }

    /// Builder method: name the selector for complex multiplexing
    pub fn with_muxer(mut self, muxer: impl Into<String>) -> Self {
        self.muxer_for_signal = Some(muxer.into());
        self
    }

    /// Builder method: add a value table entry
    pub fn with_value(mut self, raw: i64, label: impl Into<String>) -> Self {
        self.values.insert(raw, label.into());
        self
    }

    /// Builder method: set the comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builder method: set the physical start value
    pub fn with_initial_value(mut self, value: Decimal) -> Self {
        self.initial_value = Some(value);
        self
    }

    /// Add a receiver unless already present
    pub fn add_receiver(&mut self, receiver: impl Into<String>) {
        let receiver = receiver.into();
        if !self.receivers.contains(&receiver) {
            self.receivers.push(receiver);
        }
    }

    /// Set an attribute value
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Resolve an attribute: own value, then the matrix's signal define
    /// default, then `default`
    pub fn attribute(
        &self,
        name: &str,
        matrix: Option<&CanMatrix>,
        default: Option<&AttributeValue>,
    ) -> Option<AttributeValue> {
        let defines = matrix.map(|m| m.defines(AttributeScope::Signal));
        attribute::resolve(&self.attributes, defines, name, default)
    }

    /// Whether the signal is only present under a selector condition
    pub fn is_multiplexed(&self) -> bool {
        !self.mux_ranges.is_empty()
            || matches!(
                self.multiplex,
                Some(Multiplex::Value(_)) | Some(Multiplex::ValueMultiplexor(_))
            )
    }

    /// Whether the signal selects other signals
    pub fn is_multiplexer(&self) -> bool {
        matches!(
            self.multiplex,
            Some(Multiplex::Multiplexor) | Some(Multiplex::ValueMultiplexor(_))
        )
    }

    /// Selector value this signal is present for (simple multiplexing)
    pub fn mux_value(&self) -> Option<u64> {
        match self.multiplex {
            Some(Multiplex::Value(v)) | Some(Multiplex::ValueMultiplexor(v)) => Some(v),
            _ => None,
        }
    }

    /// Check a selector value against this signal's multiplex condition
    ///
    /// A top-level multiplexor is never gated. Complex range lists take
    /// precedence over the single simple value.
    pub fn value_in_range(&self, value: u64) -> bool {
        if self.multiplex == Some(Multiplex::Multiplexor) {
            return true;
        }
        if !self.mux_ranges.is_empty() {
            return self.mux_ranges.iter().any(|range| range.contains(value));
        }
        self.mux_value() == Some(value)
    }

    /// Raw bounds implied by the bit width and value type
    pub fn raw_bounds(&self) -> (i128, i128) {
        let size = self.size.clamp(1, 64);
        match self.value_type {
            ValueType::Signed => (-(1i128 << (size - 1)), (1i128 << (size - 1)) - 1),
            _ => (0, (1i128 << size) - 1),
        }
    }

    /// Byte range the signal occupies, inclusive
    pub fn byte_span(&self) -> Option<(u32, u32)> {
        bit_layout::byte_span(self.start_bit, self.size, self.byte_order)
    }

    /// Whether the signal lies inside a payload of `frame_size` bytes
    pub fn fits_in(&self, frame_size: usize) -> bool {
        self.size <= 64
            && self
                .byte_span()
                .map_or(false, |(_, last)| (last as usize) < frame_size)
    }
}

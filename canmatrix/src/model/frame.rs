//! Frame definition

use super::attribute::{self, AttributeValue, Attributes};
use super::matrix::CanMatrix;
use super::signal::{Multiplex, Signal};
use super::AttributeScope;
use crate::codec::FrameCodec;
use crate::types::{CanMatrixError, DecodedSignal, Result, SignalValue};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Flag carried in-band in the DBC id field for 29-bit identifiers
pub const EXTENDED_ID_FLAG: u32 = 0x8000_0000;

/// CAN arbitration id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArbitrationId {
    /// 11-bit or 29-bit identifier
    pub id: u32,
    /// True for a 29-bit identifier
    pub extended: bool,
}

impl ArbitrationId {
    pub fn standard(id: u32) -> Self {
        Self {
            id,
            extended: false,
        }
    }

    pub fn extended(id: u32) -> Self {
        Self { id, extended: true }
    }

    /// Split a DBC id field into id and extended flag
    pub fn from_compound(raw: u32) -> Self {
        if raw & EXTENDED_ID_FLAG != 0 {
            Self::extended(raw & !EXTENDED_ID_FLAG)
        } else {
            Self::standard(raw)
        }
    }

    /// Id as written to a DBC file
    pub fn to_compound(&self) -> u32 {
        if self.extended {
            self.id | EXTENDED_ID_FLAG
        } else {
            self.id
        }
    }
}

impl fmt::Display for ArbitrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{:08X}", self.id)
        } else {
            write!(f, "0x{:03X}", self.id)
        }
    }
}

/// Named group of signals inside one frame
///
/// Members are indices into the owning frame's signal list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalGroup {
    pub name: String,
    pub id: u32,
    pub signals: Vec<usize>,
}

impl SignalGroup {
    /// Member signals, resolved against their frame
    pub fn members<'f>(&'f self, frame: &'f Frame) -> impl Iterator<Item = &'f Signal> + 'f {
        self.signals.iter().filter_map(move |&idx| frame.signals.get(idx))
    }
}

/// A CAN frame definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame name
    pub name: String,
    /// Arbitration id
    pub arbitration_id: ArbitrationId,
    /// Payload length in bytes (DLC)
    pub size: usize,
    /// All signals in this frame
    pub signals: Vec<Signal>,
    pub signal_groups: Vec<SignalGroup>,
    /// Transmitting ECU names
    pub transmitters: Vec<String>,
    /// Receiving ECU names, derived from the signals
    pub receivers: Vec<String>,
    pub comment: Option<String>,
    pub attributes: Attributes,
    /// True if signals are selected by range lists
    pub is_complex_multiplexed: bool,
}

impl Frame {
    /// Create an empty frame
    pub fn new(name: impl Into<String>, arbitration_id: ArbitrationId, size: usize) -> Self {
        Self {
            name: name.into(),
            arbitration_id,
            size,
            signals: Vec::new(),
            signal_groups: Vec::new(),
            transmitters: Vec::new(),
            receivers: Vec::new(),
            comment: None,
            attributes: Attributes::new(),
            is_complex_multiplexed: false,
        }
    }

    /// Builder method: add a transmitter
    pub fn with_transmitter(mut self, transmitter: impl Into<String>) -> Self {
        self.add_transmitter(transmitter);
        self
    }

    /// Builder method: add a signal
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.add_signal(signal);
        self
    }

    /// Append a signal and return its index
    pub fn add_signal(&mut self, signal: Signal) -> usize {
        self.signals.push(signal);
        self.signals.len() - 1
    }

    /// Remove a signal by name, keeping signal groups consistent
    pub fn remove_signal(&mut self, name: &str) -> Option<Signal> {
        let idx = self.signal_index(name)?;
        let removed = self.signals.remove(idx);
        for group in &mut self.signal_groups {
            group.signals.retain(|&member| member != idx);
            for member in &mut group.signals {
                if *member > idx {
                    *member -= 1;
                }
            }
        }
        Some(removed)
    }

    /// Index of the first signal with the given name
    pub fn signal_index(&self, name: &str) -> Option<usize> {
        self.signals.iter().position(|s| s.name == name)
    }

    /// Get a signal by name
    pub fn signal_by_name(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Get a mutable signal by name
    pub fn signal_by_name_mut(&mut self, name: &str) -> Option<&mut Signal> {
        self.signals.iter_mut().find(|s| s.name == name)
    }

    /// Add a signal group referencing existing signals by name
    pub fn add_signal_group(
        &mut self,
        name: impl Into<String>,
        id: u32,
        members: &[&str],
    ) -> Result<()> {
        let mut signals = Vec::with_capacity(members.len());
        for member in members {
            let idx = self
                .signal_index(member)
                .ok_or_else(|| CanMatrixError::UnknownSignal {
                    frame: self.name.clone(),
                    signal: member.to_string(),
                })?;
            if !signals.contains(&idx) {
                signals.push(idx);
            }
        }
        self.signal_groups.push(SignalGroup {
            name: name.into(),
            id,
            signals,
        });
        Ok(())
    }

    /// Get a signal group by name
    pub fn signal_group_by_name(&self, name: &str) -> Option<&SignalGroup> {
        self.signal_groups.iter().find(|g| g.name == name)
    }

    /// Add a transmitter unless already present
    pub fn add_transmitter(&mut self, transmitter: impl Into<String>) {
        let transmitter = transmitter.into();
        if !self.transmitters.contains(&transmitter) {
            self.transmitters.push(transmitter);
        }
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

    /// Resolve an attribute: own value, then the matrix's frame define
    /// default, then `default`
    pub fn attribute(
        &self,
        name: &str,
        matrix: Option<&CanMatrix>,
        default: Option<&AttributeValue>,
    ) -> Option<AttributeValue> {
        let defines = matrix.map(|m| m.defines(AttributeScope::Frame));
        attribute::resolve(&self.attributes, defines, name, default)
    }

    /// Cycle time in milliseconds (`GenMsgCycleTime`)
    pub fn cycle_time(&self, matrix: Option<&CanMatrix>) -> Option<u32> {
        self.attribute("GenMsgCycleTime", matrix, None)?
            .as_decimal()?
            .to_u32()
    }

    /// The top-level multiplexor, if any
    pub fn multiplexor(&self) -> Option<&Signal> {
        self.signals
            .iter()
            .find(|s| s.multiplex == Some(Multiplex::Multiplexor))
    }

    /// Whether any signal is multiplexed
    pub fn is_multiplexed(&self) -> bool {
        self.signals.iter().any(|s| s.is_multiplexed() || s.is_multiplexer())
    }

    /// Derive the frame receivers from the signal receivers
    pub fn update_receiver(&mut self) {
        let mut receivers: Vec<String> = Vec::new();
        for receiver in self.signals.iter().flat_map(|s| s.receivers.iter()) {
            if !receivers.contains(receiver) {
                receivers.push(receiver.clone());
            }
        }
        self.receivers = receivers;
    }

    /// Grow `size` to cover the highest byte any signal occupies
    pub fn calc_dlc(&mut self) {
        let needed = self
            .signals
            .iter()
            .filter_map(|s| s.byte_span())
            .map(|(_, last)| last as usize + 1)
            .max()
            .unwrap_or(0);
        self.size = self.size.max(needed);
    }

    /// Encode physical values into a payload of `size` bytes
    pub fn encode(&self, values: &HashMap<String, SignalValue>) -> Result<Vec<u8>> {
        FrameCodec::encode(self, values)
    }

    /// Decode a payload of exactly `size` bytes
    pub fn decode(&self, data: &[u8]) -> Result<HashMap<String, DecodedSignal>> {
        FrameCodec::decode(self, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ByteOrder;

    fn test_frame() -> Frame {
        Frame::new("TestFrame", ArbitrationId::standard(0x100), 8)
            .with_signal(Signal::new("A", 0, 8).with_receiver("ECU2"))
            .with_signal(Signal::new("B", 8, 8).with_receiver("ECU3"))
            .with_signal(Signal::new("C", 16, 8).with_receiver("ECU2"))
    }

    #[test]
    fn test_compound_id() {
        let id = ArbitrationId::from_compound(0x8000_0123);
        assert_eq!(id, ArbitrationId::extended(0x123));
        assert_eq!(id.to_compound(), 0x8000_0123);
        assert_eq!(ArbitrationId::from_compound(0x123), ArbitrationId::standard(0x123));
        assert_eq!(format!("{}", ArbitrationId::standard(0x64)), "0x064");
    }

    #[test]
    fn test_signal_lookup() {
        let frame = test_frame();
        assert_eq!(frame.signal_by_name("B").map(|s| s.start_bit), Some(8));
        assert!(frame.signal_by_name("b").is_none());
    }

    #[test]
    fn test_update_receiver() {
        let mut frame = test_frame();
        frame.receivers.push("Stale".to_string());
        frame.update_receiver();
        assert_eq!(frame.receivers, vec!["ECU2", "ECU3"]);
    }

    #[test]
    fn test_calc_dlc_grows_only() {
        let mut frame = Frame::new("F", ArbitrationId::standard(1), 1)
            .with_signal(Signal::new("A", 0, 12))
            .with_signal(Signal::new("B", 31, 8).with_byte_order(ByteOrder::BigEndian));
        frame.calc_dlc();
        assert_eq!(frame.size, 4);

        let mut wide = Frame::new("W", ArbitrationId::standard(2), 8).with_signal(Signal::new("A", 0, 8));
        wide.calc_dlc();
        assert_eq!(wide.size, 8);
    }

    #[test]
    fn test_remove_signal_reindexes_groups() {
        let mut frame = test_frame();
        frame.add_signal_group("Group", 1, &["A", "C"]).unwrap();
        frame.remove_signal("A").unwrap();

        let group = frame.signal_group_by_name("Group").unwrap();
        let names: Vec<&str> = group.members(&frame).map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["C"]);
        assert_eq!(group.signals, vec![1]);
    }

    #[test]
    fn test_signal_group_unknown_member() {
        let mut frame = test_frame();
        let result = frame.add_signal_group("Group", 1, &["A", "Missing"]);
        assert!(matches!(result, Err(CanMatrixError::UnknownSignal { signal, .. }) if signal == "Missing"));
        assert!(frame.signal_groups.is_empty());
    }

    #[test]
    fn test_multiplexor_lookup() {
        let frame = Frame::new("M", ArbitrationId::standard(3), 8)
            .with_signal(Signal::new("Mode", 0, 8).with_multiplex(Multiplex::Multiplexor))
            .with_signal(Signal::new("X", 8, 8).with_multiplex(Multiplex::Value(1)));
        assert_eq!(frame.multiplexor().map(|s| s.name.as_str()), Some("Mode"));
        assert!(frame.is_multiplexed());
        assert!(!test_frame().is_multiplexed());
    }
}

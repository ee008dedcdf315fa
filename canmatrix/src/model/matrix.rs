//! The communication matrix
//!
//! Owns frames, ECUs, attribute declarations and shared value tables.

use super::attribute::{self, AttributeScope, AttributeValue, Attributes, Define, Defines};
use super::frame::{ArbitrationId, Frame};
use crate::types::LoadError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value table: raw value -> label
pub type ValueTable = BTreeMap<i64, String>;

/// An electronic control unit (DBC node)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ecu {
    pub name: String,
    pub comment: Option<String>,
    pub attributes: Attributes,
}

impl Ecu {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            attributes: Attributes::new(),
        }
    }

    /// Set an attribute value
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Resolve an attribute: own value, then the matrix's ECU define
    /// default, then `default`
    pub fn attribute(
        &self,
        name: &str,
        matrix: Option<&CanMatrix>,
        default: Option<&AttributeValue>,
    ) -> Option<AttributeValue> {
        let defines = matrix.map(|m| m.defines(AttributeScope::Ecu));
        attribute::resolve(&self.attributes, defines, name, default)
    }
}

/// A complete CAN communication matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanMatrix {
    /// DBC `VERSION` string
    pub version: String,
    /// Global comment
    pub comment: Option<String>,
    /// All frames in definition order
    pub frames: Vec<Frame>,
    /// All ECUs in definition order
    pub ecus: Vec<Ecu>,
    /// Global attribute values
    pub attributes: Attributes,
    pub global_defines: Defines,
    pub frame_defines: Defines,
    pub signal_defines: Defines,
    pub ecu_defines: Defines,
    /// Named value tables shared between signals
    pub value_tables: BTreeMap<String, ValueTable>,
    /// Statements skipped while loading
    #[serde(default)]
    pub load_errors: Vec<LoadError>,
}

impl CanMatrix {
    /// Create an empty matrix
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame
    pub fn add_frame(&mut self, frame: Frame) -> &mut Frame {
        self.frames.push(frame);
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Get a frame by arbitration id (first match)
    pub fn frame_by_id(&self, id: ArbitrationId) -> Option<&Frame> {
        self.frames.iter().find(|f| f.arbitration_id == id)
    }

    /// Get a mutable frame by arbitration id (first match)
    pub fn frame_by_id_mut(&mut self, id: ArbitrationId) -> Option<&mut Frame> {
        self.frames.iter_mut().find(|f| f.arbitration_id == id)
    }

    /// Get a frame by name (first match)
    pub fn frame_by_name(&self, name: &str) -> Option<&Frame> {
        self.frames.iter().find(|f| f.name == name)
    }

    /// Get a mutable frame by name (first match)
    pub fn frame_by_name_mut(&mut self, name: &str) -> Option<&mut Frame> {
        self.frames.iter_mut().find(|f| f.name == name)
    }

    /// Add an ECU unless one with the same name exists
    pub fn add_ecu(&mut self, ecu: Ecu) -> &mut Ecu {
        let idx = match self.ecus.iter().position(|e| e.name == ecu.name) {
            Some(idx) => idx,
            None => {
                self.ecus.push(ecu);
                self.ecus.len() - 1
            }
        };
        &mut self.ecus[idx]
    }

    /// Get an ECU by name
    pub fn ecu_by_name(&self, name: &str) -> Option<&Ecu> {
        self.ecus.iter().find(|e| e.name == name)
    }

    /// Get a mutable ECU by name
    pub fn ecu_by_name_mut(&mut self, name: &str) -> Option<&mut Ecu> {
        self.ecus.iter_mut().find(|e| e.name == name)
    }

    /// Attribute declarations of one scope
    pub fn defines(&self, scope: AttributeScope) -> &Defines {
        match scope {
            AttributeScope::Global => &self.global_defines,
            AttributeScope::Frame => &self.frame_defines,
            AttributeScope::Signal => &self.signal_defines,
            AttributeScope::Ecu => &self.ecu_defines,
        }
    }

    /// Mutable attribute declarations of one scope
    pub fn defines_mut(&mut self, scope: AttributeScope) -> &mut Defines {
        match scope {
            AttributeScope::Global => &mut self.global_defines,
            AttributeScope::Frame => &mut self.frame_defines,
            AttributeScope::Signal => &mut self.signal_defines,
            AttributeScope::Ecu => &mut self.ecu_defines,
        }
    }

    /// Declare an attribute in one scope, replacing any previous declaration
    pub fn add_define(&mut self, scope: AttributeScope, name: impl Into<String>, define: Define) {
        self.defines_mut(scope).insert(name.into(), define);
    }

    /// Set a global attribute value
    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Resolve a global attribute: own value, then define default, then `default`
    pub fn attribute(&self, name: &str, default: Option<&AttributeValue>) -> Option<AttributeValue> {
        attribute::resolve(&self.attributes, Some(&self.global_defines), name, default)
    }

    /// Register a shared value table
    pub fn add_value_table(&mut self, name: impl Into<String>, table: ValueTable) {
        self.value_tables.insert(name.into(), table);
    }

    /// Derive every frame's receivers from its signals
    pub fn update_receivers(&mut self) {
        for frame in &mut self.frames {
            frame.update_receiver();
        }
    }

    /// Grow every frame's size to cover its signals
    pub fn calc_dlc(&mut self) {
        for frame in &mut self.frames {
            frame.calc_dlc();
        }
    }

    /// Register every transmitter and receiver name as an ECU
    pub fn update_ecu_list(&mut self) {
        let names: Vec<String> = self
            .frames
            .iter()
            .flat_map(|f| {
                f.transmitters
                    .iter()
                    .chain(f.receivers.iter())
                    .chain(f.signals.iter().flat_map(|s| s.receivers.iter()))
            })
            .cloned()
            .collect();
        for name in names {
            self.add_ecu(Ecu::new(name));
        }
    }

    /// Total number of signals across all frames
    pub fn signal_count(&self) -> usize {
        self.frames.iter().map(|f| f.signals.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DefineType, Signal};
    use rust_decimal::Decimal;

    fn test_matrix() -> CanMatrix {
        let mut matrix = CanMatrix::new();
        matrix.add_frame(
            Frame::new("EngineData", ArbitrationId::standard(0x123), 8)
                .with_transmitter("ECU1")
                .with_signal(Signal::new("EngineSpeed", 0, 16).with_receiver("ECU2")),
        );
        matrix.add_frame(
            Frame::new("Extended", ArbitrationId::extended(0x123), 8).with_transmitter("ECU3"),
        );
        matrix
    }

    #[test]
    fn test_frame_lookup() {
        let matrix = test_matrix();
        assert_eq!(
            matrix.frame_by_id(ArbitrationId::standard(0x123)).map(|f| f.name.as_str()),
            Some("EngineData")
        );
        assert_eq!(
            matrix.frame_by_id(ArbitrationId::extended(0x123)).map(|f| f.name.as_str()),
            Some("Extended")
        );
        assert!(matrix.frame_by_id(ArbitrationId::standard(0x124)).is_none());
        assert!(matrix.frame_by_name("Extended").is_some());
        assert!(matrix.frame_by_name("Missing").is_none());
        assert_eq!(matrix.signal_count(), 1);
    }

    #[test]
    fn test_ecu_list() {
        let mut matrix = test_matrix();
        matrix.update_ecu_list();
        let names: Vec<&str> = matrix.ecus.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["ECU1", "ECU2", "ECU3"]);

        matrix.add_ecu(Ecu::new("ECU1")).comment = Some("gateway".to_string());
        assert_eq!(matrix.ecus.len(), 3);
        assert_eq!(matrix.ecu_by_name("ECU1").unwrap().comment.as_deref(), Some("gateway"));
    }

    #[test]
    fn test_scoped_attribute_defaults() {
        let mut matrix = test_matrix();
        matrix.add_define(
            AttributeScope::Frame,
            "GenMsgCycleTime",
            Define::new(DefineType::Int { min: 0, max: 10000 }).with_default(100i64),
        );
        matrix.add_define(
            AttributeScope::Global,
            "BusType",
            Define::new(DefineType::String).with_default("CAN"),
        );

        let frame = matrix.frame_by_name("EngineData").unwrap();
        assert_eq!(frame.cycle_time(Some(&matrix)), Some(100));
        assert_eq!(frame.cycle_time(None), None);

        // a frame define does not leak into the signal scope
        let signal = frame.signal_by_name("EngineSpeed").unwrap();
        assert_eq!(signal.attribute("GenMsgCycleTime", Some(&matrix), None), None);

        assert_eq!(matrix.attribute("BusType", None), Some(AttributeValue::from("CAN")));

        let frame = matrix.frame_by_name_mut("EngineData").unwrap();
        frame.add_attribute("GenMsgCycleTime", Decimal::from(20));
        assert_eq!(frame.cycle_time(None), Some(20));
    }

    #[test]
    fn test_update_receivers() {
        let mut matrix = test_matrix();
        matrix.update_receivers();
        assert_eq!(matrix.frames[0].receivers, vec!["ECU2"]);
        assert!(matrix.frames[1].receivers.is_empty());
    }
}

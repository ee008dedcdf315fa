//! Typed attribute declarations and values

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attribute values keyed by attribute name (sorted, as DBC emits them)
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Attribute declarations keyed by attribute name
pub type Defines = BTreeMap<String, Define>;

/// Entity kind an attribute declaration applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeScope {
    /// The matrix itself (DBC: no object keyword)
    Global,
    /// Frames (DBC: `BO_`)
    Frame,
    /// Signals (DBC: `SG_`)
    Signal,
    /// ECUs (DBC: `BU_`)
    Ecu,
}

impl AttributeScope {
    /// Every scope, in DBC emission order of `BA_DEF_`
    pub const ALL: [AttributeScope; 4] = [
        AttributeScope::Global,
        AttributeScope::Frame,
        AttributeScope::Signal,
        AttributeScope::Ecu,
    ];
}

/// Value of one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Number(Decimal),
    Text(String),
}

impl AttributeValue {
    /// Numeric view; text holding a number is parsed
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            AttributeValue::Number(v) => Some(*v),
            AttributeValue::Text(s) => Decimal::from_str(s.trim()).ok(),
        }
    }

    /// Text view, only for text values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Number(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(v) => write!(f, "{}", v),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<Decimal> for AttributeValue {
    fn from(value: Decimal) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(Decimal::from(value))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// Type of an attribute declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefineType {
    Int { min: i64, max: i64 },
    Hex { min: i64, max: i64 },
    Float { min: Decimal, max: Decimal },
    String,
    Enum(Vec<String>),
}

/// Attribute declaration: type plus optional default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Define {
    pub kind: DefineType,
    pub default: Option<AttributeValue>,
}

impl Define {
    /// Create a declaration without default
    pub fn new(kind: DefineType) -> Self {
        Self {
            kind,
            default: None,
        }
    }

    /// Builder method: set the default value
    pub fn with_default(mut self, default: impl Into<AttributeValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Label of an enumeration index
    pub fn enum_label(&self, index: usize) -> Option<&str> {
        match &self.kind {
            DefineType::Enum(labels) => labels.get(index).map(String::as_str),
            _ => None,
        }
    }

    /// Whether values of this declaration are written as quoted strings
    pub fn is_textual(&self) -> bool {
        matches!(self.kind, DefineType::String | DefineType::Enum(_))
    }
}

/// Resolve an attribute: own value, then declaration default, then `default`
pub(crate) fn resolve(
    own: &Attributes,
    defines: Option<&Defines>,
    name: &str,
    default: Option<&AttributeValue>,
) -> Option<AttributeValue> {
    own.get(name)
        .or_else(|| {
            defines
                .and_then(|defines| defines.get(name))
                .and_then(|define| define.default.as_ref())
        })
        .or(default)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order() {
        let mut own = Attributes::new();
        let mut defines = Defines::new();
        defines.insert(
            "GenMsgCycleTime".to_string(),
            Define::new(DefineType::Int { min: 0, max: 1000 }).with_default(100i64),
        );
        let fallback = AttributeValue::from(5i64);

        // declaration default wins over caller default
        assert_eq!(
            resolve(&own, Some(&defines), "GenMsgCycleTime", Some(&fallback)),
            Some(AttributeValue::from(100i64))
        );

        // own value wins over everything
        own.insert("GenMsgCycleTime".to_string(), AttributeValue::from(20i64));
        assert_eq!(
            resolve(&own, Some(&defines), "GenMsgCycleTime", Some(&fallback)),
            Some(AttributeValue::from(20i64))
        );

        // unknown attribute falls back to the caller default, then to nothing
        assert_eq!(resolve(&own, Some(&defines), "Other", Some(&fallback)), Some(fallback));
        assert_eq!(resolve(&own, None, "Other", None), None);
    }

    #[test]
    fn test_enum_label() {
        let define = Define::new(DefineType::Enum(vec!["No".into(), "Yes".into()]));
        assert_eq!(define.enum_label(1), Some("Yes"));
        assert_eq!(define.enum_label(2), None);
        assert!(define.is_textual());
        assert!(!Define::new(DefineType::Hex { min: 0, max: 255 }).is_textual());
    }

    #[test]
    fn test_value_views() {
        assert_eq!(AttributeValue::from("12").as_decimal(), Some(Decimal::from(12)));
        assert_eq!(AttributeValue::from("abc").as_decimal(), None);
        assert_eq!(AttributeValue::from(3i64).as_str(), None);
        assert_eq!(AttributeValue::from("x").to_string(), "x");
    }
}

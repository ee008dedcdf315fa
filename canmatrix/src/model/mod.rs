//! In-memory communication matrix model
//!
//! Frames own their signals; signal groups refer to signals by index.
//! Nothing in this module performs I/O.

pub mod attribute;
pub mod frame;
pub mod matrix;
pub mod signal;

// Re-export key types for convenience
pub use attribute::{AttributeScope, AttributeValue, Attributes, Define, DefineType, Defines};
pub use frame::{ArbitrationId, Frame, SignalGroup, EXTENDED_ID_FLAG};
pub use matrix::{CanMatrix, Ecu, ValueTable};
pub use signal::{ByteOrder, Multiplex, MuxRange, Signal, ValueType};

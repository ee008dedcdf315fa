//! CAN Matrix Library
//!
//! An in-memory model of a CAN communication matrix (ECUs, frames, signals,
//! attributes, value tables) with a DBC reader/writer and a codec that packs
//! physical signal values into frame payloads and back.
//!
//! # Architecture
//!
//! - [`model`]: the matrix data model, no I/O
//! - [`bit_layout`]: conversions between start-bit conventions
//! - [`codec`]: raw/physical conversion and frame encoding/decoding
//! - [`formats`]: file formats (DBC) and dispatch by file extension
//! - [`config`]: options for loading and dumping
//!
//! The library does NOT:
//! - Read bus traces or talk to hardware
//! - Compare or merge matrices
//!
//! # Example Usage
//!
//! ```no_run
//! use canmatrix::{formats, LoadOptions, SignalValue};
//! use std::collections::HashMap;
//! use std::path::Path;
//!
//! let matrix = formats::load_file(Path::new("powertrain.dbc"), &LoadOptions::new()).unwrap();
//! for error in &matrix.load_errors {
//!     eprintln!("Skipped {}", error);
//! }
//!
//! let frame = matrix.frame_by_name("EngineData").unwrap();
//! let mut values = HashMap::new();
//! values.insert("EngineSpeed".to_string(), SignalValue::from(2500i64));
//! let payload = frame.encode(&values).unwrap();
//!
//! for (name, signal) in frame.decode(&payload).unwrap() {
//!     println!("{} = {}", name, signal.phys);
//! }
//! ```

// Public modules
pub mod bit_layout;
pub mod codec;
pub mod config;
pub mod formats;
pub mod model;
pub mod types;

// Re-export main types for convenience
pub use codec::FrameCodec;
pub use config::{DumpOptions, LoadOptions};
pub use model::{
    ArbitrationId, AttributeScope, AttributeValue, ByteOrder, CanMatrix, Define, DefineType, Ecu,
    Frame, Multiplex, MuxRange, Signal, SignalGroup, ValueType,
};
pub use types::{
    CanMatrixError, DecodedSignal, LoadError, PhysValue, RawValue, Result, SignalValue,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Vector DBC reader and writer
//!
//! The reader is tolerant: a statement it cannot apply is logged, recorded in
//! [`CanMatrix::load_errors`] and skipped. Only an unreadable stream or a
//! first statement that is no DBC keyword aborts loading.
//!
//! Identifiers and comments may be stored in different codecs, see
//! [`LoadOptions`] and [`DumpOptions`].

use crate::config::{DumpOptions, LoadOptions};
use crate::model::CanMatrix;
use crate::types::Result;
use std::io::{Read, Write};

mod lexer;
mod parser;
mod writer;

/// Placeholder node name for "no transmitter" / "no receiver"
pub(crate) const NO_NODE: &str = "Vector__XXX";

/// Signal attribute carrying the raw start value
pub(crate) const GEN_SIG_START_VALUE: &str = "GenSigStartValue";

/// Read a complete DBC stream
pub fn load<R: Read>(mut reader: R, options: &LoadOptions) -> Result<CanMatrix> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    parser::parse(&data, options)
}

/// Write `matrix` as DBC
///
/// The output is rendered completely before the first byte is written, so a
/// matrix that cannot be represented leaves `out` untouched.
pub fn dump<W: Write>(matrix: &CanMatrix, mut out: W, options: &DumpOptions) -> Result<()> {
    let bytes = writer::serialize(matrix, options)?;
    out.write_all(&bytes)?;
    out.flush()?;
    log::info!(
        "Wrote DBC with {} frames ({} bytes)",
        matrix.frames.len(),
        bytes.len()
    );
    Ok(())
}

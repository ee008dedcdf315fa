//! Matrix file formats
//!
//! Each format provides a reader and a writer working on byte streams.
//! [`FORMATS`] maps format names and file extensions to those functions so
//! callers can dispatch on a path.

use crate::config::{DumpOptions, LoadOptions};
use crate::model::CanMatrix;
use crate::types::{CanMatrixError, Result};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

pub mod dbc;

/// Reader entry point of a format
pub type LoadFn = fn(&mut dyn Read, &LoadOptions) -> Result<CanMatrix>;

/// Writer entry point of a format
pub type DumpFn = fn(&CanMatrix, &mut dyn Write, &DumpOptions) -> Result<()>;

/// One registered format
#[derive(Debug, Clone, Copy)]
pub struct Format {
    /// Format identifier, e.g. `"dbc"`
    pub name: &'static str,
    /// File extensions without the dot, lowercase
    pub extensions: &'static [&'static str],
    pub load: LoadFn,
    pub dump: DumpFn,
}

fn load_dbc(reader: &mut dyn Read, options: &LoadOptions) -> Result<CanMatrix> {
    dbc::load(reader, options)
}

fn dump_dbc(matrix: &CanMatrix, writer: &mut dyn Write, options: &DumpOptions) -> Result<()> {
    dbc::dump(matrix, writer, options)
}

/// All supported formats
pub static FORMATS: &[Format] = &[Format {
    name: "dbc",
    extensions: &["dbc"],
    load: load_dbc,
    dump: dump_dbc,
}];

/// Look up a format by identifier (case-insensitive)
pub fn by_name(name: &str) -> Result<&'static Format> {
    FORMATS
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| CanMatrixError::UnsupportedFormat(name.to_string()))
}

/// Look up a format by the extension of `path`
pub fn by_extension(path: &Path) -> Result<&'static Format> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    FORMATS
        .iter()
        .find(|f| f.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension)))
        .ok_or_else(|| CanMatrixError::UnsupportedFormat(path.display().to_string()))
}

/// Load a matrix from a file, choosing the format by extension
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<CanMatrix> {
    let format = by_extension(path)?;
    log::info!("Loading {} file: {}", format.name, path.display());
    let mut file = fs::File::open(path)?;
    (format.load)(&mut file, options)
}

/// Write a matrix to a file, choosing the format by extension
///
/// Nothing is created when the matrix cannot be rendered.
pub fn dump_file(matrix: &CanMatrix, path: &Path, options: &DumpOptions) -> Result<()> {
    let format = by_extension(path)?;
    let mut buffer = Vec::new();
    (format.dump)(matrix, &mut buffer, options)?;
    fs::write(path, buffer)?;
    log::info!("Wrote {} file: {}", format.name, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(by_name("DBC").unwrap().name, "dbc");
        assert!(matches!(
            by_name("arxml"),
            Err(CanMatrixError::UnsupportedFormat(_))
        ));

        assert_eq!(by_extension(Path::new("bus/Body.DBC")).unwrap().name, "dbc");
        assert!(matches!(
            by_extension(Path::new("bus/body.kcd")),
            Err(CanMatrixError::UnsupportedFormat(_))
        ));
        assert!(by_extension(Path::new("noextension")).is_err());
    }
}

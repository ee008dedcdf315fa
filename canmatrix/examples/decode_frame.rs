//! Decode one CAN payload with a matrix file
//!
//! Usage:
//!   decode_frame <matrix.dbc> <frame id> <payload hex>
//!
//! Example:
//!   decode_frame powertrain.dbc 0x100 "01 FF 20 00 00 00 00 00"
//!
//! Frame ids above 0x7FF are looked up as extended ids.

use anyhow::{anyhow, bail, Context, Result};
use canmatrix::{formats, ArbitrationId, LoadOptions};
use std::env;
use std::path::PathBuf;

fn parse_id(text: &str) -> Result<ArbitrationId> {
    let id = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    }
    .with_context(|| format!("invalid frame id: {}", text))?;
    Ok(if id > 0x7FF {
        ArbitrationId::extended(id)
    } else {
        ArbitrationId::standard(id)
    })
}

fn parse_payload(text: &str) -> Result<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("payload has an odd number of hex digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| anyhow!("invalid payload: {}", e)))
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: {} <matrix.dbc> <frame id> <payload hex>", args[0]);
        std::process::exit(1);
    }

    let path = PathBuf::from(&args[1]);
    let id = parse_id(&args[2])?;
    let payload = parse_payload(&args[3])?;

    let matrix = formats::load_file(&path, &LoadOptions::new())
        .with_context(|| format!("failed to load {}", path.display()))?;
    for error in &matrix.load_errors {
        log::warn!("Skipped {}", error);
    }

    let frame = matrix
        .frame_by_id(id)
        .ok_or_else(|| anyhow!("frame {:?} not found in {}", id, path.display()))?;
    let decoded = frame.decode(&payload)?;

    println!("{} ({} bytes)", frame.name, frame.size);
    let mut names: Vec<&String> = decoded.keys().collect();
    names.sort();
    for name in names {
        let signal = &decoded[name];
        let unit = frame
            .signal_by_name(name)
            .map(|s| s.unit.as_str())
            .unwrap_or_default();
        match &signal.named {
            Some(label) => println!("  {:<24} {} ({}) [raw {}]", name, label, signal.phys, signal.raw),
            None => println!("  {:<24} {} {} [raw {}]", name, signal.phys, unit, signal.raw),
        }
    }

    Ok(())
}

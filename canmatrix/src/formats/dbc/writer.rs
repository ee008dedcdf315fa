//! DBC serializer (model -> text)

use super::{GEN_SIG_START_VALUE, NO_NODE};
use crate::bit_layout;
use crate::config::DumpOptions;
use crate::model::{
    AttributeScope, AttributeValue, Attributes, ByteOrder, CanMatrix, Define, DefineType, Defines,
    Frame, Multiplex, Signal, ValueType,
};
use crate::types::{CanMatrixError, Result};
use encoding_rs::Encoding;
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Format a number the way DBC files carry it
///
/// Saturated bounds (see the parser) are written back as the single-precision
/// limits they usually stand for.
fn format_number(value: Decimal) -> String {
    if value == Decimal::MAX {
        "3.4E+038".to_string()
    } else if value == Decimal::MIN {
        "-3.4E+038".to_string()
    } else {
        value.normalize().to_string()
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn scope_keyword(scope: AttributeScope) -> &'static str {
    match scope {
        AttributeScope::Global => "",
        AttributeScope::Frame => "BO_ ",
        AttributeScope::Signal => "SG_ ",
        AttributeScope::Ecu => "BU_ ",
    }
}

fn define_type(kind: &DefineType) -> String {
    match kind {
        DefineType::Int { min, max } => format!("INT {} {}", min, max),
        DefineType::Hex { min, max } => format!("HEX {} {}", min, max),
        DefineType::Float { min, max } => {
            format!("FLOAT {} {}", format_number(*min), format_number(*max))
        }
        DefineType::String => "STRING ".to_string(),
        DefineType::Enum(labels) => {
            let labels: Vec<String> = labels.iter().map(|l| quote(l)).collect();
            format!("ENUM {}", labels.join(","))
        }
    }
}

/// Attribute value as written in `BA_` (enum labels become indices)
fn attribute_value(define: Option<&Define>, value: &AttributeValue) -> String {
    match (define.map(|d| &d.kind), value) {
        (Some(DefineType::Enum(labels)), AttributeValue::Text(label)) => {
            match labels.iter().position(|l| l == label) {
                Some(index) => index.to_string(),
                None => quote(label),
            }
        }
        (_, AttributeValue::Number(n)) => format_number(*n),
        (_, AttributeValue::Text(text)) => quote(text),
    }
}

/// Default value as written in `BA_DEF_DEF_` (enum labels stay quoted)
fn default_value(define: &Define, value: &AttributeValue) -> String {
    match value {
        AttributeValue::Number(n) if !define.is_textual() => format_number(*n),
        other => quote(&other.to_string()),
    }
}

fn mux_token(signal: &Signal) -> Option<String> {
    match signal.multiplex {
        Some(Multiplex::Multiplexor) => Some("M".to_string()),
        Some(Multiplex::Value(v)) => Some(format!("m{}", v)),
        Some(Multiplex::ValueMultiplexor(v)) => Some(format!("m{}M", v)),
        None => signal.mux_ranges.first().map(|r| format!("m{}", r.lo)),
    }
}

/// Raw `GenSigStartValue` to emit for a signal whose start value is only
/// known physically
fn pending_start_value(signal: &Signal) -> Option<Decimal> {
    if signal.attributes.contains_key(GEN_SIG_START_VALUE) {
        return None;
    }
    let phys = signal.initial_value?;
    let raw = phys
        .checked_sub(signal.offset)
        .and_then(|v| v.checked_div(signal.factor));
    if raw.is_none() {
        log::warn!("Start value of signal {} cannot be scaled to raw", signal.name);
    }
    raw
}

/// Signal defines, plus a `GenSigStartValue` declaration if one is needed
fn signal_defines(matrix: &CanMatrix) -> Cow<'_, Defines> {
    let needed = !matrix.signal_defines.contains_key(GEN_SIG_START_VALUE)
        && matrix
            .frames
            .iter()
            .flat_map(|f| f.signals.iter())
            .any(|s| pending_start_value(s).is_some());
    if !needed {
        return Cow::Borrowed(&matrix.signal_defines);
    }
    let mut defines = matrix.signal_defines.clone();
    defines.insert(
        GEN_SIG_START_VALUE.to_string(),
        Define::new(DefineType::Float {
            min: Decimal::MIN,
            max: Decimal::MAX,
        }),
    );
    Cow::Owned(defines)
}

/// In-memory DBC output
struct DbcWriter<'o> {
    out: Vec<u8>,
    ident: &'static Encoding,
    comment: &'static Encoding,
    options: &'o DumpOptions,
}

impl DbcWriter<'_> {
    fn encode(&mut self, encoding: &'static Encoding, text: &str) {
        let (bytes, _, had_errors) = encoding.encode(text);
        if had_errors {
            log::warn!(
                "Text {:?} cannot be represented in {}",
                text,
                encoding.name()
            );
        }
        self.out.extend_from_slice(&bytes);
    }

    fn line(&mut self, text: &str) {
        self.encode(self.ident, text);
        self.out.push(b'\n');
    }

    fn blank(&mut self) {
        self.out.push(b'\n');
    }

    /// Statement with a quoted free-text tail in the comment codec
    fn comment_line(&mut self, head: &str, text: &str) {
        self.encode(self.ident, head);
        self.encode(self.comment, &quote(text));
        self.encode(self.ident, ";");
        self.out.push(b'\n');
    }

    fn name(&self, name: &str) -> String {
        self.options.sanitize_identifier(name)
    }

    fn id(frame: &Frame) -> u32 {
        frame.arbitration_id.to_compound()
    }

    fn header(&mut self, matrix: &CanMatrix) {
        self.line(&format!("VERSION {}", quote(&matrix.version)));
        self.blank();
        self.blank();
        self.line("NS_ :");
        self.blank();
        self.line("BS_:");
        self.blank();

        let nodes: Vec<String> = matrix.ecus.iter().map(|e| self.name(&e.name)).collect();
        self.line(&format!("BU_: {}", nodes.join(" ")));
        self.blank();
        self.blank();
    }

    fn value_tables(&mut self, matrix: &CanMatrix) {
        for (name, table) in &matrix.value_tables {
            let mut line = format!("VAL_TABLE_ {}", self.name(name));
            for (raw, label) in table {
                line.push_str(&format!(" {} {}", raw, quote(label)));
            }
            line.push_str(" ;");
            self.line(&line);
        }
        if !matrix.value_tables.is_empty() {
            self.blank();
        }
    }

    fn frames(&mut self, matrix: &CanMatrix) -> Result<()> {
        for frame in &matrix.frames {
            let transmitter = frame
                .transmitters
                .first()
                .map_or_else(|| NO_NODE.to_string(), |t| self.name(t));
            self.line(&format!(
                "BO_ {} {}: {} {}",
                Self::id(frame),
                self.name(&frame.name),
                frame.size,
                transmitter
            ));
            for signal in &frame.signals {
                let line = self.signal_line(signal)?;
                self.line(&line);
            }
            self.blank();
        }
        Ok(())
    }

    fn signal_line(&self, signal: &Signal) -> Result<String> {
        let start = bit_layout::to_msb(signal.start_bit, signal.size, signal.byte_order)
            .ok_or_else(|| CanMatrixError::InvalidSignalLayout {
                signal: signal.name.clone(),
                reason: "big-endian signal begins before bit 0".to_string(),
            })?;
        let order = match signal.byte_order {
            ByteOrder::LittleEndian => '1',
            ByteOrder::BigEndian => '0',
        };
        let sign = match signal.value_type {
            ValueType::Unsigned => '+',
            ValueType::Signed | ValueType::Float => '-',
        };
        let mux = mux_token(signal).map(|m| format!(" {}", m)).unwrap_or_default();
        let receivers = if signal.receivers.is_empty() {
            NO_NODE.to_string()
        } else {
            let names: Vec<String> = signal.receivers.iter().map(|r| self.name(r)).collect();
            names.join(",")
        };

        Ok(format!(
            " SG_ {}{} : {}|{}@{}{} ({},{}) [{}|{}] {} {}",
            self.name(&signal.name),
            mux,
            start,
            signal.size,
            order,
            sign,
            format_number(signal.factor),
            format_number(signal.offset),
            format_number(signal.min.unwrap_or(Decimal::ZERO)),
            format_number(signal.max.unwrap_or(Decimal::ZERO)),
            quote(&signal.unit),
            receivers
        ))
    }

    fn transmitter_lists(&mut self, matrix: &CanMatrix) {
        for frame in matrix.frames.iter().filter(|f| f.transmitters.len() > 1) {
            let names: Vec<String> = frame.transmitters.iter().map(|t| self.name(t)).collect();
            self.line(&format!("BO_TX_BU_ {} : {};", Self::id(frame), names.join(",")));
        }
    }

    fn comments(&mut self, matrix: &CanMatrix) {
        if let Some(comment) = &matrix.comment {
            self.comment_line("CM_ ", comment);
        }
        for frame in &matrix.frames {
            if let Some(comment) = &frame.comment {
                self.comment_line(&format!("CM_ BO_ {} ", Self::id(frame)), comment);
            }
            for signal in &frame.signals {
                if let Some(comment) = &signal.comment {
                    let head = format!("CM_ SG_ {} {} ", Self::id(frame), self.name(&signal.name));
                    self.comment_line(&head, comment);
                }
            }
        }
        for ecu in &matrix.ecus {
            if let Some(comment) = &ecu.comment {
                let head = format!("CM_ BU_ {} ", self.name(&ecu.name));
                self.comment_line(&head, comment);
            }
        }
    }

    fn defines(&mut self, matrix: &CanMatrix, signal_defines: &Defines) {
        for scope in AttributeScope::ALL {
            let defines = match scope {
                AttributeScope::Signal => signal_defines,
                other => matrix.defines(other),
            };
            for (name, define) in defines {
                self.line(&format!(
                    "BA_DEF_ {}{} {};",
                    scope_keyword(scope),
                    quote(name),
                    define_type(&define.kind)
                ));
            }
        }

        let mut defaults: BTreeMap<&str, &Define> = BTreeMap::new();
        for scope in AttributeScope::ALL {
            let defines = match scope {
                AttributeScope::Signal => signal_defines,
                other => matrix.defines(other),
            };
            for (name, define) in defines.iter().filter(|(_, d)| d.default.is_some()) {
                match defaults.entry(name.as_str()) {
                    Entry::Vacant(entry) => {
                        entry.insert(define);
                    }
                    Entry::Occupied(entry) if entry.get().default != define.default => {
                        log::warn!(
                            "Attribute {} has different defaults per scope, writing {:?} and dropping {:?} ({:?})",
                            name,
                            entry.get().default,
                            define.default,
                            scope
                        );
                    }
                    Entry::Occupied(_) => {}
                }
            }
        }
        for (name, define) in defaults {
            if let Some(value) = &define.default {
                self.line(&format!(
                    "BA_DEF_DEF_ {} {};",
                    quote(name),
                    default_value(define, value)
                ));
            }
        }
    }

    fn attribute_lines(&mut self, head: &str, attributes: &Attributes, defines: &Defines) {
        for (name, value) in attributes {
            self.line(&format!(
                "BA_ {} {}{};",
                quote(name),
                head,
                attribute_value(defines.get(name), value)
            ));
        }
    }

    fn attributes(&mut self, matrix: &CanMatrix, signal_defines: &Defines) {
        self.attribute_lines("", &matrix.attributes, &matrix.global_defines);
        for ecu in &matrix.ecus {
            let head = format!("BU_ {} ", self.name(&ecu.name));
            self.attribute_lines(&head, &ecu.attributes, &matrix.ecu_defines);
        }
        for frame in &matrix.frames {
            let head = format!("BO_ {} ", Self::id(frame));
            self.attribute_lines(&head, &frame.attributes, &matrix.frame_defines);
        }
        for frame in &matrix.frames {
            for signal in &frame.signals {
                let head = format!("SG_ {} {} ", Self::id(frame), self.name(&signal.name));
                let attributes = match pending_start_value(signal) {
                    Some(raw) => {
                        let mut attributes = signal.attributes.clone();
                        attributes.insert(GEN_SIG_START_VALUE.to_string(), AttributeValue::Number(raw));
                        Cow::Owned(attributes)
                    }
                    None => Cow::Borrowed(&signal.attributes),
                };
                self.attribute_lines(&head, &attributes, signal_defines);
            }
        }
    }

    fn value_descriptions(&mut self, matrix: &CanMatrix) {
        for frame in &matrix.frames {
            for signal in frame.signals.iter().filter(|s| !s.values.is_empty()) {
                let mut line = format!("VAL_ {} {}", Self::id(frame), self.name(&signal.name));
                for (raw, label) in &signal.values {
                    line.push_str(&format!(" {} {}", raw, quote(label)));
                }
                line.push_str(" ;");
                self.line(&line);
            }
        }
    }

    fn signal_groups(&mut self, matrix: &CanMatrix) {
        for frame in &matrix.frames {
            for group in &frame.signal_groups {
                let members: Vec<String> = group.members(frame).map(|s| self.name(&s.name)).collect();
                self.line(&format!(
                    "SIG_GROUP_ {} {} {} : {};",
                    Self::id(frame),
                    self.name(&group.name),
                    group.id,
                    members.join(" ")
                ));
            }
        }
    }

    fn value_types(&mut self, matrix: &CanMatrix) -> Result<()> {
        for frame in &matrix.frames {
            for signal in frame.signals.iter().filter(|s| s.value_type == ValueType::Float) {
                let kind = match signal.size {
                    32 => 1,
                    64 => 2,
                    _ => {
                        return Err(CanMatrixError::InvalidSignalLayout {
                            signal: signal.name.clone(),
                            reason: "float signals must be 32 or 64 bits".to_string(),
                        })
                    }
                };
                self.line(&format!(
                    "SIG_VALTYPE_ {} {} : {};",
                    Self::id(frame),
                    self.name(&signal.name),
                    kind
                ));
            }
        }
        Ok(())
    }

    fn mux_ranges(&mut self, matrix: &CanMatrix) {
        for frame in &matrix.frames {
            for signal in frame.signals.iter().filter(|s| !s.mux_ranges.is_empty()) {
                let selector = signal
                    .muxer_for_signal
                    .as_deref()
                    .or_else(|| frame.multiplexor().map(|m| m.name.as_str()));
                let Some(selector) = selector else {
                    log::warn!("Signal {} has multiplexer ranges but no selector", signal.name);
                    continue;
                };
                let ranges: Vec<String> = signal
                    .mux_ranges
                    .iter()
                    .map(|r| format!("{}-{}", r.lo, r.hi))
                    .collect();
                self.line(&format!(
                    "SG_MUL_VAL_ {} {} {} {};",
                    Self::id(frame),
                    self.name(&signal.name),
                    self.name(selector),
                    ranges.join(", ")
                ));
            }
        }
    }
}

/// Render a complete matrix as DBC bytes
pub(crate) fn serialize(matrix: &CanMatrix, options: &DumpOptions) -> Result<Vec<u8>> {
    let (ident, comment) = options.encodings()?;
    let mut writer = DbcWriter {
        out: Vec::new(),
        ident,
        comment,
        options,
    };
    let signal_defines = signal_defines(matrix);

    writer.header(matrix);
    writer.value_tables(matrix);
    writer.frames(matrix)?;
    writer.transmitter_lists(matrix);
    writer.blank();
    writer.comments(matrix);
    writer.defines(matrix, &signal_defines);
    writer.attributes(matrix, &signal_defines);
    writer.value_descriptions(matrix);
    writer.signal_groups(matrix);
    writer.value_types(matrix)?;
    writer.mux_ranges(matrix);

    Ok(writer.out)
}

//! DBC parser (text -> model)
//!
//! Statements are dispatched on their leading keyword. A statement that
//! cannot be applied is recorded in [`CanMatrix::load_errors`] and the scan
//! goes on; only an unreadable or unrecognizable stream is fatal.

use super::lexer::{self, Statement, Token};
use super::{GEN_SIG_START_VALUE, NO_NODE};
use crate::bit_layout;
use crate::config::LoadOptions;
use crate::model::{
    ArbitrationId, AttributeScope, AttributeValue, Attributes, ByteOrder, CanMatrix, Define,
    DefineType, Defines, Ecu, Frame, Multiplex, MuxRange, Signal, ValueTable, ValueType,
};
use crate::types::{CanMatrixError, LoadError, Result};
use encoding_rs::Encoding;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Keywords the parser applies to the model
const KEYWORDS: &[&str] = &[
    "VERSION",
    "NS_",
    "BS_",
    "BU_",
    "BO_",
    "SG_",
    "BO_TX_BU_",
    "CM_",
    "VAL_",
    "VAL_TABLE_",
    "BA_DEF_",
    "BA_DEF_DEF_",
    "BA_",
    "SIG_GROUP_",
    "SIG_VALTYPE_",
    "SG_MUL_VAL_",
];

/// Valid DBC keywords carrying nothing the model keeps
const IGNORED_KEYWORDS: &[&str] = &[
    "NS_DESC_",
    "CAT_DEF_",
    "CAT_",
    "FILTER",
    "EV_",
    "EV_DATA_",
    "ENVVAR_DATA_",
    "SGTYPE_",
    "SGTYPE_VAL_",
    "BA_DEF_SGTYPE_",
    "BA_SGTYPE_",
    "SIG_TYPE_REF_",
    "SIGTYPE_VALTYPE_",
    "BA_DEF_REL_",
    "BA_REL_",
    "BA_DEF_DEF_REL_",
    "BU_SG_REL_",
    "BU_EV_REL_",
    "BU_BO_REL_",
];

/// Largest payload a frame can carry (CAN FD)
const MAX_PAYLOAD: usize = 64;

/// Why a single statement was rejected
type StatementResult<T> = std::result::Result<T, String>;

fn is_keyword(word: &[u8], list: &[&str]) -> bool {
    list.iter().any(|k| k.as_bytes() == word)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn describe(token: Option<&Token<'_>>) -> String {
    match token {
        Some(Token::Word(w)) => format!("`{}`", lossy(w)),
        Some(Token::Str(_)) => "a string".to_string(),
        Some(Token::Punct(p)) => format!("`{}`", *p as char),
        None => "end of statement".to_string(),
    }
}

/// Token cursor over one statement
struct Cursor<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
}

impl<'t, 'a> Cursor<'t, 'a> {
    fn new(tokens: &'t [Token<'a>]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token<'a>> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn word(&mut self, what: &str) -> StatementResult<&'a [u8]> {
        match self.next() {
            Some(Token::Word(w)) => Ok(*w),
            other => Err(format!("expected {}, found {}", what, describe(other))),
        }
    }

    fn string(&mut self, what: &str) -> StatementResult<&'t [u8]> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s.as_slice()),
            other => Err(format!("expected {}, found {}", what, describe(other))),
        }
    }

    fn punct(&mut self, p: u8) -> StatementResult<()> {
        match self.next() {
            Some(token) if token.is_punct(p) => Ok(()),
            other => Err(format!("expected `{}`, found {}", p as char, describe(other))),
        }
    }

    fn eat(&mut self, p: u8) -> bool {
        let found = self.peek().map_or(false, |t| t.is_punct(p));
        if found {
            self.pos += 1;
        }
        found
    }
}

fn parse_int<T: FromStr>(word: &[u8], what: &str) -> StatementResult<T> {
    std::str::from_utf8(word)
        .ok()
        .and_then(|text| text.parse::<T>().ok())
        .ok_or_else(|| format!("invalid {} `{}`", what, lossy(word)))
}

/// Parse a DBC number, saturating values outside the decimal range
pub(crate) fn parse_decimal(word: &[u8]) -> StatementResult<Decimal> {
    let text = std::str::from_utf8(word).map_err(|_| format!("invalid number `{}`", lossy(word)))?;
    let parsed = if text.contains(['e', 'E']) {
        Decimal::from_scientific(text)
    } else {
        Decimal::from_str(text)
    };
    if let Ok(value) = parsed {
        return Ok(value);
    }

    let float: f64 = text
        .parse()
        .ok()
        .filter(|f: &f64| f.is_finite())
        .ok_or_else(|| format!("invalid number `{}`", text))?;
    let saturated = match Decimal::from_f64(float) {
        Some(value) => value,
        None if float.abs() < 1.0 => Decimal::ZERO,
        None if float < 0.0 => Decimal::MIN,
        None => Decimal::MAX,
    };
    log::warn!("Number {} is outside the decimal range, using {}", text, saturated);
    Ok(saturated)
}

fn parse_multiplex(word: &[u8]) -> StatementResult<Multiplex> {
    match word {
        b"M" => Ok(Multiplex::Multiplexor),
        [b'm', rest @ ..] => match rest.strip_suffix(b"M") {
            Some(digits) => Ok(Multiplex::ValueMultiplexor(parse_int(digits, "multiplexer value")?)),
            None => Ok(Multiplex::Value(parse_int(rest, "multiplexer value")?)),
        },
        _ => Err(format!("invalid multiplexer indicator `{}`", lossy(word))),
    }
}

fn parse_layout(word: &[u8]) -> StatementResult<(ByteOrder, ValueType)> {
    let (order, sign) = match word {
        [order, sign] => (*order, *sign),
        _ => return Err(format!("invalid byte order `{}`", lossy(word))),
    };
    let byte_order = match order {
        b'1' => ByteOrder::LittleEndian,
        b'0' => ByteOrder::BigEndian,
        _ => return Err(format!("invalid byte order `{}`", lossy(word))),
    };
    let value_type = match sign {
        b'+' => ValueType::Unsigned,
        b'-' => ValueType::Signed,
        _ => return Err(format!("invalid sign `{}`", lossy(word))),
    };
    Ok((byte_order, value_type))
}

fn parse_range(word: &[u8]) -> StatementResult<MuxRange> {
    let split = word
        .iter()
        .position(|&b| b == b'-')
        .ok_or_else(|| format!("invalid multiplexer range `{}`", lossy(word)))?;
    let lo = parse_int(&word[..split], "range start")?;
    let hi = parse_int(&word[split + 1..], "range end")?;
    Ok(MuxRange::new(lo, hi))
}

fn keyword_of<'a>(tokens: &[Token<'a>]) -> Option<&'a [u8]> {
    match tokens.first() {
        Some(Token::Word(w)) => Some(*w),
        _ => None,
    }
}

/// Scan state while reading one DBC stream
struct Parser {
    matrix: CanMatrix,
    ident: &'static Encoding,
    comment: &'static Encoding,
    /// Frame the following `SG_` lines belong to
    current_frame: Option<usize>,
    /// Inside the `NS_` symbol list
    in_namespace: bool,
    /// Line of the statement being applied
    line: usize,
    /// Line of each frame's `BO_` statement, by frame index
    frame_lines: Vec<usize>,
}

impl Parser {
    fn new(ident: &'static Encoding, comment: &'static Encoding) -> Self {
        Self {
            matrix: CanMatrix::new(),
            ident,
            comment,
            current_frame: None,
            in_namespace: false,
            line: 0,
            frame_lines: Vec::new(),
        }
    }

    fn ident_text(&self, bytes: &[u8]) -> String {
        self.ident.decode_without_bom_handling(bytes).0.into_owned()
    }

    fn comment_text(&self, bytes: &[u8]) -> String {
        self.comment.decode_without_bom_handling(bytes).0.into_owned()
    }

    fn statement(&mut self, statement: &Statement<'_>) {
        let tokens = match lexer::tokenize(&statement.text) {
            Ok(tokens) => tokens,
            Err(reason) => return self.reject(statement, reason),
        };
        let Some(keyword) = keyword_of(&tokens) else {
            return self.reject(statement, "statement does not start with a keyword".to_string());
        };

        if self.in_namespace {
            let bare_symbol = tokens.len() == 1
                && (is_keyword(keyword, KEYWORDS) || is_keyword(keyword, IGNORED_KEYWORDS));
            if statement.indented || bare_symbol {
                return;
            }
            self.in_namespace = false;
        }

        if keyword != b"SG_" {
            self.current_frame = None;
        }

        self.line = statement.line;
        let mut cursor = Cursor::new(&tokens[1..]);
        if let Err(reason) = self.dispatch(keyword, &mut cursor) {
            self.reject(statement, reason);
        }
    }

    fn dispatch(&mut self, keyword: &[u8], cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        match keyword {
            b"VERSION" => self.version(cur),
            b"NS_" => {
                self.in_namespace = true;
                Ok(())
            }
            b"BS_" => Ok(()),
            b"BU_" => self.nodes(cur),
            b"BO_" => self.frame(cur),
            b"SG_" => self.signal(cur),
            b"BO_TX_BU_" => self.transmitters(cur),
            b"CM_" => self.comment(cur),
            b"VAL_TABLE_" => self.value_table(cur),
            b"VAL_" => self.signal_values(cur),
            b"BA_DEF_" => self.define(cur),
            b"BA_DEF_DEF_" => self.define_default(cur),
            b"BA_" => self.attribute(cur),
            b"SIG_GROUP_" => self.signal_group(cur),
            b"SIG_VALTYPE_" => self.value_type(cur),
            b"SG_MUL_VAL_" => self.mux_ranges(cur),
            other if is_keyword(other, IGNORED_KEYWORDS) => {
                log::debug!("Skipping {} statement", lossy(other));
                Ok(())
            }
            other => Err(format!("unknown keyword `{}`", lossy(other))),
        }
    }

    fn reject(&mut self, statement: &Statement<'_>, reason: String) {
        log::warn!("Skipping DBC statement at line {}: {}", statement.line, reason);
        let text = self.ident_text(&statement.text);
        self.matrix.load_errors.push(LoadError {
            line: statement.line,
            statement: text,
            reason,
        });
    }

    fn frame_mut(&mut self, raw_id: u32) -> StatementResult<&mut Frame> {
        // ids keep their extended flag in-band until the scan is complete
        self.matrix
            .frames
            .iter_mut()
            .find(|f| f.arbitration_id.id == raw_id)
            .ok_or_else(|| format!("unknown frame id {}", raw_id))
    }

    fn signal_mut(&mut self, raw_id: u32, name: &str) -> StatementResult<&mut Signal> {
        self.frame_mut(raw_id)?
            .signal_by_name_mut(name)
            .ok_or_else(|| format!("unknown signal `{}` in frame {}", name, raw_id))
    }

    /// Comma or space separated node names, `Vector__XXX` dropped
    fn node_list(&self, cur: &mut Cursor<'_, '_>) -> StatementResult<Vec<String>> {
        let mut names = Vec::new();
        while let Some(token) = cur.next() {
            match token {
                Token::Word(w) => {
                    let name = self.ident_text(w);
                    if name != NO_NODE {
                        names.push(name);
                    }
                }
                Token::Punct(b',') => {}
                Token::Punct(b';') => break,
                other => return Err(format!("expected a node name, found {}", describe(Some(other)))),
            }
        }
        Ok(names)
    }

    /// `<int> "<label>"` pairs up to the end of the statement
    fn value_pairs(&self, cur: &mut Cursor<'_, '_>) -> StatementResult<ValueTable> {
        let mut table = ValueTable::new();
        loop {
            match cur.next() {
                Some(Token::Word(w)) => {
                    let key = parse_int::<i64>(w, "value")
                        .or_else(|_| parse_decimal(w).map(|d| d.trunc().to_i64().unwrap_or(0)))?;
                    let label = self.ident_text(cur.string("value label")?);
                    table.insert(key, label);
                }
                Some(Token::Punct(b';')) | None => break,
                other => return Err(format!("expected a value, found {}", describe(other))),
            }
        }
        Ok(table)
    }

    fn version(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        self.matrix.version = self.ident_text(cur.string("version string")?);
        Ok(())
    }

    fn nodes(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        cur.punct(b':')?;
        for name in self.node_list(cur)? {
            self.matrix.add_ecu(Ecu::new(name));
        }
        Ok(())
    }

    fn frame(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
        let name = self.ident_text(cur.word("frame name")?);
        cur.punct(b':')?;
        let size: usize = parse_int(cur.word("frame size")?, "frame size")?;

        let mut frame = Frame::new(name, ArbitrationId::standard(raw_id), size);
        if let Some(Token::Word(w)) = cur.next() {
            let transmitter = self.ident_text(w);
            if transmitter != NO_NODE {
                frame.add_transmitter(transmitter);
            }
        }

        self.matrix.add_frame(frame);
        self.frame_lines.push(self.line);
        self.current_frame = Some(self.matrix.frames.len() - 1);
        Ok(())
    }

    fn signal(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let frame_idx = self
            .current_frame
            .ok_or_else(|| "signal outside of a frame block".to_string())?;

        let name = self.ident_text(cur.word("signal name")?);
        let multiplex = match cur.peek() {
            Some(Token::Word(w)) => {
                cur.next();
                Some(parse_multiplex(w)?)
            }
            _ => None,
        };
        cur.punct(b':')?;
        let wire_start: u32 = parse_int(cur.word("start bit")?, "start bit")?;
        cur.punct(b'|')?;
        let size: u32 = parse_int(cur.word("signal size")?, "signal size")?;
        cur.punct(b'@')?;
        let (byte_order, value_type) = parse_layout(cur.word("byte order")?)?;
        cur.punct(b'(')?;
        let factor = parse_decimal(cur.word("factor")?)?;
        cur.punct(b',')?;
        let offset = parse_decimal(cur.word("offset")?)?;
        cur.punct(b')')?;
        cur.punct(b'[')?;
        let min = parse_decimal(cur.word("minimum")?)?;
        cur.punct(b'|')?;
        let max = parse_decimal(cur.word("maximum")?)?;
        cur.punct(b']')?;
        let unit = self.ident_text(cur.string("unit")?);
        let receivers = self.node_list(cur)?;

        if size == 0 {
            return Err("signal size is zero".to_string());
        }
        let start_bit = bit_layout::from_msb(wire_start, size, byte_order)
            .ok_or_else(|| format!("start bit {} is out of range", wire_start))?;

        let mut signal = Signal::new(name, start_bit, size)
            .with_byte_order(byte_order)
            .with_value_type(value_type)
            .with_scaling(factor, offset)
            .with_unit(unit);
        if !(min.is_zero() && max.is_zero()) {
            signal = signal.with_range(min, max);
        }
        if let Some(multiplex) = multiplex {
            signal = signal.with_multiplex(multiplex);
        }
        for receiver in receivers {
            signal.add_receiver(receiver);
        }
        if !signal.fits_in(MAX_PAYLOAD) {
            return Err(format!(
                "signal `{}` ({}|{}) does not fit in a {} byte payload",
                signal.name, wire_start, size, MAX_PAYLOAD
            ));
        }

        self.matrix.frames[frame_idx].add_signal(signal);
        Ok(())
    }

    fn transmitters(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
        cur.punct(b':')?;
        let names = self.node_list(cur)?;
        let frame = self.frame_mut(raw_id)?;
        for name in names {
            frame.add_transmitter(name);
        }
        Ok(())
    }

    fn comment(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let target = match cur.next() {
            Some(Token::Str(text)) => {
                self.matrix.comment = Some(self.comment_text(text));
                return Ok(());
            }
            Some(Token::Word(w)) => *w,
            other => return Err(format!("expected a comment target, found {}", describe(other))),
        };

        match target {
            b"BO_" => {
                let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
                let text = self.comment_text(cur.string("comment")?);
                self.frame_mut(raw_id)?.comment = Some(text);
            }
            b"SG_" => {
                let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
                let name = self.ident_text(cur.word("signal name")?);
                let text = self.comment_text(cur.string("comment")?);
                self.signal_mut(raw_id, &name)?.comment = Some(text);
            }
            b"BU_" => {
                let name = self.ident_text(cur.word("node name")?);
                let text = self.comment_text(cur.string("comment")?);
                self.matrix
                    .ecu_by_name_mut(&name)
                    .ok_or_else(|| format!("unknown node `{}`", name))?
                    .comment = Some(text);
            }
            b"EV_" => log::debug!("Skipping environment variable comment"),
            other => return Err(format!("unknown comment target `{}`", lossy(other))),
        }
        Ok(())
    }

    fn value_table(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let name = self.ident_text(cur.word("value table name")?);
        let table = self.value_pairs(cur)?;
        self.matrix.add_value_table(name, table);
        Ok(())
    }

    fn signal_values(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let first = cur.word("frame id")?;
        let Ok(raw_id) = parse_int::<u32>(first, "frame id") else {
            log::debug!("Skipping value table of environment variable {}", lossy(first));
            return Ok(());
        };
        let name = self.ident_text(cur.word("signal name")?);
        let table = self.value_pairs(cur)?;
        self.signal_mut(raw_id, &name)?.values.extend(table);
        Ok(())
    }

    fn define(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let scope = match cur.peek() {
            Some(Token::Word(w)) => {
                let scope = match *w {
                    b"BO_" => AttributeScope::Frame,
                    b"SG_" => AttributeScope::Signal,
                    b"BU_" => AttributeScope::Ecu,
                    b"EV_" => {
                        log::debug!("Skipping environment variable attribute definition");
                        return Ok(());
                    }
                    other => return Err(format!("unknown attribute scope `{}`", lossy(other))),
                };
                cur.next();
                scope
            }
            _ => AttributeScope::Global,
        };

        let name = self.ident_text(cur.string("attribute name")?);
        let kind = match cur.word("attribute type")? {
            b"INT" => DefineType::Int {
                min: self.optional_int(cur)?,
                max: self.optional_int(cur)?,
            },
            b"HEX" => DefineType::Hex {
                min: self.optional_int(cur)?,
                max: self.optional_int(cur)?,
            },
            b"FLOAT" => DefineType::Float {
                min: parse_decimal(cur.word("minimum")?)?,
                max: parse_decimal(cur.word("maximum")?)?,
            },
            b"STRING" => DefineType::String,
            b"ENUM" => {
                let mut labels = Vec::new();
                while let Some(token) = cur.next() {
                    match token {
                        Token::Str(s) => labels.push(self.ident_text(s)),
                        Token::Punct(b',') => {}
                        Token::Punct(b';') => break,
                        other => {
                            return Err(format!("expected an enum label, found {}", describe(Some(other))))
                        }
                    }
                }
                DefineType::Enum(labels)
            }
            other => return Err(format!("unknown attribute type `{}`", lossy(other))),
        };

        self.matrix.add_define(scope, name, Define::new(kind));
        Ok(())
    }

    fn optional_int(&self, cur: &mut Cursor<'_, '_>) -> StatementResult<i64> {
        match cur.peek() {
            Some(Token::Word(w)) => {
                cur.next();
                parse_int::<i64>(w, "integer")
                    .or_else(|_| parse_decimal(w).map(|d| d.trunc().to_i64().unwrap_or(0)))
            }
            _ => Ok(0),
        }
    }

    /// Convert a value token according to the declared type, if known
    fn attribute_value(
        &self,
        token: Option<&Token<'_>>,
        kind: Option<&DefineType>,
    ) -> StatementResult<AttributeValue> {
        let textual = matches!(kind, Some(DefineType::String) | Some(DefineType::Enum(_)));
        match token {
            Some(Token::Str(s)) => {
                let text = self.ident_text(s);
                let number = if textual || kind.is_none() {
                    None
                } else {
                    parse_decimal(text.trim().as_bytes()).ok()
                };
                Ok(number.map_or(AttributeValue::Text(text), AttributeValue::Number))
            }
            Some(Token::Word(w)) if textual && !matches!(kind, Some(DefineType::Enum(_))) => {
                Ok(AttributeValue::Text(self.ident_text(w)))
            }
            Some(Token::Word(w)) => Ok(parse_decimal(w)
                .map(AttributeValue::Number)
                .unwrap_or_else(|_| AttributeValue::Text(self.ident_text(w)))),
            other => Err(format!("expected an attribute value, found {}", describe(other))),
        }
    }

    fn define_default(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let name = self.ident_text(cur.string("attribute name")?);
        let token = cur.next();

        let scopes: Vec<AttributeScope> = AttributeScope::ALL
            .into_iter()
            .filter(|scope| self.matrix.defines(*scope).contains_key(&name))
            .collect();
        if scopes.is_empty() {
            return Err(format!("default for undeclared attribute `{}`", name));
        }

        for scope in scopes {
            let kind = self.matrix.defines(scope).get(&name).map(|d| d.kind.clone());
            let value = self.attribute_value(token, kind.as_ref())?;
            if let Some(define) = self.matrix.defines_mut(scope).get_mut(&name) {
                define.default = Some(value);
            }
        }
        Ok(())
    }

    fn attribute(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let name = self.ident_text(cur.string("attribute name")?);
        let target = match cur.peek() {
            Some(Token::Word(w)) if matches!(*w, b"BO_" | b"SG_" | b"BU_" | b"EV_") => {
                cur.next();
                Some(*w)
            }
            _ => None,
        };

        match target {
            None => {
                let value = self.attribute_value(cur.next(), self.kind(AttributeScope::Global, &name))?;
                self.matrix.add_attribute(name, value);
            }
            Some(b"BO_") => {
                let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
                let value = self.attribute_value(cur.next(), self.kind(AttributeScope::Frame, &name))?;
                self.frame_mut(raw_id)?.add_attribute(name, value);
            }
            Some(b"SG_") => {
                let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
                let signal = self.ident_text(cur.word("signal name")?);
                let value = self.attribute_value(cur.next(), self.kind(AttributeScope::Signal, &name))?;
                self.signal_mut(raw_id, &signal)?.add_attribute(name, value);
            }
            Some(b"BU_") => {
                let node = self.ident_text(cur.word("node name")?);
                let value = self.attribute_value(cur.next(), self.kind(AttributeScope::Ecu, &name))?;
                self.matrix
                    .ecu_by_name_mut(&node)
                    .ok_or_else(|| format!("unknown node `{}`", node))?
                    .add_attribute(name, value);
            }
            Some(_) => log::debug!("Skipping environment variable attribute {}", name),
        }
        Ok(())
    }

    fn kind(&self, scope: AttributeScope, name: &str) -> Option<&DefineType> {
        self.matrix.defines(scope).get(name).map(|d| &d.kind)
    }

    fn signal_group(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
        let name = self.ident_text(cur.word("group name")?);
        let id: u32 = parse_int(cur.word("group repetitions")?, "group repetitions")?;
        cur.punct(b':')?;
        let members = self.node_list(cur)?;
        let members: Vec<&str> = members.iter().map(String::as_str).collect();
        self.frame_mut(raw_id)?
            .add_signal_group(name, id, &members)
            .map_err(|e| e.to_string())
    }

    fn value_type(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
        let name = self.ident_text(cur.word("signal name")?);
        cur.eat(b':');
        let kind: u8 = parse_int(cur.word("value type")?, "value type")?;
        let signal = self.signal_mut(raw_id, &name)?;
        let expected = match kind {
            0 => return Ok(()),
            1 => 32,
            2 => 64,
            other => return Err(format!("unknown value type {}", other)),
        };
        if signal.size != expected {
            return Err(format!(
                "float signal `{}` is {} bits, expected {}",
                name, signal.size, expected
            ));
        }
        signal.value_type = ValueType::Float;
        Ok(())
    }

    fn mux_ranges(&mut self, cur: &mut Cursor<'_, '_>) -> StatementResult<()> {
        let raw_id: u32 = parse_int(cur.word("frame id")?, "frame id")?;
        let name = self.ident_text(cur.word("signal name")?);
        let selector = self.ident_text(cur.word("selector name")?);

        let mut ranges = Vec::new();
        while let Some(token) = cur.next() {
            match token {
                Token::Word(w) => ranges.push(parse_range(w)?),
                Token::Punct(b',') => {}
                Token::Punct(b';') => break,
                other => return Err(format!("expected a range, found {}", describe(Some(other)))),
            }
        }

        let signal = self.signal_mut(raw_id, &name)?;
        signal.muxer_for_signal = Some(selector);
        signal.mux_ranges.extend(ranges);
        Ok(())
    }

    /// Post-scan fix-ups, in order
    fn finish(mut self) -> CanMatrix {
        resolve_enum_labels(&mut self.matrix);
        apply_start_values(&mut self.matrix);
        self.matrix.update_receivers();

        for (idx, frame) in self.matrix.frames.iter_mut().enumerate() {
            let multiplexors = frame
                .signals
                .iter()
                .filter(|s| s.multiplex == Some(Multiplex::Multiplexor))
                .count();
            let has_ranges = frame.signals.iter().any(|s| !s.mux_ranges.is_empty());
            if multiplexors > 1 && !has_ranges {
                let reason = format!(
                    "frame `{}` has {} multiplexors but no SG_MUL_VAL_ ranges",
                    frame.name, multiplexors
                );
                log::warn!("{}", reason);
                self.matrix.load_errors.push(LoadError {
                    line: self.frame_lines.get(idx).copied().unwrap_or(0),
                    statement: format!("BO_ {} {}", frame.arbitration_id.id, frame.name),
                    reason,
                });
            }
            frame.is_complex_multiplexed = multiplexors > 1 || has_ranges;
            frame.arbitration_id = ArbitrationId::from_compound(frame.arbitration_id.id);
        }

        self.matrix
    }
}

/// Replace ENUM attribute values given as indices by their labels
fn resolve_enum_labels(matrix: &mut CanMatrix) {
    let CanMatrix {
        frames,
        ecus,
        attributes,
        global_defines,
        frame_defines,
        signal_defines,
        ecu_defines,
        ..
    } = matrix;

    enum_labels(attributes, global_defines);
    for frame in frames.iter_mut() {
        enum_labels(&mut frame.attributes, frame_defines);
        for signal in &mut frame.signals {
            enum_labels(&mut signal.attributes, signal_defines);
        }
    }
    for ecu in ecus.iter_mut() {
        enum_labels(&mut ecu.attributes, ecu_defines);
    }

    for defines in [global_defines, frame_defines, signal_defines, ecu_defines] {
        for define in defines.values_mut() {
            let label = match &define.default {
                Some(value) => enum_label(define, value),
                None => None,
            };
            if let Some(label) = label {
                define.default = Some(AttributeValue::Text(label));
            }
        }
    }
}

fn enum_label(define: &Define, value: &AttributeValue) -> Option<String> {
    let AttributeValue::Number(index) = value else {
        return None;
    };
    if !matches!(define.kind, DefineType::Enum(_)) {
        return None;
    }
    let label = Some(index)
        .filter(|i| i.fract().is_zero())
        .and_then(|i| i.to_usize())
        .and_then(|i| define.enum_label(i));
    if label.is_none() {
        log::warn!("Enum index {} is out of range", index);
    }
    label.map(str::to_string)
}

fn enum_labels(attributes: &mut Attributes, defines: &Defines) {
    for (name, value) in attributes.iter_mut() {
        let label = defines.get(name).and_then(|define| enum_label(define, value));
        if let Some(label) = label {
            *value = AttributeValue::Text(label);
        }
    }
}

/// Derive physical initial values from raw `GenSigStartValue` attributes
fn apply_start_values(matrix: &mut CanMatrix) {
    for signal in matrix.frames.iter_mut().flat_map(|f| f.signals.iter_mut()) {
        let Some(raw) = signal
            .attributes
            .get(GEN_SIG_START_VALUE)
            .and_then(AttributeValue::as_decimal)
        else {
            continue;
        };
        match raw
            .checked_mul(signal.factor)
            .and_then(|v| v.checked_add(signal.offset))
        {
            Some(phys) => signal.initial_value = Some(phys),
            None => log::warn!("Start value of signal {} overflows", signal.name),
        }
    }
}

/// Parse a complete DBC byte stream
pub(crate) fn parse(data: &[u8], options: &LoadOptions) -> Result<CanMatrix> {
    let (ident, comment) = options.encodings()?;
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let statements = lexer::split_statements(data);

    if let Some(first) = statements.first() {
        let recognized = lexer::tokenize(&first.text)
            .ok()
            .and_then(|tokens| keyword_of(&tokens))
            .map_or(false, |k| is_keyword(k, KEYWORDS) || is_keyword(k, IGNORED_KEYWORDS));
        if !recognized {
            let head: String = String::from_utf8_lossy(&first.text).chars().take(40).collect();
            return Err(CanMatrixError::UnrecognizedHeader(head));
        }
    }

    let mut parser = Parser::new(ident, comment);
    for statement in &statements {
        parser.statement(statement);
    }
    let matrix = parser.finish();

    log::info!(
        "Loaded DBC: {} frames, {} signals, {} ECUs ({} statements skipped)",
        matrix.frames.len(),
        matrix.signal_count(),
        matrix.ecus.len(),
        matrix.load_errors.len()
    );
    Ok(matrix)
}

//! Frame Codec Engine
//!
//! Converts between raw and physical signal values and packs/extracts signals
//! in frame payloads. Handles bit placement, endianness, sign extension,
//! multiplexing and value tables.

use crate::bit_layout;
use crate::model::{ByteOrder, Frame, Multiplex, Signal, ValueType};
use crate::types::{CanMatrixError, DecodedSignal, PhysValue, RawValue, Result, SignalValue};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

impl Signal {
    /// Convert a raw value to its physical value (`raw * factor + offset`)
    pub fn raw_to_phys(&self, raw: RawValue) -> Result<Decimal> {
        let raw = match raw {
            RawValue::Unsigned(v) => Decimal::from(v),
            RawValue::Signed(v) => Decimal::from(v),
            RawValue::Float(v) => Decimal::from_f64(v).ok_or_else(|| self.overflow())?,
        };
        raw.checked_mul(self.factor)
            .and_then(|v| v.checked_add(self.offset))
            .ok_or_else(|| self.overflow())
    }

    /// Convert a raw value, labelling it when the value table knows it
    pub fn raw_to_phys_named(&self, raw: RawValue) -> Result<PhysValue> {
        let phys = self.raw_to_phys(raw)?;
        Ok(match self.label_for(raw) {
            Some(name) => PhysValue::Named {
                raw,
                phys,
                name: name.to_string(),
            },
            None => PhysValue::Number(phys),
        })
    }

    /// Convert a physical value or label to the raw value to transmit
    ///
    /// Without a value the initial value is used, or raw 0 if there is none.
    /// Integer raws are rounded half-to-even and must fit the bit width and
    /// the explicit `min`/`max` range, if any.
    pub fn phys_to_raw(&self, value: Option<&SignalValue>) -> Result<RawValue> {
        match value {
            Some(SignalValue::Named(name)) => {
                let key = self
                    .values
                    .iter()
                    .find(|(_, label)| *label == name)
                    .map(|(key, _)| *key)
                    .ok_or_else(|| CanMatrixError::UnknownNamedValue {
                        signal: self.name.clone(),
                        name: name.clone(),
                    })?;
                if self.value_type == ValueType::Float {
                    return Ok(RawValue::Float(key as f64));
                }
                self.checked_raw(i128::from(key), self.raw_bounds())
            }
            Some(SignalValue::Physical(phys)) => self.raw_from_phys(*phys),
            None => match self.initial_value {
                Some(initial) => self.raw_from_phys(initial),
                None if self.value_type == ValueType::Float => Ok(RawValue::Float(0.0)),
                None => self.checked_raw(0, self.raw_bounds()),
            },
        }
    }

    /// Label of a raw value in the value table
    pub fn label_for(&self, raw: RawValue) -> Option<&str> {
        raw.as_table_key()
            .and_then(|key| self.values.get(&key))
            .map(String::as_str)
    }

    fn raw_from_phys(&self, phys: Decimal) -> Result<RawValue> {
        let scaled = phys
            .checked_sub(self.offset)
            .and_then(|v| v.checked_div(self.factor))
            .ok_or_else(|| self.overflow())?;

        if self.value_type == ValueType::Float {
            let raw = scaled.to_f64().ok_or_else(|| self.overflow())?;
            return Ok(RawValue::Float(raw));
        }

        let raw = scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i128()
            .ok_or_else(|| self.overflow())?;
        self.checked_raw(raw, self.governing_bounds())
    }

    /// Raw bounds of the bit width, narrowed by an explicit physical range
    fn governing_bounds(&self) -> (i128, i128) {
        let (lo, hi) = self.raw_bounds();
        let (min, max) = match (self.min, self.max) {
            (Some(min), Some(max)) if min <= max => (min, max),
            _ => return (lo, hi),
        };
        let to_raw = |phys: Decimal| {
            phys.checked_sub(self.offset)
                .and_then(|v| v.checked_div(self.factor))
        };
        let (Some(a), Some(b)) = (to_raw(min), to_raw(max)) else {
            return (lo, hi);
        };
        let (first, last) = if a <= b { (a, b) } else { (b, a) };
        match (first.ceil().to_i128(), last.floor().to_i128()) {
            (Some(range_lo), Some(range_hi)) => (lo.max(range_lo), hi.min(range_hi)),
            _ => (lo, hi),
        }
    }

    fn checked_raw(&self, raw: i128, (lo, hi): (i128, i128)) -> Result<RawValue> {
        if raw < lo || raw > hi {
            return Err(CanMatrixError::RawOutOfRange {
                signal: self.name.clone(),
                raw: raw.to_string(),
                min: lo.to_string(),
                max: hi.to_string(),
            });
        }
        Ok(match self.value_type {
            ValueType::Signed => RawValue::Signed(raw as i64),
            ValueType::Unsigned => RawValue::Unsigned(raw as u64),
            ValueType::Float => RawValue::Float(raw as f64),
        })
    }

    fn overflow(&self) -> CanMatrixError {
        CanMatrixError::ArithmeticOverflow {
            signal: self.name.clone(),
        }
    }
}

/// Frame codec - packs and extracts signals of one frame
pub struct FrameCodec;

impl FrameCodec {
    /// Encode physical values into a zero-filled payload of `frame.size` bytes
    ///
    /// Only signals whose multiplex condition holds are packed. Frame signals
    /// missing from `values` take their default; a name in `values` that the
    /// frame does not define fails the whole call.
    pub fn encode(frame: &Frame, values: &HashMap<String, SignalValue>) -> Result<Vec<u8>> {
        if let Some(unknown) = values.keys().find(|name| frame.signal_index(name).is_none()) {
            return Err(CanMatrixError::UnknownSignal {
                frame: frame.name.clone(),
                signal: unknown.clone(),
            });
        }

        let mut raws: Vec<Option<RawValue>> = vec![None; frame.signals.len()];
        let active = {
            let mut raw_of = |idx: usize| -> Result<RawValue> {
                if let Some(raw) = raws[idx] {
                    return Ok(raw);
                }
                let signal = &frame.signals[idx];
                let raw = signal.phys_to_raw(values.get(&signal.name))?;
                raws[idx] = Some(raw);
                Ok(raw)
            };
            Self::resolve_active(frame, &mut raw_of)?
        };

        let mut data = vec![0u8; frame.size];
        for (idx, signal) in frame.signals.iter().enumerate() {
            if !active[idx] {
                if values.contains_key(&signal.name) {
                    log::debug!(
                        "Signal '{}' is not selected in frame '{}', value ignored",
                        signal.name,
                        frame.name
                    );
                }
                continue;
            }
            let raw = match raws[idx] {
                Some(raw) => raw,
                None => signal.phys_to_raw(values.get(&signal.name))?,
            };
            Self::check_layout(frame, signal, data.len())?;
            Self::insert_raw(&mut data, signal, raw);
        }

        Ok(data)
    }

    /// Decode a payload of exactly `frame.size` bytes
    ///
    /// The result holds every non-multiplexed signal and every multiplexed
    /// signal whose condition matches; other signals are absent. A value
    /// that cannot be scaled never fails the frame, see [`DecodedSignal::phys`].
    pub fn decode(frame: &Frame, data: &[u8]) -> Result<HashMap<String, DecodedSignal>> {
        if data.len() != frame.size {
            return Err(CanMatrixError::DecodingFrameLength {
                frame: frame.name.clone(),
                expected: frame.size,
                actual: data.len(),
            });
        }

        let mut raws: Vec<Option<RawValue>> = vec![None; frame.signals.len()];
        let active = {
            let mut raw_of = |idx: usize| -> Result<RawValue> {
                if let Some(raw) = raws[idx] {
                    return Ok(raw);
                }
                let raw = Self::extract_raw(frame, &frame.signals[idx], data)?;
                raws[idx] = Some(raw);
                Ok(raw)
            };
            Self::resolve_active(frame, &mut raw_of)?
        };

        let mut decoded = HashMap::new();
        for (idx, signal) in frame.signals.iter().enumerate() {
            if !active[idx] || decoded.contains_key(&signal.name) {
                continue;
            }
            let raw = match raws[idx] {
                Some(raw) => raw,
                None => Self::extract_raw(frame, signal, data)?,
            };
            let phys = match signal.raw_to_phys(raw) {
                Ok(phys) => phys,
                Err(_) => Self::saturated_phys(signal, raw),
            };
            decoded.insert(
                signal.name.clone(),
                DecodedSignal {
                    raw,
                    phys,
                    named: signal.label_for(raw).map(str::to_string),
                },
            );
        }

        Ok(decoded)
    }

    /// Physical value for a raw that does not scale into a `Decimal`
    ///
    /// NaN maps to zero and magnitudes beyond the decimal range to its
    /// bounds. The raw value itself is still reported unchanged.
    fn saturated_phys(signal: &Signal, raw: RawValue) -> Decimal {
        let raw_f64 = match raw {
            RawValue::Unsigned(v) => v as f64,
            RawValue::Signed(v) => v as f64,
            RawValue::Float(v) => v,
        };
        let phys = raw_f64 * signal.factor.to_f64().unwrap_or(1.0)
            + signal.offset.to_f64().unwrap_or(0.0);
        let saturated = if phys.is_nan() {
            Decimal::ZERO
        } else if let Some(value) = Decimal::from_f64(phys) {
            value
        } else if phys.abs() < 1.0 {
            Decimal::ZERO
        } else if phys < 0.0 {
            Decimal::MIN
        } else {
            Decimal::MAX
        };
        log::warn!(
            "Signal '{}' value {} is outside the decimal range, using {}",
            signal.name,
            phys,
            saturated
        );
        saturated
    }

    /// Decide which signals are present for the current selector values
    ///
    /// A multiplexed signal is present when its selector is present and the
    /// selector's raw value satisfies the signal's condition. The selector
    /// is `muxer_for_signal` when named, otherwise the frame's top-level
    /// multiplexor.
    fn resolve_active<F>(frame: &Frame, raw_of: &mut F) -> Result<Vec<bool>>
    where
        F: FnMut(usize) -> Result<RawValue>,
    {
        let mut state: Vec<Option<bool>> = vec![None; frame.signals.len()];
        for idx in 0..frame.signals.len() {
            Self::is_active(frame, idx, &mut state, raw_of, 0)?;
        }
        Ok(state.into_iter().map(|s| s.unwrap_or(false)).collect())
    }

    fn is_active<F>(
        frame: &Frame,
        idx: usize,
        state: &mut [Option<bool>],
        raw_of: &mut F,
        depth: usize,
    ) -> Result<bool>
    where
        F: FnMut(usize) -> Result<RawValue>,
    {
        if let Some(active) = state[idx] {
            return Ok(active);
        }
        let signal = &frame.signals[idx];

        let active = if !signal.is_multiplexed() {
            true
        } else if depth > frame.signals.len() {
            log::warn!("Selector cycle at signal '{}' in frame '{}'", signal.name, frame.name);
            false
        } else {
            match Self::selector_index(frame, signal, idx) {
                Some(selector) => {
                    if Self::is_active(frame, selector, state, raw_of, depth + 1)? {
                        raw_of(selector)?
                            .as_selector()
                            .map_or(false, |value| signal.value_in_range(value))
                    } else {
                        false
                    }
                }
                None => {
                    log::warn!(
                        "Multiplexed signal '{}' has no selector in frame '{}'",
                        signal.name,
                        frame.name
                    );
                    false
                }
            }
        };

        state[idx] = Some(active);
        Ok(active)
    }

    fn selector_index(frame: &Frame, signal: &Signal, idx: usize) -> Option<usize> {
        let selector = match &signal.muxer_for_signal {
            Some(name) => frame.signal_index(name),
            None => frame
                .signals
                .iter()
                .position(|s| s.multiplex == Some(Multiplex::Multiplexor)),
        }?;
        (selector != idx).then_some(selector)
    }

    fn check_layout(frame: &Frame, signal: &Signal, len: usize) -> Result<()> {
        let invalid = |reason: &str| CanMatrixError::InvalidSignalLayout {
            signal: signal.name.clone(),
            reason: reason.to_string(),
        };
        if signal.size == 0 || signal.size > 64 {
            return Err(invalid("size must be between 1 and 64 bits"));
        }
        if signal.value_type == ValueType::Float && signal.size != 32 && signal.size != 64 {
            return Err(invalid("float signals must be 32 or 64 bits"));
        }
        if !signal.fits_in(len) {
            return Err(CanMatrixError::SignalOutOfBounds {
                frame: frame.name.clone(),
                signal: signal.name.clone(),
            });
        }
        Ok(())
    }

    /// Extract one signal's raw value from a payload
    fn extract_raw(frame: &Frame, signal: &Signal, data: &[u8]) -> Result<RawValue> {
        Self::check_layout(frame, signal, data.len())?;
        let size = signal.size as usize;

        let bits = match signal.byte_order {
            ByteOrder::LittleEndian => {
                Self::extract_little_endian(data, signal.start_bit as usize, size)
            }
            ByteOrder::BigEndian => {
                Self::extract_big_endian(data, Self::msb_first_start(signal) as usize, size)
            }
        };

        Ok(match signal.value_type {
            ValueType::Unsigned => RawValue::Unsigned(bits),
            ValueType::Signed => RawValue::Signed(Self::sign_extend(bits, size)),
            ValueType::Float if size == 32 => RawValue::Float(f32::from_bits(bits as u32) as f64),
            ValueType::Float => RawValue::Float(f64::from_bits(bits)),
        })
    }

    /// Pack one signal's raw value into a payload (layout already checked)
    fn insert_raw(data: &mut [u8], signal: &Signal, raw: RawValue) {
        let size = signal.size as usize;
        let bits = match raw {
            RawValue::Unsigned(v) => v & Self::mask(size),
            RawValue::Signed(v) => (v as u64) & Self::mask(size),
            RawValue::Float(v) if size == 32 => (v as f32).to_bits() as u64,
            RawValue::Float(v) => v.to_bits(),
        };

        match signal.byte_order {
            ByteOrder::LittleEndian => {
                Self::insert_little_endian(data, signal.start_bit as usize, size, bits)
            }
            ByteOrder::BigEndian => {
                Self::insert_big_endian(data, Self::msb_first_start(signal) as usize, size, bits)
            }
        }
    }

    /// MSB-first sequential index of a big-endian signal's most significant bit
    fn msb_first_start(signal: &Signal) -> u32 {
        bit_layout::msb_first_index(signal.start_bit).saturating_sub(signal.size - 1)
    }

    fn mask(size: usize) -> u64 {
        if size >= 64 {
            u64::MAX
        } else {
            (1u64 << size) - 1
        }
    }

    /// Extract bits LSB-first through increasing byte index
    ///
    /// Little-endian format:
    /// - Start bit points to the LSB (least significant bit)
    /// - Bits are numbered from LSB to MSB within each byte
    fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = bit_pos % 8;

            if byte_idx < data.len() {
                let bit_value = (data[byte_idx] >> bit_in_byte) & 0x01;
                result |= (bit_value as u64) << i;
            }
        }

        result
    }

    /// Extract bits MSB-first through increasing byte index
    ///
    /// Big-endian format:
    /// - `start_bit` is the MSB in MSB-first numbering (bit 0 = MSB of byte 0)
    /// - The signal grows towards higher MSB-first indices
    fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
        let mut result: u64 = 0;

        for i in 0..length {
            let bit_pos = start_bit + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = 7 - (bit_pos % 8);

            if byte_idx < data.len() {
                let bit_value = (data[byte_idx] >> bit_in_byte) & 0x01;
                result |= (bit_value as u64) << (length - 1 - i);
            }
        }

        result
    }

    fn insert_little_endian(data: &mut [u8], start_bit: usize, length: usize, value: u64) {
        for i in 0..length {
            let bit_pos = start_bit + i;
            Self::write_bit(data, bit_pos / 8, bit_pos % 8, (value >> i) & 0x01 != 0);
        }
    }

    fn insert_big_endian(data: &mut [u8], start_bit: usize, length: usize, value: u64) {
        for i in 0..length {
            let bit_pos = start_bit + i;
            let bit = (value >> (length - 1 - i)) & 0x01 != 0;
            Self::write_bit(data, bit_pos / 8, 7 - (bit_pos % 8), bit);
        }
    }

    fn write_bit(data: &mut [u8], byte_idx: usize, bit_in_byte: usize, set: bool) {
        if let Some(byte) = data.get_mut(byte_idx) {
            if set {
                *byte |= 1 << bit_in_byte;
            } else {
                *byte &= !(1 << bit_in_byte);
            }
        }
    }

    /// Sign-extend a value from N bits to 64 bits
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}

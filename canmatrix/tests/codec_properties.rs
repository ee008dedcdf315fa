// Codec and bit layout properties over whole parameter ranges
use canmatrix::bit_layout::{from_msb, to_msb};
use canmatrix::{
    ArbitrationId, ByteOrder, Frame, Multiplex, RawValue, Signal, SignalValue, ValueType,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

fn raws_for(signal: &Signal) -> Vec<i128> {
    let (lo, hi) = signal.raw_bounds();
    let mut raws = vec![lo, hi, lo + 1, hi - 1, (lo + hi) / 2];
    if lo < 0 {
        raws.extend([-1, 0, 1]);
    }
    raws.retain(|r| (lo..=hi).contains(r));
    raws
}

fn raw_value(signal: &Signal, raw: i128) -> RawValue {
    match signal.value_type {
        ValueType::Signed => RawValue::Signed(raw as i64),
        _ => RawValue::Unsigned(raw as u64),
    }
}

#[test]
fn test_raw_phys_raw_identity() {
    let scalings = [
        (Decimal::ONE, Decimal::ZERO),
        (Decimal::new(5, 1), Decimal::from(-40)),
        (Decimal::new(1, 2), Decimal::new(25, 1)),
        (Decimal::from(-2), Decimal::from(100)),
    ];
    for size in 1..=64 {
        for value_type in [ValueType::Unsigned, ValueType::Signed] {
            for (factor, offset) in scalings {
                let signal = Signal::new("S", 0, size)
                    .with_value_type(value_type)
                    .with_scaling(factor, offset);
                for raw in raws_for(&signal) {
                    let raw = raw_value(&signal, raw);
                    let phys = signal.raw_to_phys(raw).unwrap();
                    let back = signal
                        .phys_to_raw(Some(&SignalValue::Physical(phys)))
                        .unwrap();
                    assert_eq!(back, raw, "size {} {:?} factor {}", size, value_type, factor);
                }
            }
        }
    }
}

#[test]
fn test_msb_round_trip() {
    for size in 1..=64u32 {
        for start in 0..64u32 {
            let msb = to_msb(start, size, ByteOrder::LittleEndian).unwrap();
            assert_eq!(from_msb(msb, size, ByteOrder::LittleEndian), Some(start));
            if let Some(msb) = to_msb(start, size, ByteOrder::BigEndian) {
                assert_eq!(from_msb(msb, size, ByteOrder::BigEndian), Some(start), "start {} size {}", start, size);
            }
        }
    }
}

#[test]
fn test_payload_round_trip_every_position() {
    for byte_order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
        for size in [1u32, 3, 8, 12, 16, 31, 33] {
            for start in 0..64u32 {
                let signal = Signal::new("S", start, size)
                    .with_byte_order(byte_order)
                    .with_value_type(ValueType::Signed);
                let frame = Frame::new("F", ArbitrationId::standard(1), 8).with_signal(signal);
                if !frame.signals[0].fits_in(8) {
                    continue;
                }
                let (_, hi) = frame.signals[0].raw_bounds();
                let values = HashMap::from([("S".to_string(), SignalValue::from(hi as i64))]);
                let payload = frame.encode(&values).unwrap();
                let decoded = frame.decode(&payload).unwrap();
                assert_eq!(
                    decoded["S"].raw,
                    RawValue::Signed(hi as i64),
                    "{:?} start {} size {}",
                    byte_order,
                    start,
                    size
                );
            }
        }
    }
}

#[test]
fn test_selector_changes_only_multiplexed_subset() {
    let frame = Frame::new("Mux", ArbitrationId::standard(0x200), 8)
        .with_signal(Signal::new("Counter", 56, 8))
        .with_signal(Signal::new("Page", 0, 4).with_multiplex(Multiplex::Multiplexor))
        .with_signal(Signal::new("A", 8, 8).with_multiplex(Multiplex::Value(0)))
        .with_signal(Signal::new("B", 8, 8).with_multiplex(Multiplex::Value(1)))
        .with_signal(Signal::new("C", 16, 8).with_multiplex(Multiplex::Value(1)));

    let mut payload = vec![0u8; 8];
    let mut previous: Option<Vec<String>> = None;
    for page in 0..4u8 {
        payload[0] = page;
        let mut names: Vec<String> = frame.decode(&payload).unwrap().into_keys().collect();
        names.sort();
        assert!(names.contains(&"Counter".to_string()));
        assert!(names.contains(&"Page".to_string()));

        let multiplexed: Vec<String> = names
            .into_iter()
            .filter(|n| n != "Counter" && n != "Page")
            .collect();
        let expected: Vec<&str> = match page {
            0 => vec!["A"],
            1 => vec!["B", "C"],
            _ => vec![],
        };
        assert_eq!(multiplexed, expected);
        if let Some(previous) = previous {
            assert!(page > 2 || previous != multiplexed);
        }
        previous = Some(multiplexed);
    }
}

// DBC load/dump integration tests
use canmatrix::bit_layout;
use canmatrix::formats::{self, dbc};
use canmatrix::{
    ArbitrationId, ByteOrder, CanMatrix, CanMatrixError, DumpOptions, LoadOptions, SignalValue,
    ValueType,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

const BODY_DBC: &str = r#"VERSION "2.1"


NS_ :
	NS_DESC_
	CM_
	BA_DEF_
	BA_

BS_:

BU_: Gateway Body Display


VAL_TABLE_ DoorState 0 "Closed" 1 "Open" ;

BO_ 100 TestFrame: 8 Gateway
 SG_ Sig1 : 0|8@1+ (1,0) [0|255] "" Body
 SG_ Door : 24|2@1+ (1,0) [0|3] "" Display

BO_ 200 Motion: 8 Body
 SG_ Speed : 7|16@0- (0.1,0) [-3276.8|3276.7] "km/h" Gateway,Display
 SG_ Accel : 16|32@1- (1,0) [0|0] "m/s2" Display

BO_ 2147483939 Diag: 8 Vector__XXX
 SG_ Mode M : 0|8@1+ (1,0) [0|0] "" Body
 SG_ Temp m1 : 8|16@1- (0.5,-40) [0|0] "degC" Body
 SG_ Volt m2 : 8|16@1+ (0.01,0) [0|0] "V" Body

BO_TX_BU_ 100 : Gateway,Body;

CM_ "Body network";
CM_ BO_ 100 "Cyclic status";
CM_ SG_ 200 Speed "Vehicle speed
over ground";
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 10000;
BA_DEF_DEF_ "GenMsgCycleTime" 0;
BA_DEF_ SG_ "GenSigStartValue" INT 0 65535;
BA_ "GenMsgCycleTime" BO_ 100 20;
BA_ "GenSigStartValue" SG_ 200 Speed 50;
VAL_ 100 Door 0 "Closed" 1 "Open" 2 "Ajar" ;
SIG_GROUP_ 100 Status 1 : Sig1 Door;
SIG_VALTYPE_ 200 Accel : 1;
SG_MUL_VAL_ 2147483939 Temp Mode 1-1;
SG_MUL_VAL_ 2147483939 Volt Mode 2-2;
"#;

fn load_body() -> CanMatrix {
    let _ = env_logger::builder().is_test(true).try_init();
    dbc::load(BODY_DBC.as_bytes(), &LoadOptions::new()).unwrap()
}

fn dump_to_string(matrix: &CanMatrix) -> String {
    let mut out = Vec::new();
    dbc::dump(matrix, &mut out, &DumpOptions::new()).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_body_network_loads() {
    let matrix = load_body();
    assert!(matrix.load_errors.is_empty(), "{:?}", matrix.load_errors);
    assert_eq!(matrix.version, "2.1");
    assert_eq!(matrix.frames.len(), 3);
    assert_eq!(matrix.ecus.len(), 3);
    assert_eq!(matrix.comment.as_deref(), Some("Body network"));

    let frame = matrix.frame_by_name("TestFrame").unwrap();
    assert_eq!(frame.transmitters, vec!["Gateway", "Body"]);
    assert_eq!(frame.comment.as_deref(), Some("Cyclic status"));
    assert_eq!(frame.cycle_time(Some(&matrix)), Some(20));
    assert_eq!(frame.signal_by_name("Door").unwrap().values.get(&2).map(String::as_str), Some("Ajar"));

    let speed = matrix.frame_by_name("Motion").unwrap().signal_by_name("Speed").unwrap();
    assert_eq!(speed.comment.as_deref(), Some("Vehicle speed\nover ground"));
    assert_eq!(speed.receivers, vec!["Gateway", "Display"]);
    assert_eq!(speed.initial_value, Some(Decimal::from(5)));

    let accel = matrix.frame_by_name("Motion").unwrap().signal_by_name("Accel").unwrap();
    assert_eq!(accel.value_type, ValueType::Float);

    let group = frame.signal_group_by_name("Status").unwrap();
    let members: Vec<&str> = group.members(frame).map(|s| s.name.as_str()).collect();
    assert_eq!(members, vec!["Sig1", "Door"]);

    let diag = matrix.frame_by_name("Diag").unwrap();
    assert!(diag.is_complex_multiplexed);
    let temp = diag.signal_by_name("Temp").unwrap();
    assert_eq!(temp.muxer_for_signal.as_deref(), Some("Mode"));
    assert_eq!(temp.mux_ranges.len(), 1);
}

#[test]
fn test_round_trip_preserves_layout() {
    let first = load_body();
    let text = dump_to_string(&first);
    let second = dbc::load(text.as_bytes(), &LoadOptions::new()).unwrap();
    assert!(second.load_errors.is_empty(), "{:?}\n{}", second.load_errors, text);

    assert_eq!(first.frames.len(), second.frames.len());
    for (a, b) in first.frames.iter().zip(&second.frames) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.arbitration_id, b.arbitration_id);
        assert_eq!(a.size, b.size);
        assert_eq!(a.transmitters, b.transmitters);
        assert_eq!(a.comment, b.comment);
        assert_eq!(a.attributes, b.attributes);
        assert_eq!(a.signal_groups, b.signal_groups);
        assert_eq!(a.is_complex_multiplexed, b.is_complex_multiplexed);
        assert_eq!(a.signals.len(), b.signals.len());
        for (x, y) in a.signals.iter().zip(&b.signals) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.start_bit, y.start_bit, "signal {}", x.name);
            assert_eq!(x.size, y.size);
            assert_eq!(x.byte_order, y.byte_order);
            assert_eq!(x.value_type, y.value_type);
            assert_eq!(x.factor, y.factor);
            assert_eq!(x.offset, y.offset);
            assert_eq!((x.min, x.max), (y.min, y.max));
            assert_eq!(x.unit, y.unit);
            assert_eq!(x.receivers, y.receivers);
            assert_eq!(x.values, y.values);
            assert_eq!(x.multiplex, y.multiplex);
            assert_eq!(x.comment, y.comment);
            assert_eq!(x.mux_ranges, y.mux_ranges, "signal {}", x.name);
            assert_eq!(x.muxer_for_signal, y.muxer_for_signal);
            assert_eq!(x.initial_value, y.initial_value, "signal {}", x.name);
            assert_eq!(x.attributes, y.attributes);
        }
    }
    assert_eq!(first.value_tables, second.value_tables);
    assert_eq!(first.frame_defines, second.frame_defines);
    assert_eq!(first.signal_defines, second.signal_defines);
    assert_eq!(first.comment, second.comment);
}

#[test]
fn test_extended_id() {
    let matrix = load_body();
    let diag = matrix.frame_by_name("Diag").unwrap();
    assert_eq!(diag.arbitration_id, ArbitrationId::extended(0x123));
    assert!(diag.transmitters.is_empty());
    assert!(matrix.frame_by_id(ArbitrationId::extended(0x123)).is_some());
    assert!(matrix.frame_by_id(ArbitrationId::standard(0x123)).is_none());

    let text = dump_to_string(&matrix);
    assert!(text.contains("BO_ 2147483939 Diag: 8 Vector__XXX"));
}

#[test]
fn test_encode_sig1() {
    let matrix = load_body();
    let frame = matrix.frame_by_id(ArbitrationId::standard(100)).unwrap();
    let signal = frame.signal_by_name("Sig1").unwrap();
    assert_eq!(signal.start_bit, 0);
    assert_eq!(signal.byte_order, ByteOrder::LittleEndian);
    assert_eq!(signal.value_type, ValueType::Unsigned);

    let values = HashMap::from([("Sig1".to_string(), SignalValue::from(200i64))]);
    let payload = frame.encode(&values).unwrap();
    assert_eq!(payload, vec![200, 0, 0, 0, 0, 0, 0, 0]);

    let decoded = frame.decode(&payload).unwrap();
    assert_eq!(decoded["Sig1"].phys, Decimal::from(200));
    assert_eq!(decoded["Door"].named.as_deref(), Some("Closed"));
}

#[test]
fn test_big_endian_start_bit() {
    let matrix = load_body();
    let frame = matrix.frame_by_name("Motion").unwrap();
    let speed = frame.signal_by_name("Speed").unwrap();
    assert_eq!(speed.start_bit, 8);
    assert_eq!(speed.value_type, ValueType::Signed);
    assert_eq!(bit_layout::to_msb(speed.start_bit, 16, ByteOrder::BigEndian), Some(7));
    assert_eq!(bit_layout::from_msb(7, 16, ByteOrder::BigEndian), Some(8));

    let values = HashMap::from([("Speed".to_string(), SignalValue::from(Decimal::new(-123, 1)))]);
    let payload = frame.encode(&values).unwrap();
    assert_eq!(&payload[..2], &[0xFF, 0x85]);
    assert_eq!(frame.decode(&payload).unwrap()["Speed"].phys, Decimal::new(-123, 1));

    assert!(dump_to_string(&matrix).contains(" SG_ Speed : 7|16@0- (0.1,0) [-3276.8|3276.7] \"km/h\" Gateway,Display"));
}

#[test]
fn test_multiplexed_decode() {
    let matrix = load_body();
    let frame = matrix.frame_by_name("Diag").unwrap();

    let values = HashMap::from([
        ("Mode".to_string(), SignalValue::from(1i64)),
        ("Temp".to_string(), SignalValue::from(20i64)),
    ]);
    let mut payload = frame.encode(&values).unwrap();
    assert_eq!(&payload[..3], &[1, 120, 0]);

    let decoded = frame.decode(&payload).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded["Temp"].phys, Decimal::from(20));
    assert!(!decoded.contains_key("Volt"));

    payload[0] = 2;
    let decoded = frame.decode(&payload).unwrap();
    assert!(decoded.contains_key("Volt"));
    assert!(!decoded.contains_key("Temp"));
    assert_eq!(decoded["Volt"].phys, Decimal::new(120, 2));
}

#[test]
fn test_dump_leaves_matrix_untouched() {
    let matrix = load_body();
    let before = matrix.clone();
    dump_to_string(&matrix);
    assert_eq!(matrix, before);
}

#[test]
fn test_bad_statements_are_skipped() {
    let text = format!("{}BO_ abc Broken: 8 X\nBA_ \"GenMsgCycleTime\" BO_ 999 5;\n", BODY_DBC);
    let matrix = dbc::load(text.as_bytes(), &LoadOptions::new()).unwrap();
    assert_eq!(matrix.frames.len(), 3);
    let lines: Vec<usize> = matrix.load_errors.iter().map(|e| e.line).collect();
    let base = BODY_DBC.lines().count();
    assert_eq!(lines, vec![base + 1, base + 2]);
}

#[test]
fn test_start_value_set_in_code_survives_dump() {
    let mut matrix = load_body();
    matrix
        .frame_by_name_mut("TestFrame")
        .unwrap()
        .signal_by_name_mut("Door")
        .unwrap()
        .initial_value = Some(Decimal::from(2));

    let text = dump_to_string(&matrix);
    assert!(text.contains("BA_ \"GenSigStartValue\" SG_ 100 Door 2;"), "{}", text);
    let reloaded = dbc::load(text.as_bytes(), &LoadOptions::new()).unwrap();
    assert!(reloaded.load_errors.is_empty(), "{:?}", reloaded.load_errors);
    let door = reloaded.frame_by_name("TestFrame").unwrap().signal_by_name("Door").unwrap();
    assert_eq!(door.initial_value, Some(Decimal::from(2)));
}

#[test]
fn test_not_a_dbc_file() {
    let result = dbc::load(&b"<?xml version=\"1.0\"?>\n<NETWORKDEFINITION/>"[..], &LoadOptions::new());
    assert!(matches!(result, Err(CanMatrixError::UnrecognizedHeader(_))));
}

#[test]
fn test_file_dispatch() {
    let matrix = load_body();
    let dir = tempfile::tempdir().unwrap();

    let path = dir.path().join("body.dbc");
    formats::dump_file(&matrix, &path, &DumpOptions::new()).unwrap();
    let reloaded = formats::load_file(&path, &LoadOptions::new()).unwrap();
    assert_eq!(reloaded.frames.len(), matrix.frames.len());
    assert_eq!(reloaded.frame_by_name("Diag").unwrap().arbitration_id, ArbitrationId::extended(0x123));

    let unsupported = dir.path().join("body.kcd");
    assert!(matches!(
        formats::dump_file(&matrix, &unsupported, &DumpOptions::new()),
        Err(CanMatrixError::UnsupportedFormat(_))
    ));
    assert!(!unsupported.exists());
    assert!(matches!(
        formats::load_file(&dir.path().join("missing.dbc"), &LoadOptions::new()),
        Err(CanMatrixError::IoError(_))
    ));
}

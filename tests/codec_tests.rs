//! Line codec tests

use light_tower_link::codec::{decode, encode, Message};
use light_tower_link::element::{to_bytes, Char};
use light_tower_link::{ConnectionStatus, DecodeError, ElementType};

const BT_SINK_EN_TRUE: &str = r#"{"N":"BT_Sink_En","C":1,"T":"Bool_t","D":["01"],"B":1,"S":1}"#;

#[test]
fn test_encode_bool_exact_line() {
    let line = encode("BT_Sink_En", ElementType::Bool, 1, &[1]).unwrap();
    assert_eq!(line, BT_SINK_EN_TRUE);
}

#[test]
fn test_decode_bool_exact_line() {
    let msg = decode(BT_SINK_EN_TRUE).unwrap();
    assert_eq!(msg.name, "BT_Sink_En");
    assert_eq!(msg.element_type, ElementType::Bool);
    assert_eq!(msg.count, 1);
    assert_eq!(msg.payload, vec![1]);
    assert_eq!(msg.change_count, None);
}

#[test]
fn test_change_count_tag_is_last_and_optional() {
    let line = Message::new("BT_Sink_En", ElementType::Bool, 1, vec![1])
        .with_change_count(4)
        .encode()
        .unwrap();
    assert_eq!(
        line,
        r#"{"N":"BT_Sink_En","C":1,"T":"Bool_t","D":["01"],"B":1,"S":1,"I":4}"#
    );
    assert_eq!(decode(&line).unwrap().change_count, Some(4));
}

#[test]
fn test_multibyte_elements_are_little_endian_per_group() {
    let line = encode("Gain", ElementType::Uint16, 2, &to_bytes(&[0x1234u16, 0x00FF])).unwrap();
    assert!(line.contains(r#""D":["3412","FF00"]"#), "{}", line);
    assert!(line.contains(r#""B":4"#));
    assert!(line.contains(r#""S":325"#), "{}", line); // 0x34+0x12+0xFF
}

#[test]
fn test_flipped_hex_digit_fails_checksum() {
    let corrupted = BT_SINK_EN_TRUE.replace(r#"["01"]"#, r#"["03"]"#);
    assert_eq!(
        decode(&corrupted),
        Err(DecodeError::ChecksumMismatch {
            declared: 1,
            computed: 3
        })
    );
}

#[test]
fn test_missing_tags_are_rejected() {
    for tag in ["N", "C", "T", "D", "B", "S"] {
        let value: serde_json::Value = serde_json::from_str(BT_SINK_EN_TRUE).unwrap();
        let mut object = value.as_object().unwrap().clone();
        object.remove(tag);
        let line = serde_json::to_string(&object).unwrap();
        assert!(
            matches!(decode(&line), Err(DecodeError::MissingTag(t)) if t == tag),
            "missing {} should be reported",
            tag
        );
    }
}

#[test]
fn test_length_mismatch_is_rejected() {
    let line = r#"{"N":"X","C":2,"T":"Bool_t","D":["01"],"B":1,"S":1}"#;
    assert!(matches!(decode(line), Err(DecodeError::LengthMismatch { .. })));

    let line = r#"{"N":"X","C":1,"T":"Bool_t","D":["01"],"B":2,"S":1}"#;
    assert!(matches!(decode(line), Err(DecodeError::LengthMismatch { .. })));
}

#[test]
fn test_wrong_group_width_is_invalid_hex() {
    let line = r#"{"N":"X","C":1,"T":"Uint16_t","D":["01"],"B":2,"S":1}"#;
    assert_eq!(decode(line), Err(DecodeError::InvalidHex { index: 0 }));

    let line = r#"{"N":"X","C":1,"T":"Bool_t","D":["0G"],"B":1,"S":0}"#;
    assert_eq!(decode(line), Err(DecodeError::InvalidHex { index: 0 }));
}

#[test]
fn test_unknown_type_is_rejected() {
    let line = r#"{"N":"X","C":1,"T":"Quaternion_t","D":["01"],"B":1,"S":1}"#;
    assert_eq!(decode(line), Err(DecodeError::UnknownType("Quaternion_t".into())));
}

#[test]
fn test_garbage_is_malformed() {
    assert!(matches!(decode("not json"), Err(DecodeError::Malformed(_))));
    assert!(matches!(decode(r#"{"N":"X""#), Err(DecodeError::Malformed(_))));
}

#[test]
fn test_trailing_whitespace_tolerated() {
    let line = format!("{}\r", BT_SINK_EN_TRUE);
    assert!(decode(&line).is_ok());
}

#[test]
fn test_round_trip_each_type() {
    let cases: Vec<(ElementType, usize, Vec<u8>)> = vec![
        (ElementType::Int8, 3, to_bytes(&[-1i8, 0, 127])),
        (ElementType::Int32, 1, to_bytes(&[-123_456i32])),
        (ElementType::Uint32, 2, to_bytes(&[0u32, u32::MAX])),
        (ElementType::Float, 1, to_bytes(&[1.7f32])),
        (ElementType::Double, 1, to_bytes(&[-0.25f64])),
        (ElementType::Char, 5, to_bytes(&Char::array_from_str::<5>("tower").unwrap())),
        (ElementType::ConnectionStatus, 1, to_bytes(&[ConnectionStatus::Connected])),
    ];

    for (element_type, count, payload) in cases {
        let line = encode("item", element_type, count, &payload).unwrap();
        let msg = decode(&line).unwrap();
        assert_eq!(msg.element_type, element_type);
        assert_eq!(msg.count, count);
        assert_eq!(msg.payload, payload, "{}", line);
    }
}

#[test]
fn test_round_trip_every_element_type() {
    for element_type in ElementType::ALL {
        for count in [1usize, 3] {
            let payload: Vec<u8> = (0..count * element_type.size()).map(|i| (i % 2) as u8).collect();
            let line = encode("Sound_State", element_type, count, &payload).unwrap();
            let msg = decode(&line).unwrap();

            assert_eq!(msg.name, "Sound_State", "{}", line);
            assert_eq!(msg.element_type, element_type, "{}", line);
            assert_eq!(msg.count, count, "{}", line);
            assert_eq!(msg.payload, payload, "{}", line);
        }
    }
}

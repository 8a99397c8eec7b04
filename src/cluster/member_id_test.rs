use super::*;

#[test]
fn integers_normalize_to_decimal() {
    assert_eq!(RawMemberId::Int(42).normalize(), Some(MemberId::from(42u64)));
    assert_eq!(RawMemberId::Int(42).normalize().unwrap().as_str(), "42");
}

#[test]
fn zero_and_empty_mean_no_member() {
    assert_eq!(RawMemberId::Int(0).normalize(), None);
    assert_eq!(RawMemberId::Text("  ".into()).normalize(), None);
    assert_eq!(RawMemberId::Text("0x0".into()).normalize(), None);
    assert_eq!(RawMemberId::Handle(MemberHandle { id: 0 }).normalize(), None);
}

#[test]
fn text_is_read_as_decimal_then_hex() {
    assert_eq!(RawMemberId::Text(" 17 ".into()).normalize(), Some(MemberId::from(17u64)));
    assert_eq!(RawMemberId::Text("0x8e9e05c52164694d".into()).normalize(), Some(MemberId::from(0x8e9e05c52164694du64)));
    assert_eq!(RawMemberId::Text("0XFF".into()).normalize(), Some(MemberId::from(255u64)));
}

#[test]
fn unparseable_text_is_kept_opaque() {
    let id = RawMemberId::Text(" etcd-node-a ".into()).normalize().unwrap();
    assert_eq!(id.as_str(), "etcd-node-a");
}

#[test]
fn structured_handles_unwrap_their_id() {
    assert_eq!(RawMemberId::Handle(MemberHandle { id: 9 }).normalize(), Some(MemberId::from(9u64)));
}

#[test]
fn every_shape_of_the_same_member_agrees() {
    let shapes = [
        RawMemberId::Int(255),
        RawMemberId::Text("255".into()),
        RawMemberId::Text("0xff".into()),
        RawMemberId::Handle(MemberHandle { id: 255 }),
    ];
    for shape in shapes {
        assert_eq!(shape.normalize(), Some(MemberId::from(255u64)), "{shape:?}");
    }
}

#[test]
fn raw_ids_decode_from_untagged_json() {
    let parsed: Vec<RawMemberId> = serde_json::from_str(r#"[7, "0x7", {"id": 7}]"#).unwrap();
    assert_eq!(
        parsed,
        vec![
            RawMemberId::Int(7),
            RawMemberId::Text("0x7".into()),
            RawMemberId::Handle(MemberHandle { id: 7 })
        ]
    );
}

#[test]
fn member_id_serializes_as_plain_string() {
    assert_eq!(serde_json::to_string(&MemberId::from(3u64)).unwrap(), r#""3""#);
}

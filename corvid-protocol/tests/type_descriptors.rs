use bytes::{Buf, Bytes};
use std::error::Error;

use corvid_protocol::common::Cardinality;
use corvid_protocol::descriptors::BaseScalarTypeDescriptor;
use corvid_protocol::descriptors::EnumerationTypeDescriptor;
use corvid_protocol::descriptors::ScalarTypeDescriptor;
use corvid_protocol::descriptors::TupleTypeDescriptor;
use corvid_protocol::descriptors::{Descriptor, TypePos, Typedesc};
use corvid_protocol::descriptors::{ObjectShapeDescriptor, ShapeElement};
use corvid_protocol::descriptors::{EMPTY_TUPLE_DESC, EMPTY_TUPLE_ID, NULL_TYPE_ID};
use corvid_protocol::encoding::Input;
use corvid_protocol::errors::DecodeError;
use corvid_protocol::features::ProtocolVersion;
use uuid::Uuid;

mod base;

fn decode(bytes: &[u8]) -> Result<Vec<Descriptor>, DecodeError> {
    let bytes = Bytes::copy_from_slice(bytes);
    let mut input = Input::new(ProtocolVersion::current(), bytes);
    let mut result = Vec::new();
    while input.remaining() > 0 {
        result.push(Descriptor::decode(&mut input)?);
    }
    assert!(input.remaining() == 0);
    Ok(result)
}

fn decode_10(bytes: &[u8]) -> Result<Vec<Descriptor>, DecodeError> {
    let bytes = Bytes::copy_from_slice(bytes);
    let mut input = Input::new(ProtocolVersion::new(0, 10), bytes);
    let mut result = Vec::new();
    while input.remaining() > 0 {
        result.push(Descriptor::decode(&mut input)?);
    }
    assert!(input.remaining() == 0);
    Ok(result)
}

fn parse(bytes: &[u8], proto: ProtocolVersion) -> Result<Typedesc, DecodeError> {
    let bytes = Bytes::copy_from_slice(bytes);
    Typedesc::parse(&mut Input::new(proto, bytes))
}

#[test]
fn empty_tuple() -> Result<(), Box<dyn Error>> {
    // `SELECT ()`
    assert_eq!(
        decode(EMPTY_TUPLE_DESC)?,
        vec![Descriptor::Tuple(TupleTypeDescriptor {
            id: EMPTY_TUPLE_ID.into(),
            element_types: Vec::new(),
        }),]
    );
    let desc = parse(EMPTY_TUPLE_DESC, ProtocolVersion::current())?;
    assert!(desc.is_empty_tuple());
    assert_eq!(desc.id(), &EMPTY_TUPLE_ID);
    Ok(())
}

#[test]
fn single_int() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode(b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05")?,
        vec![Descriptor::BaseScalar(BaseScalarTypeDescriptor {
            id: "00000000-0000-0000-0000-000000000105"
                .parse::<Uuid>()?
                .into(),
        })]
    );
    Ok(())
}

#[test]
fn one_tuple() -> Result<(), Box<dyn Error>> {
    // `SELECT (1,)`
    assert_eq!(
        decode(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
            b"\x04\x1cyGes%\x89Sa\x03\xe7\x87vE\xad9\0\x01\0\0"))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000105"
                    .parse::<Uuid>()?
                    .into(),
            }),
            Descriptor::Tuple(TupleTypeDescriptor {
                id: "1c794765-7325-8953-6103-e7877645ad39"
                    .parse::<Uuid>()?
                    .into(),
                element_types: vec![TypePos(0)],
            }),
        ]
    );
    Ok(())
}

#[test]
fn derived_scalar() -> Result<(), Box<dyn Error>> {
    let derived: Uuid = "6d2c0407-3cb4-4d93-a613-1bb9de1bcd3e".parse()?;
    assert_eq!(
        decode(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x01"
            b"\x03" derived.as_bytes() b"\0\0"))?,
        vec![
            Descriptor::BaseScalar(BaseScalarTypeDescriptor {
                id: "00000000-0000-0000-0000-000000000101"
                    .parse::<Uuid>()?
                    .into(),
            }),
            Descriptor::Scalar(ScalarTypeDescriptor {
                id: derived.into(),
                base_type_pos: TypePos(0),
            }),
        ]
    );
    Ok(())
}

#[test]
fn enumeration() -> Result<(), Box<dyn Error>> {
    let enum_id: Uuid = "5944e41a-8a79-4d4c-b0bd-6e63e22fb6ad".parse()?;
    assert_eq!(
        decode(bconcat!(
            b"\x07" enum_id.as_bytes()
            b"\0\x02\0\0\0\x03red\0\0\0\x05green"))?,
        vec![Descriptor::Enumeration(EnumerationTypeDescriptor {
            id: enum_id.into(),
            members: vec![String::from("red"), String::from("green")],
        })]
    );
    Ok(())
}

#[test]
fn object() -> Result<(), Box<dyn Error>> {
    let shape_id: Uuid = "8e85803b-d8b7-aa69-e3b0-645a1eb00cfe".parse()?;
    let desc = parse(
        bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\0"
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x01"
            b"\x01" shape_id.as_bytes() b"\0\x02"
            b"\0\0\0\x01A\0\0\0\x02id\0\0"
            b"\0\0\0\0A\0\0\0\x04name\0\x01"
        ),
        ProtocolVersion::new(0, 12),
    )?;
    assert_eq!(desc.id(), &shape_id);
    assert_eq!(
        desc.root(),
        Some(&Descriptor::ObjectShape(ObjectShapeDescriptor {
            id: shape_id.into(),
            elements: vec![
                ShapeElement {
                    flag_implicit: true,
                    flag_link_property: false,
                    flag_link: false,
                    cardinality: Some(Cardinality::One),
                    name: String::from("id"),
                    type_pos: TypePos(0),
                },
                ShapeElement {
                    flag_implicit: false,
                    flag_link_property: false,
                    flag_link: false,
                    cardinality: Some(Cardinality::One),
                    name: String::from("name"),
                    type_pos: TypePos(1),
                },
            ]
        }))
    );
    Ok(())
}

#[test]
fn object_10() -> Result<(), Box<dyn Error>> {
    // Before 0.11 flags are a single byte and cardinality is not sent.
    let shape_id: Uuid = "8e85803b-d8b7-aa69-e3b0-645a1eb00cfe".parse()?;
    assert_eq!(
        decode_10(bconcat!(
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\0"
            b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x01"
            b"\x01" shape_id.as_bytes() b"\0\x02"
            b"\x01\0\0\0\x02id\0\0"
            b"\0\0\0\0\x04name\0\x01"
        ))?[2],
        Descriptor::ObjectShape(ObjectShapeDescriptor {
            id: shape_id.into(),
            elements: vec![
                ShapeElement {
                    flag_implicit: true,
                    flag_link_property: false,
                    flag_link: false,
                    cardinality: None,
                    name: String::from("id"),
                    type_pos: TypePos(0),
                },
                ShapeElement {
                    flag_implicit: false,
                    flag_link_property: false,
                    flag_link: false,
                    cardinality: None,
                    name: String::from("name"),
                    type_pos: TypePos(1),
                },
            ]
        })
    );
    Ok(())
}

#[test]
fn annotations_are_skipped() -> Result<(), Box<dyn Error>> {
    let enum_id: Uuid = "5944e41a-8a79-4d4c-b0bd-6e63e22fb6ad".parse()?;
    let bytes = bconcat!(
        b"\x07" enum_id.as_bytes()
        b"\0\x02\0\0\0\x03red\0\0\0\x05green"
        b"\xff" enum_id.as_bytes()
        b"\0\0\0\x0edefault::color"
    );

    // Frame-level decoding still yields the annotation.
    let frames = decode(bytes)?;
    assert_eq!(frames.len(), 2);
    match &frames[1] {
        Descriptor::TypeAnnotation(anno) => {
            assert_eq!(anno.annotated_type, 0xff);
            assert_eq!(anno.annotation, "default::color");
        }
        other => panic!("expected a type annotation, got {other:?}"),
    }

    // The parser drops it and keeps the enum as the root.
    let desc = parse(bytes, ProtocolVersion::current())?;
    assert_eq!(desc.descriptors().len(), 1);
    assert_eq!(desc.id(), &enum_id);
    Ok(())
}

#[test]
fn nothing_typedesc() {
    let desc = Typedesc::nothing(&ProtocolVersion::current());
    assert_eq!(desc.id(), &NULL_TYPE_ID);
    assert_eq!(desc.root(), None);
    assert!(!desc.is_empty_tuple());
    assert!(desc.descriptors().is_empty());
}

#[test]
fn empty_input_is_an_error() {
    let err = parse(b"", ProtocolVersion::current()).unwrap_err();
    assert!(matches!(err, DecodeError::EmptyTypedesc { .. }), "{err}");
}

#[test]
fn unknown_tag_is_fatal() {
    let err = decode(bconcat!(b"\x42" EMPTY_TUPLE_ID.as_bytes() b"\0\0")).unwrap_err();
    assert!(matches!(err, DecodeError::InvalidTypeDescriptor { descriptor: 0x42, .. }), "{err}");
}

#[test]
fn truncated_input() {
    let err = decode(b"\x02\0\0").unwrap_err();
    assert!(matches!(err, DecodeError::Underflow { .. }), "{err}");
}

#[test]
fn forward_reference_is_fatal() {
    // A set frame as the very first frame references a position that does
    // not exist yet.
    let err = parse(
        bconcat!(b"\x00" EMPTY_TUPLE_ID.as_bytes() b"\0\0"),
        ProtocolVersion::current(),
    )
    .unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedTypePos { position: 0, .. }), "{err}");
}

#[test]
fn invalid_cardinality_byte() {
    let shape_id = Uuid::from_u128(0x1234);
    let err = decode(bconcat!(
        b"\x01" shape_id.as_bytes() b"\0\x01"
        b"\0\0\0\0\x00\0\0\0\x02id\0\0"
    ))
    .unwrap_err();
    assert!(matches!(err, DecodeError::InvalidCardinality { cardinality: 0, .. }), "{err}");
}

#[test]
fn multi_dimensional_array() {
    let array_id = Uuid::from_u128(0x1234);
    let err = decode(bconcat!(
        b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05"
        b"\x06" array_id.as_bytes() b"\0\0\0\x02\xff\xff\xff\xff\xff\xff\xff\xff"
    ))
    .unwrap_err();
    assert!(matches!(err, DecodeError::MultiDimensionalArray { .. }), "{err}");
}

#[test]
fn get_out_of_range() -> Result<(), Box<dyn Error>> {
    let desc = parse(b"\x02\0\0\0\0\0\0\0\0\0\0\0\0\0\0\x01\x05", ProtocolVersion::current())?;
    assert!(desc.get(TypePos(0)).is_ok());
    let err = desc.get(TypePos(7)).unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedTypePos { position: 7, .. }), "{err}");
    Ok(())
}

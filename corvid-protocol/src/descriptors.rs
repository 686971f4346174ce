/*!
Types for the [Descriptor] enum and the [Typedesc] parser.

The type descriptor is essentially a list of type information blocks:
* each block encodes one type;
* blocks reference earlier blocks by position.

While parsing the blocks, a database driver can assemble an encoder or a
decoder of the Corvid binary data format. The server-side counterpart that
produces these blocks lives in [describe](crate::describe).
*/

use std::convert::{TryFrom, TryInto};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;

use bitflags::bitflags;
use bytes::Buf;
use snafu::{ensure, OptionExt};
use uuid::Uuid;

use crate::common::Cardinality;
use crate::encoding::{Decode, Input};
use crate::errors::{self, DecodeError};
use crate::features::ProtocolVersion;

/// Namespace for deriving the content ids of composite descriptors.
pub const TYPE_ID_NAMESPACE: Uuid = Uuid::from_u128(0x00e50276_2502_11e7_97f2_27fe51238dbd);

/// Well-known id of the empty tuple type.
pub const EMPTY_TUPLE_ID: Uuid = Uuid::from_u128(0xFF);
/// Well-known id of `std::uuid`.
pub const STD_UUID: Uuid = Uuid::from_u128(0x100);
/// Well-known id of `std::str`.
pub const STD_STR: Uuid = Uuid::from_u128(0x101);
/// Id of the null type, which carries no data.
pub const NULL_TYPE_ID: Uuid = Uuid::from_u128(0);

/// The complete descriptor of the empty tuple.
pub const EMPTY_TUPLE_DESC: &[u8] = b"\x04\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\xff\0\0";
/// The descriptor of the null type.
pub const NULL_TYPE_DESC: &[u8] = b"";

pub(crate) const CTYPE_SET: u8 = 0x00;
pub(crate) const CTYPE_SHAPE: u8 = 0x01;
pub(crate) const CTYPE_BASE_SCALAR: u8 = 0x02;
pub(crate) const CTYPE_SCALAR: u8 = 0x03;
pub(crate) const CTYPE_TUPLE: u8 = 0x04;
pub(crate) const CTYPE_NAMEDTUPLE: u8 = 0x05;
pub(crate) const CTYPE_ARRAY: u8 = 0x06;
pub(crate) const CTYPE_ENUM: u8 = 0x07;
pub(crate) const CTYPE_ANNO_TYPENAME: u8 = 0xFF;

bitflags! {
    /// Flag bits of a single shape pointer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PointerFlags: u32 {
        const IMPLICIT = 0b001;
        const LINK_PROPERTY = 0b010;
        const LINK = 0b100;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TypePos(pub u16);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Set(SetDescriptor),
    ObjectShape(ObjectShapeDescriptor),
    BaseScalar(BaseScalarTypeDescriptor),
    Scalar(ScalarTypeDescriptor),
    Tuple(TupleTypeDescriptor),
    NamedTuple(NamedTupleTypeDescriptor),
    Array(ArrayTypeDescriptor),
    Enumeration(EnumerationTypeDescriptor),
    TypeAnnotation(TypeAnnotationDescriptor),
}

#[derive(Clone, PartialEq, Eq)]
pub struct DescriptorUuid(Uuid);

impl Debug for DescriptorUuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match uuid_to_known_name(&self.0) {
            Some(known_name) => write!(f, "{known_name}"),
            None => write!(f, "{}", &self.0),
        }
    }
}

impl Deref for DescriptorUuid {
    type Target = Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Uuid> for DescriptorUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl PartialEq<Uuid> for DescriptorUuid {
    fn eq(&self, other: &Uuid) -> bool {
        self.0 == *other
    }
}

/// A parsed type descriptor: the frame list plus the root reference.
#[derive(Debug)]
pub struct Typedesc {
    pub(crate) proto: ProtocolVersion,
    pub(crate) array: Vec<Descriptor>,
    pub(crate) root_id: Uuid,
    pub(crate) root_pos: Option<TypePos>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetDescriptor {
    pub id: DescriptorUuid,
    pub type_pos: TypePos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectShapeDescriptor {
    pub id: DescriptorUuid,
    pub elements: Vec<ShapeElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeElement {
    pub flag_implicit: bool,
    pub flag_link_property: bool,
    pub flag_link: bool,
    /// Absent on the wire before protocol 0.11.
    pub cardinality: Option<Cardinality>,
    pub name: String,
    pub type_pos: TypePos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseScalarTypeDescriptor {
    pub id: DescriptorUuid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalarTypeDescriptor {
    pub id: DescriptorUuid,
    pub base_type_pos: TypePos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleTypeDescriptor {
    pub id: DescriptorUuid,
    pub element_types: Vec<TypePos>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedTupleTypeDescriptor {
    pub id: DescriptorUuid,
    pub elements: Vec<TupleElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleElement {
    pub name: String,
    pub type_pos: TypePos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayTypeDescriptor {
    pub id: DescriptorUuid,
    pub type_pos: TypePos,
    pub dimensions: Vec<Option<u32>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumerationTypeDescriptor {
    pub id: DescriptorUuid,
    pub members: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeAnnotationDescriptor {
    pub annotated_type: u8,
    pub id: DescriptorUuid,
    pub annotation: String,
}

impl Typedesc {
    /// Parse a full descriptor blob.
    ///
    /// Annotation frames are tolerated and skipped. The root is the last
    /// proper frame; an input without any is an error.
    pub fn parse(buf: &mut Input) -> Result<Typedesc, DecodeError> {
        let mut descriptors = Vec::new();
        while buf.remaining() > 0 {
            let desc = Descriptor::decode(buf)?;
            if let Descriptor::TypeAnnotation(_) = desc {
                continue;
            }
            for pos in desc.child_positions() {
                ensure!(
                    (pos.0 as usize) < descriptors.len(),
                    errors::UnexpectedTypePos { position: pos.0 }
                );
            }
            descriptors.push(desc);
        }
        let idx = match descriptors.len().checked_sub(1) {
            Some(idx) => idx,
            None => return errors::EmptyTypedesc.fail(),
        };
        let pos = idx
            .try_into()
            .ok()
            .context(errors::TooManyDescriptors { index: idx })?;
        Ok(Typedesc {
            proto: buf.proto().clone(),
            root_id: *descriptors[idx].id(),
            array: descriptors,
            root_pos: Some(TypePos(pos)),
        })
    }
    /// The descriptor of the null type.
    pub fn nothing(protocol: &ProtocolVersion) -> Typedesc {
        Typedesc {
            proto: protocol.clone(),
            array: Vec::new(),
            root_id: NULL_TYPE_ID,
            root_pos: None,
        }
    }
    pub fn id(&self) -> &Uuid {
        &self.root_id
    }
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.array
    }
    pub fn root_pos(&self) -> Option<TypePos> {
        self.root_pos
    }
    pub fn root(&self) -> Option<&Descriptor> {
        self.root_pos.and_then(|pos| self.array.get(pos.0 as usize))
    }
    pub fn get(&self, type_pos: TypePos) -> Result<&Descriptor, DecodeError> {
        self.array
            .get(type_pos.0 as usize)
            .context(errors::UnexpectedTypePos {
                position: type_pos.0,
            })
    }
    pub fn is_empty_tuple(&self) -> bool {
        match self.root() {
            Some(Descriptor::Tuple(t)) => t.id == EMPTY_TUPLE_ID && t.element_types.is_empty(),
            _ => false,
        }
    }
    pub fn proto(&self) -> &ProtocolVersion {
        &self.proto
    }
}

impl Descriptor {
    pub fn id(&self) -> &Uuid {
        use Descriptor::*;
        match self {
            Set(i) => &i.id,
            ObjectShape(i) => &i.id,
            BaseScalar(i) => &i.id,
            Scalar(i) => &i.id,
            Tuple(i) => &i.id,
            NamedTuple(i) => &i.id,
            Array(i) => &i.id,
            Enumeration(i) => &i.id,
            TypeAnnotation(i) => &i.id,
        }
    }
    pub fn decode(buf: &mut Input) -> Result<Descriptor, DecodeError> {
        <Descriptor as Decode>::decode(buf)
    }
    /// Positions of earlier frames this one references.
    fn child_positions(&self) -> Vec<TypePos> {
        use Descriptor::*;
        match self {
            Set(i) => vec![i.type_pos],
            ObjectShape(i) => i.elements.iter().map(|el| el.type_pos).collect(),
            Scalar(i) => vec![i.base_type_pos],
            Tuple(i) => i.element_types.clone(),
            NamedTuple(i) => i.elements.iter().map(|el| el.type_pos).collect(),
            Array(i) => vec![i.type_pos],
            BaseScalar(_) | Enumeration(_) | TypeAnnotation(_) => Vec::new(),
        }
    }
}

pub(crate) fn uuid_to_known_name(uuid: &Uuid) -> Option<&'static str> {
    match uuid.as_u128() {
        0xFF => Some("Tuple(empty)"),
        0x100 => Some("BaseScalar(uuid)"),
        0x101 => Some("BaseScalar(str)"),
        0x102 => Some("BaseScalar(bytes)"),
        0x103 => Some("BaseScalar(int16)"),
        0x104 => Some("BaseScalar(int32)"),
        0x105 => Some("BaseScalar(int64)"),
        0x106 => Some("BaseScalar(float32)"),
        0x107 => Some("BaseScalar(float64)"),
        0x108 => Some("BaseScalar(decimal)"),
        0x109 => Some("BaseScalar(bool)"),
        0x10a => Some("BaseScalar(datetime)"),
        0x10e => Some("BaseScalar(duration)"),
        0x10f => Some("BaseScalar(json)"),
        0x110 => Some("BaseScalar(bigint)"),
        _ => None,
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 2, errors::Underflow);
        let element_count = buf.get_u16();
        let mut elements = Vec::with_capacity(element_count as usize);
        for _ in 0..element_count {
            elements.push(T::decode(buf)?);
        }
        Ok(elements)
    }
}

impl Decode for Option<u32> {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 4, errors::Underflow);

        let val = match buf.get_i32() {
            -1 => None,
            n if n > 0 => Some(n as u32),
            _ => errors::InvalidArrayShape.fail()?,
        };

        Ok(val)
    }
}

impl Decode for TypePos {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 2, errors::Underflow);
        Ok(Self(buf.get_u16()))
    }
}

impl Decode for Descriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        use Descriptor as D;
        ensure!(buf.remaining() >= 1, errors::Underflow);
        match buf.chunk()[0] {
            0x00 => SetDescriptor::decode(buf).map(D::Set),
            0x01 => ObjectShapeDescriptor::decode(buf).map(D::ObjectShape),
            0x02 => BaseScalarTypeDescriptor::decode(buf).map(D::BaseScalar),
            0x03 => ScalarTypeDescriptor::decode(buf).map(D::Scalar),
            0x04 => TupleTypeDescriptor::decode(buf).map(D::Tuple),
            0x05 => NamedTupleTypeDescriptor::decode(buf).map(D::NamedTuple),
            0x06 => ArrayTypeDescriptor::decode(buf).map(D::Array),
            0x07 => EnumerationTypeDescriptor::decode(buf).map(D::Enumeration),
            0x80..=0xFF => TypeAnnotationDescriptor::decode(buf).map(D::TypeAnnotation),
            descriptor => errors::InvalidTypeDescriptor { descriptor }.fail()?,
        }
    }
}

impl Decode for SetDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 19, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_SET);
        let id = Uuid::decode(buf)?.into();
        let type_pos = TypePos(buf.get_u16());
        Ok(SetDescriptor { id, type_pos })
    }
}

impl Decode for ObjectShapeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 19, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_SHAPE);
        let id = Uuid::decode(buf)?.into();
        let elements = Vec::<ShapeElement>::decode(buf)?;
        Ok(ObjectShapeDescriptor { id, elements })
    }
}

impl Decode for ShapeElement {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 7, errors::Underflow);
        let (flags, cardinality) = if buf.proto().is_at_least(0, 11) {
            let flags = buf.get_u32();
            let cardinality = TryFrom::try_from(buf.get_u8())?;
            (flags, Some(cardinality))
        } else {
            (buf.get_u8() as u32, None)
        };
        let flags = PointerFlags::from_bits_truncate(flags);
        let name = String::decode(buf)?;
        let type_pos = TypePos::decode(buf)?;
        Ok(ShapeElement {
            flag_implicit: flags.contains(PointerFlags::IMPLICIT),
            flag_link_property: flags.contains(PointerFlags::LINK_PROPERTY),
            flag_link: flags.contains(PointerFlags::LINK),
            cardinality,
            name,
            type_pos,
        })
    }
}

impl Decode for BaseScalarTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 17, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_BASE_SCALAR);
        let id = Uuid::decode(buf)?.into();
        Ok(BaseScalarTypeDescriptor { id })
    }
}

impl Decode for ScalarTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 19, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_SCALAR);
        let id = Uuid::decode(buf)?.into();
        let base_type_pos = TypePos(buf.get_u16());
        Ok(ScalarTypeDescriptor { id, base_type_pos })
    }
}

impl Decode for TupleTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 19, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_TUPLE);
        let id = Uuid::decode(buf)?.into();
        let element_types = Vec::<TypePos>::decode(buf)?;
        Ok(TupleTypeDescriptor { id, element_types })
    }
}

impl Decode for NamedTupleTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 19, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_NAMEDTUPLE);
        let id = Uuid::decode(buf)?.into();
        let elements = Vec::<TupleElement>::decode(buf)?;
        Ok(NamedTupleTypeDescriptor { id, elements })
    }
}

impl Decode for TupleElement {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        let name = String::decode(buf)?;
        let type_pos = TypePos::decode(buf)?;
        Ok(TupleElement { name, type_pos })
    }
}

impl Decode for ArrayTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 21, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_ARRAY);
        let id = Uuid::decode(buf)?.into();
        let type_pos = TypePos(buf.get_u16());
        let dimensions = Vec::<Option<u32>>::decode(buf)?;
        ensure!(dimensions.len() == 1, errors::MultiDimensionalArray);
        Ok(ArrayTypeDescriptor {
            id,
            type_pos,
            dimensions,
        })
    }
}

impl Decode for EnumerationTypeDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 19, errors::Underflow);
        assert!(buf.get_u8() == CTYPE_ENUM);
        let id = Uuid::decode(buf)?.into();
        let members = Vec::<String>::decode(buf)?;
        Ok(EnumerationTypeDescriptor { id, members })
    }
}

impl Decode for TypeAnnotationDescriptor {
    fn decode(buf: &mut Input) -> Result<Self, DecodeError> {
        ensure!(buf.remaining() >= 21, errors::Underflow);
        let annotated_type = buf.get_u8();
        assert!(annotated_type >= 0x80);
        let id = Uuid::decode(buf)?.into();
        let annotation = String::decode(buf)?;
        Ok(TypeAnnotationDescriptor {
            annotated_type,
            id,
            annotation,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptors::{
        BaseScalarTypeDescriptor, Descriptor, DescriptorUuid, SetDescriptor, TypePos,
    };
    use uuid::Uuid;

    #[test]
    fn descriptor_uuid_debug_outputs() {
        let float_32: Uuid = "00000000-0000-0000-0000-000000000106".parse().unwrap();
        let descriptor_id = DescriptorUuid::from(float_32);
        assert_eq!(format!("{descriptor_id:?}"), "BaseScalar(float32)");

        let random_uuid: Uuid = "7cc7e050-ef76-4ae9-b8a6-053ca9baa3d5".parse().unwrap();
        let descriptor_id = DescriptorUuid::from(random_uuid);
        assert_eq!(
            format!("{descriptor_id:?}"),
            "7cc7e050-ef76-4ae9-b8a6-053ca9baa3d5"
        );

        let base_scalar = Descriptor::BaseScalar(BaseScalarTypeDescriptor {
            id: "00000000-0000-0000-0000-000000000106"
                .parse::<Uuid>()
                .unwrap()
                .into(),
        });
        assert_eq!(
            format!("{base_scalar:?}"),
            "BaseScalar(BaseScalarTypeDescriptor { id: BaseScalar(float32) })"
        );

        let set_descriptor_with_float32 = Descriptor::Set(SetDescriptor {
            id: "00000000-0000-0000-0000-000000000106"
                .parse::<Uuid>()
                .unwrap()
                .into(),
            type_pos: TypePos(0),
        });
        assert_eq!(
            format!("{set_descriptor_with_float32:?}"),
            "Set(SetDescriptor { id: BaseScalar(float32), type_pos: TypePos(0) })"
        );
    }
}

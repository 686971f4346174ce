/*!
The server side of the type descriptor codec.

[describe] walks a type and emits the descriptor frames a client needs to
decode result rows; [describe_params] bundles the query parameters into a
single virtual shape frame. Composite types are content-addressed: two
structurally equal types always serialize to the same id, and a type
referenced twice is emitted once and addressed by position afterwards.
*/

use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::OnceLock;

use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use snafu::{ensure, OptionExt};
use uuid::Uuid;

use crate::common::Cardinality;
use crate::descriptors::{
    CTYPE_ANNO_TYPENAME, CTYPE_ARRAY, CTYPE_BASE_SCALAR, CTYPE_ENUM, CTYPE_NAMEDTUPLE,
    CTYPE_SCALAR, CTYPE_SET, CTYPE_SHAPE, CTYPE_TUPLE,
};
use crate::descriptors::{EMPTY_TUPLE_ID, NULL_TYPE_ID, STD_STR, STD_UUID, TYPE_ID_NAMESPACE};
use crate::descriptors::PointerFlags;
use crate::encoding::{Encode, Output};
use crate::errors::{self, DescribeError};
use crate::features::ProtocolVersion;
use crate::schema::{ScalarType, Schema, Type, ViewShapes, ViewShapesMetadata};

/// Knobs of [describe] that apply to the outermost type only; recursion
/// into subtypes resets them to the defaults.
#[derive(Debug, Clone)]
pub struct DescribeOptions {
    /// Serialize singular link targets as full shapes. When disabled, the
    /// target is replaced by its `std::uuid` id.
    pub follow_links: bool,
    /// Append a type-name annotation frame for every scalar and enum.
    pub inline_typenames: bool,
    /// Keep only pointers whose short name starts with the filter and strip
    /// the prefix from the serialized name.
    pub name_filter: String,
}

impl Default for DescribeOptions {
    fn default() -> DescribeOptions {
        DescribeOptions {
            follow_links: true,
            inline_typenames: false,
            name_filter: String::new(),
        }
    }
}

/// A single query parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub required: bool,
}

/// Serialize a type into descriptor frames.
///
/// Returns the frame data (annotation frames appended after the proper
/// frames) and the content id of the root type.
pub fn describe(
    schema: &Schema,
    ty: &Type,
    view_shapes: &ViewShapes,
    view_shapes_metadata: &ViewShapesMetadata,
    protocol_version: &ProtocolVersion,
    options: &DescribeOptions,
) -> Result<(Bytes, Uuid), DescribeError> {
    let mut builder = TypedescBuilder::new(
        schema,
        view_shapes,
        view_shapes_metadata,
        protocol_version,
        options.inline_typenames,
    );
    let type_id = builder.describe_type(ty, options.follow_links, &options.name_filter)?;
    let mut out = builder.buffer;
    out.extend_from_slice(&builder.anno_buffer);
    Ok((out.freeze(), type_id))
}

/// Serialize the parameter list of a query as one virtual shape frame.
///
/// The shape id is derived from the serialized frames themselves, with the
/// id field zeroed, and is patched into the output afterwards. An empty
/// parameter list yields the null type descriptor.
pub fn describe_params(
    schema: &Schema,
    params: &[Param],
    protocol_version: &ProtocolVersion,
) -> Result<(Bytes, Uuid), DescribeError> {
    debug_assert!(protocol_version.is_at_least(0, 12));

    if params.is_empty() {
        return Ok((Bytes::new(), NULL_TYPE_ID));
    }

    let view_shapes = ViewShapes::new();
    let view_shapes_metadata = ViewShapesMetadata::new();
    let mut builder = TypedescBuilder::new(
        schema,
        &view_shapes,
        &view_shapes_metadata,
        protocol_version,
        false,
    );

    let mut params_buf = BytesMut::new();
    for param in params {
        let param_type_id = builder.describe_type(&param.ty, true, "")?;
        let type_pos = builder.pos_of(&param_type_id)?;
        let cardinality = if param.required {
            Cardinality::One
        } else {
            Cardinality::AtMostOne
        };

        let mut out = Output::new(protocol_version, &mut params_buf);
        out.put_u32(0); // flags
        out.put_u8(cardinality as u8);
        param.name.encode(&mut out)?;
        out.put_u16(type_pos);
    }

    let count = element_count(params.len())?;
    let children = builder.buffer;

    let mut full_params =
        BytesMut::with_capacity(children.len() + 19 + params_buf.len() + builder.anno_buffer.len());
    full_params.extend_from_slice(&children);
    full_params.put_u8(CTYPE_SHAPE);
    full_params.extend_from_slice(NULL_TYPE_ID.as_bytes()); // replaced with params_id below
    full_params.put_u16(count);
    full_params.extend_from_slice(&params_buf);
    full_params.extend_from_slice(&builder.anno_buffer);

    let params_id = uuid5(&TYPE_ID_NAMESPACE, &full_params);
    let id_pos = children.len() + 1;
    full_params[id_pos..id_pos + 16].copy_from_slice(params_id.as_bytes());

    Ok((full_params.freeze(), params_id))
}

/// The descriptor advertised for JSON-formatted output. Computed once per
/// process.
pub fn describe_json() -> Bytes {
    static JSON_DESC: OnceLock<Bytes> = OnceLock::new();
    JSON_DESC
        .get_or_init(|| {
            let mut buf = BytesMut::with_capacity(17);
            buf.put_u8(CTYPE_BASE_SCALAR);
            buf.extend_from_slice(STD_STR.as_bytes());
            buf.freeze()
        })
        .clone()
}

struct TypedescBuilder<'a> {
    schema: Schema,
    view_shapes: &'a ViewShapes,
    view_shapes_metadata: &'a ViewShapesMetadata,
    proto: &'a ProtocolVersion,
    inline_typenames: bool,
    buffer: BytesMut,
    anno_buffer: BytesMut,
    uuid_to_pos: HashMap<Uuid, u16>,
}

impl<'a> TypedescBuilder<'a> {
    fn new(
        schema: &Schema,
        view_shapes: &'a ViewShapes,
        view_shapes_metadata: &'a ViewShapesMetadata,
        proto: &'a ProtocolVersion,
        inline_typenames: bool,
    ) -> TypedescBuilder<'a> {
        TypedescBuilder {
            schema: schema.clone(),
            view_shapes,
            view_shapes_metadata,
            proto,
            inline_typenames,
            buffer: BytesMut::new(),
            anno_buffer: BytesMut::new(),
            uuid_to_pos: HashMap::new(),
        }
    }

    fn register_type_id(&mut self, type_id: Uuid) -> Result<(), DescribeError> {
        if !self.uuid_to_pos.contains_key(&type_id) {
            let pos = u16::try_from(self.uuid_to_pos.len())
                .ok()
                .context(errors::TooManyPositions)?;
            self.uuid_to_pos.insert(type_id, pos);
        }
        Ok(())
    }

    fn pos_of(&self, type_id: &Uuid) -> Result<u16, DescribeError> {
        self.uuid_to_pos
            .get(type_id)
            .copied()
            .context(errors::UnregisteredType { id: *type_id })
    }

    fn describe_set(&mut self, ty: &Type) -> Result<Uuid, DescribeError> {
        let type_id = self.describe_type(ty, true, "")?;
        let set_id = set_type_id(&type_id);
        if self.uuid_to_pos.contains_key(&set_id) {
            return Ok(set_id);
        }

        let type_pos = self.pos_of(&type_id)?;
        let mut out = Output::new(self.proto, &mut self.buffer);
        out.put_u8(CTYPE_SET);
        set_id.encode(&mut out)?;
        out.put_u16(type_pos);

        self.register_type_id(set_id)?;
        Ok(set_id)
    }

    fn describe_type(
        &mut self,
        ty: &Type,
        follow_links: bool,
        name_filter: &str,
    ) -> Result<Uuid, DescribeError> {
        match ty {
            Type::Tuple(tuple) => {
                let mut subtypes = Vec::with_capacity(tuple.elements.len());
                for subtype in &tuple.elements {
                    subtypes.push(self.describe_type(subtype, true, "")?);
                }

                let type_id = if let Some(element_names) = &tuple.element_names {
                    debug_assert_eq!(element_names.len(), subtypes.len());

                    let type_id =
                        collection_type_id(ty.schema_name(), &subtypes, Some(element_names.as_slice()));
                    if self.uuid_to_pos.contains_key(&type_id) {
                        return Ok(type_id);
                    }

                    let count = element_count(subtypes.len())?;
                    let mut positions = Vec::with_capacity(subtypes.len());
                    for subtype in &subtypes {
                        positions.push(self.pos_of(subtype)?);
                    }

                    let mut out = Output::new(self.proto, &mut self.buffer);
                    out.put_u8(CTYPE_NAMEDTUPLE);
                    type_id.encode(&mut out)?;
                    out.put_u16(count);
                    for (el_name, el_pos) in element_names.iter().zip(&positions) {
                        el_name.encode(&mut out)?;
                        out.put_u16(*el_pos);
                    }
                    type_id
                } else {
                    let type_id = collection_type_id(ty.schema_name(), &subtypes, None);
                    if self.uuid_to_pos.contains_key(&type_id) {
                        return Ok(type_id);
                    }

                    let count = element_count(subtypes.len())?;
                    let mut positions = Vec::with_capacity(subtypes.len());
                    for subtype in &subtypes {
                        positions.push(self.pos_of(subtype)?);
                    }

                    let mut out = Output::new(self.proto, &mut self.buffer);
                    out.put_u8(CTYPE_TUPLE);
                    type_id.encode(&mut out)?;
                    out.put_u16(count);
                    for el_pos in &positions {
                        out.put_u16(*el_pos);
                    }
                    type_id
                };

                self.register_type_id(type_id)?;
                Ok(type_id)
            }

            Type::Array(array) => {
                let subtype_id = self.describe_type(&array.element, true, "")?;
                let type_id = collection_type_id(ty.schema_name(), &[subtype_id], None);
                if self.uuid_to_pos.contains_key(&type_id) {
                    return Ok(type_id);
                }

                let element_pos = self.pos_of(&subtype_id)?;
                let mut out = Output::new(self.proto, &mut self.buffer);
                out.put_u8(CTYPE_ARRAY);
                type_id.encode(&mut out)?;
                out.put_u16(element_pos);
                // Number of dimensions (currently always 1)
                out.put_u16(1);
                // Dimension cardinality (currently always unbound)
                out.put_i32(-1);

                self.register_type_id(type_id)?;
                Ok(type_id)
            }

            Type::Range(range) => errors::UnsupportedCollection {
                name: range.name.clone(),
            }
            .fail(),

            Type::Object(object) => {
                let (schema, mt) = object.material_type(&self.schema);
                self.schema = schema;
                let base_type_id = mt.id;

                let implicit_id = self
                    .view_shapes_metadata
                    .get(&object.id)
                    .map_or(false, |metadata| metadata.has_implicit_id);

                let mut subtypes = Vec::new();
                let mut element_names: Vec<String> = Vec::new();
                let mut link_props = Vec::new();
                let mut links = Vec::new();
                let mut cardinalities = Vec::new();

                let view_shapes = self.view_shapes;
                for ptr in view_shapes.get(&object.id).map(|v| &v[..]).unwrap_or(&[]) {
                    let name = match ptr.name.strip_prefix(name_filter) {
                        Some(name) => name,
                        None => continue,
                    };
                    let subtype_id = if ptr.singular() {
                        if ptr.is_link() && !follow_links {
                            let uuid_type = self.schema.get("std::uuid")?.clone();
                            self.describe_type(&uuid_type, true, "")?
                        } else {
                            let target = ptr.target.clone();
                            self.describe_type(&target, true, "")?
                        }
                    } else {
                        if ptr.is_link() && !follow_links {
                            return errors::MultiLinkWithoutFollow.fail();
                        }
                        let target = ptr.target.clone();
                        self.describe_set(&target)?
                    };
                    subtypes.push(subtype_id);
                    element_names.push(name.to_string());
                    link_props.push(false);
                    links.push(!ptr.is_property());
                    cardinalities.push(Cardinality::from_pointer(ptr.required, ptr.multi));
                }

                if let Some(rptr) = &object.rptr {
                    if let Some(rptr_ptrs) = view_shapes.get(&rptr.id) {
                        // There are link properties in the mix
                        for ptr in rptr_ptrs {
                            let target = ptr.target.clone();
                            let subtype_id = if ptr.singular() {
                                self.describe_type(&target, true, "")?
                            } else {
                                self.describe_set(&target)?
                            };
                            subtypes.push(subtype_id);
                            element_names.push(ptr.name.clone());
                            link_props.push(true);
                            links.push(false);
                            cardinalities.push(Cardinality::from_pointer(ptr.required, ptr.multi));
                        }
                    }
                }

                let type_id = object_type_id(
                    &base_type_id,
                    &subtypes,
                    &element_names,
                    &link_props,
                    &links,
                    implicit_id,
                );
                if self.uuid_to_pos.contains_key(&type_id) {
                    return Ok(type_id);
                }

                debug_assert_eq!(subtypes.len(), element_names.len());
                let count = element_count(subtypes.len())?;
                let mut positions = Vec::with_capacity(subtypes.len());
                for subtype in &subtypes {
                    positions.push(self.pos_of(subtype)?);
                }

                let mut out = Output::new(self.proto, &mut self.buffer);
                out.put_u8(CTYPE_SHAPE);
                type_id.encode(&mut out)?;
                out.put_u16(count);

                for (i, el_name) in element_names.iter().enumerate() {
                    let el_name = el_name.as_str();
                    let mut flags = PointerFlags::empty();
                    if link_props[i] {
                        flags |= PointerFlags::LINK_PROPERTY;
                    }
                    if (implicit_id && el_name == "id") || el_name == "__tid__" {
                        ensure!(
                            subtypes[i] == STD_UUID,
                            errors::UnexpectedImplicitFieldType {
                                name: el_name,
                                expected: "std::uuid",
                            }
                        );
                        flags |= PointerFlags::IMPLICIT;
                    } else if el_name == "__tname__" {
                        ensure!(
                            subtypes[i] == STD_STR,
                            errors::UnexpectedImplicitFieldType {
                                name: el_name,
                                expected: "std::str",
                            }
                        );
                        flags |= PointerFlags::IMPLICIT;
                    }
                    if links[i] {
                        flags |= PointerFlags::LINK;
                    }

                    if out.proto().is_at_least(0, 11) {
                        out.put_u32(flags.bits());
                        out.put_u8(cardinalities[i] as u8);
                    } else {
                        out.put_u8(flags.bits() as u8);
                    }
                    el_name.encode(&mut out)?;
                    out.put_u16(positions[i]);
                }

                self.register_type_id(type_id)?;
                Ok(type_id)
            }

            Type::Scalar(scalar) => {
                let (schema, mt) = scalar.material_type(&self.schema);
                self.schema = schema;
                let type_id = mt.id;
                if self.uuid_to_pos.contains_key(&type_id) {
                    // already described
                    return Ok(type_id);
                }

                if !mt.enum_values.is_empty() {
                    let count = element_count(mt.enum_values.len())?;
                    let mut out = Output::new(self.proto, &mut self.buffer);
                    out.put_u8(CTYPE_ENUM);
                    type_id.encode(&mut out)?;
                    out.put_u16(count);
                    for enum_value in &mt.enum_values {
                        enum_value.encode(&mut out)?;
                    }

                    if self.inline_typenames {
                        self.add_annotation(&mt)?;
                    }
                } else if let Some(base_type) = mt.base.clone() {
                    let base_type_id = self.describe_type(&Type::Scalar(base_type), true, "")?;
                    let base_pos = self.pos_of(&base_type_id)?;

                    let mut out = Output::new(self.proto, &mut self.buffer);
                    out.put_u8(CTYPE_SCALAR);
                    type_id.encode(&mut out)?;
                    out.put_u16(base_pos);

                    if self.inline_typenames {
                        self.add_annotation(&mt)?;
                    }
                } else {
                    let mut out = Output::new(self.proto, &mut self.buffer);
                    out.put_u8(CTYPE_BASE_SCALAR);
                    type_id.encode(&mut out)?;
                }

                self.register_type_id(type_id)?;
                Ok(type_id)
            }

            Type::Pseudo(pseudo) => errors::CannotDescribeType {
                name: pseudo.name.clone(),
            }
            .fail(),
        }
    }

    fn add_annotation(&mut self, ty: &ScalarType) -> Result<(), DescribeError> {
        let mut out = Output::new(self.proto, &mut self.anno_buffer);
        out.put_u8(CTYPE_ANNO_TYPENAME);
        ty.id.encode(&mut out)?;
        ty.name.encode(&mut out)?;
        Ok(())
    }
}

/// Derive a content id from the namespace and a canonical name.
///
/// The 20-byte SHA-1 is truncated to 16 bytes as is; the RFC 4122 version
/// and variant bits are not patched in. Ids already baked into deployed
/// clients depend on the raw form.
fn uuid5(namespace: &Uuid, name: &[u8]) -> Uuid {
    let digest = Sha1::new_with_prefix(namespace.as_bytes())
        .chain_update(name)
        .finalize();
    let mut id = [0u8; 16];
    id.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(id)
}

fn collection_type_id(
    schema_name: &str,
    subtypes: &[Uuid],
    element_names: Option<&[String]>,
) -> Uuid {
    if schema_name == "tuple" && subtypes.is_empty() {
        return EMPTY_TUPLE_ID;
    }

    let mut string_id = format!("{}\x00{}", schema_name, join_ids(subtypes));
    if let Some(element_names) = element_names {
        string_id.push('\x00');
        string_id.push_str(&element_names.join(":"));
    }
    uuid5(&TYPE_ID_NAMESPACE, string_id.as_bytes())
}

fn object_type_id(
    base_type_id: &Uuid,
    subtypes: &[Uuid],
    element_names: &[String],
    link_props: &[bool],
    links: &[bool],
    has_implicit_fields: bool,
) -> Uuid {
    let mut string_id = format!("{}\x00{}", base_type_id, join_ids(subtypes));
    if !element_names.is_empty() {
        string_id.push('\x00');
        string_id.push_str(&element_names.join(":"));
    }
    // The flag lists are rendered as Python reprs; the exact text seeds the
    // id derivation and cannot change.
    string_id.push_str(py_bool(has_implicit_fields));
    string_id.push(';');
    string_id.push_str(&py_bool_list(link_props));
    string_id.push(';');
    string_id.push_str(&py_bool_list(links));
    uuid5(&TYPE_ID_NAMESPACE, string_id.as_bytes())
}

fn set_type_id(base_type_id: &Uuid) -> Uuid {
    uuid5(
        &TYPE_ID_NAMESPACE,
        format!("set-of::{}", base_type_id).as_bytes(),
    )
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn py_bool_list(values: &[bool]) -> String {
    let mut repr = String::from("[");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            repr.push_str(", ");
        }
        repr.push_str(py_bool(*value));
    }
    repr.push(']');
    repr
}

fn element_count(len: usize) -> Result<u16, DescribeError> {
    u16::try_from(len).ok().context(errors::TooManyElements)
}

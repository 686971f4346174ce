use std::str;

use snafu::{Backtrace, Snafu};
use uuid;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
#[non_exhaustive]
pub enum DecodeError {
    #[snafu(display("unexpected end of frame"))]
    Underflow { backtrace: Backtrace },
    #[snafu(display("invalid utf8 when decoding string: {}", source))]
    InvalidUtf8 {
        backtrace: Backtrace,
        source: str::Utf8Error,
    },
    #[snafu(display("unsupported cardinality: {:x}", cardinality))]
    InvalidCardinality {
        backtrace: Backtrace,
        cardinality: u8,
    },
    #[snafu(display("unsupported type descriptor: {:x}", descriptor))]
    InvalidTypeDescriptor {
        backtrace: Backtrace,
        descriptor: u8,
    },
    #[snafu(display("invalid uuid: {}", source))]
    InvalidUuid {
        backtrace: Backtrace,
        source: uuid::Error,
    },
    #[snafu(display("array shape is invalid"))]
    InvalidArrayShape { backtrace: Backtrace },
    #[snafu(display("cannot handle arrays with more than one dimension"))]
    MultiDimensionalArray { backtrace: Backtrace },
    #[snafu(display("type position {} is absent", position))]
    UnexpectedTypePos { backtrace: Backtrace, position: u16 },
    #[snafu(display("too many descriptors ({})", index))]
    TooManyDescriptors { backtrace: Backtrace, index: usize },
    #[snafu(display("could not parse type descriptor"))]
    EmptyTypedesc { backtrace: Backtrace },
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
#[non_exhaustive]
pub enum EncodeError {
    #[snafu(display("string doesn't fit 4GiB"))]
    StringTooLong { backtrace: Backtrace },
}

/// Errors of the server-side descriptor builder.
///
/// `UnsupportedCollection` and `TypeNotFound` are schema errors the caller
/// can fix; the remaining variants are contract violations between the
/// compiler and the codec.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
#[non_exhaustive]
pub enum DescribeError {
    #[snafu(display("unsupported collection type {}", name))]
    UnsupportedCollection { backtrace: Backtrace, name: String },
    #[snafu(display("type {} is not present in the schema", name))]
    TypeNotFound { backtrace: Backtrace, name: String },
    #[snafu(display("cannot describe type {}", name))]
    CannotDescribeType { backtrace: Backtrace, name: String },
    #[snafu(display("{:?} is expected to be a {} singleton", name, expected))]
    UnexpectedImplicitFieldType {
        backtrace: Backtrace,
        name: String,
        expected: &'static str,
    },
    #[snafu(display("cannot describe multi links when follow_links=false"))]
    MultiLinkWithoutFollow { backtrace: Backtrace },
    #[snafu(display("type {} has no registered descriptor", id))]
    UnregisteredType {
        backtrace: Backtrace,
        id: uuid::Uuid,
    },
    #[snafu(display("more than 64Ki descriptors"))]
    TooManyPositions { backtrace: Backtrace },
    #[snafu(display("more than 64Ki elements in a composite frame"))]
    TooManyElements { backtrace: Backtrace },
    #[snafu(context(false))]
    #[snafu(display("cannot encode descriptor frame: {}", source))]
    FrameEncode {
        backtrace: Backtrace,
        source: EncodeError,
    },
}

/*!
Wire-level enums shared by both halves of the protocol.
*/

use std::convert::TryFrom;

use crate::errors::{self, DecodeError};

/// Cardinality of a query result or of a single shape pointer.
///
/// The discriminants are the on-wire byte values.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Cardinality {
    NoResult = 0x6e,
    AtMostOne = 0x6f,
    One = 0x41,
    Many = 0x6d,
    AtLeastOne = 0x4d,
}

impl TryFrom<u8> for Cardinality {
    type Error = DecodeError;
    fn try_from(cardinality: u8) -> Result<Cardinality, DecodeError> {
        match cardinality {
            0x6e => Ok(Cardinality::NoResult),
            0x6f => Ok(Cardinality::AtMostOne),
            0x41 => Ok(Cardinality::One),
            0x6d => Ok(Cardinality::Many),
            0x4d => Ok(Cardinality::AtLeastOne),
            _ => errors::InvalidCardinality { cardinality }.fail(),
        }
    }
}

impl Cardinality {
    /// Cardinality of a shape pointer derived from its `(required, multi)`
    /// pair.
    pub fn from_pointer(required: bool, multi: bool) -> Cardinality {
        match (required, multi) {
            (false, false) => Cardinality::AtMostOne,
            (true, false) => Cardinality::One,
            (false, true) => Cardinality::Many,
            (true, true) => Cardinality::AtLeastOne,
        }
    }
    pub fn is_multi(&self) -> bool {
        matches!(self, Cardinality::Many | Cardinality::AtLeastOne)
    }
}

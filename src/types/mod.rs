//! Closed type system for stored variables.
//!
//! [`registry`] holds the static descriptor table, [`value`] the container
//! whose setters are checked against it.

pub mod registry;
pub mod value;

pub use registry::{
    lookup_type, lookup_type_by_name, types, FloatWidth, IntWidth, TypeClass, TypeDesc,
    TypeFlags, NULL_TYPE_ID,
};
pub use value::{Value, DEFAULT_VALUE_LENGTH};

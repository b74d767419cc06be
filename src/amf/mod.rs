//! AMF0 value model and codec
//!
//! The RTMP command surface is carried as flat sequences of AMF0 values;
//! the rest of the crate treats this module as its (de)serialization
//! primitive and never touches markers directly.

pub mod amf0;
pub mod value;

pub use amf0::{decode_sequence, encode_sequence};
pub use value::AmfValue;

//! Core sdkit types.
pub mod bytes_buf;
pub use bytes_buf::BytesBuf;

pub mod json_pointer;
pub use json_pointer::{InvalidJsonPointer, JsonPointer, JsonPointerBuf, ReferenceToken};

//! Self-describing binary value codec.
//!
//! A [`Value`] is written as a preorder walk where every element starts with
//! a 4-byte native-order [`Marker`]. File descriptors never appear inline:
//! the encoder moves them into an out-of-band list and writes their index,
//! and the decoder moves them back into the value.

pub mod codec;
pub mod error;
pub mod marker;
pub mod value;

pub use codec::{decode, encode};
pub use error::{CodecError, Result};
pub use marker::Marker;
pub use value::Value;

pub use ipcwire_transport::Fd;

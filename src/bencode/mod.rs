//! Bencode codec
//!
//! Bencode is the serialization format of `.torrent` files and tracker
//! responses:
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Byte string | `<length>:<bytes>` | `4:spam` |
//! | Integer | `i<digits>e` | `i-42e` |
//! | List | `l<values>e` | `l4:spami42ee` |
//! | Dictionary | `d<key><value>...e` | `d3:cow3:mooe` |
//!
//! Encoding is canonical: dictionary keys are emitted in ascending raw byte
//! order at every depth, so the same value always produces the same bytes.

pub mod decode;
pub mod encode;
pub mod value;

pub use decode::{decode, decode_at, MAX_DEPTH};
pub use encode::{encode, encode_into};
pub use value::Value;

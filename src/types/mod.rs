//! Core types for telemetry value representation and binary decoding.
//!
//! ## Architecture
//!
//! - [`PrimitiveType`] is derived once from a canonical type name such as
//!   `MSB_U16`, `LSB_F32`, `S8` or `U8`
//! - [`ArrayType`] repeats one primitive `count` times with no padding
//! - [`TimeKind`] covers the relative TIME8 and absolute TIME32/TIME64 encodings
//! - [`TypeSpec`] is the resolved decode strategy a field carries
//! - [`TypeRegistry`] resolves names and decodes, resolving command and event
//!   codes through its side dictionaries
//! - [`Value`] is what every decoder and the expression evaluator produce
//! - [`Counter`] is the 31-bit wrapping sequence number used by the sync protocol
//!
//! Every decoder fails closed: a read that would run past the end of the
//! buffer yields `None`, never a zero.
//!
//! ## Usage Example
//!
//! ```rust
//! use downlink::types::{TypeRegistry, Value};
//!
//! let registry = TypeRegistry::new();
//! let spec = registry.resolve("MSB_U16").unwrap();
//! assert_eq!(registry.decode(&spec, &[0x01, 0x02], 0), Some(Value::UInt(258)));
//! assert_eq!(registry.decode(&spec, &[0x01], 0), None);
//! ```

mod complex;
mod counter;
mod primitive;
mod registry;
mod value;

pub use complex::{
    ArrayType, GPS_EPOCH_MILLIS, TimeKind, gps_decimal_seconds_to_utc, gps_seconds_to_utc,
};
pub use counter::Counter;
pub use primitive::{Endianness, PrimitiveType};
pub use registry::{TypeRegistry, TypeSpec};
pub use value::{CommandRef, EventRef, FieldValues, Value};

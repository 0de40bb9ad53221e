// ABOUTME: Core library for fanlog, containing the log record model and the entity codec.
// ABOUTME: This crate defines the shared data model used by the store and the dispatcher.

pub mod codec;
pub mod record;

pub use codec::{
    CodecLimits, MIN_PROPERTY_UNITS, Properties, TooLarge, decode, encode, encode_fallback,
    try_encode,
};
pub use record::{CORRUPTED_KIND, LogRecord, OVERSIZE_KIND, machine_name};

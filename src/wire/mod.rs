//! The mDNS/DNS wire format: encoding and decoding of [`types::Message`]
//! and its constituent parts, per RFC 1035 with the RFC 6762
//! mDNS-specific top-bit flags.

pub mod deserialise;
pub mod name;
pub mod serialise;
pub mod types;

pub use types::{ClassCode, Header, Message, Opcode, Question, Rcode, Rdata, ResourceRecord, TypeCode};

//! In-memory representation of DNS/mDNS messages.
//!
//! See the `name`, `serialise`, and `deserialise` modules for how these
//! types get to and from the wire.

use std::collections::BTreeSet;

/// Basic DNS message format, used for both queries and responses.
///
/// ```text
///     +---------------------+
///     |        Header       |
///     +---------------------+
///     |       Question      | the question for the name server
///     +---------------------+
///     |        Answer       | RRs answering the question
///     +---------------------+
///     |      Authority      | RRs pointing toward an authority
///     +---------------------+
///     |      Additional     | RRs holding additional information
///     +---------------------+
/// ```
///
/// See section 4.1 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Message {
    /// A header-only message with empty sections, useful as a base for
    /// building an outgoing query.
    pub fn empty(id: u16) -> Self {
        Message {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: false,
                rcode: Rcode::NoError,
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }
}

/// Common header type for all messages.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// `qdcount`/`ancount`/`nscount`/`arcount` are overwritten with the
/// actual section lengths on encode; on decode they drive how many
/// records are parsed out of each section.
///
/// See section 4.1.1 of RFC 1035.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Header {
    pub id: u16,
    pub is_response: bool,
    pub opcode: Opcode,
    pub is_authoritative: bool,
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: Rcode,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

/// What sort of query this is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            other => Opcode::Reserved(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Reserved(other) => other,
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Opcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u8>()? & 0b1111))
    }
}

/// What sort of response this is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Reserved(u8),
}

impl From<u8> for Rcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Reserved(other),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Reserved(other) => other,
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Rcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u8>()? & 0b1111))
    }
}

/// A DNS/mDNS record type, as carried in `QTYPE`/`TYPE` wire fields.
///
/// An `Unknown` variant rather than a rejected decode means any value
/// round-trips losslessly, which matters for records this library
/// doesn't interpret but must still be able to pass through or
/// re-encode unchanged.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TypeCode {
    A,
    NS,
    CNAME,
    PTR,
    TXT,
    AAAA,
    SRV,
    NSEC,
    ANY,
    Unknown(u16),
}

impl TypeCode {
    pub fn to_int(self) -> u16 {
        match self {
            TypeCode::A => 1,
            TypeCode::NS => 2,
            TypeCode::CNAME => 5,
            TypeCode::PTR => 12,
            TypeCode::TXT => 16,
            TypeCode::AAAA => 28,
            TypeCode::SRV => 33,
            TypeCode::NSEC => 47,
            TypeCode::ANY => 255,
            TypeCode::Unknown(value) => value,
        }
    }

    pub fn from_int(value: u16) -> Self {
        match value {
            1 => TypeCode::A,
            2 => TypeCode::NS,
            5 => TypeCode::CNAME,
            12 => TypeCode::PTR,
            16 => TypeCode::TXT,
            28 => TypeCode::AAAA,
            33 => TypeCode::SRV,
            47 => TypeCode::NSEC,
            255 => TypeCode::ANY,
            other => TypeCode::Unknown(other),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for TypeCode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from_int(u.arbitrary()?))
    }
}

/// A DNS/mDNS record class, as carried in `QCLASS`/`CLASS` wire fields
/// (with the mDNS top bit already stripped — see [`Question`] and
/// [`ResourceRecord`]).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ClassCode {
    IN,
    ANY,
    Unknown(u16),
}

impl ClassCode {
    pub fn to_int(self) -> u16 {
        match self {
            ClassCode::IN => 1,
            ClassCode::ANY => 255,
            ClassCode::Unknown(value) => value,
        }
    }

    pub fn from_int(value: u16) -> Self {
        match value {
            1 => ClassCode::IN,
            255 => ClassCode::ANY,
            other => ClassCode::Unknown(other),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for ClassCode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from_int(u.arbitrary()?))
    }
}

/// The question section has a list of questions (usually 1 but
/// possibly more) being asked.
///
/// See section 4.1.2 of RFC 1035, and RFC 6762 section 18.12 for the
/// mDNS-specific "unicast response requested" bit.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Question {
    pub name: String,
    pub qtype: TypeCode,
    pub qclass: ClassCode,
    /// The top bit of the wire `QCLASS` field: the querier is willing
    /// to accept a direct unicast reply instead of a multicast one.
    pub unicast_response: bool,
}

/// The answer, authority, and additional sections are all the same
/// format: a variable number of resource records.
///
/// See section 4.1.3 of RFC 1035, and RFC 6762 section 10.2 for the
/// mDNS-specific "cache flush" bit.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct ResourceRecord {
    pub name: String,
    pub rclass: ClassCode,
    /// The top bit of the wire `CLASS` field: the receiver should
    /// drop all prior cached records under this record's key before
    /// inserting this one.
    pub cache_flush: bool,
    /// Time interval, in seconds, the record may be cached before it
    /// should be discarded. `ttl == 0` announces that the record is no
    /// longer valid (a "goodbye" record).
    pub ttl: u32,
    pub rdata: Rdata,
}

impl ResourceRecord {
    pub fn rtype(&self) -> TypeCode {
        self.rdata.rtype()
    }
}

/// Record data, tagged by type. An `Unknown` variant carries opaque
/// bytes through unchanged for any type this library doesn't
/// interpret.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub enum Rdata {
    A {
        address: (u8, u8, u8, u8),
    },
    AAAA {
        address: (u16, u16, u16, u16, u16, u16, u16, u16),
    },
    CNAME {
        name: String,
    },
    PTR {
        name: String,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    TXT {
        strings: Vec<Vec<u8>>,
    },
    NSEC {
        next_name: String,
        types: BTreeSet<TypeCode>,
    },
    Unknown {
        rtype: u16,
        octets: Vec<u8>,
    },
}

impl Rdata {
    pub fn rtype(&self) -> TypeCode {
        match self {
            Rdata::A { .. } => TypeCode::A,
            Rdata::AAAA { .. } => TypeCode::AAAA,
            Rdata::CNAME { .. } => TypeCode::CNAME,
            Rdata::PTR { .. } => TypeCode::PTR,
            Rdata::SRV { .. } => TypeCode::SRV,
            Rdata::TXT { .. } => TypeCode::TXT,
            Rdata::NSEC { .. } => TypeCode::NSEC,
            Rdata::Unknown { rtype, .. } => TypeCode::Unknown(*rtype),
        }
    }
}

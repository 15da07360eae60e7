//! Decoding of wire-format bytes into [`Message`] values.

use std::collections::BTreeSet;

use super::name;
use super::types::*;
use crate::error::WireError;

/// A cursor over a full message buffer. Holds the whole buffer (not
/// just the unread tail) because name decompression needs to jump
/// backwards to arbitrary earlier offsets.
struct Reader<'a> {
    message: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(message: &'a [u8]) -> Self {
        Reader { message, pos: 0 }
    }

    fn require(&self, len: usize) -> Result<(), WireError> {
        if self.pos + len > self.message.len() {
            Err(WireError::InsufficientData { at: self.pos })
        } else {
            Ok(())
        }
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        self.require(1)?;
        let value = self.message[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        self.require(2)?;
        let value = u16::from_be_bytes([self.message[self.pos], self.message[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        self.require(4)?;
        let value = u32::from_be_bytes([
            self.message[self.pos],
            self.message[self.pos + 1],
            self.message[self.pos + 2],
            self.message[self.pos + 3],
        ]);
        self.pos += 4;
        Ok(value)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.require(len)?;
        let slice = &self.message[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_name(&mut self) -> Result<String, WireError> {
        let (decoded, advance) = name::decode(self.message, self.pos)?;
        self.pos += advance;
        Ok(decoded)
    }
}

impl Message {
    /// Decode a message from the front of `input`. Returns the message
    /// and any trailing bytes left unconsumed.
    pub fn decode(input: &[u8]) -> Result<(Message, &[u8]), WireError> {
        if input.len() < 12 {
            return Err(WireError::InsufficientData { at: input.len() });
        }

        let mut reader = Reader::new(input);
        let header = Header::read(&mut reader)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            questions.push(Question::read(&mut reader)?);
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            answers.push(ResourceRecord::read(&mut reader)?);
        }

        let mut authority = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            authority.push(ResourceRecord::read(&mut reader)?);
        }

        let mut additional = Vec::with_capacity(header.arcount as usize);
        for _ in 0..header.arcount {
            additional.push(ResourceRecord::read(&mut reader)?);
        }

        let message = Message {
            header,
            questions,
            answers,
            authority,
            additional,
        };
        Ok((message, &input[reader.pos..]))
    }
}

impl Header {
    fn read(reader: &mut Reader) -> Result<Header, WireError> {
        let id = reader.read_u16()?;
        let flags1 = reader.read_u8()?;
        let flags2 = reader.read_u8()?;
        let qdcount = reader.read_u16()?;
        let ancount = reader.read_u16()?;
        let nscount = reader.read_u16()?;
        let arcount = reader.read_u16()?;

        Ok(Header {
            id,
            is_response: flags1 & 0b1000_0000 != 0,
            opcode: Opcode::from((flags1 & 0b0111_1000) >> 3),
            is_authoritative: flags1 & 0b0000_0100 != 0,
            is_truncated: flags1 & 0b0000_0010 != 0,
            recursion_desired: flags1 & 0b0000_0001 != 0,
            recursion_available: flags2 & 0b1000_0000 != 0,
            rcode: Rcode::from(flags2 & 0b0000_1111),
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    fn read(reader: &mut Reader) -> Result<Question, WireError> {
        let name = reader.read_name()?;
        let qtype = TypeCode::from_int(reader.read_u16()?);
        let raw_class = reader.read_u16()?;
        Ok(Question {
            name,
            qtype,
            qclass: ClassCode::from_int(raw_class & 0x7FFF),
            unicast_response: raw_class & 0x8000 != 0,
        })
    }
}

impl ResourceRecord {
    fn read(reader: &mut Reader) -> Result<ResourceRecord, WireError> {
        let name = reader.read_name()?;
        let rtype = TypeCode::from_int(reader.read_u16()?);
        let raw_class = reader.read_u16()?;
        let ttl = reader.read_u32()?;
        let rdlength = reader.read_u16()? as usize;

        let rdata_start = reader.pos;
        let rdata_end = rdata_start + rdlength;
        reader.require(rdlength)?;

        let rdata = Rdata::read(reader, rtype, rdata_start, rdata_end)?;

        // RDLENGTH is authoritative regardless of how many bytes the
        // rdata decoder actually consumed (name compression can make
        // that shorter than the window).
        reader.pos = rdata_end;

        Ok(ResourceRecord {
            name,
            rclass: ClassCode::from_int(raw_class & 0x7FFF),
            cache_flush: raw_class & 0x8000 != 0,
            ttl,
            rdata,
        })
    }
}

impl Rdata {
    fn read(
        reader: &mut Reader,
        rtype: TypeCode,
        rdata_start: usize,
        rdata_end: usize,
    ) -> Result<Rdata, WireError> {
        match rtype {
            TypeCode::A => {
                let bytes = reader.read_slice(4)?;
                Ok(Rdata::A {
                    address: (bytes[0], bytes[1], bytes[2], bytes[3]),
                })
            }
            TypeCode::AAAA => {
                let bytes = reader.read_slice(16)?;
                let group = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
                Ok(Rdata::AAAA {
                    address: (
                        group(0),
                        group(2),
                        group(4),
                        group(6),
                        group(8),
                        group(10),
                        group(12),
                        group(14),
                    ),
                })
            }
            TypeCode::CNAME => Ok(Rdata::CNAME {
                name: reader.read_name()?,
            }),
            TypeCode::PTR => Ok(Rdata::PTR {
                name: reader.read_name()?,
            }),
            TypeCode::SRV => {
                let priority = reader.read_u16()?;
                let weight = reader.read_u16()?;
                let port = reader.read_u16()?;
                let target = reader.read_name()?;
                Ok(Rdata::SRV {
                    priority,
                    weight,
                    port,
                    target,
                })
            }
            TypeCode::TXT => {
                let mut strings = Vec::new();
                while reader.pos < rdata_end {
                    let len = reader.read_u8()? as usize;
                    let bytes = reader.read_slice(len)?;
                    strings.push(bytes.to_vec());
                }
                Ok(Rdata::TXT { strings })
            }
            TypeCode::NSEC => {
                let next_name = reader.read_name()?;
                let mut types = BTreeSet::new();
                while reader.pos < rdata_end {
                    let block = reader.read_u8()? as u16;
                    let bitmap_len = reader.read_u8()? as usize;
                    let bitmap = reader.read_slice(bitmap_len)?;
                    for (byte_index, byte) in bitmap.iter().enumerate() {
                        for bit_index in 0..8u16 {
                            if byte & (1 << (7 - bit_index)) != 0 {
                                let value = block * 256 + (byte_index as u16) * 8 + bit_index;
                                types.insert(TypeCode::from_int(value));
                            }
                        }
                    }
                }
                Ok(Rdata::NSEC { next_name, types })
            }
            // NS has no dedicated Rdata variant (mDNS senders don't emit
            // it); pass it through opaque like any other uninterpreted type.
            TypeCode::NS | TypeCode::ANY | TypeCode::Unknown(_) => {
                let len = rdata_end - rdata_start;
                let octets = reader.read_slice(len)?.to_vec();
                Ok(Rdata::Unknown {
                    rtype: rtype.to_int(),
                    octets,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::serialise::Writer;

    #[test]
    fn decode_a_record_question() {
        let bytes = [
            0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d, 0x00, 0x00,
            0x01, 0x00, 0x01,
        ];
        let mut reader = Reader::new(&bytes);
        let question = Question::read(&mut reader).unwrap();
        assert_eq!(question.name, "example.com");
        assert_eq!(question.qtype, TypeCode::A);
        assert_eq!(question.qclass, ClassCode::IN);
        assert!(!question.unicast_response);
    }

    #[test]
    fn decode_compressed_name_at_offset() {
        let message = [
            0x03, b'c', b'o', b'm', 0x00, // offset 0
            0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0xC0, 0x00, // offset 5
        ];
        let mut reader = Reader::new(&message);
        reader.pos = 5;
        let name = reader.read_name().unwrap();
        assert_eq!(name, "example.com");
        assert_eq!(reader.pos, message.len());
    }

    #[test]
    fn message_round_trip_preserves_every_field() {
        let mut message = Message::empty(9999);
        message.header.is_response = true;
        message.header.is_authoritative = true;
        message.questions.push(Question {
            name: "_http._tcp.local".to_string(),
            qtype: TypeCode::PTR,
            qclass: ClassCode::IN,
            unicast_response: false,
        });
        message.answers.push(ResourceRecord {
            name: "_http._tcp.local".to_string(),
            rclass: ClassCode::IN,
            cache_flush: false,
            ttl: 4500,
            rdata: Rdata::PTR {
                name: "printer._http._tcp.local".to_string(),
            },
        });
        message.authority.push(ResourceRecord {
            name: "local".to_string(),
            rclass: ClassCode::IN,
            cache_flush: false,
            ttl: 4500,
            rdata: Rdata::CNAME {
                name: "example.local".to_string(),
            },
        });
        message.additional.push(ResourceRecord {
            name: "printer.local".to_string(),
            rclass: ClassCode::IN,
            cache_flush: true,
            ttl: 120,
            rdata: Rdata::A {
                address: (192, 168, 1, 50),
            },
        });

        let encoded = message.encode();
        let (decoded, trailing) = Message::decode(&encoded).unwrap();
        assert!(trailing.is_empty());
        assert_eq!(decoded, message);
    }

    #[test]
    fn rdlength_bounds_unknown_rdata() {
        let mut writer = Writer::default();
        // Hand-build a resource record with an unknown type so the
        // decoder must rely solely on RDLENGTH.
        writer.write_name("example.com");
        writer.write_u16(999); // unknown type
        writer.write_u16(1); // IN, no flush bit
        writer.write_u32(60);
        writer.write_u16(3);
        writer.write_octets(&[0xAA, 0xBB, 0xCC]);

        let mut reader = Reader::new(&writer.octets);
        let rr = ResourceRecord::read(&mut reader).unwrap();
        assert_eq!(
            rr.rdata,
            Rdata::Unknown {
                rtype: 999,
                octets: vec![0xAA, 0xBB, 0xCC],
            }
        );
    }
}

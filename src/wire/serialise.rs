//! Encoding of in-memory [`Message`] values to the wire format.
//!
//! A single [`Writer`] is threaded through the whole message so that
//! the name-compression suffix map is shared across the header,
//! questions, and all three resource-record sections, per RFC 1035
//! section 4.1.4.

use super::name;
use super::name::SuffixMap;
use super::types::*;

/// A buffer being written to, carrying the compression state for the
/// message currently being encoded. Never reused across messages.
pub struct Writer {
    pub octets: Vec<u8>,
    suffix_map: SuffixMap,
}

impl Default for Writer {
    fn default() -> Self {
        Writer {
            octets: Vec::with_capacity(512),
            suffix_map: SuffixMap::new(),
        }
    }
}

impl Writer {
    pub fn offset(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.octets.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.extend_from_slice(octets);
    }

    /// Encode `name`, compressing against every suffix already written
    /// to this message (in any prior section).
    pub fn write_name(&mut self, name: &str) {
        name::encode(name, &mut self.octets, &mut self.suffix_map, 0);
    }

    /// Patch a previously-reserved `u16` at `index` with `value`, for
    /// the RDLENGTH-after-the-fact pattern used by resource records.
    fn patch_u16(&mut self, index: usize, value: u16) {
        self.octets[index..index + 2].copy_from_slice(&value.to_be_bytes());
    }
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::default();
        self.write(&mut writer);
        writer.octets
    }

    fn write(&self, writer: &mut Writer) {
        let header = Header {
            qdcount: self.questions.len() as u16,
            ancount: self.answers.len() as u16,
            nscount: self.authority.len() as u16,
            arcount: self.additional.len() as u16,
            ..self.header
        };
        header.write(writer);

        for question in &self.questions {
            question.write(writer);
        }
        for rr in &self.answers {
            rr.write(writer);
        }
        for rr in &self.authority {
            rr.write(writer);
        }
        for rr in &self.additional {
            rr.write(writer);
        }
    }
}

impl Header {
    fn write(&self, writer: &mut Writer) {
        let flags1 = (u8::from(self.is_response) << 7)
            | (u8::from(self.opcode) << 3)
            | (u8::from(self.is_authoritative) << 2)
            | (u8::from(self.is_truncated) << 1)
            | u8::from(self.recursion_desired);
        let flags2 = (u8::from(self.recursion_available) << 7) | (u8::from(self.rcode) & 0b1111);

        writer.write_u16(self.id);
        writer.write_u8(flags1);
        writer.write_u8(flags2);
        writer.write_u16(self.qdcount);
        writer.write_u16(self.ancount);
        writer.write_u16(self.nscount);
        writer.write_u16(self.arcount);
    }
}

impl Question {
    fn write(&self, writer: &mut Writer) {
        writer.write_name(&self.name);
        writer.write_u16(self.qtype.to_int());
        let class = self.qclass.to_int() | if self.unicast_response { 0x8000 } else { 0 };
        writer.write_u16(class);
    }
}

impl ResourceRecord {
    fn write(&self, writer: &mut Writer) {
        writer.write_name(&self.name);
        writer.write_u16(self.rtype().to_int());
        let class = self.rclass.to_int() | if self.cache_flush { 0x8000 } else { 0 };
        writer.write_u16(class);
        writer.write_u32(self.ttl);

        let rdlength_index = writer.offset();
        writer.write_u16(0); // patched below
        let rdata_start = writer.offset();
        self.rdata.write(writer);
        let rdata_len = (writer.offset() - rdata_start) as u16;
        writer.patch_u16(rdlength_index, rdata_len);
    }
}

impl Rdata {
    fn write(&self, writer: &mut Writer) {
        match self {
            Rdata::A { address } => {
                writer.write_octets(&[address.0, address.1, address.2, address.3]);
            }
            Rdata::AAAA { address } => {
                writer.write_u16(address.0);
                writer.write_u16(address.1);
                writer.write_u16(address.2);
                writer.write_u16(address.3);
                writer.write_u16(address.4);
                writer.write_u16(address.5);
                writer.write_u16(address.6);
                writer.write_u16(address.7);
            }
            Rdata::CNAME { name } => writer.write_name(name),
            Rdata::PTR { name } => writer.write_name(name),
            Rdata::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                writer.write_u16(*priority);
                writer.write_u16(*weight);
                writer.write_u16(*port);
                writer.write_name(target);
            }
            Rdata::TXT { strings } => {
                if strings.is_empty() {
                    writer.write_u8(0);
                } else {
                    for s in strings {
                        writer.write_u8(s.len() as u8);
                        writer.write_octets(s);
                    }
                }
            }
            Rdata::NSEC { next_name, types } => {
                writer.write_name(next_name);
                write_nsec_bitmap(writer, types);
            }
            Rdata::Unknown { octets, .. } => {
                writer.write_octets(octets);
            }
        }
    }
}

/// Group `types` by their window block (`type_code / 256`) and emit
/// one `<block><len><bitmap>` entry per non-empty window, per RFC 4034
/// section 4.1.2.
fn write_nsec_bitmap(writer: &mut Writer, types: &std::collections::BTreeSet<TypeCode>) {
    use std::collections::BTreeMap;

    let mut windows: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    for t in types {
        let value = t.to_int();
        let block = (value / 256) as u8;
        let bit_in_block = value % 256;
        windows.entry(block).or_default().push(bit_in_block as u8);
    }

    for (block, bits) in windows {
        let max_bit = *bits.iter().max().expect("non-empty window");
        let bitmap_len = (max_bit as usize / 8) + 1;
        let mut bitmap = vec![0u8; bitmap_len];
        for bit in bits {
            let byte_index = (bit / 8) as usize;
            let bit_index = 7 - (bit % 8);
            bitmap[byte_index] |= 1 << bit_index;
        }
        writer.write_u8(block);
        writer.write_u8(bitmap_len as u8);
        writer.write_octets(&bitmap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a_question(name: &str, unicast_response: bool) -> Question {
        Question {
            name: name.to_string(),
            qtype: TypeCode::A,
            qclass: ClassCode::IN,
            unicast_response,
        }
    }

    #[test]
    fn a_record_question_encode() {
        let mut writer = Writer::default();
        a_question("example.com", false).write(&mut writer);
        assert_eq!(
            writer.octets,
            vec![
                0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d, 0x00,
                0x00, 0x01, 0x00, 0x01,
            ]
        );
    }

    #[test]
    fn unicast_response_bit_sets_top_bit_of_class() {
        let mut writer = Writer::default();
        a_question("example.com", true).write(&mut writer);
        let tail = &writer.octets[writer.octets.len() - 2..];
        assert_eq!(tail, &[0x80, 0x01]);
    }

    #[test]
    fn header_is_always_twelve_bytes() {
        let message = Message::empty(1);
        let encoded = message.encode();
        assert_eq!(&encoded[0..2], &1u16.to_be_bytes());
        assert_eq!(encoded.len(), 12);
    }

    #[test]
    fn header_counts_are_derived_from_sections() {
        let mut message = Message::empty(1);
        message.header.qdcount = 99;
        message.questions.push(a_question("example.com", false));
        let encoded = message.encode();
        assert_eq!(&encoded[4..6], &1u16.to_be_bytes()); // qdcount
        assert_eq!(&encoded[6..8], &0u16.to_be_bytes()); // ancount
    }

    #[test]
    fn repeated_suffix_is_compressed() {
        let mut message = Message::empty(1);
        message.questions.push(a_question("example.com", false));
        message.questions.push(a_question("foo.example.com", false));
        let encoded = message.encode();

        // second question's name is "foo" (4 bytes) + a 2-byte pointer,
        // versus the first question's fully spelled-out 13 bytes.
        let second_name_start = 12 + 17; // header + first question
        assert_eq!(encoded[second_name_start], 0x03);
        assert_eq!(&encoded[second_name_start + 1..second_name_start + 4], b"foo");
        assert_eq!(encoded[second_name_start + 4] & 0b1100_0000, 0b1100_0000);
    }

    #[test]
    fn nsec_bitmap_matches_rfc_example() {
        use std::collections::BTreeSet;

        let types: BTreeSet<TypeCode> = [TypeCode::A, TypeCode::NS, TypeCode::CNAME]
            .into_iter()
            .collect();
        let mut writer = Writer::default();
        write_nsec_bitmap(&mut writer, &types);
        assert_eq!(writer.octets, vec![0x00, 0x01, 0b0110_0100]);
    }

    #[test]
    fn empty_txt_is_a_single_zero_byte() {
        let mut writer = Writer::default();
        Rdata::TXT { strings: vec![] }.write(&mut writer);
        assert_eq!(writer.octets, vec![0x00]);
    }
}

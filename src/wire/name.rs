//! Domain name compression, per section 4.1.4 of RFC 1035.
//!
//! Names are stored everywhere else in this crate as dotted strings
//! with no trailing dot (the empty string is the root). This module
//! is the only place that deals in on-wire labels and pointers.

use std::collections::{HashMap, HashSet};

use crate::error::WireError;

/// Two top bits set on a length octet mark it as a compression
/// pointer rather than a label length.
const POINTER_TAG: u8 = 0b1100_0000;

/// A 14-bit pointer can only address the first 16384 bytes of a
/// message; suffixes first seen beyond that offset are still encoded
/// in full, just never recorded as compressible.
const MAX_POINTER_OFFSET: usize = 0x3FFF;

/// Maps a previously-written name suffix (e.g. `"example.com"`) to the
/// absolute byte offset in the in-progress message at which it was
/// first written. Lives for the duration of one message encode; never
/// shared across messages.
pub type SuffixMap = HashMap<String, u16>;

/// Encode `name` into `buf`, consulting and updating `suffix_map` for
/// compression opportunities. `base_offset` is the absolute offset of
/// `buf`'s start within the final message, so recorded offsets and
/// emitted pointers are correct regardless of which section is being
/// written.
pub fn encode(name: &str, buf: &mut Vec<u8>, suffix_map: &mut SuffixMap, base_offset: usize) {
    let labels: Vec<&str> = if name.is_empty() {
        Vec::new()
    } else {
        name.split('.').collect()
    };
    encode_labels(&labels, buf, suffix_map, base_offset);
}

fn encode_labels(labels: &[&str], buf: &mut Vec<u8>, suffix_map: &mut SuffixMap, base_offset: usize) {
    if labels.is_empty() {
        buf.push(0);
        return;
    }

    let suffix = labels.join(".");
    if let Some(&offset) = suffix_map.get(&suffix) {
        buf.push(POINTER_TAG | ((offset >> 8) as u8));
        buf.push((offset & 0xFF) as u8);
        return;
    }

    let here = base_offset + buf.len();
    if here <= MAX_POINTER_OFFSET {
        suffix_map.insert(suffix, here as u16);
    }

    let label = labels[0].as_bytes();
    buf.push(label.len() as u8);
    buf.extend_from_slice(label);
    encode_labels(&labels[1..], buf, suffix_map, base_offset);
}

/// Decode a name starting at `start` within `message`.
///
/// Returns the dotted name and the number of bytes the *outer* cursor
/// should advance by — which is always either past the terminating
/// `0x00` or past the two pointer bytes, never into a pointed-to
/// region, even when the name's labels are assembled by following one
/// or more pointers.
pub fn decode(message: &[u8], start: usize) -> Result<(String, usize), WireError> {
    let mut labels: Vec<String> = Vec::new();
    let mut visited: HashSet<u16> = HashSet::new();
    let mut pos = start;
    let mut outer_advance: Option<usize> = None;

    loop {
        let length = *message
            .get(pos)
            .ok_or(WireError::InsufficientData { at: pos })?;

        match length & POINTER_TAG {
            POINTER_TAG => {
                let lo = *message
                    .get(pos + 1)
                    .ok_or(WireError::InsufficientData { at: pos + 1 })?;
                let pointer = (u16::from(length & !POINTER_TAG) << 8) | u16::from(lo);

                if outer_advance.is_none() {
                    outer_advance = Some(pos + 2 - start);
                }

                if !visited.insert(pointer) {
                    return Err(WireError::CircularCompressionPointer { at: pos, pointer });
                }

                pos = pointer as usize;
            }
            0 if length == 0 => {
                pos += 1;
                if outer_advance.is_none() {
                    outer_advance = Some(pos - start);
                }
                break;
            }
            0 => {
                let len = length as usize;
                let label_start = pos + 1;
                let label_end = label_start + len;
                let bytes = message
                    .get(label_start..label_end)
                    .ok_or(WireError::InsufficientData { at: label_start })?;
                labels.push(String::from_utf8_lossy(bytes).into_owned());
                pos = label_end;
            }
            _ => {
                return Err(WireError::InvalidLabelLength { at: pos, length });
            }
        }
    }

    Ok((labels.join("."), outer_advance.expect("terminator or pointer always sets outer_advance")))
}

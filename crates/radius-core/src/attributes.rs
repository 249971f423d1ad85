//! Parsed RADIUS attributes
//!
//! Attributes are type-length-value records whose values alias the captured
//! packet buffer (`Bytes` slices, no copying). A packet's attributes live in
//! an [`AttributeSet`] keyed by type; the first occurrence of a type wins
//! and later instances are discarded, since none of the multi-instance
//! attributes matter for interception purposes.

use bytes::Bytes;
use std::collections::HashMap;

/// Attribute type numbers from RFC 2865/2866 that the collector cares about
pub mod attr_id {
    pub const USER_NAME: u8 = 1;
    pub const NAS_PORT: u8 = 5;
    pub const FRAMED_IP_ADDRESS: u8 = 8;
    pub const NAS_IDENTIFIER: u8 = 32;
    pub const ACCT_STATUS_TYPE: u8 = 40;
    pub const ACCT_INPUT_OCTETS: u8 = 42;
    pub const ACCT_OUTPUT_OCTETS: u8 = 43;
    pub const ACCT_SESSION_ID: u8 = 44;
    pub const FRAMED_IPV6_ADDRESS: u8 = 168;
}

/// A single attribute: type plus a value slice into the packet payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiusAttribute {
    /// Attribute type number
    pub attr_type: u8,
    /// Value bytes, excluding the two header bytes
    pub value: Bytes,
}

impl RadiusAttribute {
    /// Interpret the value as a big-endian 32-bit integer.
    ///
    /// Returns `None` unless the value is exactly four bytes, which is what
    /// RFC 2865 mandates for integer-typed attributes.
    pub fn as_u32(&self) -> Option<u32> {
        if self.value.len() != 4 {
            return None;
        }
        Some(u32::from_be_bytes([
            self.value[0],
            self.value[1],
            self.value[2],
            self.value[3],
        ]))
    }

    /// Interpret the value as text, truncated to `max_len` bytes.
    ///
    /// Returns the text and whether truncation happened so the caller can
    /// log it.
    pub fn as_text(&self, max_len: usize) -> (String, bool) {
        let truncated = self.value.len() > max_len;
        let end = self.value.len().min(max_len);
        (
            String::from_utf8_lossy(&self.value[..end]).into_owned(),
            truncated,
        )
    }
}

/// Keyed attribute collection for one parsed packet.
///
/// Cleared and reused between packets; the map keeps its allocation so
/// steady-state parsing does not allocate per packet.
#[derive(Debug, Default)]
pub struct AttributeSet {
    attrs: HashMap<u8, RadiusAttribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        AttributeSet {
            attrs: HashMap::new(),
        }
    }

    /// Insert an attribute unless one of the same type is already present.
    /// Returns true if the attribute was kept.
    pub fn insert_first_wins(&mut self, attr: RadiusAttribute) -> bool {
        use std::collections::hash_map::Entry;
        match self.attrs.entry(attr.attr_type) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(attr);
                true
            }
        }
    }

    pub fn get(&self, attr_type: u8) -> Option<&RadiusAttribute> {
        self.attrs.get(&attr_type)
    }

    /// Drop all attributes, retaining the map's capacity for reuse
    pub fn clear(&mut self) {
        self.attrs.clear();
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

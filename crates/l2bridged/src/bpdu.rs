//! Bridge Protocol Data Unit encoding.
//!
//! A BPDU frame is the bridge-group destination, the sender's address and
//! four big-endian u16 fields, with no ethertype in between:
//!
//! ```text
//! | 01:80:c2:00:00:00 | src (6) | root | cost | bridge | port |
//! ```

use byteorder::{BigEndian, ByteOrder};
use l2bridge_types::MacAddress;

use crate::error::{BridgeError, Result};
use crate::frame::ADDR_PAIR_LEN;

/// Length of the four BPDU fields.
pub const BPDU_PAYLOAD_LEN: usize = 8;

/// Length of a complete BPDU frame.
pub const BPDU_FRAME_LEN: usize = ADDR_PAIR_LEN + BPDU_PAYLOAD_LEN;

/// Spanning tree advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bpdu {
    /// Root bridge the sender believes in.
    pub root_id: u16,
    /// Sender's cost to reach that root.
    pub root_path_cost: u16,
    /// Sender's own bridge id.
    pub bridge_id: u16,
    /// Port the sender transmitted on.
    pub port_id: u16,
}

impl Bpdu {
    /// Decodes a BPDU from a complete frame (address pair included).
    ///
    /// Bytes after the four fields are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < BPDU_FRAME_LEN {
            return Err(BridgeError::TruncatedBpdu {
                len: frame.len(),
                needed: BPDU_FRAME_LEN,
            });
        }

        let mut fields = [0u16; 4];
        BigEndian::read_u16_into(&frame[ADDR_PAIR_LEN..BPDU_FRAME_LEN], &mut fields);
        let [root_id, root_path_cost, bridge_id, port_id] = fields;

        Ok(Self {
            root_id,
            root_path_cost,
            bridge_id,
            port_id,
        })
    }

    /// Encodes a complete BPDU frame sourced from `source`.
    pub fn encode(&self, source: MacAddress) -> Vec<u8> {
        let mut frame = vec![0u8; BPDU_FRAME_LEN];
        frame[..6].copy_from_slice(MacAddress::BRIDGE_GROUP.as_bytes());
        frame[6..ADDR_PAIR_LEN].copy_from_slice(source.as_bytes());
        BigEndian::write_u16_into(
            &[
                self.root_id,
                self.root_path_cost,
                self.bridge_id,
                self.port_id,
            ],
            &mut frame[ADDR_PAIR_LEN..],
        );
        frame
    }
}

//! Ethernet header codec with single 802.1Q tag insertion and removal.
//!
//! Frame layout:
//!
//! ```text
//! | dest (6) | src (6) | [marker (2) | TCI (2)] | ethertype (2) | payload |
//! ```
//!
//! The tag marker is [`DOT1Q_MARKER`] (0x8200), the convention used by the
//! bridges this daemon interoperates with, not the IEEE 0x8100 TPID.

use byteorder::{BigEndian, ByteOrder};
use l2bridge_types::{MacAddress, VlanId};

use crate::error::{BridgeError, Result};

/// Ethertype value marking an 802.1Q tag in this implementation.
pub const DOT1Q_MARKER: u16 = 0x8200;

/// Length of the destination + source address pair.
pub const ADDR_PAIR_LEN: usize = 12;

/// Minimum length of an untagged Ethernet header.
pub const HEADER_LEN: usize = 14;

/// Size of an 802.1Q tag (marker + TCI).
pub const TAG_LEN: usize = 4;

/// Minimum length of a tagged Ethernet header.
pub const TAGGED_HEADER_LEN: usize = HEADER_LEN + TAG_LEN;

/// Decoded Ethernet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    /// Ethertype following the tag, if any.
    pub ether_type: u16,
    /// VLAN id from the tag; `None` for untagged frames.
    pub vlan_id: Option<VlanId>,
}

impl EthernetHeader {
    /// Returns true if the frame carried an 802.1Q tag.
    pub fn is_tagged(&self) -> bool {
        self.vlan_id.is_some()
    }
}

/// Parses the Ethernet header of `frame`.
///
/// # Errors
///
/// Returns [`BridgeError::FrameTooShort`] if the frame ends inside the header.
pub fn parse(frame: &[u8]) -> Result<EthernetHeader> {
    ensure_len(frame, HEADER_LEN)?;

    let (destination, source) = addresses(frame)?;
    let candidate = BigEndian::read_u16(&frame[ADDR_PAIR_LEN..HEADER_LEN]);

    if candidate != DOT1Q_MARKER {
        return Ok(EthernetHeader {
            destination,
            source,
            ether_type: candidate,
            vlan_id: None,
        });
    }

    ensure_len(frame, TAGGED_HEADER_LEN)?;
    let tci = BigEndian::read_u16(&frame[HEADER_LEN..HEADER_LEN + 2]);
    let ether_type = BigEndian::read_u16(&frame[HEADER_LEN + 2..TAGGED_HEADER_LEN]);

    Ok(EthernetHeader {
        destination,
        source,
        ether_type,
        vlan_id: Some(VlanId::from_tci(tci)),
    })
}

/// Reads only the address pair. BPDU frames carry no ethertype, so the
/// receive path classifies frames with this before calling [`parse`].
pub fn addresses(frame: &[u8]) -> Result<(MacAddress, MacAddress)> {
    ensure_len(frame, ADDR_PAIR_LEN)?;
    let destination = MacAddress::from_slice(&frame[..6]).ok_or(BridgeError::FrameTooShort {
        len: frame.len(),
        needed: ADDR_PAIR_LEN,
    })?;
    let source = MacAddress::from_slice(&frame[6..ADDR_PAIR_LEN]).ok_or(
        BridgeError::FrameTooShort {
            len: frame.len(),
            needed: ADDR_PAIR_LEN,
        },
    )?;
    Ok((destination, source))
}

/// Encodes the 4-byte tag for `vlan_id`.
pub fn vlan_tag(vlan_id: VlanId) -> [u8; TAG_LEN] {
    let mut tag = [0u8; TAG_LEN];
    BigEndian::write_u16(&mut tag[..2], DOT1Q_MARKER);
    BigEndian::write_u16(&mut tag[2..], vlan_id.as_u16() & VlanId::MASK);
    tag
}

/// Returns a copy of `frame` with a tag for `vlan_id` spliced in after the
/// address pair. The result is exactly [`TAG_LEN`] bytes longer.
pub fn insert_tag(frame: &[u8], vlan_id: VlanId) -> Result<Vec<u8>> {
    ensure_len(frame, ADDR_PAIR_LEN)?;

    let mut tagged = Vec::with_capacity(frame.len() + TAG_LEN);
    tagged.extend_from_slice(&frame[..ADDR_PAIR_LEN]);
    tagged.extend_from_slice(&vlan_tag(vlan_id));
    tagged.extend_from_slice(&frame[ADDR_PAIR_LEN..]);
    Ok(tagged)
}

/// Returns a copy of `frame` with the 4 bytes after the address pair removed.
///
/// The bytes are removed unconditionally; callers only strip frames that
/// [`parse`] reported as tagged.
pub fn strip_tag(frame: &[u8]) -> Result<Vec<u8>> {
    ensure_len(frame, ADDR_PAIR_LEN + TAG_LEN)?;

    let mut untagged = Vec::with_capacity(frame.len() - TAG_LEN);
    untagged.extend_from_slice(&frame[..ADDR_PAIR_LEN]);
    untagged.extend_from_slice(&frame[ADDR_PAIR_LEN + TAG_LEN..]);
    Ok(untagged)
}

fn ensure_len(frame: &[u8], needed: usize) -> Result<()> {
    if frame.len() < needed {
        return Err(BridgeError::FrameTooShort {
            len: frame.len(),
            needed,
        });
    }
    Ok(())
}

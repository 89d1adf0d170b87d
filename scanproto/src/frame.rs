//! Binary frame format understood by the scan card.
//!
//! A frame carries one instant's mirror position for both laser channels:
//! four 4-byte sub-packets in the fixed order X1, Y1, X2, Y2, then a 3-byte
//! trailer. Each sub-packet is a 32-bit value serialized little-endian,
//! laid out as an 11-bit channel header above a 21-bit payload. The payload
//! is the 16-bit galvo coordinate left-padded with 5 zero bits.

use anyhow::Result;

/// Size of one frame on the wire, in bytes.
pub const FRAME_LEN: usize = 19;

/// Widest header value that fits the 11 header bits.
pub const MAX_HEADER: u16 = 0x7FF;

/// Number of payload bits below the header in each sub-packet.
const HEADER_SHIFT: u32 = 21;

/// Constant trailer closing every frame.
const TRAILER: [u8; 3] = [0xAA, 0x00, 0x00];

/// A position in the galvo's 16-bit coordinate space.
///
/// `(0, 0)` is one corner of the working area, `(65535, 65535)` the
/// opposite one, and [`GalvoPoint::CENTER`] the rest position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalvoPoint {
    /// Horizontal mirror coordinate.
    pub x: u16,
    /// Vertical mirror coordinate.
    pub y: u16,
}

impl GalvoPoint {
    /// The center of the working area.
    pub const CENTER: GalvoPoint = GalvoPoint { x: 32768, y: 32768 };

    /// Create a point from raw coordinates.
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// One 19-byte scan-card frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// The raw wire bytes, always [`FRAME_LEN`] long and ending in
    /// `AA 00 00`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Packs coordinate pairs into [`Frame`]s.
///
/// The per-channel header bits identify the laser channel to the card and
/// must not change for the duration of a job, so they are fixed at
/// construction time.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    header_a: u16,
    header_b: u16,
}

impl FrameEncoder {
    /// Create an encoder with the given channel headers.
    ///
    /// Fails if either header does not fit the 11 header bits.
    pub fn new(header_a: u16, header_b: u16) -> Result<Self> {
        for header in [header_a, header_b] {
            if header > MAX_HEADER {
                anyhow::bail!("channel header {header:#x} does not fit 11 bits (max {MAX_HEADER:#x})");
            }
        }
        Ok(Self { header_a, header_b })
    }

    /// Pack one position per channel into a single frame.
    pub fn frame(&self, a: GalvoPoint, b: GalvoPoint) -> Frame {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0..4].copy_from_slice(&sub_packet(self.header_a, a.x));
        bytes[4..8].copy_from_slice(&sub_packet(self.header_a, a.y));
        bytes[8..12].copy_from_slice(&sub_packet(self.header_b, b.x));
        bytes[12..16].copy_from_slice(&sub_packet(self.header_b, b.y));
        bytes[16..].copy_from_slice(&TRAILER);
        Frame(bytes)
    }

    /// Pack two equal-length channel streams into an ordered frame list.
    ///
    /// Fails if the channels disagree on length; the card consumes both
    /// channels in lockstep, so there is no sensible way to pad one side.
    pub fn encode(&self, channel_a: &[GalvoPoint], channel_b: &[GalvoPoint]) -> Result<Vec<Frame>> {
        if channel_a.len() != channel_b.len() {
            anyhow::bail!(
                "channel streams differ in length: {} vs {}",
                channel_a.len(),
                channel_b.len()
            );
        }
        Ok(channel_a
            .iter()
            .zip(channel_b.iter())
            .map(|(&a, &b)| self.frame(a, b))
            .collect())
    }
}

/// Build one little-endian sub-packet from a header and a coordinate.
///
/// The coordinate occupies the low 16 of the 21 payload bits; the 5 bits
/// between it and the header are always zero.
fn sub_packet(header: u16, coord: u16) -> [u8; 4] {
    let packed = (u32::from(header) << HEADER_SHIFT) | u32::from(coord);
    packed.to_le_bytes()
}

//! Message envelopes and the TCP wire format.
//!
//! Every message carries the rank of its sender, a tag and a channel kind.
//! User point-to-point traffic and the internal traffic of collective
//! operations travel on different channel kinds so that a wildcard receive
//! can never consume a message that belongs to a collective. Paired
//! send-receive exchanges use a third channel kind of their own.

use zerocopy::{byteorder::network_endian::*, AsBytes, FromBytes, FromZeroes, Unaligned};

/// Message tag.
pub type Tag = i32;

/// Receive wildcard matching any tag.
pub const ANY_TAG: Tag = -1;

/// Receive wildcard matching any source rank.
pub const ANY_SOURCE: usize = usize::MAX;

pub type ChannelKind = u8;

pub mod kind {
    use super::ChannelKind;

    pub const POINT_TO_POINT: ChannelKind = 0;
    pub const COLLECTIVE: ChannelKind = 1;
    pub const EXCHANGE: ChannelKind = 2;
    /// Marks that a peer's connection ended. Never sent over the wire.
    pub const HANGUP: ChannelKind = 3;
}

/// Tags used on the collective channel.
pub mod collective {
    use super::Tag;

    pub const BARRIER: Tag = 0;
    pub const BROADCAST: Tag = 1;
    pub const REDUCE: Tag = 2;
    pub const GATHER: Tag = 3;
    pub const ALLTOALL: Tag = 4;
}

/// A message together with its routing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub kind: ChannelKind,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Tells the mailbox that nothing more will arrive from `source`.
    pub fn hangup(source: usize) -> Self {
        Self {
            source,
            tag: 0,
            kind: kind::HANGUP,
            payload: Vec::new(),
        }
    }

    pub fn is_hangup(&self) -> bool {
        self.kind == kind::HANGUP
    }
}

/// Selects which envelopes a receive accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matcher {
    /// Source rank or [`ANY_SOURCE`].
    pub source: usize,
    /// Tag or [`ANY_TAG`].
    pub tag: Tag,
    pub kind: ChannelKind,
}

impl Matcher {
    pub fn point_to_point(source: usize, tag: Tag) -> Self {
        Self {
            source,
            tag,
            kind: kind::POINT_TO_POINT,
        }
    }

    pub fn collective(source: usize, tag: Tag) -> Self {
        Self {
            source,
            tag,
            kind: kind::COLLECTIVE,
        }
    }

    pub fn exchange(source: usize) -> Self {
        Self {
            source,
            tag: 0,
            kind: kind::EXCHANGE,
        }
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.kind == envelope.kind
            && (self.source == ANY_SOURCE || self.source == envelope.source)
            && (self.tag == ANY_TAG || self.tag == envelope.tag)
    }
}

/// A receive posted with [`Transport::reserve`](crate::Transport::reserve).
///
/// The ticket owns the next message accepted by its matcher at the time it
/// was posted; later receives cannot take that message away.
#[derive(Debug, PartialEq, Eq)]
pub struct Ticket(pub(crate) u64);

/// Identifies a stream as belonging to this protocol.
pub const MAGIC: [u8; 4] = *b"PCM1";

/// First bytes written by the connecting side of a TCP stream.
#[derive(Debug, FromBytes, AsBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct Handshake {
    pub magic: [u8; 4],
    pub rank: U32,
    pub size: U32,
}

impl Handshake {
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            magic: MAGIC,
            rank: U32::new(rank as u32),
            size: U32::new(size as u32),
        }
    }
}

/// Precedes every payload on a TCP stream.
#[derive(Debug, FromBytes, AsBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    pub source: U32,
    pub tag: I32,
    pub kind: ChannelKind,
    pub len: U64,
}

pub const FRAME_HEADER_SIZE: usize = std::mem::size_of::<FrameHeader>();

impl FrameHeader {
    pub fn for_envelope(envelope: &Envelope) -> Self {
        Self {
            source: U32::new(envelope.source as u32),
            tag: I32::new(envelope.tag),
            kind: envelope.kind,
            len: U64::new(envelope.payload.len() as u64),
        }
    }

    pub fn into_envelope(self, payload: Vec<u8>) -> Envelope {
        Envelope {
            source: self.source.get() as usize,
            tag: self.tag.get(),
            kind: self.kind,
            payload,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn envelope(source: usize, tag: Tag, kind: ChannelKind) -> Envelope {
        Envelope {
            source,
            tag,
            kind,
            payload: vec![],
        }
    }

    #[test]
    fn wildcards_match_everything_on_their_channel() {
        let any = Matcher::point_to_point(ANY_SOURCE, ANY_TAG);
        assert!(any.matches(&envelope(3, 7, kind::POINT_TO_POINT)));
        assert!(any.matches(&envelope(0, 0, kind::POINT_TO_POINT)));
        assert!(!any.matches(&envelope(0, 0, kind::COLLECTIVE)));
    }

    #[test]
    fn exact_matcher() {
        let m = Matcher::collective(2, collective::REDUCE);
        assert!(m.matches(&envelope(2, collective::REDUCE, kind::COLLECTIVE)));
        assert!(!m.matches(&envelope(1, collective::REDUCE, kind::COLLECTIVE)));
        assert!(!m.matches(&envelope(2, collective::GATHER, kind::COLLECTIVE)));
    }

    #[test]
    fn frame_header_layout() {
        assert_eq!(FRAME_HEADER_SIZE, 17);
        assert_eq!(std::mem::size_of::<Handshake>(), 12);

        let sent = Envelope {
            source: 5,
            tag: -3,
            kind: kind::POINT_TO_POINT,
            payload: vec![1, 2, 3],
        };
        let header = FrameHeader::for_envelope(&sent);
        let bytes = header.as_bytes().to_vec();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 5]);

        let parsed = FrameHeader::read_from(&bytes[..]).unwrap();
        assert_eq!(parsed.len.get(), 3);
        assert_eq!(parsed.into_envelope(vec![1, 2, 3]), sent);
    }
}

//! Wire protocol of the blare audio broadcast system: the control channel
//! command framing shared by server and client, and the segmenter that cuts
//! capture buffers into datagram-sized chunks.

pub use segment::{split_segments, SegmentError, SEGMENT_LIMIT};
pub use wire::{ClientCodec, Command, Request, Response, ServerCodec, WireError};

pub mod segment;
pub mod wire;

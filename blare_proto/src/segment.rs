//! Datagram segmentation of capture buffers.

use bytes::Bytes;
use thiserror::Error;

/// Conventional ethernet MTU the datagram path is sized against.
pub const MTU: usize = 1492;

/// Largest audio payload per datagram: the MTU minus the IPv4 (20 byte) and
/// UDP (8 byte) headers.
pub const SEGMENT_LIMIT: usize = MTU - 20 - 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("block alignment must be non-zero")]
    ZeroBlockAlign,
    #[error("block alignment {0} exceeds the {} byte segment limit", SEGMENT_LIMIT)]
    BlockTooLarge(usize),
    #[error("{count} byte payload is not a multiple of the {block_align} byte block alignment")]
    Misaligned { count: usize, block_align: usize },
}

/// Split `data` into consecutive datagram payloads, each at most
/// [`SEGMENT_LIMIT`] bytes and a whole number of sample groups of
/// `block_align` bytes. Each segment is an independently owned buffer, so the
/// send path can keep them alive after this call returns.
pub fn split_segments(data: &[u8], block_align: usize) -> Result<Vec<Bytes>, SegmentError> {
    if block_align == 0 {
        return Err(SegmentError::ZeroBlockAlign);
    }
    if block_align > SEGMENT_LIMIT {
        return Err(SegmentError::BlockTooLarge(block_align));
    }
    if data.len() % block_align != 0 {
        return Err(SegmentError::Misaligned { count: data.len(), block_align });
    }

    // one single sample group can't be divided across datagrams
    let max_seg_size = SEGMENT_LIMIT - SEGMENT_LIMIT % block_align;
    Ok(data.chunks(max_seg_size).map(Bytes::copy_from_slice).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_full_segments() {
        let payload: Vec<u8> = (0..2928u32).map(|i| (i % 251) as u8).collect();
        let segments = split_segments(&payload, 4).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 1464);
        assert_eq!(segments[1].len(), 1464);
    }

    #[test]
    fn segments_reassemble_to_the_input() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 239) as u8).collect();
        let segments = split_segments(&payload, 8).unwrap();

        let mut reassembled = Vec::new();
        for segment in &segments {
            assert!(segment.len() <= SEGMENT_LIMIT);
            assert_eq!(segment.len() % 8, 0);
            reassembled.extend_from_slice(segment);
        }
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn awkward_alignment_rounds_the_segment_size_down() {
        // 1464 is not a multiple of 6, segments top out at 1458
        let payload = vec![7u8; 6 * 1000];
        let segments = split_segments(&payload, 6).unwrap();
        for segment in &segments {
            assert!(segment.len() <= 1458);
            assert_eq!(segment.len() % 6, 0);
        }
        assert_eq!(segments.iter().map(|s| s.len()).sum::<usize>(), payload.len());
    }

    #[test]
    fn empty_payload_yields_no_segments() {
        assert_eq!(split_segments(&[], 4).unwrap(), Vec::<Bytes>::new());
    }

    #[test]
    fn misaligned_payload_is_rejected() {
        assert_eq!(
            split_segments(&[0u8; 10], 4),
            Err(SegmentError::Misaligned { count: 10, block_align: 4 }),
        );
    }

    #[test]
    fn degenerate_alignments_are_rejected() {
        assert_eq!(split_segments(&[0u8; 4], 0), Err(SegmentError::ZeroBlockAlign));
        assert_eq!(
            split_segments(&[0u8; 2048], 2048),
            Err(SegmentError::BlockTooLarge(2048)),
        );
    }
}

//! Frame decoder for the sensor link.
//!
//! The rig writes frames like `127,83.`: two integer fields separated by a
//! comma and terminated by a period. Reads arrive in arbitrary chunks, so the
//! decoder buffers the unterminated tail until the next push.
//!
//! Malformed frames are dropped and only logged at `debug`. The buffer is
//! bounded; once it overflows without seeing a delimiter the decoder discards
//! what it holds and skips ahead to the next delimiter before decoding again.

use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::sample::Sample;

/// Incremental decoder from raw link bytes to [`Sample`]s.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    delimiter: u8,
    separator: u8,
    max_buffer: usize,
    resyncing: bool,
    dropped: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(&LinkConfig::default())
    }
}

impl FrameDecoder {
    /// Create a decoder using the framing from `config`.
    #[must_use]
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            buffer: Vec::new(),
            delimiter: config.delimiter_byte(),
            separator: config.separator_byte(),
            max_buffer: config.max_frame_bytes.max(1),
            resyncing: false,
            dropped: 0,
        }
    }

    /// Feed a chunk of raw link data.
    ///
    /// The returned iterator yields the samples completed by this chunk. It
    /// is lazy: frames not pulled from it stay buffered and are yielded by
    /// the next call.
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk.as_ref());
        Frames { decoder: self }
    }

    /// Bytes received but not yet terminated by a delimiter.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Frames dropped so far, malformed or discarded on overflow.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether the decoder is skipping input after an overflow.
    #[must_use]
    pub fn is_resyncing(&self) -> bool {
        self.resyncing
    }

    fn next_sample(&mut self) -> Option<Sample> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == self.delimiter) else {
                self.check_overflow();
                return None;
            };

            let mut frame: Vec<u8> = self.buffer.drain(..=end).collect();
            frame.pop();

            if self.resyncing {
                self.resyncing = false;
                debug!(bytes = frame.len(), "resynchronized on delimiter");
                continue;
            }

            match parse_frame(&frame, self.separator) {
                Some((angle, distance)) => return Some(Sample::new(angle, distance)),
                None => {
                    self.dropped += 1;
                    debug!(frame = %String::from_utf8_lossy(&frame), "dropping malformed frame");
                }
            }
        }
    }

    fn check_overflow(&mut self) {
        if self.buffer.len() <= self.max_buffer {
            return;
        }
        warn!(
            bytes = self.buffer.len(),
            limit = self.max_buffer,
            "no delimiter within frame limit, discarding buffer"
        );
        self.buffer.clear();
        self.dropped += 1;
        self.resyncing = true;
    }
}

/// Lazy sequence of samples produced by [`FrameDecoder::push`].
#[derive(Debug)]
#[must_use = "frames stay buffered until the iterator is drained"]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        self.decoder.next_sample()
    }
}

/// Parse one frame body (without its delimiter) into `(angle, distance)`.
///
/// Returns `None` unless the frame splits into exactly two fields that
/// parse as integers after trimming ASCII whitespace. Distances are never
/// negative.
#[must_use]
pub fn parse_frame(frame: &[u8], separator: u8) -> Option<(i32, u32)> {
    let text = std::str::from_utf8(frame).ok()?;
    let mut fields = text.split(char::from(separator));
    let angle = fields.next()?.trim().parse::<i32>().ok()?;
    let distance = fields.next()?.trim().parse::<u32>().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some((angle, distance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, chunk: &str) -> Vec<(i32, u32)> {
        decoder
            .push(chunk)
            .map(|s| (s.angle, s.distance))
            .collect()
    }

    #[test]
    fn test_single_valid_frame() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decode_all(&mut decoder, "12,34."), vec![(12, 34)]);
        assert!(decoder.buffered().is_empty());
    }

    #[test]
    fn test_valid_frames_decode_exactly() {
        for (a, d) in [(0, 0), (90, 400), (180, 401), (-5, 12), (45, 4000)] {
            let mut decoder = FrameDecoder::default();
            let frame = format!("{a},{d}.");
            assert_eq!(decode_all(&mut decoder, &frame), vec![(a, d)], "{frame}");
        }
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(
            decode_all(&mut decoder, "10,100.20,200.30,300."),
            vec![(10, 100), (20, 200), (30, 300)]
        );
    }

    #[test]
    fn test_split_frame_across_chunks() {
        let mut split = FrameDecoder::default();
        assert!(decode_all(&mut split, "12,3").is_empty());
        assert_eq!(split.buffered(), b"12,3");
        let second = decode_all(&mut split, "4.");

        let mut whole = FrameDecoder::default();
        assert_eq!(second, decode_all(&mut whole, "12,34."));
        assert_eq!(second, vec![(12, 34)]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = FrameDecoder::default();
        let mut out = Vec::new();
        for b in b"7,70.8,80." {
            out.extend(decoder.push([*b]).map(|s| (s.angle, s.distance)));
        }
        assert_eq!(out, vec![(7, 70), (8, 80)]);
    }

    #[test]
    fn test_malformed_frames_dropped_without_residue() {
        for bad in ["1234.", "a,b.", "12,x.", ",.", "1,2,3.", ".", "12,-4.", " , ."] {
            let mut decoder = FrameDecoder::default();
            assert!(decode_all(&mut decoder, bad).is_empty(), "{bad}");
            assert!(decoder.buffered().is_empty(), "{bad}");
            assert_eq!(decoder.dropped(), 1, "{bad}");
        }
    }

    #[test]
    fn test_malformed_frame_does_not_poison_next() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decode_all(&mut decoder, "oops.90,50."), vec![(90, 50)]);
    }

    #[test]
    fn test_whitespace_is_trimmed() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decode_all(&mut decoder, "\r\n 15 , 60 ."), vec![(15, 60)]);
    }

    #[test]
    fn test_invalid_utf8_dropped() {
        let mut decoder = FrameDecoder::default();
        let samples: Vec<_> = decoder.push(&[0xff, b',', b'1', b'.'][..]).collect();
        assert!(samples.is_empty());
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn test_frames_are_lazy() {
        let mut decoder = FrameDecoder::default();
        let first = decoder.push("1,1.2,2.").next().map(|s| s.angle);
        assert_eq!(first, Some(1));
        assert_eq!(decoder.buffered(), b"2,2.");
        let rest: Vec<_> = decoder.push("").map(|s| s.angle).collect();
        assert_eq!(rest, vec![2]);
    }

    #[test]
    fn test_overflow_discards_and_resyncs() {
        let config = LinkConfig {
            max_frame_bytes: 8,
            ..LinkConfig::default()
        };
        let mut decoder = FrameDecoder::new(&config);

        assert!(decode_all(&mut decoder, "123456789").is_empty());
        assert!(decoder.buffered().is_empty());
        assert!(decoder.is_resyncing());

        // Tail of the runaway frame is skipped, the following frame decodes.
        assert_eq!(decode_all(&mut decoder, "99,1.5,50."), vec![(5, 50)]);
        assert!(!decoder.is_resyncing());
    }

    #[test]
    fn test_buffer_within_limit_is_kept() {
        let config = LinkConfig {
            max_frame_bytes: 8,
            ..LinkConfig::default()
        };
        let mut decoder = FrameDecoder::new(&config);
        assert!(decode_all(&mut decoder, "180,400").is_empty());
        assert_eq!(decoder.buffered(), b"180,400");
        assert_eq!(decode_all(&mut decoder, "."), vec![(180, 400)]);
    }

    #[test]
    fn test_custom_framing() {
        let config = LinkConfig {
            delimiter: ';',
            separator: ':',
            ..LinkConfig::default()
        };
        let mut decoder = FrameDecoder::new(&config);
        assert_eq!(decode_all(&mut decoder, "30:120;"), vec![(30, 120)]);
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame(b"12,34", b','), Some((12, 34)));
        assert_eq!(parse_frame(b"12", b','), None);
        assert_eq!(parse_frame(b"", b','), None);
        assert_eq!(parse_frame(b"12,34,56", b','), None);
    }
}

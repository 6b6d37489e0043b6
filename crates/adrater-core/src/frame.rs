//! Newline-delimited frame decoding for the analysis event stream.
//!
//! Chunks arrive with arbitrary boundaries. The decoder buffers the trailing
//! partial line of each chunk and joins it with the next one, so the frames
//! it yields do not depend on where the transport split the bytes. Only
//! lines starting with `data: ` are frames; everything else (blank
//! separators, comments, other SSE fields) is discarded. A line longer than
//! [`MAX_LINE_BYTES`] is dropped as soon as it overflows, so a peer that never
//! sends a newline cannot grow the buffer without bound.

/// Line prefix that marks a protocol frame.
pub const DATA_PREFIX: &str = "data: ";

/// One `data: ` line, with the prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Zero-based arrival index among recognised frames.
    pub seq: u64,
    /// Everything after `data: `.
    pub payload: String,
}

/// Longest line the decoder buffers. Longer lines are discarded whole.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Incremental splitter from raw chunks to [`StreamFrame`]s.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    max_line: usize,
    /// Inside a line that already overflowed `max_line`.
    oversized: bool,
    next_seq: u64,
    discarded_lines: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that holds at most `max_line` bytes of an unfinished line.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            oversized: false,
            next_seq: 0,
            discarded_lines: 0,
        }
    }

    /// Feed one chunk and return every frame completed by it, in order.
    ///
    /// Splitting happens on raw bytes, so a multi-byte UTF-8 character cut
    /// by a chunk boundary is reassembled before it is decoded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            if self.oversized {
                self.oversized = false;
            } else {
                self.pending.extend_from_slice(&rest[..pos]);
                let line = std::mem::take(&mut self.pending);
                if let Some(frame) = self.decode_line(&line) {
                    frames.push(frame);
                }
            }
            rest = &rest[pos + 1..];
        }

        if !self.oversized {
            self.pending.extend_from_slice(rest);
            if self.pending.len() > self.max_line {
                let held = std::mem::take(&mut self.pending).len();
                self.discard_oversized(held);
                self.oversized = true;
            }
        }

        frames
    }

    /// Flush the buffered tail once the stream has ended.
    ///
    /// A final line without a trailing newline is still a complete frame.
    pub fn finish(&mut self) -> Option<StreamFrame> {
        if std::mem::take(&mut self.oversized) || self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        self.decode_line(&line)
    }

    /// Non-frame and oversized lines dropped so far.
    pub fn discarded_lines(&self) -> u64 {
        self.discarded_lines
    }

    fn discard_oversized(&mut self, bytes: usize) {
        self.discarded_lines += 1;
        tracing::warn!(bytes, max_line = self.max_line, "discarding oversized line");
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamFrame> {
        if raw.len() > self.max_line {
            self.discard_oversized(raw.len());
            return None;
        }
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);

        match line.strip_prefix(DATA_PREFIX) {
            Some(payload) => {
                let frame = StreamFrame {
                    seq: self.next_seq,
                    payload: payload.to_string(),
                };
                self.next_seq += 1;
                Some(frame)
            }
            None => {
                if !line.is_empty() {
                    self.discarded_lines += 1;
                    tracing::trace!(line = %line, "discarding non-data line");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRE: &str = "data: {\"type\": \"log\", \"data\": \"Scraping landing page\"}\n\n\
                        : keep-alive comment\n\
                        data: {\"type\": \"heartbeat\"}\n\n\
                        event: ignored\n\
                        data: {\"type\": \"log\", \"data\": \"Farbanalyse läuft ✓\"}\n\n\
                        data: {\"type\": \"result\", \"data\": {\"overall_score\": 71.0}}\n\n";

    fn payloads(frames: &[StreamFrame]) -> Vec<String> {
        frames.iter().map(|f| f.payload.clone()).collect()
    }

    fn decode_all(chunks: &[&[u8]]) -> Vec<StreamFrame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.push(chunk));
        }
        frames.extend(decoder.finish());
        frames
    }

    #[test]
    fn test_single_chunk_yields_data_frames_in_order() {
        let frames = decode_all(&[WIRE.as_bytes()]);
        assert_eq!(frames.len(), 4);
        assert_eq!(
            frames.iter().map(|f| f.seq).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(frames[1].payload, "{\"type\": \"heartbeat\"}");
    }

    #[test]
    fn test_every_two_way_split_matches_unsplit() {
        let bytes = WIRE.as_bytes();
        let expected = decode_all(&[bytes]);

        for cut in 0..=bytes.len() {
            let (a, b) = bytes.split_at(cut);
            assert_eq!(decode_all(&[a, b]), expected, "split at byte {cut}");
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_unsplit() {
        let bytes = WIRE.as_bytes();
        let expected = decode_all(&[bytes]);
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&singles), expected);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "data: {\"type\": \"log\", \"data\": \"Prüfung\"}\n";
        let bytes = line.as_bytes();
        let umlaut = line.find('ü').unwrap();

        let frames = decode_all(&[&bytes[..umlaut + 1], &bytes[umlaut + 1..]]);
        assert_eq!(
            payloads(&frames),
            vec!["{\"type\": \"log\", \"data\": \"Prüfung\"}"]
        );
    }

    #[test]
    fn test_partial_line_is_buffered_until_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\": \"lo").is_empty());
        assert_eq!(decoder.pending.len(), 18);

        let frames = decoder.push(b"g\", \"data\": \"x\"}\n");
        assert_eq!(payloads(&frames), vec!["{\"type\": \"log\", \"data\": \"x\"}"]);
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let frames = decode_all(&[b"data: one\r\n\r\ndata: two\r\n"]);
        assert_eq!(payloads(&frames), vec!["one", "two"]);
    }

    #[test]
    fn test_unterminated_final_line_flushed_on_finish() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        let frame = decoder.finish().expect("tail frame");
        assert_eq!(frame.payload, "tail");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_non_data_lines_are_discarded() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data:missing-space\nid: 7\nretry: 100\n\ndata: ok\n");
        assert_eq!(payloads(&frames), vec!["ok"]);
        assert_eq!(decoder.discarded_lines(), 3);
    }

    #[test]
    fn test_oversized_line_is_dropped_without_newline() {
        let mut decoder = FrameDecoder::with_max_line(16);
        assert!(decoder.push(b"data: aaaaaaaaaaaaaaaaaaaaaaaa").is_empty());
        assert!(decoder.pending.is_empty());
        assert!(decoder.push(b"bbbbbbbbbbbbbbbb").is_empty());
        assert!(decoder.pending.is_empty());

        let frames = decoder.push(b"cc\ndata: ok\n");
        assert_eq!(payloads(&frames), vec!["ok"]);
        assert_eq!(decoder.discarded_lines(), 1);
    }

    #[test]
    fn test_oversized_line_dropped_regardless_of_split() {
        let wire = b"data: short\ndata: this line is far too long\ndata: next\n";
        let whole = {
            let mut decoder = FrameDecoder::with_max_line(16);
            let frames = decoder.push(wire);
            assert_eq!(decoder.discarded_lines(), 1);
            frames
        };
        assert_eq!(payloads(&whole), vec!["short", "next"]);

        for cut in 0..=wire.len() {
            let mut decoder = FrameDecoder::with_max_line(16);
            let mut frames = decoder.push(&wire[..cut]);
            frames.extend(decoder.push(&wire[cut..]));
            frames.extend(decoder.finish());
            assert_eq!(payloads(&frames), payloads(&whole), "split at byte {cut}");
        }
    }

    #[test]
    fn test_oversized_tail_not_flushed() {
        let mut decoder = FrameDecoder::with_max_line(8);
        assert!(decoder.push(b"data: 0123456789").is_empty());
        assert!(decoder.finish().is_none());
    }
}

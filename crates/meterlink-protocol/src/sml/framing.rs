//! SML transport escapes: frame boundary recognition and payload escaping.
//!
//! Recognition is anchored at the end of the accumulated buffer. Starting
//! at a start escape, the payload is walked in 4-byte words; a marker word
//! followed by another marker word is escaped payload, a marker word
//! followed by `1a` is the end escape. A buffer holds a complete frame
//! only once such an end escape plus trailer ends exactly at its last byte:
//!
//! ```text
//! .. 1b1b1b1b 01010101 ..1b1b1b1b 1b1b1b1b.. 1b1b1b1b 1a NN C1 C2|<- end of buffer
//!    `-- start escape`   `-- escaped marker`  `-- end escape + trailer`
//! ```
//!
//! Bytes before the first start escape are not discarded by recognition;
//! the decoder simply starts at the first start escape. An escape word
//! that is neither doubled nor an end escape aborts the frame, and the walk
//! resumes at the next start escape.

use std::ops::Range;

use meterlink_core::constants::{SML_END_MARKER, SML_ESCAPE, SML_MIN_FRAME_LEN, SML_START_ESCAPE};

const WORD: usize = 4;

/// Offset of the first start escape in `buffer`.
#[must_use]
pub fn find_start_escape(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(SML_START_ESCAPE.len())
        .position(|window| window == SML_START_ESCAPE)
}

/// Complete frames of a buffer, in stream order.
struct Frames<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl Iterator for Frames<'_> {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        let buffer = self.buffer;
        let mut start = self.pos + find_start_escape(buffer.get(self.pos..)?)?;
        let mut pos = start + SML_START_ESCAPE.len();

        while pos + 2 * WORD <= buffer.len() {
            if buffer[pos..pos + WORD] != SML_ESCAPE {
                pos += WORD;
                continue;
            }
            let next = &buffer[pos + WORD..pos + 2 * WORD];
            if next == SML_ESCAPE {
                pos += 2 * WORD;
            } else if next[0] == SML_END_MARKER {
                self.pos = pos + 2 * WORD;
                return Some(start..self.pos);
            } else {
                // Restarted or corrupt frame
                start = pos + find_start_escape(&buffer[pos..])?;
                pos = start + SML_START_ESCAPE.len();
            }
        }

        self.pos = buffer.len();
        None
    }
}

fn frames(buffer: &[u8]) -> Frames<'_> {
    Frames { buffer, pos: 0 }
}

/// Whether `buffer` ends exactly at the end of a complete frame.
#[must_use]
pub fn ends_with_complete_frame(buffer: &[u8]) -> bool {
    if buffer.len() < SML_MIN_FRAME_LEN {
        return false;
    }
    frames(buffer)
        .last()
        .is_some_and(|frame| frame.end == buffer.len())
}

/// Byte range of the first complete frame in `buffer`.
#[must_use]
pub fn locate_frame(buffer: &[u8]) -> Option<Range<usize>> {
    frames(buffer).next()
}

/// Remove escape doubling from the payload between start and end escape.
#[must_use]
pub fn unescape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut pos = 0;
    while pos < payload.len() {
        let end = (pos + WORD).min(payload.len());
        let word = &payload[pos..end];
        out.extend_from_slice(word);
        if word == SML_ESCAPE && payload.get(end..end + WORD) == Some(&SML_ESCAPE[..]) {
            pos = end + WORD;
        } else {
            pos = end;
        }
    }
    out
}

/// Double every aligned marker word of a 4-byte padded payload.
#[must_use]
pub fn escape(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2 * WORD);
    for word in payload.chunks(WORD) {
        out.extend_from_slice(word);
        if word == SML_ESCAPE {
            out.extend_from_slice(&SML_ESCAPE);
        }
    }
    out
}

//! Incremental UTF-8 decoding of network chunks.
//!
//! A multi-byte character may be split across two reads. The decoder keeps
//! the incomplete tail and prefixes it to the next chunk instead of emitting
//! replacement characters.

use crate::client::ClientError;

/// Text decoded from one chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// All complete text up to the chunk end or the first invalid sequence.
    pub text: String,
    /// Absolute body offset of a sequence that can never be valid UTF-8.
    pub malformed_at: Option<u64>,
}

/// Stateful UTF-8 decoder for a single response body.
///
/// Decoding stops at the first invalid sequence. Everything after it,
/// including later chunks, is discarded.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
    consumed: u64,
    halted: bool,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, returning all text that is complete so far.
    ///
    /// Bytes belonging to a character that continues in the next chunk are
    /// retained. When an invalid sequence is found, the text before it is
    /// still returned together with its offset.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Decoded, ClientError> {
        if self.halted {
            return Ok(Decoded::default());
        }

        let input = if self.carry.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(chunk);
            joined
        };

        let e = match String::from_utf8(input) {
            Ok(text) => {
                self.consumed += text.len() as u64;
                return Ok(Decoded {
                    text,
                    malformed_at: None,
                });
            }
            Err(e) => e,
        };

        let utf8_error = e.utf8_error();
        let valid_up_to = utf8_error.valid_up_to();
        let offset = self.consumed + valid_up_to as u64;

        let mut bytes = e.into_bytes();
        let rest = bytes.split_off(valid_up_to);
        let malformed_at = if utf8_error.error_len().is_some() {
            self.halted = true;
            Some(offset)
        } else {
            // Only an incomplete trailing sequence remains.
            self.carry = rest;
            None
        };
        self.consumed = offset;

        let text =
            String::from_utf8(bytes).map_err(|_| ClientError::MalformedEncoding { offset })?;
        Ok(Decoded { text, malformed_at })
    }

    /// Signal end of body.
    ///
    /// Returns the offset of leftover bytes that can no longer form a
    /// character.
    pub fn finish(&mut self) -> Option<u64> {
        if self.halted || self.carry.is_empty() {
            return None;
        }
        self.carry.clear();
        Some(self.consumed)
    }

    /// Number of bytes currently held back.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

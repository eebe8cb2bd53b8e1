//! Newline-delimited JSON decoding for Ollama's streaming endpoints.
//!
//! Ollama writes one JSON object per line, and a network chunk may end in the
//! middle of a line (or of a UTF-8 character). [`NdjsonDecoder`] keeps the
//! unterminated tail between chunks; [`decode_stream`] drives it over a byte
//! stream.
//!
//! Lines that do not parse are dropped rather than reported, so a blank or
//! garbled line never ends a pull or chat early.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use log::debug;
use serde_json::Value;

/// Incremental line splitter and parser. One instance per response body.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the values of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(value) = parse_line(&self.buffer[start..end]) {
                values.push(value);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        values
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Ends decoding. An unterminated trailing line is discarded, not parsed.
    pub fn finish(self) {
        if !self.buffer.is_empty() {
            debug!(
                "Discarding {} bytes of unterminated NDJSON at end of stream",
                self.buffer.len()
            );
        }
    }
}

fn parse_line(line: &[u8]) -> Option<Value> {
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }
    match serde_json::from_slice::<Value>(line) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(
                "Skipping malformed NDJSON line ({}): {}",
                e,
                String::from_utf8_lossy(line)
            );
            None
        }
    }
}

/// Decodes a chunked body into a lazy, single-pass sequence of JSON values.
///
/// A source error is yielded once and ends the sequence.
pub fn decode_stream<S, E>(source: S) -> impl Stream<Item = Result<Value, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Send,
{
    async_stream::stream! {
        let mut source = std::pin::pin!(source);
        let mut decoder = NdjsonDecoder::new();

        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(bytes) => {
                    for value in decoder.push(&bytes) {
                        yield Ok(value);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        decoder.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    const PAYLOAD: &str = "{\"status\":\"pulling manifest\"}\n{\"status\":\"downloading\",\"completed\":10}\n{\"message\":{\"content\":\"h\u{e9}llo \u{1f980}\"}}\n{\"status\":\"success\"}\n";

    fn expected() -> Vec<Value> {
        vec![
            json!({"status": "pulling manifest"}),
            json!({"status": "downloading", "completed": 10}),
            json!({"message": {"content": "h\u{e9}llo \u{1f980}"}}),
            json!({"status": "success"}),
        ]
    }

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<Value> {
        let mut decoder = NdjsonDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk));
        }
        decoder.finish();
        out
    }

    #[test]
    fn single_chunk_decodes_every_line_in_order() {
        assert_eq!(decode_chunks(&[PAYLOAD.as_bytes()]), expected());
    }

    #[test]
    fn every_two_way_split_gives_same_values() {
        let bytes = PAYLOAD.as_bytes();
        for cut in 0..=bytes.len() {
            let (a, b) = bytes.split_at(cut);
            assert_eq!(decode_chunks(&[a, b]), expected(), "split at byte {}", cut);
        }
    }

    #[test]
    fn every_three_way_split_gives_same_values() {
        let bytes = PAYLOAD.as_bytes();
        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let chunks = [&bytes[..i], &bytes[i..j], &bytes[j..]];
                assert_eq!(decode_chunks(&chunks), expected(), "splits at {} and {}", i, j);
            }
        }
    }

    #[test]
    fn byte_at_a_time_gives_same_values() {
        let chunks: Vec<&[u8]> = PAYLOAD.as_bytes().chunks(1).collect();
        assert_eq!(decode_chunks(&chunks), expected());
    }

    #[test]
    fn invalid_line_is_skipped_and_later_lines_survive() {
        let input = b"{\"status\":\"a\"}\n{not json\n\n   \n{\"status\":\"b\"}\n";
        assert_eq!(
            decode_chunks(&[input]),
            vec![json!({"status": "a"}), json!({"status": "b"})]
        );
    }

    #[test]
    fn carriage_returns_are_tolerated() {
        let input = b"{\"status\":\"a\"}\r\n{\"status\":\"b\"}\r\n";
        assert_eq!(
            decode_chunks(&[input]),
            vec![json!({"status": "a"}), json!({"status": "b"})]
        );
    }

    #[test]
    fn unterminated_tail_is_held_then_discarded() {
        let mut decoder = NdjsonDecoder::new();
        let values = decoder.push(b"{\"status\":\"a\"}\n{\"status\":\"b\"}");
        assert_eq!(values, vec![json!({"status": "a"})]);
        assert_eq!(decoder.pending(), b"{\"status\":\"b\"}");
        decoder.finish();
    }

    #[test]
    fn stream_yields_values_then_ends() {
        let chunks: Vec<Result<Bytes, ()>> = PAYLOAD
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let values: Vec<Value> = block_on(
            decode_stream(futures::stream::iter(chunks))
                .map(|item| item.unwrap())
                .collect(),
        );
        assert_eq!(values, expected());
    }

    #[test]
    fn stream_forwards_source_error_and_stops() {
        let chunks: Vec<Result<Bytes, &str>> = vec![
            Ok(Bytes::from_static(b"{\"status\":\"a\"}\n{\"sta")),
            Err("connection reset"),
            Ok(Bytes::from_static(b"tus\":\"b\"}\n")),
        ];
        let items: Vec<Result<Value, &str>> =
            block_on(decode_stream(futures::stream::iter(chunks)).collect());
        assert_eq!(items, vec![Ok(json!({"status": "a"})), Err("connection reset")]);
    }
}

//! Incremental SSE decoding.
//!
//! Bytes are buffered until a `\n` arrives. A newline byte never occurs
//! inside a multi-byte UTF-8 sequence, so a code point split across two
//! chunks stays in the residual buffer until its line is complete.

/// Payload that marks the end of a token stream. Never parsed.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded SSE unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: Option<String>,
    pub data: String,
}

/// How decoded lines are grouped into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Every `data:` line is a frame. A preceding `event:` tag applies to the
    /// next data line only.
    Lines,
    /// A blank line ends a frame. Data lines inside one block are joined
    /// with `\n` and the tag resets at the block boundary.
    Blocks,
}

/// `event:` tag waiting for the data it applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingEventTag(Option<String>);

impl PendingEventTag {
    pub fn set(&mut self, tag: impl Into<String>) {
        self.0 = Some(tag.into());
    }

    /// Consumes the tag; the next data line sees no tag unless a new one arrives.
    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    #[cfg(test)]
    pub(crate) fn peek(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Byte accumulator that hands out complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends `chunk` and returns every line completed by it, without the
    /// terminator. The partial tail is kept for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let Some(last_newline) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.buf.drain(..=last_newline).collect();
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(decode_line)
            .collect()
    }

    /// Bytes received after the last complete line.
    #[cfg(test)]
    pub(crate) fn residual(&self) -> &[u8] {
        &self.buf
    }

    /// Drains the residual as a final line, if there is one.
    pub fn take_residual(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

enum Line<'a> {
    Blank,
    Event(&'a str),
    Data(&'a str),
    Other,
}

fn classify(line: &str) -> Line<'_> {
    if line.trim().is_empty() {
        return Line::Blank;
    }
    if let Some(rest) = line.strip_prefix("event:") {
        return Line::Event(rest.trim());
    }
    if let Some(rest) = line.strip_prefix("data:") {
        return Line::Data(rest);
    }
    Line::Other
}

fn accept_payload(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == DONE_SENTINEL {
        return None;
    }
    Some(trimmed.to_string())
}

/// Stateful decoder for one exchange: bytes in, frames out.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    lines: LineBuffer,
    pending_tag: PendingEventTag,
    block_data: Vec<String>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            lines: LineBuffer::default(),
            pending_tag: PendingEventTag::default(),
            block_data: Vec::new(),
        }
    }

    /// Feeds one chunk and returns every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for line in self.lines.push(chunk) {
            self.push_line(&line, &mut frames);
        }
        frames
    }

    /// Flushes the partial line and, for block framing, the unterminated
    /// block. Call once when the upstream closes.
    pub fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if let Some(line) = self.lines.take_residual() {
            self.push_line(&line, &mut frames);
        }
        if self.framing == Framing::Blocks {
            self.flush_block(&mut frames);
        }
        frames
    }

    fn push_line(&mut self, line: &str, out: &mut Vec<Frame>) {
        match classify(line) {
            Line::Blank => {
                if self.framing == Framing::Blocks {
                    self.flush_block(out);
                }
            }
            Line::Event(name) => self.pending_tag.set(name),
            Line::Data(payload) => match self.framing {
                Framing::Lines => {
                    let event = self.pending_tag.take();
                    if let Some(data) = accept_payload(payload) {
                        out.push(Frame { event, data });
                    }
                }
                Framing::Blocks => self.block_data.push(payload.trim().to_string()),
            },
            Line::Other => {}
        }
    }

    fn flush_block(&mut self, out: &mut Vec<Frame>) {
        let event = self.pending_tag.take();
        if self.block_data.is_empty() {
            return;
        }
        let data = self.block_data.drain(..).collect::<Vec<_>>().join("\n");
        if let Some(data) = accept_payload(&data) {
            out.push(Frame { event, data });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: Option<&str>, data: &str) -> Frame {
        Frame {
            event: event.map(ToOwned::to_owned),
            data: data.to_string(),
        }
    }

    #[test]
    fn line_buffer_keeps_partial_tail() {
        let mut lines = LineBuffer::default();
        assert!(lines.push(b"data: {\"a\"").is_empty());
        assert_eq!(lines.push(b":1}\n\ndata: x"), vec!["data: {\"a\":1}", ""]);
        assert_eq!(lines.residual(), b"data: x");
        assert_eq!(lines.take_residual().as_deref(), Some("data: x"));
        assert!(lines.take_residual().is_none());
    }

    #[test]
    fn split_code_point_is_deferred() {
        let bytes = "data: {\"text\":\"h\u{e9}llo \u{1f600}\"}\n".as_bytes();
        let e_acute = bytes.iter().position(|b| *b == 0xc3).expect("multi-byte start");
        let mut decoder = FrameDecoder::new(Framing::Lines);
        assert!(decoder.push_chunk(&bytes[..e_acute + 1]).is_empty());
        let frames = decoder.push_chunk(&bytes[e_acute + 1..]);
        assert_eq!(frames, vec![frame(None, "{\"text\":\"h\u{e9}llo \u{1f600}\"}")]);
    }

    #[test]
    fn event_tag_survives_chunk_boundary_and_resets_after_one_data_line() {
        let mut decoder = FrameDecoder::new(Framing::Lines);
        assert!(decoder.push_chunk(b"event: text\n").is_empty());
        let frames = decoder.push_chunk(b"data: {\"text\":\"a\"}\ndata: {\"text\":\"b\"}\n");
        assert_eq!(
            frames,
            vec![
                frame(Some("text"), "{\"text\":\"a\"}"),
                frame(None, "{\"text\":\"b\"}"),
            ]
        );
    }

    #[test]
    fn done_sentinel_and_noise_are_dropped() {
        let mut decoder = FrameDecoder::new(Framing::Lines);
        let frames = decoder.push_chunk(
            b": keep-alive\nid: 7\nretry: 1000\ndata: {\"n\":1}\r\ndata: [DONE]\ndata:   \n",
        );
        assert_eq!(frames, vec![frame(None, "{\"n\":1}")]);
    }

    #[test]
    fn block_framing_joins_data_lines_and_resets_tag() {
        let mut decoder = FrameDecoder::new(Framing::Blocks);
        let frames = decoder.push_chunk(
            b"event: meta\ndata: {\"a\":\ndata: 1}\n\ndata: {\"b\":2}\r\n\r\nevent: orphan\n\n",
        );
        assert_eq!(
            frames,
            vec![frame(Some("meta"), "{\"a\":\n1}"), frame(None, "{\"b\":2}")]
        );
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_input() {
        let mut lines = FrameDecoder::new(Framing::Lines);
        assert!(lines.push_chunk(b"data: {\"last\":true}").is_empty());
        assert_eq!(lines.finish(), vec![frame(None, "{\"last\":true}")]);

        let mut blocks = FrameDecoder::new(Framing::Blocks);
        assert!(blocks.push_chunk(b"data: {\"a\":1}\n").is_empty());
        assert_eq!(blocks.finish(), vec![frame(None, "{\"a\":1}")]);
    }

    #[test]
    fn pending_tag_is_explicit_state() {
        let mut tag = PendingEventTag::default();
        tag.set("done");
        assert_eq!(tag.peek(), Some("done"));
        assert_eq!(tag.take().as_deref(), Some("done"));
        assert_eq!(tag.take(), None);
    }
}

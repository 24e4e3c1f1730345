//! Incremental parser for `text/event-stream` bodies.
//!
//! Chunks arrive at arbitrary byte boundaries, including in the middle of a
//! UTF-8 sequence, so bytes are buffered until a blank line closes a frame.

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
  pub event: Option<String>,
  pub id:    Option<String>,
  pub data:  String,
}

#[derive(Debug, Default)]
pub struct SseParser {
  buf: Vec<u8>,
}

impl SseParser {
  /// Feed a chunk and return every frame it completed.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
    self.buf.extend_from_slice(chunk);
    let mut frames = Vec::new();
    while let Some((end, sep)) = find_boundary(&self.buf) {
      let block: Vec<u8> = self.buf.drain(..end + sep).collect();
      if let Some(frame) = parse_block(&String::from_utf8_lossy(&block[..end])) {
        frames.push(frame);
      }
    }
    frames
  }
}

/// Position and length of the first blank-line separator, LF or CRLF.
fn find_boundary(buf: &[u8]) -> Option<(usize, usize)> {
  let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
  let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
  match (lf, crlf) {
    (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
    (a, b) => a.or(b),
  }
}

/// Comment-only blocks (keep-alives) yield `None`.
fn parse_block(block: &str) -> Option<SseFrame> {
  let mut frame = SseFrame::default();
  let mut data = Vec::new();
  let mut seen = false;

  for line in block.lines() {
    if line.is_empty() || line.starts_with(':') {
      continue;
    }
    let (field, value) = match line.split_once(':') {
      Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
      None => (line, ""),
    };
    match field {
      "event" => frame.event = Some(value.to_owned()),
      "id" => frame.id = Some(value.to_owned()),
      "data" => data.push(value),
      _ => continue,
    }
    seen = true;
  }

  if !seen {
    return None;
  }
  frame.data = data.join("\n");
  Some(frame)
}

//! Server-sent event decoding.
//!
//! [`RecordSplitter`] turns raw byte chunks into complete [`SseRecord`]s.
//! The [`delta`] and [`typed`] decoders turn records into vendor frames.

pub mod delta;
pub mod typed;

use crate::error::{ClassifiedError, ErrorKind};

/// One SSE record: the fields seen up to a blank line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseRecord {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`; `None` if the record had none.
    pub data: Option<String>,
    pub id: Option<String>,
}

impl SseRecord {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn event(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: Some(data.into()),
            id: None,
        }
    }
}

/// Incremental splitter from bytes to records.
///
/// Holds only the bytes of the current unterminated line and the fields of
/// the current record, so memory stays bounded by one record. Lines end in
/// LF, CRLF or CR; a CRLF split across chunks counts once.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    line: Vec<u8>,
    pending_cr: bool,
    started: bool,
    current: SseRecord,
    has_fields: bool,
}

impl RecordSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every record it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        let mut records = Vec::new();
        let mut rest = chunk;

        if self.pending_cr {
            self.pending_cr = false;
            if let Some((b'\n', tail)) = rest.split_first() {
                rest = tail;
            }
        }

        while let Some(pos) = rest.iter().position(|b| *b == b'\n' || *b == b'\r') {
            self.line.extend_from_slice(&rest[..pos]);
            let terminator = rest[pos];
            rest = &rest[pos + 1..];
            if terminator == b'\r' {
                match rest.first() {
                    Some(b'\n') => rest = &rest[1..],
                    Some(_) => {}
                    None => self.pending_cr = true,
                }
            }
            if let Some(record) = self.end_line() {
                records.push(record);
            }
        }
        self.line.extend_from_slice(rest);
        records
    }

    /// Signal end of input. A non-empty unterminated record is an error.
    pub fn finish(&mut self) -> Result<(), ClassifiedError> {
        let partial_line = String::from_utf8_lossy(&self.line);
        let partial_line = partial_line.trim();
        let dangling = !partial_line.is_empty() && !partial_line.starts_with(':');
        if dangling || self.has_fields {
            let preview: String = partial_line.chars().take(80).collect();
            self.line.clear();
            self.current = SseRecord::default();
            self.has_fields = false;
            return Err(ClassifiedError::new(
                ErrorKind::StreamError,
                format!("stream ended inside an incomplete event record: {preview:?}"),
            ));
        }
        Ok(())
    }

    /// Bytes currently buffered for the unterminated line.
    pub fn buffered_len(&self) -> usize {
        self.line.len()
    }

    fn end_line(&mut self) -> Option<SseRecord> {
        let raw = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if !self.started {
            self.started = true;
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }

        if line.is_empty() {
            if !self.has_fields {
                return None;
            }
            self.has_fields = false;
            return Some(std::mem::take(&mut self.current));
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => match self.current.data {
                Some(ref mut data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.current.data = Some(value.to_string()),
            },
            "id" => self.current.id = Some(value.to_string()),
            _ => return None,
        }
        self.has_fields = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split_all(chunks: &[&[u8]]) -> Vec<SseRecord> {
        let mut splitter = RecordSplitter::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(splitter.push(chunk));
        }
        splitter.finish().expect("complete stream");
        out
    }

    #[test]
    fn splits_on_blank_lines() {
        let records = split_all(&[b"data: one\n\ndata: two\n\n"]);
        assert_eq!(records, vec![SseRecord::data("one"), SseRecord::data("two")]);
    }

    #[test]
    fn record_split_across_chunks_matches_whole() {
        let whole = split_all(&[b"data: {\"choices\":[]}\n\n"]);
        let split = split_all(&[b"data: {\"choi", b"ces\":[]}\n", b"\n"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn handles_crlf_and_cr_line_endings() {
        let crlf = split_all(&[b"event: ping\r\ndata: {}\r\n\r\n"]);
        assert_eq!(crlf, vec![SseRecord::event("ping", "{}")]);

        let split_crlf = split_all(&[b"event: ping\r", b"\ndata: {}\r", b"\n\r", b"\n"]);
        assert_eq!(split_crlf, crlf);

        let cr = split_all(&[b"data: a\r\r"]);
        assert_eq!(cr, vec![SseRecord::data("a")]);
    }

    #[test]
    fn joins_multiple_data_lines_and_ignores_comments() {
        let records = split_all(&[b": keep-alive\n\ndata: a\ndata:b\nretry: 10\n\n"]);
        assert_eq!(records, vec![SseRecord::data("a\nb")]);
    }

    #[test]
    fn event_without_data() {
        let records = split_all(&[b"event: ping\n\n"]);
        assert_eq!(
            records,
            vec![SseRecord {
                event: Some("ping".into()),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn reassembles_utf8_split_across_chunks() {
        let bytes = "data: héllo\n\n".as_bytes();
        let cut = "data: h".len() + 1;
        let records = split_all(&[&bytes[..cut], &bytes[cut..]]);
        assert_eq!(records, vec![SseRecord::data("héllo")]);
    }

    #[test]
    fn incomplete_trailing_record_is_a_stream_error() {
        let mut splitter = RecordSplitter::new();
        assert!(splitter.push(b"data: {\"partial\"").is_empty());
        let err = splitter.finish().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamError);

        let mut splitter = RecordSplitter::new();
        splitter.push(b"data: complete-line\n");
        assert!(splitter.finish().is_err());
    }

    #[test]
    fn trailing_whitespace_or_comment_is_not_an_error() {
        let mut splitter = RecordSplitter::new();
        splitter.push(b"data: x\n\n  ");
        assert!(splitter.finish().is_ok());

        let mut splitter = RecordSplitter::new();
        splitter.push(b": ping");
        assert!(splitter.finish().is_ok());
    }

    #[test]
    fn buffer_holds_only_the_partial_line() {
        let mut splitter = RecordSplitter::new();
        let records = splitter.push(b"data: first\n\ndata: sec");
        assert_eq!(records.len(), 1);
        assert_eq!(splitter.buffered_len(), "data: sec".len());
    }

    #[test]
    fn strips_leading_bom() {
        let records = split_all(&["\u{feff}data: x\n\n".as_bytes()]);
        assert_eq!(records, vec![SseRecord::data("x")]);
    }
}

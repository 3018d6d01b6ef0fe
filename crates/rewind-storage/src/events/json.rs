//! Frame a streamed session as a single JSON array

use std::io::Write;

use rewind_core::StorageError;

/// Writes `[`, the payloads separated by `,\n`, then `]`
///
/// Driven by the `(payload, position, total)` triples of
/// [`EventStore::stream`](rewind_core::EventStore::stream). Because `total` is
/// known up front, nothing is buffered beyond the payload being written.
pub struct JsonArrayWriter<W: Write> {
    out: W,
    opened: bool,
    closed: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            opened: false,
            closed: false,
        }
    }

    /// Write one event at `position` of `total`
    pub fn write_event(
        &mut self,
        payload: &[u8],
        position: u64,
        total: u64,
    ) -> Result<(), StorageError> {
        if position == 0 {
            self.out.write_all(b"[")?;
            self.opened = true;
        } else {
            self.out.write_all(b",\n")?;
        }
        self.out.write_all(payload)?;
        if position + 1 == total {
            self.out.write_all(b"]")?;
            self.closed = true;
        }
        Ok(())
    }

    /// Close the array and hand back the writer
    ///
    /// Emits `[]` when no event was written. Fails if the stream stopped
    /// part way through an array.
    pub fn finish(mut self) -> Result<W, StorageError> {
        match (self.opened, self.closed) {
            (false, _) => self.out.write_all(b"[]")?,
            (true, true) => {}
            (true, false) => {
                return Err(StorageError::invariant("event stream ended before its total"));
            }
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payloads: &[&str]) -> String {
        let total = payloads.len() as u64;
        let mut writer = JsonArrayWriter::new(Vec::new());
        for (position, payload) in payloads.iter().enumerate() {
            writer
                .write_event(payload.as_bytes(), position as u64, total)
                .unwrap();
        }
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_framing() {
        assert_eq!(frame(&[]), "[]");
        assert_eq!(frame(&["1"]), "[1]");
        assert_eq!(frame(&["{\"a\":1}", "2", "\"x\""]), "[{\"a\":1},\n2,\n\"x\"]");
    }

    #[test]
    fn test_output_parses_as_json() {
        let out = frame(&["{\"type\":2}", "{\"type\":3,\"data\":{}}"]);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut writer = JsonArrayWriter::new(Vec::new());
        writer.write_event(b"1", 0, 3).unwrap();
        assert!(matches!(writer.finish(), Err(StorageError::Invariant(_))));
    }
}

use serde_json::Value;

use crate::error::RooletError;

/// Reassembles newline-delimited JSON objects out of arbitrary socket reads.
///
/// Holds a single reassembly buffer and one completed slot (`spec.md` §4.2).
/// A chunk may carry several concatenated objects; [`FrameBuilder::append`]
/// and [`FrameBuilder::take`] promote one object at a time into the
/// completed slot, retaining anything past it in `buffer` for the next call
/// instead of discarding it.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    buffer: String,
    completed: Option<Value>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff a fully-decoded frame is waiting to be [`take`](Self::take)n.
    pub fn is_done(&self) -> bool {
        self.completed.is_some()
    }

    /// Feeds a raw chunk read from the socket.
    ///
    /// The chunk may contain zero, one, or several newline-terminated JSON
    /// objects plus a trailing partial one. Only one object is promoted to
    /// the completed slot per call; any further complete or partial objects
    /// stay buffered and are picked up by the next [`append`](Self::append)
    /// or [`take`](Self::take) call, so a chunk with several concatenated
    /// objects (`spec.md` §4.2) is drained one at a time rather than
    /// rejected.
    pub fn append(&mut self, chunk: &str) -> Result<(), RooletError> {
        self.buffer.push_str(chunk);
        if self.completed.is_none() {
            self.advance()?;
        }
        Ok(())
    }

    /// Pulls at most one complete object out of `buffer`, starting from its
    /// first newline. A line is only ever parsed once its terminating `\n`
    /// has arrived, so a genuinely incomplete object never reaches
    /// `serde_json` at all; a parse failure on a newline-terminated line is
    /// therefore always a real syntax error, fatal for the session.
    fn advance(&mut self) -> Result<(), RooletError> {
        while self.completed.is_none() {
            let Some(pos) = self.buffer.find('\n') else {
                return Ok(());
            };
            let line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(value) if value.is_object() => self.completed = Some(value),
                Ok(_) => {
                    return Err(RooletError::Protocol(
                        "frame decoded to a non-object JSON value".to_string(),
                    ))
                }
                Err(err) => return Err(RooletError::FrameDecode(err)),
            }
        }
        Ok(())
    }

    /// Drains the completed slot, if any, then immediately tries to
    /// promote the next object already sitting in `buffer` so a chunk
    /// holding several concatenated frames can be drained one `take()` at a
    /// time without waiting on another socket read in between.
    pub fn take(&mut self) -> Result<Option<Value>, RooletError> {
        let value = self.completed.take();
        self.advance()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_object_split_across_chunks() {
        let object = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        let serialized = format!("{object}\n");

        for split in 1..serialized.len() {
            let (left, right) = serialized.split_at(split);
            let mut builder = FrameBuilder::new();
            builder.append(left).unwrap();
            if !builder.is_done() {
                builder.append(right).unwrap();
            }
            assert!(builder.is_done(), "split at {split} did not complete");
            assert_eq!(builder.take().unwrap().unwrap(), object);
        }
    }

    #[test]
    fn skips_empty_lines() {
        let mut builder = FrameBuilder::new();
        builder.append("\n\n").unwrap();
        assert!(!builder.is_done());
        builder.append("{\"a\":1}\n").unwrap();
        assert!(builder.is_done());
    }

    #[test]
    fn splits_multiple_objects_on_newline() {
        let mut builder = FrameBuilder::new();
        builder.append("{\"a\":1}\n{\"b\":2}\n").unwrap();
        assert!(builder.is_done());
        assert_eq!(
            builder.take().unwrap().unwrap(),
            serde_json::json!({"a": 1})
        );
        // The second object was already buffered; it promotes on its own
        // without needing another `append`.
        assert!(builder.is_done());
        assert_eq!(
            builder.take().unwrap().unwrap(),
            serde_json::json!({"b": 2})
        );
        assert!(!builder.is_done());
    }

    #[test]
    fn appending_past_a_completed_frame_does_not_error() {
        let mut builder = FrameBuilder::new();
        builder.append("{\"a\":1}\n").unwrap();
        // A second object arrives before the first is taken; it must queue
        // rather than raise an error.
        builder.append("{\"b\":2}\n").unwrap();
        assert_eq!(
            builder.take().unwrap().unwrap(),
            serde_json::json!({"a": 1})
        );
        assert_eq!(
            builder.take().unwrap().unwrap(),
            serde_json::json!({"b": 2})
        );
    }

    #[test]
    fn malformed_json_is_fatal() {
        let mut builder = FrameBuilder::new();
        let err = builder.append("{not json at all}\n").unwrap_err();
        assert!(matches!(err, RooletError::FrameDecode(_)));
    }

    #[test]
    fn take_clears_slot_when_buffer_is_empty() {
        let mut builder = FrameBuilder::new();
        builder.append("{\"a\":1}\n").unwrap();
        assert!(builder.take().unwrap().is_some());
        assert!(!builder.is_done());
        assert!(builder.take().unwrap().is_none());
    }
}

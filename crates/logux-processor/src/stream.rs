//! Incremental JSON array output.
//!
//! The dispatcher owns an [`OutputWriter`] and appends commands as they
//! resolve; the transport owns the matching [`OutputStream`] and forwards
//! each fragment as soon as it arrives. The concatenation of all fragments
//! is always one JSON array: `[` first, a comma before every element but the
//! first, and `]` exactly once when the writer is closed or dropped.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::command::OutputCommand;

/// Producer half. Not `Clone`: there is exactly one writer per request.
///
/// `push` never waits for the consumer. Fragments the transport has not yet
/// forwarded stay queued in the channel, so a consumer that stays connected
/// but stops reading holds the answers written so far in memory. The queue
/// is bounded in practice by the batch size, since each input command
/// produces at most two entries.
#[derive(Debug)]
pub struct OutputWriter {
    tx: mpsc::UnboundedSender<String>,
    started: bool,
    closed: bool,
}

/// Consumer half, yielding serialized fragments in push order.
#[derive(Debug)]
pub struct OutputStream {
    inner: UnboundedReceiverStream<String>,
}

impl OutputWriter {
    /// Create a writer/stream pair with the opening `[` already emitted.
    pub fn open() -> (OutputWriter, OutputStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = OutputWriter {
            tx,
            started: false,
            closed: false,
        };
        writer.emit("[".to_string());
        let stream = OutputStream {
            inner: UnboundedReceiverStream::new(rx),
        };
        (writer, stream)
    }

    /// Append one command. Returns `false` once the consumer has gone away;
    /// the command is dropped in that case.
    pub fn push(&mut self, command: &OutputCommand) -> bool {
        let chunk = match serde_json::to_string(command) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::error!(
                    tag = command.tag(),
                    error = %e,
                    "failed to serialize output command"
                );
                return false;
            }
        };
        let fragment = if self.started {
            format!(",{chunk}")
        } else {
            self.started = true;
            chunk
        };
        self.emit(fragment)
    }

    /// True when the [`OutputStream`] has been dropped.
    pub fn is_consumer_gone(&self) -> bool {
        self.tx.is_closed()
    }

    /// Emit the closing `]` and end the stream.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.closed {
            self.closed = true;
            self.emit("]".to_string());
        }
    }

    fn emit(&self, fragment: String) -> bool {
        self.tx.send(fragment).is_ok()
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        self.finish();
    }
}

impl OutputStream {
    /// Wait for the writer to close and return the whole array.
    pub async fn read_to_string(self) -> String {
        self.inner.collect::<Vec<_>>().await.concat()
    }
}

impl Stream for OutputStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

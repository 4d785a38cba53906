// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Error taxonomy surfaced on a request's reply future.

use thiserror::Error;

/// Errors that can terminate a single in-flight request.
///
/// All variants surface exclusively on the reply future returned by
/// [`Pipe::send`](crate::pipe::Pipe::send); none of them propagate to
/// [`Pipe::flush`](crate::pipe::Pipe::flush), which only observes whether
/// the pending and queued sets have drained.
#[derive(Debug, Error)]
pub enum PipeError {
    /// The request exceeded `pending_timeout` on its current attempt.
    #[error("request {id} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Correlation id of the request that timed out.
        id: u64,
        /// Elapsed time on this attempt, in milliseconds.
        elapsed_ms: u64,
    },

    /// `send` was called while the pipe is flushing.
    #[error("pipe is flushing; no new requests are accepted")]
    FlushInProgress,

    /// The sender rejected the request and retries, if any, are exhausted.
    #[error("request {id} failed after {attempts} attempt(s): {source}")]
    Send {
        /// Correlation id of the request that failed.
        id: u64,
        /// Total attempts made (1 + retries actually spent).
        attempts: usize,
        /// The last underlying error returned by the sender.
        #[source]
        source: anyhow::Error,
    },

    /// `send` was called (and admitted) before any sender was registered.
    ///
    /// This is a programmer error rather than a transport failure; it is
    /// reported on the individual request rather than poisoning the pipe.
    #[error("request {id} reached the front of the queue with no sender registered")]
    NotConfigured {
        /// Correlation id of the request that could not be dispatched.
        id: u64,
    },

    /// The pipe's actor task shut down (all handles were dropped) before
    /// this request could reach a terminal event. Not part of the source
    /// taxonomy; an ambient consequence of giving the pipe a real
    /// lifecycle instead of assuming it runs forever.
    #[error("pipe shut down before request could complete")]
    Closed,
}

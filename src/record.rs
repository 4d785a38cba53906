// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The request record: the unit of state the pipe actor tracks per id.

use std::time::Instant;

use tokio::sync::oneshot;
use tokio_util::time::delay_queue;

use crate::error::PipeError;

/// A single live request tracked by the pipe actor. Whether a record is
/// Queued or Pending (spec §3's `phase`) is represented structurally by
/// which collection holds it — the actor's `VecDeque` queue or the
/// `PendingRequests` map — rather than as a field here.
pub(crate) struct Record<Req, Resp> {
    pub(crate) id: u64,
    pub(crate) message: Req,
    pub(crate) reply: Option<oneshot::Sender<Result<Resp, PipeError>>>,
    pub(crate) retry_count: usize,
    /// The `DelayQueue` key for this record's currently-armed timer, if
    /// `pending_timeout` is enabled and the record is in `Pending`. Each
    /// retry removes the old key and inserts a fresh one, so a timer firing
    /// for a since-superseded attempt is structurally impossible: the key
    /// simply no longer exists in the queue.
    pub(crate) timer_key: Option<delay_queue::Key>,
    /// When the current attempt's timer was last armed. Used only to report
    /// `elapsed_ms` on `PipeError::Timeout`; absent when no timeout is
    /// configured.
    pub(crate) attempt_started: Option<Instant>,
}

impl<Req, Resp> Record<Req, Resp> {
    pub(crate) fn new(id: u64, message: Req, reply: oneshot::Sender<Result<Resp, PipeError>>) -> Self {
        Record {
            id,
            message,
            reply: Some(reply),
            retry_count: 0,
            timer_key: None,
            attempt_started: None,
        }
    }

    /// Resolves the reply future. A no-op if already resolved (defends I5:
    /// exactly one terminal event per request).
    pub(crate) fn complete(&mut self, result: Result<Resp, PipeError>) {
        if let Some(reply) = self.reply.take() {
            // The caller may have dropped the reply future; that's fine,
            // there's simply nobody left to observe the result.
            let _ = reply.send(result);
        }
    }
}

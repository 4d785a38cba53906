// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The inbound callable handle returned by [`Pipe::receiver`](crate::pipe::Pipe::receiver).

use tokio::sync::mpsc;

use crate::envelope::Envelope;

/// The transport-facing inbound handle. The pipe's caller should invoke
/// [`Receiver::deliver`] whenever a reply envelope arrives off the wire.
///
/// Delivery is fire-and-forget and non-blocking: it hands the envelope to
/// the pipe actor over an unbounded channel and returns immediately, so it
/// can be called from contexts that aren't themselves `async` (e.g. a
/// transport's own read-loop callback).
pub struct Receiver<Resp> {
    deliver_tx: mpsc::UnboundedSender<Envelope<Resp>>,
}

impl<Resp> Receiver<Resp> {
    pub(crate) fn new(deliver_tx: mpsc::UnboundedSender<Envelope<Resp>>) -> Self {
        Receiver { deliver_tx }
    }

    /// Delivers a reply for `id`. If `id` is not currently pending (it was
    /// already completed, or was never admitted), the delivery is silently
    /// discarded by the actor per invariant I3.
    pub fn deliver(&self, id: u64, message: Resp) {
        // An error here means the actor has shut down; there's no pending
        // request left to discard, so silently dropping is correct.
        let _ = self.deliver_tx.send(Envelope::new(id, message));
    }
}

impl<Resp> Clone for Receiver<Resp> {
    fn clone(&self) -> Self {
        Receiver {
            deliver_tx: self.deliver_tx.clone(),
        }
    }
}

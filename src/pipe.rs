// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The public handle to a pipe: [`Pipe`], the correlated request/response
//! front door, analogous to `tarpc::client::channel::Channel`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::ready;
use tokio::sync::{mpsc, oneshot};

use crate::actor::{Actor, ActorMsg, SenderFn, SharedState};
use crate::config::PipeConfig;
use crate::envelope::Envelope;
use crate::error::PipeError;
use crate::receiver::Receiver;

/// Handles communication from callers into the pipe's actor task.
///
/// Cloning a `Pipe` is cheap: every clone shares the same actor, counters,
/// and registered sender.
pub struct Pipe<Req, Resp> {
    shared: Arc<SharedState>,
    control_tx: mpsc::UnboundedSender<ActorMsg<Req, Resp>>,
    deliver_tx: mpsc::UnboundedSender<Envelope<Resp>>,
    config: PipeConfig,
}

impl<Req, Resp> Clone for Pipe<Req, Resp> {
    fn clone(&self) -> Self {
        Pipe {
            shared: self.shared.clone(),
            control_tx: self.control_tx.clone(),
            deliver_tx: self.deliver_tx.clone(),
            config: self.config.clone(),
        }
    }
}

impl<Req, Resp> Pipe<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    /// Constructs a new pipe, spawning its actor task onto the current
    /// `tokio` runtime. No sender is registered yet; register one with
    /// [`Pipe::set_sender`] before requests can be dispatched.
    pub fn new(config: PipeConfig) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::default());

        let actor = Actor::new(
            config.clone(),
            shared.clone(),
            control_tx.clone(),
            control_rx,
            deliver_rx,
        );
        tokio::spawn(actor.run());

        Pipe {
            shared,
            control_tx,
            deliver_tx,
            config,
        }
    }

    /// Registers the outbound callable used to dispatch admitted requests.
    /// Replaces any previously registered sender; only the most recent
    /// registration is used for subsequent dispatches.
    pub fn set_sender<F, Fut>(&self, mut sender: F)
    where
        F: FnMut(Envelope<Req>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: SenderFn<Req> = Box::new(move |envelope| Box::pin(sender(envelope)));
        // The actor always outlives every Pipe clone that could call this,
        // so a closed channel here only means the whole pipe has already
        // shut down; there's nothing useful to do about that.
        let _ = self.control_tx.send(ActorMsg::SetSender(boxed));
    }

    /// Returns the inbound callable handle: the pipe's transport should
    /// invoke [`Receiver::deliver`] whenever a reply envelope arrives.
    /// Cheap to clone; call this as many times as convenient.
    pub fn receiver(&self) -> Receiver<Resp> {
        Receiver::new(self.deliver_tx.clone())
    }

    /// Sends `message`, returning a future that resolves with the matching
    /// reply or fails with a taxonomised [`PipeError`].
    ///
    /// `message` of `None` is a no-op: no record is created, no future is
    /// produced, and the registered sender is never invoked (spec §8
    /// scenario 2).
    pub fn send(&self, message: Option<Req>) -> Option<ReplyFuture<Resp>> {
        let message = message?;

        // I4, fast path: a `send` arriving after flush has started fails
        // immediately without involving the actor at all. The actor also
        // enforces I4 itself, since this check can race a concurrent
        // `flush()`; this is purely an optimization to skip the round trip
        // in the common case.
        if self.shared.flushing.load(Ordering::Relaxed) {
            let (reply, rx) = oneshot::channel();
            let _ = reply.send(Err(PipeError::FlushInProgress));
            return Some(ReplyFuture { rx });
        }

        // Admission is decided here, synchronously, rather than waiting for
        // the actor to process the message: on a current-thread runtime the
        // actor task may not be polled at all before the caller inspects
        // `pending()`/`queued()` right after `send` returns (spec §8
        // scenario 4 requires exactly that). `reserve_slot` settles which
        // bucket this id counts against; the actor is told the outcome and
        // admits or queues the record to match, rather than recomputing it.
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let admitted = self.reserve_slot();
        let (reply, rx) = oneshot::channel();
        let _ = self.control_tx.send(ActorMsg::Send { id, message, reply, admitted });
        Some(ReplyFuture { rx })
    }

    /// Atomically reserves a pending slot if one is free, otherwise counts
    /// the request as queued. Returns whether a pending slot was reserved.
    /// This is the synchronous half of admission; the actor mirrors this
    /// bucketing when it actually inserts the record into Pending or Queue.
    fn reserve_slot(&self) -> bool {
        let max_pending = self.config.max_pending.get();
        let reserved = self
            .shared
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                (pending < max_pending).then_some(pending + 1)
            })
            .is_ok();
        if !reserved {
            self.shared.queued.fetch_add(1, Ordering::AcqRel);
        }
        reserved
    }

    /// Stops admitting new requests and waits for both the pending and
    /// queued sets to drain. Queued requests keep promoting to pending as
    /// slots free during a flush; only new `send` calls are rejected.
    ///
    /// `flushing` is one-shot: once a pipe has flushed, it stays flushing
    /// for the rest of its life (see `SPEC_FULL.md` §9).
    pub async fn flush(&self) {
        let (resolver, done) = oneshot::channel();
        if self.control_tx.send(ActorMsg::Flush(resolver)).is_ok() {
            // If the actor is already gone, there's nothing left to drain.
            let _ = done.await;
        }
    }

    /// `true` iff both the pending and queued sets are empty.
    pub fn is_idle(&self) -> bool {
        self.pending() + self.queued() == 0
    }

    /// Number of requests currently admitted and in-flight.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed)
    }

    /// Number of requests accepted but not yet admitted.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::Relaxed)
    }

    /// `true` iff the pending set is at capacity.
    pub fn at_max_pending(&self) -> bool {
        self.pending() == self.config.max_pending.get()
    }

    /// `true` iff a flush has been requested on this pipe.
    pub fn flushing(&self) -> bool {
        self.shared.flushing.load(Ordering::Relaxed)
    }

    /// The configuration this pipe was constructed with.
    pub fn config(&self) -> &PipeConfig {
        &self.config
    }
}

/// The future returned by [`Pipe::send`]. Resolves exactly once, with the
/// matching reply or a taxonomised [`PipeError`].
pub struct ReplyFuture<Resp> {
    rx: oneshot::Receiver<Result<Resp, PipeError>>,
}

impl<Resp> Future for ReplyFuture<Resp> {
    type Output = Result<Resp, PipeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(oneshot::error::RecvError { .. }) => Poll::Ready(Err(PipeError::Closed)),
        }
    }
}

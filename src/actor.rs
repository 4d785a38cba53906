// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The pipe actor: the single task that owns all mutable pipe state.
//!
//! This plays the role `tarpc::client::channel::RequestDispatch` plays for
//! that crate's `Channel`: every other task (callers of `send`/`flush`, the
//! receiver handle, the futures spawned to drive a sender invocation)
//! communicates with it exclusively by message, so the invariants in
//! spec §3 (I1-I5) only ever need to be checked from one place.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::poll_fn;
use tokio::sync::{mpsc, oneshot};

use crate::config::PipeConfig;
use crate::envelope::Envelope;
use crate::error::PipeError;
use crate::pending::PendingRequests;
use crate::record::Record;

/// Boxed future returned by a sender invocation.
pub type SenderFuture = std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// The outbound callable a caller registers via [`Pipe::set_sender`](crate::pipe::Pipe::set_sender).
pub type SenderFn<Req> = Box<dyn FnMut(Envelope<Req>) -> SenderFuture + Send>;

pub(crate) enum ActorMsg<Req, Resp> {
    Send {
        id: u64,
        message: Req,
        reply: oneshot::Sender<Result<Resp, PipeError>>,
        /// Whether `Pipe::send` already reserved a pending slot for this id
        /// (see `Pipe::reserve_slot`). `true` means the actor should admit
        /// it directly to Pending; `false` means it was counted against
        /// `queued` and belongs at the back of the Queue.
        admitted: bool,
    },
    SetSender(SenderFn<Req>),
    SenderResult {
        id: u64,
        result: anyhow::Result<()>,
    },
    Flush(oneshot::Sender<()>),
}

/// Counters mirrored out of the actor so that `Pipe`'s observable methods
/// (`pending`, `queued`, `is_idle`, `at_max_pending`, `flushing`) don't need
/// to round-trip through the actor's message channel. `Pipe::send` writes
/// these directly (reserving a slot before the actor even sees the
/// message), and the actor keeps them in step as requests are promoted or
/// complete — see `reserve_slot` in `pipe.rs` for why admission has to be
/// observable synchronously rather than only from inside the actor.
#[derive(Default)]
pub(crate) struct SharedState {
    pub(crate) pending: AtomicUsize,
    pub(crate) queued: AtomicUsize,
    pub(crate) flushing: AtomicBool,
    pub(crate) next_id: AtomicU64,
}

pub(crate) struct Actor<Req, Resp> {
    config: PipeConfig,
    shared: Arc<SharedState>,
    control_tx: mpsc::UnboundedSender<ActorMsg<Req, Resp>>,
    control_rx: mpsc::UnboundedReceiver<ActorMsg<Req, Resp>>,
    deliver_rx: mpsc::UnboundedReceiver<Envelope<Resp>>,
    sender: Option<SenderFn<Req>>,
    queue: VecDeque<Record<Req, Resp>>,
    pending: PendingRequests<Req, Resp>,
    flushing: bool,
    flush_resolver: Option<oneshot::Sender<()>>,
}

impl<Req, Resp> Actor<Req, Resp>
where
    Req: Clone + Send + 'static,
    Resp: Send + 'static,
{
    pub(crate) fn new(
        config: PipeConfig,
        shared: Arc<SharedState>,
        control_tx: mpsc::UnboundedSender<ActorMsg<Req, Resp>>,
        control_rx: mpsc::UnboundedReceiver<ActorMsg<Req, Resp>>,
        deliver_rx: mpsc::UnboundedReceiver<Envelope<Resp>>,
    ) -> Self {
        Actor {
            config,
            shared,
            control_tx,
            control_rx,
            deliver_rx,
            sender: None,
            queue: VecDeque::new(),
            pending: PendingRequests::default(),
            flushing: false,
            flush_resolver: None,
        }
    }

    /// Drives the pipe until every handle (the `Pipe`, the `Receiver`, and
    /// any in-flight sender-invocation tasks) has been dropped.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.control_rx.recv() => {
                    match msg {
                        Some(ActorMsg::Send { id, message, reply, admitted }) => {
                            self.handle_send(id, message, reply, admitted)
                        }
                        Some(ActorMsg::SetSender(sender)) => {
                            log::trace!("sender registered, replacing any previous registration");
                            self.sender = Some(sender);
                        }
                        Some(ActorMsg::SenderResult { id, result }) => self.handle_sender_result(id, result),
                        Some(ActorMsg::Flush(resolver)) => self.handle_flush(resolver),
                        None => {
                            log::info!("pipe handle dropped, shutting down actor");
                            break;
                        }
                    }
                }
                // `Some(envelope) = ... =>` rather than matching on the
                // `Option` ourselves: once every `Receiver` clone is
                // dropped this branch would otherwise resolve to `None` on
                // every poll and spin the select loop. The pattern form
                // instead leaves the branch disabled until the next select
                // call, letting the other branches (which may still have
                // live work) make progress.
                Some(envelope) = self.deliver_rx.recv() => {
                    self.handle_deliver(envelope);
                }
                id = poll_fn(|cx| self.pending.poll_expired(cx)) => {
                    self.handle_timeout(id);
                }
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.len() + self.queue.len() == 0
    }

    fn handle_send(
        &mut self,
        id: u64,
        message: Req,
        reply: oneshot::Sender<Result<Resp, PipeError>>,
        admitted: bool,
    ) {
        if self.flushing {
            // I4: no new requests enter Queue or Pending while flushing.
            // `Pipe::send` already reserved a slot optimistically before
            // this message reached us (so `pending()`/`queued()` observe
            // admission synchronously); release it since the request is
            // being rejected instead of admitted.
            if admitted {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            } else {
                self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            }
            let _ = reply.send(Err(PipeError::FlushInProgress));
            return;
        }

        let record = Record::new(id, message, reply);
        if admitted {
            log::trace!("admitted request {id} directly to pending");
            self.config.log(format!("send: request {id} admitted directly"));
            self.pending.insert(record, self.config.pending_timeout);
            self.dispatch(id);
        } else {
            log::trace!("queued request {id}, queue depth {}", self.queue.len() + 1);
            self.config.log(format!("send: request {id} queued, depth {}", self.queue.len() + 1));
            self.queue.push_back(record);
        }
    }

    /// While `|Pending| < max_pending` and the queue is non-empty, pop the
    /// head and dispatch it. Deliberately does *not* gate on `self.flushing`:
    /// §4.5 is explicit that queued records keep promoting during a flush (a
    /// flush drains, it doesn't freeze in-flight work); only `handle_send`
    /// needs the flushing check, since that's what stops *new* admissions.
    fn try_promote(&mut self) {
        while self.pending.len() < self.config.max_pending.get() {
            let Some(record) = self.queue.pop_front() else { break };
            let id = record.id;
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            self.shared.pending.fetch_add(1, Ordering::AcqRel);
            self.pending.insert(record, self.config.pending_timeout);
            log::trace!("promoted request {id} to pending ({}/{})", self.pending.len(), self.config.max_pending);
            self.dispatch(id);
        }
    }

    fn dispatch(&mut self, id: u64) {
        let Some(record) = self.pending.get_mut(id) else {
            return;
        };

        let Some(sender) = self.sender.as_mut() else {
            log::error!("request {id} has no sender registered");
            let mut record = self.pending.remove(id).expect("just looked up");
            record.complete(Err(PipeError::NotConfigured { id }));
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            self.try_promote();
            self.maybe_resolve_flush();
            return;
        };

        let envelope = Envelope::new(id, record.message.clone());
        let fut = sender(envelope);
        let control_tx = self.control_tx.clone();
        tokio::spawn(async move {
            let result = fut.await;
            let _ = control_tx.send(ActorMsg::SenderResult { id, result });
        });
    }

    fn handle_sender_result(&mut self, id: u64, result: anyhow::Result<()>) {
        if let Err(err) = result {
            self.handle_sender_error(id, err);
        }
        // A resolved future only acknowledges dispatch; the reply still
        // arrives exclusively via the receiver path (§4.2).
    }

    fn handle_sender_error(&mut self, id: u64, err: anyhow::Error) {
        // Read what we need into locals and let the `get_mut` borrow end
        // here, rather than holding it across `cancel_timer` below (which
        // needs its own `&mut self.pending` and would otherwise conflict).
        let Some(retry_count) = self.pending.get_mut(id).map(|record| record.retry_count) else {
            // Already completed by a concurrent receiver delivery or timeout (I5).
            return;
        };

        self.pending.cancel_timer(id);

        if retry_count < self.config.max_retries {
            let next_attempt = retry_count + 1;
            if let Some(record) = self.pending.get_mut(id) {
                record.retry_count = next_attempt;
            }
            self.config.log(format!("retry: request {id} attempt {} after error: {err}", next_attempt + 1));
            log::debug!("retrying request {id}, attempt {} of {}", next_attempt + 1, self.config.max_retries + 1);
            if let Some(timeout) = self.config.pending_timeout {
                self.pending.rearm_timer(id, timeout);
            }
            self.dispatch(id);
        } else {
            let attempts = retry_count + 1;
            log::warn!("request {id} failed after {attempts} attempt(s): {err}");
            self.config.log(format!("send-error: request {id} exhausted {attempts} attempt(s): {err}"));
            if let Some(mut record) = self.pending.remove(id) {
                record.complete(Err(PipeError::Send { id, attempts, source: err }));
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                self.try_promote();
                self.maybe_resolve_flush();
            }
        }
    }

    fn handle_deliver(&mut self, envelope: Envelope<Resp>) {
        let id = envelope.id;
        match self.pending.remove(id) {
            Some(mut record) => {
                log::trace!("delivered reply for request {id}");
                record.complete(Ok(envelope.message));
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                self.try_promote();
                self.maybe_resolve_flush();
            }
            None => {
                // I3: a reply for an id not currently Pending is a late or
                // duplicate delivery and is silently discarded.
                log::trace!("discarding reply for unknown or already-completed request {id}");
                self.config.log(format!("discard: late/duplicate reply for request {id}"));
            }
        }
    }

    fn handle_timeout(&mut self, id: u64) {
        // The DelayQueue has already popped this entry; clear the stale key
        // before calling `remove` so it doesn't try to cancel an expired key.
        if let Some(record) = self.pending.get_mut(id) {
            record.timer_key = None;
        }

        if let Some(mut record) = self.pending.remove(id) {
            let elapsed_ms = record
                .attempt_started
                .map(|started| started.elapsed().as_millis() as u64)
                .unwrap_or_default();
            log::info!("request {id} timed out after {elapsed_ms}ms");
            self.config.log(format!("timeout: request {id} after {elapsed_ms}ms"));
            record.complete(Err(PipeError::Timeout { id, elapsed_ms }));
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            self.try_promote();
            self.maybe_resolve_flush();
        }
        // else: the record already completed via receiver delivery or a
        // sender error racing the timer (I5); nothing to do.
    }

    fn handle_flush(&mut self, resolver: oneshot::Sender<()>) {
        self.flushing = true;
        self.shared.flushing.store(true, Ordering::Relaxed);
        log::info!("flush requested, {} pending + {} queued remaining", self.pending.len(), self.queue.len());

        if self.is_idle() {
            let _ = resolver.send(());
        } else {
            // §4.5: exactly one flush may be outstanding at a time. A second
            // concurrent flush() call would replace the first resolver here;
            // callers are expected not to race `flush()` against itself.
            self.flush_resolver = Some(resolver);
        }
    }

    fn maybe_resolve_flush(&mut self) {
        if self.flushing && self.is_idle() {
            if let Some(resolver) = self.flush_resolver.take() {
                log::info!("flush drained, resolving");
                let _ = resolver.send(());
            }
        }
    }
}

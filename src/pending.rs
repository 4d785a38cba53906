// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The pending set: admitted, in-flight requests and their timeout timers.
//!
//! This mirrors the role `tarpc::client::channel`'s `InFlightRequests` plays
//! for that crate's dispatch loop: a map from correlation id to live request
//! state, paired with a `DelayQueue` used to enforce per-request deadlines
//! without a dedicated timer task per request.

use std::collections::HashMap;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio_util::time::DelayQueue;

use crate::record::Record;

/// Map of id -> in-flight record, plus the shared timer queue arming
/// per-request timeouts. Owned exclusively by the pipe actor.
pub(crate) struct PendingRequests<Req, Resp> {
    requests: HashMap<u64, Record<Req, Resp>>,
    timeouts: DelayQueue<u64>,
}

impl<Req, Resp> Default for PendingRequests<Req, Resp> {
    fn default() -> Self {
        PendingRequests {
            requests: HashMap::new(),
            timeouts: DelayQueue::new(),
        }
    }
}

impl<Req, Resp> PendingRequests<Req, Resp> {
    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut Record<Req, Resp>> {
        self.requests.get_mut(&id)
    }

    /// Moves `record` into Pending, arming a fresh timer if `timeout` is set.
    /// The record must not already be tracked.
    pub(crate) fn insert(&mut self, mut record: Record<Req, Resp>, timeout: Option<Duration>) {
        record.timer_key = timeout.map(|d| self.timeouts.insert(record.id, d));
        record.attempt_started = timeout.map(|_| Instant::now());
        self.requests.insert(record.id, record);
    }

    /// Cancels and removes any armed timer for `id`, leaving the record (if
    /// present) in the map with `timer_key` cleared. Used before re-arming on
    /// retry and before a terminal transition.
    pub(crate) fn cancel_timer(&mut self, id: u64) {
        if let Some(record) = self.requests.get_mut(&id) {
            if let Some(key) = record.timer_key.take() {
                self.timeouts.try_remove(&key);
            }
        }
    }

    /// Arms a fresh timer for `id`, replacing any existing one.
    pub(crate) fn rearm_timer(&mut self, id: u64, timeout: Duration) {
        self.cancel_timer(id);
        if let Some(record) = self.requests.get_mut(&id) {
            record.timer_key = Some(self.timeouts.insert(id, timeout));
            record.attempt_started = Some(Instant::now());
        }
    }

    /// Removes and returns the record for `id`, cancelling its timer if any.
    /// Returns `None` if `id` is not (or no longer) Pending — the late/
    /// duplicate-delivery case of invariant I3.
    pub(crate) fn remove(&mut self, id: u64) -> Option<Record<Req, Resp>> {
        self.cancel_timer(id);
        self.requests.remove(&id)
    }

    /// Polls the shared timer queue for the next expired id. A `DelayQueue`
    /// reports `Ready(None)` whenever it is momentarily empty, which does
    /// *not* mean "no more timeouts will ever fire" (new ones get inserted on
    /// every admission and retry), so that case is folded into `Pending`
    /// rather than propagated as a stream terminator.
    pub(crate) fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<u64> {
        match self.timeouts.poll_expired(cx) {
            Poll::Ready(Some(expired)) => Poll::Ready(expired.into_inner()),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

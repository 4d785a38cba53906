// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Settings that control the behavior of a [`Pipe`](crate::pipe::Pipe).

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// A diagnostic sink. Receives a formatted message at the same points the
/// crate's own `log` events fire. Purely observational: it has no effect on
/// pipe semantics.
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// Construction options for a [`Pipe`](crate::pipe::Pipe).
#[derive(Clone)]
pub struct PipeConfig {
    /// Maximum number of concurrently pending (admitted, in-flight) requests.
    pub max_pending: NonZeroUsize,
    /// Number of retries attempted per request after the first send. Total
    /// attempts per request are therefore `max_retries + 1`.
    pub max_retries: usize,
    /// Per-attempt timeout. `None` disables the timeout engine entirely.
    pub pending_timeout: Option<Duration>,
    /// Optional diagnostic sink; see [`Logger`].
    pub logger: Option<Logger>,
}

impl fmt::Debug for PipeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeConfig")
            .field("max_pending", &self.max_pending)
            .field("max_retries", &self.max_retries)
            .field("pending_timeout", &self.pending_timeout)
            .field("logger", &self.logger.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        PipeConfig {
            max_pending: NonZeroUsize::new(1).expect("1 is non-zero"),
            max_retries: 0,
            pending_timeout: None,
            logger: None,
        }
    }
}

impl PipeConfig {
    /// Returns a config with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of concurrently pending requests.
    pub fn with_max_pending(mut self, max_pending: NonZeroUsize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the number of retries attempted per request after the first send.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_pending_timeout(mut self, pending_timeout: Duration) -> Self {
        self.pending_timeout = Some(pending_timeout);
        self
    }

    /// Registers a diagnostic sink.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub(crate) fn log(&self, message: impl AsRef<str>) {
        if let Some(logger) = &self.logger {
            logger(message.as_ref());
        }
    }
}

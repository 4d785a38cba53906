// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! `reqpipe` turns an unordered, asynchronous message transport into a
//! correlated, bounded, retrying, promise-style request API.
//!
//! A [`Pipe`] owns the correlation table, admission control, queueing,
//! retry policy, per-request timeouts, and an orderly flush/drain
//! lifecycle. Callers hand it a message via [`Pipe::send`] and get back a
//! future that resolves with the matching reply, obtained out-of-band
//! through the [`Receiver`] handle returned by [`Pipe::receiver`].
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use reqpipe::{Pipe, PipeConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = PipeConfig::new().with_max_pending(NonZeroUsize::new(4).unwrap());
//! let pipe: Pipe<String, String> = Pipe::new(config);
//!
//! let receiver = pipe.receiver();
//! pipe.set_sender(move |envelope| {
//!     // A real sender would push `envelope` onto some transport; here we
//!     // just echo it straight back.
//!     let receiver = receiver.clone();
//!     async move {
//!         receiver.deliver(envelope.id, envelope.message);
//!         Ok(())
//!     }
//! });
//!
//! let reply = pipe.send(Some("ping".to_string())).unwrap().await?;
//! assert_eq!(reply, "ping");
//! # Ok(())
//! # }
//! ```
//!
//! What the pipe is *not*: a transport. Framing, serialization, worker
//! processes, network I/O, authentication, and persistence are the
//! caller's concern; the pipe only ever sees `{id, message}` envelopes it
//! treats as opaque.

mod actor;
mod config;
mod envelope;
mod error;
mod pending;
mod pipe;
mod receiver;
mod record;

pub use config::{Logger, PipeConfig};
pub use envelope::Envelope;
pub use error::PipeError;
pub use pipe::{Pipe, ReplyFuture};
pub use receiver::Receiver;

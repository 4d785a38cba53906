// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Demonstrates admission under a tight `max_pending` and an orderly
//! flush: a handful of requests are issued at once against a pipe that
//! can only have one in flight, so most of them queue before draining.

use std::num::NonZeroUsize;
use std::time::Duration;

use reqpipe::{Pipe, PipeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = PipeConfig::new().with_max_pending(NonZeroUsize::new(1).unwrap());
    let pipe: Pipe<u64, u64> = Pipe::new(config);

    let receiver = pipe.receiver();
    pipe.set_sender(move |envelope| {
        let receiver = receiver.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            receiver.deliver(envelope.id, envelope.message * 2);
            Ok(())
        }
    });

    let replies: Vec<_> = (0..5)
        .map(|n| pipe.send(Some(n)).expect("n is not a no-op"))
        .collect();

    println!("queued immediately after issuing all sends: {}", pipe.queued());

    for (n, reply) in replies.into_iter().enumerate() {
        println!("{n} -> {}", reply.await?);
    }

    pipe.flush().await;
    println!("idle after flush: {}", pipe.is_idle());

    Ok(())
}

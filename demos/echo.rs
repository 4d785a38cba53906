// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The smallest possible pipe: a sender that immediately hands its own
//! envelope back to the receiver.

use std::num::NonZeroUsize;

use reqpipe::{Pipe, PipeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = PipeConfig::new().with_max_pending(NonZeroUsize::new(4).unwrap());
    let pipe: Pipe<String, String> = Pipe::new(config);

    let receiver = pipe.receiver();
    pipe.set_sender(move |envelope| {
        let receiver = receiver.clone();
        async move {
            receiver.deliver(envelope.id, envelope.message);
            Ok(())
        }
    });

    for message in ["hello", "world", "goodbye"] {
        let reply = pipe.send(Some(message.to_string())).unwrap().await?;
        println!("{message} -> {reply}");
    }

    Ok(())
}

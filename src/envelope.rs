// Copyright 2018 Google LLC
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The envelope shape crossing the pipe boundary in both directions.

/// A request or reply crossing the pipe boundary, tagged with its
/// correlation id. The pipe never inspects `message`.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    /// Correlation id assigned by the pipe when the request was admitted.
    pub id: u64,
    /// Caller-opaque payload.
    pub message: T,
}

impl<T> Envelope<T> {
    /// Builds a new envelope.
    pub fn new(id: u64, message: T) -> Self {
        Envelope { id, message }
    }
}

//! Request bodies generated on the fly.

use std::io;
use std::pin::Pin;
use std::task;

use objgen_engine::request::{Body, Data};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, ReadBuf};

/// Contents of an uploaded object, produced while it is being sent.
///
/// Random payloads are derived from [`Body::seed`], so the same body always yields the same
/// bytes.
#[derive(Debug, Clone)]
pub struct Payload {
    remaining: u64,
    rng: Option<SmallRng>,
}

impl Payload {
    /// Creates the payload described by `body`.
    pub fn new(body: Body) -> Self {
        let rng = match body.data {
            Data::Random => Some(SmallRng::seed_from_u64(body.seed)),
            Data::Zeroes => None,
        };

        Self {
            remaining: body.size,
            rng,
        }
    }

    /// Number of bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn fill(&mut self, buf: &mut [u8]) -> usize {
        let len = (buf.len() as u64).min(self.remaining) as usize;
        let buf = &mut buf[..len];
        match &mut self.rng {
            Some(rng) => rng.fill_bytes(buf),
            None => buf.fill(0),
        }

        self.remaining -= len as u64;
        len
    }
}

impl io::Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.fill(buf))
    }
}

impl AsyncRead for Payload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        let len = (buf.remaining() as u64).min(self.remaining) as usize;
        let filled = self.fill(buf.initialize_unfilled_to(len));
        buf.advance(filled);

        task::Poll::Ready(Ok(()))
    }
}

//! # Background Hand-off
//!
//! Collaborator calls may block, so lanes never run them on the task that
//! polls the result stream. Each call is spawned onto the tokio runtime and
//! its outcome is picked up by whoever polls the stream next.
//!
//! Both wrappers abort their task on drop: when a lane stops listening, the
//! work it started stops too.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, StreamExt};
use log::debug;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::client::ClientError;

/// A spawned call. Resolves to its output, or to `ClientError::Worker` if the
/// task panicked.
pub struct Offloaded<T> {
    handle: JoinHandle<T>,
}

impl<T> Future for Offloaded<T> {
    type Output = Result<T, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.map_err(|e| ClientError::Worker(e.to_string())))
    }
}

impl<T> Drop for Offloaded<T> {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("Aborting unfinished background call");
            self.handle.abort();
        }
    }
}

pub fn offload<F>(call: F) -> Offloaded<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Offloaded {
        handle: tokio::spawn(call),
    }
}

/// Spawns a call that streams events into a channel, and exposes it as a
/// stream of `Ok(event)` followed by `Err` if the call failed.
///
/// Nothing is spawned until the stream is first polled. `buffer` bounds how
/// far the producer may run ahead of the consumer.
pub fn offload_stream<T, F, Fut>(buffer: usize, produce: F) -> BoxStream<'static, Result<T, ClientError>>
where
    T: Send + 'static,
    F: FnOnce(Sender<T>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
{
    enum Feed<T, F> {
        Idle(F),
        Running(Receiver<T>, Offloaded<Result<(), ClientError>>),
        Done,
    }

    let buffer = buffer.max(1);
    stream::unfold(Feed::Idle(produce), move |feed| async move {
        let (mut events, producer) = match feed {
            Feed::Idle(produce) => {
                let (sender, receiver) = mpsc::channel(buffer);
                (receiver, offload(produce(sender)))
            }
            Feed::Running(events, producer) => (events, producer),
            Feed::Done => return None,
        };

        if let Some(event) = events.recv().await {
            return Some((Ok(event), Feed::Running(events, producer)));
        }

        // Channel closed: the producer has returned (or dropped its sender), so its
        // outcome decides how the stream ends.
        match producer.await.and_then(|outcome| outcome) {
            Ok(()) => None,
            Err(e) => Some((Err(e), Feed::Done)),
        }
    })
    .boxed()
}

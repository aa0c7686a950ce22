//! # Stream Combinators
//!
//! The handful of stream operators the lanes are built from:
//!
//! ```text
//! merge               unordered interleave of independent streams
//! merge_map           one inner stream per outer item, all running at once
//! switch_map          one inner stream per outer item, newest replaces the rest
//! prepend             emit a marker, then the source
//! append_on_complete  emit a marker once the source ends without error
//! catch               turn the first error into a final value and stop
//! ```
//!
//! Dropping any of these drops the streams they own, which is how
//! cancellation travels from the consumer down to in-flight work.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future;
use futures::stream::{self, BoxStream, Fuse, SelectAll, Stream, StreamExt};

pub fn merge<T: Send + 'static>(streams: Vec<BoxStream<'static, T>>) -> BoxStream<'static, T> {
    stream::select_all(streams).boxed()
}

pub fn prepend<S, T>(marker: T, source: S) -> BoxStream<'static, T>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
{
    stream::once(future::ready(marker)).chain(source).boxed()
}

/// Emits `marker` after the source completes. An error ends the stream and
/// the marker is never emitted.
pub fn append_on_complete<S, T, E>(source: S, marker: T) -> BoxStream<'static, Result<T, E>>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    stream::unfold(
        (Some(source.boxed()), Some(marker)),
        |(source, marker)| async move {
            let mut source = source?;
            match source.next().await {
                Some(Ok(item)) => Some((Ok(item), (Some(source), marker))),
                Some(Err(e)) => Some((Err(e), (None, None))),
                None => marker.map(|m| (Ok(m), (None, None))),
            }
        },
    )
    .boxed()
}

/// Converts the first error into a terminal value. Nothing follows it.
pub fn catch<S, T, E, F>(source: S, on_error: F) -> BoxStream<'static, T>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(E) -> T + Send + 'static,
{
    stream::unfold(
        (Some(source.boxed()), Some(on_error)),
        |(source, on_error)| async move {
            let mut source = source?;
            match source.next().await? {
                Ok(item) => Some((item, (Some(source), on_error))),
                Err(e) => {
                    let on_error = on_error?;
                    Some((on_error(e), (None, None)))
                }
            }
        },
    )
    .boxed()
}

pub fn merge_map<S, A, T, F>(outer: S, f: F) -> MergeMap<A, T, F>
where
    S: Stream<Item = A> + Send + 'static,
    F: FnMut(A) -> BoxStream<'static, T>,
{
    MergeMap {
        outer: outer.boxed().fuse(),
        inners: SelectAll::new(),
        f,
    }
}

pub fn switch_map<S, A, T, F>(outer: S, f: F) -> SwitchMap<A, T, F>
where
    S: Stream<Item = A> + Send + 'static,
    F: FnMut(A) -> BoxStream<'static, T>,
{
    SwitchMap {
        outer: outer.boxed().fuse(),
        inner: None,
        f,
    }
}

/// See [`merge_map`]. Ends once the outer stream and every inner stream have ended.
pub struct MergeMap<A, T, F> {
    outer: Fuse<BoxStream<'static, A>>,
    inners: SelectAll<BoxStream<'static, T>>,
    f: F,
}

impl<A, T, F> Stream for MergeMap<A, T, F>
where
    F: FnMut(A) -> BoxStream<'static, T> + Unpin,
{
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();

        while let Poll::Ready(Some(item)) = this.outer.poll_next_unpin(cx) {
            this.inners.push((this.f)(item));
        }

        match this.inners.poll_next_unpin(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
            // An empty SelectAll reports None; that only means "done" once the outer is too.
            Poll::Ready(None) if this.outer.is_done() => Poll::Ready(None),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

/// See [`switch_map`]. The outer stream is always polled first, so a
/// superseded inner stream is dropped before the new one yields anything.
pub struct SwitchMap<A, T, F> {
    outer: Fuse<BoxStream<'static, A>>,
    inner: Option<BoxStream<'static, T>>,
    f: F,
}

impl<A, T, F> Stream for SwitchMap<A, T, F>
where
    F: FnMut(A) -> BoxStream<'static, T> + Unpin,
{
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();

        while let Poll::Ready(Some(item)) = this.outer.poll_next_unpin(cx) {
            this.inner = Some((this.f)(item));
        }

        if let Some(inner) = this.inner.as_mut() {
            match inner.poll_next_unpin(cx) {
                Poll::Ready(Some(item)) => return Poll::Ready(Some(item)),
                Poll::Ready(None) => this.inner = None,
                Poll::Pending => return Poll::Pending,
            }
        }

        if this.outer.is_done() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

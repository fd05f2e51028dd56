//! Stream debouncing utilities

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};

/// Extension trait to add debouncing to any Stream
pub trait DebounceExt: Stream {
    /// Emit an item only once the source has been quiet for `duration`
    ///
    /// Uses "latest-wins" semantics - a burst of items collapses to the
    /// last one. A pending item is flushed immediately when the source ends.
    fn debounce(self, duration: Duration) -> Debounce<Self>
    where
        Self: Sized,
    {
        Debounce::new(self, duration)
    }
}

impl<T: Stream> DebounceExt for T {}

pin_project! {
    /// A stream combinator that waits for a quiet period before emitting
    pub struct Debounce<S: Stream> {
        #[pin]
        stream: S,
        #[pin]
        sleep: Sleep,
        duration: Duration,
        pending: Option<S::Item>,
        done: bool,
    }
}

impl<S: Stream> Debounce<S> {
    /// Create a new debounced stream
    pub fn new(stream: S, duration: Duration) -> Self {
        Self { stream, sleep: sleep(duration), duration, pending: None, done: false }
    }
}

impl<S: Stream> Stream for Debounce<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything ready, restarting the quiet period on each item
        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    *this.pending = Some(item);
                    this.sleep.as_mut().reset(Instant::now() + *this.duration);
                }
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if this.pending.is_none() {
            return if *this.done { Poll::Ready(None) } else { Poll::Pending };
        }
        if *this.done {
            return Poll::Ready(this.pending.take());
        }

        ready!(this.sleep.poll(cx));
        Poll::Ready(this.pending.take())
    }
}

//! Scoped subscription handles.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

type Release = Box<dyn FnOnce() + Send + Sync>;

/// A live subscription to a document or collection.
///
/// Items arrive in the order the store produced them. The watcher is
/// released exactly once: by [`Subscription::unsubscribe`] or on drop,
/// whichever comes first. After release no further items are produced.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    release: Option<Release>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            rx,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next item. `None` once the store side is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take an already-delivered item without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            self.rx.close();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_release_runs_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel::<u32>();
        let counter = released.clone();
        let sub = Subscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel::<u32>();
        let counter = released.clone();
        {
            let _sub = Subscription::new(rx, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(tx.send(1).is_err());
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_subscription_is_send_and_sync() {
        // Held across awaits by spawned tasks.
        assert_send_sync::<Subscription<u32>>();
    }

    #[tokio::test]
    async fn test_stream_yields_in_order() {
        use futures::StreamExt;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new(rx, || {});
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);

        assert_eq!(sub.next().await, Some(1));
        assert_eq!(sub.recv().await, Some(2));
        assert_eq!(sub.next().await, None);
    }
}

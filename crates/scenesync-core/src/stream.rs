// ── Reactive entity streams ──
//
// Subscription handles vended by the `StateStore`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A subscription to one keyed collection.
///
/// Offers the snapshot captured at creation, the latest snapshot, and
/// change notification via [`changed`](Self::changed) or as a `Stream`.
pub struct EntityStream<T: Send + Sync + 'static> {
    current: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    pub fn current(&self) -> &Snapshot<T> {
        &self.current
    }

    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    pub fn into_stream(self) -> EntityWatchStream<T> {
        EntityWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a fresh snapshot per mutation.
pub struct EntityWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> Stream for EntityWatchStream<T> {
    type Item = Snapshot<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Scene;
    use crate::store::StateStore;
    use futures_util::StreamExt;

    fn scene(name: &str) -> Scene {
        Scene {
            name: name.into(),
            index: None,
        }
    }

    #[tokio::test]
    async fn changed_yields_new_snapshot() {
        let store = StateStore::new();
        let mut stream = store.subscribe_scenes();
        assert!(stream.current().is_empty());

        store.scenes.upsert("Intro".into(), scene("Intro"));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.current().len(), 1);
    }

    #[tokio::test]
    async fn into_stream_starts_with_current_value() {
        let store = StateStore::new();
        store.scenes.upsert("Main".into(), scene("Main"));
        let mut stream = store.subscribe_scenes().into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first[0].name, "Main");
    }
}

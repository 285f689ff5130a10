//! Realtime snapshot streams over the record store.
//!
//! A subscription yields one freshly loaded snapshot right away and another
//! after every change to a watched collection. Consumers recompute from the
//! snapshot; nothing is patched incrementally. Dropping the stream
//! unsubscribes; calling [`snapshots`] again starts over.

use std::{future::Future, sync::Arc};

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use super::{Change, Collection, RecordStore, StoreError};

struct Subscription<F> {
    store: Arc<dyn RecordStore>,
    changes: broadcast::Receiver<Change>,
    watched: &'static [Collection],
    load: F,
    primed: bool,
}

pub fn snapshots<T, F, Fut>(
    store: Arc<dyn RecordStore>,
    watched: &'static [Collection],
    load: F,
) -> BoxStream<'static, Result<T, StoreError>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn RecordStore>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    // Subscribe before the first load so no change slips between them.
    let changes = store.changes();
    let sub = Subscription {
        store,
        changes,
        watched,
        load,
        primed: false,
    };

    stream::unfold(sub, |mut sub| async move {
        if sub.primed {
            loop {
                match sub.changes.recv().await {
                    Ok(change) if sub.watched.contains(&change.collection) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "change feed lagged; reloading snapshot");
                        break;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
        sub.primed = true;
        let snapshot = (sub.load)(Arc::clone(&sub.store)).await;
        Some((snapshot, sub))
    })
    .boxed()
}

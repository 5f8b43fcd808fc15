use media_downloader::MediaId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per media id, created on demand and dropped when unused
#[derive(Clone, Default)]
pub(crate) struct MediaLocks {
    slots: Arc<Mutex<HashMap<MediaId, Arc<AsyncMutex<()>>>>>,
}

pub(crate) struct MediaGuard {
    locks: MediaLocks,
    media_id: MediaId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl MediaLocks {
    pub(crate) async fn lock(&self, media_id: &MediaId) -> MediaGuard {
        let slot = Arc::clone(self.slots.lock().entry(media_id.clone()).or_default());
        let guard = slot.lock_owned().await;

        MediaGuard {
            locks: self.clone(),
            media_id: media_id.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn held(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for MediaGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = self.locks.slots.lock();
        let unused = slots
            .get(&self.media_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1);
        if unused {
            slots.remove(&self.media_id);
        }
    }
}

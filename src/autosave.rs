//! Debounced commit of in-progress chunk edits: a draft is written to the
//! record only after no newer draft for the same chunk arrived for `delay`.

use parking_lot::Mutex;
use std::{collections::HashMap, sync::{atomic::{AtomicU64, Ordering}, Arc}, time::Duration};
use tracing::{debug, error};
use uuid::Uuid;

use crate::studio::Studio;

pub struct Autosave {
    delay: Duration,
    next_ticket: AtomicU64,
    pending: Arc<Mutex<HashMap<(Uuid, usize), u64>>>,
}

impl Autosave {
    pub fn new(delay: Duration) -> Self {
        Self { delay, next_ticket: AtomicU64::new(0), pending: Arc::default() }
    }

    /// Schedules `body` to be committed to chunk `chunk_id` of record `id`.
    /// Supersedes any draft still waiting for the same chunk.
    pub fn schedule(&self, studio: Arc<Studio>, id: Uuid, chunk_id: usize, body: String) {
        let key = (id, chunk_id);
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(key, ticket);

        let pending = self.pending.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut guard = pending.lock();
                if guard.get(&key) != Some(&ticket) {
                    debug!("Draft for chunk {} of record {} superseded", chunk_id, id);
                    return;
                }
                guard.remove(&key);
            }
            if let Err(e) = studio.edit_chunk(id, chunk_id, &body) {
                error!("❌ Autosave of chunk {} in record {} failed: {}", chunk_id, id, e);
            }
        });
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize { self.pending.lock().len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunker, storage::LocalStore, studio::tests::{params, FakeGenerator, AD_TEXT}};
    use pretty_assertions::assert_eq;

    async fn studio_with_record() -> (Arc<Studio>, Uuid) {
        let studio = Arc::new(Studio::new(
            Arc::new(FakeGenerator { fragments: AD_TEXT.to_vec(), ..Default::default() }),
            LocalStore::in_memory(),
        ));
        let record = studio.generate_once(params()).await.unwrap();
        (studio, record.id)
    }

    fn body_of(studio: &Studio, id: Uuid, chunk_id: usize) -> String {
        chunker::chunk(&studio.record(id).unwrap().raw_text)[chunk_id].body.clone()
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_drafts_collapse_into_the_last_one() {
        let (studio, id) = studio_with_record().await;
        let autosave = Autosave::new(Duration::from_millis(1500));

        autosave.schedule(studio.clone(), id, 0, "S".into());
        tokio::time::sleep(Duration::from_millis(500)).await;
        autosave.schedule(studio.clone(), id, 0, "Sh".into());
        tokio::time::sleep(Duration::from_millis(500)).await;
        autosave.schedule(studio.clone(), id, 0, "Shine".into());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(body_of(&studio, id, 0), "Shine bright.");
        assert_eq!(autosave.pending(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(body_of(&studio, id, 0), "Shine");
        assert_eq!(autosave.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drafts_for_different_chunks_do_not_interfere() {
        let (studio, id) = studio_with_record().await;
        let autosave = Autosave::new(Duration::from_millis(100));

        autosave.schedule(studio.clone(), id, 0, "first".into());
        autosave.schedule(studio.clone(), id, 1, "second".into());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(body_of(&studio, id, 0), "first");
        assert_eq!(body_of(&studio, id, 1), "second");
    }
}

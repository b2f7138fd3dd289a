//! The stateful shell around the pure prompt/chunk pipeline. Owns history and
//! preferences; every chunk mutation is applied to the record's raw text via
//! the chunker and written back wholesale.

use chrono::Utc;
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    chunker,
    error::StudioError,
    gemini::TextGenerator,
    models::{GenerationParameters, HistoryRecord, Preferences, PreferencesUpdate, Theme},
    prompt,
    storage::{LocalStore, GENERATION_COUNT_KEY, HISTORY_KEY, NEWSLETTER_KEY, THEME_KEY},
};

pub struct Studio {
    generator: Arc<dyn TextGenerator>,
    store: LocalStore,
    regenerating: Mutex<HashSet<(Uuid, usize)>>,
}

/// Marks one chunk as regenerating until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<(Uuid, usize)>>,
    key: (Uuid, usize),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) { self.set.lock().remove(&self.key); }
}

impl Studio {
    pub fn new(generator: Arc<dyn TextGenerator>, store: LocalStore) -> Self {
        Self { generator, store, regenerating: Mutex::default() }
    }

    /// Streams a full generation, forwarding each fragment, and saves the
    /// finished text as a new history record. Nothing is saved on failure.
    pub async fn generate(
        &self,
        params: GenerationParameters,
        on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
    ) -> Result<HistoryRecord, StudioError> {
        params.validate()?;
        info!("🚀 Generating '{}' for product: {}", params.content_type, params.product_name);
        let request = prompt::build_request(&params, None);
        let text = self.generator.generate_stream(&request, on_fragment).await?;
        self.save_generation(params, text)
    }

    pub async fn generate_once(&self, params: GenerationParameters) -> Result<HistoryRecord, StudioError> {
        params.validate()?;
        info!("🚀 Generating '{}' (one-shot) for product: {}", params.content_type, params.product_name);
        let request = prompt::build_request(&params, None);
        let text = self.generator.generate_once(&request).await?;
        self.save_generation(params, text)
    }

    fn save_generation(&self, params: GenerationParameters, text: String) -> Result<HistoryRecord, StudioError> {
        if text.trim().is_empty() {
            return Err(StudioError::EmptyResponse);
        }
        let now = Utc::now();
        let record = HistoryRecord { id: Uuid::new_v4(), params, raw_text: text, created_at: now, updated_at: now };
        self.store.update(HISTORY_KEY, |history: &mut Vec<HistoryRecord>| history.push(record.clone()))?;
        let count = self.store.update(GENERATION_COUNT_KEY, |count: &mut u64| { *count += 1; *count })?;
        info!("✅ Saved record {} ({} chunks, generation #{})", record.id, chunker::chunk(&record.raw_text).len(), count);
        Ok(record)
    }

    /// Newest first.
    pub fn history(&self) -> Vec<HistoryRecord> {
        let mut history: Vec<HistoryRecord> = self.store.get(HISTORY_KEY);
        history.reverse();
        history
    }

    pub fn record(&self, id: Uuid) -> Result<HistoryRecord, StudioError> {
        self.store
            .get::<Vec<HistoryRecord>>(HISTORY_KEY)
            .into_iter()
            .find(|r| r.id == id)
            .ok_or(StudioError::RecordNotFound(id))
    }

    pub fn clear_history(&self) -> Result<(), StudioError> {
        self.store.set(HISTORY_KEY, &Vec::<HistoryRecord>::new())?;
        info!("🗑️ History cleared");
        Ok(())
    }

    /// Replaces a record's raw text with what `edit` derives from it.
    /// `edit` returns `None` when the chunk it targets is gone.
    fn mutate_record(
        &self,
        id: Uuid,
        chunk_id: usize,
        edit: impl FnOnce(&str) -> Option<String>,
    ) -> Result<HistoryRecord, StudioError> {
        self.store.update(HISTORY_KEY, |history: &mut Vec<HistoryRecord>| -> Result<HistoryRecord, StudioError> {
            let record = history.iter_mut().find(|r| r.id == id).ok_or(StudioError::RecordNotFound(id))?;
            let raw = edit(&record.raw_text).ok_or(StudioError::ChunkNotFound { record_id: id, chunk_id })?;
            if raw != record.raw_text {
                record.raw_text = raw;
                record.updated_at = Utc::now();
            }
            Ok(record.clone())
        })?
    }

    pub fn edit_chunk(&self, id: Uuid, chunk_id: usize, body: &str) -> Result<HistoryRecord, StudioError> {
        let record = self.mutate_record(id, chunk_id, |raw| chunker::edit_chunk_body(raw, chunk_id, body))?;
        info!("✏️ Edited chunk {} of record {}", chunk_id, id);
        Ok(record)
    }

    pub fn delete_chunk(&self, id: Uuid, chunk_id: usize) -> Result<HistoryRecord, StudioError> {
        let record = self.mutate_record(id, chunk_id, |raw| chunker::delete_chunk(raw, chunk_id))?;
        info!("🗑️ Deleted chunk {} of record {}", chunk_id, id);
        Ok(record)
    }

    /// Rewrites one chunk's body with a narrower one-shot call. The result is
    /// applied to the record as it is when the call completes; if the chunk
    /// has moved or gone in the meantime the request fails.
    pub async fn regenerate_chunk(&self, id: Uuid, chunk_id: usize) -> Result<HistoryRecord, StudioError> {
        let record = self.record(id)?;
        let target = chunker::chunk(&record.raw_text)
            .into_iter()
            .nth(chunk_id)
            .ok_or(StudioError::ChunkNotFound { record_id: id, chunk_id })?;

        let key = (id, chunk_id);
        if !self.regenerating.lock().insert(key) {
            return Err(StudioError::AlreadyRegenerating { record_id: id, chunk_id });
        }
        let _in_flight = InFlight { set: &self.regenerating, key };

        info!("🔄 Regenerating chunk {} ('{}') of record {}", chunk_id, target.title, id);
        let request = prompt::build_request(&record.params, Some(&target));
        let text = chunker::sanitize_body(&self.generator.generate_once(&request).await?);
        if text.is_empty() {
            warn!("⚠️ Empty regeneration for chunk {} of record {}", chunk_id, id);
            return Err(StudioError::EmptyResponse);
        }

        let updated = self.mutate_record(id, chunk_id, |raw| {
            chunker::replace_chunk_body(raw, chunk_id, &target.title, &text)
        })?;
        info!("✅ Regenerated chunk {} of record {}", chunk_id, id);
        Ok(updated)
    }

    pub fn preferences(&self) -> Preferences {
        Preferences {
            theme: self.store.get(THEME_KEY),
            generation_count: self.store.get(GENERATION_COUNT_KEY),
            newsletter_subscribed: self.store.get(NEWSLETTER_KEY),
        }
    }

    pub fn update_preferences(&self, update: PreferencesUpdate) -> Result<Preferences, StudioError> {
        if let Some(theme) = update.theme {
            self.store.set::<Theme>(THEME_KEY, &theme)?;
        }
        if let Some(subscribed) = update.newsletter_subscribed {
            self.store.set(NEWSLETTER_KEY, &subscribed)?;
        }
        Ok(self.preferences())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{gemini::GeminiError, models::ContentType, prompt::GenerationRequest};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    /// Scripted generator: streams `fragments`, answers one-shot calls from
    /// `replies` in order, optionally waiting on `gate` first.
    #[derive(Default)]
    pub(crate) struct FakeGenerator {
        pub fragments: Vec<&'static str>,
        pub fail_after_fragments: bool,
        pub replies: Mutex<VecDeque<Result<String, GeminiError>>>,
        pub prompts: Mutex<Vec<String>>,
        pub gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate_stream(
            &self,
            request: &GenerationRequest,
            on_fragment: &mut (dyn for<'f> FnMut(&'f str) + Send),
        ) -> Result<String, GeminiError> {
            self.prompts.lock().push(request.prompt.clone());
            for f in &self.fragments {
                on_fragment(f);
            }
            if self.fail_after_fragments {
                return Err(GeminiError::Http("connection reset".into()));
            }
            Ok(self.fragments.concat())
        }

        async fn generate_once(&self, request: &GenerationRequest) -> Result<String, GeminiError> {
            self.prompts.lock().push(request.prompt.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let reply = self.replies.lock().pop_front();
            reply.unwrap_or_else(|| Ok(self.fragments.concat()))
        }
    }

    pub(crate) fn params() -> GenerationParameters {
        GenerationParameters {
            tone: "Playful".into(),
            country: "UK".into(),
            ..GenerationParameters::new("Aurora Necklace", ContentType::AdCopy)
        }
    }

    pub(crate) const AD_TEXT: [&str; 4] = ["### Ad 1: Glow\n", "Shine bright.\n", "### Ad 2: Gift\n", "Made to be given."];

    fn studio(generator: FakeGenerator) -> Studio {
        Studio::new(Arc::new(generator), LocalStore::in_memory())
    }

    async fn seeded(generator: FakeGenerator) -> (Studio, HistoryRecord) {
        let studio = studio(FakeGenerator { fragments: AD_TEXT.to_vec(), ..generator });
        let record = studio.generate(params(), &mut |_: &str| {}).await.unwrap();
        (studio, record)
    }

    #[tokio::test]
    async fn generate_forwards_fragments_and_saves_record() {
        let studio = studio(FakeGenerator { fragments: AD_TEXT.to_vec(), ..Default::default() });
        let mut seen = Vec::new();
        let record = studio.generate(params(), &mut |f: &str| seen.push(f.to_string())).await.unwrap();

        assert_eq!(seen, AD_TEXT.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert_eq!(record.raw_text, AD_TEXT.concat());
        assert_eq!(studio.history(), vec![record.clone()]);
        assert_eq!(studio.preferences().generation_count, 1);
        assert_eq!(chunker::chunk(&record.raw_text).len(), 2);
    }

    #[tokio::test]
    async fn failed_stream_keeps_partial_fragments_but_saves_nothing() {
        let studio = studio(FakeGenerator { fragments: vec!["### Ad 1"], fail_after_fragments: true, ..Default::default() });
        let mut seen = String::new();
        let err = studio.generate(params(), &mut |f: &str| seen.push_str(f)).await.unwrap_err();
        assert!(matches!(err, StudioError::Generation(_)));
        assert_eq!(seen, "### Ad 1");
        assert!(studio.history().is_empty());
        assert_eq!(studio.preferences().generation_count, 0);
    }

    #[tokio::test]
    async fn invalid_parameters_never_reach_the_generator() {
        let generator = Arc::new(FakeGenerator::default());
        let studio = Studio::new(generator.clone(), LocalStore::in_memory());
        let err = studio.generate_once(GenerationParameters::new("", ContentType::AdCopy)).await.unwrap_err();
        assert!(matches!(err, StudioError::InvalidParameters(_)));
        assert!(generator.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_clearable() {
        let (studio, first) = seeded(FakeGenerator::default()).await;
        let second = studio.generate_once(params()).await.unwrap();
        let ids: Vec<Uuid> = studio.history().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        studio.clear_history().unwrap();
        assert!(studio.history().is_empty());
        assert!(matches!(studio.record(first.id), Err(StudioError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn edit_and_delete_rewrite_raw_text() {
        let (studio, record) = seeded(FakeGenerator::default()).await;

        let unchanged = studio.edit_chunk(record.id, 1, "Made to be given.").unwrap();
        assert_eq!(unchanged.raw_text, record.raw_text);

        let edited = studio.edit_chunk(record.id, 1, "Wrap it up.").unwrap();
        assert_eq!(edited.raw_text, "### Ad 1: Glow\n\nShine bright.\n\n### Ad 2: Gift\n\nWrap it up.");
        assert_eq!(studio.record(record.id).unwrap().raw_text, edited.raw_text);

        let deleted = studio.delete_chunk(record.id, 0).unwrap();
        assert_eq!(deleted.raw_text, "### Ad 2: Gift\n\nWrap it up.");

        assert!(matches!(studio.delete_chunk(record.id, 3), Err(StudioError::ChunkNotFound { chunk_id: 3, .. })));
    }

    #[tokio::test]
    async fn regenerate_replaces_only_the_target_body() {
        let generator = FakeGenerator { replies: Mutex::new(VecDeque::from([Ok("  Fresh words.  ".to_string())])), ..Default::default() };
        let (studio, record) = seeded(generator).await;

        let updated = studio.regenerate_chunk(record.id, 0).await.unwrap();
        let chunks = chunker::chunk(&updated.raw_text);
        assert_eq!(chunks[0].title, "Ad 1: Glow");
        assert_eq!(chunks[0].body, "Fresh words.");
        assert_eq!(chunks[1].body, "Made to be given.");
    }

    #[tokio::test]
    async fn regenerated_body_echoing_its_heading_keeps_the_structure() {
        let reply = "### Ad 1: Glow\nFresh words.\n### Ad 3: Extra\nMore.";
        let generator = FakeGenerator { replies: Mutex::new(VecDeque::from([Ok(reply.to_string())])), ..Default::default() };
        let (studio, record) = seeded(generator).await;

        let updated = studio.regenerate_chunk(record.id, 0).await.unwrap();
        let chunks = chunker::chunk(&updated.raw_text);
        assert_eq!(chunks.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(), vec!["Ad 1: Glow", "Ad 2: Gift"]);
        assert_eq!(chunks[0].body, "Fresh words.\n#### Ad 3: Extra\nMore.");
        assert_eq!(chunks[1].body, "Made to be given.");
    }

    #[tokio::test]
    async fn regeneration_of_only_a_heading_is_empty() {
        let generator = FakeGenerator { replies: Mutex::new(VecDeque::from([Ok("### Ad 2: Gift\n".to_string())])), ..Default::default() };
        let (studio, record) = seeded(generator).await;
        let err = studio.regenerate_chunk(record.id, 1).await.unwrap_err();
        assert!(matches!(err, StudioError::EmptyResponse));
        assert_eq!(studio.record(record.id).unwrap().raw_text, record.raw_text);
    }

    #[tokio::test]
    async fn empty_regeneration_is_a_failure_and_leaves_body_alone() {
        let generator = FakeGenerator { replies: Mutex::new(VecDeque::from([Ok(" \n ".to_string())])), ..Default::default() };
        let (studio, record) = seeded(generator).await;

        let err = studio.regenerate_chunk(record.id, 1).await.unwrap_err();
        assert!(matches!(err, StudioError::EmptyResponse));
        assert_eq!(studio.record(record.id).unwrap().raw_text, record.raw_text);
        // the in-flight marker is released on failure
        assert!(studio.regenerating.lock().is_empty());
    }

    #[tokio::test]
    async fn regeneration_prompt_targets_the_chunk_title() {
        let generator = Arc::new(FakeGenerator { fragments: AD_TEXT.to_vec(), ..Default::default() });
        let studio = Studio::new(generator.clone(), LocalStore::in_memory());
        let record = studio.generate_once(params()).await.unwrap();
        studio.regenerate_chunk(record.id, 1).await.unwrap();
        let prompts = generator.prompts.lock();
        assert!(prompts[1].contains("Section to rewrite: \"Ad 2: Gift\""));
        assert!(prompts[1].contains(&prompts[0]));
    }

    #[tokio::test]
    async fn overlapping_regeneration_of_same_chunk_is_rejected() {
        let gate = Arc::new(Notify::new());
        let generator = FakeGenerator {
            replies: Mutex::new(VecDeque::from([Ok("New".to_string())])),
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let (studio, record) = seeded(generator).await;

        let (first, second) = tokio::join!(
            studio.regenerate_chunk(record.id, 0),
            async {
                let r = studio.regenerate_chunk(record.id, 0).await;
                gate.notify_one();
                r
            }
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(StudioError::AlreadyRegenerating { chunk_id: 0, .. })));
    }

    #[tokio::test]
    async fn regeneration_applies_to_the_list_as_it_is_at_completion() {
        let gate = Arc::new(Notify::new());
        let generator = FakeGenerator {
            replies: Mutex::new(VecDeque::from([Ok("Regenerated".to_string()), Ok("Again".to_string())])),
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let (studio, record) = seeded(generator).await;

        // another chunk edited meanwhile: both changes survive
        let (result, _) = tokio::join!(studio.regenerate_chunk(record.id, 1), async {
            studio.edit_chunk(record.id, 0, "Edited first").unwrap();
            gate.notify_one();
        });
        let chunks = chunker::chunk(&result.unwrap().raw_text);
        assert_eq!(chunks[0].body, "Edited first");
        assert_eq!(chunks[1].body, "Regenerated");

        // target shifted by a delete meanwhile: rejected
        let (result, _) = tokio::join!(studio.regenerate_chunk(record.id, 1), async {
            studio.delete_chunk(record.id, 0).unwrap();
            gate.notify_one();
        });
        assert!(matches!(result, Err(StudioError::ChunkNotFound { chunk_id: 1, .. })));
    }

    #[tokio::test]
    async fn preferences_update_independently() {
        let studio = studio(FakeGenerator::default());
        assert_eq!(studio.preferences(), Preferences::default());
        let prefs = studio.update_preferences(PreferencesUpdate { theme: Some(Theme::Dark), newsletter_subscribed: None }).unwrap();
        assert_eq!(prefs.theme, Theme::Dark);
        assert!(!prefs.newsletter_subscribed);
        let prefs = studio.update_preferences(PreferencesUpdate { newsletter_subscribed: Some(true), ..Default::default() }).unwrap();
        assert_eq!(prefs.theme, Theme::Dark);
        assert!(prefs.newsletter_subscribed);
    }
}

//! Recognition session: registry, trie and matcher behind one owner.
//!
//! The session keeps the registry and the trie holding the same identity
//! set. Every full load rebuilds both from persisted records and checks
//! they agree; if they don't, the session drops back to `Uninitialized`
//! and only another full load brings it back.

use crate::source::{EmbeddingSource, SourceError};
use chrono::Utc;
use facematch_core::quality::{self, QualityConfig};
use facematch_core::{
    Embedding, EmbeddingError, EmbeddingRegistry, Frame, IdentityRecord, MatchResult, Matcher,
    NameTrie, NearestNeighborMatcher, RecognitionResult, DEFAULT_MATCH_THRESHOLD,
};
use facematch_store::{new_record, IdentityStore, StoreError};
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session is not ready, load identities first")]
    NotReady,
    #[error("embedding source: {0}")]
    Source(#[from] SourceError),
    #[error("only {accepted} of {required} samples passed the quality gate")]
    InsufficientSamples { accepted: usize, required: usize },
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("registry ({registry}) and name index ({trie}) diverged, full reload required")]
    Inconsistent { registry: usize, trie: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    ModelsLoading,
    Ready,
}

/// Tunables for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Maximum Euclidean distance accepted as a match.
    pub match_threshold: f32,
    /// Recognition results kept in the rolling history.
    pub history_limit: usize,
    /// Quality-gated samples averaged into one registration.
    pub samples_per_enroll: usize,
    pub quality: QualityConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            history_limit: 10,
            samples_per_enroll: 3,
            quality: QualityConfig::default(),
        }
    }
}

pub struct RecognitionSession<M: Matcher = NearestNeighborMatcher> {
    registry: EmbeddingRegistry,
    trie: NameTrie,
    matcher: M,
    state: SessionState,
    history: VecDeque<RecognitionResult>,
    settings: SessionSettings,
}

impl RecognitionSession<NearestNeighborMatcher> {
    pub fn new(settings: SessionSettings) -> Self {
        Self::with_matcher(NearestNeighborMatcher, settings)
    }
}

impl<M: Matcher> RecognitionSession<M> {
    pub fn with_matcher(matcher: M, settings: SessionSettings) -> Self {
        Self {
            registry: EmbeddingRegistry::new(),
            trie: NameTrie::new(),
            matcher,
            state: SessionState::Uninitialized,
            history: VecDeque::with_capacity(settings.history_limit),
            settings,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Make sure the model is loaded, then rebuild registry and trie from `records`.
    ///
    /// Loading again while `Ready` skips the model but still rebuilds.
    pub fn load(
        &mut self,
        source: &mut dyn EmbeddingSource,
        records: &[IdentityRecord],
    ) -> Result<(), SessionError> {
        if !source.is_loaded() {
            self.state = SessionState::ModelsLoading;
            tracing::info!("loading face models");
            if let Err(e) = source.load_models() {
                self.state = SessionState::Uninitialized;
                return Err(e.into());
            }
        }

        self.rebuild(records)?;
        self.state = SessionState::Ready;
        tracing::info!(identities = self.registry.len(), "session ready");
        Ok(())
    }

    /// [`load`](Self::load) with records read from `store`.
    pub fn reload(
        &mut self,
        source: &mut dyn EmbeddingSource,
        store: &dyn IdentityStore,
    ) -> Result<(), SessionError> {
        let records = store.load_all()?;
        self.load(source, &records)
    }

    /// Replace registry and trie contents with `records`, without touching
    /// the model. Leaves the session state alone unless the two structures
    /// end up disagreeing.
    pub fn rebuild(&mut self, records: &[IdentityRecord]) -> Result<(), SessionError> {
        self.registry.clear();
        self.trie.clear();
        for record in records {
            self.registry.set(&record.name, record.embedding.clone());
            self.trie.insert(&record.name);
        }

        if let Err(e) = self.check_consistency() {
            tracing::error!(error = %e, "identity structures diverged after rebuild");
            self.registry.clear();
            self.trie.clear();
            self.state = SessionState::Uninitialized;
            return Err(e);
        }

        tracing::debug!(identities = records.len(), "rebuilt registry and name index");
        Ok(())
    }

    /// Drop every identity and the recognition history. A `Ready` session
    /// waits in `ModelsLoading` until the next full load.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.trie.clear();
        self.history.clear();
        if self.state == SessionState::Ready {
            self.state = SessionState::ModelsLoading;
        }
    }

    /// Closest registered identity to `query`, if within the match threshold.
    pub fn find_match(&self, query: &Embedding) -> Option<MatchResult> {
        self.find_match_within(query, self.settings.match_threshold)
    }

    pub fn find_match_within(&self, query: &Embedding, threshold: f32) -> Option<MatchResult> {
        let mut result = self.matcher.find(query, &self.registry, threshold)?;
        if let Some(display) = self.trie.display_name(&result.name) {
            result.name = display.to_string();
        }
        Some(result)
    }

    /// Match every face in `frame` and record the hits in the history.
    ///
    /// A frame with no faces yields an empty vector.
    pub fn recognize_frame(
        &mut self,
        source: &mut dyn EmbeddingSource,
        frame: &Frame,
    ) -> Result<Vec<RecognitionResult>, SessionError> {
        self.require_ready()?;

        let detections = source.extract_all(frame)?;
        let mut results = Vec::new();
        for detection in &detections {
            if let Some(m) = self.find_match(&detection.embedding) {
                results.push(RecognitionResult {
                    name: m.name,
                    confidence: m.confidence,
                    timestamp: Utc::now(),
                });
            }
        }

        tracing::debug!(
            sequence = frame.sequence,
            faces = detections.len(),
            matches = results.len(),
            "recognition pass"
        );

        for result in &results {
            self.push_history(result.clone());
        }
        Ok(results)
    }

    /// Most recent recognition results, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &RecognitionResult> + '_ {
        self.history.iter()
    }

    /// Register `name` from candidate frames.
    ///
    /// Frames with no face or a face below the quality gate are skipped.
    /// Once `samples_per_enroll` samples are accepted they are averaged
    /// and persisted.
    pub fn register(
        &mut self,
        source: &mut dyn EmbeddingSource,
        store: &dyn IdentityStore,
        name: &str,
        frames: &[Frame],
    ) -> Result<IdentityRecord, SessionError> {
        self.require_ready()?;

        let required = self.settings.samples_per_enroll.max(1);
        let mut samples = Vec::with_capacity(required);

        for frame in frames {
            let detections = source.extract_all(frame)?;
            let Some(face) = detections.into_iter().next() else {
                tracing::debug!(sequence = frame.sequence, "register: no face in frame");
                continue;
            };

            let brightness = frame.region_brightness(&face.bbox);
            let report = quality::assess(
                &face.bbox,
                frame.width,
                frame.height,
                brightness,
                &self.settings.quality,
            );
            if !report.is_acceptable(&self.settings.quality) {
                tracing::debug!(
                    sequence = frame.sequence,
                    score = report.overall_score,
                    distance = ?report.distance,
                    lighting = ?report.lighting,
                    angle = ?report.angle,
                    "register: sample rejected"
                );
                continue;
            }

            samples.push(face.embedding);
            if samples.len() == required {
                break;
            }
        }

        if samples.len() < required {
            return Err(SessionError::InsufficientSamples {
                accepted: samples.len(),
                required,
            });
        }

        let embedding = Embedding::mean(&samples)?;
        self.enroll_embedding(store, name, embedding)
    }

    /// Persist an already-extracted embedding under `name` and index it.
    pub fn enroll_embedding(
        &mut self,
        store: &dyn IdentityStore,
        name: &str,
        embedding: Embedding,
    ) -> Result<IdentityRecord, SessionError> {
        if let Some((_, existing)) = self.registry.entries().next() {
            if existing.dim() != embedding.dim() {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: existing.dim(),
                    actual: embedding.dim(),
                }
                .into());
            }
        }

        let record = new_record(name, embedding);
        store.insert(&record)?;
        self.registry.set(&record.name, record.embedding.clone());
        self.trie.insert(&record.name);

        tracing::info!(name = %record.name, id = %record.id, "registered identity");
        Ok(record)
    }

    /// Delete `name` from the store and from both in-memory structures.
    pub fn remove(&mut self, store: &dyn IdentityStore, name: &str) -> Result<bool, SessionError> {
        let stored = store.delete(name)?;
        let in_registry = self.registry.delete(name);
        let in_trie = self.trie.remove(name);
        if in_registry != in_trie {
            self.check_consistency()?;
        }

        let removed = stored || in_registry;
        if removed {
            tracing::info!(name, "removed identity");
        }
        Ok(removed)
    }

    /// Autocomplete suggestions for `prefix`, with display casing.
    pub fn search(&self, prefix: &str) -> Vec<String> {
        self.trie.search_with_prefix(prefix)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.trie.exists(name)
    }

    /// Registered display names.
    pub fn names(&self) -> Vec<String> {
        self.trie.search_with_prefix("")
    }

    fn require_ready(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Ready => Ok(()),
            _ => Err(SessionError::NotReady),
        }
    }

    fn push_history(&mut self, result: RecognitionResult) {
        if self.settings.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.settings.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(result);
    }

    fn check_consistency(&mut self) -> Result<(), SessionError> {
        let consistent = self.registry.len() == self.trie.len()
            && self.registry.entries().all(|(key, _)| self.trie.exists(key));
        if consistent {
            return Ok(());
        }
        let err = SessionError::Inconsistent {
            registry: self.registry.len(),
            trie: self.trie.len(),
        };
        self.state = SessionState::Uninitialized;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::{detection, frame, ScriptedSource};
    use facematch_store::MemoryStore;
    use std::sync::atomic::Ordering;

    fn record(name: &str, values: &[f32]) -> IdentityRecord {
        new_record(name, Embedding::new(values.to_vec()))
    }

    fn ready_session(records: &[IdentityRecord]) -> (RecognitionSession, ScriptedSource) {
        let mut session = RecognitionSession::new(SessionSettings::default());
        let mut source = ScriptedSource::new();
        session.load(&mut source, records).unwrap();
        (session, source)
    }

    #[test]
    fn test_state_machine_load() {
        let mut session = RecognitionSession::new(SessionSettings::default());
        assert_eq!(session.state(), SessionState::Uninitialized);

        let mut source = ScriptedSource::new();
        let loads = source.load_calls.clone();
        session.load(&mut source, &[record("Alice", &[0.0])]).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // Second load: model untouched, identities rebuilt from the new set.
        session.load(&mut source, &[record("Bob", &[1.0])]).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(session.names(), vec!["Bob".to_string()]);
        assert!(!session.exists("alice"));
    }

    #[test]
    fn test_model_load_failure_leaves_uninitialized() {
        let mut session = RecognitionSession::new(SessionSettings::default());
        let mut source = ScriptedSource::new();
        source.fail_load = true;
        let err = session.load(&mut source, &[]).unwrap_err();
        assert!(matches!(err, SessionError::Source(_)));
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_clear_then_reload() {
        let (mut session, mut source) = ready_session(&[record("Alice", &[0.0])]);
        session.clear();
        assert_eq!(session.state(), SessionState::ModelsLoading);
        assert!(session.is_empty());
        assert!(session.search("").is_empty());

        session.load(&mut source, &[record("Alice", &[0.0])]).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_rebuild_keeps_structures_in_step() {
        let mut session = RecognitionSession::new(SessionSettings::default());
        session
            .rebuild(&[
                record("Alice", &[0.0]),
                record("ALICE", &[1.0]),
                record("Bob", &[2.0]),
            ])
            .unwrap();
        // Case-insensitive duplicate collapses in both structures.
        assert_eq!(session.len(), 2);
        assert_eq!(session.search("a"), vec!["ALICE".to_string()]);
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_find_match_uses_display_name() {
        let (session, _) = ready_session(&[
            record("Alice", &[0.0, 0.0, 0.0]),
            record("Bob", &[10.0, 10.0, 10.0]),
        ]);
        let m = session.find_match(&Embedding::new(vec![0.0, 0.0, 0.3])).unwrap();
        assert_eq!(m.name, "Alice");
        assert!((m.confidence - 0.7).abs() < 1e-6);
        assert!(session.find_match(&Embedding::new(vec![0.0, 0.0, 1.0])).is_none());
    }

    #[test]
    fn test_recognize_requires_ready() {
        let mut session = RecognitionSession::new(SessionSettings::default());
        let mut source = ScriptedSource::new();
        let err = session.recognize_frame(&mut source, &frame(1)).unwrap_err();
        assert!(matches!(err, SessionError::NotReady));
    }

    #[test]
    fn test_recognize_matches_every_face() {
        let (mut session, _) = ready_session(&[
            record("Alice", &[0.0, 0.0]),
            record("Bob", &[5.0, 5.0]),
        ]);
        let mut source = ScriptedSource::new()
            .with_face(1, &[0.0, 0.1])
            .with_face(1, &[5.0, 5.0])
            .with_face(1, &[-9.0, -9.0]);
        source.loaded = true;

        let results = session.recognize_frame(&mut source, &frame(1)).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(results[1].confidence, 1.0);
    }

    #[test]
    fn test_recognize_empty_frame() {
        let (mut session, mut source) = ready_session(&[record("Alice", &[0.0])]);
        assert!(session.recognize_frame(&mut source, &frame(99)).unwrap().is_empty());
        assert_eq!(session.history().count(), 0);
    }

    #[test]
    fn test_history_keeps_last_ten() {
        let (mut session, _) = ready_session(&[record("Alice", &[0.0])]);
        let mut source = ScriptedSource::new();
        source.loaded = true;
        for seq in 0..15 {
            source.faces.insert(seq, vec![detection(&[seq as f32 * 0.01])]);
        }
        for seq in 0..15 {
            session.recognize_frame(&mut source, &frame(seq)).unwrap();
        }

        let history: Vec<&RecognitionResult> = session.history().collect();
        assert_eq!(history.len(), 10);
        // Oldest kept is the sixth pass (distance 0.05).
        assert!((history[0].confidence - 0.95).abs() < 1e-5);
        assert!((history[9].confidence - 0.86).abs() < 1e-5);
    }

    #[test]
    fn test_register_averages_quality_samples() {
        let store = MemoryStore::new();
        let (mut session, _) = ready_session(&[]);
        let mut source = ScriptedSource::new()
            .with_face(1, &[1.0, 0.0])
            .with_face(3, &[3.0, 0.0])
            .with_face(4, &[5.0, 0.0])
            .with_face(5, &[100.0, 0.0]);
        source.loaded = true;
        // Frame 2 has no face; frame 5 is never reached.
        let frames: Vec<Frame> = (1..=5).map(frame).collect();

        let record = session.register(&mut source, &store, "Carol", &frames).unwrap();
        assert_eq!(record.embedding.values(), &[3.0, 0.0]);
        assert!(session.exists("carol"));
        assert_eq!(session.search("CA"), vec!["Carol".to_string()]);
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_register_skips_poor_samples() {
        let store = MemoryStore::new();
        let (mut session, _) = ready_session(&[]);
        let mut source = ScriptedSource::new().with_face(1, &[1.0]).with_face(3, &[1.0]);
        source.loaded = true;
        // Dark frame with the head turned away.
        let mut turned = detection(&[1.0]);
        if let Some(landmarks) = turned.bbox.landmarks.as_mut() {
            landmarks[2].0 = 400.0;
        }
        source.faces.insert(2, vec![turned]);
        let dark = Frame::new(vec![0; 640 * 480], 640, 480).with_sequence(2);
        let frames = vec![frame(1), dark, frame(3)];

        let err = session.register(&mut source, &store, "Dan", &frames).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InsufficientSamples { accepted: 2, required: 3 }
        ));
        assert!(!session.exists("dan"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_name_surfaces_store_error() {
        let store = MemoryStore::new();
        let (mut session, _) = ready_session(&[]);
        session.enroll_embedding(&store, "Erin", Embedding::new(vec![1.0])).unwrap();
        let err = session
            .enroll_embedding(&store, "erin", Embedding::new(vec![2.0]))
            .unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::DuplicateName(_))));
        assert_eq!(session.names(), vec!["Erin".to_string()]);
    }

    #[test]
    fn test_enroll_rejects_dimension_change() {
        let store = MemoryStore::new();
        let (mut session, _) = ready_session(&[]);
        session.enroll_embedding(&store, "Erin", Embedding::new(vec![1.0, 2.0])).unwrap();
        let err = session
            .enroll_embedding(&store, "Finn", Embedding::new(vec![1.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Embedding(EmbeddingError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_remove_updates_store_and_index() {
        let store = MemoryStore::new();
        let (mut session, _) = ready_session(&[]);
        session.enroll_embedding(&store, "Gail", Embedding::new(vec![1.0])).unwrap();
        session.enroll_embedding(&store, "Gus", Embedding::new(vec![2.0])).unwrap();

        assert!(session.remove(&store, "GAIL").unwrap());
        assert_eq!(session.search("g"), vec!["Gus".to_string()]);
        assert!(session.find_match(&Embedding::new(vec![1.0])).is_none());
        assert_eq!(store.load_all().unwrap().len(), 1);
        assert!(!session.remove(&store, "gail").unwrap());
    }

    #[test]
    fn test_remove_non_ascii_name_survives_reload() {
        let store = facematch_store::SqliteStore::open_in_memory().unwrap();
        let (mut session, mut source) = ready_session(&[]);
        session.enroll_embedding(&store, "émile", Embedding::new(vec![1.0])).unwrap();

        assert!(session.remove(&store, "ÉMILE").unwrap());
        session.clear();
        session.reload(&mut source, &store).unwrap();
        assert!(!session.exists("émile"));
        assert!(session.search("é").is_empty());
    }

    #[test]
    fn test_reload_from_store() {
        let store = MemoryStore::with_records(vec![record("Hana", &[0.0]), record("Hal", &[1.0])]);
        let mut session = RecognitionSession::new(SessionSettings::default());
        let mut source = ScriptedSource::new();
        session.reload(&mut source, &store).unwrap();
        assert_eq!(session.search("ha").len(), 2);
        assert_eq!(session.state(), SessionState::Ready);
    }
}

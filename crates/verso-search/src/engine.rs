//! Generation management: build, persist, load and atomically swap
//! engine snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use verso_core::model::Document;
use verso_core::schema::Database;

use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::snapshot::EngineSnapshot;

/// Holds the current snapshot, if any.
///
/// Readers take a cheap `Arc` clone under a momentary read lock and then
/// work lock-free against an immutable generation. A rebuild constructs
/// the next snapshot completely before taking the write lock, so readers
/// never see a partially built engine.
#[derive(Debug)]
pub struct Engine {
    current: RwLock<Option<Arc<EngineSnapshot>>>,
    next_generation: AtomicU64,
    config: SearchConfig,
}

impl Engine {
    /// Creates an engine with no snapshot installed.
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        Self {
            current: RwLock::new(None),
            next_generation: AtomicU64::new(1),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EngineUnavailable`] before a successful build
    /// or after a failed rebuild.
    pub fn snapshot(&self) -> SearchResult<Arc<EngineSnapshot>> {
        self.current.read().clone().ok_or_else(|| {
            SearchError::EngineUnavailable("no vector space has been built".to_string())
        })
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.current.read().is_some()
    }

    /// Generation number of the installed snapshot.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|s| s.generation())
    }

    /// Install `snapshot` as the current generation and return it.
    ///
    /// Generations only move forward: a snapshot whose generation is not
    /// greater than the installed one is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::StaleGeneration`] when a newer (or the same)
    /// generation is already installed; the engine is left untouched.
    pub fn install(&self, snapshot: EngineSnapshot) -> SearchResult<Arc<EngineSnapshot>> {
        let generation = snapshot.generation();
        self.next_generation
            .fetch_max(generation + 1, Ordering::SeqCst);

        let mut current = self.current.write();
        if let Some(installed) = current.as_ref() {
            if installed.generation() >= generation {
                log::warn!(
                    "Dropping generation {}: generation {} is already installed",
                    generation,
                    installed.generation()
                );
                return Err(SearchError::StaleGeneration {
                    generation,
                    current: installed.generation(),
                });
            }
        }
        let snapshot = Arc::new(snapshot);
        let previous = current.replace(Arc::clone(&snapshot));
        drop(current);

        log::info!(
            "Installed generation {} (previous: {})",
            generation,
            previous
                .as_ref()
                .map_or_else(|| "none".to_string(), |p| p.generation().to_string())
        );
        Ok(snapshot)
    }

    /// Make the next rebuild use a generation number of at least `next`.
    pub fn reserve_generation(&self, next: u64) {
        self.next_generation.fetch_max(next, Ordering::SeqCst);
    }

    /// Take the engine offline.
    pub fn clear(&self) {
        if let Some(previous) = self.current.write().take() {
            log::warn!("Generation {} taken offline", previous.generation());
        }
    }

    /// Take the engine offline unless the installed generation is at least
    /// `generation`.
    fn clear_older_than(&self, generation: u64) {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|s| s.generation() < generation) {
            if let Some(previous) = current.take() {
                log::warn!("Generation {} taken offline", previous.generation());
            }
        }
    }

    /// Build a new generation from cleaned documents and swap it in.
    ///
    /// On failure the engine is taken offline: a corpus that cannot be
    /// built must not keep serving answers from a generation it was meant
    /// to replace. A newer generation installed meanwhile by another caller
    /// stays online.
    ///
    /// # Errors
    ///
    /// Returns the build failure ([`SearchError::Build`] or
    /// [`SearchError::Data`]), or [`SearchError::StaleGeneration`] when a
    /// newer generation finished first.
    pub fn rebuild(&self, documents: Vec<Document>) -> SearchResult<Arc<EngineSnapshot>> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "Building generation {} from {} documents",
            generation,
            documents.len()
        );

        match EngineSnapshot::build(documents, &self.config, generation) {
            Ok(snapshot) => self.install(snapshot),
            Err(e) => {
                log::error!("Build of generation {generation} failed: {e}");
                self.clear_older_than(generation);
                Err(e)
            }
        }
    }

    /// Load the persisted generation from `db` and swap it in.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Artifact`] when nothing is stored or the
    /// stored version is stale, and [`SearchError::Build`] when the stored
    /// artifacts are inconsistent. The engine is left untouched on error.
    pub fn load_from(&self, db: &Database) -> SearchResult<Arc<EngineSnapshot>> {
        let set = db.load_artifacts()?;
        let snapshot = EngineSnapshot::from_artifacts(set)?;
        log::info!(
            "Loaded generation {} ({} documents, {} terms)",
            snapshot.generation(),
            snapshot.documents().len(),
            snapshot.space().len()
        );
        self.install(snapshot)
    }

    /// Persist the current generation to `db`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::EngineUnavailable`] when nothing is installed,
    /// or [`SearchError::Artifact`] when the write fails.
    pub fn save_to(&self, db: &mut Database) -> SearchResult<u64> {
        let snapshot = self.snapshot()?;
        let set = snapshot.to_artifacts()?;
        db.save_artifacts(&set)?;
        log::info!(
            "Saved generation {} ({} documents, {} terms)",
            snapshot.generation(),
            set.header.document_count,
            set.header.vocabulary_size
        );
        Ok(snapshot.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_core::model::DocId;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new(
                DocId::new("a"),
                "A",
                "x",
                "love soul",
                vec!["love".to_string(), "soul".to_string()],
            ),
            Document::new(
                DocId::new("b"),
                "B",
                "y",
                "love rain",
                vec!["love".to_string(), "rain".to_string()],
            ),
        ]
    }

    #[test]
    fn test_unavailable_before_build() {
        let engine = Engine::new(SearchConfig::default());
        assert!(engine.snapshot().unwrap_err().is_unavailable());
        assert_eq!(engine.generation(), None);
    }

    #[test]
    fn test_rebuild_increments_generation() {
        let engine = Engine::new(SearchConfig::default());
        let first = engine.rebuild(corpus()).unwrap();
        let second = engine.rebuild(corpus()).unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(second.generation(), 2);
        assert_eq!(engine.generation(), Some(2));
    }

    #[test]
    fn test_reserved_generation_is_used() {
        let engine = Engine::new(SearchConfig::default());
        engine.reserve_generation(7);
        engine.reserve_generation(3);
        assert_eq!(engine.rebuild(corpus()).unwrap().generation(), 7);
    }

    #[test]
    fn test_reader_keeps_old_generation_across_swap() {
        let engine = Engine::new(SearchConfig::default());
        let held = engine.rebuild(corpus()).unwrap();
        engine.rebuild(corpus()).unwrap();
        assert_eq!(held.generation(), 1);
        assert_eq!(held.documents().len(), 2);
    }

    #[test]
    fn test_failed_rebuild_takes_engine_offline() {
        let engine = Engine::new(SearchConfig::default());
        engine.rebuild(corpus()).unwrap();
        let err = engine.rebuild(Vec::new()).unwrap_err();
        assert!(err.is_build_failure());
        assert!(!engine.is_available());
    }

    #[test]
    fn test_older_generation_never_replaces_newer() {
        let engine = Engine::new(SearchConfig::default());
        let config = SearchConfig::default();
        let newer = EngineSnapshot::build(corpus(), &config, 3).unwrap();
        let older = EngineSnapshot::build(corpus(), &config, 2).unwrap();

        assert_eq!(engine.install(newer).unwrap().generation(), 3);
        let err = engine.install(older).unwrap_err();
        assert!(matches!(
            err,
            SearchError::StaleGeneration {
                generation: 2,
                current: 3
            }
        ));
        assert_eq!(engine.generation(), Some(3));
    }

    #[test]
    fn test_failed_build_only_clears_older_generations() {
        let engine = Engine::new(SearchConfig::default());
        let config = SearchConfig::default();
        engine
            .install(EngineSnapshot::build(corpus(), &config, 5).unwrap())
            .unwrap();

        // A build numbered 3 failing after 5 went live leaves 5 serving.
        engine.clear_older_than(3);
        assert_eq!(engine.generation(), Some(5));

        // The next build is numbered 6; its failure takes 5 offline.
        let err = engine.rebuild(Vec::new()).unwrap_err();
        assert!(err.is_build_failure());
        assert!(!engine.is_available());
    }

    #[test]
    fn test_rebuild_returns_its_own_snapshot() {
        let engine = Engine::new(SearchConfig::default());
        engine.reserve_generation(4);
        let built = engine.rebuild(corpus()).unwrap();
        assert_eq!(built.generation(), 4);
        assert!(Arc::ptr_eq(&built, &engine.snapshot().unwrap()));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let engine = Engine::new(SearchConfig::default());
        engine.rebuild(corpus()).unwrap();
        let mut db = Database::open_in_memory().unwrap();
        assert_eq!(engine.save_to(&mut db).unwrap(), 1);

        let fresh = Engine::new(SearchConfig::default());
        let loaded = fresh.load_from(&db).unwrap();
        assert_eq!(loaded.generation(), 1);
        // The next build continues after the loaded generation.
        assert_eq!(fresh.rebuild(corpus()).unwrap().generation(), 2);
    }

    #[test]
    fn test_load_from_empty_store_fails() {
        let engine = Engine::new(SearchConfig::default());
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            engine.load_from(&db),
            Err(SearchError::Artifact(_))
        ));
        assert!(!engine.is_available());
    }
}

// ============================================
// Recommender Service
// ============================================
//
// Owns the corpus snapshot (problems + vectorizer + feature matrix) and the
// user-vector map, and drives the pipeline:
//
//   fetch -> vectorize -> cache -> score -> filter -> sort
//
// Refresh state machine:
//   STALE -> FETCHING -> READY
//   FETCHING -> (fetch failed) -> STALE, previous snapshot kept
//
// A refresh builds a complete new snapshot and swaps it in under the write
// lock, so readers only ever see a whole snapshot. At most one refresh runs
// at a time.

use crate::models::{solved_problem_ids, Problem, RecommendationFilters, RecommendedProblem};
use crate::services::features::{FeatureComposer, FeatureMatrix, DEFAULT_RATING};
use crate::services::profile_builder::UserProfileBuilder;
use crate::services::ranking::RecommendationRanker;
use crate::services::source::{ProblemSource, SourceError};
use crate::services::store::{within_ttl, CachedCorpus, RecommenderStore, UserVectors};
use crate::services::vectorizer::TagVectorizer;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ndarray::Array1;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("Failed to fetch problems: {0}")]
    Fetch(#[from] SourceError),
}

pub type Result<T> = std::result::Result<T, RecommenderError>;

#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    /// Age after which the corpus is refetched
    pub cache_ttl: Duration,
    /// Vocabulary bound of the tag vectorizer
    pub max_features: usize,
    /// Rating assumed for unrated problems when composing features
    pub default_rating: i32,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600), // 1 hour
            max_features: 100,
            default_rating: DEFAULT_RATING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    Stale,
    Fetching,
    Ready,
}

/// Immutable corpus view; replaced wholesale on refresh
#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    pub problems: Vec<Problem>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub vectorizer: Option<Arc<TagVectorizer>>,
    /// Present only when the vectorizer and corpus were both usable
    pub features: Option<FeatureMatrix>,
}

impl CorpusSnapshot {
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.fetched_at {
            Some(fetched_at) => !within_ttl(fetched_at, ttl, now),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub problems: usize,
    pub feature_dimension: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommenderStatus {
    pub state: RefreshState,
    pub problems: usize,
    pub vocabulary_size: Option<usize>,
    pub feature_dimension: Option<usize>,
    pub last_update: Option<DateTime<Utc>>,
    pub user_profiles: usize,
}

pub struct Recommender {
    source: Arc<dyn ProblemSource>,
    store: Arc<dyn RecommenderStore>,
    config: RecommenderConfig,
    composer: FeatureComposer,
    profile_builder: UserProfileBuilder,
    ranker: RecommendationRanker,
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    user_vectors: DashMap<String, Vec<f64>>,
    refresh_lock: Mutex<()>,
    /// Orders user-vector saves so the last write holds every profile
    persist_lock: Mutex<()>,
}

impl Recommender {
    pub fn new(
        source: Arc<dyn ProblemSource>,
        store: Arc<dyn RecommenderStore>,
        config: RecommenderConfig,
    ) -> Self {
        Self {
            source,
            store,
            composer: FeatureComposer::new(config.default_rating),
            profile_builder: UserProfileBuilder::new(),
            ranker: RecommendationRanker::new(),
            config,
            snapshot: RwLock::new(Arc::new(CorpusSnapshot::default())),
            user_vectors: DashMap::new(),
            refresh_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Load persisted state, fetching whatever is missing or expired.
    /// Failures are logged and leave the affected artefact unavailable.
    pub async fn initialize(&self) {
        let _guard = self.refresh_lock.lock().await;
        let now = Utc::now();

        let cached = match self.store.load_corpus().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Failed to load cached problems");
                None
            }
        };

        let corpus = match cached {
            Some(cached) if cached.is_fresh(self.config.cache_ttl, now) => {
                info!(
                    problems = cached.problems.len(),
                    fetched_at = %cached.fetched_at,
                    "Using cached problem data"
                );
                Some(cached)
            }
            expired => match self.fetch_corpus().await {
                Ok(fresh) => Some(fresh),
                Err(_) => {
                    if expired.is_some() {
                        warn!("Falling back to expired cached problem data");
                    }
                    expired
                }
            },
        };

        match self.store.load_user_vectors().await {
            Ok(vectors) => {
                info!(profiles = vectors.len(), "Loaded user vectors");
                for (handle, vector) in vectors {
                    self.user_vectors.insert(handle, vector);
                }
            }
            Err(e) => warn!(error = %e, "Failed to load user vectors"),
        }

        let vectorizer = match self.store.load_vectorizer().await {
            Ok(Some(vectorizer)) => {
                info!(vocabulary = vectorizer.dimension(), "Loaded tag vectorizer");
                Some(Arc::new(vectorizer))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to load tag vectorizer");
                None
            }
        };

        let snapshot = self.build_snapshot(corpus, vectorizer).await;
        *self.snapshot.write().await = Arc::new(snapshot);
    }

    /// Refetch the corpus now. The current snapshot stays in place on failure.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Refetch the corpus if it expired, unless a refresh is already running
    pub async fn refresh_if_stale(&self) {
        if !self.snapshot().await.is_stale(self.config.cache_ttl, Utc::now()) {
            return;
        }

        let Ok(_guard) = self.refresh_lock.try_lock() else {
            debug!("Refresh already in progress, serving current snapshot");
            return;
        };

        // A refresh may have completed between the check and the lock
        if !self.snapshot().await.is_stale(self.config.cache_ttl, Utc::now()) {
            return;
        }

        if let Err(e) = self.refresh_locked().await {
            warn!(error = %e, "Expired problem data could not be refreshed");
        }
    }

    /// Top `count` unsolved problems for `handle`, most similar first.
    /// Any failure degrades to an empty list.
    pub async fn recommend(
        &self,
        handle: &str,
        count: usize,
        filters: &RecommendationFilters,
    ) -> Vec<RecommendedProblem> {
        self.refresh_if_stale().await;

        let snapshot = self.snapshot().await;
        let Some(features) = snapshot.features.as_ref() else {
            warn!(handle = %handle, "Problem features unavailable, no recommendations");
            return Vec::new();
        };

        let solved = match self.source.fetch_user_status(handle).await {
            Ok(submissions) => Some(solved_problem_ids(&submissions)),
            Err(e) => {
                warn!(handle = %handle, error = %e, "Failed to fetch user submissions");
                None
            }
        };

        let user_vector = match self.stored_user_vector(handle, features.dimension()) {
            Some(vector) => vector,
            None => {
                let Some(solved) = solved.as_ref() else {
                    return Vec::new();
                };
                match self
                    .update_user_vector(handle, solved, features, &snapshot.problems)
                    .await
                {
                    Some(vector) => vector,
                    None => return Vec::new(),
                }
            }
        };

        let solved = solved.unwrap_or_default();
        match self.ranker.rank(
            user_vector.view(),
            features,
            &snapshot.problems,
            &solved,
            count,
            filters,
        ) {
            Ok(recommendations) => {
                info!(
                    handle = %handle,
                    solved = solved.len(),
                    returned = recommendations.len(),
                    "Served recommendations"
                );
                recommendations
            }
            Err(e) => {
                error!(handle = %handle, error = %e, "Ranking failed");
                Vec::new()
            }
        }
    }

    pub async fn snapshot(&self) -> Arc<CorpusSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub fn user_vector(&self, handle: &str) -> Option<Vec<f64>> {
        self.user_vectors.get(handle).map(|v| v.value().clone())
    }

    pub async fn status(&self) -> RecommenderStatus {
        let snapshot = self.snapshot().await;
        let state = if self.refresh_lock.try_lock().is_err() {
            RefreshState::Fetching
        } else if snapshot.is_stale(self.config.cache_ttl, Utc::now()) {
            RefreshState::Stale
        } else {
            RefreshState::Ready
        };

        RecommenderStatus {
            state,
            problems: snapshot.problems.len(),
            vocabulary_size: snapshot.vectorizer.as_ref().map(|v| v.dimension()),
            feature_dimension: snapshot.features.as_ref().map(|f| f.dimension()),
            last_update: snapshot.fetched_at,
            user_profiles: self.user_vectors.len(),
        }
    }

    async fn refresh_locked(&self) -> Result<RefreshSummary> {
        info!("Refreshing problem data");
        let corpus = self.fetch_corpus().await?;
        let vectorizer = self.snapshot().await.vectorizer.clone();

        let snapshot = self.build_snapshot(Some(corpus), vectorizer).await;
        let summary = RefreshSummary {
            problems: snapshot.problems.len(),
            feature_dimension: snapshot.features.as_ref().map(|f| f.dimension()),
        };

        *self.snapshot.write().await = Arc::new(snapshot);
        info!(
            problems = summary.problems,
            feature_dimension = ?summary.feature_dimension,
            "Problem data refreshed"
        );
        Ok(summary)
    }

    async fn fetch_corpus(&self) -> Result<CachedCorpus> {
        let problemset = self.source.fetch_problemset().await.map_err(|e| {
            error!(error = %e, "Error fetching problems");
            e
        })?;

        let corpus = CachedCorpus::new(problemset.into_problems(), Utc::now());
        if let Err(e) = self.store.save_corpus(&corpus).await {
            warn!(error = %e, "Failed to persist problem data");
        }

        Ok(corpus)
    }

    async fn build_snapshot(
        &self,
        corpus: Option<CachedCorpus>,
        vectorizer: Option<Arc<TagVectorizer>>,
    ) -> CorpusSnapshot {
        let Some(corpus) = corpus else {
            warn!("Problem data not available, features skipped");
            return CorpusSnapshot {
                vectorizer,
                ..Default::default()
            };
        };

        let vectorizer = match vectorizer {
            Some(vectorizer) => Some(vectorizer),
            None => self.fit_vectorizer(&corpus.problems).await,
        };

        let features = vectorizer.as_ref().and_then(|vectorizer| {
            match self.composer.compose(&corpus.problems, vectorizer) {
                Ok(features) => Some(features),
                Err(e) => {
                    warn!(error = %e, "Skipping feature composition");
                    None
                }
            }
        });

        CorpusSnapshot {
            problems: corpus.problems,
            fetched_at: Some(corpus.fetched_at),
            vectorizer,
            features,
        }
    }

    async fn fit_vectorizer(&self, problems: &[Problem]) -> Option<Arc<TagVectorizer>> {
        let documents: Vec<String> = problems.iter().map(Problem::tags_text).collect();
        let vectorizer = match TagVectorizer::fit(&documents, self.config.max_features) {
            Ok(vectorizer) => vectorizer,
            Err(e) => {
                warn!(error = %e, "Cannot fit tag vectorizer");
                return None;
            }
        };

        info!(vocabulary = vectorizer.dimension(), "Fitted tag vectorizer");
        if let Err(e) = self.store.save_vectorizer(&vectorizer).await {
            warn!(error = %e, "Failed to persist tag vectorizer");
        }

        Some(Arc::new(vectorizer))
    }

    /// Stored profile, ignored when built against a different feature layout
    fn stored_user_vector(&self, handle: &str, dimension: usize) -> Option<Array1<f64>> {
        let stored = self.user_vectors.get(handle)?;
        if stored.len() != dimension {
            debug!(
                handle = %handle,
                stored = stored.len(),
                expected = dimension,
                "Stored user vector has outdated dimensionality, rebuilding"
            );
            return None;
        }
        Some(Array1::from(stored.value().clone()))
    }

    async fn update_user_vector(
        &self,
        handle: &str,
        solved: &HashSet<String>,
        features: &FeatureMatrix,
        problems: &[Problem],
    ) -> Option<Array1<f64>> {
        let vector = self
            .profile_builder
            .build(handle, solved, features, problems)?;
        self.user_vectors
            .insert(handle.to_string(), vector.to_vec());

        let _guard = self.persist_lock.lock().await;
        let vectors: UserVectors = self
            .user_vectors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        if let Err(e) = self.store.save_user_vectors(&vectors).await {
            warn!(handle = %handle, error = %e, "Failed to persist user vectors");
        }

        Some(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProblemRef, ProblemSet, ProblemStatistic, Submission};
    use crate::services::source::MockProblemSource;
    use crate::services::store::FileStore;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tempfile::TempDir;

    fn problem(contest_id: i64, index: &str, rating: i32, tags: &[&str]) -> Problem {
        Problem {
            contest_id: Some(contest_id),
            problemset_name: None,
            index: index.to_string(),
            name: format!("Problem {}{}", contest_id, index),
            problem_type: Some("PROGRAMMING".to_string()),
            points: None,
            rating: Some(rating),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            solved_count: 0,
        }
    }

    fn problemset() -> ProblemSet {
        ProblemSet {
            problems: vec![
                problem(1, "A", 800, &["math"]),
                problem(1, "B", 1200, &["dp"]),
                problem(1, "C", 1600, &["math", "dp"]),
            ],
            problem_statistics: vec![ProblemStatistic {
                contest_id: Some(1),
                index: "A".to_string(),
                solved_count: 1000,
            }],
        }
    }

    fn accepted(contest_id: i64, index: &str) -> Submission {
        Submission {
            verdict: Some("OK".to_string()),
            problem: ProblemRef {
                contest_id: Some(contest_id),
                index: index.to_string(),
            },
        }
    }

    fn recommender(source: MockProblemSource, dir: &TempDir) -> Recommender {
        Recommender::new(
            Arc::new(source),
            Arc::new(FileStore::new(dir.path())),
            RecommenderConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_initialize_fetches_and_fits_when_nothing_cached() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        source
            .expect_fetch_problemset()
            .times(1)
            .returning(|| Ok(problemset()));

        let recommender = recommender(source, &dir);
        recommender.initialize().await;

        let snapshot = recommender.snapshot().await;
        assert_eq!(snapshot.problems.len(), 3);
        assert_eq!(snapshot.problems[0].solved_count, 1000);
        let features = snapshot.features.as_ref().unwrap();
        assert_eq!(features.rows(), 3);

        let store = FileStore::new(dir.path());
        assert!(store.load_vectorizer().await.unwrap().is_some());
        assert_eq!(store.load_corpus().await.unwrap().unwrap().problems.len(), 3);
        assert_eq!(recommender.status().await.state, RefreshState::Ready);
    }

    #[tokio::test]
    async fn test_initialize_uses_fresh_cache_without_fetching() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store
            .save_corpus(&CachedCorpus::new(problemset().into_problems(), Utc::now()))
            .await
            .unwrap();

        // No expectations: any fetch would panic
        let recommender = recommender(MockProblemSource::new(), &dir);
        recommender.initialize().await;

        assert_eq!(recommender.snapshot().await.problems.len(), 3);
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_expired_cache() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let old = Utc::now() - chrono::Duration::hours(5);
        store
            .save_corpus(&CachedCorpus::new(problemset().into_problems(), old))
            .await
            .unwrap();

        let mut source = MockProblemSource::new();
        source
            .expect_fetch_problemset()
            .times(1)
            .returning(|| Err(SourceError::Transport("connection refused".to_string())));

        let recommender = recommender(source, &dir);
        recommender.initialize().await;

        let snapshot = recommender.snapshot().await;
        assert_eq!(snapshot.problems.len(), 3);
        assert_eq!(snapshot.fetched_at, Some(old));
        assert!(snapshot.features.is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        let mut calls = 0;
        source
            .expect_fetch_problemset()
            .times(2)
            .returning(move || {
                calls += 1;
                if calls == 1 {
                    Ok(problemset())
                } else {
                    Err(SourceError::Api("Call limit exceeded".to_string()))
                }
            });

        let recommender = recommender(source, &dir);
        recommender.initialize().await;
        let before = recommender.snapshot().await;

        let result = recommender.refresh().await;
        assert!(matches!(result, Err(RecommenderError::Fetch(_))));

        let after = recommender.snapshot().await;
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.problems, problemset().into_problems());
    }

    #[tokio::test]
    async fn test_refresh_reuses_fitted_vectorizer() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        let mut calls = 0;
        source
            .expect_fetch_problemset()
            .times(2)
            .returning(move || {
                calls += 1;
                let mut set = problemset();
                if calls == 2 {
                    set.problems.push(problem(2, "A", 2000, &["geometry"]));
                }
                Ok(set)
            });

        let recommender = recommender(source, &dir);
        recommender.initialize().await;
        let vocabulary = recommender.snapshot().await.vectorizer.as_ref().unwrap().dimension();

        let summary = recommender.refresh().await.unwrap();
        assert_eq!(summary.problems, 4);

        let snapshot = recommender.snapshot().await;
        assert_eq!(snapshot.vectorizer.as_ref().unwrap().dimension(), vocabulary);
        assert_eq!(summary.feature_dimension, Some(vocabulary + 2));
        assert_eq!(snapshot.features.as_ref().unwrap().rows(), 4);
    }

    #[tokio::test]
    async fn test_recommend_excludes_solved_and_persists_profile() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        source
            .expect_fetch_problemset()
            .times(1)
            .returning(|| Ok(problemset()));
        source
            .expect_fetch_user_status()
            .times(1)
            .returning(|_| Ok(vec![accepted(1, "A")]));

        let recommender = recommender(source, &dir);
        recommender.initialize().await;

        let recommendations = recommender
            .recommend("tourist", 2, &RecommendationFilters::default())
            .await;

        let ids: Vec<&str> = recommendations.iter().map(|r| r.problem_id.as_str()).collect();
        assert_eq!(ids, vec!["1_C", "1_B"]);

        let stored = FileStore::new(dir.path()).load_user_vectors().await.unwrap();
        assert_eq!(stored.get("tourist"), recommender.user_vector("tourist").as_ref());
    }

    #[tokio::test]
    async fn test_recommend_without_history_and_failed_fetch_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        source
            .expect_fetch_problemset()
            .times(1)
            .returning(|| Ok(problemset()));
        source
            .expect_fetch_user_status()
            .times(1)
            .returning(|_| Err(SourceError::Api("handle not found".to_string())));

        let recommender = recommender(source, &dir);
        recommender.initialize().await;

        let recommendations = recommender
            .recommend("nobody", 10, &RecommendationFilters::default())
            .await;
        assert!(recommendations.is_empty());
        assert!(recommender.user_vector("nobody").is_none());
    }

    #[tokio::test]
    async fn test_stored_profile_used_when_submissions_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        source
            .expect_fetch_problemset()
            .times(1)
            .returning(|| Ok(problemset()));
        let mut calls = 0;
        source
            .expect_fetch_user_status()
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok(vec![accepted(1, "A")])
                } else {
                    Err(SourceError::Transport("timeout".to_string()))
                }
            });

        let recommender = recommender(source, &dir);
        recommender.initialize().await;

        let first = recommender
            .recommend("petr", 10, &RecommendationFilters::default())
            .await;
        assert_eq!(first.len(), 2);

        // Solved set unknown now, so the stored profile ranks the whole corpus
        let second = recommender
            .recommend("petr", 10, &RecommendationFilters::default())
            .await;
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].problem_id, "1_A");
    }

    #[tokio::test]
    async fn test_recommend_without_corpus_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        source
            .expect_fetch_problemset()
            .returning(|| Err(SourceError::Transport("offline".to_string())));

        let recommender = recommender(source, &dir);
        recommender.initialize().await;

        let recommendations = recommender
            .recommend("tourist", 10, &RecommendationFilters::default())
            .await;
        assert!(recommendations.is_empty());

        let status = recommender.status().await;
        assert_eq!(status.state, RefreshState::Stale);
        assert_eq!(status.problems, 0);
        assert!(status.feature_dimension.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_profiles_are_all_persisted() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        source
            .expect_fetch_problemset()
            .times(1)
            .returning(|| Ok(problemset()));
        source
            .expect_fetch_user_status()
            .returning(|_| Ok(vec![accepted(1, "A")]));

        let recommender = Arc::new(recommender(source, &dir));
        recommender.initialize().await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let recommender = Arc::clone(&recommender);
                tokio::spawn(async move {
                    recommender
                        .recommend(&format!("user{}", i), 10, &RecommendationFilters::default())
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().len(), 2);
        }

        let stored = FileStore::new(dir.path()).load_user_vectors().await.unwrap();
        assert_eq!(stored.len(), 16);
        for i in 0..16 {
            let handle = format!("user{}", i);
            assert_eq!(stored.get(&handle), recommender.user_vector(&handle).as_ref());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_see_whole_snapshots_during_refresh() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        let mut calls = 0;
        source.expect_fetch_problemset().returning(move || {
            calls += 1;
            let mut set = problemset();
            if calls % 2 == 0 {
                set.problems.push(problem(2, "A", 2000, &["geometry"]));
            }
            Ok(set)
        });
        source
            .expect_fetch_user_status()
            .returning(|_| Ok(vec![accepted(1, "A")]));

        let recommender = Arc::new(recommender(source, &dir));
        recommender.initialize().await;

        let refresher = {
            let recommender = Arc::clone(&recommender);
            tokio::spawn(async move {
                for _ in 0..20 {
                    recommender.refresh().await.unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|i| {
                let recommender = Arc::clone(&recommender);
                tokio::spawn(async move {
                    for _ in 0..20 {
                        let snapshot = recommender.snapshot().await;
                        let features = snapshot.features.as_ref().unwrap();
                        assert_eq!(features.rows(), snapshot.problems.len());

                        let recommendations = recommender
                            .recommend(&format!("reader{}", i), 10, &RecommendationFilters::default())
                            .await;
                        assert!(recommendations.len() == 2 || recommendations.len() == 3);
                        assert!(recommendations.iter().all(|r| r.problem_id != "1_A"));
                    }
                })
            })
            .collect();

        refresher.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }

        let snapshot = recommender.snapshot().await;
        assert_eq!(snapshot.features.as_ref().unwrap().rows(), snapshot.problems.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_expired_corpus_is_refetched_once() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let old = Utc::now() - chrono::Duration::hours(5);
        store
            .save_corpus(&CachedCorpus::new(problemset().into_problems(), old))
            .await
            .unwrap();

        let fetches = Arc::new(AtomicUsize::new(0));
        let mut source = MockProblemSource::new();
        let counter = Arc::clone(&fetches);
        source.expect_fetch_problemset().returning(move || {
            // Startup fetch fails so the expired cache is served
            if counter.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                Err(SourceError::Transport("timeout".to_string()))
            } else {
                Ok(problemset())
            }
        });
        source
            .expect_fetch_user_status()
            .returning(|_| Ok(vec![accepted(1, "A")]));

        let recommender = Arc::new(recommender(source, &dir));
        recommender.initialize().await;
        assert_eq!(recommender.status().await.state, RefreshState::Stale);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let recommender = Arc::clone(&recommender);
                tokio::spawn(async move {
                    recommender
                        .recommend(&format!("user{}", i), 10, &RecommendationFilters::default())
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(fetches.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(recommender.status().await.state, RefreshState::Ready);
    }

    #[tokio::test]
    async fn test_empty_vocabulary_skips_features() {
        let dir = TempDir::new().unwrap();
        let mut source = MockProblemSource::new();
        source.expect_fetch_problemset().times(1).returning(|| {
            Ok(ProblemSet {
                problems: vec![problem(1, "A", 800, &[]), problem(1, "B", 900, &[])],
                problem_statistics: vec![],
            })
        });

        let recommender = recommender(source, &dir);
        recommender.initialize().await;

        let snapshot = recommender.snapshot().await;
        assert_eq!(snapshot.problems.len(), 2);
        assert!(snapshot.vectorizer.is_none());
        assert!(snapshot.features.is_none());
    }
}

pub mod features;
pub mod profile_builder;
pub mod ranking;
pub mod recommender;
pub mod source;
pub mod store;
pub mod vectorizer;

pub use features::{FeatureComposer, FeatureError, FeatureMatrix};
pub use profile_builder::UserProfileBuilder;
pub use ranking::{RankingError, RecommendationRanker};
pub use recommender::{
    CorpusSnapshot, RecommenderConfig, RecommenderError, RecommenderStatus, RefreshState,
    RefreshSummary, Recommender,
};
#[cfg(test)]
pub use source::MockProblemSource;
pub use source::{CodeforcesClient, ProblemSource, SourceError};
pub use store::{CachedCorpus, FileStore, RecommenderStore, StoreError, UserVectors};
pub use vectorizer::{TagVectorizer, VectorizerError};

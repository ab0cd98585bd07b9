/// ML модели

pub mod gradient_boosting;
pub mod histogram;
pub mod metrics;
pub mod model_selection;
pub mod random_forest;
pub mod search;
pub mod tree;

pub use gradient_boosting::{BoostingType, GradientBoostingClassifier, HyperParams};
pub use metrics::{EvaluationMetrics, Scoring};
pub use model_selection::{ModelArtifact, ModelSelector, RunState, RunSummary, TrainingOutcome};
pub use random_forest::RandomForest;
pub use search::{CandidateResult, RandomizedSearch, SearchResult, StratifiedKFold};

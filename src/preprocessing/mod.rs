/// Модуль предобработки данных

pub mod encoding;
pub mod feature_engineering;
pub mod feature_selection;
pub mod skewness;
pub mod smote;

pub use encoding::{CategoryEncoder, EncodingMap};
pub use feature_engineering::{FeatureEngineer, ProcessedDatasets};
pub use feature_selection::{FeatureImportance, FeatureSelector};
pub use skewness::SkewCorrector;
pub use smote::Smote;

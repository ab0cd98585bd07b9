//! Reservation ML - предсказание отмены бронирований

pub mod config;
pub mod error;
pub mod models;
pub mod preprocessing;
pub mod table;
pub mod tracking;

pub use config::PipelineConfig;
pub use error::{Error, ProcessingError, SchemaError, TrainingError};
pub use models::*;
pub use preprocessing::*;
pub use table::{RawTable, Table};
pub use tracking::ExperimentTracker;

pub mod application;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod logging;
pub mod notify;
pub mod oracle;
pub mod questions;
pub mod queue;
pub mod scoring;
pub mod stage;

pub use application::{Application, EvalStatus};
pub use config::{load_config, EvalConfig, OracleConfig};
pub use error::{ConfigError, PitchgradeError, Result};
pub use evaluator::{EvalError, Evaluator};
pub use events::{JobEvent, JobEventBroadcaster};
pub use notify::{AlertSink, LogAlert};
pub use oracle::{HttpOracle, OracleError, ScoringOracle};
pub use queue::{EvalWorker, EvaluationJob, EvaluationQueue, JobStatus, QueueError};
pub use scoring::{EvaluationResult, QuestionScoreRecord};
pub use stage::{classify, CanonicalStage, StageClassification};

//! Pre- and post-execution reliability prediction.

pub mod predictor;

pub use predictor::{
    ReliabilityThresholds, score_post_execution, score_pre_execution, summarize_lint,
};

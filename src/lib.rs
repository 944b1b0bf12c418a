//! LLM-assisted essay grading.
//!
//! Screens a submission for machine-generated or incoherent content,
//! classifies the question against a rubric library, and turns the model's
//! free-form scoring answer into a bounded, validated [`GradeResult`].

pub mod config;
pub mod gateway;
pub mod grading;
pub mod logging;

pub use config::GraderConfig;
pub use gateway::{ChatBackend, ModelGateway, ModelReply, RetryPolicy};
pub use grading::band::GradeBand;
pub use grading::rubrics::{RubricEntry, RubricLibrary};
pub use grading::screener::AuthenticityVerdict;
pub use grading::{GradeResult, Grader};

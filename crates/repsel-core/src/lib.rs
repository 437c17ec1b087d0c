// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Shared types for the representative series selection pipeline.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod procedure;
pub mod record;
pub mod repro;

pub use config::{
    Bounds, ContinuousScaling, KMeansConfig, LeveneCenter, NormalityConfig, RunConfig,
};
pub use diagnostics::{
    ExclusionReason, FallbackRecord, ImputationMethod, ImputationReport, METADATA_SCHEMA_VERSION,
    RunMetadata, RunWarning,
};
pub use error::RepselError;
pub use execution_context::{CancelToken, ExecutionContext, ProgressSink};
pub use procedure::{Intent, Procedure};
pub use record::{AttributeKind, AttributeValue, RecordSet, SeriesRecord};
pub use repro::{DEFAULT_SEED, RngStream, seeded_rng};

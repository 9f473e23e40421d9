//! finbench - Common Library
//!
//! Shared types, the workload executor seam, logging and configuration used
//! by the finbench orchestrator, scoring engine and native executor.

#![forbid(unsafe_code)]

pub mod config;
pub mod executor;
pub mod logging;
pub mod types;

pub use config::{
    BenchConfig, ConfigError, CountdownConfig, RunConfig, StoreConfig, load_config,
};
pub use executor::{EventSender, ExecutorError, WorkloadExecutor};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use types::{
    BenchmarkEvent, BenchmarkResult, Category, EventMode, EventState, MULTI_CORE_PREFIX,
    ParseCategoryError, Preset, SINGLE_CORE_PREFIX, SummaryError, TerminalSummary, TestCategory,
    TestDescriptor, WorkloadKind, catalog,
};

//! Shared types, error model, and configuration for the solution document synthesizer.
//!
//! This crate is the foundation depended on by all other `sdsynth` crates.
//! It provides:
//! - [`SynthError`]: the unified error type
//! - Domain types ([`CrKey`], [`DocumentCategory`], [`ExtractedText`], [`SourceTexts`], [`RunId`])
//! - Configuration ([`AppConfig`], [`GenerationConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GenerationConfig, LlmConfig, PathsConfig, StoreConfig, StoreVariant,
    ValidationConfig, ValidationPolicy, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_api_key,
};
pub use error::{Result, SynthError};
pub use types::{
    CrKey, DocumentCategory, ExtractedText, RunId, SourceTexts, head_chars, numeric_suffix,
};

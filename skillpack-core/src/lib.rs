//! Skillpack core library
//!
//! Installs versioned AI-assistant assets (skills, agents, commands, hooks,
//! MCP servers, rules and plugins) into the native configuration of several
//! coding-assistant clients, and tracks what was installed where.

pub mod asset;
pub mod bundle;
pub mod client;
pub mod config;
pub mod detect;
pub mod error;
pub mod frontmatter;
pub mod handlers;
pub mod install;
pub mod metadata;
pub mod prompt;
pub mod rules;
pub mod scope;
pub mod tracker;
pub mod usage;

pub use asset::{AssetRef, AssetType};
pub use bundle::Bundle;
pub use client::ClientId;
pub use config::Paths;
pub use error::{Result, SkillpackError};
pub use handlers::{Handler, HandlerTable, Verification};
pub use install::{AssetManager, AssetOutcome, BundleFetcher, Confirm, InstallRequest, InstallStatus, NonInteractive};
pub use metadata::Metadata;
pub use scope::{Scope, ScopeBase};
pub use tracker::{AssetKey, Ledger, Tracker, TrackerEntry};

//! Discovery, uninstall orchestration and command handlers for `pruner`.

#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod commands;
mod config;
mod console_user;
mod context;
pub mod discovery;
mod effects;
mod outcome;
pub mod process;
pub mod uninstall;

#[cfg(test)]
mod test_support;

pub use commands::{
    catalog_list, catalog_sync, definition_generate, CatalogListRequest, CatalogSyncRequest,
    DefinitionGenerateRequest,
};
pub use config::{
    CatalogConfig, Config, DiscoveryConfig, EnvSnapshot, GlobalOptions, ProcessConfig, UserConfig,
    DEFAULT_CATALOG_URL,
};
pub use console_user::{ConsoleUser, SystemConsoleUser, UserResolutionError};
pub use context::CommandContext;
pub use discovery::{
    discover, format_bytes, total_size, DiscoveryEngine, DiscoveryError, DiscoveryOptions,
    DiscoveryReport, VolatileLayout,
};
pub use effects::{ConsoleUserResolver, Effects, ProcessRunner, SharedEffects, SystemEffects};
pub use outcome::{
    format_status_message, to_json_response, CommandGroup, CommandInfo, CommandStatus,
    ExecutionOutcome,
};
pub use uninstall::{uninstall, UninstallRequest};

#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod definition;
pub mod index;
pub mod match_mode;

pub use definition::{
    definition_file_stem, generate_definition, render_definition, Definition,
    GenerateDefinitionRequest, UninstallSpec,
};
pub use index::{entry_file_name, escape_id, select_definition, IndexFile, IndexItem};
pub use match_mode::MatchMode;

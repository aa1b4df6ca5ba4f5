use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const PRUNER_BEFORE_HELP: &str = concat!(
    "pruner ",
    env!("CARGO_PKG_VERSION"),
    " – remove macOS applications by definition\n\n",
    "\x1b[1;36mCommands\x1b[0m\n",
    "  uninstall        Discover and remove an application's files.\n",
    "  list             Show the definitions available in the catalog.\n",
    "  sync             Refresh the local catalog cache.\n",
    "  generate         Write a new definition document.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "pruner",
    author,
    version,
    disable_help_subcommand = true,
    before_help = PRUNER_BEFORE_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct PrunerCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(short, long, help = "Enable debug logging", global = true)]
    pub debug: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(about = "Discover and remove the files of an application.")]
    Uninstall(UninstallArgs),
    #[command(about = "List all available definitions.")]
    List,
    #[command(about = "Sync the local catalog of definitions with the remote source.")]
    Sync(SyncArgs),
    #[command(about = "Generate a definition for an app.")]
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    #[arg(
        long,
        help = "Definition name to uninstall; required without --definition-path"
    )]
    pub definition_name: Option<String>,
    #[arg(long, help = "Use a definition file instead of the catalog")]
    pub definition_path: Option<PathBuf>,
    #[arg(long, help = "Definition version (defaults to the most recent)")]
    pub version: Option<String>,
    #[arg(
        long,
        help = "Matching strategy: exact, prefix, substring or all (default)"
    )]
    pub match_mode: Option<String>,
    #[arg(long, help = "Report what would happen without changing anything")]
    pub dry_run: bool,
    #[arg(long, help = "Also search the console user's Library")]
    pub remove_user_hive: bool,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[arg(long, help = "Skip revalidation while the local index is within PRUNER_INDEX_TTL")]
    pub respect_ttl: bool,
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[arg(long, help = "Name of the definition to create")]
    pub name: String,
    #[arg(long, help = "Application name the definition targets")]
    pub app_name: String,
    #[arg(long, help = "Definition version (default: 1)")]
    pub version: Option<String>,
    #[arg(long, value_delimiter = ',', help = "Alternative names, comma separated")]
    pub alternative_names: Option<Vec<String>>,
    #[arg(long, help = "Bundle identifier of the application")]
    pub bundle_id: String,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Search paths replacing the defaults, comma separated"
    )]
    pub search_file_paths: Option<Vec<String>>,
    #[arg(long, value_delimiter = ',', help = "Extra search paths, comma separated")]
    pub additional_paths: Option<Vec<String>>,
    #[arg(long, help = "Forget package receipts during uninstall")]
    pub forget_pkg: bool,
    #[arg(long, help = "Unload launch agents and daemons during uninstall")]
    pub unload_launch_daemons: bool,
    #[arg(long, help = "Preferred matching strategy stored in the definition")]
    pub match_mode: Option<String>,
    #[arg(long, help = "Homebrew cask or formula name to tidy up")]
    pub brew_name: Option<String>,
    #[arg(long, help = "Directory to write the definition to (default: current directory)")]
    pub output_path: Option<PathBuf>,
}

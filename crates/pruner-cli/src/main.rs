use std::env;
use std::path::PathBuf;

use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use pruner_core::{
    CatalogListRequest, CatalogSyncRequest, CommandContext, CommandGroup, CommandInfo,
    CommandStatus, DefinitionGenerateRequest, ExecutionOutcome, GlobalOptions, UninstallRequest,
};
use pruner_domain::GenerateDefinitionRequest;
use serde_json::Value;

mod cli;
mod style;

use cli::{CommandGroupCli, GenerateArgs, PrunerCli};
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PrunerCli::parse();
    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        debug: cli.debug,
        json: cli.json,
    };
    init_tracing(&global);

    let ctx = CommandContext::new(&global).map_err(|err| eyre!("{err:?}"))?;
    let (info, outcome) = dispatch(&ctx, &cli.command).map_err(|err| eyre!("{err:?}"))?;
    let code = emit_output(&cli, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(global: &GlobalOptions) {
    let level = global.log_level();
    let filter = format!(
        "pruner={level},pruner_cli={level},pruner_core={level},pruner_store={level},pruner_domain={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn dispatch(
    ctx: &CommandContext,
    command: &CommandGroupCli,
) -> anyhow::Result<(CommandInfo, ExecutionOutcome)> {
    match command {
        CommandGroupCli::Uninstall(args) => {
            let request = UninstallRequest {
                definition_name: args.definition_name.clone(),
                definition_path: args.definition_path.clone(),
                version: args.version.clone(),
                match_mode: args.match_mode.clone(),
                dry_run: args.dry_run,
                remove_user_hive: args.remove_user_hive,
            };
            let info = CommandInfo::new(CommandGroup::Uninstall, "uninstall");
            Ok((info, pruner_core::uninstall(ctx, &request)?))
        }
        CommandGroupCli::List => {
            let info = CommandInfo::new(CommandGroup::Catalog, "list");
            Ok((info, pruner_core::catalog_list(ctx, &CatalogListRequest)?))
        }
        CommandGroupCli::Sync(args) => {
            let request = CatalogSyncRequest {
                force: !args.respect_ttl,
            };
            let info = CommandInfo::new(CommandGroup::Catalog, "sync");
            Ok((info, pruner_core::catalog_sync(ctx, &request)?))
        }
        CommandGroupCli::Generate(args) => {
            let request = generate_request(args);
            let info = CommandInfo::new(CommandGroup::Definition, "generate");
            Ok((info, pruner_core::definition_generate(ctx, &request)?))
        }
    }
}

fn generate_request(args: &GenerateArgs) -> DefinitionGenerateRequest {
    let out_dir = match &args.output_path {
        Some(path) => path.clone(),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    DefinitionGenerateRequest {
        definition: GenerateDefinitionRequest {
            name: args.name.clone(),
            app_name: args.app_name.clone(),
            version: args.version.clone(),
            alternative_names: args.alternative_names.clone(),
            bundle_id: args.bundle_id.clone(),
            search_file_paths: args.search_file_paths.clone(),
            additional_paths: args.additional_paths.clone(),
            forget_pkg: args.forget_pkg,
            unload_launch_daemons: args.unload_launch_daemons,
            match_mode: args.match_mode.clone(),
            brew_name: args.brew_name.clone(),
        },
        out_dir,
    }
}

fn emit_output(cli: &PrunerCli, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    };

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = pruner_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        let message = pruner_core::format_status_message(info, &outcome.message);
        println!("{}", style.status(&outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Hint: {hint}")));
        }
        if let Some(table) = render_definition_table(&style, info, &outcome.details) {
            println!("{table}");
        }
        for line in path_lines(&outcome.details) {
            println!("  {line}");
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

/// Paths touched (or planned) by an uninstall, one per line.
fn path_lines(details: &Value) -> Vec<String> {
    ["would_remove", "removed"]
        .iter()
        .filter_map(|key| details.get(*key)?.as_array())
        .flatten()
        .filter_map(Value::as_str)
        .map(ToOwned::to_owned)
        .collect()
}

struct DefinitionRow {
    id: String,
    name: String,
    version: String,
    updated_at: String,
}

fn render_definition_table(style: &Style, info: CommandInfo, details: &Value) -> Option<String> {
    if !matches!(info.group, CommandGroup::Catalog) || info.name != "list" {
        return None;
    }
    let definitions = details.get("definitions")?.as_array()?;
    if definitions.is_empty() {
        return None;
    }
    let mut rows = Vec::new();
    for def in definitions {
        let obj = def.as_object()?;
        rows.push(DefinitionRow {
            id: obj.get("id")?.as_str()?.to_string(),
            name: obj.get("name")?.as_str()?.to_string(),
            version: obj.get("version")?.as_str()?.to_string(),
            updated_at: obj.get("updated_at")?.as_str()?.to_string(),
        });
    }
    Some(format_definition_table(style, &rows))
}

fn format_definition_table(style: &Style, rows: &[DefinitionRow]) -> String {
    let headers = ["Name", "Version", "Updated", "Id"];
    let mut widths = headers.map(str::len);
    for row in rows {
        widths[0] = widths[0].max(row.name.len());
        widths[1] = widths[1].max(row.version.len());
        widths[2] = widths[2].max(row.updated_at.len());
        widths[3] = widths[3].max(row.id.len());
    }
    let line = |cells: [&str; 4]| -> String {
        format!(
            "{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        )
        .trim_end()
        .to_string()
    };

    let mut lines = vec![
        style.table_header(&line(headers)),
        format!(
            "{:-<w0$}  {:-<w1$}  {:-<w2$}  {:-<w3$}",
            "",
            "",
            "",
            "",
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        ),
    ];
    for row in rows {
        lines.push(line([
            row.name.as_str(),
            row.version.as_str(),
            row.updated_at.as_str(),
            row.id.as_str(),
        ]));
    }
    lines.join("\n")
}

use std::path::PathBuf;

use anyhow::Result;
use pruner_domain::{generate_definition, GenerateDefinitionRequest};
use pruner_store::CatalogErrorKind;
use serde_json::json;
use tracing::warn;

use crate::context::CommandContext;
use crate::outcome::ExecutionOutcome;

#[derive(Clone, Debug, Default)]
pub struct CatalogSyncRequest {
    pub force: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CatalogListRequest;

#[derive(Clone, Debug, Default)]
pub struct DefinitionGenerateRequest {
    pub definition: GenerateDefinitionRequest,
    pub out_dir: PathBuf,
}

/// Refreshes the index, warms the definition cache and prunes stale entries.
///
/// # Errors
/// Returns an error if the catalog store cannot be opened.
pub fn catalog_sync(ctx: &CommandContext, request: &CatalogSyncRequest) -> Result<ExecutionOutcome> {
    let store = ctx.store()?;
    let cache_path = store.layout().root().display().to_string();
    match store.sync_catalog(request.force) {
        Ok(summary) => {
            let message = format!(
                "synced {} definitions ({} fetched, {} cached, {} failed)",
                summary.items, summary.fetched, summary.hit, summary.failed
            );
            Ok(ExecutionOutcome::success(
                message,
                json!({
                    "cache_path": cache_path,
                    "catalog_url": ctx.config().catalog().base_url,
                    "summary": summary,
                }),
            ))
        }
        Err(err) => {
            let details = json!({
                "cache_path": cache_path,
                "error": err.to_string(),
            });
            Ok(match err.kind() {
                CatalogErrorKind::LockContention => ExecutionOutcome::user_error(
                    "another catalog sync is in progress",
                    details,
                ),
                _ => ExecutionOutcome::failure("catalog sync failed", details),
            })
        }
    }
}

/// Lists every definition in the local index after a best-effort refresh.
///
/// # Errors
/// Returns an error if the catalog store cannot be opened.
pub fn catalog_list(ctx: &CommandContext, _request: &CatalogListRequest) -> Result<ExecutionOutcome> {
    let store = ctx.store()?;
    if let Err(err) = store.sync_catalog(false) {
        warn!(%err, "catalog sync failed; listing the local index");
    }
    let index = match store.load_index() {
        Ok(index) => index,
        Err(err) => {
            return Ok(ExecutionOutcome::failure(
                "catalog index is unavailable",
                json!({
                    "cache_path": store.layout().root().display().to_string(),
                    "error": err.to_string(),
                    "hint": "check network access to the catalog and run `pruner sync`",
                }),
            ))
        }
    };
    let mut items = index.items;
    items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
    let rows: Vec<_> = items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "name": item.name,
                "version": item.version,
                "updated_at": item.updated_at,
            })
        })
        .collect();
    Ok(ExecutionOutcome::success(
        format!("{} definitions", rows.len()),
        json!({
            "generated_at": index.generated_at,
            "definitions": rows,
        }),
    ))
}

/// Writes a new definition document.
///
/// # Errors
/// Returns an error if the output directory or file cannot be written.
pub fn definition_generate(
    _ctx: &CommandContext,
    request: &DefinitionGenerateRequest,
) -> Result<ExecutionOutcome> {
    let definition = &request.definition;
    if definition.name.trim().is_empty() || definition.bundle_id.trim().is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "definition name and bundle id must not be empty",
            json!({ "name": definition.name, "bundle_id": definition.bundle_id }),
        ));
    }
    let path = generate_definition(definition, &request.out_dir)?;
    Ok(ExecutionOutcome::success(
        format!("wrote {}", path.display()),
        json!({ "path": path }),
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use anyhow::Result;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::Value;

    use super::*;
    use crate::config::{Config, EnvSnapshot, GlobalOptions};
    use crate::outcome::CommandStatus;
    use crate::test_support::{FakeEffects, FixedUser, RecordingRunner};

    fn config(cache: &std::path::Path, url: &str) -> Result<Config> {
        let cache = cache.display().to_string();
        Config::from_snapshot(&EnvSnapshot::testing(&[
            ("PRUNER_CACHE_PATH", cache.as_str()),
            ("PRUNER_CATALOG_URL", url),
            ("PRUNER_HTTP_TIMEOUT", "5"),
        ]))
    }

    fn with_ctx<T>(config: Config, f: impl FnOnce(&CommandContext) -> T) -> T {
        let global = GlobalOptions::default();
        let effects = Arc::new(FakeEffects {
            user: FixedUser(None),
            process: Arc::new(RecordingRunner::silent()),
        });
        let ctx = CommandContext::with_parts(&global, config, effects);
        f(&ctx)
    }

    const INDEX: &str = r#"{"schema_version":1,"generated_at":"2025-02-01T00:00:00Z","items":[]}"#;

    #[test]
    fn sync_reports_summary() -> Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/index.json"))
                .respond_with(status_code(200).body(INDEX)),
        );
        let temp = tempfile::tempdir()?;
        let config = config(&temp.path().join("cache"), &server.url_str("/"))?;
        let outcome = with_ctx(config, |ctx| {
            catalog_sync(ctx, &CatalogSyncRequest { force: true })
        })?;
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["summary"]["refresh"], "updated");
        assert_eq!(outcome.details["summary"]["items"], 0);
        Ok(())
    }

    #[test]
    fn list_without_any_index_fails() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = config(&temp.path().join("cache"), "http://127.0.0.1:9/")?;
        let outcome = with_ctx(config, |ctx| catalog_list(ctx, &CatalogListRequest))?;
        assert_eq!(outcome.status, CommandStatus::Failure);
        Ok(())
    }

    #[test]
    fn list_sorts_definitions_by_name() -> Result<()> {
        let server = Server::run();
        let index = r#"{"schema_version":1,"generated_at":"2025-02-01T00:00:00Z","items":[
            {"id":"org.zed","name":"zed","version":"1","updated_at":"2025-01-01T00:00:00Z","path":"defs/zed.json","sha256":"00"},
            {"id":"com.foo.app","name":"foo","version":"2","updated_at":"2025-01-02T00:00:00Z","path":"defs/foo.json","sha256":"00"}
        ]}"#;
        server.expect(
            Expectation::matching(request::method_path("GET", "/index.json"))
                .respond_with(status_code(200).body(index)),
        );
        server.expect(
            Expectation::matching(request::path(matches("^/defs/")))
                .times(2)
                .respond_with(status_code(404)),
        );
        let temp = tempfile::tempdir()?;
        let config = config(&temp.path().join("cache"), &server.url_str("/"))?;
        let outcome = with_ctx(config, |ctx| catalog_list(ctx, &CatalogListRequest))?;
        assert_eq!(outcome.status, CommandStatus::Ok);
        let names: Vec<&str> = outcome.details["definitions"]
            .as_array()
            .map(|rows| rows.iter().filter_map(|row| row["name"].as_str()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["foo", "zed"]);
        Ok(())
    }

    #[test]
    fn generate_writes_definition() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = config(&temp.path().join("cache"), "http://127.0.0.1:9/")?;
        let request = DefinitionGenerateRequest {
            definition: GenerateDefinitionRequest {
                name: "My App".to_string(),
                app_name: "My App".to_string(),
                bundle_id: "com.foo.myapp".to_string(),
                ..GenerateDefinitionRequest::default()
            },
            out_dir: temp.path().join("out"),
        };
        let outcome = with_ctx(config, |ctx| definition_generate(ctx, &request))?;
        assert_eq!(outcome.status, CommandStatus::Ok);
        let written: Value = serde_json::from_slice(&fs::read(temp.path().join("out/myapp.json"))?)?;
        assert_eq!(written["name"], "myapp");
        assert_eq!(written["uninstall"]["bundleId"], "com.foo.myapp");
        Ok(())
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::MatchMode;

/// One application's identifying names and removal policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub version: String,
    pub updated_at: String,
    pub uninstall: UninstallSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallSpec {
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_names: Option<Vec<String>>,
    pub bundle_id: String,
    /// Replaces the built-in search roots when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_file_paths: Option<Vec<String>>,
    /// Appended to the search roots and also used as match targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_paths: Option<Vec<String>>,
    #[serde(default)]
    pub forget_pkg: bool,
    #[serde(default)]
    pub unload_launch_daemons: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brew_name: Option<String>,
}

impl UninstallSpec {
    pub fn alternative_names(&self) -> &[String] {
        self.alternative_names.as_deref().unwrap_or_default()
    }

    pub fn additional_paths(&self) -> &[String] {
        self.additional_paths.as_deref().unwrap_or_default()
    }

    /// Match mode requested by the definition, if any.
    pub fn preferred_match_mode(&self) -> Option<MatchMode> {
        self.match_mode.as_deref().map(MatchMode::parse_lossy)
    }
}

impl Definition {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("definition is not valid JSON")
    }
}

/// Inputs for authoring a new definition document.
#[derive(Debug, Clone, Default)]
pub struct GenerateDefinitionRequest {
    pub name: String,
    pub app_name: String,
    pub version: Option<String>,
    pub alternative_names: Option<Vec<String>>,
    pub bundle_id: String,
    pub search_file_paths: Option<Vec<String>>,
    pub additional_paths: Option<Vec<String>>,
    pub forget_pkg: bool,
    pub unload_launch_daemons: bool,
    pub match_mode: Option<String>,
    pub brew_name: Option<String>,
}

/// Lowercased, space-free form of a definition name used for file names.
pub fn definition_file_stem(name: &str) -> String {
    name.to_lowercase().replace(' ', "")
}

/// Serializes a definition with sorted keys, the layout published catalogs use.
pub fn render_definition(definition: &Definition) -> Result<String> {
    // serde_json::Map is ordered by key without the preserve_order feature.
    let value = serde_json::to_value(definition)?;
    let mut rendered = serde_json::to_string_pretty(&value)?;
    rendered.push('\n');
    Ok(rendered)
}

/// Writes `<out_dir>/<stem>.json` and returns its path.
pub fn generate_definition(request: &GenerateDefinitionRequest, out_dir: &Path) -> Result<PathBuf> {
    let stem = definition_file_stem(&request.name);
    let updated_at = OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .context("invalid timestamp")?
        .format(&Rfc3339)
        .context("failed to format timestamp")?;
    let definition = Definition {
        name: stem.clone(),
        version: request.version.clone().unwrap_or_else(|| "1".to_string()),
        updated_at,
        uninstall: UninstallSpec {
            app_name: request.app_name.clone(),
            alternative_names: request.alternative_names.clone(),
            bundle_id: request.bundle_id.clone(),
            search_file_paths: request.search_file_paths.clone(),
            additional_paths: request.additional_paths.clone(),
            forget_pkg: request.forget_pkg,
            unload_launch_daemons: request.unload_launch_daemons,
            match_mode: request.match_mode.clone(),
            brew_name: request.brew_name.clone(),
        },
    };
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(format!("{stem}.json"));
    fs::write(&path, render_definition(&definition)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "myapp",
        "version": "2",
        "updated_at": "2025-02-01T00:00:00Z",
        "uninstall": {
            "appName": "MyApp",
            "bundleId": "com.foo.myapp",
            "alternativeNames": ["MyApp Helper"],
            "forgetPkg": true,
            "unloadLaunchDaemons": false,
            "matchMode": "prefix"
        }
    }"#;

    #[test]
    fn decodes_camel_case_uninstall_block() -> Result<()> {
        let def = Definition::from_slice(SAMPLE.as_bytes())?;
        assert_eq!(def.uninstall.app_name, "MyApp");
        assert_eq!(def.uninstall.alternative_names(), ["MyApp Helper".to_string()]);
        assert!(def.uninstall.additional_paths().is_empty());
        assert!(def.uninstall.search_file_paths.is_none());
        assert_eq!(def.uninstall.preferred_match_mode(), Some(MatchMode::Prefix));
        Ok(())
    }

    #[test]
    fn generated_definition_is_sorted_and_round_trips() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let request = GenerateDefinitionRequest {
            name: "My App".to_string(),
            app_name: "My App".to_string(),
            bundle_id: "com.foo.myapp".to_string(),
            forget_pkg: true,
            ..GenerateDefinitionRequest::default()
        };
        let path = generate_definition(&request, temp.path())?;
        assert_eq!(path, temp.path().join("myapp.json"));

        let raw = fs::read_to_string(&path)?;
        assert!(raw.find("\"appName\"") < raw.find("\"bundleId\""));
        assert!(!raw.contains("alternativeNames"));

        let def = Definition::from_slice(raw.as_bytes())?;
        assert_eq!(def.name, "myapp");
        assert_eq!(def.version, "1");
        assert!(def.updated_at.ends_with('Z'));
        assert!(def.uninstall.forget_pkg);
        Ok(())
    }
}

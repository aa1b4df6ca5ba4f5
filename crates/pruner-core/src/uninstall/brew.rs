use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::steps::{args, Action, Step, StepRunner};

pub const BREW_CANDIDATES: &[&str] = &["/opt/homebrew/bin/brew", "/usr/local/bin/brew"];
const SUDO: &str = "/usr/bin/sudo";
const STAT: &str = "/usr/bin/stat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrewEnv {
    pub brew: String,
    pub prefix: PathBuf,
    /// Account owning the prefix; brew refuses to run as root.
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrewKind {
    Cask,
    Formula,
}

/// Lowercased with everything but letters and digits removed.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

pub struct BrewTidy<'a> {
    runner: &'a StepRunner<'a>,
    candidates: &'a [&'a str],
}

impl<'a> BrewTidy<'a> {
    pub fn new(runner: &'a StepRunner<'a>) -> Self {
        Self::with_candidates(runner, BREW_CANDIDATES)
    }

    pub fn with_candidates(runner: &'a StepRunner<'a>, candidates: &'a [&'a str]) -> Self {
        Self { runner, candidates }
    }

    pub fn detect(&self) -> Option<BrewEnv> {
        let brew = self
            .candidates
            .iter()
            .find(|candidate| Path::new(candidate).is_file())?;
        let out = self.runner.query(brew, &args(["--prefix"])).ok()?;
        let prefix = String::from_utf8_lossy(&out).trim().to_string();
        if prefix.is_empty() {
            return None;
        }
        let owner = self
            .runner
            .query(STAT, &args(["-f", "%Su", prefix.as_str()]))
            .ok()
            .map(|out| String::from_utf8_lossy(&out).trim().to_string())
            .filter(|owner| !owner.is_empty());
        Some(BrewEnv {
            brew: (*brew).to_string(),
            prefix: PathBuf::from(prefix),
            owner,
        })
    }

    /// `brew <args>` as the prefix owner.
    fn command(env: &BrewEnv, brew_args: &[&str]) -> (String, Vec<String>) {
        let rest = brew_args.iter().map(|arg| (*arg).to_string());
        match &env.owner {
            Some(owner) => (
                SUDO.to_string(),
                ["-n", "-u", owner.as_str(), "-H", env.brew.as_str()]
                    .into_iter()
                    .map(ToOwned::to_owned)
                    .chain(rest)
                    .collect(),
            ),
            None => (env.brew.clone(), rest.collect()),
        }
    }

    fn list(&self, env: &BrewEnv, brew_args: &[&str]) -> Vec<String> {
        let (program, argv) = Self::command(env, brew_args);
        self.runner
            .query(&program, &argv)
            .map(|out| {
                String::from_utf8_lossy(&out)
                    .lines()
                    .filter_map(|line| line.split_whitespace().next())
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Installed cask or formula whose token matches `name`, falling back to a
    /// Caskroom directory guess.
    pub fn resolve(&self, env: &BrewEnv, name: &str) -> Option<(String, BrewKind)> {
        let target = normalize(name);
        let hit = |token: &String| normalize(token) == target || token.eq_ignore_ascii_case(name);
        let casks = self.list(env, &["list", "--cask", "--versions"]);
        if let Some(token) = casks.into_iter().find(|token| hit(token)) {
            return Some((token, BrewKind::Cask));
        }
        let formulae = self.list(env, &["list", "--formula"]);
        if let Some(token) = formulae.into_iter().find(|token| hit(token)) {
            return Some((token, BrewKind::Formula));
        }
        caskroom_guess(&env.prefix, name).map(|token| (token, BrewKind::Cask))
    }

    pub fn tidy(&self, brew_name: &str) -> Vec<Action> {
        let Some(env) = self.detect() else {
            debug!("brew not found, skipping");
            return Vec::new();
        };
        let Some((token, kind)) = self.resolve(&env, brew_name) else {
            debug!(brew_name, "no installed brew package matches, skipping");
            return Vec::new();
        };
        info!(%token, ?kind, "brew tidy");
        let plan: Vec<Vec<&str>> = match kind {
            BrewKind::Cask => vec![
                vec!["uninstall", "--cask", "--force", token.as_str()],
                vec!["cleanup", "--prune-prefix", token.as_str()],
            ],
            BrewKind::Formula => vec![
                vec!["uninstall", token.as_str()],
                vec!["autoremove"],
                vec!["cleanup", "--prune-prefix", token.as_str()],
            ],
        };
        plan.iter()
            .map(|brew_args| {
                let (program, argv) = Self::command(&env, brew_args);
                self.runner.attempt(Step::Brew, &program, &argv)
            })
            .collect()
    }
}

fn caskroom_guess(prefix: &Path, name: &str) -> Option<String> {
    let wanted = name.to_lowercase().replace([' ', '_'], "");
    if wanted.is_empty() {
        return None;
    }
    let mut tokens: Vec<String> = fs::read_dir(prefix.join("Caskroom"))
        .ok()?
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    tokens.sort();
    tokens.into_iter().find(|token| {
        let folded = token.to_lowercase().replace('-', "");
        folded == wanted || folded.contains(&wanted)
    })
}

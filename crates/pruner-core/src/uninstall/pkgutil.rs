use pruner_domain::UninstallSpec;
use tracing::info;

use super::steps::{args, render, Action, Step, StepRunner};

pub const PKGUTIL: &str = "/usr/sbin/pkgutil";

/// Forgets every installer receipt whose id mentions the app name or an
/// alternative name.
pub fn forget_receipts(runner: &StepRunner<'_>, spec: &UninstallSpec) -> Vec<Action> {
    let listing_args = args(["--pkgs"]);
    let listing = match runner.query(PKGUTIL, &listing_args) {
        Ok(out) => String::from_utf8_lossy(&out).into_owned(),
        Err(err) => {
            return vec![Action::failed(
                Step::ForgetPkg,
                render(PKGUTIL, &listing_args),
                &err,
            )]
        }
    };
    let receipts = matching_receipts(&listing, spec);
    if receipts.is_empty() {
        info!(app = %spec.app_name, "package receipt not found (skipped)");
        return Vec::new();
    }
    receipts
        .into_iter()
        .map(|receipt| runner.attempt(Step::ForgetPkg, PKGUTIL, &args(["--forget", receipt])))
        .collect()
}

fn matching_receipts<'l>(listing: &'l str, spec: &UninstallSpec) -> Vec<&'l str> {
    let needles: Vec<&str> = std::iter::once(spec.app_name.as_str())
        .chain(spec.alternative_names().iter().map(String::as_str))
        .filter(|needle| !needle.is_empty())
        .collect();
    listing
        .lines()
        .map(str::trim)
        .filter(|receipt| !receipt.is_empty())
        .filter(|receipt| needles.iter().any(|needle| receipt.contains(needle)))
        .collect()
}

//! verscan - identify the web application package and version serving a site.
//!
//! Thin wrapper over `verscan-core`: parse CLI arguments into a `Config`,
//! build an `Engine` against a SQLite-backed index, run `analyze()` once,
//! and print the result as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use verscan_core::{AnalysisResult, Cache, Engine, RuleBasedHints, SqliteStore};
use verscan_schema::Config;

#[derive(Debug, Parser)]
#[command(name = "verscan")]
#[command(author, version, about = "Identify the web application package and version serving a site")]
pub struct Cli {
    /// The site to analyze, e.g. `https://example.com`.
    pub primary_url: String,

    /// Path to the index-store SQLite database.
    #[arg(long, env = "VERSCAN_INDEX_DB", default_value = "verscan.db")]
    pub index_db: PathBuf,

    /// Print only the JSON result, suppressing log lines.
    #[arg(long)]
    pub json_only: bool,

    /// Write the JSON result here instead of stdout.
    #[arg(long)]
    pub json_file: Option<PathBuf>,

    /// Write per-iteration debug info (decisiveness gain, useless reasons) here.
    #[arg(long)]
    pub debug_json_file: Option<PathBuf>,

    /// Resource cache file, so a repeated run against the same site skips
    /// re-fetching unchanged assets.
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Persist every fetched resource's raw body under this directory.
    #[arg(long)]
    pub persist_resources: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// One `--flag` per `Config` field; unset flags leave the field at its
/// `Config::default()` value.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub guess_limit: Option<usize>,
    #[arg(long)]
    pub max_iterations: Option<usize>,
    #[arg(long)]
    pub min_assets_per_iteration: Option<usize>,
    #[arg(long)]
    pub max_assets_per_iteration: Option<usize>,
    #[arg(long)]
    pub min_support: Option<f64>,
    #[arg(long)]
    pub min_absolute_support: Option<f64>,
    #[arg(long)]
    pub max_iterations_without_improvement: Option<usize>,
    #[arg(long)]
    pub iteration_min_improvement: Option<f64>,
    #[arg(long)]
    pub guess_ignore_distance: Option<f64>,
    #[arg(long)]
    pub guess_relative_ignore_distance: Option<f64>,
    #[arg(long)]
    pub guess_ignore_min_positive: Option<f64>,
    #[arg(long)]
    pub positive_match_weight: Option<f64>,
    #[arg(long)]
    pub negative_match_weight: Option<f64>,
    #[arg(long)]
    pub failed_asset_weight: Option<f64>,
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,
}

impl ConfigArgs {
    /// Overlay the flags the user actually passed onto `config`, leaving
    /// everything else at its default.
    pub fn apply(&self, config: &mut Config) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field { config.$field = value; })*
            };
        }
        overlay!(
            guess_limit,
            max_iterations,
            min_assets_per_iteration,
            max_assets_per_iteration,
            min_support,
            min_absolute_support,
            max_iterations_without_improvement,
            iteration_min_improvement,
            guess_ignore_distance,
            guess_relative_ignore_distance,
            guess_ignore_min_positive,
            positive_match_weight,
            negative_match_weight,
            failed_asset_weight,
            request_timeout_ms,
        );
    }
}

/// Run one `analyze()` pass and print/write its JSON result.
///
/// # Errors
///
/// Returns an error if the index database can't be opened, the engine can't
/// be built, or a file write fails. A confident-guess-free analysis is not
/// an error -- it prints `{}` and returns success.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = Config::default();
    cli.config.apply(&mut config);
    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {err}");
        return Ok(ExitCode::FAILURE);
    }

    let store = Arc::new(SqliteStore::open(&cli.index_db).context("opening index database")?);
    let mut engine =
        Engine::new(store, RuleBasedHints::default(), config.clone()).context("building engine")?;

    let cache_path = cli.cache_file.clone().or_else(default_cache_path);
    if let Some(cache_path) = &cache_path {
        engine = engine.with_cache(Cache::load(cache_path));
    }
    if let Some(persist_dir) = &cli.persist_resources {
        engine = engine.with_persist_dir(persist_dir.clone());
    }

    if !cli.json_only {
        tracing::info!(url = %cli.primary_url, "analyzing");
    }

    let outcome = engine
        .analyze(&cli.primary_url)
        .await
        .context("analyzing site")?;

    let json = outcome
        .as_ref()
        .map_or_else(|| serde_json::json!({}), result_to_json);
    write_json(&json, cli.json_file.as_deref())?;

    if let (Some(debug_path), Some(result)) = (&cli.debug_json_file, &outcome) {
        let debug_json = debug_to_json(result);
        std::fs::write(debug_path, serde_json::to_string_pretty(&debug_json)?)
            .with_context(|| format!("writing debug json to {}", debug_path.display()))?;
    }

    if let Some(cache_path) = &cache_path {
        engine
            .into_cache()
            .save(cache_path)
            .context("saving resource cache")?;
    }

    Ok(ExitCode::SUCCESS)
}

/// The cache file location used when `--cache-file` isn't given:
/// `$XDG_CACHE_HOME/verscan/cache.postcard` (or the platform equivalent).
/// `None` if the OS exposes no cache directory at all, in which case the run
/// simply goes uncached rather than failing.
fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("verscan").join("cache.postcard"))
}

/// Build the CLI's JSON output: the scan-result blob shape from §6
/// (`{ result: [guess...], more_recent: version | null }`), plus the
/// aggregate `support`/`statistics` the CLI also reports.
fn result_to_json(result: &AnalysisResult) -> serde_json::Value {
    serde_json::json!({
        "result": result.guesses,
        "more_recent": result.more_recent,
        "support": result.support,
        "statistics": {
            "resources_retrieved": result.statistics.resources_retrieved,
            "resources_successful": result.statistics.resources_successful,
        },
    })
}

fn debug_to_json(result: &AnalysisResult) -> serde_json::Value {
    serde_json::json!(
        result
            .debug_info
            .iter()
            .map(|d| serde_json::json!({
                "iteration": d.iteration,
                "decisiveness_gain": d.decisiveness_gain,
                "useful": d.useful,
                "guess_count": d.guess_count,
                "reason": d.reason,
            }))
            .collect::<Vec<_>>()
    )
}

fn write_json(value: &serde_json::Value, path: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("writing json to {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_leave_defaults_untouched() {
        let cli = Cli::parse_from(["verscan", "https://example.com"]);
        let mut config = Config::default();
        cli.config.apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let cli = Cli::parse_from([
            "verscan",
            "https://example.com",
            "--guess-limit",
            "3",
            "--min-support",
            "0.5",
        ]);
        let mut config = Config::default();
        cli.config.apply(&mut config);
        assert_eq!(config.guess_limit, 3);
        assert!((config.min_support - 0.5).abs() < 1e-9);
        assert_eq!(config.max_iterations, Config::default().max_iterations);
    }

    #[test]
    fn default_cache_path_is_namespaced_under_verscan() {
        if let Some(path) = default_cache_path() {
            assert!(path.ends_with("verscan/cache.postcard"));
        }
    }
}

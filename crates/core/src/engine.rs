//! The inference engine (§4.4): fetch a site's landing page, seed guesses
//! from initial hints and already-known assets, then iteratively probe
//! high-entropy webroot paths until the evidence is decisive or exhausted.
//!
//! Grounded on `original_source/analysis/website_analyzer.py`'s
//! `WebsiteAnalyzer.analyze` / `_iterate` / `_get_best_guesses` /
//! `_map_retrieved_assets_to_versions` / `_calculate_support`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::Semaphore;
use verscan_schema::{Checksum, Config, ConfigError, SoftwareVersion};

use crate::cache::{self, Cache};
use crate::checksum::compute_checksum;
use crate::fetch::{FetchError, Fetcher};
use crate::guess::{self, Guess, Match};
use crate::hints::{InitialHints, LandingPage};
use crate::html;
use crate::normalize;
use crate::resource::{Fetched, Resource};
use crate::store::{IndexedVersion, Store, StoreError};

/// Bound on how many asset fetches run concurrently within one iteration,
/// matching the `Semaphore`-gated `tokio::spawn` idiom used for chunked
/// downloads elsewhere in this codebase.
const ASSET_FETCH_CONCURRENCY: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid primary url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("tied top guesses span multiple packages: {0} and {1}")]
    AmbiguousPackage(String, String),
}

/// Aggregate counts over every resource `analyze()` fetched, for CLI
/// `--debug-json-file` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub resources_retrieved: usize,
    pub resources_successful: usize,
}

/// One iteration's bookkeeping: the decisiveness gain it produced and, when
/// it didn't count as useful, why.
#[derive(Debug, Clone)]
pub struct IterationDebug {
    pub iteration: usize,
    pub decisiveness_gain: f64,
    pub useful: bool,
    pub guess_count: usize,
    pub reason: Option<String>,
}

/// The outcome of a confident `analyze()` run.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Every guess tied for the top strength (usually one, occasionally
    /// more when the evidence can't distinguish between versions).
    pub guesses: Vec<Guess>,
    pub support: f64,
    pub statistics: Statistics,
    /// A version of the guessed package released after it, if the index
    /// knows of one -- surfaced as a freshness hint, not a second guess.
    pub more_recent: Option<SoftwareVersion>,
    pub debug_info: Vec<IterationDebug>,
}

/// One fetched-and-classified asset: what webroot path it was probed at,
/// whether the fetch succeeded, and which indexed versions it counts as
/// evidence for or against.
#[derive(Debug, Clone)]
struct RetrievedAsset {
    webroot_path: String,
    status_code: Option<u16>,
    checksum: Option<Checksum>,
    expected_versions: HashSet<i64>,
    using_versions: HashSet<i64>,
    weight: f64,
}

struct ClassifiedAsset {
    asset: RetrievedAsset,
    discovered: Vec<IndexedVersion>,
}

/// Fingerprints the software version serving a website by fetching its
/// landing page and a handful of its static assets and comparing their
/// checksums against an indexed catalog (`S`), seeded by whatever hints `H`
/// can read straight off the landing page response.
pub struct Engine<S: Store, H: InitialHints> {
    store: Arc<S>,
    hints: H,
    fetcher: Fetcher,
    config: Config,
    cache: Mutex<Cache>,
    persist_dir: Option<PathBuf>,
}

impl<S: Store, H: InitialHints> Engine<S, H> {
    /// Build an engine against `store`, using `hints` to seed guesses from
    /// the landing page response.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation or the underlying HTTP
    /// client can't be built.
    pub fn new(store: Arc<S>, hints: H, config: Config) -> Result<Self, EngineError> {
        config.validate()?;
        let fetcher = Fetcher::new(Duration::from_millis(config.request_timeout_ms))?;
        Ok(Self {
            store,
            hints,
            fetcher,
            config,
            cache: Mutex::new(Cache::default()),
            persist_dir: None,
        })
    }

    /// Seed the resource cache, so a repeated `analyze()` against the same
    /// site doesn't re-fetch unchanged assets.
    #[must_use]
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Mutex::new(cache);
        self
    }

    /// Persist every successfully fetched resource's raw body under `dir`,
    /// keyed by a sanitized form of its URL, for offline replay.
    #[must_use]
    pub fn with_persist_dir(mut self, dir: PathBuf) -> Self {
        self.persist_dir = Some(dir);
        self
    }

    /// Hand back the accumulated resource cache for the caller to persist.
    #[must_use]
    pub fn into_cache(self) -> Cache {
        self.cache
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Analyze `primary_url`, returning `None` if the landing page couldn't
    /// be fetched or the evidence gathered doesn't clear the confidence bar
    /// (§4.4 "Support").
    ///
    /// # Errors
    ///
    /// Returns an error if the final landing-page URL isn't parseable, or if
    /// a required index-store query fails outright (as opposed to merely
    /// returning no rows).
    pub async fn analyze(&self, primary_url: &str) -> Result<Option<AnalysisResult>, EngineError> {
        let primary = self.fetch_resource(primary_url).await;
        if !primary.is_success() {
            tracing::debug!(url = primary_url, "landing page fetch failed");
            return Ok(None);
        }

        let final_url_str = primary.final_url().unwrap_or(primary_url).to_string();
        let base_url =
            Url::parse(&final_url_str).map_err(|err| EngineError::InvalidUrl(err.to_string()))?;
        let body = primary.body().unwrap_or(&[]).to_vec();
        let body_text = String::from_utf8_lossy(&body).into_owned();
        let header_pairs: Vec<(String, String)> = primary
            .headers()
            .map(|headers| headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let page = LandingPage {
            headers: &header_pairs,
            body: &body_text,
        };

        let all_indexed = self.store.all_indexed_versions().await?;
        let mut known: HashMap<i64, SoftwareVersion> = all_indexed
            .iter()
            .map(|iv| (iv.id, iv.version.clone()))
            .collect();

        let hinted = self.hints.initial_hints(&page);
        let mut guesses: Vec<Guess> = all_indexed
            .iter()
            .filter(|iv| {
                hinted.iter().any(|p| {
                    p.name == iv.version.package.name && p.vendor == iv.version.package.vendor
                })
            })
            .map(|iv| Guess::new(iv.id, iv.version.clone()))
            .collect();

        let mut seen_webroot = HashSet::new();
        let mut initial_targets = Vec::new();
        for url in html::extract_referenced_assets(&body, &base_url)
            .into_iter()
            .chain(html::favicon_url(&base_url))
        {
            let webroot_path = url.path().to_string();
            if seen_webroot.insert(webroot_path.clone()) {
                initial_targets.push((url, webroot_path));
            }
        }

        let mut retrieved: Vec<RetrievedAsset> = Vec::new();
        let mut retrieved_paths: HashSet<String> = HashSet::new();
        let mut total_fetched = 0usize;
        let mut total_successful = 0usize;

        for classified in self.fetch_and_classify_many(initial_targets).await {
            absorb(
                classified,
                &mut known,
                &mut retrieved,
                &mut retrieved_paths,
                &mut total_fetched,
                &mut total_successful,
            );
        }

        guesses.extend(build_guesses(&retrieved, &known));
        guess::sort_by_strength_desc(&mut guesses, &self.config);
        guesses = guess::prune_implausible(guesses, &self.config);
        guesses.truncate(self.config.guess_limit);

        let mut debug_info = Vec::new();
        let mut useless_iterations = 0usize;

        for iteration in 0..self.config.max_iterations {
            if guesses.is_empty() {
                break;
            }

            let candidate_ids: Vec<i64> = guesses.iter().map(|g| g.version_id).collect();
            let exclude: Vec<String> = retrieved_paths.iter().cloned().collect();
            let paths = self
                .store
                .high_entropy_paths(&candidate_ids, &exclude, self.config.max_assets_per_iteration)
                .await?;
            if paths.is_empty() {
                debug_info.push(IterationDebug {
                    iteration,
                    decisiveness_gain: 0.0,
                    useful: false,
                    guess_count: guesses.len(),
                    reason: Some("no further probe paths".to_string()),
                });
                break;
            }

            let targets: Vec<(Url, String)> = paths
                .iter()
                .take(self.config.max_assets_per_iteration)
                .filter_map(|entry| {
                    base_url
                        .join(&entry.webroot_path)
                        .ok()
                        .map(|url| (url, entry.webroot_path.clone()))
                })
                .collect();

            let classified = self.fetch_and_classify_many(targets).await;

            let mut iteration_had_success = false;
            let mut found_in_index = 0usize;
            for item in &classified {
                if item
                    .asset
                    .status_code
                    .is_some_and(|s| (200..300).contains(&s))
                {
                    iteration_had_success = true;
                }
                if found_in_index < self.config.min_assets_per_iteration
                    && (!item.asset.expected_versions.is_empty()
                        || !item.asset.using_versions.is_empty())
                {
                    found_in_index += 1;
                }
            }
            tracing::debug!(iteration, found_in_index, "iteration probe results");

            for item in classified {
                absorb(
                    item,
                    &mut known,
                    &mut retrieved,
                    &mut retrieved_paths,
                    &mut total_fetched,
                    &mut total_successful,
                );
            }

            let mut recomputed = build_guesses(&retrieved, &known);
            guess::sort_by_strength_desc(&mut recomputed, &self.config);
            recomputed = guess::prune_implausible(recomputed, &self.config);
            recomputed.truncate(self.config.guess_limit);

            let gain = decisiveness_gain(&recomputed, &self.config);
            let useful = iteration_had_success && gain >= self.config.iteration_min_improvement;
            if useful {
                useless_iterations = 0;
            } else {
                useless_iterations += 1;
            }

            debug_info.push(IterationDebug {
                iteration,
                decisiveness_gain: gain,
                useful,
                guess_count: recomputed.len(),
                reason: if useful {
                    None
                } else if !iteration_had_success {
                    Some("no successful fetch this iteration".to_string())
                } else {
                    Some("decisiveness gain below threshold".to_string())
                },
            });

            guesses = recomputed;

            if useless_iterations >= self.config.max_iterations_without_improvement {
                break;
            }
            if guesses.len() == 1 {
                let support = calculate_support(&guesses, retrieved.len(), &self.config);
                if has_enough_support(support, &guesses, &self.config) {
                    break;
                }
            }
        }

        if guesses.is_empty() {
            return Ok(None);
        }

        let top_strength = guesses[0].strength(&self.config);
        let best: Vec<Guess> = guesses
            .iter()
            .take_while(|g| (g.strength(&self.config) - top_strength).abs() < 1e-9)
            .cloned()
            .collect();
        let support = calculate_support(&best, retrieved.len(), &self.config);

        if !has_enough_support(support, &best, &self.config) {
            return Ok(None);
        }

        check_single_package(&best)?;

        let more_recent = more_recent_version(&best[0].version, &all_indexed);

        Ok(Some(AnalysisResult {
            guesses: best,
            support,
            statistics: Statistics {
                resources_retrieved: total_fetched,
                resources_successful: total_successful,
            },
            more_recent,
            debug_info,
        }))
    }

    async fn fetch_resource(&self, url: &str) -> Resource {
        if let Some(entry) = self.lock_cache().get(url).cloned() {
            let mut resource = Resource::unretrieved(url);
            resource.mark_fetched(Fetched::Success {
                status_code: entry.status_code,
                final_url: entry.final_url,
                content_type: entry.content_type,
                headers: entry.headers,
                body: entry.body,
            });
            return resource;
        }

        let resource = self.fetcher.fetch(url).await;
        if let Some(fetched) = resource.fetched() {
            if let Some(entry) = cache::entry_for(fetched) {
                self.lock_cache().insert(url.to_string(), entry);
            }
        }
        self.persist(url, &resource);
        resource
    }

    fn persist(&self, url: &str, resource: &Resource) {
        let Some(dir) = &self.persist_dir else {
            return;
        };
        let Some(body) = resource.body() else {
            return;
        };
        if std::fs::create_dir_all(dir).is_ok() {
            let _ = std::fs::write(dir.join(sanitize_filename(url)), body);
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, Cache> {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn fetch_and_classify_many(&self, urls: Vec<(Url, String)>) -> Vec<ClassifiedAsset> {
        let semaphore = Arc::new(Semaphore::new(ASSET_FETCH_CONCURRENCY));
        let tasks = urls.into_iter().map(|(url, webroot_path)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                let resource = self.fetch_resource(url.as_str()).await;
                Some(self.classify_asset(&resource, webroot_path).await)
            }
        });
        join_all(tasks).await.into_iter().flatten().collect()
    }

    async fn classify_asset(&self, resource: &Resource, webroot_path: String) -> ClassifiedAsset {
        let status_code = resource.status_code();
        if !resource.is_success() {
            let expected = self
                .store
                .expected_by_webroot_path(&webroot_path)
                .await
                .unwrap_or_default();
            let expected_versions = expected.iter().map(|iv| iv.id).collect();
            return ClassifiedAsset {
                asset: RetrievedAsset {
                    webroot_path,
                    status_code,
                    checksum: None,
                    expected_versions,
                    using_versions: HashSet::new(),
                    weight: self.config.failed_asset_weight,
                },
                discovered: expected,
            };
        }

        let body = resource.body().unwrap_or(&[]);
        let basename = webroot_path.rsplit('/').next().unwrap_or(&webroot_path);
        let kind = normalize::pick_kind_with_content_type(basename, resource.content_type());
        let normalized = kind.normalize(body).unwrap_or_else(|_| body.to_vec());
        let checksum = compute_checksum(&normalized);

        let expected = self
            .store
            .expected_by_webroot_path(&webroot_path)
            .await
            .unwrap_or_default();
        let using = self.store.users_by_checksum(checksum).await.unwrap_or_default();
        let weight = self.store.idf_weight(checksum).await.unwrap_or(0.0);

        let expected_versions: HashSet<i64> = expected.iter().map(|iv| iv.id).collect();
        let using_versions: HashSet<i64> = using.iter().map(|iv| iv.id).collect();
        let mut discovered = expected;
        discovered.extend(using);

        ClassifiedAsset {
            asset: RetrievedAsset {
                webroot_path,
                status_code,
                checksum: Some(checksum),
                expected_versions,
                using_versions,
                weight,
            },
            discovered,
        }
    }
}

fn absorb(
    classified: ClassifiedAsset,
    known: &mut HashMap<i64, SoftwareVersion>,
    retrieved: &mut Vec<RetrievedAsset>,
    retrieved_paths: &mut HashSet<String>,
    total_fetched: &mut usize,
    total_successful: &mut usize,
) {
    *total_fetched += 1;
    if classified
        .asset
        .status_code
        .is_some_and(|s| (200..300).contains(&s))
    {
        *total_successful += 1;
    }
    retrieved_paths.insert(classified.asset.webroot_path.clone());
    for iv in classified.discovered {
        known.entry(iv.id).or_insert(iv.version);
    }
    retrieved.push(classified.asset);
}

/// Fold every retrieved asset into per-version positive/negative evidence
/// (grounded on `_map_retrieved_assets_to_versions`): a version that
/// actually uses the checksum found at a webroot path gets a positive
/// match there, a version merely expected to ship something at that path
/// gets a negative match.
fn build_guesses(assets: &[RetrievedAsset], known: &HashMap<i64, SoftwareVersion>) -> Vec<Guess> {
    let mut guesses: HashMap<i64, Guess> = HashMap::new();
    for asset in assets {
        let considered: HashSet<i64> = asset
            .expected_versions
            .union(&asset.using_versions)
            .copied()
            .collect();
        for version_id in considered {
            let Some(version) = known.get(&version_id) else {
                continue;
            };
            let guess = guesses
                .entry(version_id)
                .or_insert_with(|| Guess::new(version_id, version.clone()));
            let m = Match {
                webroot_path: asset.webroot_path.clone(),
                checksum: asset.checksum,
                idf_weight: asset.weight,
            };
            if asset.using_versions.contains(&version_id) {
                guess.positive_matches.insert(m);
            } else {
                guess.negative_matches.insert(m);
            }
        }
    }
    guesses.into_values().collect()
}

/// How much an iteration's evidence narrowed down the guess set: the raw
/// strength of the sole remaining guess, or the average strength gap
/// between the leader and everyone else (grounded on `_guess_decisiveness`).
fn decisiveness_gain(guesses: &[Guess], config: &Config) -> f64 {
    match guesses {
        [] => 0.0,
        [only] => only.strength(config),
        [best, rest @ ..] => {
            let best_strength = best.strength(config);
            let gap_sum: f64 = rest.iter().map(|g| best_strength - g.strength(config)).sum();
            gap_sum / guesses.len() as f64
        }
    }
}

fn calculate_support(best: &[Guess], retrieved_count: usize, config: &Config) -> f64 {
    if retrieved_count == 0 || best.is_empty() {
        return 0.0;
    }
    best[0].strength(config) / retrieved_count as f64
}

fn has_enough_support(support: f64, best: &[Guess], config: &Config) -> bool {
    !best.is_empty()
        && support >= config.min_support
        && best[0].strength(config) >= config.min_absolute_support
}

/// Reject a tied-top guess set spanning more than one package (§4.4.7: "if
/// the set contains versions of multiple packages, this is an error").
fn check_single_package(best: &[Guess]) -> Result<(), EngineError> {
    let Some(first) = best.first() else {
        return Ok(());
    };
    if let Some(other) = best
        .iter()
        .find(|g| g.version.package.name != first.version.package.name)
    {
        return Err(EngineError::AmbiguousPackage(
            first.version.package.name.to_string(),
            other.version.package.name.to_string(),
        ));
    }
    Ok(())
}

/// The most recently released version of the guessed package, if the index
/// knows of one newer than the guess itself.
fn more_recent_version(
    guessed: &SoftwareVersion,
    universe: &[IndexedVersion],
) -> Option<SoftwareVersion> {
    universe
        .iter()
        .map(|iv| &iv.version)
        .filter(|v| {
            v.package.name == guessed.package.name && v.package.vendor == guessed.package.vendor
        })
        .filter(|v| v.release_date > guessed.release_date)
        .max_by_key(|v| v.release_date)
        .cloned()
}

fn sanitize_filename(url: &str) -> String {
    url.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::RuleBasedHints;
    use crate::store::SqliteStore;
    use chrono::Utc;

    fn lenient_config() -> Config {
        Config {
            min_support: 0.0,
            min_absolute_support: 0.0,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn empty_index_yields_no_confident_guess() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html><body>hello</body></html>")
            .create_async()
            .await;

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = Engine::new(store, RuleBasedHints::new(vec![]), lenient_config()).unwrap();

        let result = engine.analyze(&server.url()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn matching_static_file_produces_a_confident_guess() {
        let mut server = mockito::Server::new_async().await;
        let css_body = ".a{color:red}";
        let checksum = compute_checksum(css_body.as_bytes());

        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<html><head><link rel="stylesheet" href="/style.css"></head></html>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/style.css")
            .with_status(200)
            .with_header("content-type", "text/css")
            .with_body(css_body)
            .create_async()
            .await;
        server.mock("GET", "/favicon.ico").with_status(404).create_async().await;

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let package_id = store
            .insert_package(&verscan_schema::SoftwarePackage::new(
                "wordpress",
                verscan_schema::Vendor::from("automattic"),
            ))
            .await
            .unwrap();
        let version_id = store
            .insert_version(package_id, "1.0", "1.0", Utc::now())
            .await
            .unwrap();
        store.mark_indexed(version_id).await.unwrap();
        let file_id = store
            .insert_static_file(&verscan_schema::StaticFile {
                source_path: "style.css".to_string(),
                webroot_path: "/style.css".to_string(),
                checksum,
            })
            .await
            .unwrap();
        store.link_use(version_id, file_id).await.unwrap();

        let engine = Engine::new(store, RuleBasedHints::new(vec![]), lenient_config()).unwrap();
        let result = engine.analyze(&server.url()).await.unwrap();

        let result = result.expect("expected a confident guess");
        assert_eq!(result.guesses.len(), 1);
        assert_eq!(result.guesses[0].version.internal_identifier, "1.0");
    }

    fn version_of(package: &str, id: &str) -> verscan_schema::SoftwareVersion {
        verscan_schema::SoftwareVersion {
            package: verscan_schema::SoftwarePackage::new(package, verscan_schema::Vendor::from("vendor")),
            internal_identifier: id.to_string(),
            display_name: id.to_string(),
            release_date: Utc::now(),
            indexed: true,
        }
    }

    #[test]
    fn check_single_package_accepts_same_package_ties() {
        let best = vec![
            Guess::new(1, version_of("wordpress", "1.0")),
            Guess::new(2, version_of("wordpress", "2.0")),
        ];
        assert!(check_single_package(&best).is_ok());
    }

    #[test]
    fn check_single_package_rejects_cross_package_ties() {
        let best = vec![
            Guess::new(1, version_of("wordpress", "1.0")),
            Guess::new(2, version_of("drupal", "9.0")),
        ];
        assert!(matches!(
            check_single_package(&best),
            Err(EngineError::AmbiguousPackage(_, _))
        ));
    }
}

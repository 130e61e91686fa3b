//! Running guesses about which version is live (§4.2 "Guess").

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;
use verscan_schema::{Checksum, Config, SoftwareVersion};

/// One asset observation backing a guess: the webroot path probed, the
/// checksum found (if the fetch succeeded), and its IDF weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub webroot_path: String,
    pub checksum: Option<Checksum>,
    pub idf_weight: f64,
}

impl Eq for Match {}
impl std::hash::Hash for Match {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.webroot_path.hash(state);
        self.checksum.hash(state);
    }
}

/// A candidate software version together with the evidence gathered for and
/// against it so far.
///
/// Serializes to the result JSON shape per guess (§6 "Result JSON shape"):
/// `{ software_version, positive_matches, negative_matches }`. `version_id`
/// is an internal store handle, not part of that shape.
#[derive(Debug, Clone, Serialize)]
pub struct Guess {
    #[serde(rename = "software_version")]
    pub version: SoftwareVersion,
    #[serde(skip)]
    pub version_id: i64,
    pub positive_matches: HashSet<Match>,
    pub negative_matches: HashSet<Match>,
}

impl Guess {
    #[must_use]
    pub fn new(version_id: i64, version: SoftwareVersion) -> Self {
        Self {
            version,
            version_id,
            positive_matches: HashSet::new(),
            negative_matches: HashSet::new(),
        }
    }

    #[must_use]
    pub fn positive_strength(&self) -> f64 {
        self.positive_matches.iter().map(|m| m.idf_weight).sum()
    }

    #[must_use]
    pub fn negative_strength(&self) -> f64 {
        self.negative_matches.iter().map(|m| m.idf_weight).sum()
    }

    /// The guess's overall strength: a config-weighted combination of its
    /// positive and negative evidence.
    #[must_use]
    pub fn strength(&self, config: &Config) -> f64 {
        config.positive_match_weight * self.positive_strength()
            + config.negative_match_weight * self.negative_strength()
    }
}

/// Sort guesses by descending strength, breaking ties by internal
/// identifier so ordering is deterministic across runs.
pub fn sort_by_strength_desc(guesses: &mut [Guess], config: &Config) {
    guesses.sort_by(|a, b| {
        b.strength(config)
            .partial_cmp(&a.strength(config))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.version.internal_identifier.cmp(&b.version.internal_identifier))
    });
}

/// Prune guesses whose strength falls far enough behind the top guess that
/// they are no longer plausible (§4.4.3 step 3d, the `guess_ignore_distance`
/// / `guess_relative_ignore_distance` config pair).
///
/// Assumes `guesses` is already sorted descending by strength.
pub fn prune_implausible(guesses: Vec<Guess>, config: &Config) -> Vec<Guess> {
    let Some(top) = guesses.first() else {
        return guesses;
    };
    let top_positive = top.positive_strength();
    if top_positive < config.guess_ignore_min_positive {
        return guesses;
    }
    let top_strength = top.strength(config);
    let floor = (top_strength - config.guess_ignore_distance)
        .min(top_strength * (1.0 - config.guess_relative_ignore_distance));
    guesses
        .into_iter()
        .filter(|g| g.strength(config) >= floor)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use verscan_schema::{SoftwarePackage, Vendor};

    fn version(id: &str) -> SoftwareVersion {
        SoftwareVersion {
            package: SoftwarePackage::new("wordpress", Vendor::from("automattic")),
            internal_identifier: id.to_string(),
            display_name: id.to_string(),
            release_date: Utc::now(),
            indexed: true,
        }
    }

    fn m(path: &str, weight: f64) -> Match {
        Match {
            webroot_path: path.to_string(),
            checksum: Some(Checksum::from_bytes([1; 16])),
            idf_weight: weight,
        }
    }

    #[test]
    fn strength_combines_positive_and_negative_with_config_weights() {
        let config = Config::default();
        let mut g = Guess::new(1, version("1.0"));
        g.positive_matches.insert(m("a.js", 2.0));
        g.negative_matches.insert(m("b.js", 3.0));
        let expected = config.positive_match_weight * 2.0 + config.negative_match_weight * 3.0;
        assert!((g.strength(&config) - expected).abs() < 1e-9);
    }

    #[test]
    fn sort_orders_by_strength_descending() {
        let config = Config::default();
        let mut weak = Guess::new(1, version("1.0"));
        weak.positive_matches.insert(m("a.js", 1.0));
        let mut strong = Guess::new(2, version("2.0"));
        strong.positive_matches.insert(m("a.js", 5.0));

        let mut guesses = vec![weak, strong];
        sort_by_strength_desc(&mut guesses, &config);
        assert_eq!(guesses[0].version.internal_identifier, "2.0");
    }

    #[test]
    fn prune_drops_guesses_far_behind_the_leader() {
        let mut config = Config::default();
        config.guess_ignore_distance = 1.0;
        config.guess_relative_ignore_distance = 0.0;
        config.guess_ignore_min_positive = 0.0;

        let mut leader = Guess::new(1, version("2.0"));
        leader.positive_matches.insert(m("a.js", 10.0));
        let mut trailing = Guess::new(2, version("1.0"));
        trailing.positive_matches.insert(m("a.js", 1.0));

        let guesses = vec![leader, trailing];
        let pruned = prune_implausible(guesses, &config);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].version.internal_identifier, "2.0");
    }

    #[test]
    fn low_positive_top_guess_disables_the_floor_entirely() {
        let mut config = Config::default();
        config.guess_ignore_distance = 1.0;
        config.guess_relative_ignore_distance = 0.0;
        config.guess_ignore_min_positive = 5.0;
        config.negative_match_weight = -1.0;

        let mut leader = Guess::new(1, version("2.0"));
        leader.positive_matches.insert(m("a.js", 1.0));
        let mut trailing = Guess::new(2, version("1.0"));
        trailing.negative_matches.insert(m("b.js", 10.0));

        let guesses = vec![leader, trailing];
        let pruned = prune_implausible(guesses, &config);
        assert_eq!(pruned.len(), 2);
    }
}

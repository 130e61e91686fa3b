//! Initial hints extracted straight from the landing page response, used to
//! seed guesses before any probing happens (§4.4.1, grounded on
//! `analysis/wappalyzer.py`'s `WappalyzerApp.matches`).

use regex::Regex;
use scraper::{Html, Selector};
use verscan_schema::{SoftwarePackage, Vendor};

/// A landing-page response, reduced to the fields hint rules inspect.
#[derive(Debug, Clone)]
pub struct LandingPage<'a> {
    pub headers: &'a [(String, String)],
    pub body: &'a str,
}

/// Extracts candidate packages from a [`LandingPage`] without consulting
/// the index store.
pub trait InitialHints: Send + Sync {
    fn initial_hints(&self, page: &LandingPage<'_>) -> Vec<SoftwarePackage>;
}

/// One signature: a package plus the patterns that indicate its presence.
/// A rule matches if any of its non-empty pattern sets matches.
pub struct Rule {
    pub package: SoftwarePackage,
    pub meta_generator: Option<Regex>,
    pub html: Vec<Regex>,
    pub script_src: Vec<Regex>,
    pub header: Vec<(&'static str, Regex)>,
}

/// A small, built-in signature table for common content-management
/// systems, playing the role Wappalyzer's own `apps.json` plays upstream --
/// same rule shape (header / meta / html / script patterns), much smaller
/// in number of signatures.
pub struct RuleBasedHints {
    rules: Vec<Rule>,
}

impl Default for RuleBasedHints {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RuleBasedHints {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }
}

impl InitialHints for RuleBasedHints {
    fn initial_hints(&self, page: &LandingPage<'_>) -> Vec<SoftwarePackage> {
        let meta_contents = extract_meta_generator(page.body);
        let script_srcs = extract_script_srcs(page.body);

        self.rules
            .iter()
            .filter(|rule| rule_matches(rule, page, &meta_contents, &script_srcs))
            .map(|rule| rule.package.clone())
            .collect()
    }
}

fn rule_matches(rule: &Rule, page: &LandingPage<'_>, meta: &[String], scripts: &[String]) -> bool {
    if let Some(pattern) = &rule.meta_generator {
        if meta.iter().any(|content| pattern.is_match(content)) {
            return true;
        }
    }
    if rule.html.iter().any(|pattern| pattern.is_match(page.body)) {
        return true;
    }
    if rule
        .script_src
        .iter()
        .any(|pattern| scripts.iter().any(|src| pattern.is_match(src)))
    {
        return true;
    }
    for (name, pattern) in &rule.header {
        if page
            .headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(name) && pattern.is_match(v))
        {
            return true;
        }
    }
    false
}

fn extract_meta_generator(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("meta[name=generator]").expect("static selector is valid");
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(str::to_owned)
        .collect()
}

fn extract_script_srcs(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("script").expect("static selector is valid");
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("src"))
        .map(str::to_owned)
        .collect()
}

fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            package: SoftwarePackage::new("wordpress", Vendor::from("automattic")),
            meta_generator: Some(Regex::new(r"(?i)wordpress").unwrap()),
            html: vec![Regex::new(r"(?i)wp-content|wp-includes").unwrap()],
            script_src: vec![Regex::new(r"(?i)/wp-includes/|/wp-content/").unwrap()],
            header: vec![],
        },
        Rule {
            package: SoftwarePackage::new("drupal", Vendor::from("drupal")),
            meta_generator: Some(Regex::new(r"(?i)drupal").unwrap()),
            html: vec![Regex::new(r"(?i)sites/(all|default)/(themes|modules)").unwrap()],
            script_src: vec![Regex::new(r"(?i)/sites/(all|default)/").unwrap()],
            header: vec![(
                "X-Generator",
                Regex::new(r"(?i)drupal").unwrap(),
            )],
        },
        Rule {
            package: SoftwarePackage::new("joomla", Vendor::from("open source matters")),
            meta_generator: Some(Regex::new(r"(?i)joomla").unwrap()),
            html: vec![Regex::new(r"(?i)/media/jui/|/components/com_").unwrap()],
            script_src: vec![Regex::new(r"(?i)/media/(jui|system)/").unwrap()],
            header: vec![],
        },
        Rule {
            package: SoftwarePackage::new("typo3", Vendor::from("typo3 association")),
            meta_generator: Some(Regex::new(r"(?i)typo3").unwrap()),
            html: vec![Regex::new(r"(?i)typo3conf|typo3temp").unwrap()],
            script_src: vec![Regex::new(r"(?i)/typo3(conf|temp)/").unwrap()],
            header: vec![],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_generator_identifies_wordpress() {
        let hints = RuleBasedHints::default();
        let page = LandingPage {
            headers: &[],
            body: r#"<html><head><meta name="generator" content="WordPress 6.4"></head></html>"#,
        };
        let found = hints.initial_hints(&page);
        assert!(found.iter().any(|p| p.matches_label("wordpress")));
    }

    #[test]
    fn html_path_fragments_identify_drupal_without_meta() {
        let hints = RuleBasedHints::default();
        let page = LandingPage {
            headers: &[],
            body: r#"<html><body><link href="/sites/default/themes/bartik/style.css"></body></html>"#,
        };
        let found = hints.initial_hints(&page);
        assert!(found.iter().any(|p| p.matches_label("drupal")));
    }

    #[test]
    fn unrelated_page_matches_nothing() {
        let hints = RuleBasedHints::default();
        let page = LandingPage {
            headers: &[],
            body: r#"<html><body><p>hello</p></body></html>"#,
        };
        assert!(hints.initial_hints(&page).is_empty());
    }
}

//! Path alias resolution
//!
//! Alias rules rewrite a leading path prefix of a URI into another prefix.
//! Rules are applied in repeated passes so that chained aliases (A to B,
//! then B to C) resolve regardless of the order the rules are listed in,
//! while each rule fires at most once per resolution.

use crate::error::{EdgeError, Result};
use crate::models::{AliasRule, Definitions};
use regex::Regex;
use tracing::debug;

/// Suffix of synthesized listing files, which are exempt from RHUI aliases
pub const LISTING_SUFFIX: &str = "/listing";

/// An alias rule with its exclusion patterns compiled
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub src: String,
    pub dest: String,
    exclusions: Vec<Regex>,
}

impl CompiledRule {
    /// Compile the exclusion patterns of `rule`
    ///
    /// # Returns
    /// * `Err(EdgeError::Definitions)` if an exclusion is not a valid regex
    pub fn compile(rule: &AliasRule) -> Result<Self> {
        let exclusions = rule
            .exclude_paths
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    EdgeError::Definitions(format!(
                        "invalid exclude_paths entry '{}' for alias {}: {}",
                        pattern, rule.src, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledRule {
            src: rule.src.clone(),
            dest: rule.dest.clone(),
            exclusions,
        })
    }

    /// Whether `src` matches `uri` at a path segment boundary
    pub fn matches_prefix(&self, uri: &str) -> bool {
        match uri.strip_prefix(self.src.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Whether any exclusion pattern is found anywhere in `uri`
    pub fn is_excluded(&self, uri: &str) -> bool {
        self.exclusions.iter().any(|re| re.is_match(uri))
    }

    fn applies_to(&self, uri: &str, ignore_exclusions: bool) -> bool {
        self.matches_prefix(uri) && (ignore_exclusions || !self.is_excluded(uri))
    }
}

/// Compile a whole rule list
pub fn compile_rules(rules: &[AliasRule]) -> Result<Vec<CompiledRule>> {
    rules.iter().map(CompiledRule::compile).collect()
}

/// Resolve every alias in `rules` against `uri`.
///
/// # Arguments
/// * `uri` - the URI to resolve
/// * `rules` - the rule set of one alias layer
/// * `ignore_exclusions` - apply rules even to URIs matching their exclusions
///
/// # Returns
/// The URI with all applicable aliases substituted. The first occurrence of
/// a rule's `src` is replaced by its `dest`, and a rule which has fired is
/// not considered again.
pub fn resolve(uri: &str, rules: &[CompiledRule], ignore_exclusions: bool) -> String {
    let mut uri = uri.to_string();
    let mut remaining: Vec<&CompiledRule> = rules.iter().collect();

    while !remaining.is_empty() {
        let mut next = Vec::with_capacity(remaining.len());

        for rule in remaining.iter().copied() {
            if rule.applies_to(&uri, ignore_exclusions) {
                uri = uri.replacen(rule.src.as_str(), rule.dest.as_str(), 1);
            } else {
                next.push(rule);
            }
        }

        if next.len() == remaining.len() {
            break;
        }
        remaining = next;
    }

    uri
}

/// The three alias layers of a set of CDN definitions, ready to apply
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    origin: Vec<CompiledRule>,
    rhui: Vec<CompiledRule>,
    releasever: Vec<CompiledRule>,
}

impl AliasResolver {
    /// Compile the alias layers of `definitions`
    pub fn new(definitions: &Definitions) -> Result<Self> {
        Ok(AliasResolver {
            origin: compile_rules(&definitions.origin_alias)?,
            rhui: compile_rules(&definitions.rhui_alias)?,
            releasever: compile_rules(&definitions.releasever_alias)?,
        })
    }

    /// Resolve origin, RHUI and releasever aliases in that order.
    ///
    /// RHUI aliases are skipped for listing files, whose content may differ
    /// between RHUI and non-RHUI trees.
    pub fn resolve(&self, uri: &str, ignore_exclusions: bool) -> String {
        let uri = self.resolve_layers(uri, ignore_exclusions);
        let uri = resolve(&uri, &self.releasever, ignore_exclusions);

        debug!("Resolved request URI: {}", uri);
        uri
    }

    /// Resolve origin and RHUI aliases only.
    ///
    /// This is the location content was written to before releasever
    /// aliases existed, used for mirrored reads.
    pub fn resolve_mirrored(&self, uri: &str) -> String {
        self.resolve_layers(uri, false)
    }

    fn resolve_layers(&self, uri: &str, ignore_exclusions: bool) -> String {
        let uri = resolve(uri, &self.origin, ignore_exclusions);
        if uri.ends_with(LISTING_SUFFIX) {
            uri
        } else {
            resolve(&uri, &self.rhui, ignore_exclusions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<CompiledRule> {
        pairs
            .iter()
            .map(|(src, dest)| CompiledRule::compile(&AliasRule::new(*src, *dest)).unwrap())
            .collect()
    }

    #[test]
    fn test_boundary_matching() {
        let rules = rules(&[("/foo/bar", "/X")]);
        assert_eq!(resolve("/foo/bar-x", &rules, false), "/foo/bar-x");
        assert_eq!(resolve("/foo/bar/x", &rules, false), "/X/x");
        assert_eq!(resolve("/foo/bar", &rules, false), "/X");
        assert_eq!(resolve("/other/foo/bar/x", &rules, false), "/other/foo/bar/x");
    }

    #[test]
    fn test_each_rule_fires_once() {
        let rules = rules(&[("/foo/bar", ""), ("/baz", "/quux")]);
        assert_eq!(
            resolve("/foo/bar/foo/bar/baz/somefile", &rules, false),
            "/foo/bar/baz/somefile"
        );
    }

    #[test]
    fn test_chained_aliases_any_order() {
        let forward = rules(&[("/a", "/b"), ("/b", "/c")]);
        let reverse = rules(&[("/b", "/c"), ("/a", "/b")]);
        assert_eq!(resolve("/a/file", &forward, false), "/c/file");
        assert_eq!(resolve("/a/file", &reverse, false), "/c/file");
    }

    #[test]
    fn test_mutual_aliases_terminate() {
        let rules = rules(&[("/a", "/b"), ("/b", "/a")]);
        assert_eq!(resolve("/a/file", &rules, false), "/a/file");
    }

    #[test]
    fn test_exclusions() {
        let rule = AliasRule::new("/content/dist/rhel9/9", "/content/dist/rhel9/9.5")
            .excluding(&["/iso/"]);
        let rules = vec![CompiledRule::compile(&rule).unwrap()];

        let iso = "/content/dist/rhel9/9/x86_64/baseos/iso/boot.iso";
        assert_eq!(resolve(iso, &rules, false), iso);
        assert_eq!(
            resolve(iso, &rules, true),
            "/content/dist/rhel9/9.5/x86_64/baseos/iso/boot.iso"
        );
        assert_eq!(
            resolve("/content/dist/rhel9/9/x86_64/baseos/os/repodata", &rules, false),
            "/content/dist/rhel9/9.5/x86_64/baseos/os/repodata"
        );
    }

    #[test]
    fn test_invalid_exclusion_rejected() {
        let rule = AliasRule::new("/a", "/b").excluding(&["(unclosed"]);
        assert!(matches!(
            CompiledRule::compile(&rule),
            Err(EdgeError::Definitions(_))
        ));
    }

    #[test]
    fn test_layers_and_listing_exemption() {
        let definitions = Definitions {
            origin_alias: vec![AliasRule::new("/content/origin", "/origin")],
            rhui_alias: vec![AliasRule::new("/content/dist/rhel8/rhui", "/content/dist/rhel8")],
            releasever_alias: vec![AliasRule::new("/content/dist/rhel8/8", "/content/dist/rhel8/8.5")],
            ..Default::default()
        };
        let resolver = AliasResolver::new(&definitions).unwrap();

        assert_eq!(
            resolver.resolve("/content/dist/rhel8/rhui/8/x86_64/os/repodata/repomd.xml", false),
            "/content/dist/rhel8/8.5/x86_64/os/repodata/repomd.xml"
        );
        assert_eq!(
            resolver.resolve_mirrored("/content/dist/rhel8/rhui/8/x86_64/os/repodata/repomd.xml"),
            "/content/dist/rhel8/8/x86_64/os/repodata/repomd.xml"
        );
        assert_eq!(
            resolver.resolve("/content/dist/rhel8/rhui/listing", false),
            "/content/dist/rhel8/rhui/listing"
        );
        assert_eq!(resolver.resolve("/content/origin/rpms/x", false), "/origin/rpms/x");
    }
}

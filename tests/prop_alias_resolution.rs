// Property tests for alias resolution
//
// Properties:
// - resolving an already resolved URI changes nothing
// - a rule only matches at a path segment boundary
// - excluded URIs are untouched unless exclusions are ignored
// - the result does not depend on the order rules are listed in, for
//   chains of distinct prefixes

use exodus_edge::alias::{resolve, CompiledRule};
use exodus_edge::AliasRule;
use proptest::prelude::*;

fn compile(rules: &[AliasRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .map(|rule| CompiledRule::compile(rule).unwrap())
        .collect()
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn path(max_segments: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..=max_segments).prop_map(|s| format!("/{}", s.join("/")))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Resolution is idempotent when no destination can be matched by any
    /// source
    #[test]
    fn prop_resolution_idempotent(
        src in path(3),
        dest_tail in path(3),
        rest in path(4),
    ) {
        let dest = format!("/_dest{}", dest_tail);
        let rules = compile(&[AliasRule::new(src.clone(), dest)]);

        for uri in [format!("{}{}", src, rest), rest.clone(), src.clone()] {
            let once = resolve(&uri, &rules, false);
            let twice = resolve(&once, &rules, false);
            prop_assert_eq!(&once, &twice, "uri={}", uri);
        }
    }

    /// A source never matches mid-segment
    #[test]
    fn prop_boundary_matching(
        src in path(3),
        suffix in "[a-z0-9-]{1,6}",
        rest in path(3),
    ) {
        let rules = compile(&[AliasRule::new(src.clone(), "/X")]);

        let mid_segment = format!("{}{}{}", src, suffix, rest);
        prop_assert_eq!(resolve(&mid_segment, &rules, false), mid_segment);

        let below = format!("{}{}", src, rest);
        prop_assert_eq!(resolve(&below, &rules, false), format!("/X{}", rest));
        prop_assert_eq!(resolve(&src, &rules, false), "/X");
    }

    /// Exclusions gate a rule unless explicitly ignored
    #[test]
    fn prop_exclusions(
        src in path(2),
        marker in "[a-z]{3,6}",
        rest in path(2),
    ) {
        let excluded_segment = format!("/{}-excluded/", marker);
        let rule = AliasRule::new(src.clone(), "/X").excluding(&[excluded_segment.as_str()]);
        let rules = compile(&[rule]);

        let uri = format!("{}{}{}", src, excluded_segment, rest.trim_start_matches('/'));
        prop_assert_eq!(resolve(&uri, &rules, false), uri.clone());
        prop_assert!(resolve(&uri, &rules, true).starts_with("/X/"));
    }

    /// Chained aliases resolve fully in any order
    #[test]
    fn prop_chain_order_independent(
        rest in path(3),
        rotation in 0usize..3,
    ) {
        let mut chain = vec![
            AliasRule::new("/a1", "/b2"),
            AliasRule::new("/b2", "/c3"),
            AliasRule::new("/c3", "/d4"),
        ];
        chain.rotate_left(rotation);
        let rules = compile(&chain);

        prop_assert_eq!(
            resolve(&format!("/a1{}", rest), &rules, false),
            format!("/d4{}", rest)
        );
    }
}

//! Sample rules shipped inside the binary.

/// `(name, source)` pairs installed into the sample directory.
pub const BUNDLED_SAMPLES: &[(&str, &str)] = &[
    (
        "block_ads",
        include_str!("../../rule_sample/sample_block_ads.json"),
    ),
    (
        "rewrite_headers",
        include_str!("../../rule_sample/sample_rewrite_headers.json"),
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleRegistry;

    #[test]
    fn every_bundled_sample_builds() {
        let registry = RuleRegistry::with_builtins();
        for (name, source) in BUNDLED_SAMPLES {
            assert!(registry.build(source).is_ok(), "sample {name} should build");
        }
    }
}

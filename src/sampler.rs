//! Sampling decision engine.
//!
//! A [`SamplingPolicy`] is a nested `{dimension → {matcher → probability}}`
//! table deciding whether a new, unparented trace should be recorded at full
//! verbosity. Matchers are literal strings, except keys bracketed by `^` and
//! `$`, which are compiled as regular expressions. The decision is fail-open:
//! traffic no dimension matches is always sampled.

use std::collections::HashMap;

use rand::Rng;
use regex::Regex;

use crate::error::{TraceError, TraceResult};

#[derive(Debug, Default)]
struct DimensionRules {
    literals: HashMap<String, f64>,
    patterns: Vec<(Regex, f64)>,
}

impl DimensionRules {
    /// An exact literal match always wins over any matching pattern. Among
    /// matching patterns the highest probability is taken.
    fn probability(&self, value: &str) -> Option<f64> {
        if let Some(prob) = self.literals.get(value) {
            return Some(*prob);
        }
        self.patterns
            .iter()
            .filter(|(re, _)| re.is_match(value))
            .map(|(_, prob)| *prob)
            .reduce(f64::max)
    }
}

/// Per-dimension probability table deciding trace enablement for unparented
/// spans.
#[derive(Debug, Default)]
pub struct SamplingPolicy {
    dimensions: HashMap<String, DimensionRules>,
}

impl SamplingPolicy {
    /// Compile a policy from the nested configuration map.
    ///
    /// Probabilities must be within `[0, 1]`: matcher keys that start with
    /// `^` and end with `$` must compile as regular expressions. Either
    /// failure is a [`TraceError::Validation`].
    pub fn from_map(
        sampling: HashMap<String, HashMap<String, f64>>,
    ) -> TraceResult<Self> {
        let mut dimensions = HashMap::new();
        for (dimension, matchers) in sampling {
            let mut rules = DimensionRules::default();
            for (matcher, probability) in matchers {
                if !(0.0..=1.0).contains(&probability) {
                    return Err(TraceError::validation(format!(
                        "probability {probability} for {dimension}.{matcher} \
                         must be between 0 and 1"
                    )));
                }
                if matcher.starts_with('^') && matcher.ends_with('$') {
                    let re = Regex::new(&matcher).map_err(|err| {
                        TraceError::validation(format!(
                            "invalid pattern {dimension}.{matcher}: {err}"
                        ))
                    })?;
                    rules.patterns.push((re, probability));
                } else {
                    rules.literals.insert(matcher, probability);
                }
            }
            dimensions.insert(dimension, rules);
        }
        Ok(SamplingPolicy { dimensions })
    }

    /// Decide whether a new root trace should be recorded, drawing a uniform
    /// random value in `[0, 1)`.
    pub fn should_enable(&self, attributes: &HashMap<String, String>) -> bool {
        self.should_enable_with_random(attributes, rand::rng().random::<f64>())
    }

    /// Deterministic variant: the caller supplies the "random" draw.
    ///
    /// Enabled iff `random <= probability`; when no dimension resolves a
    /// probability the result is `true` regardless of the draw.
    pub fn should_enable_with_random(
        &self,
        attributes: &HashMap<String, String>,
        random: f64,
    ) -> bool {
        match self.resolve(attributes) {
            Some(probability) => random <= probability,
            None => true,
        }
    }

    /// Maximum probability across all dimensions present in both the
    /// attributes and the policy; `None` when nothing matches.
    fn resolve(&self, attributes: &HashMap<String, String>) -> Option<f64> {
        attributes
            .iter()
            .filter_map(|(dimension, value)| {
                self.dimensions
                    .get(dimension)
                    .and_then(|rules| rules.probability(value))
            })
            .reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(entries: &[(&str, &[(&str, f64)])]) -> SamplingPolicy {
        let map = entries
            .iter()
            .map(|(dimension, matchers)| {
                (
                    dimension.to_string(),
                    matchers
                        .iter()
                        .map(|(m, p)| (m.to_string(), *p))
                        .collect(),
                )
            })
            .collect();
        SamplingPolicy::from_map(map).unwrap()
    }

    fn attrs(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn resolves_literals_and_patterns() {
        let policy = policy(&[
            ("endpoint", &[("foo", 0.9)]),
            (
                "GET",
                &[
                    ("/fancy/pants", 0.6),
                    ("^/vms/[^/]+/jobs$", 0.04),
                    ("^/fancy/.*$", 0.7),
                ],
            ),
        ]);

        assert_eq!(policy.resolve(&attrs(&[("endpoint", "foo")])), Some(0.9));
        assert_eq!(policy.resolve(&attrs(&[("endpoint", "bar")])), None);
        assert_eq!(
            policy.resolve(&attrs(&[("GET", "/vms/deadbeef/jobs")])),
            Some(0.04)
        );
        // tie goes to the literal string
        assert_eq!(
            policy.resolve(&attrs(&[("GET", "/fancy/pants")])),
            Some(0.6)
        );
    }

    #[test]
    fn no_accidental_substring_match() {
        let policy = policy(&[("route", &[("ping", 0.01), ("stats", 0.02)])]);
        assert_eq!(policy.resolve(&attrs(&[("route", "stat")])), None);
        assert_eq!(policy.resolve(&attrs(&[("route", "pings")])), None);
    }

    #[test]
    fn maximum_across_dimensions_wins() {
        let policy = policy(&[
            ("route", &[("ping", 0.01)]),
            ("GET", &[("/ping", 0.5)]),
        ]);
        assert_eq!(
            policy.resolve(&attrs(&[("route", "ping"), ("GET", "/ping")])),
            Some(0.5)
        );
    }

    #[test]
    fn deterministic_under_injected_randomness() {
        let policy = policy(&[("route", &[("ping", 0.01)])]);
        let attributes = attrs(&[("route", "ping")]);
        assert!(policy.should_enable_with_random(&attributes, 0.001));
        assert!(!policy.should_enable_with_random(&attributes, 0.5));
        // boundary: enabled iff random <= probability
        assert!(policy.should_enable_with_random(&attributes, 0.01));
    }

    #[test]
    fn unconfigured_traffic_is_always_sampled() {
        let policy = policy(&[("route", &[("ping", 0.01)])]);
        let unmatched = attrs(&[("route", "create-vm")]);
        assert!(policy.should_enable_with_random(&unmatched, 0.999_999));
        let foreign_dimension = attrs(&[("POST", "/vms")]);
        assert!(policy.should_enable_with_random(&foreign_dimension, 0.999_999));
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let result = SamplingPolicy::from_map(
            [(
                "route".to_string(),
                [("ping".to_string(), 1.5)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
        );
        assert!(matches!(result, Err(TraceError::Validation(_))));
    }

    #[test]
    fn rejects_invalid_pattern() {
        let result = SamplingPolicy::from_map(
            [(
                "GET".to_string(),
                [("^[unclosed$".to_string(), 0.1)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
        );
        assert!(matches!(result, Err(TraceError::Validation(_))));
    }
}

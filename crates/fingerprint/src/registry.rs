//! Explicit registry of fingerprinting algorithms.
//!
//! The registry is assembled once at startup with a [`RegistryBuilder`] and is
//! read-only afterwards. Stores and the matcher receive it by reference (or
//! `Arc`), so there is no process-wide lookup table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;
use crate::fingerprint::{validate_algorithm_id, Fingerprint, FingerprintShape, MetricKind};
use crate::mode::MatchMode;

/// Inclusive maximum distance accepted as a match, per [`MatchMode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
    pub exact: f64,
    pub strict: f64,
    pub normal: f64,
    pub sloppy: f64,
}

impl MatchThresholds {
    pub fn new(exact: f64, strict: f64, normal: f64, sloppy: f64) -> Self {
        Self {
            exact,
            strict,
            normal,
            sloppy,
        }
    }

    pub fn get(&self, mode: MatchMode) -> f64 {
        match mode {
            MatchMode::Exact => self.exact,
            MatchMode::Strict => self.strict,
            MatchMode::Normal => self.normal,
            MatchMode::Sloppy => self.sloppy,
        }
    }

    /// Thresholds must be finite, non-negative and non-decreasing from
    /// `exact` to `sloppy`.
    pub fn validate(&self) -> Result<(), FingerprintError> {
        let values = MatchMode::ALL.map(|mode| self.get(mode));
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(FingerprintError::invalid(
                "match thresholds must be finite and >= 0",
            ));
        }
        if values.windows(2).any(|w| w[0] > w[1]) {
            return Err(FingerprintError::invalid(
                "match thresholds must not decrease from exact to sloppy",
            ));
        }
        Ok(())
    }
}

/// Hamming thresholds used by the built-in 64-bit image hashes.
pub const DEFAULT_HASH64_THRESHOLDS: MatchThresholds = MatchThresholds {
    exact: 0.0,
    strict: 2.0,
    normal: 6.0,
    sloppy: 10.0,
};

/// Description of one fingerprint-producing algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    pub id: String,
    pub length: usize,
    pub metric: MetricKind,
    pub thresholds: MatchThresholds,
}

impl AlgorithmSpec {
    pub fn new<I: Into<String>>(
        id: I,
        length: usize,
        metric: MetricKind,
        thresholds: MatchThresholds,
    ) -> Self {
        Self {
            id: id.into(),
            length,
            metric,
            thresholds,
        }
    }

    pub fn shape(&self) -> FingerprintShape {
        FingerprintShape::new(self.id.clone(), self.length, self.metric)
    }

    pub fn validate(&self) -> Result<(), FingerprintError> {
        validate_algorithm_id(&self.id)?;
        if self.length == 0 {
            return Err(FingerprintError::invalid(format!(
                "algorithm `{}` must declare a length > 0",
                self.id
            )));
        }
        self.thresholds.validate()
    }
}

fn default_specs() -> [AlgorithmSpec; 3] {
    ["ahash64", "dhash64", "phash64"]
        .map(|id| AlgorithmSpec::new(id, 64, MetricKind::Hamming, DEFAULT_HASH64_THRESHOLDS))
}

/// Read-only lookup of registered algorithms.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, AlgorithmSpec>,
}

impl AlgorithmRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding the built-in `ahash64`, `dhash64` and `phash64` entries.
    pub fn with_defaults() -> Self {
        RegistryBuilder::new().with_defaults().build()
    }

    pub fn get(&self, id: &str) -> Option<&AlgorithmSpec> {
        self.algorithms.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.algorithms.contains_key(id)
    }

    /// Match threshold of algorithm `id` for `mode`.
    pub fn threshold(&self, id: &str, mode: MatchMode) -> Result<f64, FingerprintError> {
        self.get(id)
            .map(|spec| spec.thresholds.get(mode))
            .ok_or_else(|| FingerprintError::UnknownAlgorithm(id.to_string()))
    }

    /// Check that `fp` was produced by a registered algorithm with the
    /// registered length and metric.
    pub fn validate(&self, fp: &Fingerprint) -> Result<(), FingerprintError> {
        let spec = self
            .get(fp.algorithm())
            .ok_or_else(|| FingerprintError::UnknownAlgorithm(fp.algorithm().to_string()))?;
        if !fp.has_shape(&spec.shape()) {
            return Err(FingerprintError::Comparability {
                left: fp.shape(),
                right: spec.shape(),
            });
        }
        Ok(())
    }

    /// Parse one text line and validate it against the registry.
    pub fn parse(&self, line: &str) -> Result<Fingerprint, FingerprintError> {
        let fp = Fingerprint::parse(line)?;
        self.validate(&fp)?;
        Ok(fp)
    }

    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.algorithms.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Builder for [`AlgorithmRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    algorithms: HashMap<String, AlgorithmSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the built-in 64-bit hashes, keeping any entry already registered
    /// under the same id.
    pub fn with_defaults(mut self) -> Self {
        for spec in default_specs() {
            self.algorithms.entry(spec.id.clone()).or_insert(spec);
        }
        self
    }

    pub fn register(mut self, spec: AlgorithmSpec) -> Result<Self, FingerprintError> {
        spec.validate()?;
        if self.algorithms.contains_key(&spec.id) {
            return Err(FingerprintError::DuplicateAlgorithm(spec.id));
        }
        self.algorithms.insert(spec.id.clone(), spec);
        Ok(self)
    }

    pub fn build(self) -> AlgorithmRegistry {
        AlgorithmRegistry {
            algorithms: self.algorithms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> AlgorithmSpec {
        AlgorithmSpec::new(
            "clip4",
            4,
            MetricKind::Euclidean,
            MatchThresholds::new(0.0, 0.1, 0.25, 0.5),
        )
    }

    #[test]
    fn defaults_cover_common_image_hashes() {
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(registry.ids(), vec!["ahash64", "dhash64", "phash64"]);
        assert_eq!(registry.threshold("dhash64", MatchMode::Exact).unwrap(), 0.0);
        assert_eq!(registry.threshold("phash64", MatchMode::Sloppy).unwrap(), 10.0);
    }

    #[test]
    fn unknown_algorithm_threshold_fails() {
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(
            registry.threshold("bhash", MatchMode::Normal),
            Err(FingerprintError::UnknownAlgorithm("bhash".into()))
        );
    }

    #[test]
    fn duplicate_registration_rejected() {
        let err = AlgorithmRegistry::builder()
            .register(clip())
            .unwrap()
            .register(clip())
            .expect_err("duplicate id");
        assert_eq!(err, FingerprintError::DuplicateAlgorithm("clip4".into()));
    }

    #[test]
    fn decreasing_thresholds_rejected() {
        let spec = AlgorithmSpec::new(
            "bad",
            64,
            MetricKind::Hamming,
            MatchThresholds::new(0.0, 5.0, 3.0, 10.0),
        );
        assert!(AlgorithmRegistry::builder().register(spec).is_err());
    }

    #[test]
    fn with_defaults_keeps_custom_override() {
        let custom = AlgorithmSpec::new(
            "dhash64",
            64,
            MetricKind::Hamming,
            MatchThresholds::new(0.0, 1.0, 3.0, 5.0),
        );
        let registry = AlgorithmRegistry::builder()
            .register(custom)
            .unwrap()
            .with_defaults()
            .build();
        assert_eq!(registry.threshold("dhash64", MatchMode::Normal).unwrap(), 3.0);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn parse_validates_shape() {
        let registry = AlgorithmRegistry::builder()
            .with_defaults()
            .register(clip())
            .unwrap()
            .build();

        let ok = Fingerprint::from_words("dhash64", 64, &[42]).unwrap();
        assert_eq!(registry.parse(&ok.to_line()).unwrap(), ok);

        let short = Fingerprint::from_words("dhash64", 32, &[42]).unwrap();
        assert!(matches!(
            registry.parse(&short.to_line()),
            Err(FingerprintError::Comparability { .. })
        ));

        let unknown = Fingerprint::from_words("bhash", 64, &[42]).unwrap();
        assert!(matches!(
            registry.parse(&unknown.to_line()),
            Err(FingerprintError::UnknownAlgorithm(_))
        ));
    }
}

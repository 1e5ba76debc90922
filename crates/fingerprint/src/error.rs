use thiserror::Error;

use crate::fingerprint::FingerprintShape;

/// Errors returned while building, comparing or parsing fingerprints.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FingerprintError {
    #[error("fingerprints are not comparable: {left} vs {right}")]
    Comparability {
        left: FingerprintShape,
        right: FingerprintShape,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to parse fingerprint: {reason}")]
    Parse { reason: String },

    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),

    #[error("algorithm `{0}` is already registered")]
    DuplicateAlgorithm(String),
}

impl FingerprintError {
    pub(crate) fn parse<R: Into<String>>(reason: R) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid<R: Into<String>>(reason: R) -> Self {
        Self::InvalidArgument(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MetricKind;

    #[test]
    fn comparability_display_names_both_shapes() {
        let err = FingerprintError::Comparability {
            left: FingerprintShape::new("dhash64", 64, MetricKind::Hamming),
            right: FingerprintShape::new("phash64", 64, MetricKind::Hamming),
        };
        let text = err.to_string();
        assert!(text.contains("dhash64/64/hamming"));
        assert!(text.contains("phash64/64/hamming"));
    }

    #[test]
    fn error_partial_eq() {
        let err1 = FingerprintError::UnknownAlgorithm("x".into());
        let err2 = FingerprintError::UnknownAlgorithm("x".into());
        let err3 = FingerprintError::DuplicateAlgorithm("x".into());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}

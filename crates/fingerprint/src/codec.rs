//! One-line text codec for fingerprints.
//!
//! `<hex payload>,<algorithm>,<length>,<metric>[,<provenance>]`
//!
//! A missing provenance writes four fields. A present provenance, even an
//! empty one, writes a fifth field, so both forms survive a round trip.

use std::fmt;
use std::str::FromStr;

use crate::error::FingerprintError;
use crate::fingerprint::{Fingerprint, MetricKind};

const DELIMITER: char = ',';
const ESCAPE: char = '\\';

impl Fingerprint {
    /// Serialize to the single-line text form.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
            hex::encode(self.payload()),
            self.algorithm(),
            self.length(),
            self.metric()
        );
        if let Some(provenance) = self.provenance() {
            line.push(DELIMITER);
            line.push_str(&escape_provenance(provenance));
        }
        line
    }

    /// Parse the single-line text form produced by [`Fingerprint::to_line`].
    pub fn parse(line: &str) -> Result<Self, FingerprintError> {
        let mut fields = line.splitn(5, DELIMITER);
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| FingerprintError::parse(format!("missing {name} field")))
        };

        let payload_hex = next("payload")?;
        let algorithm = next("algorithm")?;
        let length = next("length")?;
        let metric = next("metric")?;
        let provenance = fields.next();

        let payload = hex::decode(payload_hex)
            .map_err(|e| FingerprintError::parse(format!("bad hex payload: {e}")))?;
        let length: usize = length
            .parse()
            .map_err(|e| FingerprintError::parse(format!("bad length `{length}`: {e}")))?;
        let metric = MetricKind::from_str(metric)?;

        let fp = Fingerprint::from_parts(algorithm, length, metric, payload).map_err(|e| match e {
            FingerprintError::InvalidArgument(reason) => FingerprintError::Parse { reason },
            other => other,
        })?;

        match provenance {
            Some(raw) => Ok(fp.with_provenance(unescape_provenance(raw)?)),
            None => Ok(fp),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::parse(s)
    }
}

fn escape_provenance(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            DELIMITER => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_provenance(escaped: &str) -> Result<String, FingerprintError> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(ESCAPE) => out.push(ESCAPE),
                Some(DELIMITER) => out.push(DELIMITER),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(other) => {
                    return Err(FingerprintError::parse(format!(
                        "unknown escape `\\{other}` in provenance"
                    )))
                }
                None => return Err(FingerprintError::parse("dangling escape in provenance")),
            },
            DELIMITER => {
                return Err(FingerprintError::parse("unescaped delimiter in provenance"));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

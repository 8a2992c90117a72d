//! Provenance stamped into exported documents that carry a metadata block.
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct ExportMetadata {
    pub generated_at: DateTime<Utc>,
    pub generator: String,
}

impl ExportMetadata {
    /// Metadata for a document produced now by `exporter`.
    pub fn now(exporter: &str) -> Self {
        Self {
            generated_at: Utc::now(),
            generator: format!("alchemy-io {} {}", env!("CARGO_PKG_VERSION"), exporter),
        }
    }

    pub fn creation_timestamp(&self) -> String {
        self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "generated_by": self.generator,
            "generated_at": self.creation_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format() {
        let meta = ExportMetadata {
            generated_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap(),
            generator: "test".into(),
        };
        assert_eq!(meta.creation_timestamp(), "2024-03-01T12:30:05Z");
        assert_eq!(meta.to_json()["generated_by"], "test");
    }
}

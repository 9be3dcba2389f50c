use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use roadsigns_recon::{FetchError, SourceAdapter, SourceId, SourceRecord};

use crate::wire::parse_payload;

/// A registry export on disk, in the same JSON shape the HTTP feed serves.
#[derive(Debug, Clone)]
pub struct FileFeed {
    source: SourceId,
    path: PathBuf,
}

impl FileFeed {
    pub fn new(source: SourceId, path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceAdapter for FileFeed {
    fn source(&self) -> SourceId {
        self.source
    }

    fn fetch_records(&self) -> Result<Vec<SourceRecord>, FetchError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            FetchError::Unreachable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let body: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| FetchError::Malformed(format!("{}: {e}", self.path.display())))?;

        // File exports carry no fetch time; use the file's mtime.
        let fetched_at = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        parse_payload(self.source, &body, fetched_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commercial.json");
        std::fs::write(
            &path,
            r#"[{"commerce_internal_id": "C1", "name": "Stop", "latitude": 55.7, "longitude": 37.6}]"#,
        )
        .unwrap();

        let recs = FileFeed::new(SourceId::Commercial, &path).fetch_records().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].source, SourceId::Commercial);
    }

    #[test]
    fn missing_and_garbled_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileFeed::new(SourceId::Authority, dir.path().join("nope.json"));
        assert!(matches!(missing.fetch_records(), Err(FetchError::Unreachable(_))));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let bad = FileFeed::new(SourceId::Authority, &path);
        assert!(matches!(bad.fetch_records(), Err(FetchError::Malformed(_))));
    }
}

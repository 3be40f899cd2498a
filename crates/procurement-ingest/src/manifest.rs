use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::pipeline::SourceFile;

/// YAML batch description: the files to ingest and whether to recompute
/// statuses afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestManifest {
    pub sources: Vec<SourceFile>,
    #[serde(default = "default_recompute")]
    pub recompute_statuses: bool,
}

fn default_recompute() -> bool {
    true
}

impl IngestManifest {
    /// # Errors
    /// Returns [`IngestError::Manifest`] when the text is not a valid manifest.
    pub fn from_yaml_str(raw: &str) -> Result<Self, IngestError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Load a manifest file; relative source paths resolve against its directory.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| IngestError::Io { path: path.to_path_buf(), source })?;
        let manifest = Self::from_yaml_str(&raw)?;
        Ok(manifest.resolve_sources(path.parent().unwrap_or_else(|| Path::new("."))))
    }

    #[must_use]
    pub fn resolve_sources(mut self, base_dir: &Path) -> Self {
        for source in &mut self.sources {
            if source.path.is_relative() {
                source.path = base_dir.join(&source.path);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::pipeline::SourceKind;

    #[test]
    fn manifest_defaults_recompute_and_resolves_relative_paths() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("batch.yaml");
        std::fs::write(
            &path,
            "sources:\n  - kind: request_approvals\n    path: exports/approvals.xls\n    sheet: Отчет\n  - kind: documents\n    path: /data/documents.xlsx\n",
        )?;

        let manifest = IngestManifest::load(&path)?;
        assert!(manifest.recompute_statuses);
        assert_eq!(
            manifest.sources,
            vec![
                SourceFile {
                    kind: SourceKind::RequestApprovals,
                    path: dir.path().join("exports/approvals.xls"),
                    sheet: Some("Отчет".to_string()),
                },
                SourceFile {
                    kind: SourceKind::Documents,
                    path: PathBuf::from("/data/documents.xlsx"),
                    sheet: None,
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn unknown_source_kinds_are_manifest_errors() {
        let parsed = IngestManifest::from_yaml_str(
            "sources:\n  - kind: invoices\n    path: a.xlsx\nrecompute_statuses: false\n",
        );
        assert!(matches!(parsed, Err(IngestError::Manifest(_))));

        let parsed = IngestManifest::from_yaml_str("sources: []\nrecompute_statuses: false\n");
        assert!(matches!(parsed, Ok(IngestManifest { ref sources, recompute_statuses: false }) if sources.is_empty()));
    }
}

use humansize::{file_size_opts as options, FileSize};
use serde::Serialize;

use crate::model::error::UploadError;
use crate::model::upload_record::UploadRecord;

/// Result of the upload stage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadSummary {
    /// Transmitted and removed from the staging directory
    pub uploaded: Vec<UploadRecord>,
    /// Not transmitted, still on disk
    pub failed: Vec<UploadError>,
    /// Transmitted, but the local copy could not be removed
    pub retained_after_upload: Vec<UploadRecord>,
}

impl UploadSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.uploaded.len() + self.retained_after_upload.len() + self.failed.len()
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded
            .iter()
            .chain(self.retained_after_upload.iter())
            .map(|record| record.size)
            .sum()
    }

    pub fn uploaded_size(&self) -> String {
        self.uploaded_bytes()
            .file_size(options::CONVENTIONAL)
            .unwrap_or_else(|_| "0 B".to_string())
    }

    /// Keeps the summary stable regardless of the order uploads finished in
    pub fn sort(&mut self) {
        self.uploaded.sort_by(|a, b| a.key.cmp(&b.key));
        self.retained_after_upload.sort_by(|a, b| a.key.cmp(&b.key));
        self.failed.sort_by(|a, b| a.key.cmp(&b.key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::error::StoreError;
    use std::path::PathBuf;

    #[test]
    fn test_counts_and_bytes() {
        let mut summary = UploadSummary {
            uploaded: vec![
                UploadRecord::new(PathBuf::from("/t/b"), "m/b", 1024),
                UploadRecord::new(PathBuf::from("/t/a"), "m/a", 1024),
            ],
            failed: vec![UploadError {
                path: PathBuf::from("/t/c"),
                key: "m/c".into(),
                source: StoreError::Other("x".into()),
            }],
            retained_after_upload: vec![UploadRecord::new(PathBuf::from("/t/d"), "m/d", 0)],
        };
        summary.sort();

        assert_eq!(summary.attempted(), 4);
        assert_eq!(summary.uploaded_bytes(), 2048);
        assert!(summary.uploaded_size().ends_with("KB"));
        assert_eq!(summary.uploaded[0].key, "m/a");
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_empty_summary_is_complete() {
        let summary = UploadSummary::default();
        assert!(summary.is_complete());
        assert_eq!(summary.uploaded_size(), "0 B");
    }
}

use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Maps one local file to the object key it is stored under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    pub local_path: PathBuf,
    pub key: String,
    pub size: u64,
}

impl UploadRecord {
    pub fn new(local_path: PathBuf, key: impl Into<String>, size: u64) -> Self {
        UploadRecord {
            local_path,
            key: key.into(),
            size,
        }
    }

    /// Builds the record for a file found under `root`.
    /// Returns None when `local_path` does not live under `root`.
    pub fn for_file(root: &Path, local_path: PathBuf, prefix: &str, size: u64) -> Option<Self> {
        let relative = local_path.strip_prefix(root).ok()?;
        let key = destination_key(prefix, relative);
        Some(UploadRecord::new(local_path, key, size))
    }
}

/// `prefix/relative/path`, always with forward slashes.
///
/// Backslashes are treated as separators too, so a Windows style relative path
/// maps to the same key on every host. A trailing slash on the prefix is not
/// doubled and an empty prefix yields the bare relative path.
pub fn destination_key(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().replace('\\', "/")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    let prefix = prefix.replace('\\', "/");
    let prefix = prefix.trim_end_matches('/');

    if prefix.is_empty() {
        relative
    } else {
        format!("{}/{}", prefix, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_for_top_level_file() {
        assert_eq!(
            destination_key("model-x", Path::new("config.json")),
            "model-x/config.json"
        );
    }

    #[test]
    fn test_key_for_nested_file() {
        let relative: PathBuf = ["weights", "shard1.bin"].iter().collect();
        assert_eq!(
            destination_key("model-x", &relative),
            "model-x/weights/shard1.bin"
        );
    }

    #[test]
    fn test_key_normalizes_backslashes() {
        assert_eq!(
            destination_key("model-x", Path::new("weights\\shard1.bin")),
            "model-x/weights/shard1.bin"
        );
    }

    #[test]
    fn test_key_with_trailing_slash_prefix() {
        assert_eq!(
            destination_key("models/model-x/", Path::new("config.json")),
            "models/model-x/config.json"
        );
    }

    #[test]
    fn test_key_with_empty_prefix() {
        assert_eq!(destination_key("", Path::new("config.json")), "config.json");
    }

    #[test]
    fn test_record_for_file_under_root() {
        let root = PathBuf::from("/tmp/model_download");
        let record =
            UploadRecord::for_file(&root, root.join("weights").join("shard1.bin"), "model-x", 42)
                .unwrap();
        assert_eq!(record.key, "model-x/weights/shard1.bin");
        assert_eq!(record.size, 42);
    }

    #[test]
    fn test_record_for_file_outside_root() {
        let record = UploadRecord::for_file(
            Path::new("/tmp/model_download"),
            PathBuf::from("/etc/passwd"),
            "model-x",
            1,
        );
        assert!(record.is_none());
    }
}

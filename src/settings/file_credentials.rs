use color_eyre::{eyre, Report};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

/// Static S3 credentials kept in a `key=value` file
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileCredential {
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
    pub default_region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl std::fmt::Debug for FileCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredential")
            .field("name", &self.name)
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("default_region", &self.default_region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl FileCredential {
    pub fn try_parse_file(path: &Path) -> eyre::Result<Self> {
        let file = fs::File::open(path)?;
        let reader = io::BufReader::new(file);
        let mut access_key = String::new();
        let mut secret_key = String::new();
        let mut default_region = None;
        let mut endpoint_url = None;
        let mut force_path_style = false;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());

        for line in reader.lines() {
            let line = line?;
            if let Some(stripped) = line.strip_prefix("access_key=") {
                access_key = stripped.trim().to_string()
            } else if let Some(stripped) = line.strip_prefix("secret_key=") {
                secret_key = stripped.trim().to_string()
            } else if let Some(stripped) = line.strip_prefix("default_region=") {
                default_region = Some(stripped.trim().to_string())
            } else if let Some(stripped) = line.strip_prefix("endpoint_url=") {
                endpoint_url = Some(stripped.trim().to_string())
            } else if let Some(stripped) = line.strip_prefix("force_path_style=") {
                force_path_style = stripped.trim().parse().map_err(|_| {
                    Report::msg(format!(
                        "configuration param [force_path_style] is not a valid boolean (true/false) in file: {:?}",
                        path
                    ))
                })?;
            }
        }

        if access_key.is_empty() || secret_key.is_empty() {
            return Err(Report::msg(format!(
                "Missing access_key/secret_key in file: {:?}",
                path
            )));
        }

        Ok(Self {
            name,
            access_key,
            secret_key,
            default_region: default_region.filter(|r| !r.is_empty()),
            endpoint_url: endpoint_url.filter(|u| !u.is_empty()),
            force_path_style,
        })
    }
}

/// Reads the credentials file if one was configured
pub fn load_credentials(creds_file: Option<&Path>) -> eyre::Result<Option<FileCredential>> {
    creds_file.map(FileCredential::try_parse_file).transpose()
}

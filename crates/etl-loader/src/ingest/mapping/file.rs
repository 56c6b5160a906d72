//! JSON-file mapping repository
//!
//! One document per source file: `{dir}/matching_{stem}.json`, where `stem` is the file
//! name without its extension.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{MappingError, MappingRepository, MappingResult, MatchingRule};

const FILE_PREFIX: &str = "matching_";
const FILE_SUFFIX: &str = ".json";
const SOURCE_EXTENSION: &str = "csv";

#[derive(Debug, Clone)]
pub struct FileMappingRepository {
    dir: PathBuf,
}

impl FileMappingRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Location of the rule document for a source file name
    pub fn path_for(&self, file_name: &str) -> MappingResult<PathBuf> {
        let path = Path::new(file_name);
        let is_plain_name = path.file_name().and_then(|n| n.to_str()) == Some(file_name);

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| is_plain_name && !s.is_empty())
            .ok_or_else(|| MappingError::InvalidFileName(file_name.to_string()))?;

        Ok(self
            .dir
            .join(format!("{}{}{}", FILE_PREFIX, stem, FILE_SUFFIX)))
    }
}

#[async_trait]
impl MappingRepository for FileMappingRepository {
    async fn get(&self, file_name: &str) -> MappingResult<Option<MatchingRule>> {
        let path = self.path_for(file_name)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, file_name: &str, rule: &MatchingRule) -> MappingResult<()> {
        let path = self.path_for(file_name)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write beside the target and rename so readers never see a partial document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(rule)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "Matching rule written");
        Ok(())
    }

    /// Source names are reported with a `.csv` extension.
    async fn list(&self) -> MappingResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            names.push(format!("{}.{}", stem, SOURCE_EXTENSION));
        }

        names.sort();
        Ok(names)
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{MappingRepository, MappingResult, MatchingRule};

/// Process-local repository, used by tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryMappingRepository {
    rules: RwLock<HashMap<String, MatchingRule>>,
}

impl InMemoryMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingRepository for InMemoryMappingRepository {
    async fn get(&self, file_name: &str) -> MappingResult<Option<MatchingRule>> {
        Ok(self.rules.read().await.get(file_name).cloned())
    }

    async fn put(&self, file_name: &str, rule: &MatchingRule) -> MappingResult<()> {
        self.rules
            .write()
            .await
            .insert(file_name.to_string(), rule.clone());
        Ok(())
    }

    async fn list(&self) -> MappingResult<Vec<String>> {
        let mut names: Vec<String> = self.rules.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

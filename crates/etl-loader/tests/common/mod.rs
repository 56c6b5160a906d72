//! Shared fixtures: in-memory object store and warehouse

#![allow(dead_code)]

use async_trait::async_trait;
use etl_common::Entity;
use etl_loader::error::{IngestError, IngestResult};
use etl_loader::ingest::lister::ObjectSource;
use etl_loader::ingest::load_log::LoadLogEntry;
use etl_loader::ingest::records::RecordSet;
use etl_loader::ingest::staging::staging_table_name;
use etl_loader::ingest::views::{group_staging_tables, StagingView};
use etl_loader::ingest::warehouse::Warehouse;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

pub const PRODUCTS_CSV: &str = "\
id;deleted;releasedversion;productcode;productname;energy;consumptiontype;modificationdate
1;0;v1;P-1;Basic;electricity;household;2021-01-05 10:00:00
2;0;v1;P-2;Green;electricity;business;2021-01-06 11:00:00
";

pub const PRICES_CSV: &str = "\
id,productid,pricecomponentid,pricecomponent,price,unit,valid_from,valid_until,modificationdate
10,1,1,base,9.90,EUR/month,2021-01-01,2021-12-31,2021-01-05
11,1,2,energy,0.31,EUR/kWh,2021-01-01,,2021-01-05
12,2,2,energy,0.29,EUR/kWh,2021-01-01,,2021-01-06
";

/// Prices export whose `productid` column arrives as `ProductID`
pub const PRICES_RENAMED_CSV: &str = "\
id;ProductID;pricecomponentid;pricecomponent;price;unit;valid_from;valid_until;modificationdate
20;2;1;base;12.00;EUR/month;2021-02-01;;2021-02-01
";

#[derive(Default)]
pub struct MemoryObjectSource {
    objects: BTreeMap<String, Vec<u8>>,
    unreachable: bool,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn with_object(mut self, key: &str, content: &str) -> Self {
        self.objects
            .insert(key.to_string(), content.as_bytes().to_vec());
        self
    }
}

#[async_trait]
impl ObjectSource for MemoryObjectSource {
    async fn probe(&self, bucket: &str) -> IngestResult<()> {
        if self.unreachable {
            return Err(IngestError::Connectivity(format!(
                "Bucket '{}' is not reachable",
                bucket
            )));
        }
        Ok(())
    }

    async fn list_keys(&self, _bucket: &str) -> IngestResult<Vec<String>> {
        Ok(self.objects.keys().cloned().collect())
    }

    async fn download_to(&self, _bucket: &str, key: &str, dest: &Path) -> IngestResult<()> {
        let content = self
            .objects
            .get(key)
            .ok_or_else(|| IngestError::Connectivity(format!("No such key {}", key)))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, content).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWarehouse {
    pub tables: Mutex<BTreeMap<String, RecordSet>>,
    pub log: Mutex<Vec<LoadLogEntry>>,
    pub fail_writes: bool,
    pub unhealthy: bool,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }

    pub fn table(&self, name: &str) -> Option<RecordSet> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn log_entries(&self) -> Vec<LoadLogEntry> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn health_check(&self) -> IngestResult<()> {
        if self.unhealthy {
            return Err(IngestError::Connectivity("database is down".to_string()));
        }
        Ok(())
    }

    async fn write_staging(
        &self,
        records: &RecordSet,
        entity: Entity,
        source_file: &str,
        load_id: &str,
    ) -> IngestResult<LoadLogEntry> {
        if self.fail_writes {
            return Err(IngestError::Connectivity("database is down".to_string()));
        }

        let table = staging_table_name(source_file, load_id)?;
        self.tables.lock().unwrap().insert(table, records.clone());

        let entry = LoadLogEntry::success(load_id, entity.as_str(), source_file, records.row_count());
        self.log.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn append_log(&self, entry: &LoadLogEntry) -> IngestResult<()> {
        self.log.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn consolidate(&self, load_id: &str) -> IngestResult<Vec<StagingView>> {
        let suffix = format!("_staging_{}", load_id);
        let tables: Vec<String> = self
            .table_names()
            .into_iter()
            .filter(|t| t.ends_with(&suffix))
            .collect();

        Ok(group_staging_tables(&tables)?
            .into_iter()
            .map(|(entity, source_tables)| StagingView {
                entity,
                schema: "staging".to_string(),
                name: entity.view_name(),
                source_tables,
            })
            .collect())
    }
}

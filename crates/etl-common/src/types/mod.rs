//! Common types used across the ETL workspace

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

// ============================================================================
// Column Types
// ============================================================================

/// Canonical PostgreSQL type a staging column is cast to when consolidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Text,
    Numeric { precision: u8, scale: u8 },
    Timestamp,
}

impl ColumnType {
    /// SQL spelling used in `::type` casts
    pub fn sql_name(&self) -> String {
        match self {
            ColumnType::SmallInt => "smallint".to_string(),
            ColumnType::Integer => "int".to_string(),
            ColumnType::BigInt => "bigint".to_string(),
            ColumnType::Text => "text".to_string(),
            ColumnType::Numeric { precision, scale } => format!("numeric({},{})", precision, scale),
            ColumnType::Timestamp => "timestamp".to_string(),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql_name())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// One of the fixed domain record types delivered as CSV exports.
///
/// Variant order is the processing order of a load batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Products,
    Prices,
    Contracts,
}

const PRODUCTS_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::BigInt),
    ("deleted", ColumnType::SmallInt),
    ("releasedversion", ColumnType::Text),
    ("productcode", ColumnType::Text),
    ("productname", ColumnType::Text),
    ("energy", ColumnType::Text),
    ("consumptiontype", ColumnType::Text),
    ("modificationdate", ColumnType::Timestamp),
];

const PRICES_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::BigInt),
    ("productid", ColumnType::Integer),
    ("pricecomponentid", ColumnType::Integer),
    ("pricecomponent", ColumnType::Text),
    ("price", ColumnType::Numeric { precision: 38, scale: 10 }),
    ("unit", ColumnType::Text),
    ("valid_from", ColumnType::Timestamp),
    ("valid_until", ColumnType::Timestamp),
    ("modificationdate", ColumnType::Timestamp),
];

const CONTRACTS_COLUMNS: &[(&str, ColumnType)] = &[
    ("id", ColumnType::BigInt),
    ("type", ColumnType::Text),
    ("energy", ColumnType::Text),
    ("usage", ColumnType::Integer),
    ("usagenet", ColumnType::Integer),
    ("createdat", ColumnType::Timestamp),
    ("startdate", ColumnType::Timestamp),
    ("enddate", ColumnType::Timestamp),
    ("filingdatecancellation", ColumnType::Timestamp),
    ("cancellationreason", ColumnType::Text),
    ("city", ColumnType::Text),
    ("status", ColumnType::Text),
    ("productid", ColumnType::Integer),
    ("modificationdate", ColumnType::Timestamp),
];

impl Entity {
    /// All entities in batch processing order
    pub const ALL: [Entity; 3] = [Entity::Products, Entity::Prices, Entity::Contracts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Products => "products",
            Entity::Prices => "prices",
            Entity::Contracts => "contracts",
        }
    }

    /// Canonical schema: column name and cast type, in view column order
    pub fn columns(&self) -> &'static [(&'static str, ColumnType)] {
        match self {
            Entity::Products => PRODUCTS_COLUMNS,
            Entity::Prices => PRICES_COLUMNS,
            Entity::Contracts => CONTRACTS_COLUMNS,
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns().iter().map(|(name, _)| *name)
    }

    /// Name of the consolidated view for this entity
    pub fn view_name(&self) -> String {
        format!("{}_staging_view", self.as_str())
    }

    /// Parse a comma-separated entity list, preserving first-seen order and dropping repeats
    pub fn parse_list(list: &str) -> crate::Result<Vec<Entity>> {
        let mut entities = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let entity: Entity = part.parse()?;
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

impl std::str::FromStr for Entity {
    type Err = EtlError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "products" => Ok(Entity::Products),
            "prices" => Ok(Entity::Prices),
            "contracts" => Ok(Entity::Contracts),
            other => Err(EtlError::UnknownEntity(other.to_string())),
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Load Log Types
// ============================================================================

/// Outcome recorded in the load log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadStatus {
    Success,
    Failed,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Success => "SUCCESS",
            LoadStatus::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for LoadStatus {
    type Err = EtlError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(LoadStatus::Success),
            "FAILED" => Ok(LoadStatus::Failed),
            other => Err(EtlError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

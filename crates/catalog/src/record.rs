use serde::{Deserialize, Serialize};

/// One known tag in the local catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
}

impl CatalogRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: String::new(),
            unit: None,
            plant: None,
            equipment: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_plant(mut self, plant: impl Into<String>) -> Self {
        self.plant = Some(plant.into());
        self
    }

    pub fn with_equipment(mut self, equipment: impl Into<String>) -> Self {
        self.equipment = Some(equipment.into());
        self
    }
}

/// Accepted on-disk shapes: a bare array or `{"tags": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CatalogFile {
    List(Vec<CatalogRecord>),
    Wrapped { tags: Vec<CatalogRecord> },
}

impl CatalogFile {
    pub(crate) fn into_records(self) -> Vec<CatalogRecord> {
        match self {
            CatalogFile::List(records) => records,
            CatalogFile::Wrapped { tags } => tags,
        }
    }
}

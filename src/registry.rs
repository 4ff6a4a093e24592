use std::collections::hash_map::Entry;
use std::collections::HashMap;

use polars::prelude::*;

use crate::error::MfaError;
use crate::schema::registry;

/// One reporting area (country or customs region).
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub code: i64,
    pub name: String,
}

/// Ordered list of reporting areas. An area's index is its position, and
/// every matrix built against the registry is indexed the same way.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    areas: Vec<Area>,
    by_code: HashMap<i64, usize>,
    by_name: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn new(areas: Vec<Area>) -> Result<Self, MfaError> {
        let mut by_code = HashMap::with_capacity(areas.len());
        let mut by_name = HashMap::with_capacity(areas.len());
        for (index, area) in areas.iter().enumerate() {
            if by_code.insert(area.code, index).is_some() {
                return Err(MfaError::InvalidData(format!(
                    "duplicate area code {} in registry",
                    area.code
                )));
            }
            match by_name.entry(area.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(index);
                }
                Entry::Occupied(first) => {
                    tracing::warn!(
                        name = %area.name,
                        kept_code = areas[*first.get()].code,
                        ignored_code = area.code,
                        "duplicate area name in registry, name lookups use the first entry"
                    );
                }
            }
        }
        Ok(Self {
            areas,
            by_code,
            by_name,
        })
    }

    /// Build from a registry table loaded as strings.
    ///
    /// Required columns: area_code, area_name
    pub fn from_frame(df: &DataFrame) -> Result<Self, MfaError> {
        let codes = df
            .column(registry::AREA_CODE)
            .map_err(|_| MfaError::MissingColumn(registry::AREA_CODE.into()))?
            .str()?;
        let names = df
            .column(registry::AREA_NAME)
            .map_err(|_| MfaError::MissingColumn(registry::AREA_NAME.into()))?
            .str()?;

        let mut areas = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let raw = codes
                .get(i)
                .ok_or_else(|| MfaError::InvalidData(format!("Null area_code at row {i}")))?;
            let code = raw.trim().parse::<i64>().map_err(|_| {
                MfaError::InvalidData(format!("Invalid area_code '{raw}' at row {i}"))
            })?;
            let name = names.get(i).unwrap_or_default().trim().to_string();
            areas.push(Area { code, name });
        }
        Self::new(areas)
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    pub fn area(&self, index: usize) -> Option<&Area> {
        self.areas.get(index)
    }

    pub fn name(&self, index: usize) -> &str {
        self.areas
            .get(index)
            .map(|a| a.name.as_str())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.areas.iter().map(|a| a.name.clone()).collect()
    }

    pub fn index_of_code(&self, code: i64) -> Option<usize> {
        self.by_code.get(&code).copied()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name.trim()).copied()
    }

    /// Registry as a typed table: area_code (i64), area_name, area_index (i64).
    pub fn to_frame(&self) -> Result<DataFrame, MfaError> {
        let codes: Vec<i64> = self.areas.iter().map(|a| a.code).collect();
        let names: Vec<&str> = self.areas.iter().map(|a| a.name.as_str()).collect();
        let indices: Vec<i64> = (0..self.areas.len() as i64).collect();
        let df = DataFrame::new(vec![
            Column::new(registry::AREA_CODE.into(), &codes),
            Column::new(registry::AREA_NAME.into(), &names),
            Column::new(registry::AREA_INDEX.into(), &indices),
        ])?;
        Ok(df)
    }
}

//! Unit-cell structures in the pymatgen dictionary layout.
//!
//! Only the lattice and site list are interpreted; every other key is kept
//! so a structure can be written back out unchanged.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructureError {
    #[error("cannot read structure file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid structure json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("structure document has no structure entry")]
    Empty,
}

/// Crystal structure as serialized by pymatgen (`Structure.as_dict()`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    pub matrix: [[f64; 3]; 3],
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub species: Vec<SpeciesOccupancy>,
    pub abc: [f64; 3],
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesOccupancy {
    pub element: String,
    #[serde(default = "full_occupancy")]
    pub occu: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn full_occupancy() -> f64 {
    1.0
}

impl Structure {
    /// Load a structure from a JSON file.
    ///
    /// Accepts a bare structure dictionary, `{"structure": {...}}`, or a
    /// Materials Project response envelope (`{"data": [{"structure": ...}]}`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StructureError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| StructureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, StructureError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, StructureError> {
        let inner = match value {
            Value::Object(mut map) if map.contains_key("data") => {
                match map.remove("data") {
                    Some(Value::Array(entries)) => entries
                        .into_iter()
                        .next()
                        .and_then(|mut e| e.get_mut("structure").map(Value::take))
                        .ok_or(StructureError::Empty)?,
                    _ => return Err(StructureError::Empty),
                }
            }
            Value::Object(mut map) if !map.contains_key("sites") && map.contains_key("structure") => {
                map.remove("structure").ok_or(StructureError::Empty)?
            }
            other => other,
        };
        Ok(serde_json::from_value(inner)?)
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    /// Amount of each element, summed over site occupancies.
    pub fn composition(&self) -> BTreeMap<String, f64> {
        let mut comp = BTreeMap::new();
        for site in &self.sites {
            for sp in &site.species {
                *comp.entry(sp.element.clone()).or_insert(0.0) += sp.occu;
            }
        }
        comp
    }

    /// Alphabetical formula, e.g. `Al1 Ni3`.
    pub fn formula(&self) -> String {
        self.composition()
            .iter()
            .map(|(el, amt)| {
                if (amt - amt.round()).abs() < 1e-8 {
                    format!("{}{}", el, amt.round() as i64)
                } else {
                    format!("{}{:.3}", el, amt)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

//! Calculation folder naming.
//!
//! Every calculation lives in its own folder whose name carries the defect
//! metadata, e.g. `antisite_2_mult-3_sitespecie-Al_subspecie-Ni`.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

lazy_static::lazy_static! {
    static ref ELEMENT_SYMBOL: regex::Regex = regex::Regex::new(r"^[A-Z][a-z]{0,2}$").unwrap();
}

/// Name of the reference (perfect supercell) folder.
pub const BULK_FOLDER: &str = "bulk";

/// Errors raised while reading metadata out of a folder name.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FolderNameError {
    #[error("folder {folder:?}: missing field {field}")]
    MissingField { folder: String, field: &'static str },
    #[error("folder {folder:?}: field {field} has no value in {raw:?}")]
    MissingValue {
        folder: String,
        field: &'static str,
        raw: String,
    },
    #[error("folder {folder:?}: {field} {raw:?} is not a non-negative integer")]
    InvalidNumber {
        folder: String,
        field: &'static str,
        raw: String,
    },
    #[error("folder {folder:?}: {raw:?} is not an element symbol")]
    InvalidElement { folder: String, raw: String },
}

/// Kind of calculation a folder holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefectKind {
    Bulk,
    Vacancy,
    Antisite,
    Solute,
}

impl DefectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectKind::Bulk => "bulk",
            DefectKind::Vacancy => "vacancy",
            DefectKind::Antisite => "antisite",
            DefectKind::Solute => "solute",
        }
    }

    /// Whether folders of this kind carry a `subspecie-` field.
    pub fn has_substitution(&self) -> bool {
        matches!(self, DefectKind::Antisite | DefectKind::Solute)
    }
}

impl std::fmt::Display for DefectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata of a single point-defect calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectSite {
    pub kind: DefectKind,
    pub site_index: usize,
    pub site_multiplicity: usize,
    pub site_specie: String,
    pub substitution_specie: Option<String>,
}

impl DefectSite {
    /// Format the folder name this site would be stored under.
    pub fn folder_name(&self) -> String {
        let mut name = format!(
            "{}_{}_mult-{}_sitespecie-{}",
            self.kind, self.site_index, self.site_multiplicity, self.site_specie
        );
        if let Some(sub) = &self.substitution_specie {
            name.push_str("_subspecie-");
            name.push_str(sub);
        }
        name
    }
}

/// A parsed calculation folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefectFolder {
    Bulk,
    Defect(DefectSite),
}

impl DefectFolder {
    /// Parse a folder name.
    ///
    /// Returns `Ok(None)` when the name carries no recognised keyword.
    pub fn parse(name: &str) -> Result<Option<Self>, FolderNameError> {
        let fields: Vec<&str> = name.split('_').collect();

        if fields.contains(&BULK_FOLDER) {
            return Ok(Some(DefectFolder::Bulk));
        }

        let kind = if fields.contains(&"vacancy") {
            DefectKind::Vacancy
        } else if fields.contains(&"antisite") {
            DefectKind::Antisite
        } else if fields.contains(&"solute") {
            DefectKind::Solute
        } else {
            return Ok(None);
        };

        let field = |idx: usize, label: &'static str| {
            fields
                .get(idx)
                .copied()
                .ok_or_else(|| FolderNameError::MissingField {
                    folder: name.to_string(),
                    field: label,
                })
        };

        let site_index = parse_number(name, "site index", field(1, "site index")?)?;
        let site_multiplicity = parse_number(
            name,
            "multiplicity",
            field_value(name, "multiplicity", field(2, "multiplicity")?)?,
        )?;
        let site_specie =
            parse_element(name, field_value(name, "site specie", field(3, "site specie")?)?)?;
        let substitution_specie = if kind.has_substitution() {
            let raw = field(4, "substitution specie")?;
            Some(parse_element(
                name,
                field_value(name, "substitution specie", raw)?,
            )?)
        } else {
            None
        };

        Ok(Some(DefectFolder::Defect(DefectSite {
            kind,
            site_index,
            site_multiplicity,
            site_specie,
            substitution_specie,
        })))
    }

    pub fn kind(&self) -> DefectKind {
        match self {
            DefectFolder::Bulk => DefectKind::Bulk,
            DefectFolder::Defect(site) => site.kind,
        }
    }
}

/// Value part of a `key-value` field (everything after the first `-`).
fn field_value<'a>(
    folder: &str,
    field: &'static str,
    raw: &'a str,
) -> Result<&'a str, FolderNameError> {
    match raw.split_once('-') {
        Some((_, value)) if !value.is_empty() => Ok(value),
        _ => Err(FolderNameError::MissingValue {
            folder: folder.to_string(),
            field,
            raw: raw.to_string(),
        }),
    }
}

fn parse_number(folder: &str, field: &'static str, raw: &str) -> Result<usize, FolderNameError> {
    raw.parse().map_err(|_| FolderNameError::InvalidNumber {
        folder: folder.to_string(),
        field,
        raw: raw.to_string(),
    })
}

/// Whether `raw` looks like an element symbol (`Al`, `Ni`, `Uue`).
pub fn is_element_symbol(raw: &str) -> bool {
    ELEMENT_SYMBOL.is_match(raw)
}

fn parse_element(folder: &str, raw: &str) -> Result<String, FolderNameError> {
    if is_element_symbol(raw) {
        Ok(raw.to_string())
    } else {
        Err(FolderNameError::InvalidElement {
            folder: folder.to_string(),
            raw: raw.to_string(),
        })
    }
}

/// Folder name patterns for a vacancy/antisite run, in discovery order.
pub fn vac_antisite_patterns() -> Vec<String> {
    vec![
        "vacancy*".to_string(),
        "antisite*".to_string(),
        BULK_FOLDER.to_string(),
    ]
}

/// Folder name patterns for a solute run, in discovery order.
pub fn solute_patterns(solute: &str) -> Vec<String> {
    vec![
        format!("solute*subspecie-{}", solute),
        BULK_FOLDER.to_string(),
    ]
}

/// Compile folder name patterns into a glob set.
///
/// The index of each matching pattern is its discovery rank.
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bulk() {
        assert_eq!(DefectFolder::parse("bulk").unwrap(), Some(DefectFolder::Bulk));
    }

    #[test]
    fn test_parse_vacancy() {
        let folder = DefectFolder::parse("vacancy_3_mult-2_sitespecie-Al")
            .unwrap()
            .unwrap();
        assert_eq!(
            folder,
            DefectFolder::Defect(DefectSite {
                kind: DefectKind::Vacancy,
                site_index: 3,
                site_multiplicity: 2,
                site_specie: "Al".to_string(),
                substitution_specie: None,
            })
        );
    }

    #[test]
    fn test_parse_antisite_and_solute() {
        let antisite = DefectFolder::parse("antisite_1_mult-1_sitespecie-Ni_subspecie-Al")
            .unwrap()
            .unwrap();
        match antisite {
            DefectFolder::Defect(site) => {
                assert_eq!(site.kind, DefectKind::Antisite);
                assert_eq!(site.site_specie, "Ni");
                assert_eq!(site.substitution_specie.as_deref(), Some("Al"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let solute = DefectFolder::parse("solute_2_mult-6_sitespecie-Al_subspecie-Cu")
            .unwrap()
            .unwrap();
        assert_eq!(solute.kind(), DefectKind::Solute);
    }

    #[test]
    fn test_unrecognised_name_is_ignored() {
        assert_eq!(DefectFolder::parse("vacancyscan").unwrap(), None);
        assert_eq!(DefectFolder::parse("notes").unwrap(), None);
    }

    #[test]
    fn test_malformed_names() {
        assert!(matches!(
            DefectFolder::parse("vacancy_x_mult-1_sitespecie-Al"),
            Err(FolderNameError::InvalidNumber { .. })
        ));
        assert!(matches!(
            DefectFolder::parse("vacancy_1_mult-1"),
            Err(FolderNameError::MissingField { .. })
        ));
        assert!(matches!(
            DefectFolder::parse("antisite_1_mult-1_sitespecie-Ni"),
            Err(FolderNameError::MissingField { .. })
        ));
        assert!(matches!(
            DefectFolder::parse("vacancy_1_mult_sitespecie-Al"),
            Err(FolderNameError::MissingValue { .. })
        ));
        assert!(matches!(
            DefectFolder::parse("vacancy_1_mult-1_sitespecie-al"),
            Err(FolderNameError::InvalidElement { .. })
        ));
    }

    #[test]
    fn test_folder_name_inverts_parse() {
        let name = "solute_4_mult-12_sitespecie-Ti_subspecie-Nb";
        match DefectFolder::parse(name).unwrap().unwrap() {
            DefectFolder::Defect(site) => assert_eq!(site.folder_name(), name),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_solute_glob_only_matches_requested_solute() {
        let set = build_glob_set(&solute_patterns("Cu")).unwrap();
        assert_eq!(
            set.matches("solute_1_mult-1_sitespecie-Al_subspecie-Cu"),
            vec![0]
        );
        assert!(set
            .matches("solute_1_mult-1_sitespecie-Al_subspecie-Co")
            .is_empty());
        assert_eq!(set.matches("bulk"), vec![1]);
        assert!(set.matches("bulk_old").is_empty());
    }

    #[test]
    fn test_is_element_symbol() {
        for ok in ["Al", "Ni", "O", "Uue"] {
            assert!(is_element_symbol(ok), "{}", ok);
        }
        for bad in ["", "*", "cu", "CU", "Cu*", "../x", "Cu/..", "Nixx"] {
            assert!(!is_element_symbol(bad), "{}", bad);
        }
    }
}

//! Raw defect energies from a tree of VASP calculations.
//!
//! For a material `<mpid>` the calculations live in `<root>/<mpid>/`, one
//! folder per configuration (see [`crate::folder`]). Every folder must hold
//! a converged `vasprun.xml`; the first one that does not aborts the whole
//! material since a partial set of energies is of no use downstream.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::folder::{
    build_glob_set, is_element_symbol, solute_patterns, vac_antisite_patterns, DefectFolder,
    DefectKind, DefectSite, FolderNameError,
};
use crate::structure::Structure;
use crate::vasprun::{Vasprun, VasprunError};

pub const VASPRUN_FILE: &str = "vasprun.xml";

#[derive(Error, Debug)]
pub enum EnergyError {
    #[error("provide an mpid")]
    MissingMpid,
    #[error("provide a solute element")]
    MissingSolute,
    #[error("{0:?} is not an element symbol")]
    InvalidSolute(String),
    #[error("calculation directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("cannot scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("invalid folder pattern: {0}")]
    Pattern(#[from] globset::Error),
    #[error(transparent)]
    FolderName(#[from] FolderNameError),
    #[error("{folder}: vasprun.xml doesn't exist in the folder")]
    MissingVasprun { folder: String },
    #[error("{folder}: couldn't parse vasprun.xml: {source}")]
    Unparsable {
        folder: String,
        #[source]
        source: VasprunError,
    },
    #[error("{folder}: VASP calculation not converged (electronic: {electronic}, ionic: {ionic})")]
    NotConverged {
        folder: String,
        electronic: bool,
        ionic: bool,
    },
    #[error("{folder}: final energy is not a finite number")]
    NonFiniteEnergy { folder: String },
    #[error("no bulk calculation found")]
    MissingBulk,
    #[error("bulk calculation has no sites")]
    EmptyBulk,
    #[error("solute folders do not exist")]
    NoSolutes,
}

impl EnergyError {
    /// Whether the error means the calculations themselves are unusable,
    /// as opposed to bad input or an unreadable tree.
    pub fn is_incomplete_calculation(&self) -> bool {
        matches!(
            self,
            EnergyError::MissingVasprun { .. }
                | EnergyError::Unparsable { .. }
                | EnergyError::NotConverged { .. }
                | EnergyError::NonFiniteEnergy { .. }
                | EnergyError::MissingBulk
                | EnergyError::EmptyBulk
                | EnergyError::NoSolutes
        )
    }
}

/// Energy of one defect relative to the bulk supercell (eV).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectEnergy {
    pub site_index: usize,
    pub site_specie: String,
    pub energy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitution_specie: Option<String>,
    pub site_multiplicity: usize,
}

/// Result of a vacancy/antisite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDefectEnergies {
    pub structure: Structure,
    /// Bulk energy per unit cell
    pub e0: f64,
    pub vacancies: Vec<DefectEnergy>,
    pub antisites: Vec<DefectEnergy>,
}

/// Result of a solute run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoluteDefectEnergies {
    pub solutes: Vec<DefectEnergy>,
}

/// A discovered calculation folder.
#[derive(Debug, Clone)]
pub struct CalcFolder {
    pub name: String,
    pub path: PathBuf,
    pub folder: DefectFolder,
}

/// Energy and size of a finished calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalcResult {
    pub final_energy: f64,
    pub num_sites: usize,
}

/// Material ids are case-insensitive; folders use the lower-case form.
pub fn normalize_mpid(mpid: &str) -> String {
    mpid.trim().to_lowercase()
}

/// Find the folders in `dir` matching `patterns`.
///
/// Folders are ordered by the first pattern they match, then by name.
/// Names that match a pattern but carry no defect keyword are skipped.
pub fn discover_folders(dir: &Path, patterns: &[String]) -> Result<Vec<CalcFolder>, EnergyError> {
    if !dir.is_dir() {
        return Err(EnergyError::MissingDirectory(dir.to_path_buf()));
    }

    let globs = build_glob_set(patterns)?;
    let mut ranked = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(|source| EnergyError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let rank = match globs.matches(&name).into_iter().min() {
            Some(rank) => rank,
            None => continue,
        };
        match DefectFolder::parse(&name)? {
            Some(folder) => ranked.push((
                rank,
                CalcFolder {
                    name,
                    path: entry.path().to_path_buf(),
                    folder,
                },
            )),
            None => log::warn!("{}: no defect keyword in folder name, skipping", name),
        }
    }

    ranked.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name.cmp(&b.name)));
    Ok(ranked.into_iter().map(|(_, folder)| folder).collect())
}

/// Read and check the `vasprun.xml` of one folder.
pub fn load_calculation(folder: &CalcFolder) -> Result<CalcResult, EnergyError> {
    let file = folder.path.join(VASPRUN_FILE);
    if !file.is_file() {
        return Err(EnergyError::MissingVasprun {
            folder: folder.name.clone(),
        });
    }

    let run = Vasprun::from_file(&file).map_err(|source| EnergyError::Unparsable {
        folder: folder.name.clone(),
        source,
    })?;

    if !run.converged() {
        return Err(EnergyError::NotConverged {
            folder: folder.name.clone(),
            electronic: run.converged_electronic(),
            ionic: run.converged_ionic(),
        });
    }

    // overflowed fields (`*****`) parse to NaN
    let final_energy = run.final_energy();
    if !final_energy.is_finite() {
        return Err(EnergyError::NonFiniteEnergy {
            folder: folder.name.clone(),
        });
    }

    Ok(CalcResult {
        final_energy,
        num_sites: run.final_num_sites(),
    })
}

/// Energies gathered from one material's folders.
#[derive(Debug, Default)]
struct Collected {
    bulk: Option<CalcResult>,
    defects: Vec<(DefectSite, f64)>,
}

fn collect(dir: &Path, patterns: &[String]) -> Result<Collected, EnergyError> {
    let folders = discover_folders(dir, patterns)?;
    log::info!("{}: {} calculation folders", dir.display(), folders.len());

    let results: Vec<Result<CalcResult, EnergyError>> =
        folders.par_iter().map(load_calculation).collect();

    let mut collected = Collected::default();
    for (folder, result) in folders.into_iter().zip(results) {
        let calc = result?;
        log::info!(
            "{}: E = {:.6} eV, {} sites",
            folder.name,
            calc.final_energy,
            calc.num_sites
        );
        match folder.folder {
            DefectFolder::Bulk => collected.bulk = Some(calc),
            DefectFolder::Defect(site) => collected.defects.push((site, calc.final_energy)),
        }
    }

    Ok(collected)
}

/// Energies of the defects of `kind`, relative to the bulk, sorted by site.
fn relative_energies(
    defects: &[(DefectSite, f64)],
    kind: DefectKind,
    bulk_energy: f64,
) -> Vec<DefectEnergy> {
    let mut entries: Vec<DefectEnergy> = defects
        .iter()
        .filter(|(site, _)| site.kind == kind)
        .map(|(site, energy)| DefectEnergy {
            site_index: site.site_index,
            site_specie: site.site_specie.clone(),
            energy: energy - bulk_energy,
            substitution_specie: site.substitution_specie.clone(),
            site_multiplicity: site.site_multiplicity,
        })
        .collect();
    entries.sort_by_key(|e| e.site_index);
    entries
}

/// Vacancy and antisite energies of `<root>/<mpid>`.
///
/// `structure` is the unit cell; `e0` is the bulk supercell energy scaled
/// to it.
pub fn vac_antisite_def_parse_energy(
    root: &Path,
    mpid: &str,
    structure: Structure,
) -> Result<RawDefectEnergies, EnergyError> {
    let mpid = normalize_mpid(mpid);
    if mpid.is_empty() {
        return Err(EnergyError::MissingMpid);
    }

    let collected = collect(&root.join(&mpid), &vac_antisite_patterns())?;
    let bulk = collected.bulk.ok_or(EnergyError::MissingBulk)?;
    if bulk.num_sites == 0 {
        return Err(EnergyError::EmptyBulk);
    }
    log::info!("all calculations successful for {}", mpid);

    let e0 = bulk.final_energy / bulk.num_sites as f64 * structure.num_sites() as f64;
    let vacancies = relative_energies(&collected.defects, DefectKind::Vacancy, bulk.final_energy);
    let antisites = relative_energies(&collected.defects, DefectKind::Antisite, bulk.final_energy);

    Ok(RawDefectEnergies {
        structure,
        e0,
        vacancies,
        antisites,
    })
}

/// Solute substitution energies of `<root>/<mpid>` for element `solute`.
pub fn solute_def_parse_energy(
    root: &Path,
    mpid: &str,
    solute: &str,
) -> Result<SoluteDefectEnergies, EnergyError> {
    let mpid = normalize_mpid(mpid);
    if mpid.is_empty() {
        return Err(EnergyError::MissingMpid);
    }
    let solute = solute.trim();
    if solute.is_empty() {
        return Err(EnergyError::MissingSolute);
    }
    // the solute ends up in a glob and in the report file name
    if !is_element_symbol(solute) {
        return Err(EnergyError::InvalidSolute(solute.to_string()));
    }

    let collected = collect(&root.join(&mpid), &solute_patterns(solute))?;
    if !collected
        .defects
        .iter()
        .any(|(site, _)| site.kind == DefectKind::Solute)
    {
        return Err(EnergyError::NoSolutes);
    }
    let bulk = collected.bulk.ok_or(EnergyError::MissingBulk)?;
    log::info!("solute {} calculations successful for {}", solute, mpid);

    Ok(SoluteDefectEnergies {
        solutes: relative_energies(&collected.defects, DefectKind::Solute, bulk.final_energy),
    })
}

//! imdefects - raw point-defect energies for intermetallics.
//!
//! Reads VASP calculations laid out one folder per configuration under
//! `<root>/<mpid>/`, checks that each `vasprun.xml` is converged, and
//! reports vacancy, antisite, and solute substitution energies relative to
//! the bulk supercell.
//!
//! # Architecture
//!
//! - `folder`: metadata encoded in calculation folder names
//! - `vasprun`: streaming `vasprun.xml` reader
//! - `energy`: folder discovery and the energy pipeline
//! - `structure`: pymatgen-style unit-cell structures
//! - `mp`: Materials Project structure lookup with an on-disk cache
//! - `config`: YAML configuration
//! - `report`: output formatting (JSON, pretty)

pub mod cli;
pub mod config;
pub mod energy;
pub mod folder;
pub mod mp;
pub mod report;
pub mod structure;
pub mod vasprun;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use energy::{
    solute_def_parse_energy, vac_antisite_def_parse_energy, DefectEnergy, EnergyError,
    RawDefectEnergies, SoluteDefectEnergies,
};
pub use folder::{DefectFolder, DefectKind, DefectSite};
pub use mp::{MpClient, MpError};
pub use structure::Structure;
pub use vasprun::{Vasprun, VasprunError};

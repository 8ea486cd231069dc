//! Output formatting for defect energies.
//!
//! Two outputs are produced:
//! - JSON: the raw energy document keyed by material id, written to disk
//!   (and optionally echoed to stdout)
//! - Pretty: a colored terminal summary for human readability

use colored::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::energy::{DefectEnergy, RawDefectEnergies, SoluteDefectEnergies};
use crate::vasprun::Vasprun;

/// Report document: one entry per material id.
pub type EnergyReport<T> = BTreeMap<String, T>;

/// File name of a vacancy/antisite report.
pub fn vac_antisite_file_name(mpid: &str) -> String {
    format!("{}_raw_defect_energy.json", mpid)
}

/// File name of a solute report.
pub fn solute_file_name(mpid: &str, solute: &str) -> String {
    format!("{}_solute-{}_raw_defect_energy.json", mpid, solute)
}

pub fn build_report<T>(mpid: &str, energies: T) -> EnergyReport<T> {
    let mut report = BTreeMap::new();
    report.insert(mpid.to_string(), energies);
    report
}

/// Serialize with four-space indentation.
pub fn to_json_string<T: Serialize>(value: &T) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

/// Write a report into `dir`, creating the directory if needed.
pub fn write_json_file<T: Serialize>(
    dir: &Path,
    file_name: &str,
    report: &EnergyReport<T>,
) -> anyhow::Result<PathBuf> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    let path = dir.join(file_name);
    let json = to_json_string(report)?;
    fs::write(&path, json + "\n")?;
    Ok(path)
}

/// Print a report to stdout as JSON.
pub fn write_json<T: Serialize>(report: &EnergyReport<T>) -> anyhow::Result<()> {
    println!("{}", to_json_string(report)?);
    Ok(())
}

/// Print a vacancy/antisite summary.
pub fn write_pretty_vac_antisite(mpid: &str, energies: &RawDefectEnergies, written: &Path) {
    println!(
        "{} {} ({})",
        "Defect energies for".bold(),
        mpid.bold().cyan(),
        energies.structure.formula()
    );
    println!();
    println!(
        "  {} {:.6} eV ({} sites in unit cell)",
        "e0:".bold(),
        energies.e0,
        energies.structure.num_sites()
    );
    println!();

    write_section("Vacancies", &energies.vacancies);
    write_section("Antisites", &energies.antisites);

    println!("{} {}", "Written".green().bold(), written.display());
}

/// Print a solute summary.
pub fn write_pretty_solute(
    mpid: &str,
    solute: &str,
    energies: &SoluteDefectEnergies,
    written: &Path,
) {
    println!(
        "{} {} {} {}",
        "Solute".bold(),
        solute.bold().yellow(),
        "energies for".bold(),
        mpid.bold().cyan()
    );
    println!();

    write_section("Solutes", &energies.solutes);

    println!("{} {}", "Written".green().bold(), written.display());
}

fn write_section(title: &str, entries: &[DefectEnergy]) {
    println!("{} ({})", title.bold(), entries.len());
    if entries.is_empty() {
        println!("  {}", "none".dimmed());
        println!();
        return;
    }

    println!(
        "  {:>5}  {:>4}  {:<8} {:>14}",
        "site".dimmed(),
        "mult".dimmed(),
        "species".dimmed(),
        "energy (eV)".dimmed()
    );
    for entry in entries {
        println!(
            "  {:>5}  {:>4}  {:<8} {:>14}",
            entry.site_index,
            entry.site_multiplicity,
            species_label(entry),
            format_energy(entry.energy)
        );
    }
    println!();
}

/// `Al` for a vacancy, `Al->Ni` for a substitution.
fn species_label(entry: &DefectEnergy) -> String {
    match &entry.substitution_specie {
        Some(sub) => format!("{}->{}", entry.site_specie, sub),
        None => entry.site_specie.clone(),
    }
}

fn format_energy(energy: f64) -> ColoredString {
    let text = format!("{:.6}", energy);
    if energy < 0.0 {
        text.green()
    } else {
        text.normal()
    }
}

/// Print the summary of one `vasprun.xml`.
pub fn write_pretty_inspect(path: &Path, run: &Vasprun) {
    println!("{}", path.display().to_string().bold());
    if let Some(version) = &run.vasp_version {
        println!("  vasp version:   {}", version);
    }
    println!("  ionic steps:    {}", run.ionic_steps.len());
    println!(
        "  NELM/NSW:       {}/{}",
        run.parameters.nelm, run.parameters.nsw
    );
    println!("  sites:          {}", run.final_num_sites());
    println!("  final energy:   {:.8} eV", run.final_energy());

    let status = if run.converged() {
        "converged".green().bold()
    } else {
        let mut reasons = Vec::new();
        if !run.converged_electronic() {
            reasons.push("electronic");
        }
        if !run.converged_ionic() {
            reasons.push("ionic");
        }
        format!("not converged ({})", reasons.join(", ")).red().bold()
    };
    println!("  status:         {}", status);
    println!();
}

//! Streaming reader for VASP `vasprun.xml` files.
//!
//! Only the pieces needed to judge a finished calculation are kept: the
//! run parameters that bound the SCF and ionic loops, the energies of every
//! ionic and electronic step, and the number of sites per structure.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use xml::reader::{EventReader, XmlEvent};

/// Default `NELM` used by VASP when the parameter is absent.
pub const DEFAULT_NELM: i64 = 60;

/// Errors raised while reading a `vasprun.xml`.
#[derive(Error, Debug)]
pub enum VasprunError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed xml: {0}")]
    Xml(#[from] xml::reader::Error),
    #[error("invalid value {value:?} for {field}")]
    InvalidNumber { field: String, value: String },
    #[error("no ionic steps found")]
    NoIonicSteps,
    #[error("final ionic step has no {0}")]
    MissingEnergy(&'static str),
}

/// Energies reported for one ionic or electronic step (eV).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StepEnergy {
    pub e_fr_energy: Option<f64>,
    pub e_wo_entrp: Option<f64>,
    pub e_0_energy: Option<f64>,
}

impl StepEnergy {
    fn set(&mut self, name: &str, value: f64) {
        match name {
            "e_fr_energy" => self.e_fr_energy = Some(value),
            "e_wo_entrp" => self.e_wo_entrp = Some(value),
            "e_0_energy" => self.e_0_energy = Some(value),
            _ => {}
        }
    }
}

/// One `<calculation>` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IonicStep {
    pub energy: StepEnergy,
    pub electronic_steps: Vec<StepEnergy>,
    pub num_sites: Option<usize>,
}

/// Run parameters that decide convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Parameters {
    pub nelm: i64,
    pub nsw: i64,
    pub ibrion: i64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            nelm: DEFAULT_NELM,
            nsw: 0,
            ibrion: -1,
        }
    }
}

/// Parsed contents of a `vasprun.xml`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Vasprun {
    pub vasp_version: Option<String>,
    pub parameters: Parameters,
    pub ionic_steps: Vec<IonicStep>,
    /// Element of every atom, in POSCAR order.
    pub atoms: Vec<String>,
    pub initial_num_sites: Option<usize>,
    pub final_pos_num_sites: Option<usize>,
}

impl Vasprun {
    /// Parse a `vasprun.xml` from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, VasprunError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| VasprunError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse a `vasprun.xml` from an in-memory string.
    pub fn parse_str(content: &str) -> Result<Self, VasprunError> {
        Self::from_reader(content.as_bytes())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, VasprunError> {
        let mut builder = Builder::default();

        for event in EventReader::new(reader) {
            match event? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    let name_attr = attributes
                        .iter()
                        .find(|attr| attr.name.local_name == "name")
                        .map(|attr| attr.value.clone());
                    builder.start(name.local_name, name_attr);
                }
                XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                    builder.text.push_str(&text);
                }
                XmlEvent::EndElement { .. } => builder.end()?,
                XmlEvent::EndDocument => break,
                _ => {}
            }
        }

        builder.finish()
    }

    /// Final total energy (energy(sigma->0) of the last ionic step).
    ///
    /// Some VASP versions write `e_fr_energy` into the ionic `e_0_energy`
    /// slot; the last electronic step is used to recover the real value.
    /// NaN when there are no ionic steps.
    pub fn final_energy(&self) -> f64 {
        let last = match self.final_step() {
            Some(step) => step,
            None => return f64::NAN,
        };
        let total = last.energy.e_0_energy.unwrap_or(f64::NAN);

        let corrected = last.electronic_steps.last().and_then(|estep| {
            let diff = estep.e_0_energy? - estep.e_fr_energy?;
            Some(round8(diff + last.energy.e_fr_energy?))
        });

        match corrected {
            Some(fixed) if (total - fixed).abs() > 1e-7 => fixed,
            _ => total,
        }
    }

    /// Whether the last SCF loop finished before hitting `NELM`.
    pub fn converged_electronic(&self) -> bool {
        self.final_step()
            .map(|step| (step.electronic_steps.len() as i64) < self.parameters.nelm)
            .unwrap_or(false)
    }

    /// Whether the relaxation finished before hitting `NSW`.
    pub fn converged_ionic(&self) -> bool {
        let nsw = self.parameters.nsw;
        nsw <= 1 || (self.ionic_steps.len() as i64) < nsw
    }

    pub fn converged(&self) -> bool {
        self.converged_electronic() && self.converged_ionic()
    }

    /// Number of sites in the final structure.
    pub fn final_num_sites(&self) -> usize {
        self.final_step()
            .and_then(|step| step.num_sites)
            .or(self.final_pos_num_sites)
            .unwrap_or(self.atoms.len())
    }

    fn final_step(&self) -> Option<&IonicStep> {
        self.ionic_steps.last()
    }
}

fn round8(x: f64) -> f64 {
    (x * 1e8).round() / 1e8
}

/// VASP writes `*****` when a number overflows its format.
fn parse_float(field: &str, raw: &str) -> Result<f64, VasprunError> {
    let raw = raw.trim();
    if raw.contains('*') {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|_| VasprunError::InvalidNumber {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

fn parse_int(field: &str, raw: &str) -> Result<i64, VasprunError> {
    let raw = raw.trim();
    raw.parse().map_err(|_| VasprunError::InvalidNumber {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

#[derive(Debug)]
struct Node {
    name: String,
    name_attr: Option<String>,
}

/// Which structure the `<v>` rows currently being counted belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructureSlot {
    Ionic,
    Initial,
    Final,
    Other,
}

#[derive(Debug, Default)]
struct Builder {
    stack: Vec<Node>,
    text: String,
    run: Vasprun,
    step: Option<IonicStep>,
    param_nelm: Option<i64>,
    param_nsw: Option<i64>,
    param_ibrion: Option<i64>,
    incar_nelm: Option<i64>,
    incar_nsw: Option<i64>,
    incar_ibrion: Option<i64>,
    structure: Option<(StructureSlot, usize)>,
    rc_column: usize,
}

impl Builder {
    fn start(&mut self, name: String, name_attr: Option<String>) {
        self.text.clear();

        match name.as_str() {
            "calculation" if self.stack.len() == 1 => {
                self.step = Some(IonicStep::default());
            }
            "scstep" if self.step.is_some() => {
                if let Some(step) = self.step.as_mut() {
                    step.electronic_steps.push(StepEnergy::default());
                }
            }
            "structure" => {
                let slot = match name_attr.as_deref() {
                    Some("initialpos") => StructureSlot::Initial,
                    Some("finalpos") => StructureSlot::Final,
                    None if self.parent_is("calculation") => StructureSlot::Ionic,
                    _ => StructureSlot::Other,
                };
                self.structure = Some((slot, 0));
            }
            "rc" => self.rc_column = 0,
            _ => {}
        }

        self.stack.push(Node { name, name_attr });
    }

    fn end(&mut self) -> Result<(), VasprunError> {
        let node = match self.stack.pop() {
            Some(node) => node,
            None => return Ok(()),
        };
        let text = std::mem::take(&mut self.text);

        match node.name.as_str() {
            "i" => self.end_item(node.name_attr.as_deref(), &text)?,
            "v" => {
                if self.parent_is("varray") && self.parent_name_attr() == Some("positions") {
                    if let Some((_, count)) = self.structure.as_mut() {
                        *count += 1;
                    }
                }
            }
            "c" => {
                if self.parent_is("rc") && self.in_atom_array() && self.rc_column == 0 {
                    self.run.atoms.push(text.trim().to_string());
                }
                self.rc_column += 1;
            }
            "structure" => {
                if let Some((slot, count)) = self.structure.take() {
                    match slot {
                        StructureSlot::Ionic => {
                            if let Some(step) = self.step.as_mut() {
                                step.num_sites = Some(count);
                            }
                        }
                        StructureSlot::Initial => self.run.initial_num_sites = Some(count),
                        StructureSlot::Final => self.run.final_pos_num_sites = Some(count),
                        StructureSlot::Other => {}
                    }
                }
            }
            "calculation" if self.stack.len() == 1 => {
                if let Some(step) = self.step.take() {
                    log::debug!(
                        "ionic step {} with {} electronic steps",
                        self.run.ionic_steps.len() + 1,
                        step.electronic_steps.len()
                    );
                    self.run.ionic_steps.push(step);
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn end_item(&mut self, name: Option<&str>, text: &str) -> Result<(), VasprunError> {
        let name = match name {
            Some(name) => name,
            None => return Ok(()),
        };

        if self.parent_is("energy") {
            let value = parse_float(name, text)?;
            let in_scstep = self.ancestor_is(1, "scstep");
            let in_calculation = self.ancestor_is(1, "calculation");
            if let Some(step) = self.step.as_mut() {
                if in_scstep {
                    if let Some(estep) = step.electronic_steps.last_mut() {
                        estep.set(name, value);
                    }
                } else if in_calculation {
                    step.energy.set(name, value);
                }
            }
            return Ok(());
        }

        if self.parent_is("generator") && name == "version" {
            self.run.vasp_version = Some(text.trim().to_string());
            return Ok(());
        }

        let in_parameters = self.stack.iter().any(|n| n.name == "parameters");
        let in_incar = self.parent_is("incar");
        if !in_parameters && !in_incar {
            return Ok(());
        }

        let slot = match (name, in_parameters) {
            ("NELM", true) => &mut self.param_nelm,
            ("NSW", true) => &mut self.param_nsw,
            ("IBRION", true) => &mut self.param_ibrion,
            ("NELM", false) => &mut self.incar_nelm,
            ("NSW", false) => &mut self.incar_nsw,
            ("IBRION", false) => &mut self.incar_ibrion,
            _ => return Ok(()),
        };
        *slot = Some(parse_int(name, text)?);
        Ok(())
    }

    /// Whether the element `depth` levels above the current parent is `name`.
    fn ancestor_is(&self, depth: usize, name: &str) -> bool {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|idx| self.stack.get(idx))
            .map(|n| n.name == name)
            .unwrap_or(false)
    }

    fn parent_is(&self, name: &str) -> bool {
        self.ancestor_is(0, name)
    }

    fn parent_name_attr(&self) -> Option<&str> {
        self.stack.last().and_then(|n| n.name_attr.as_deref())
    }

    fn in_atom_array(&self) -> bool {
        self.stack
            .iter()
            .any(|n| n.name == "array" && n.name_attr.as_deref() == Some("atoms"))
            && self.stack.iter().any(|n| n.name == "atominfo")
    }

    fn finish(self) -> Result<Vasprun, VasprunError> {
        let mut run = self.run;
        let defaults = Parameters::default();
        run.parameters = Parameters {
            nelm: self.param_nelm.or(self.incar_nelm).unwrap_or(defaults.nelm),
            nsw: self.param_nsw.or(self.incar_nsw).unwrap_or(defaults.nsw),
            ibrion: self
                .param_ibrion
                .or(self.incar_ibrion)
                .unwrap_or(defaults.ibrion),
        };

        let last = run.ionic_steps.last().ok_or(VasprunError::NoIonicSteps)?;
        if last.energy.e_0_energy.is_none() {
            return Err(VasprunError::MissingEnergy("e_0_energy"));
        }

        Ok(run)
    }
}

//! Fixture builders shared by unit tests.

use std::path::Path;

pub const NIAL_STRUCTURE: &str = r#"{
    "@module": "pymatgen.core.structure",
    "@class": "Structure",
    "charge": 0,
    "lattice": {
        "matrix": [[2.88, 0.0, 0.0], [0.0, 2.88, 0.0], [0.0, 0.0, 2.88]],
        "pbc": [true, true, true]
    },
    "sites": [
        {"species": [{"element": "Ni", "occu": 1}], "abc": [0.0, 0.0, 0.0], "label": "Ni"},
        {"species": [{"element": "Al", "occu": 1}], "abc": [0.5, 0.5, 0.5], "label": "Al"}
    ]
}"#;

/// A single-point `vasprun.xml` with the given final energy and site count.
///
/// An unconverged run exhausts `NELM` electronic steps.
pub fn vasprun_xml(energy: f64, nsites: usize, converged: bool) -> String {
    let nelm = 60;
    let nscf = if converged { 12 } else { nelm };
    let e_fr = energy - 0.002;

    let mut out = format!(
        r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<modeling>
 <generator>
  <i name="program" type="string">vasp </i>
  <i name="version" type="string">5.4.4  </i>
 </generator>
 <atominfo>
  <atoms>{nsites:8} </atoms>
 </atominfo>
 <parameters>
  <separator name="electronic" >
   <i type="int" name="NELM">{nelm:6}</i>
  </separator>
  <separator name="ionic" >
   <i type="int" name="NSW">     0</i>
   <i type="int" name="IBRION">    -1</i>
  </separator>
 </parameters>
 <calculation>
"#
    );
    for _ in 0..nscf {
        out.push_str(&format!(
            "  <scstep>\n   <energy>\n    <i name=\"e_fr_energy\">{e_fr:18.8}</i>\n    <i name=\"e_wo_entrp\">{energy:18.8}</i>\n    <i name=\"e_0_energy\">{energy:18.8}</i>\n   </energy>\n  </scstep>\n"
        ));
    }
    out.push_str("  <structure>\n   <varray name=\"positions\" >\n");
    for i in 0..nsites {
        let x = i as f64 / nsites.max(1) as f64;
        out.push_str(&format!(
            "    <v>{x:17.8}{x:17.8}{x:17.8} </v>\n"
        ));
    }
    out.push_str("   </varray>\n  </structure>\n");
    out.push_str(&format!(
        "  <energy>\n   <i name=\"e_fr_energy\">{e_fr:18.8}</i>\n   <i name=\"e_wo_entrp\">{energy:18.8}</i>\n   <i name=\"e_0_energy\">{energy:18.8}</i>\n  </energy>\n"
    ));
    out.push_str(" </calculation>\n</modeling>\n");
    out
}

/// Write `<dir>/<name>/vasprun.xml`.
pub fn write_calc(dir: &Path, name: &str, energy: f64, nsites: usize, converged: bool) {
    let folder = dir.join(name);
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(
        folder.join("vasprun.xml"),
        vasprun_xml(energy, nsites, converged),
    )
    .unwrap();
}

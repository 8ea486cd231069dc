//! Command-line interface for imdefects.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::energy::{self, EnergyError};
use crate::mp::{MpClient, MpError, StructureCache};
use crate::report;
use crate::structure::Structure;
use crate::vasprun::Vasprun;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Raw point-defect energies for intermetallics from VASP calculations.
///
/// Calculations are read from `<root>/<mpid>/`, one folder per
/// configuration (`bulk`, `vacancy_*`, `antisite_*`, `solute_*`), and the
/// energies relative to the bulk supercell are written as JSON.
#[derive(Parser)]
#[command(name = "imdefects")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse vacancy and antisite defect energies
    #[command(visible_alias = "vac")]
    VacAntisite(VacAntisiteArgs),
    /// Parse solute substitution defect energies
    Solute(SoluteArgs),
    /// Summarize vasprun.xml files
    Inspect(InspectArgs),
}

/// Output format for the summary on stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Quiet,
}

/// Options shared by the energy commands.
#[derive(Args)]
pub struct CommonArgs {
    /// Materials Project id of the intermetallic structure (e.g. mp-1487)
    #[arg(long)]
    pub mpid: String,

    /// Directory holding the <mpid>/ calculation folders
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Directory to write the JSON report to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Summary format: pretty, json, or quiet
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Arguments for the vac-antisite command.
#[derive(Args)]
pub struct VacAntisiteArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Materials Project REST API key
    #[arg(long, alias = "mapi_key")]
    pub mapi_key: Option<String>,

    /// Read the unit-cell structure from a JSON file instead of the Materials Project
    #[arg(long)]
    pub structure: Option<PathBuf>,

    /// Do not use the structure cache
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the solute command.
#[derive(Args)]
pub struct SoluteArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Solute element
    #[arg(long)]
    pub solute: String,
}

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// vasprun.xml files, or folders containing one
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Set up the global logger from the verbosity flags.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    // a second init (e.g. from tests) is harmless
    let _ = builder.try_init();
}

/// Settings of an energy command after merging flags and config.
struct Resolved {
    config: Config,
    mpid: String,
    root: PathBuf,
    output_dir: PathBuf,
}

fn resolve(common: &CommonArgs) -> anyhow::Result<Resolved> {
    let cwd = std::env::current_dir()?;
    let mut config = Config::load(common.config.as_deref(), &cwd)?;
    if let Some(root) = &common.root {
        config.root = root.clone();
    }
    if let Some(dir) = &common.output_dir {
        config.output_dir = dir.clone();
    }
    config::validate(&config)?;

    Ok(Resolved {
        mpid: energy::normalize_mpid(&common.mpid),
        root: config.root.clone(),
        output_dir: config.output_dir.clone(),
        config,
    })
}

/// Map a pipeline failure to an exit code, reporting it on stderr.
fn energy_failure(mpid: &str, err: &EnergyError) -> i32 {
    if err.is_incomplete_calculation() {
        log::error!("{}. Abandoning parsing of energies for {}", err, mpid);
        EXIT_FAILED
    } else {
        eprintln!("Error: {}", err);
        EXIT_ERROR
    }
}

/// Load the unit-cell structure from a file or the Materials Project.
fn load_structure(
    args: &VacAntisiteArgs,
    config: &Config,
    mpid: &str,
) -> anyhow::Result<Structure> {
    if let Some(path) = &args.structure {
        log::info!("reading structure from {}", path.display());
        return Ok(Structure::from_file(path)?);
    }

    let api_key = config
        .resolve_api_key(args.mapi_key.as_deref())
        .ok_or(MpError::MissingApiKey)?;

    let mut client = MpClient::new(config, api_key)?;
    if !args.no_cache {
        client = client.with_cache(StructureCache::new(config.cache_ttl_hours));
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let structure = runtime.block_on(client.fetch_structure(mpid))?;
    Ok(structure)
}

/// Run the vac-antisite command.
pub fn run_vac_antisite(args: &VacAntisiteArgs) -> anyhow::Result<i32> {
    let resolved = resolve(&args.common)?;
    let mpid = resolved.mpid.as_str();
    if mpid.is_empty() {
        eprintln!("Error: {}", EnergyError::MissingMpid);
        return Ok(EXIT_ERROR);
    }

    let structure = match load_structure(args, &resolved.config, mpid) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: cannot get structure of {}: {}", mpid, e);
            return Ok(EXIT_ERROR);
        }
    };

    let parsed = energy::vac_antisite_def_parse_energy(&resolved.root, mpid, structure);
    let energies = match parsed {
        Ok(e) => e,
        Err(e) => return Ok(energy_failure(mpid, &e)),
    };

    let file_name = report::vac_antisite_file_name(mpid);
    let report_doc = report::build_report(mpid, energies);
    let written = report::write_json_file(&resolved.output_dir, &file_name, &report_doc)?;
    log::info!("wrote {}", written.display());

    match args.common.format {
        OutputFormat::Pretty => {
            report::write_pretty_vac_antisite(mpid, &report_doc[mpid], &written)
        }
        OutputFormat::Json => report::write_json(&report_doc)?,
        OutputFormat::Quiet => {}
    }

    Ok(EXIT_SUCCESS)
}

/// Run the solute command.
pub fn run_solute(args: &SoluteArgs) -> anyhow::Result<i32> {
    let resolved = resolve(&args.common)?;
    let mpid = resolved.mpid.as_str();
    let solute = args.solute.trim();

    let energies = match energy::solute_def_parse_energy(&resolved.root, mpid, solute) {
        Ok(e) => e,
        Err(e) => return Ok(energy_failure(mpid, &e)),
    };

    let file_name = report::solute_file_name(mpid, solute);
    let report_doc = report::build_report(mpid, energies);
    let written = report::write_json_file(&resolved.output_dir, &file_name, &report_doc)?;
    log::info!("wrote {}", written.display());

    match args.common.format {
        OutputFormat::Pretty => {
            report::write_pretty_solute(mpid, solute, &report_doc[mpid], &written)
        }
        OutputFormat::Json => report::write_json(&report_doc)?,
        OutputFormat::Quiet => {}
    }

    Ok(EXIT_SUCCESS)
}

/// Resolve a path argument to a vasprun.xml file.
fn vasprun_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(energy::VASPRUN_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Run the inspect command.
pub fn run_inspect(args: &InspectArgs) -> anyhow::Result<i32> {
    let mut code = EXIT_SUCCESS;

    for path in &args.paths {
        let file = vasprun_path(path);
        match Vasprun::from_file(&file) {
            Ok(run) => {
                report::write_pretty_inspect(&file, &run);
                if !run.converged() {
                    code = EXIT_FAILED;
                }
            }
            Err(e) => {
                eprintln!("Error: {}: {}", file.display(), e);
                code = EXIT_ERROR;
            }
        }
    }

    Ok(code)
}

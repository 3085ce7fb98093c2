//! Client job scripts: parsing and execution.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{EmsError, Result};

mod parser;
mod runner;

pub use parser::{Command, HELP_TEXT, ScriptParser, parse_line};
pub use runner::{EventBackend, JobRunner, JobSummary};

/// Extension a job script must carry.
pub const SCRIPT_EXTENSION: &str = "jobs";

/// Extension of the file that receives a script's SHOW/LIST output.
pub const OUTPUT_EXTENSION: &str = "out";

/// Output path for the job script at `script`: the same path with `.jobs`
/// replaced by `.out`.
pub fn output_path(script: &Path) -> Result<PathBuf> {
    let has_stem = script.file_stem().is_some_and(|stem| !stem.is_empty());
    if !has_stem || script.extension().and_then(|ext| ext.to_str()) != Some(SCRIPT_EXTENSION) {
        return Err(EmsError::ScriptPath(script.to_path_buf()));
    }
    Ok(script.with_extension(OUTPUT_EXTENSION))
}

/// Run the job script at `script` against `backend`, writing its output next
/// to it. Returns the output path and the run's counters.
pub fn run_script_file<B: EventBackend>(backend: &mut B, script: &Path, max_seats: usize) -> Result<(PathBuf, JobSummary)> {
    let out_path = output_path(script)?;
    let input = File::open(script)?;
    let output = File::create(&out_path)?;

    let mut parser = ScriptParser::new(BufReader::new(input), max_seats);
    let summary = JobRunner::new(backend, BufWriter::new(output)).run(&mut parser)?;
    info!("Ran {} into {}: {:?}", script.display(), out_path.display(), summary);
    Ok((out_path, summary))
}

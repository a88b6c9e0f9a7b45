// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Command-line interface code. More specific options for `apercal`
//! subcommands are contained in modules.
//!
//! All booleans must have `#[serde(default)]` annotated, and anything that
//! isn't a boolean must be optional. This allows all arguments to be optional
//! *and* usable in an arguments file.
//!
//! Only 3 things should be public in this module: `Apercal`, `Apercal::run`,
//! and `ApercalError`.

#[macro_use]
mod common;
mod continuum;
mod convert;
mod crosscal;
mod error;
mod line;
mod mosaic;
mod prepare;
mod selfcal;
mod split;
mod store;
mod thresholds;
mod transfer;

pub use error::ApercalError;

use std::path::PathBuf;

use clap::{AppSettings, Args, Parser, Subcommand};
use log::info;

use crate::PROGRESS_BARS;

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    about = r#"Calibration and imaging pipeline for Apertif (WSRT) beam data.
Each stage works on a base directory with one directory per beam, and records
what it did in a parameter store (param.json) in the base directory."#
)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_subcommands = true)]
#[clap(propagate_version = true)]
#[clap(infer_long_args = true)]
pub struct Apercal {
    #[clap(flatten)]
    global_opts: GlobalArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Don't draw progress bars.
    #[clap(long)]
    #[clap(global = true)]
    no_progress_bars: bool,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    #[clap(global = true)]
    verbosity: u8,

    /// Only verify that arguments were correctly ingested and print out
    /// high-level information.
    #[clap(long)]
    #[clap(global = true)]
    dry_run: bool,

    /// Save the input arguments into a new TOML file that can be used to
    /// reproduce this run.
    #[clap(long)]
    #[clap(global = true)]
    save_toml: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
#[clap(arg_required_else_help = true)]
enum Command {
    #[clap(about = "Fetch raw observations from the ALTA archive, or check they're on disk.")]
    Prepare(prepare::PrepareArgs),

    #[clap(about = "Copy (and optionally average) the raw measurement sets for calibration.")]
    Split(split::SplitArgs),

    #[clap(about = "Convert measurement sets to MIRIAD datasets via UVFITS.")]
    Convert(convert::ConvertArgs),

    #[clap(alias = "cross-calibrate")]
    #[clap(about = "Derive bandpass, gain and polarisation solutions from the calibrators and apply them.")]
    Crosscal(crosscal::CrosscalArgs),

    #[clap(alias = "self-calibrate")]
    #[clap(about = "Phase (and optionally amplitude) self-calibration of the target.")]
    Selfcal(selfcal::SelfcalArgs),

    #[clap(about = "Multi-frequency-synthesis continuum imaging of the self-calibrated target.")]
    Continuum(continuum::ContinuumArgs),

    #[clap(about = "Subtract the continuum and make dirty line cubes.")]
    Line(line::LineArgs),

    #[clap(about = "Combine the continuum images of the selected beams.")]
    Mosaic(mosaic::MosaicArgs),

    #[clap(about = "Apply the self-calibration to the target and export it as UVFITS.")]
    Transfer(transfer::TransferArgs),

    #[clap(about = "Print the threshold schedule of the imaging loop.")]
    Thresholds(thresholds::ThresholdsArgs),

    #[clap(about = "Show the statuses in the parameter store.")]
    Status(store::StatusArgs),

    #[clap(about = "Forget what a stage did, so it runs again.")]
    Reset(store::ResetArgs),
}

impl Apercal {
    pub fn run(self) -> Result<(), ApercalError> {
        // Set up logging.
        let GlobalArgs {
            verbosity,
            dry_run,
            no_progress_bars,
            save_toml,
        } = self.global_opts;
        setup_logging(verbosity)
            .map_err(|e| ApercalError::Generic(format!("Failed to initialise logging: {e}")))?;
        // Enable progress bars if the user didn't say "no progress bars".
        if !no_progress_bars {
            PROGRESS_BARS.store(true);
        }

        // Print the version of apercal and its build-time information.
        let sub_command = match &self.command {
            Command::Prepare(_) => "prepare",
            Command::Split(_) => "split",
            Command::Convert(_) => "convert",
            Command::Crosscal(_) => "crosscal",
            Command::Selfcal(_) => "selfcal",
            Command::Continuum(_) => "continuum",
            Command::Line(_) => "line",
            Command::Mosaic(_) => "mosaic",
            Command::Transfer(_) => "transfer",
            Command::Thresholds(_) => "thresholds",
            Command::Status(_) => "status",
            Command::Reset(_) => "reset",
        };
        info!("apercal {} {}", sub_command, env!("CARGO_PKG_VERSION"));
        display_build_info();

        macro_rules! merge_save {
            ($args:expr) => {{
                let args = $args.merge()?;
                if let Some(toml) = save_toml {
                    use std::{
                        fs::File,
                        io::{BufWriter, Write},
                    };

                    let mut f = BufWriter::new(File::create(toml)?);
                    let toml_str = toml::to_string(&args).map_err(|e| {
                        ApercalError::ArgFile(format!("Couldn't serialise arguments to toml: {e}"))
                    })?;
                    f.write_all(toml_str.as_bytes())?;
                }
                args
            }};
        }

        macro_rules! merge_save_run {
            ($args:expr) => {{
                merge_save!($args).run(dry_run)?;
            }};
        }

        match self.command {
            Command::Prepare(args) => merge_save_run!(args),
            Command::Split(args) => merge_save_run!(args),
            Command::Convert(args) => merge_save_run!(args),
            Command::Crosscal(args) => merge_save_run!(args),
            Command::Selfcal(args) => merge_save_run!(args),
            Command::Continuum(args) => merge_save_run!(args),
            Command::Line(args) => merge_save_run!(args),
            Command::Mosaic(args) => merge_save_run!(args),
            Command::Transfer(args) => merge_save_run!(args),
            Command::Thresholds(args) => merge_save_run!(args),

            // Store utilities.
            Command::Status(args) => args.run(dry_run)?,
            Command::Reset(args) => args.run(dry_run)?,
        }

        info!("apercal {} complete.", sub_command);
        Ok(())
    }
}

/// Activate a logger. All log messages are put onto `stdout`. `env_logger`
/// automatically only uses colours and fancy symbols if we're on a tty (e.g. a
/// terminal); piped output will be formatted sensibly. Source code lines are
/// displayed in log messages when verbosity >= 3.
fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.try_init()
}

/// Write many info-level log lines of how this executable was compiled.
fn display_build_info() {
    let dirty = match GIT_DIRTY {
        Some(true) => " (dirty)",
        _ => "",
    };
    match GIT_COMMIT_HASH_SHORT {
        Some(hash) => {
            info!("Compiled on git commit hash: {hash}{dirty}");
        }
        None => info!("Compiled on git commit hash: <no git info>"),
    }
    if let Some(hr) = GIT_HEAD_REF {
        info!("            git head ref: {}", hr);
    }
    info!("            {}", BUILT_TIME_UTC);
    info!("         with compiler {}", RUSTC_VERSION);
    info!("");
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! MIRIAD tasks.
//!
//! A MIRIAD task is run as `<task> key=value key=value ...`. Arguments are
//! handed straight to the process (no shell), so image expressions like
//! `<image>.gt.0.1` need no quoting.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use strum_macros::{Display, IntoStaticStr};

use super::{invalid, run_checked, Task, ToolCommand, ToolError, ToolOutput, ToolRunner};

/// A MIRIAD task and its parameters.
pub trait MiriadTask: Task {
    /// The `key=value` parameters, in the order they should be given.
    fn params(&self) -> Vec<(&'static str, String)>;

    /// The dataset this task creates, if any.
    fn output(&self) -> Option<&Path> {
        None
    }
}

/// Validate a task and turn it into a command.
pub fn command<T: MiriadTask + ?Sized>(
    task: &T,
    timeout: Duration,
) -> Result<ToolCommand, ToolError> {
    task.validate()?;
    Ok(ToolCommand::new(task.name())
        .args(task.params().into_iter().map(|(k, v)| format!("{k}={v}")))
        .timeout(timeout))
}

/// Run a task, failing if it exits badly or doesn't create its output.
pub fn run<T: MiriadTask + ?Sized>(
    runner: &dyn ToolRunner,
    task: &T,
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let cmd = command(task, timeout)?;
    let output = run_checked(runner, &cmd)?;
    if let Some(out) = task.output() {
        super::expect_output(task.name(), out)?;
    }
    Ok(output)
}

fn path_str(p: &Path) -> String {
    p.display().to_string()
}

fn check_path(task: &'static str, key: &str, p: &Path) -> Result<(), ToolError> {
    if p.as_os_str().is_empty() {
        return Err(invalid(task, format!("'{key}' is empty")));
    }
    Ok(())
}

fn check_positive(task: &'static str, key: &str, v: f64) -> Result<(), ToolError> {
    if !(v.is_finite() && v > 0.0) {
        return Err(invalid(task, format!("'{key}' must be positive, got {v}")));
    }
    Ok(())
}

/// MIRIAD writes a dataset as a directory and refuses to overwrite one. Remove
/// any stale output so a task can be re-run.
pub fn remove_dataset(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        Ok(())
    }
}

/// Make a dirty image and beam from visibilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Invert {
    pub vis: PathBuf,
    pub map: PathBuf,
    pub beam: PathBuf,
    pub imsize: u32,
    /// [arcsec]
    pub cell: f64,
    pub stokes: String,
    pub options: Vec<String>,
    pub robust: Option<f64>,
    /// e.g. `channel,10,1,1,1`
    pub line: Option<String>,
}

impl Invert {
    /// A multi-frequency-synthesis Stokes I image.
    pub fn mfs(vis: PathBuf, map: PathBuf, beam: PathBuf, imsize: u32, cell: f64) -> Invert {
        Invert {
            vis,
            map,
            beam,
            imsize,
            cell,
            stokes: "ii".to_string(),
            options: vec!["mfs".to_string(), "double".to_string()],
            robust: Some(0.0),
            line: None,
        }
    }
}

impl Task for Invert {
    fn name(&self) -> &'static str {
        "invert"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "map", &self.map)?;
        check_path(self.name(), "beam", &self.beam)?;
        if self.imsize == 0 {
            return Err(invalid(self.name(), "'imsize' must be at least 1"));
        }
        check_positive(self.name(), "cell", self.cell)
    }
}

impl MiriadTask for Invert {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![
            ("vis", path_str(&self.vis)),
            ("map", path_str(&self.map)),
            ("beam", path_str(&self.beam)),
            ("imsize", self.imsize.to_string()),
            ("cell", self.cell.to_string()),
            ("stokes", self.stokes.clone()),
        ];
        if !self.options.is_empty() {
            p.push(("options", self.options.join(",")));
        }
        if let Some(robust) = self.robust {
            p.push(("robust", robust.to_string()));
        }
        if let Some(line) = &self.line {
            p.push(("line", line.clone()));
        }
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.map)
    }
}

/// Image arithmetic. Here it's used to make masks.
#[derive(Debug, Clone, PartialEq)]
pub struct Maths {
    pub exp: Option<String>,
    pub mask: Option<String>,
    pub out: PathBuf,
}

impl Maths {
    /// A mask that includes every pixel of `image` brighter than
    /// `threshold`.
    pub fn threshold_mask<P: Into<PathBuf>>(image: &Path, threshold: f64, out: P) -> Maths {
        let image = path_str(image);
        Maths {
            exp: Some(format!("<{image}>")),
            mask: Some(format!("<{image}>.gt.{threshold}")),
            out: out.into(),
        }
    }
}

impl Task for Maths {
    fn name(&self) -> &'static str {
        "maths"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "out", &self.out)?;
        if self.exp.is_none() && self.mask.is_none() {
            return Err(invalid(self.name(), "one of 'exp' or 'mask' is required"));
        }
        Ok(())
    }
}

impl MiriadTask for Maths {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![];
        if let Some(exp) = &self.exp {
            p.push(("exp", exp.clone()));
        }
        if let Some(mask) = &self.mask {
            p.push(("mask", mask.clone()));
        }
        p.push(("out", path_str(&self.out)));
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

/// Multi-frequency clean.
#[derive(Debug, Clone, PartialEq)]
pub struct MfClean {
    pub map: PathBuf,
    pub beam: PathBuf,
    pub out: PathBuf,
    /// Stop cleaning at this flux level [Jy].
    pub cutoff: f64,
    pub niters: u32,
    /// Only clean inside this mask.
    pub mask: Option<PathBuf>,
    /// Continue from a previous model.
    pub model: Option<PathBuf>,
}

impl Task for MfClean {
    fn name(&self) -> &'static str {
        "mfclean"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "map", &self.map)?;
        check_path(self.name(), "beam", &self.beam)?;
        check_path(self.name(), "out", &self.out)?;
        check_positive(self.name(), "cutoff", self.cutoff)?;
        if self.niters == 0 {
            return Err(invalid(self.name(), "'niters' must be at least 1"));
        }
        Ok(())
    }
}

impl MiriadTask for MfClean {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![
            ("map", path_str(&self.map)),
            ("beam", path_str(&self.beam)),
            ("out", path_str(&self.out)),
            ("cutoff", format!("{:e}", self.cutoff)),
            ("niters", self.niters.to_string()),
        ];
        if let Some(mask) = &self.mask {
            p.push(("region", format!("mask({})", path_str(mask))));
        }
        if let Some(model) = &self.model {
            p.push(("model", path_str(model)));
        }
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum RestorMode {
    /// The restored image.
    Clean,
    /// The residual image.
    Residual,
}

/// Restore a clean model into an image (or make the residual).
#[derive(Debug, Clone, PartialEq)]
pub struct Restor {
    pub model: PathBuf,
    pub beam: PathBuf,
    pub map: PathBuf,
    pub out: PathBuf,
    pub mode: RestorMode,
}

impl Task for Restor {
    fn name(&self) -> &'static str {
        "restor"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "model", &self.model)?;
        check_path(self.name(), "beam", &self.beam)?;
        check_path(self.name(), "map", &self.map)?;
        check_path(self.name(), "out", &self.out)
    }
}

impl MiriadTask for Restor {
    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("model", path_str(&self.model)),
            ("beam", path_str(&self.beam)),
            ("map", path_str(&self.map)),
            ("out", path_str(&self.out)),
            ("mode", self.mode.to_string()),
        ]
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

/// Which gains a self-calibration solves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum SelfcalMode {
    Phase,
    Amp,
}

/// Self-calibrate visibilities against a model. The gains are written into
/// the visibility dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Selfcal {
    pub vis: PathBuf,
    pub model: PathBuf,
    /// Solution interval [minutes].
    pub interval: f64,
    pub mode: SelfcalMode,
    pub refant: Option<u32>,
    pub minants: Option<u32>,
    pub uvrange: Option<(f64, f64)>,
}

impl Task for Selfcal {
    fn name(&self) -> &'static str {
        "selfcal"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "model", &self.model)?;
        check_positive(self.name(), "interval", self.interval)?;
        if let Some((lo, hi)) = self.uvrange {
            if !(lo >= 0.0 && hi > lo) {
                return Err(invalid(
                    self.name(),
                    format!("'uvrange' must be increasing, got {lo},{hi}"),
                ));
            }
        }
        Ok(())
    }
}

impl MiriadTask for Selfcal {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![
            ("vis", path_str(&self.vis)),
            ("model", path_str(&self.model)),
            ("interval", self.interval.to_string()),
            ("options", format!("{},mfs", self.mode)),
        ];
        if let Some(refant) = self.refant {
            p.push(("refant", refant.to_string()));
        }
        if let Some(minants) = self.minants {
            p.push(("minants", minants.to_string()));
        }
        if let Some((lo, hi)) = self.uvrange {
            p.push(("select", format!("uvrange({lo},{hi})")));
        }
        p
    }
}

/// Average visibilities in time and/or frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct Uvaver {
    pub vis: PathBuf,
    pub out: PathBuf,
    pub line: Option<String>,
    /// [minutes]
    pub interval: Option<f64>,
}

impl Task for Uvaver {
    fn name(&self) -> &'static str {
        "uvaver"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "out", &self.out)?;
        if let Some(interval) = self.interval {
            check_positive(self.name(), "interval", interval)?;
        }
        Ok(())
    }
}

impl MiriadTask for Uvaver {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![("vis", path_str(&self.vis)), ("out", path_str(&self.out))];
        if let Some(line) = &self.line {
            p.push(("line", line.clone()));
        }
        if let Some(interval) = self.interval {
            p.push(("interval", interval.to_string()));
        }
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum FitsOp {
    /// UVFITS to MIRIAD visibilities.
    Uvin,
    /// MIRIAD visibilities to UVFITS.
    Uvout,
    /// FITS image to MIRIAD image.
    Xyin,
    /// MIRIAD image to FITS image.
    Xyout,
}

/// Convert between MIRIAD and FITS.
#[derive(Debug, Clone, PartialEq)]
pub struct Fits {
    pub input: PathBuf,
    pub out: PathBuf,
    pub op: FitsOp,
}

impl Task for Fits {
    fn name(&self) -> &'static str {
        "fits"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "in", &self.input)?;
        check_path(self.name(), "out", &self.out)
    }
}

impl MiriadTask for Fits {
    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("in", path_str(&self.input)),
            ("out", path_str(&self.out)),
            ("op", self.op.to_string()),
        ]
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

/// Copy visibilities, applying any calibration tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Uvcat {
    pub vis: PathBuf,
    pub out: PathBuf,
    pub options: Vec<String>,
}

impl Task for Uvcat {
    fn name(&self) -> &'static str {
        "uvcat"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "out", &self.out)
    }
}

impl MiriadTask for Uvcat {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![("vis", path_str(&self.vis)), ("out", path_str(&self.out))];
        if !self.options.is_empty() {
            p.push(("options", self.options.join(",")));
        }
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

/// Continuum subtraction by fitting a polynomial over line-free channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Uvlin {
    pub vis: PathBuf,
    pub out: PathBuf,
    /// Line-free channel ranges, e.g. `1,100,200,300`.
    pub chans: Option<String>,
    pub order: u32,
}

impl Task for Uvlin {
    fn name(&self) -> &'static str {
        "uvlin"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "out", &self.out)
    }
}

impl MiriadTask for Uvlin {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut p = vec![
            ("vis", path_str(&self.vis)),
            ("out", path_str(&self.out)),
            ("order", self.order.to_string()),
            ("mode", "line".to_string()),
        ];
        if let Some(chans) = &self.chans {
            p.push(("chans", chans.clone()));
        }
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

/// Linear mosaicking of images.
#[derive(Debug, Clone, PartialEq)]
pub struct Linmos {
    pub inputs: Vec<PathBuf>,
    pub out: PathBuf,
}

impl Task for Linmos {
    fn name(&self) -> &'static str {
        "linmos"
    }

    fn validate(&self) -> Result<(), ToolError> {
        if self.inputs.is_empty() {
            return Err(invalid(self.name(), "no input images"));
        }
        for input in &self.inputs {
            check_path(self.name(), "in", input)?;
        }
        check_path(self.name(), "out", &self.out)
    }
}

impl MiriadTask for Linmos {
    fn params(&self) -> Vec<(&'static str, String)> {
        let inputs: Vec<String> = self.inputs.iter().map(|p| path_str(p)).collect();
        vec![("in", inputs.join(",")), ("out", path_str(&self.out))]
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.out)
    }
}

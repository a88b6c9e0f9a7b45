// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! CASA tasks.
//!
//! CASA tasks are Python functions. Each task is rendered as a call expression
//! (e.g. `gaincal(vis='a.MS', caltable='a.G0ph', ...)`), the calls are
//! written to a script, and the script is run with
//! `casa --nologger --nogui -c <script>`.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use itertools::Itertools;

use super::{invalid, run_checked, Task, ToolCommand, ToolError, ToolOutput, ToolRunner};

/// A Python literal handed to a CASA task.
#[derive(Debug, Clone, PartialEq)]
pub enum CasaValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    StrList(Vec<String>),
    FloatList(Vec<f64>),
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn float(f: f64) -> String {
    // Python has no literal for these.
    if f.is_nan() {
        "float('nan')".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "float('inf')".to_string()
        } else {
            "float('-inf')".to_string()
        }
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl fmt::Display for CasaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CasaValue::Str(s) => write!(f, "{}", quote(s)),
            CasaValue::Bool(true) => write!(f, "True"),
            CasaValue::Bool(false) => write!(f, "False"),
            CasaValue::Int(i) => write!(f, "{i}"),
            CasaValue::Float(x) => write!(f, "{}", float(*x)),
            CasaValue::StrList(l) => write!(f, "[{}]", l.iter().map(|s| quote(s)).join(", ")),
            CasaValue::FloatList(l) => write!(f, "[{}]", l.iter().map(|&x| float(x)).join(", ")),
        }
    }
}

impl From<&str> for CasaValue {
    fn from(s: &str) -> Self {
        CasaValue::Str(s.to_string())
    }
}

impl From<String> for CasaValue {
    fn from(s: String) -> Self {
        CasaValue::Str(s)
    }
}

impl From<&Path> for CasaValue {
    fn from(p: &Path) -> Self {
        CasaValue::Str(p.display().to_string())
    }
}

impl From<&PathBuf> for CasaValue {
    fn from(p: &PathBuf) -> Self {
        CasaValue::from(p.as_path())
    }
}

impl From<bool> for CasaValue {
    fn from(b: bool) -> Self {
        CasaValue::Bool(b)
    }
}

impl From<i64> for CasaValue {
    fn from(i: i64) -> Self {
        CasaValue::Int(i)
    }
}

impl From<f64> for CasaValue {
    fn from(x: f64) -> Self {
        CasaValue::Float(x)
    }
}

impl From<Vec<String>> for CasaValue {
    fn from(l: Vec<String>) -> Self {
        CasaValue::StrList(l)
    }
}

impl From<Vec<f64>> for CasaValue {
    fn from(l: Vec<f64>) -> Self {
        CasaValue::FloatList(l)
    }
}

/// A CASA task and its parameters.
pub trait CasaTask: Task {
    fn params(&self) -> Vec<(&'static str, CasaValue)>;

    /// The table or dataset this task creates, if any.
    fn output(&self) -> Option<&Path> {
        None
    }
}

/// Validate a task and render it as a Python call.
pub fn render<T: CasaTask + ?Sized>(task: &T) -> Result<String, ToolError> {
    task.validate()?;
    Ok(format!(
        "{}({})",
        task.name(),
        task.params()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .join(", ")
    ))
}

/// A sequence of CASA calls run by a single CASA process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CasaScript {
    calls: Vec<String>,
    outputs: Vec<(&'static str, PathBuf)>,
}

impl CasaScript {
    pub fn new() -> CasaScript {
        CasaScript::default()
    }

    pub fn push<T: CasaTask + ?Sized>(&mut self, task: &T) -> Result<(), ToolError> {
        self.calls.push(render(task)?);
        if let Some(out) = task.output() {
            self.outputs.push((task.name(), out.to_path_buf()));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// The script text.
    pub fn render(&self) -> String {
        let mut s = self.calls.join("\n");
        s.push('\n');
        s
    }

    /// Write the script to `script_file` and run it, failing if CASA exits
    /// badly or any task didn't create its output.
    pub fn run(
        &self,
        runner: &dyn ToolRunner,
        script_file: &Path,
        timeout: Duration,
    ) -> Result<ToolOutput, ToolError> {
        if self.is_empty() {
            return Err(invalid("casa", "the script has no tasks"));
        }
        std::fs::write(script_file, self.render()).map_err(|e| ToolError::Script {
            file: script_file.to_path_buf(),
            err: e,
        })?;
        let cmd = ToolCommand::new("casa")
            .args(["--nologger", "--nogui", "-c"])
            .arg(script_file.display().to_string())
            .timeout(timeout);
        let output = run_checked(runner, &cmd)?;
        for (task, out) in &self.outputs {
            super::expect_output(task, out)?;
        }
        Ok(output)
    }
}

fn check_nonempty(task: &'static str, key: &str, v: &str) -> Result<(), ToolError> {
    if v.is_empty() {
        return Err(invalid(task, format!("'{key}' is empty")));
    }
    Ok(())
}

fn check_path(task: &'static str, key: &str, p: &Path) -> Result<(), ToolError> {
    if p.as_os_str().is_empty() {
        return Err(invalid(task, format!("'{key}' is empty")));
    }
    Ok(())
}

/// Prior calibration tables to apply on the fly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorTables {
    pub gaintable: Vec<PathBuf>,
    pub interp: Vec<String>,
}

impl PriorTables {
    pub fn push<P: Into<PathBuf>>(&mut self, table: P, interp: &str) {
        self.gaintable.push(table.into());
        self.interp.push(interp.to_string());
    }

    fn validate(&self, task: &'static str) -> Result<(), ToolError> {
        if self.gaintable.len() != self.interp.len() {
            return Err(invalid(
                task,
                format!(
                    "{} gain tables but {} interpolation modes",
                    self.gaintable.len(),
                    self.interp.len()
                ),
            ));
        }
        Ok(())
    }

    fn params(&self, p: &mut Vec<(&'static str, CasaValue)>) {
        if !self.gaintable.is_empty() {
            p.push((
                "gaintable",
                CasaValue::StrList(
                    self.gaintable
                        .iter()
                        .map(|t| t.display().to_string())
                        .collect(),
                ),
            ));
            p.push(("interp", CasaValue::StrList(self.interp.clone())));
        }
    }
}

/// Set the flux density model of a calibrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Setjy {
    pub vis: PathBuf,
    pub field: String,
    pub standard: String,
}

impl Setjy {
    pub fn new<P: Into<PathBuf>>(vis: P, field: &str) -> Setjy {
        Setjy {
            vis: vis.into(),
            field: field.to_string(),
            standard: "Perley-Butler 2017".to_string(),
        }
    }
}

impl Task for Setjy {
    fn name(&self) -> &'static str {
        "setjy"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_nonempty(self.name(), "standard", &self.standard)
    }
}

impl CasaTask for Setjy {
    fn params(&self) -> Vec<(&'static str, CasaValue)> {
        let mut p = vec![("vis", (&self.vis).into())];
        if !self.field.is_empty() {
            p.push(("field", self.field.as_str().into()));
        }
        p.push(("standard", self.standard.as_str().into()));
        p.push(("scalebychan", true.into()));
        p
    }
}

const GAINTYPES: [&str; 4] = ["G", "T", "K", "KCROSS"];
const CALMODES: [&str; 3] = ["p", "a", "ap"];

/// Solve for complex gains.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaincal {
    pub vis: PathBuf,
    pub caltable: PathBuf,
    pub field: String,
    pub gaintype: String,
    pub calmode: String,
    pub solint: String,
    pub refant: String,
    pub smodel: Option<Vec<f64>>,
    pub parang: bool,
    pub prior: PriorTables,
}

impl Task for Gaincal {
    fn name(&self) -> &'static str {
        "gaincal"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "caltable", &self.caltable)?;
        check_nonempty(self.name(), "solint", &self.solint)?;
        if !GAINTYPES.contains(&self.gaintype.as_str()) {
            return Err(invalid(
                self.name(),
                format!("unknown gaintype '{}'", self.gaintype),
            ));
        }
        if !CALMODES.contains(&self.calmode.as_str()) {
            return Err(invalid(
                self.name(),
                format!("unknown calmode '{}'", self.calmode),
            ));
        }
        if let Some(smodel) = &self.smodel {
            if smodel.len() != 4 {
                return Err(invalid(self.name(), "'smodel' needs IQUV"));
            }
        }
        self.prior.validate(self.name())
    }
}

impl CasaTask for Gaincal {
    fn params(&self) -> Vec<(&'static str, CasaValue)> {
        let mut p = vec![
            ("vis", (&self.vis).into()),
            ("caltable", (&self.caltable).into()),
            ("field", self.field.as_str().into()),
            ("gaintype", self.gaintype.as_str().into()),
            ("calmode", self.calmode.as_str().into()),
            ("solint", self.solint.as_str().into()),
            ("refant", self.refant.as_str().into()),
        ];
        if let Some(smodel) = &self.smodel {
            p.push(("smodel", smodel.clone().into()));
        }
        p.push(("parang", self.parang.into()));
        self.prior.params(&mut p);
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.caltable)
    }
}

/// Solve for the bandpass.
#[derive(Debug, Clone, PartialEq)]
pub struct Bandpass {
    pub vis: PathBuf,
    pub caltable: PathBuf,
    pub field: String,
    pub refant: String,
    pub solint: String,
    pub combine: String,
    pub solnorm: bool,
    pub fillgaps: i64,
    pub parang: bool,
    pub prior: PriorTables,
}

impl Task for Bandpass {
    fn name(&self) -> &'static str {
        "bandpass"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "caltable", &self.caltable)?;
        if self.fillgaps < 0 {
            return Err(invalid(self.name(), "'fillgaps' can't be negative"));
        }
        self.prior.validate(self.name())
    }
}

impl CasaTask for Bandpass {
    fn params(&self) -> Vec<(&'static str, CasaValue)> {
        let mut p = vec![
            ("vis", (&self.vis).into()),
            ("caltable", (&self.caltable).into()),
            ("field", self.field.as_str().into()),
            ("refant", self.refant.as_str().into()),
            ("solint", self.solint.as_str().into()),
            ("combine", self.combine.as_str().into()),
            ("solnorm", self.solnorm.into()),
            ("bandtype", "B".into()),
            ("fillgaps", self.fillgaps.into()),
            ("parang", self.parang.into()),
        ];
        self.prior.params(&mut p);
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.caltable)
    }
}

const POLTYPES: [&str; 4] = ["Df", "Df+QU", "Xf", "Xf+QU"];

/// Solve for polarisation leakage or angle.
#[derive(Debug, Clone, PartialEq)]
pub struct Polcal {
    pub vis: PathBuf,
    pub caltable: PathBuf,
    pub field: String,
    pub poltype: String,
    pub solint: String,
    pub combine: String,
    pub refant: String,
    pub smodel: Option<Vec<f64>>,
    pub prior: PriorTables,
}

impl Task for Polcal {
    fn name(&self) -> &'static str {
        "polcal"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "caltable", &self.caltable)?;
        if !POLTYPES.contains(&self.poltype.as_str()) {
            return Err(invalid(
                self.name(),
                format!("unknown poltype '{}'", self.poltype),
            ));
        }
        if let Some(smodel) = &self.smodel {
            if smodel.len() != 4 {
                return Err(invalid(self.name(), "'smodel' needs IQUV"));
            }
        }
        self.prior.validate(self.name())
    }
}

impl CasaTask for Polcal {
    fn params(&self) -> Vec<(&'static str, CasaValue)> {
        let mut p = vec![
            ("vis", (&self.vis).into()),
            ("caltable", (&self.caltable).into()),
            ("field", self.field.as_str().into()),
            ("poltype", self.poltype.as_str().into()),
            ("solint", self.solint.as_str().into()),
            ("combine", self.combine.as_str().into()),
            ("refant", self.refant.as_str().into()),
        ];
        if let Some(smodel) = &self.smodel {
            p.push(("smodel", smodel.clone().into()));
        }
        self.prior.params(&mut p);
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.caltable)
    }
}

/// Apply calibration tables to a dataset, filling its corrected data column.
#[derive(Debug, Clone, PartialEq)]
pub struct Applycal {
    pub vis: PathBuf,
    pub field: String,
    pub parang: bool,
    pub tables: PriorTables,
}

impl Task for Applycal {
    fn name(&self) -> &'static str {
        "applycal"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        if self.tables.gaintable.is_empty() {
            return Err(invalid(self.name(), "no tables to apply"));
        }
        self.tables.validate(self.name())
    }
}

impl CasaTask for Applycal {
    fn params(&self) -> Vec<(&'static str, CasaValue)> {
        let mut p = vec![("vis", (&self.vis).into())];
        if !self.field.is_empty() {
            p.push(("field", self.field.as_str().into()));
        }
        self.tables.params(&mut p);
        p.push(("parang", self.parang.into()));
        p.push(("flagbackup", false.into()));
        p
    }
}

/// Export a measurement set to UVFITS.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportUvfits {
    pub vis: PathBuf,
    pub fitsfile: PathBuf,
    pub datacolumn: String,
}

impl Task for ExportUvfits {
    fn name(&self) -> &'static str {
        "exportuvfits"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "fitsfile", &self.fitsfile)?;
        match self.datacolumn.as_str() {
            "data" | "corrected" | "model" => Ok(()),
            other => Err(invalid(
                self.name(),
                format!("unknown datacolumn '{other}'"),
            )),
        }
    }
}

impl CasaTask for ExportUvfits {
    fn params(&self) -> Vec<(&'static str, CasaValue)> {
        vec![
            ("vis", (&self.vis).into()),
            ("fitsfile", (&self.fitsfile).into()),
            ("datacolumn", self.datacolumn.as_str().into()),
            ("combinespw", true.into()),
            ("padwithflags", true.into()),
        ]
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.fitsfile)
    }
}

/// Select and average channels of a measurement set into a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Mstransform {
    pub vis: PathBuf,
    pub outputvis: PathBuf,
    pub datacolumn: String,
    pub spw: String,
    pub chanbin: Option<u32>,
}

impl Task for Mstransform {
    fn name(&self) -> &'static str {
        "mstransform"
    }

    fn validate(&self) -> Result<(), ToolError> {
        check_path(self.name(), "vis", &self.vis)?;
        check_path(self.name(), "outputvis", &self.outputvis)?;
        if self.chanbin == Some(0) {
            return Err(invalid(self.name(), "'chanbin' must be at least 1"));
        }
        Ok(())
    }
}

impl CasaTask for Mstransform {
    fn params(&self) -> Vec<(&'static str, CasaValue)> {
        let mut p = vec![
            ("vis", (&self.vis).into()),
            ("outputvis", (&self.outputvis).into()),
            ("datacolumn", self.datacolumn.as_str().into()),
        ];
        if !self.spw.is_empty() {
            p.push(("spw", self.spw.as_str().into()));
        }
        match self.chanbin {
            Some(chanbin) if chanbin > 1 => {
                p.push(("chanaverage", true.into()));
                p.push(("chanbin", i64::from(chanbin).into()));
            }
            _ => p.push(("chanaverage", false.into())),
        }
        p
    }

    fn output(&self) -> Option<&Path> {
        Some(&self.outputvis)
    }
}

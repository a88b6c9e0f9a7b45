// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cross-calibration with CASA.
//!
//! The flux calibrator gives the bandpass and complex gains. If a polarised
//! calibrator was observed, it gives the cross-hand delay and polarisation
//! angle, and the (unpolarised) flux calibrator gives the leakages. All tables
//! are then applied to every source.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::info;

use super::{
    beam_key, beam_progress, remove_stale, settle, PipelineParams, StageContext, StageError,
    StageSummary,
};
use crate::{
    paths::{Beam, Format, Subdir},
    status::StageStatus,
    tools::casa::{Applycal, Bandpass, CasaScript, CasaTask, Gaincal, Polcal, PriorTables, Setjy},
};

/// The flux-calibrator steps, in order.
const FLUXCAL_STEPS: [&str; 4] = ["setjy", "initial_phase", "bandpass", "gains"];

/// The polarisation steps, in order.
const POLCAL_STEPS: [&str; 3] = ["crosshand_delay", "leakage", "polangle"];

pub(crate) struct CrosscalParams {
    pub(crate) pipeline: PipelineParams,
    /// Reference antenna, e.g. "RT2".
    pub(crate) refant: String,
    /// The Stokes parameters of the polarised calibrator, used as its model
    /// for the cross-hand delay and polarisation angle.
    pub(crate) polcal_model: Vec<f64>,
    /// Fill bandpass gaps up to this many channels wide.
    pub(crate) fillgaps: i64,
}

/// The calibration tables of one beam.
struct Tables {
    initial_phase: PathBuf,
    bandpass: PathBuf,
    gains: PathBuf,
    crosshand_delay: Option<PathBuf>,
    leakage: Option<PathBuf>,
    polangle: Option<PathBuf>,
}

impl Tables {
    fn new(dir: &Path, fluxcal: &str, polcal: Option<&str>) -> Tables {
        let table = |name: &str, ext: &str| dir.join(format!("{name}.{ext}"));
        Tables {
            initial_phase: table(fluxcal, "G0ph"),
            bandpass: table(fluxcal, "Bscan"),
            gains: table(fluxcal, "G1ap"),
            crosshand_delay: polcal.map(|p| table(p, "Kcross")),
            leakage: polcal.map(|_| table(fluxcal, "Df")),
            polangle: polcal.map(|p| table(p, "Xf")),
        }
    }

    /// Tables applied to data: the bandpass and gains, plus the polarisation
    /// tables if they exist.
    fn to_apply(&self) -> PriorTables {
        let mut t = PriorTables::default();
        t.push(&self.bandpass, "nearest");
        t.push(&self.gains, "nearest");
        for table in [&self.crosshand_delay, &self.leakage, &self.polangle]
            .into_iter()
            .flatten()
        {
            t.push(table, "nearest");
        }
        t
    }
}

impl CrosscalParams {
    pub(crate) fn run(&self, ctx: StageContext) -> Result<StageSummary, StageError> {
        let mut summary = StageSummary::new("crosscal");
        let beams = &self.pipeline.beams;
        let pb = beam_progress(beams.len(), "Cross-calibrating");
        for &beam in beams.iter() {
            self.run_beam(ctx, beam, &mut summary)?;
            pb.inc(1);
        }
        pb.finish_with_message("Cross-calibrated");
        Ok(summary)
    }

    fn run_beam(
        &self,
        ctx: StageContext,
        beam: Beam,
        summary: &mut StageSummary,
    ) -> Result<(), StageError> {
        let PipelineParams {
            layout,
            sources,
            casa_timeout,
            ..
        } = &self.pipeline;
        let key = |step: &str| beam_key("crosscal", beam, step);
        let ms = |name: &str| layout.dataset(beam, Subdir::Crosscal, name, Format::Ms);

        let fluxcal = match sources.fluxcal.as_deref() {
            Some(f) if ms(f).exists() => f,
            other => {
                let reason = match other {
                    Some(f) => format!("{} doesn't exist", ms(f).display()),
                    None => "no flux calibrator was given".to_string(),
                };
                for step in FLUXCAL_STEPS.iter().chain(POLCAL_STEPS.iter()) {
                    summary.record(ctx.store, key(step), StageStatus::skipped(&reason))?;
                }
                for (role, _) in sources.named() {
                    summary.record(
                        ctx.store,
                        key(&format!("apply_{role}")),
                        StageStatus::skipped(&reason),
                    )?;
                }
                return Ok(());
            }
        };
        let polcal = sources.polcal.as_deref().filter(|p| {
            let exists = ms(p).exists();
            if !exists {
                info!(
                    "Beam {beam}: {} doesn't exist; not calibrating polarisation",
                    ms(p).display()
                );
            }
            exists
        });

        let dir = layout.stage_dir(beam, Subdir::Crosscal);
        let tables = Tables::new(&dir, fluxcal, polcal);
        let fluxcal_ms = ms(fluxcal);
        let runner = StepRunner {
            ctx,
            dir: &dir,
            timeout: *casa_timeout,
        };

        // A step only runs when the steps it depends on worked; the result
        // says whether this one did.
        let step = |summary: &mut StageSummary,
                    ready: bool,
                    name: &str,
                    task: &dyn CasaTask|
         -> Result<bool, StageError> {
            let k = key(name);
            if !ready {
                summary.record(
                    ctx.store,
                    k,
                    StageStatus::skipped("an earlier calibration step failed"),
                )?;
                return Ok(false);
            }
            if summary.already_done(ctx.store, &k)? {
                return Ok(true);
            }
            info!("Beam {beam}: {name}");
            let status = settle(runner.run(name, task))?;
            let ok = status.is_succeeded();
            summary.record(ctx.store, k, status)?;
            Ok(ok)
        };

        let mut ok = step(summary, true, "setjy", &Setjy::new(&fluxcal_ms, ""))?;
        ok = step(
            summary,
            ok,
            "initial_phase",
            &Gaincal {
                vis: fluxcal_ms.clone(),
                caltable: tables.initial_phase.clone(),
                field: String::new(),
                gaintype: "G".to_string(),
                calmode: "p".to_string(),
                solint: "int".to_string(),
                refant: self.refant.clone(),
                smodel: None,
                parang: false,
                prior: PriorTables::default(),
            },
        )?;
        let mut prior = PriorTables::default();
        prior.push(&tables.initial_phase, "nearest");
        ok = step(
            summary,
            ok,
            "bandpass",
            &Bandpass {
                vis: fluxcal_ms.clone(),
                caltable: tables.bandpass.clone(),
                field: String::new(),
                refant: self.refant.clone(),
                solint: "inf".to_string(),
                combine: "scan".to_string(),
                solnorm: true,
                fillgaps: self.fillgaps,
                parang: false,
                prior,
            },
        )?;
        let mut prior = PriorTables::default();
        prior.push(&tables.bandpass, "nearest");
        ok = step(
            summary,
            ok,
            "gains",
            &Gaincal {
                vis: fluxcal_ms.clone(),
                caltable: tables.gains.clone(),
                field: String::new(),
                gaintype: "G".to_string(),
                calmode: "ap".to_string(),
                solint: "int".to_string(),
                refant: self.refant.clone(),
                smodel: None,
                parang: false,
                prior,
            },
        )?;

        match (
            polcal,
            &tables.crosshand_delay,
            &tables.leakage,
            &tables.polangle,
        ) {
            (Some(polcal), Some(kcross), Some(df), Some(xf)) => {
                let polcal_ms = ms(polcal);
                let mut prior = PriorTables::default();
                prior.push(&tables.bandpass, "nearest");
                prior.push(&tables.gains, "nearest");
                ok = step(
                    summary,
                    ok,
                    "crosshand_delay",
                    &Gaincal {
                        vis: polcal_ms.clone(),
                        caltable: kcross.clone(),
                        field: String::new(),
                        gaintype: "KCROSS".to_string(),
                        calmode: "ap".to_string(),
                        solint: "inf".to_string(),
                        refant: self.refant.clone(),
                        smodel: Some(self.polcal_model.clone()),
                        parang: true,
                        prior: prior.clone(),
                    },
                )?;
                prior.push(kcross, "nearest");
                ok = step(
                    summary,
                    ok,
                    "leakage",
                    &Polcal {
                        vis: fluxcal_ms.clone(),
                        caltable: df.clone(),
                        field: String::new(),
                        poltype: "Df".to_string(),
                        solint: "inf".to_string(),
                        combine: "scan".to_string(),
                        refant: self.refant.clone(),
                        smodel: None,
                        prior: prior.clone(),
                    },
                )?;
                prior.push(df, "nearest");
                ok = step(
                    summary,
                    ok,
                    "polangle",
                    &Polcal {
                        vis: polcal_ms,
                        caltable: xf.clone(),
                        field: String::new(),
                        poltype: "Xf".to_string(),
                        solint: "inf".to_string(),
                        combine: "scan".to_string(),
                        refant: self.refant.clone(),
                        smodel: Some(self.polcal_model.clone()),
                        prior,
                    },
                )?;
            }
            _ => {
                for name in POLCAL_STEPS {
                    summary.record(
                        ctx.store,
                        key(name),
                        StageStatus::skipped("no polarisation calibrator"),
                    )?;
                }
            }
        }

        // Apply everything to every source. The applications don't depend on
        // each other.
        let solved = ok;
        let to_apply = tables.to_apply();
        for (role, name) in sources.named() {
            let vis = ms(name);
            if !vis.exists() {
                summary.record(
                    ctx.store,
                    key(&format!("apply_{role}")),
                    StageStatus::skipped(format!("{} doesn't exist", vis.display())),
                )?;
                continue;
            }
            step(
                summary,
                solved,
                &format!("apply_{role}"),
                &Applycal {
                    vis,
                    field: String::new(),
                    parang: polcal.is_some(),
                    tables: to_apply.clone(),
                },
            )?;
        }

        Ok(())
    }
}

/// Runs each calibration step as its own CASA script.
struct StepRunner<'a> {
    ctx: StageContext<'a>,
    dir: &'a Path,
    timeout: Duration,
}

impl StepRunner<'_> {
    fn run(&self, step: &str, task: &dyn CasaTask) -> Result<StageStatus, StageError> {
        if let Some(out) = task.output() {
            remove_stale(out)?;
        }
        let mut script = CasaScript::new();
        script.push(task)?;
        script.run(
            self.ctx.runner,
            &self.dir.join(format!("crosscal_{step}.py")),
            self.timeout,
        )?;
        Ok(StageStatus::done())
    }
}

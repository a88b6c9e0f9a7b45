// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpful things for tests: stand-ins for CASA and MIRIAD, and image
//! readers that don't need real images.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use fitsio::{
    images::{ImageDescription, ImageType},
    FitsFile,
};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{
    io::{ImageError, ImageReader},
    tools::{ToolCommand, ToolError, ToolOutput, ToolRunner},
};

type Hook = Box<dyn Fn(&ToolCommand) + Send + Sync>;

/// Pretends to be CASA and MIRIAD. Every command is recorded, and the outputs
/// a real task would create are created (empty).
#[derive(Default)]
pub(crate) struct FakeRunner {
    commands: Mutex<Vec<ToolCommand>>,
    /// Tasks that exit with a non-zero code.
    failing: Vec<String>,
    /// Tasks that exit with a non-zero code only when their arguments mention
    /// something in particular.
    failing_on: Vec<(String, String)>,
    /// Tasks that exit happily but create nothing.
    lazy: Vec<String>,
    hook: Option<Hook>,
}

impl FakeRunner {
    pub(crate) fn new() -> FakeRunner {
        FakeRunner::default()
    }

    pub(crate) fn failing(mut self, task: &str) -> FakeRunner {
        self.failing.push(task.to_string());
        self
    }

    pub(crate) fn failing_on(mut self, task: &str, needle: &str) -> FakeRunner {
        self.failing_on.push((task.to_string(), needle.to_string()));
        self
    }

    pub(crate) fn lazy(mut self, task: &str) -> FakeRunner {
        self.lazy.push(task.to_string());
        self
    }

    /// Run something extra after each command's outputs are created.
    pub(crate) fn with_hook<F: Fn(&ToolCommand) + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> FakeRunner {
        self.hook = Some(Box::new(hook));
        self
    }

    pub(crate) fn commands(&self) -> Vec<ToolCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// The MIRIAD commands run with this program name.
    pub(crate) fn commands_named(&self, program: &str) -> Vec<ToolCommand> {
        self.commands()
            .into_iter()
            .filter(|c| c.program == program)
            .collect()
    }

    /// The names of every task run, in order. CASA scripts contribute each of
    /// their calls.
    pub(crate) fn tasks(&self) -> Vec<String> {
        let mut tasks = vec![];
        for cmd in self.commands() {
            if cmd.program == "casa" {
                tasks.extend(casa_calls(&cmd).into_iter().map(|(name, _)| name));
            } else {
                tasks.push(cmd.program.clone());
            }
        }
        tasks
    }

    fn fail(&self, task: &str, args: &str) -> Option<ToolOutput> {
        let fails = self.failing.iter().any(|t| t == task)
            || self
                .failing_on
                .iter()
                .any(|(t, needle)| t == task && args.contains(needle.as_str()));
        if fails {
            Some(ToolOutput {
                code: Some(1),
                duration: Duration::from_millis(1),
                stdout: String::new(),
                stderr: format!("### Fatal Error: {task} fell over"),
            })
        } else {
            None
        }
    }
}

/// The task names and bodies of every call in a CASA script.
fn casa_calls(cmd: &ToolCommand) -> Vec<(String, String)> {
    let script = match cmd.args.last() {
        Some(s) => s,
        None => return vec![],
    };
    let text = std::fs::read_to_string(script).unwrap_or_default();
    text.lines()
        .filter_map(|l| {
            l.split_once('(')
                .map(|(name, body)| (name.to_string(), body.to_string()))
        })
        .collect()
}

/// Pull `key='value'` out of the body of a CASA call.
fn casa_param(body: &str, key: &str) -> Option<PathBuf> {
    let start = body.find(&format!("{key}='"))? + key.len() + 2;
    let len = body[start..].find('\'')?;
    Some(PathBuf::from(&body[start..start + len]))
}

fn touch_dir(p: &Path) {
    std::fs::create_dir_all(p).unwrap();
}

fn touch_file(p: &Path) {
    if let Some(parent) = p.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(p, b"").unwrap();
}

impl ToolRunner for FakeRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput, ToolError> {
        self.commands.lock().unwrap().push(cmd.clone());

        if cmd.program == "casa" {
            for (task, body) in casa_calls(cmd) {
                if let Some(out) = self.fail(&task, &body) {
                    return Ok(out);
                }
                if self.lazy.contains(&task) {
                    continue;
                }
                for key in ["caltable", "outputvis"] {
                    if let Some(p) = casa_param(&body, key) {
                        touch_dir(&p);
                    }
                }
                if let Some(p) = casa_param(&body, "fitsfile") {
                    touch_file(&p);
                }
            }
        } else {
            if let Some(out) = self.fail(&cmd.program, &cmd.args.join(" ")) {
                return Ok(out);
            }
            if !self.lazy.contains(&cmd.program) {
                let op = cmd.get_param("op");
                if let Some(out) = cmd.get_param("out") {
                    match op {
                        Some("xyout") | Some("uvout") => touch_file(Path::new(out)),
                        _ => touch_dir(Path::new(out)),
                    }
                }
                for key in ["map", "beam"] {
                    if cmd.program == "invert" {
                        if let Some(p) = cmd.get_param(key) {
                            touch_dir(Path::new(p));
                        }
                    }
                }
            }
        }

        if let Some(hook) = &self.hook {
            hook(cmd);
        }
        Ok(ToolOutput {
            code: Some(0),
            duration: Duration::from_millis(1),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

type PixelFn = Box<dyn Fn(&Path) -> Option<Vec<f32>> + Send + Sync>;

/// Hands out made-up pixels for any image that exists on disk.
pub(crate) struct FakeReader {
    pixels: PixelFn,
}

impl FakeReader {
    pub(crate) fn new<F>(pixels: F) -> FakeReader
    where
        F: Fn(&Path) -> Option<Vec<f32>> + Send + Sync + 'static,
    {
        FakeReader {
            pixels: Box::new(pixels),
        }
    }
}

impl ImageReader for FakeReader {
    fn read_pixels(&self, image: &Path) -> Result<Vec<f32>, ImageError> {
        if !image.exists() {
            return Err(ImageError::Missing(image.to_path_buf()));
        }
        (self.pixels)(image).ok_or_else(|| ImageError::Missing(image.to_path_buf()))
    }
}

/// Zero-mean Gaussian noise from a seeded RNG, so tests are repeatable.
pub(crate) fn gaussian_noise(n: usize, sigma: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Normal::new(0.0, sigma).unwrap();
    (0..n).map(|_| dist.sample(&mut rng)).collect()
}

/// Write a single-HDU float FITS image.
pub(crate) fn write_fits_image(path: &Path, shape: &[usize], pixels: &[f32]) {
    let desc = ImageDescription {
        data_type: ImageType::Float,
        dimensions: shape,
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&desc)
        .open()
        .unwrap();
    let hdu = fptr.primary_hdu().unwrap();
    hdu.write_image(&mut fptr, pixels).unwrap();
}

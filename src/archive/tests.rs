// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{collections::HashSet, sync::Mutex};

use tempfile::TempDir;

use super::*;
use crate::tests::FakeRunner;

struct FakeArchive {
    available: HashSet<u8>,
    broken: HashSet<u8>,
    fetched: Mutex<Vec<u8>>,
}

impl FakeArchive {
    fn new(available: &[u8]) -> FakeArchive {
        FakeArchive {
            available: available.iter().copied().collect(),
            broken: HashSet::new(),
            fetched: Mutex::new(vec![]),
        }
    }
}

impl Archive for FakeArchive {
    fn exists(&self, _: &ObservationId, beam: Beam) -> Result<bool, ArchiveError> {
        Ok(self.available.contains(&beam.num()))
    }

    fn fetch(&self, _: &ObservationId, beam: Beam, dest: &Path) -> Result<(), ArchiveError> {
        if self.broken.contains(&beam.num()) {
            return Err(ArchiveError::Tool(ToolError::Failed {
                program: "iget".to_string(),
                code: Some(3),
                stderr: "connection reset".to_string(),
            }));
        }
        std::fs::create_dir_all(dest).unwrap();
        self.fetched.lock().unwrap().push(beam.num());
        Ok(())
    }
}

fn obs() -> ObservationId {
    "190102001".parse().unwrap()
}

#[test]
fn test_observation_id() {
    let obs = obs();
    assert_eq!(obs.date, "190102");
    assert_eq!(obs.obsnum, 1);
    assert_eq!(obs.to_string(), "190102001");
    assert!("19010200".parse::<ObservationId>().is_err());
    assert!("19o102001".parse::<ObservationId>().is_err());
    assert!(ObservationId::new("1901", 1).is_err());
}

#[test]
fn test_alta_dataset_path() {
    let runner = FakeRunner::new();
    let alta = AltaArchive::new(&runner, Duration::from_secs(1));
    assert_eq!(
        alta.dataset_path(&obs(), Beam::new(7).unwrap()),
        "/altaZone/archive/apertif_main/visibilities_default/190102001_AP_B007/WSRTA190102001_B007.MS"
    );
}

#[test]
fn test_alta_exists_and_fetch() {
    let dir = TempDir::new().expect("couldn't make tmp dir");
    let dest = dir.path().join("WSRTA190102001_B000.MS");
    let runner = FakeRunner::new().with_hook(|cmd| {
        if cmd.program == "iget" {
            std::fs::create_dir_all(cmd.args.last().unwrap()).unwrap();
        }
    });
    let alta = AltaArchive::new(&runner, Duration::from_secs(1)).with_root("/zone");
    let beam = Beam::new(0).unwrap();
    assert!(alta.exists(&obs(), beam).unwrap());
    alta.fetch(&obs(), beam, &dest).unwrap();
    assert!(dest.exists());

    let cmds = runner.commands();
    assert_eq!(cmds[0].program, "ils");
    assert_eq!(cmds[0].args, ["/zone/190102001_AP_B000/WSRTA190102001_B000.MS"]);
    assert_eq!(cmds[1].program, "iget");
    assert_eq!(cmds[1].args.last().unwrap(), &dest.display().to_string());

    let missing = FakeRunner::new().failing("ils");
    let alta = AltaArchive::new(&missing, Duration::from_secs(1));
    assert!(!alta.exists(&obs(), beam).unwrap());
}

#[test]
fn test_fetch_without_output_is_an_error() {
    let dir = TempDir::new().expect("couldn't make tmp dir");
    let runner = FakeRunner::new();
    let alta = AltaArchive::new(&runner, Duration::from_secs(1));
    let result = alta.fetch(&obs(), Beam::new(1).unwrap(), &dir.path().join("x.MS"));
    assert!(matches!(
        result,
        Err(ArchiveError::Tool(ToolError::MissingOutput { .. }))
    ));
}

#[test]
fn test_fetch_beams() {
    let dir = TempDir::new().expect("couldn't make tmp dir");
    let mut archive = FakeArchive::new(&[0, 1, 2, 5]);
    archive.broken.insert(5);
    // Beam 1 is already here.
    std::fs::create_dir_all(dir.path().join("01").join("raw.MS")).unwrap();

    let beams: Vec<Beam> = [0, 1, 2, 3, 5]
        .into_iter()
        .map(|b| Beam::new(b).unwrap())
        .collect();
    let outcomes = fetch_beams(&archive, &obs(), &beams, |beam| {
        dir.path().join(beam.to_string()).join("raw.MS")
    });

    let outcomes: Vec<(u8, FetchOutcome)> =
        outcomes.into_iter().map(|(b, o)| (b.num(), o)).collect();
    assert_eq!(outcomes[0], (0, FetchOutcome::Fetched));
    assert_eq!(outcomes[1], (1, FetchOutcome::AlreadyPresent));
    assert_eq!(outcomes[2], (2, FetchOutcome::Fetched));
    assert_eq!(outcomes[3], (3, FetchOutcome::NotInArchive));
    assert!(matches!(&outcomes[4], (5, FetchOutcome::Failed(e)) if e.contains("connection reset")));

    let mut fetched = archive.fetched.lock().unwrap().clone();
    fetched.sort_unstable();
    assert_eq!(fetched, [0, 2]);

    assert!(StageStatus::from(&outcomes[0].1).is_succeeded());
    assert!(matches!(
        StageStatus::from(&outcomes[3].1),
        StageStatus::Skipped(_)
    ));
    assert!(StageStatus::from(&outcomes[4].1).is_failed());
}

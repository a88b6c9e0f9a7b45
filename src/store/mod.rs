// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The parameter store: a single key-value file per base directory that
//! records what every pipeline stage has done, so that a re-run can skip work
//! that has already succeeded.
//!
//! Every mutation re-reads the file, applies the change and writes the whole
//! mapping to a temporary file that is then renamed over the store. Other
//! processes writing the same store at the same time still race (last writer
//! wins), but a reader never sees a half-written file.

mod error;
#[cfg(test)]
mod tests;
mod value;

pub use error::StoreError;
pub(crate) use value::nullable_f64;
pub use value::{FromParamValue, ParamValue};

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use indexmap::IndexMap;
use log::{debug, trace};

use crate::{constants::DEFAULT_STORE_FILENAME, status::StageStatus};

pub type ParamMap = IndexMap<String, ParamValue>;

#[derive(Debug)]
pub struct ParamStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl ParamStore {
    /// The store belonging to a base directory.
    pub fn open<P: AsRef<Path>>(basedir: P) -> ParamStore {
        ParamStore::with_path(basedir.as_ref().join(DEFAULT_STORE_FILENAME))
    }

    /// A store at an explicit file path.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> ParamStore {
        ParamStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole store. A store that doesn't exist yet is empty.
    pub fn load(&self) -> Result<ParamMap, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load_unlocked()
    }

    fn load_unlocked(&self) -> Result<ParamMap, StoreError> {
        if !self.path.exists() {
            trace!("Parameter store {} doesn't exist yet", self.path.display());
            return Ok(ParamMap::new());
        }
        let f = File::open(&self.path).map_err(|e| StoreError::Read {
            file: self.path.clone(),
            err: e,
        })?;
        serde_json::from_reader(BufReader::new(f)).map_err(|e| StoreError::Decode {
            file: self.path.clone(),
            err: e,
        })
    }

    fn save_unlocked(&self, map: &ParamMap) -> Result<(), StoreError> {
        let write_err = |e| StoreError::Write {
            file: self.path.clone(),
            err: e,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut f = BufWriter::new(File::create(&tmp).map_err(write_err)?);
            serde_json::to_writer_pretty(&mut f, map).map_err(|e| StoreError::Encode {
                file: self.path.clone(),
                err: e,
            })?;
            f.write_all(b"\n").map_err(write_err)?;
            f.flush().map_err(write_err)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }

    /// Apply a change to the whole mapping and write it back.
    pub fn modify<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut ParamMap) -> T,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load_unlocked()?;
        let out = f(&mut map);
        self.save_unlocked(&map)?;
        Ok(out)
    }

    /// Get a value, if it exists.
    pub fn get(&self, key: &str) -> Result<Option<ParamValue>, StoreError> {
        Ok(self.load()?.swap_remove(key))
    }

    /// Get a value, or the default if the key doesn't exist.
    pub fn get_or(&self, key: &str, default: ParamValue) -> Result<ParamValue, StoreError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Get a value of a particular kind. A missing key gives the default; a
    /// value of a different kind is an error.
    pub fn get_typed<T: FromParamValue>(&self, key: &str, default: T) -> Result<T, StoreError> {
        match self.get(key)? {
            None => Ok(default),
            Some(v) => {
                let found = v.kind();
                T::from_param_value(v).ok_or_else(|| StoreError::WrongKind {
                    key: key.to_string(),
                    expected: T::KIND,
                    found,
                })
            }
        }
    }

    /// The status of a stage. Stages that have never run are pending.
    pub fn get_status(&self, key: &str) -> Result<StageStatus, StoreError> {
        self.get_typed(key, StageStatus::Pending)
    }

    pub fn set<V: Into<ParamValue>>(&self, key: &str, value: V) -> Result<(), StoreError> {
        let value = value.into();
        debug!("Setting {key} = {}", value.kind());
        self.modify(|map| {
            map.insert(key.to_string(), value);
        })
    }

    /// Set many values with a single write.
    pub fn set_many<I>(&self, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (String, ParamValue)>,
    {
        self.modify(|map| map.extend(entries))
    }

    /// Delete a key. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.modify(|map| map.shift_remove(key).is_some())
    }

    /// Delete every key starting with `prefix`. Returns the number of deleted
    /// keys.
    pub fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.modify(|map| {
            let before = map.len();
            map.retain(|k, _| !k.starts_with(prefix));
            before - map.len()
        })
    }

    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.load()?.contains_key(key))
    }
}

// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! File-backed checkpointing of [`State`], so a long-running optimization can be resumed after
//! an interruption. `State` stays plain, serializable data for exactly this reason —
//! `curr_oracle`/`oracle_factory` are skipped on (de)serialization, since a boxed closure cannot
//! round-trip through `serde`, so a resumed state needs `params.oracle_factory` (and, if
//! `opt_status` is anything but `NewIter`, `params.curr_oracle` too) rebound by the caller before
//! the next `step` call. Calling `step` without rebinding returns `Err(OptError::MissingOracle)`
//! rather than panicking.

#![cfg(feature = "serde1")]

use crate::ep::State;
use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

/// Where and under what name a [`State`] checkpoint is written.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct FileCheckpoint {
    directory: PathBuf,
    filename: PathBuf,
}

impl Default for FileCheckpoint {
    fn default() -> FileCheckpoint {
        FileCheckpoint {
            directory: PathBuf::from(".checkpoints"),
            filename: PathBuf::from("state.ep"),
        }
    }
}

impl FileCheckpoint {
    /// A checkpoint at `<directory>/<name>.ep`.
    pub fn new<N: AsRef<str>>(directory: N, name: N) -> Self {
        FileCheckpoint {
            directory: PathBuf::from(directory.as_ref()),
            filename: PathBuf::from(format!("{}.ep", name.as_ref())),
        }
    }

    /// Serialize `state` to disk, creating the checkpoint directory if necessary.
    pub fn save(&self, state: &State) -> Result<()> {
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory)?;
        }
        let fname = self.directory.join(&self.filename);
        let f = BufWriter::new(File::create(fname)?);
        bincode::serialize_into(f, state)?;
        Ok(())
    }

    /// Load a previously saved state, or `None` if the checkpoint file does not exist.
    pub fn load(&self) -> Result<Option<State>> {
        let path = self.directory.join(&self.filename);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(Some(bincode::deserialize_from(reader)?))
    }
}

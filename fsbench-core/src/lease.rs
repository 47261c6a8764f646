// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Exclusive lease over "the server slot".
//!
//! At most one server may be alive on a host because sentinels, core ranges
//! and offset ranges are all global. The driver takes an exclusive `flock`
//! on a lock file before starting any server and keeps it for the whole
//! sweep. Starting a server requires a `&ServerLease`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::LeaseError;

/// Proof that the caller holds the server slot. Released on drop.
#[derive(Debug)]
pub struct ServerLease {
    path: PathBuf,
    _lock: Flock<File>,
}

impl ServerLease {
    /// Try to take the slot without blocking.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LeaseError> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| LeaseError::Open {
                path: path.clone(),
                source: e,
            })?;

        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => return Err(LeaseError::Busy { path }),
            Err((_, errno)) => return Err(LeaseError::Lock { path, errno }),
        };

        tracing::info!(path = %path.display(), "Server slot acquired");

        Ok(Self { path, _lock: lock })
    }

    /// Lock file backing this lease.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

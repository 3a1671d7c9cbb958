//! Whole-dataset erasure, local and remote.
//!
//! Both operators take a [`Confirmed`] token. The only way to get one is two
//! sequential calls to `confirm`, so callers must collect two explicit
//! acknowledgements before anything is erased.

use std::time::Duration;

use crate::db::{self, Store};
use crate::error::{PurseError, Result};
use crate::models::Collection;
use crate::remote::RemoteStore;

const BLOCKED_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
pub struct WipeConfirmation(());

#[derive(Debug)]
pub struct HalfConfirmed(());

#[derive(Debug)]
pub struct Confirmed(());

impl WipeConfirmation {
    pub fn new() -> Self {
        Self(())
    }

    pub fn confirm(self) -> HalfConfirmed {
        HalfConfirmed(())
    }
}

impl HalfConfirmed {
    pub fn confirm(self) -> Confirmed {
        Confirmed(())
    }
}

/// What a local wipe needs from the store.
pub trait LocalStore {
    fn delete_store(&mut self) -> Result<()>;
    fn reopen(&mut self) -> Result<()>;
    /// Clear every collection in one transaction. Returns rows removed.
    fn clear_all(&mut self) -> Result<usize>;
}

impl LocalStore for Store {
    fn delete_store(&mut self) -> Result<()> {
        Store::delete_store(self)
    }

    fn reopen(&mut self) -> Result<()> {
        Store::reopen(self)
    }

    fn clear_all(&mut self) -> Result<usize> {
        self.run_atomic(|tx| {
            let mut removed = 0;
            for collection in Collection::ALL {
                removed += db::clear(tx, collection)?;
            }
            Ok(removed)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WipeMethod {
    /// Database file deleted and recreated.
    Recreated,
    /// Deletion failed; every table was cleared instead.
    Cleared,
}

#[derive(Debug, Clone)]
pub struct LocalWipeReport {
    pub method: WipeMethod,
    pub retried: bool,
    /// Why the delete-and-recreate path was abandoned, if it was.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteWipeReport {
    pub total_deleted: Option<u64>,
}

pub fn wipe_local(store: &mut impl LocalStore, _confirmed: Confirmed) -> Result<LocalWipeReport> {
    let mut retried = false;
    match recreate(store, &mut retried) {
        Ok(()) => {
            tracing::info!(retried, "Local store deleted and recreated");
            Ok(LocalWipeReport {
                method: WipeMethod::Recreated,
                retried,
                fallback_reason: None,
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not recreate local store; clearing tables instead");
            store.reopen()?;
            let removed = store.clear_all()?;
            tracing::info!(removed, "Local store cleared");
            Ok(LocalWipeReport {
                method: WipeMethod::Cleared,
                retried,
                fallback_reason: Some(e.to_string()),
            })
        }
    }
}

fn recreate(store: &mut impl LocalStore, retried: &mut bool) -> Result<()> {
    match store.delete_store() {
        Ok(()) => {}
        Err(PurseError::StoreBlocked(reason)) => {
            tracing::warn!(%reason, "Store deletion blocked; retrying once");
            std::thread::sleep(BLOCKED_RETRY_DELAY);
            *retried = true;
            store.delete_store()?;
        }
        Err(e) => return Err(e),
    }
    store.reopen()
}

/// Erase the remote dataset. Local state is never touched, whatever the outcome.
pub fn wipe_remote(remote: &dyn RemoteStore, _confirmed: Confirmed) -> Result<RemoteWipeReport> {
    let response = remote.clear_all()?;
    if !response.success {
        return Err(PurseError::Remote(
            response
                .error
                .unwrap_or_else(|| "remote store reported failure".into()),
        ));
    }
    tracing::info!(total_deleted = ?response.total_deleted, "Remote store cleared");
    Ok(RemoteWipeReport {
        total_deleted: response.total_deleted,
    })
}

//! Scoped acquisition.
//!
//! A [`LeaseScope`] remembers every lease acquired through it and releases
//! them newest-first when it is closed or dropped, including on early return
//! and unwinding.

use std::time::Duration;

use idelens_common::error::IdelensResult;

use crate::manager::{Lease, LeaseId, ReleaseErrors, ResourceKind, ResourceManager};

pub struct LeaseScope {
    manager: ResourceManager,
    name: String,
    leases: Vec<LeaseId>,
    closed: bool,
}

impl LeaseScope {
    pub(crate) fn new(manager: ResourceManager, name: &str) -> Self {
        Self {
            manager,
            name: name.to_string(),
            leases: Vec::new(),
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire through the manager and bind the lease to this scope.
    pub fn acquire<T, F, R>(
        &mut self,
        kind: ResourceKind,
        label: &str,
        factory: F,
        release: R,
    ) -> IdelensResult<Lease<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> IdelensResult<T>,
        R: FnOnce(T) -> IdelensResult<()> + Send + 'static,
    {
        self.acquire_with_lifetime(kind, label, factory, release, None)
    }

    pub fn acquire_with_lifetime<T, F, R>(
        &mut self,
        kind: ResourceKind,
        label: &str,
        factory: F,
        release: R,
        max_lifetime: Option<Duration>,
    ) -> IdelensResult<Lease<T>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> IdelensResult<T>,
        R: FnOnce(T) -> IdelensResult<()> + Send + 'static,
    {
        let lease = self
            .manager
            .acquire(kind, label, factory, release, max_lifetime)?;
        self.leases.push(lease.id());
        Ok(lease)
    }

    /// Mark every lease in the scope as in use.
    pub fn touch(&self) {
        for id in &self.leases {
            self.manager.touch(*id);
        }
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Release the scope's leases and report failures. Leases already
    /// released elsewhere (for example by the expiry sweep) are skipped.
    pub fn close(mut self) -> Result<usize, ReleaseErrors> {
        self.closed = true;
        let leases = std::mem::take(&mut self.leases);
        self.manager.release_set(&leases)
    }
}

impl Drop for LeaseScope {
    fn drop(&mut self) {
        if self.closed || self.leases.is_empty() {
            return;
        }
        let leases = std::mem::take(&mut self.leases);
        match self.manager.release_set(&leases) {
            Ok(count) => tracing::trace!(scope = %self.name, count, "Scope released leases"),
            Err(e) => tracing::error!(scope = %self.name, error = %e, "Scope release failed"),
        }
    }
}

impl std::fmt::Debug for LeaseScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseScope")
            .field("name", &self.name)
            .field("leases", &self.leases)
            .finish()
    }
}

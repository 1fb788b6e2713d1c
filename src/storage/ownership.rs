// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for tenant-scoped records.
//!
//! A record owned by someone else is reported exactly like a missing one,
//! so callers cannot discover other tenants' file or folder names.

use crate::error::{CloudError, CloudResult};

/// Trait for records that belong to a single user.
pub trait OwnedResource {
    /// Email of the owning user.
    fn owner(&self) -> &str;

    fn is_owned_by(&self, user: &str) -> bool {
        self.owner() == user
    }
}

/// Resolve an optional lookup to a record owned by `user`.
pub trait OwnershipCheck<T> {
    /// # Errors
    /// `CloudError::NotFound(what)` when absent or owned by another user.
    fn owned_by(self, user: &str, what: &str) -> CloudResult<T>;
}

impl<T: OwnedResource> OwnershipCheck<T> for Option<T> {
    fn owned_by(self, user: &str, what: &str) -> CloudResult<T> {
        match self {
            Some(resource) if resource.is_owned_by(user) => Ok(resource),
            _ => Err(CloudError::not_found(what)),
        }
    }
}

impl<T: OwnedResource> OwnedResource for &T {
    fn owner(&self) -> &str {
        (*self).owner()
    }
}

impl<T: OwnedResource> OwnedResource for &mut T {
    fn owner(&self) -> &str {
        (**self).owner()
    }
}

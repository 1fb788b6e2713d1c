// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer for domain entities.
//!
//! Each repository borrows the application state and works on one or two
//! collections through [`crate::storage::Collections`].

pub mod files;
pub mod folders;
pub mod otp;
pub mod shares;
pub mod users;

pub use files::{DecryptedFile, FileRecord, FileRepository, FileSearch, StoredFile};
pub use folders::{Folder, FolderRepository};
pub use otp::OtpRepository;
pub use shares::{CreatedShare, ShareLink, ShareRepository, ShareRequest};
pub use users::{LoginCheck, UserProfile, UserRecord, UserRepository};

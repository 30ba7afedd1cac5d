//! # Concord Sync Engine
//!
//! Entity reconciliation for offline-first applications.
//!
//! This crate provides:
//! - Entities: named collections with a local store and an optional remote
//! - An entity registry with wait-for-registration lookups
//! - Registration-time full sync from the remote
//! - Write-through mutations: local write now, remote write scheduled
//! - Live observation of local snapshots with remote change ingestion
//!
//! ## Architecture
//!
//! Local storage is the single source of truth delivered to callers:
//! 1. `register` syncs the full remote collection into local storage
//! 2. `add` / `update` / `remove` write locally, then hand a remote work unit
//!    to the durable scheduler
//! 3. Remote changes are routed through a [`ChangeCalculator`] into local
//!    writes; observers only ever see the resulting local snapshots
//!
//! ## Key Invariants
//!
//! - Local writes and lookups fail synchronously to the caller
//! - Remote write failures stay inside the scheduler's retry loop
//! - Registration sync failures are retried, then swallowed
//! - At most one registration sync runs per entity id

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod calculator;
mod capability;
mod config;
mod content;
mod engine;
mod entity;
mod error;
mod observe;
mod registry;

pub use calculator::{ChangeCalculator, DataChangeCalculator};
pub use capability::{LocalStorage, RemoteProvider};
pub use config::SyncConfig;
pub use content::{Change, ChangeType, Content, DataAction};
pub use engine::SyncEngine;
pub use entity::{Entity, EntityRef};
pub use error::{SyncError, SyncResult};
pub use observe::Observation;
pub use registry::EntityRegistry;

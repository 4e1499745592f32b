#![doc = "docsync-core: SharePoint document-library synchronisation for multi-tenant apps."]

//! This crate holds every piece of the sync pipeline: the Graph drive client and
//! its token provider, path resolution, folder listing and tree collection, delta
//! fetching, reconciliation into document records, the per-run orchestrator and
//! the JSON action dispatcher that fronts it.
//!
//! # Usage
//! Wire a [`graph::GraphClient`] (or any [`contract::DriveProvider`]) and a
//! [`contract::DocumentStore`] together and call [`synchronise::synchronise`], or
//! hand raw JSON requests to [`dispatch::Dispatcher`].

pub mod auth;
pub mod contract;
pub mod delta;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod listing;
pub mod model;
pub mod reconcile;
pub mod resolve;
pub mod store;
pub mod synchronise;
pub mod upload;

pub use error::{SyncError, SyncResult};

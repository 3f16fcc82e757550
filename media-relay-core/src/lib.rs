#![doc = "media-relay-core: relay pipeline for republishing source videos to a Facebook Page."]

//! This crate contains the pipeline, its idempotency ledger, and the generic
//! source and download adapters. The destination API client and the command
//! line surface live in the `media-relay` binary crate.
//!
//! # Pipeline
//! source listing → [`select`] → [`download::Fetcher`] → [`contract::Publisher`]
//! → [`ledger::Ledger`] commit, driven by [`relay::relay`].

pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod ledger;
pub mod relay;
pub mod select;
pub mod source;

pub use select::select;

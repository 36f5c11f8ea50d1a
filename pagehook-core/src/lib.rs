#![doc = "pagehook-core: the synchronise → compile → publish pipeline behind pagehook."]

//! A webhook says a repository changed. This crate mirrors the repository
//! locally, runs the static-site compiler over it, publishes the output into
//! the web root, keeps any custom-domain alias in place and records the
//! outcome in a per-site audit log.
//!
//! # Usage
//! Build a [`config::DeployConfig`], open a [`mapping::MappingStore`], and hand
//! both to [`deploy::Deployer::from_config`]. The HTTP layer, login flow and
//! the compiler itself live outside this crate.

pub mod audit;
pub mod build;
pub mod config;
pub mod contract;
pub mod deploy;
pub mod error;
pub mod identity;
pub mod layout;
pub mod mapping;
pub mod publish;
pub mod synchronise;

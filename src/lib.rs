//! Archives the download URLs of Minecraft Bedrock (GDK) packages.
//!
//! Each run signs in to Xbox Live, lists the base package of every tracked
//! variant, and records versions missing from `urls.json` with one git commit
//! per version.

pub mod archiver;
pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod msa;
pub mod packages;
pub mod recorder;
pub mod version;
pub mod xbox;

pub use error::{ArchiverError, Result};

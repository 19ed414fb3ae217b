//! Core of the issuetrack project.
//!
//! - [`storage`]: the single-table data-access layer (key builder, pagination
//!   codec, update and filter expressions, query router, repository façade).
//! - [`tracker`]: accounts, projects and issues layered on top of the façade.

pub mod serde;
pub mod storage;
pub mod tracker;

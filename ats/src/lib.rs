//! ATS token ledger
//!
//! This crate re-exports all the components of the ATS token ledger.

pub use ats_core::*;
pub use ats_runtime::*;
pub use ats_storage_impl::*;

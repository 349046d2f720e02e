//! Remote platform client: wire types, error classification and the
//! `DevOpsOps` verb set consumed by the clone pipeline.

pub mod client;
pub mod errors;
pub mod types;

pub use client::{DevOpsClient, DevOpsOps};
pub use errors::DevOpsError;

#[cfg(any(test, feature = "testing"))]
pub use client::MockDevOpsOps;

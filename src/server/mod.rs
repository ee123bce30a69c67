//! HTTP control surface (§6): a minimal axum router over the core's
//! persistence/worker-pool/admin-flag seams. Out of core scope by the
//! spec's own framing, kept thin so the pipeline is exercisable end-to-end.

pub mod auth;
pub mod routes;

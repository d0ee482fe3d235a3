//! Try-on generation scheduler and quality gate.
//!
//! Generation requests are admitted into a fixed number of execution slots,
//! each generated image is scored and checked against tiered quality
//! thresholds, and failed images are regenerated with adjusted parameters
//! until they pass or the retry budget runs out.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;

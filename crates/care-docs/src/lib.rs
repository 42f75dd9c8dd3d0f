//! Compliance document scheduling and validation for home-visit care agencies.
//!
//! The engine tracks per-client renewal state for the care plan, procedure
//! document (tejunsho) and monitoring reviews, derives monitoring reviews from
//! care goals, runs cross-entity validation rules and drives document
//! (re)generation through an external collaborator.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk tier classification for customers linked to flagged devices.
//!
//! [`classifier::classify`] groups enriched device records by customer
//! and derives a [`RiskLabel`](device_risk_models::RiskLabel) from how
//! many distinct months and devices the customer was seen with.
//! [`summary`] and [`analysis`] aggregate the per-customer results for
//! reporting. Everything here is pure: no I/O, no shared state.

pub mod analysis;
pub mod classifier;
pub mod summary;

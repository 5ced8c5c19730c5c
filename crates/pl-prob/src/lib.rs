//! Probability building blocks for proflik.
//!
//! Small, validated log-density functions shared by the count and constraint models.

pub mod normal;
pub mod poisson;

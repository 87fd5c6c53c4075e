//! Post-clustering analysis.
//!
//! Scores how well separated the clusters are and turns cluster labels into
//! ordered severity categories.

pub mod quality;
pub mod severity;
pub mod utility;

//! Severity clustering of flood incidents per sub-district.
//!
//! A run loads one year (or every supported year aggregated) from a
//! [`store::FloodStore`], scales the five impact features, clusters them with
//! k-medoids or DBSCAN, scores the result and names each cluster by severity.
//! See [`pipeline::Pipeline::run`].

pub mod analysis;
pub mod cache;
pub mod clustering;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod loader;
pub mod map;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod store;

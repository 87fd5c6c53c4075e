//! Per-session memory of the last clustering result.

use std::sync::Arc;
use tracing::debug;

use crate::pipeline::{ClusteringResult, RunParams};

/// Holds at most one result, valid only for the parameters that produced it.
#[derive(Debug, Default)]
pub struct Session {
    result: Option<Arc<ClusteringResult>>,
    last_params: Option<RunParams>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<ClusteringResult>> {
        self.result.clone()
    }

    pub fn last_params(&self) -> Option<&RunParams> {
        self.last_params.as_ref()
    }

    /// Records `params` as the active selection. A stored result for other
    /// parameters is discarded. Returns whether a result was discarded.
    pub fn select(&mut self, params: &RunParams) -> bool {
        if self.last_params.as_ref() == Some(params) {
            return false;
        }
        let discarded = self.result.take().is_some();
        if discarded {
            debug!("Parameters changed, discarding session result");
        }
        self.last_params = Some(params.clone());
        discarded
    }

    pub fn commit(&mut self, result: Arc<ClusteringResult>) {
        self.last_params = Some(result.params.clone());
        self.result = Some(result);
    }

    pub fn clear(&mut self) {
        self.result = None;
        self.last_params = None;
    }
}

//! Decision Policy
//!
//! Maps overall confidence to a disposition:
//! - ≥ auto_apply_at (default 95) → AutoApply
//! - ≥ review_at (default 80) → NeedsReview
//! - otherwise → Skip
//!
//! Thresholds live in a shared handle. A resolution takes one snapshot at
//! its start; runtime updates apply from the next resolution.

use crate::config::ThresholdConfig;
use crate::error::Result;
use crate::types::Disposition;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Disposition for a confidence under fixed thresholds
pub fn decide(thresholds: &ThresholdConfig, confidence: f64) -> Disposition {
    if confidence >= thresholds.auto_apply_at {
        Disposition::AutoApply
    } else if confidence >= thresholds.review_at {
        Disposition::NeedsReview
    } else {
        Disposition::Skip
    }
}

/// Shared, runtime-updatable thresholds
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    thresholds: Arc<RwLock<ThresholdConfig>>,
}

impl DecisionPolicy {
    pub fn new(thresholds: ThresholdConfig) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            thresholds: Arc::new(RwLock::new(thresholds)),
        })
    }

    /// Current thresholds
    pub fn snapshot(&self) -> ThresholdConfig {
        *self.thresholds.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace thresholds; invalid values leave the current ones in place
    pub fn update(&self, thresholds: ThresholdConfig) -> Result<()> {
        thresholds.validate()?;
        *self.thresholds.write().unwrap_or_else(|e| e.into_inner()) = thresholds;
        info!(
            auto_apply_at = thresholds.auto_apply_at,
            review_at = thresholds.review_at,
            "Decision thresholds updated"
        );
        Ok(())
    }
}

//! Tuning knobs for the extraction pipeline.
//!
//! Defaults reproduce the production behaviour: two pages in flight, a minute
//! per page, two minutes per batch, 100 DPI renders bounded to 800 px.
//! Every value can be overridden from the environment with `MEDINTAKE_*`.

use std::time::Duration;

use serde::Serialize;

use crate::config::ENV_PIPELINE_PREFIX;
use crate::pipeline::extraction::pdf_renderer::{DEFAULT_RENDER_DPI, MAX_IMAGE_DIMENSION_PX};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Pages extracted concurrently per batch.
    pub batch_size: usize,
    /// Per-page extraction timeout.
    pub page_timeout_secs: u64,
    /// Deadline for a whole batch; stragglers are abandoned.
    pub batch_timeout_secs: u64,
    pub render_dpi: u32,
    /// Neither side of an uploaded image exceeds this.
    pub max_image_dimension: u32,
    pub max_upload_bytes: usize,
    /// Minimum spacing between two extractions by the same caller.
    pub rate_limit_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            page_timeout_secs: 60,
            batch_timeout_secs: 120,
            render_dpi: DEFAULT_RENDER_DPI,
            max_image_dimension: MAX_IMAGE_DIMENSION_PX,
            max_upload_bytes: 10 * 1024 * 1024,
            rate_limit_interval_secs: 5,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Derivation
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Defaults with `MEDINTAKE_<FIELD>` environment overrides applied.
    /// Unparseable or zero values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        override_from(&lookup, "BATCH_SIZE", &mut cfg.batch_size);
        override_from(&lookup, "PAGE_TIMEOUT_SECS", &mut cfg.page_timeout_secs);
        override_from(&lookup, "BATCH_TIMEOUT_SECS", &mut cfg.batch_timeout_secs);
        override_from(&lookup, "RENDER_DPI", &mut cfg.render_dpi);
        override_from(&lookup, "MAX_IMAGE_DIMENSION", &mut cfg.max_image_dimension);
        override_from(&lookup, "MAX_UPLOAD_BYTES", &mut cfg.max_upload_bytes);
        override_from(
            &lookup,
            "RATE_LIMIT_INTERVAL_SECS",
            &mut cfg.rate_limit_interval_secs,
        );
        cfg
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_interval_secs)
    }
}

fn override_from<T>(lookup: &impl Fn(&str) -> Option<String>, field: &str, slot: &mut T)
where
    T: std::str::FromStr + PartialEq + Default,
{
    let key = format!("{ENV_PIPELINE_PREFIX}{field}");
    let Some(raw) = lookup(&key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => *slot = value,
        _ => tracing::warn!(key = %key, value = %raw, "Ignoring invalid pipeline override"),
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

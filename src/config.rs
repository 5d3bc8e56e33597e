/// Application-level constants
pub const APP_NAME: &str = "medintake";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// Environment variables read at startup.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_VISION_MODEL: &str = "MEDINTAKE_VISION_MODEL";
pub const ENV_TEXT_MODEL: &str = "MEDINTAKE_TEXT_MODEL";
pub const ENV_PDFIUM_LIB_PATH: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Prefix of every pipeline tuning override (see `PipelineConfig::from_env`).
pub const ENV_PIPELINE_PREFIX: &str = "MEDINTAKE_";

/// Whether this is a debug build.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "medintake=debug,medintake_lib=debug,info"
    } else {
        "medintake=info,medintake_lib=info,warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_is_medintake() {
        assert_eq!(APP_NAME, "medintake");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn log_filter_targets_this_crate() {
        assert!(default_log_filter().contains("medintake_lib="));
    }
}

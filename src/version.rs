//! Build metadata, taken from `NEWS_BUILD_TIMESTAMP` and `NEWS_BUILD_BRANCH`
//! at compile time.

const UNKNOWN: &str = "unknown";

fn or_unknown(value: Option<&'static str>) -> &'static str {
    value.filter(|v| !v.is_empty()).unwrap_or(UNKNOWN)
}

pub fn build_timestamp() -> &'static str {
    or_unknown(option_env!("NEWS_BUILD_TIMESTAMP"))
}

pub fn build_branch() -> &'static str {
    or_unknown(option_env!("NEWS_BUILD_BRANCH"))
}

/// One-line version string, e.g. `newsletter-stories 0.1.0 (built 2024-01-15T10:00:00Z from main)`.
pub fn version_string() -> String {
    format!(
        "{} {} (built {} from {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        build_timestamp(),
        build_branch()
    )
}

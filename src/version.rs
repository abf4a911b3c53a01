const fn unwrap_or_cargo_version(opt: Option<&'static str>) -> &'static str {
    match opt {
        Some(val) => val,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Release version stamped by CI through `APP_VERSION`, else the crate version.
/// Sent as part of the probe user agent and reported by `/status`.
pub const VERSION: &str = unwrap_or_cargo_version(option_env!("APP_VERSION"));

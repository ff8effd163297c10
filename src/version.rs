use semver::{Version, VersionReq};

/// Version of this library, fixed at build time.
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Native library versions a binding layer built against this release accepts.
pub const SUPPORTED_RANGE: &str = ">=0.1.0, <1.0.0";

pub fn lib_version() -> &'static str {
    LIB_VERSION
}

/// Parse a version string, accepting a missing patch (`"0.3"`) or minor (`"1"`) component.
pub fn parse_version(version: &str) -> Result<Version, semver::Error> {
    let version = version.trim();
    let (core, extra) = match version.find(|c| c == '-' || c == '+') {
        Some(pos) => version.split_at(pos),
        None => (version, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, extra),
        2 => format!("{}.0{}", core, extra),
        _ => version.to_string(),
    };
    Version::parse(&padded)
}

/// Whether `version` falls inside [`SUPPORTED_RANGE`].
pub fn is_compatible(version: &str) -> bool {
    let req = match VersionReq::parse(SUPPORTED_RANGE) {
        Ok(req) => req,
        Err(e) => {
            log::error!("Bad supported range {}: {}", SUPPORTED_RANGE, e);
            return false;
        }
    };
    match parse_version(version) {
        Ok(v) => req.matches(&v),
        Err(e) => {
            log::warn!("Unparseable library version {:?}: {}", version, e);
            false
        }
    }
}

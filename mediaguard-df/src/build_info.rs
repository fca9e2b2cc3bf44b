//! Build identification stamped by `build.rs`

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    /// Short commit hash, `-dirty` suffixed for uncommitted changes
    pub git_commit: &'static str,
    pub profile: &'static str,
    pub target: &'static str,
}

/// This binary's build
pub const BUILD: BuildInfo = BuildInfo {
    version: env!("CARGO_PKG_VERSION"),
    git_commit: env!("MEDIAGUARD_GIT_COMMIT"),
    profile: env!("MEDIAGUARD_BUILD_PROFILE"),
    target: env!("MEDIAGUARD_BUILD_TARGET"),
};

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (git {}, {} build for {})",
            self.version, self.git_commit, self.profile, self.target
        )
    }
}

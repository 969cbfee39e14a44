use crate::error::C8RunError;
use std::path::{Path, PathBuf};

/// Oldest Java release the distributions run on
pub const MIN_JAVA_VERSION: u32 = 21;

/// Locate the java executable, preferring `java_home` over `PATH`
pub fn resolve_java_binary(java_home: Option<&Path>) -> Result<PathBuf, C8RunError> {
    let name = if cfg!(windows) { "java.exe" } else { "java" };

    if let Some(home) = java_home {
        let candidate = home.join("bin").join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        return Err(C8RunError::Configuration(format!(
            "JAVA_HOME is set to {} but {} does not exist",
            home.display(),
            candidate.display()
        )));
    }

    which::which("java").map_err(|e| {
        C8RunError::Configuration(format!(
            "java was not found on PATH and JAVA_HOME is not set: {e}"
        ))
    })
}

/// Extract the major version from `java --version` or `java -version` output
///
/// Understands both `openjdk 21.0.2 2024-01-16` and the legacy
/// `java version "1.8.0_392"` forms.
pub fn parse_java_major_version(output: &str) -> Option<u32> {
    let first_line = output.lines().find(|l| !l.trim().is_empty())?;

    let token = first_line
        .split_whitespace()
        .map(|t| t.trim_matches('"'))
        .find(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()))?;

    let mut parts = token.split(|c: char| !c.is_ascii_digit());
    let major: u32 = parts.next()?.parse().ok()?;
    if major == 1 {
        return parts.next()?.parse().ok();
    }
    Some(major)
}

/// Reject Java releases older than [`MIN_JAVA_VERSION`]
pub fn check_java_version(output: &str) -> Result<u32, C8RunError> {
    let found = parse_java_major_version(output).ok_or_else(|| {
        C8RunError::Configuration(format!(
            "could not determine java version from {:?}",
            output.lines().next().unwrap_or_default()
        ))
    })?;
    if found < MIN_JAVA_VERSION {
        return Err(C8RunError::UnsupportedJava {
            found,
            required: MIN_JAVA_VERSION,
        });
    }
    Ok(found)
}

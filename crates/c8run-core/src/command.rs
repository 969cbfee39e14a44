//! Pure command construction shared by every platform provider.
//!
//! Providers differ only in file suffixes and the classpath separator, which
//! they describe with a [`PlatformLayout`]. Nothing in here touches a process;
//! the only side effects are filesystem existence checks.

use crate::error::C8RunError;
use crate::process::CommandSpec;
use std::path::{Path, PathBuf};

const CONNECTORS_MAIN_CLASS: &str = "io.camunda.connector.runtime.app.ConnectorRuntimeApplication";

/// File naming conventions of a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLayout {
    /// Suffix of start scripts shipped with the distributions (`""` or `".bat"`)
    pub script_suffix: &'static str,
    /// Separator between java classpath entries
    pub classpath_separator: char,
}

impl PlatformLayout {
    pub const UNIX: PlatformLayout = PlatformLayout {
        script_suffix: "",
        classpath_separator: ':',
    };

    pub const WINDOWS: PlatformLayout = PlatformLayout {
        script_suffix: ".bat",
        classpath_separator: ';',
    };
}

pub fn browser_url(protocol: &str, port: u16) -> String {
    format!("{protocol}://localhost:{port}/operate")
}

fn require_version(name: &str, version: &str) -> Result<(), C8RunError> {
    if version.trim().is_empty() {
        return Err(C8RunError::invalid_command(format!(
            "{name} version must not be empty"
        )));
    }
    Ok(())
}

fn require_dir(dir: &Path) -> Result<(), C8RunError> {
    if !dir.is_dir() {
        return Err(C8RunError::invalid_command(format!(
            "directory {} does not exist",
            dir.display()
        )));
    }
    Ok(())
}

fn require_file(path: &Path, what: &str) -> Result<(), C8RunError> {
    if !path.is_file() {
        return Err(C8RunError::invalid_command(format!(
            "{what} {} not found",
            path.display()
        )));
    }
    Ok(())
}

pub fn elasticsearch_dir(parent_dir: &Path, version: &str) -> PathBuf {
    parent_dir.join(format!("elasticsearch-{version}"))
}

pub fn camunda_dir(parent_dir: &Path, version: &str) -> PathBuf {
    parent_dir.join(format!("camunda-zeebe-{version}"))
}

pub fn version_cmd(java_binary: &Path) -> Result<CommandSpec, C8RunError> {
    require_file(java_binary, "java binary")?;
    Ok(CommandSpec::new(java_binary).arg("--version"))
}

pub fn elasticsearch_cmd(
    layout: PlatformLayout,
    version: &str,
    parent_dir: &Path,
) -> Result<CommandSpec, C8RunError> {
    require_version("elasticsearch", version)?;
    require_dir(parent_dir)?;

    let script = elasticsearch_dir(parent_dir, version)
        .join("bin")
        .join(format!("elasticsearch{}", layout.script_suffix));
    require_file(&script, "elasticsearch start script")?;

    Ok(CommandSpec::new(script)
        .args([
            "-E",
            "xpack.ml.enabled=false",
            "-E",
            "xpack.security.enabled=false",
        ])
        .working_dir(parent_dir))
}

pub fn connectors_cmd(
    layout: PlatformLayout,
    java_binary: &Path,
    parent_dir: &Path,
    camunda_version: &str,
) -> Result<CommandSpec, C8RunError> {
    require_version("camunda", camunda_version)?;
    require_dir(parent_dir)?;
    require_file(java_binary, "java binary")?;

    let separator = layout.classpath_separator.to_string();
    let classpath = [
        parent_dir.join("*"),
        parent_dir.join("custom_connectors").join("*"),
        camunda_dir(parent_dir, camunda_version).join("lib").join("*"),
    ]
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(&separator);

    let properties = parent_dir.join("connectors-application.properties");

    Ok(CommandSpec::new(java_binary)
        .arg("-classpath")
        .arg(classpath)
        .arg(CONNECTORS_MAIN_CLASS)
        .arg(format!("--spring.config.location={}", properties.display()))
        .working_dir(parent_dir))
}

/// Camunda start script with the distribution's configuration directory
///
/// The default `--spring.config.location` is left out when `extra_args`
/// already sets one.
pub fn camunda_cmd(
    layout: PlatformLayout,
    camunda_version: &str,
    parent_dir: &Path,
    extra_args: &[String],
    java_opts: Option<&str>,
) -> Result<CommandSpec, C8RunError> {
    require_version("camunda", camunda_version)?;
    require_dir(parent_dir)?;

    let script = camunda_dir(parent_dir, camunda_version)
        .join("bin")
        .join(format!("camunda{}", layout.script_suffix));
    require_file(&script, "camunda start script")?;

    let mut spec = CommandSpec::new(script).working_dir(parent_dir);
    if !extra_args
        .iter()
        .any(|arg| arg.starts_with("--spring.config.location"))
    {
        let mut location = parent_dir.join("configuration").display().to_string();
        location.push(std::path::MAIN_SEPARATOR);
        spec = spec.arg(format!("--spring.config.location={location}"));
    }
    spec = spec.args(extra_args.iter().cloned());

    if let Some(opts) = java_opts.filter(|o| !o.trim().is_empty()) {
        spec = spec.env("JAVA_OPTS", opts);
    }
    Ok(spec)
}

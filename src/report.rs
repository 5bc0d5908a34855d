//! Configuration report for the foreign module.
//!
//! [`report`] answers "is TensorFlow usable, and where is it?" without ever
//! raising on a missing module: the negative answer is a
//! [`ConfigReport::Unavailable`] carrying the diagnostic text users see.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::interop::{get_path, ForeignObject, Interop, InterpreterConfig};
use crate::version::{extract_version_str, Version};

const PREAMBLE: &str = "Valid installation of TensorFlow not found.";

/// Closing line of every missing-module diagnostic.
pub const INSTALL_HINT: &str = "You can install TensorFlow by running `pip install tensorflow` \
                                in one of the environments above.";

/// Whether and where the foreign module was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigReport {
    Available {
        version: Version,
        version_str: String,
        location: PathBuf,
        python: PathBuf,
        python_version: String,
    },
    Unavailable {
        python_versions: Vec<PathBuf>,
        error_message: String,
    },
}

impl ConfigReport {
    pub fn available(&self) -> bool {
        matches!(self, ConfigReport::Available { .. })
    }

    pub fn version(&self) -> Option<Version> {
        match self {
            ConfigReport::Available { version, .. } => Some(*version),
            ConfigReport::Unavailable { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// Serialized flat, with `available` as the discriminant.
impl Serialize for ConfigReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ConfigReport::Available {
                version,
                version_str,
                location,
                python,
                python_version,
            } => {
                let mut s = serializer.serialize_struct("ConfigReport", 6)?;
                s.serialize_field("available", &true)?;
                s.serialize_field("version", version)?;
                s.serialize_field("version_str", version_str)?;
                s.serialize_field("location", location)?;
                s.serialize_field("python", python)?;
                s.serialize_field("python_version", python_version)?;
                s.end()
            }
            ConfigReport::Unavailable {
                python_versions,
                error_message,
            } => {
                let mut s = serializer.serialize_struct("ConfigReport", 3)?;
                s.serialize_field("available", &false)?;
                s.serialize_field("python_versions", python_versions)?;
                s.serialize_field("error_message", error_message)?;
                s.end()
            }
        }
    }
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self, home_dir().as_deref()))
    }
}

/// Build a fresh report from the current state of `interop`.
///
/// Imports `module` at most once. A [`crate::Binding`] builds its report
/// from its own cached resolution instead, through [`available`] and
/// [`unavailable`].
pub fn report(interop: &dyn Interop, module: &str) -> Result<ConfigReport> {
    if !interop.module_available(module) {
        let config = interop.interpreter_config(module).ok();
        let import_error = interop.import(module).err().map(|e| e.to_string());
        let message = error_message(module, config.as_ref(), import_error.as_deref());
        return Ok(unavailable(config.as_ref(), message));
    }

    let handle = interop.import(module)?;
    available(interop, module, &*handle)
}

/// Report for a module that has already been imported as `handle`.
pub fn available(
    interop: &dyn Interop,
    module: &str,
    handle: &dyn ForeignObject,
) -> Result<ConfigReport> {
    let config = interop.interpreter_config(module)?;
    let version_str = extract_version_str(handle)?;
    let version = Version::parse(&version_str)?;

    let location = config
        .required_module_path
        .clone()
        .or_else(|| {
            let file = get_path(handle, "__file__").ok()?;
            Path::new(file.as_str().ok()?).parent().map(Path::to_path_buf)
        })
        .unwrap_or_default();

    Ok(ConfigReport::Available {
        version,
        version_str,
        location,
        python: config.python,
        python_version: config.version,
    })
}

/// Report for a module that could not be imported.
pub fn unavailable(config: Option<&InterpreterConfig>, error_message: String) -> ConfigReport {
    ConfigReport::Unavailable {
        python_versions: config.map(|c| c.python_versions.clone()).unwrap_or_default(),
        error_message,
    }
}

/// The module's `major.minor` version, or `None` when it is not installed.
pub fn version(interop: &dyn Interop, module: &str) -> Result<Option<Version>> {
    Ok(report(interop, module)?.version())
}

/// Diagnostic shown when `module` cannot be found.
///
/// Never fails: paths that cannot be normalized are printed as given.
pub fn error_message(
    module: &str,
    config: Option<&InterpreterConfig>,
    import_error: Option<&str>,
) -> String {
    let mut message = String::from(PREAMBLE);
    message.push('\n');

    if let Some(config) = config.filter(|c| !c.python_versions.is_empty()) {
        message.push_str(&format!(
            "\nPython environments searched for '{module}' package:\n"
        ));
        for path in &config.python_versions {
            message.push(' ');
            message.push_str(&normalize(path).display().to_string());
            message.push('\n');
        }
    }

    if let Some(err) = import_error {
        message.push_str("\nPython exception encountered:\n ");
        message.push_str(err);
        message.push('\n');
    }

    message.push('\n');
    message.push_str(INSTALL_HINT);
    message.push('\n');
    message
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Human-readable summary, with `home` shortened to `~`.
pub fn format(report: &ConfigReport, home: Option<&Path>) -> String {
    match report {
        ConfigReport::Available {
            version_str,
            location,
            python,
            python_version,
            ..
        } => format!(
            "TensorFlow v{} ({})\nPython v{} ({})",
            version_str,
            alias_home(location, home),
            python_version,
            alias_home(python, home),
        ),
        ConfigReport::Unavailable { error_message, .. } => error_message.clone(),
    }
}

/// Replace a leading `home` with `~`.
pub fn alias_home(path: &Path, home: Option<&Path>) -> String {
    match home.and_then(|h| path.strip_prefix(h).ok()) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => path.display().to_string(),
    }
}

/// The current user's home directory, from the environment.
pub fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
}

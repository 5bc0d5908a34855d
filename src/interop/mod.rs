//! The seam between tfbridge and the runtime that hosts the foreign module.
//!
//! tfbridge never marshals values itself. It talks to a foreign runtime
//! through two traits:
//!
//! - [`Interop`]: process-level queries (is a module importable, which
//!   interpreter is configured) and the import itself.
//! - [`ForeignObject`]: attribute access and method calls on a live foreign
//!   object (modules, loggers, tensors).
//!
//! # Implementations
//!
//! - [`mock`]: an in-memory runtime used by the test suite and by hosts
//!   that want to exercise the binding without a Python installation.
//! - `python` (cargo feature `python`): a PyO3-backed runtime bound to the
//!   interpreter PyO3 links against.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::ClassFilter;
use crate::help::HelpHandler;

pub mod mock;
#[cfg(feature = "python")]
pub mod python;

/// Errors raised by the foreign runtime.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForeignError {
    #[error("No module named '{0}'")]
    Import(String),

    #[error("attribute '{0}' not found")]
    MissingAttribute(String),

    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: &'static str, got: String },

    /// An exception raised inside the foreign runtime, already rendered.
    #[error("{0}")]
    Exception(String),

    #[error("{0} is not supported by this runtime")]
    Unsupported(&'static str),
}

/// A value crossing the interop boundary.
///
/// Scalars, strings and lists are converted eagerly; everything else stays
/// a handle to the live foreign object.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(Arc<dyn ForeignObject>),
}

impl Value {
    fn kind(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Object(obj) => obj.type_name(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Result<bool, ForeignError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ForeignError::TypeMismatch {
                expected: "bool",
                got: other.kind(),
            }),
        }
    }

    pub fn as_int(&self) -> Result<i64, ForeignError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ForeignError::TypeMismatch {
                expected: "int",
                got: other.kind(),
            }),
        }
    }

    pub fn as_str(&self) -> Result<&str, ForeignError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ForeignError::TypeMismatch {
                expected: "str",
                got: other.kind(),
            }),
        }
    }

    pub fn into_object(self) -> Result<Arc<dyn ForeignObject>, ForeignError> {
        match self {
            Value::Object(obj) => Ok(obj),
            other => Err(ForeignError::TypeMismatch {
                expected: "object",
                got: other.kind(),
            }),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Object(obj) => write!(f, "Object(<{}>)", obj.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Foreign objects compare by identity.
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// A live object owned by the foreign runtime.
pub trait ForeignObject: Send + Sync {
    /// Short type name, used in error messages.
    fn type_name(&self) -> String;

    /// Fully-qualified type tags, most specific first.
    fn type_tags(&self) -> Vec<String> {
        vec![self.type_name()]
    }

    fn getattr(&self, name: &str) -> Result<Value, ForeignError>;

    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, ForeignError>;

    /// Downcasting hook for runtimes that need their own handle back.
    fn as_any(&self) -> &dyn Any;
}

/// Walk a dotted attribute path (`"version.VERSION"`) from `root`.
pub fn get_path(root: &dyn ForeignObject, path: &str) -> Result<Value, ForeignError> {
    let mut segments = path.split('.');
    let first = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ForeignError::MissingAttribute(path.to_string()))?;

    let mut current = root.getattr(first)?;
    for segment in segments {
        let obj = current.into_object()?;
        current = obj.getattr(segment)?;
    }
    Ok(current)
}

/// Call the method at the end of a dotted path (`"logging.set_verbosity"`).
pub fn call_path(
    root: &dyn ForeignObject,
    path: &str,
    args: &[Value],
) -> Result<Value, ForeignError> {
    match path.rsplit_once('.') {
        Some((parent, method)) => {
            let target = get_path(root, parent)?.into_object()?;
            target.call_method(method, args)
        }
        None => root.call_method(path, args),
    }
}

/// Interpreter configuration as reported by the interop runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Path of the interpreter in use.
    pub python: PathBuf,

    /// Interpreter version, e.g. `"3.8"`.
    pub version: String,

    /// Every interpreter location searched for the module.
    pub python_versions: Vec<PathBuf>,

    /// Where the requested module lives, if it was found.
    pub required_module_path: Option<PathBuf>,
}

/// A deferred import request, registered before anything is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredImport {
    pub module: String,
    pub priority: u32,
    pub environment: String,
}

/// Process-level access to the foreign runtime.
pub trait Interop: Send + Sync {
    /// Whether `module` can be imported. Never raises.
    fn module_available(&self, module: &str) -> bool;

    /// Interpreter configuration, resolved with `module` as the required
    /// module.
    fn interpreter_config(&self, module: &str) -> Result<InterpreterConfig, ForeignError>;

    /// Import `module`, returning a handle to it.
    fn import(&self, module: &str) -> Result<Arc<dyn ForeignObject>, ForeignError>;

    /// Use the environment of the interpreter at `python` when looking for
    /// modules. Must be called before the first import to take effect.
    ///
    /// The hooks below are optional. A runtime that lacks one returns
    /// [`ForeignError::Unsupported`], which the binding logs and ignores.
    fn select_interpreter(&self, _python: &Path) -> Result<(), ForeignError> {
        Err(ForeignError::Unsupported("interpreter selection"))
    }

    /// Record a deferred import with its priority and target environment.
    fn register_deferred(&self, _import: &DeferredImport) -> Result<(), ForeignError> {
        Err(ForeignError::Unsupported("deferred import registration"))
    }

    /// Install a filter that rewrites the type tags of converted values.
    fn register_class_filter(&self, _filter: ClassFilter) -> Result<(), ForeignError> {
        Err(ForeignError::Unsupported("class filters"))
    }

    /// Install a documentation handler for `module`.
    fn register_help_handler(
        &self,
        _module: &str,
        _handler: HelpHandler,
    ) -> Result<(), ForeignError> {
        Err(ForeignError::Unsupported("help handlers"))
    }
}

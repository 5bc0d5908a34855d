//! PyO3-backed foreign runtime.
//!
//! Binds to the Python interpreter PyO3 was built against. Scalars, strings,
//! lists and tuples are converted to [`Value`]s; everything else is kept as a
//! [`PyHandle`] holding a strong reference to the Python object.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use pyo3::exceptions::PyAttributeError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyFloat, PyList, PyLong, PyString, PyTuple};

use crate::classify::ClassFilter;
use crate::interop::{ForeignError, ForeignObject, Interop, InterpreterConfig, Value};

type Filter = Option<Arc<ClassFilter>>;

// Prints one `sys.path` entry per line.
const SYS_PATH_SCRIPT: &str = "import sys; print('\\n'.join(p for p in sys.path if p))";

fn foreign_error(py: Python<'_>, err: PyErr, name: &str) -> ForeignError {
    if err.is_instance_of::<PyAttributeError>(py) {
        ForeignError::MissingAttribute(name.to_string())
    } else {
        ForeignError::Exception(err.to_string())
    }
}

fn to_value(obj: &Bound<'_, PyAny>, filter: &Filter) -> Value {
    if obj.is_none() {
        return Value::None;
    }
    // bool subclasses int in Python, so it must be checked first.
    if obj.is_instance_of::<PyBool>() {
        if let Ok(b) = obj.extract::<bool>() {
            return Value::Bool(b);
        }
    }
    if obj.is_instance_of::<PyLong>() {
        if let Ok(i) = obj.extract::<i64>() {
            return Value::Int(i);
        }
    }
    if obj.is_instance_of::<PyFloat>() {
        if let Ok(x) = obj.extract::<f64>() {
            return Value::Float(x);
        }
    }
    if obj.is_instance_of::<PyString>() {
        if let Ok(s) = obj.extract::<String>() {
            return Value::Str(s);
        }
    }
    if let Ok(list) = obj.downcast::<PyList>() {
        return Value::List(list.iter().map(|item| to_value(&item, filter)).collect());
    }
    if let Ok(tuple) = obj.downcast::<PyTuple>() {
        return Value::List(tuple.iter().map(|item| to_value(&item, filter)).collect());
    }
    Value::Object(Arc::new(PyHandle {
        obj: obj.clone().unbind(),
        filter: filter.clone(),
    }))
}

fn to_py(py: Python<'_>, value: &Value) -> Result<PyObject, ForeignError> {
    Ok(match value {
        Value::None => py.None(),
        Value::Bool(b) => b.into_py(py),
        Value::Int(i) => i.into_py(py),
        Value::Float(x) => x.into_py(py),
        Value::Str(s) => s.as_str().into_py(py),
        Value::List(items) => {
            let converted = items
                .iter()
                .map(|item| to_py(py, item))
                .collect::<Result<Vec<_>, _>>()?;
            PyList::new_bound(py, converted).into_any().unbind()
        }
        Value::Object(obj) => match obj.as_any().downcast_ref::<PyHandle>() {
            Some(handle) => handle.obj.clone_ref(py),
            None => {
                return Err(ForeignError::TypeMismatch {
                    expected: "python object",
                    got: obj.type_name(),
                })
            }
        },
    })
}

/// A strong reference to a Python object.
///
/// Objects reached through a runtime with a registered [`ClassFilter`]
/// report filtered type tags.
pub struct PyHandle {
    obj: PyObject,
    filter: Filter,
}

impl ForeignObject for PyHandle {
    fn type_name(&self) -> String {
        Python::with_gil(|py| {
            self.obj
                .bind(py)
                .get_type()
                .name()
                .map(|n| n.to_string())
                .unwrap_or_else(|_| "object".to_string())
        })
    }

    fn type_tags(&self) -> Vec<String> {
        Python::with_gil(|py| {
            let mro = match self.obj.bind(py).get_type().getattr("__mro__") {
                Ok(mro) => mro,
                Err(_) => return vec![],
            };
            let Ok(classes) = mro.downcast::<PyTuple>() else {
                return vec![];
            };
            let tags: Vec<String> = classes
                .iter()
                .filter_map(|cls| {
                    let module: String = cls.getattr("__module__").ok()?.extract().ok()?;
                    let name: String = cls.getattr("__qualname__").ok()?.extract().ok()?;
                    Some(format!("{module}.{name}"))
                })
                .collect();
            match &self.filter {
                Some(filter) => filter.apply(&tags),
                None => tags,
            }
        })
    }

    fn getattr(&self, name: &str) -> Result<Value, ForeignError> {
        Python::with_gil(|py| {
            self.obj
                .bind(py)
                .getattr(name)
                .map(|v| to_value(&v, &self.filter))
                .map_err(|e| foreign_error(py, e, name))
        })
    }

    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, ForeignError> {
        Python::with_gil(|py| {
            let converted = args
                .iter()
                .map(|a| to_py(py, a))
                .collect::<Result<Vec<_>, _>>()?;
            let tuple = PyTuple::new_bound(py, converted);
            self.obj
                .bind(py)
                .call_method1(name, tuple)
                .map(|v| to_value(&v, &self.filter))
                .map_err(|e| foreign_error(py, e, name))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Ask the interpreter at `python` for its module search path.
fn interpreter_search_path(python: &Path) -> Result<Vec<String>, ForeignError> {
    let output = Command::new(python)
        .args(["-c", SYS_PATH_SCRIPT])
        .output()
        .map_err(|e| ForeignError::Exception(format!("cannot run {}: {e}", python.display())))?;
    if !output.status.success() {
        return Err(ForeignError::Exception(format!(
            "{} exited with {}",
            python.display(),
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn prepend_sys_path(py: Python<'_>, dirs: &[String]) -> PyResult<()> {
    let sys = PyModule::import_bound(py, "sys")?;
    let path = sys.getattr("path")?.downcast_into::<PyList>()?;
    for dir in dirs.iter().rev() {
        if !path.contains(dir.as_str())? {
            path.insert(0, dir.as_str())?;
        }
    }
    Ok(())
}

/// Runtime backed by the interpreter PyO3 links against.
///
/// The embedded interpreter itself is fixed at link time. An interpreter
/// chosen with [`Interop::select_interpreter`] is run once to read its
/// `sys.path`, which is prepended to the embedded one before the first
/// import so its site-packages are searched first. Import priorities and
/// help handlers have no Python counterpart and are reported as
/// unsupported.
#[derive(Debug, Default)]
pub struct PythonInterop {
    interpreter: Mutex<Option<PathBuf>>,
    search_path: OnceLock<Vec<String>>,
    path_applied: AtomicBool,
    filter: Mutex<Filter>,
}

impl PythonInterop {
    pub fn new() -> Self {
        Self::default()
    }

    fn interpreter(&self) -> Option<PathBuf> {
        self.interpreter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn filter(&self) -> Filter {
        self.filter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run `f` under the GIL, after applying the selected interpreter's
    /// search path once.
    fn with_gil<F, R>(&self, f: F) -> R
    where
        F: for<'py> FnOnce(Python<'py>) -> R,
    {
        // The override interpreter is queried before taking the GIL.
        let extra = self.search_path.get_or_init(|| match self.interpreter() {
            Some(python) => interpreter_search_path(&python).unwrap_or_else(|e| {
                tracing::debug!("search path of {} unavailable: {}", python.display(), e);
                Vec::new()
            }),
            None => Vec::new(),
        });
        Python::with_gil(|py| {
            if !extra.is_empty() && !self.path_applied.swap(true, Ordering::SeqCst) {
                if let Err(e) = prepend_sys_path(py, extra) {
                    tracing::debug!("sys.path not extended: {}", e);
                }
            }
            f(py)
        })
    }

    fn find_spec<'py>(py: Python<'py>, module: &str) -> PyResult<Option<Bound<'py, PyAny>>> {
        let util = PyModule::import_bound(py, "importlib.util")?;
        let spec = util.call_method1("find_spec", (module,))?;
        Ok(if spec.is_none() { None } else { Some(spec) })
    }

    fn module_path(spec: &Bound<'_, PyAny>) -> Option<PathBuf> {
        // Packages carry their directory; plain modules only their file.
        if let Ok(locations) = spec.getattr("submodule_search_locations") {
            if let Ok(first) = locations.get_item(0) {
                if let Ok(dir) = first.extract::<String>() {
                    return Some(PathBuf::from(dir));
                }
            }
        }
        let origin: String = spec.getattr("origin").ok()?.extract().ok()?;
        PathBuf::from(origin).parent().map(PathBuf::from)
    }
}

impl Interop for PythonInterop {
    fn module_available(&self, module: &str) -> bool {
        self.with_gil(|py| matches!(Self::find_spec(py, module), Ok(Some(_))))
    }

    fn interpreter_config(&self, module: &str) -> Result<InterpreterConfig, ForeignError> {
        self.with_gil(|py| {
            let sys = PyModule::import_bound(py, "sys")
                .map_err(|e| foreign_error(py, e, "sys"))?;
            let executable: String = sys
                .getattr("executable")
                .and_then(|v| v.extract())
                .map_err(|e| foreign_error(py, e, "executable"))?;
            let (major, minor): (u32, u32) = sys
                .getattr("version_info")
                .and_then(|v| Ok((v.get_item(0)?.extract()?, v.get_item(1)?.extract()?)))
                .map_err(|e| foreign_error(py, e, "version_info"))?;

            let required_module_path = match Self::find_spec(py, module) {
                Ok(Some(spec)) => Self::module_path(&spec),
                _ => None,
            };

            let python = PathBuf::from(executable);
            let mut python_versions: Vec<PathBuf> = self.interpreter().into_iter().collect();
            if !python_versions.contains(&python) {
                python_versions.push(python.clone());
            }
            Ok(InterpreterConfig {
                python_versions,
                python,
                version: format!("{major}.{minor}"),
                required_module_path,
            })
        })
    }

    fn import(&self, module: &str) -> Result<Arc<dyn ForeignObject>, ForeignError> {
        let filter = self.filter();
        self.with_gil(|py| {
            let m = PyModule::import_bound(py, module).map_err(|e| {
                tracing::debug!("import of {} failed: {}", module, e);
                ForeignError::Exception(e.to_string())
            })?;
            Ok(Arc::new(PyHandle {
                obj: m.into_any().unbind(),
                filter,
            }) as Arc<dyn ForeignObject>)
        })
    }

    fn select_interpreter(&self, python: &Path) -> Result<(), ForeignError> {
        if self.search_path.get().is_some() {
            return Err(ForeignError::Exception(format!(
                "cannot select {}: the interpreter is already in use",
                python.display()
            )));
        }
        *self
            .interpreter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(python.to_path_buf());
        Ok(())
    }

    fn register_class_filter(&self, filter: ClassFilter) -> Result<(), ForeignError> {
        *self
            .filter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(filter));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TENSOR_TAG;
    use crate::interop::call_path;

    #[test]
    fn registered_filter_tags_converted_objects() {
        let interop = PythonInterop::new();
        interop
            .register_class_filter(ClassFilter::new(TENSOR_TAG, ["collections.OrderedDict"]))
            .unwrap();
        let collections = interop.import("collections").unwrap();
        let dict = call_path(&*collections, "OrderedDict", &[])
            .unwrap()
            .into_object()
            .unwrap();
        let tags = dict.type_tags();
        assert_eq!(tags[0], TENSOR_TAG);
        assert!(tags.iter().any(|t| t == "collections.OrderedDict"));
    }

    #[test]
    fn unfiltered_objects_keep_their_tags() {
        let interop = PythonInterop::new();
        let collections = interop.import("collections").unwrap();
        let dict = call_path(&*collections, "OrderedDict", &[])
            .unwrap()
            .into_object()
            .unwrap();
        assert_eq!(dict.type_tags()[0], "collections.OrderedDict");
    }

    #[test]
    fn selected_interpreter_is_searched_first() {
        let interop = PythonInterop::new();
        let python = Path::new("/nonexistent/venv/bin/python");
        interop.select_interpreter(python).unwrap();
        let config = interop.interpreter_config("json").unwrap();
        assert_eq!(config.python_versions[0], python);
        assert!(config.python_versions.contains(&config.python));
        // An interpreter that cannot be run does not block imports.
        assert!(interop.import("json").is_ok());
        assert!(interop.select_interpreter(python).is_err());
    }

    #[test]
    fn missing_interpreter_has_no_search_path() {
        assert!(interpreter_search_path(Path::new("/nonexistent/bin/python")).is_err());
    }
}

//! In-memory foreign runtime.
//!
//! [`MockObject`] is a dynamic object with attributes and closures for
//! methods; [`MockInterop`] serves a fixed set of such modules together with
//! a canned [`InterpreterConfig`]. [`tensorflow_module`] assembles a module
//! shaped like a real TensorFlow install of a given version, picking the
//! modern or legacy API surface accordingly.

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::classify::ClassFilter;
use crate::help::HelpHandler;
use crate::interop::{
    DeferredImport, ForeignError, ForeignObject, Interop, InterpreterConfig, Value,
};
use crate::version::Version;

type Method = Arc<dyn Fn(&MockObject, &[Value]) -> Result<Value, ForeignError> + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A dynamic foreign object backed by maps.
pub struct MockObject {
    type_name: String,
    tags: Vec<String>,
    attrs: Mutex<HashMap<String, Value>>,
    methods: Mutex<HashMap<String, Method>>,
}

impl MockObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            tags: Vec::new(),
            attrs: Mutex::new(HashMap::new()),
            methods: Mutex::new(HashMap::new()),
        }
    }

    /// Set the fully-qualified type tags reported by [`ForeignObject::type_tags`].
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_attr(self, name: &str, value: impl Into<Value>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_object(self, name: &str, obj: MockObject) -> Self {
        self.set_attr(name, obj.into_value());
        self
    }

    pub fn with_method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&MockObject, &[Value]) -> Result<Value, ForeignError> + Send + Sync + 'static,
    {
        lock(&self.methods).insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn set_attr(&self, name: &str, value: impl Into<Value>) {
        lock(&self.attrs).insert(name.to_string(), value.into());
    }

    pub fn attr(&self, name: &str) -> Option<Value> {
        lock(&self.attrs).get(name).cloned()
    }

    pub fn into_value(self) -> Value {
        Value::Object(Arc::new(self))
    }
}

impl From<MockObject> for Value {
    fn from(obj: MockObject) -> Self {
        obj.into_value()
    }
}

impl ForeignObject for MockObject {
    fn type_name(&self) -> String {
        self.type_name.clone()
    }

    fn type_tags(&self) -> Vec<String> {
        if self.tags.is_empty() {
            vec![self.type_name.clone()]
        } else {
            self.tags.clone()
        }
    }

    fn getattr(&self, name: &str) -> Result<Value, ForeignError> {
        self.attr(name)
            .ok_or_else(|| ForeignError::MissingAttribute(name.to_string()))
    }

    fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, ForeignError> {
        // Release the table before calling so methods may mutate `self`.
        let method = lock(&self.methods).get(name).cloned();
        match method {
            Some(f) => f(self, args),
            None => Err(ForeignError::MissingAttribute(name.to_string())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn first_int(args: &[Value]) -> Result<i64, ForeignError> {
    args.first()
        .ok_or_else(|| ForeignError::Exception("TypeError: missing required argument".into()))?
        .as_int()
}

/// Python logging level for WARNING, the default level of a fresh logger.
pub const DEFAULT_LEVEL: i64 = 30;

/// Build a module mimicking TensorFlow at `version`.
///
/// Versions at or above 1.14 expose `version.VERSION` and `get_logger()`;
/// older ones expose `VERSION` and the `logging` verbosity accessors. An
/// unparseable version is treated as legacy.
pub fn tensorflow_module(version: &str) -> MockObject {
    let modern = Version::parse(version)
        .map(|v| v >= Version::MODERN_API)
        .unwrap_or(false);

    let module = MockObject::new("module")
        .with_attr("__file__", "/opt/venv/lib/python3.8/site-packages/tensorflow/__init__.py")
        .with_object(
            "test",
            MockObject::new("module")
                .with_method("is_gpu_available", |_, _| Ok(Value::Bool(false)))
                .with_method("is_built_with_cuda", |_, _| Ok(Value::Bool(false)))
                .with_method("gpu_device_name", |_, _| Ok(Value::Str(String::new()))),
        )
        .with_object(
            "python",
            MockObject::new("module").with_object(
                "util",
                MockObject::new("module").with_object(
                    "deprecation",
                    MockObject::new("module").with_method("silence", |_, _| {
                        Ok(MockObject::new("_GeneratorContextManager")
                            .with_method("__enter__", |_, _| Ok(Value::None))
                            .into_value())
                    }),
                ),
            ),
        );

    if modern {
        let logger = Arc::new(
            MockObject::new("Logger")
                .with_attr("level", DEFAULT_LEVEL)
                .with_method("setLevel", |this, args| {
                    this.set_attr("level", first_int(args)?);
                    Ok(Value::None)
                }),
        );
        module
            .with_object("version", MockObject::new("module").with_attr("VERSION", version))
            .with_method("get_logger", move |_, _| {
                Ok(Value::Object(logger.clone() as Arc<dyn ForeignObject>))
            })
    } else {
        module.with_attr("VERSION", version).with_object(
            "logging",
            MockObject::new("module")
                .with_attr("ERROR", 40i64)
                .with_attr("_verbosity", DEFAULT_LEVEL)
                .with_method("get_verbosity", |this, _| {
                    this.getattr("_verbosity")
                })
                .with_method("set_verbosity", |this, args| {
                    this.set_attr("_verbosity", first_int(args)?);
                    Ok(Value::None)
                }),
        )
    }
}

/// A foreign runtime serving a fixed set of in-memory modules.
pub struct MockInterop {
    modules: HashMap<String, Arc<MockObject>>,
    config: InterpreterConfig,
    failing_hooks: bool,
    import_calls: AtomicUsize,
    interpreter: Mutex<Option<PathBuf>>,
    deferred: Mutex<Vec<DeferredImport>>,
    class_filters: Mutex<Vec<ClassFilter>>,
    help_handlers: Mutex<Vec<(String, HelpHandler)>>,
}

impl MockInterop {
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            modules: HashMap::new(),
            config,
            failing_hooks: false,
            import_calls: AtomicUsize::new(0),
            interpreter: Mutex::new(None),
            deferred: Mutex::new(Vec::new()),
            class_filters: Mutex::new(Vec::new()),
            help_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_module(mut self, name: &str, module: MockObject) -> Self {
        self.modules.insert(name.to_string(), Arc::new(module));
        self
    }

    /// Make every hook registration fail.
    pub fn with_failing_hooks(mut self) -> Self {
        self.failing_hooks = true;
        self
    }

    pub fn module(&self, name: &str) -> Option<Arc<MockObject>> {
        self.modules.get(name).cloned()
    }

    /// Number of times [`Interop::import`] has been called.
    pub fn import_calls(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    /// Interpreter chosen through [`Interop::select_interpreter`].
    pub fn selected_interpreter(&self) -> Option<PathBuf> {
        lock(&self.interpreter).clone()
    }

    pub fn deferred(&self) -> Vec<DeferredImport> {
        lock(&self.deferred).clone()
    }

    pub fn class_filters(&self) -> Vec<ClassFilter> {
        lock(&self.class_filters).clone()
    }

    pub fn help_handlers(&self) -> Vec<(String, HelpHandler)> {
        lock(&self.help_handlers).clone()
    }

    fn hook_result(&self, hook: &str) -> Result<(), ForeignError> {
        if self.failing_hooks {
            Err(ForeignError::Exception(format!("RuntimeError: {hook} unavailable")))
        } else {
            Ok(())
        }
    }
}

impl Interop for MockInterop {
    fn module_available(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    fn interpreter_config(&self, module: &str) -> Result<InterpreterConfig, ForeignError> {
        let mut config = self.config.clone();
        if !self.module_available(module) {
            config.required_module_path = None;
        }
        if let Some(python) = self.selected_interpreter() {
            config.python_versions.retain(|p| *p != python);
            config.python_versions.insert(0, python);
        }
        Ok(config)
    }

    fn import(&self, module: &str) -> Result<Arc<dyn ForeignObject>, ForeignError> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        self.modules
            .get(module)
            .map(|m| m.clone() as Arc<dyn ForeignObject>)
            .ok_or_else(|| ForeignError::Import(module.to_string()))
    }

    fn select_interpreter(&self, python: &Path) -> Result<(), ForeignError> {
        self.hook_result("interpreter selection")?;
        *lock(&self.interpreter) = Some(python.to_path_buf());
        Ok(())
    }

    fn register_deferred(&self, import: &DeferredImport) -> Result<(), ForeignError> {
        self.hook_result("deferred import")?;
        lock(&self.deferred).push(import.clone());
        Ok(())
    }

    fn register_class_filter(&self, filter: ClassFilter) -> Result<(), ForeignError> {
        self.hook_result("class filter")?;
        lock(&self.class_filters).push(filter);
        Ok(())
    }

    fn register_help_handler(
        &self,
        module: &str,
        handler: HelpHandler,
    ) -> Result<(), ForeignError> {
        self.hook_result("help handler")?;
        lock(&self.help_handlers).push((module.to_string(), handler));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::{call_path, get_path};

    #[test]
    fn modern_module_exposes_nested_version() {
        let tf = tensorflow_module("2.3.0");
        let v = get_path(&tf, "version.VERSION").unwrap();
        assert_eq!(v, Value::Str("2.3.0".into()));
        assert!(tf.getattr("VERSION").is_err());
    }

    #[test]
    fn legacy_module_exposes_flat_version() {
        let tf = tensorflow_module("1.13.1");
        assert_eq!(tf.getattr("VERSION").unwrap(), Value::Str("1.13.1".into()));
        assert!(get_path(&tf, "version.VERSION").is_err());
    }

    #[test]
    fn methods_can_mutate_their_object() {
        let tf = tensorflow_module("1.10.0");
        call_path(&tf, "logging.set_verbosity", &[Value::Int(10)]).unwrap();
        let level = call_path(&tf, "logging.get_verbosity", &[]).unwrap();
        assert_eq!(level, Value::Int(10));
    }

    #[test]
    fn missing_module_import_fails() {
        let interop = MockInterop::new(InterpreterConfig::default());
        let err = interop.import("tensorflow").err().unwrap();
        assert_eq!(err, ForeignError::Import("tensorflow".into()));
        assert_eq!(interop.import_calls(), 1);
    }
}

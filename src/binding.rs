//! Deferred binding to the foreign module.
//!
//! A [`Binding`] moves through
//! `Uninitialized → Deferred → {Resolved | Failed}`:
//!
//! - [`Binding::initialize`] forwards environment settings, registers the
//!   deferred import and the class filter. Nothing is imported yet.
//! - The first call that needs the module imports it. On success the
//!   on-load hooks run (suppression strategy, help handler, deprecation
//!   silencing), each isolated from the others' failures. On failure the
//!   diagnostic from [`report::error_message`] becomes a
//!   [`BindError::ModuleNotFound`].
//! - Either outcome is cached for the life of the binding. There is no
//!   automatic retry.
//!
//! Resolution sits behind a [`OnceLock`], so concurrent first callers block
//! until the single import attempt finishes.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Once, OnceLock};

use crate::classify::ClassFilter;
use crate::config::BindingConfig;
use crate::error::{BindError, Result};
use crate::gpu::{self, GpuStatus};
use crate::help::HelpHandler;
use crate::interop::{call_path, DeferredImport, ForeignError, ForeignObject, Interop};
use crate::report::{self, ConfigReport};
use crate::suppress::{Strategy, SuppressionToken, Suppressor};
use crate::version::{self, extract_version_str, Version};

/// Lifecycle of a [`Binding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Uninitialized,
    Deferred,
    Resolved,
    Failed,
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingState::Uninitialized => write!(f, "uninitialized"),
            BindingState::Deferred => write!(f, "deferred"),
            BindingState::Resolved => write!(f, "resolved"),
            BindingState::Failed => write!(f, "failed"),
        }
    }
}

/// Everything set up by the on-load hooks.
struct Loaded {
    module: Arc<dyn ForeignObject>,
    suppressor: Option<Suppressor>,
    help: HelpHandler,
}

/// A lazily resolved handle to the foreign module.
pub struct Binding {
    config: BindingConfig,
    interop: Arc<dyn Interop>,
    filter: ClassFilter,
    init: Once,
    cell: OnceLock<std::result::Result<Loaded, BindError>>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("module", &self.config.module)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<Binding> = OnceLock::new();

/// Install `binding` as the process-wide binding and initialize it.
///
/// Fails if a global binding was already installed.
pub fn install(binding: Binding) -> Result<&'static Binding> {
    let mut installed = false;
    let global = GLOBAL.get_or_init(|| {
        installed = true;
        binding
    });
    if !installed {
        return Err(BindError::Config(format!(
            "a global binding for '{}' is already installed",
            global.config.module
        )));
    }
    global.initialize();
    Ok(global)
}

/// The process-wide binding, if one was installed.
pub fn global() -> Option<&'static Binding> {
    GLOBAL.get()
}

/// Pick the logging strategy from the module's version string.
fn select_strategy(module: &dyn ForeignObject) -> Result<(Version, Strategy)> {
    let version_str = extract_version_str(module)?;
    let version = Version::parse(&version_str)?;
    let strategy = if version::is_modern_api(&version_str)? {
        Strategy::Modern
    } else {
        Strategy::Legacy
    };
    Ok((version, strategy))
}

fn silence_deprecations(module: &dyn ForeignObject) -> Result<()> {
    let context = call_path(module, "python.util.deprecation.silence", &[])?.into_object()?;
    context.call_method("__enter__", &[])?;
    Ok(())
}

impl Binding {
    pub fn new(interop: Arc<dyn Interop>, config: BindingConfig) -> Self {
        let filter = config.class_filter();
        Self {
            config,
            interop,
            filter,
            init: Once::new(),
            cell: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn interop(&self) -> &dyn Interop {
        &*self.interop
    }

    pub fn state(&self) -> BindingState {
        match self.cell.get() {
            Some(Ok(_)) => BindingState::Resolved,
            Some(Err(_)) => BindingState::Failed,
            None if self.init.is_completed() => BindingState::Deferred,
            None => BindingState::Uninitialized,
        }
    }

    /// Register the deferred import. Idempotent.
    pub fn initialize(&self) {
        self.init.call_once(|| {
            self.config.apply_env();
            if let Some(python) = &self.config.interpreter_override {
                if let Err(e) = self.interop.select_interpreter(Path::new(python)) {
                    tracing::debug!("interpreter override {} not applied: {}", python, e);
                }
            }

            let import = DeferredImport {
                module: self.config.module.clone(),
                priority: self.config.priority,
                environment: self.config.environment.clone(),
            };
            if let Err(e) = self.interop.register_deferred(&import) {
                tracing::debug!("deferred import not registered: {}", e);
            }
            if let Err(e) = self.interop.register_class_filter(self.filter.clone()) {
                tracing::debug!("class filter not registered: {}", e);
            }

            tracing::debug!(
                "deferred binding for '{}' (priority {}, environment '{}')",
                import.module,
                import.priority,
                import.environment
            );
        });
    }

    fn loaded(&self) -> Result<&Loaded> {
        self.initialize();
        match self.cell.get_or_init(|| self.resolve()) {
            Ok(loaded) => Ok(loaded),
            Err(e) => Err(e.clone()),
        }
    }

    fn resolve(&self) -> std::result::Result<Loaded, BindError> {
        match self.interop.import(&self.config.module) {
            Ok(module) => {
                tracing::debug!("resolved foreign module '{}'", self.config.module);
                Ok(self.on_load(module))
            }
            Err(e) => Err(self.on_error(e)),
        }
    }

    fn on_load(&self, module: Arc<dyn ForeignObject>) -> Loaded {
        let (version, suppressor) = match select_strategy(&*module) {
            Ok((version, strategy)) => {
                (Some(version), Some(Suppressor::new(strategy, module.clone())))
            }
            Err(e) => {
                tracing::debug!("no logging strategy for '{}': {}", self.config.module, e);
                (None, None)
            }
        };

        let help = HelpHandler::new(version);
        if let Err(e) = self
            .interop
            .register_help_handler(&self.config.module, help.clone())
        {
            tracing::debug!("help handler not registered: {}", e);
        }

        if let Err(e) = silence_deprecations(&*module) {
            tracing::debug!("deprecation warnings not silenced: {}", e);
        }

        Loaded {
            module,
            suppressor,
            help,
        }
    }

    fn on_error(&self, err: ForeignError) -> BindError {
        tracing::debug!("failed to resolve '{}': {}", self.config.module, err);
        let config = match self.interop.interpreter_config(&self.config.module) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::debug!("interpreter configuration unavailable: {}", e);
                None
            }
        };
        BindError::ModuleNotFound(report::error_message(
            &self.config.module,
            config.as_ref(),
            Some(&err.to_string()),
        ))
    }

    /// The resolved module, importing it on first use.
    pub fn module(&self) -> Result<Arc<dyn ForeignObject>> {
        Ok(self.loaded()?.module.clone())
    }

    /// Whether the resolved module uses the 1.14+ API.
    pub fn is_modern_api(&self) -> Result<bool> {
        let module = self.module()?;
        version::is_modern_api(&extract_version_str(&*module)?)
    }

    /// The suppressor chosen at load time.
    ///
    /// If the version could not be read during loading, this retries the
    /// lookup and reports its error.
    pub fn suppressor(&self) -> Result<Suppressor> {
        let loaded = self.loaded()?;
        match &loaded.suppressor {
            Some(s) => Ok(s.clone()),
            None => {
                let (_, strategy) = select_strategy(&*loaded.module)?;
                Ok(Suppressor::new(strategy, loaded.module.clone()))
            }
        }
    }

    pub fn suppress(&self) -> Result<SuppressionToken> {
        self.suppressor()?.suppress()
    }

    pub fn restore(&self, token: SuppressionToken) -> Result<()> {
        self.suppressor()?.restore(token)
    }

    /// Apply the class filter to a set of foreign type tags.
    pub fn classify<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        self.filter.apply(tags)
    }

    /// Type tags of `obj`, with the tensor tag prepended when it applies.
    pub fn classify_object(&self, obj: &dyn ForeignObject) -> Vec<String> {
        self.filter.apply(obj.type_tags().as_slice())
    }

    pub fn is_tensor(&self, obj: &dyn ForeignObject) -> bool {
        self.filter.is_tensor(obj.type_tags().as_slice())
    }

    /// Documentation URL for a module symbol.
    pub fn help_url(&self, topic: &str) -> Result<Option<String>> {
        Ok(self.loaded()?.help.url(topic))
    }

    /// Configuration report built from the cached resolution.
    ///
    /// Resolves the module on first use like [`Self::module`]. After a
    /// failed resolution the cached diagnostic is reported without
    /// importing again.
    pub fn report(&self) -> Result<ConfigReport> {
        match self.loaded() {
            Ok(loaded) => report::available(&*self.interop, &self.config.module, &*loaded.module),
            Err(BindError::ModuleNotFound(message)) => {
                let config = self.interop.interpreter_config(&self.config.module).ok();
                Ok(report::unavailable(config.as_ref(), message))
            }
            Err(e) => Err(e),
        }
    }

    pub fn version(&self) -> Result<Option<Version>> {
        Ok(self.report()?.version())
    }

    /// Probe for a GPU, printing details to stdout when `verbose`.
    pub fn gpu_available(&self, verbose: bool) -> GpuStatus {
        self.gpu_available_to(verbose, &mut io::stdout())
    }

    pub fn gpu_available_to(&self, verbose: bool, out: &mut dyn Write) -> GpuStatus {
        match self.module() {
            Ok(module) => gpu::gpu_available(&*module, verbose, out),
            Err(e) => {
                tracing::warn!("unable to determine GPU availability: {}", e);
                GpuStatus::Unknown
            }
        }
    }
}

//! Deferred, version-aware bindings to an external TensorFlow installation.
//!
//! The foreign module is not imported until first use. Once it is, tfbridge
//! adapts to the API generation it finds (logging control changed in 1.14),
//! tags tensor-like values, and links symbols to their documentation. When
//! it cannot be found, the failure carries a diagnostic listing where it was
//! looked for.
//!
//! ```no_run
//! # #[cfg(feature = "python")]
//! # fn main() -> tfbridge::Result<()> {
//! use std::sync::Arc;
//! use tfbridge::{Binding, BindingConfig};
//! use tfbridge::interop::python::PythonInterop;
//!
//! let binding = Binding::new(Arc::new(PythonInterop::new()), BindingConfig::from_env()?);
//! binding.initialize();
//! println!("{}", binding.report()?);
//!
//! let token = binding.suppress()?;
//! // ... noisy calls ...
//! binding.restore(token)?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "python"))]
//! # fn main() {}
//! ```

pub mod binding;
pub mod classify;
pub mod config;
pub mod error;
pub mod gpu;
pub mod help;
pub mod interop;
pub mod report;
pub mod suppress;
pub mod version;

pub use binding::{Binding, BindingState};
pub use classify::ClassFilter;
pub use config::BindingConfig;
pub use error::{BindError, Result};
pub use gpu::GpuStatus;
pub use report::ConfigReport;
pub use suppress::{Strategy, SuppressionToken, Suppressor};
pub use version::Version;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

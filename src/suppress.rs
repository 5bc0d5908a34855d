//! Temporarily silencing the foreign module's logger.
//!
//! The two API generations expose logging control differently:
//!
//! - 1.14+: `get_logger()` returns a standard logger; read `.level`, call
//!   `.setLevel(..)`.
//! - older: `logging.get_verbosity()` / `logging.set_verbosity(..)`.
//!
//! [`Suppressor::suppress`] raises the threshold to errors only and hands
//! back a [`SuppressionToken`] that [`Suppressor::restore`] uses to put the
//! exact previous level back.

use std::fmt;
use std::sync::Arc;

use crate::error::{BindError, Result};
use crate::interop::{call_path, get_path, ForeignObject, Value};
use crate::version::Version;

/// Python logging's ERROR level.
pub const ERROR_LEVEL: i64 = 40;

/// Which logging API a suppressor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Modern,
    Legacy,
}

impl Strategy {
    pub fn for_version(version: Version) -> Self {
        if version >= Version::MODERN_API {
            Strategy::Modern
        } else {
            Strategy::Legacy
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Modern => write!(f, "modern"),
            Strategy::Legacy => write!(f, "legacy"),
        }
    }
}

/// The logging level in force before a call to [`Suppressor::suppress`].
#[derive(Debug)]
#[must_use = "pass the token to `restore` to undo the suppression"]
pub struct SuppressionToken {
    strategy: Strategy,
    level: i64,
}

impl SuppressionToken {
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
}

/// Drives one logging strategy against a resolved module.
#[derive(Clone)]
pub struct Suppressor {
    strategy: Strategy,
    module: Arc<dyn ForeignObject>,
}

impl fmt::Debug for Suppressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suppressor")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl Suppressor {
    pub fn new(strategy: Strategy, module: Arc<dyn ForeignObject>) -> Self {
        Self { strategy, module }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    fn logger(&self) -> Result<Arc<dyn ForeignObject>> {
        Ok(call_path(&*self.module, "get_logger", &[])?.into_object()?)
    }

    /// The level currently in force.
    pub fn current_level(&self) -> Result<i64> {
        let level = match self.strategy {
            Strategy::Modern => self.logger()?.getattr("level")?,
            Strategy::Legacy => call_path(&*self.module, "logging.get_verbosity", &[])?,
        };
        Ok(level.as_int()?)
    }

    fn set_level(&self, level: i64) -> Result<()> {
        match self.strategy {
            Strategy::Modern => {
                self.logger()?.call_method("setLevel", &[Value::Int(level)])?;
            }
            Strategy::Legacy => {
                call_path(&*self.module, "logging.set_verbosity", &[Value::Int(level)])?;
            }
        }
        Ok(())
    }

    fn error_level(&self) -> i64 {
        match self.strategy {
            Strategy::Modern => ERROR_LEVEL,
            Strategy::Legacy => get_path(&*self.module, "logging.ERROR")
                .and_then(|v| v.as_int())
                .unwrap_or(ERROR_LEVEL),
        }
    }

    /// Restrict logging to errors, returning the previous level.
    pub fn suppress(&self) -> Result<SuppressionToken> {
        let level = self.current_level()?;
        self.set_level(self.error_level())?;
        tracing::debug!("suppressed foreign logging ({} api, was {})", self.strategy, level);
        Ok(SuppressionToken {
            strategy: self.strategy,
            level,
        })
    }

    /// Put back the level captured by `token`.
    pub fn restore(&self, token: SuppressionToken) -> Result<()> {
        if token.strategy != self.strategy {
            return Err(BindError::TokenMismatch {
                expected: self.strategy.to_string(),
                got: token.strategy.to_string(),
            });
        }
        self.set_level(token.level)
    }

    /// Run `f` with logging suppressed. The level is restored even when
    /// `f` returns an error.
    pub fn with_suppressed<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let token = self.suppress()?;
        let out = f();
        self.restore(token)?;
        out
    }
}

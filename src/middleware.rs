//! Ordered transformation steps run around validation.
//!
//! Every entry returns a partial result that is shallow-merged into the
//! arguments. Entries flagged `mutates` run at most once per top-level parse,
//! so a coercion shared by a parent and a nested command is applied once.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::arguments::Arguments;
use crate::deferred::{Deferred, lift, lift_future};
use crate::error::{Error, Result};
use crate::program::Program;

pub type MiddlewareFn = Rc<dyn Fn(Arguments, Program) -> Deferred<Arguments>>;

/// A coercion with its errors already mapped to `Error::Coerce`.
pub(crate) type ValueFn = Rc<dyn Fn(Value) -> Deferred<Value>>;

fn check_outcome(label: &str, outcome: anyhow::Result<bool>) -> Result<Arguments> {
    match outcome {
        Ok(true) => Ok(Arguments::default()),
        Ok(false) => Err(Error::Validation(format!("Argument check failed: {label}"))),
        Err(e) => Err(Error::Validation(e.to_string())),
    }
}

#[derive(Clone)]
pub struct Middleware {
    f: MiddlewareFn,
    pub apply_before_validation: bool,
    /// Survives `Program::reset` when entering a command.
    pub global: bool,
    pub mutates: bool,
    applied: Rc<Cell<bool>>,
    /// Option a coerce entry belongs to.
    pub option: Option<String>,
}

impl Middleware {
    fn from_fn(f: MiddlewareFn) -> Self {
        Middleware {
            f,
            apply_before_validation: false,
            global: true,
            mutates: true,
            applied: Rc::new(Cell::new(false)),
            option: None,
        }
    }

    /// Synchronous step. `f` returns the keys to merge.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Arguments, &Program) -> anyhow::Result<Arguments> + 'static,
    {
        Middleware::from_fn(Rc::new(move |argv, program| lift(f(&argv, &program))))
    }

    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arguments, Program) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Arguments>> + 'static,
    {
        Middleware::from_fn(Rc::new(move |argv, program| lift_future(f(argv, program))))
    }

    pub fn before_validation(mut self) -> Self {
        self.apply_before_validation = true;
        self
    }

    /// Keep the entry on the level it is registered on: entering a command
    /// drops it, and a builder's local entries never reach sibling commands.
    pub fn local(mut self) -> Self {
        self.global = false;
        self
    }

    pub(crate) fn scoped_to_command(mut self) -> Self {
        self.global = false;
        self.mutates = true;
        self
    }

    /// A named check. `Ok(false)` fails with `Argument check failed: <name>`.
    pub fn check<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Arguments) -> anyhow::Result<bool> + 'static,
    {
        let label = name.to_string();
        Middleware::checking(Rc::new(move |argv, _| Deferred::from(check_outcome(&label, f(&argv)))))
    }

    pub fn check_async<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + 'static,
    {
        let label = name.to_string();
        Middleware::checking(Rc::new(move |argv, _| {
            let label = label.clone();
            let outcome = f(argv);
            Deferred::from_future(async move { check_outcome(&label, outcome.await) })
        }))
    }

    fn checking(f: MiddlewareFn) -> Self {
        Middleware {
            mutates: false,
            ..Middleware::from_fn(f)
        }
    }

    /// Replace `key` (and every alias the current parse knows) with the
    /// callback's result. Absent keys are left alone.
    pub(crate) fn coerce(key: &str, f: ValueFn) -> Self {
        let owned = key.to_string();
        let mw: MiddlewareFn = Rc::new(move |argv, program| {
            let Some(current) = argv.get(&owned).cloned() else {
                return Deferred::ready(Arguments::default());
            };
            let mut spellings = program.parsed_aliases_of(&owned);
            spellings.push(owned.clone());
            f(current).map(move |value| {
                let mut partial = Arguments::default();
                for spelling in spellings {
                    partial.insert(spelling, value.clone());
                }
                partial
            })
        });
        Middleware {
            apply_before_validation: true,
            option: Some(key.to_string()),
            ..Middleware::from_fn(mw)
        }
    }

    pub fn is_applied(&self) -> bool {
        self.applied.get()
    }

    pub(crate) fn clear_applied(&self) {
        self.applied.set(false);
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("apply_before_validation", &self.apply_before_validation)
            .field("global", &self.global)
            .field("mutates", &self.mutates)
            .field("applied", &self.applied.get())
            .field("option", &self.option)
            .finish_non_exhaustive()
    }
}

/// The middleware list of one program level.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareStack {
    entries: Vec<Middleware>,
}

impl MiddlewareStack {
    pub fn add(&mut self, middleware: Middleware) {
        self.entries.push(middleware);
    }

    /// A coerce entry replaces an earlier one for the same option or any of
    /// its aliases.
    pub fn add_coerce(&mut self, middleware: Middleware, aliases: &[String]) {
        if let Some(option) = middleware.option.as_deref() {
            self.entries.retain(|m| match m.option.as_deref() {
                Some(existing) => existing != option && !aliases.iter().any(|a| a == existing),
                None => true,
            });
        }
        self.entries.push(middleware);
    }

    pub fn entries(&self) -> &[Middleware] {
        &self.entries
    }

    /// Keep only global entries.
    pub fn reset(&mut self) {
        self.entries.retain(|m| m.global);
    }

    pub fn clear_applied(&self) {
        for entry in &self.entries {
            entry.clear_applied();
        }
    }
}

/// Fold `entries` over `argv` for one pass. Entries tagged for the other pass
/// are skipped, as are `mutates` entries that already ran; the marker is set
/// when the entry is scheduled, so a pending chain cannot schedule it twice.
pub fn apply_middleware(
    argv: Deferred<Arguments>,
    program: &Program,
    entries: &[Middleware],
    before_validation: bool,
) -> Deferred<Arguments> {
    debug!(before_validation, count = entries.len(), "apply middleware");
    entries.iter().fold(argv, |acc, entry| {
        if entry.apply_before_validation != before_validation {
            return acc;
        }
        if entry.mutates {
            if entry.applied.get() {
                return acc;
            }
            entry.applied.set(true);
        }
        let f = entry.f.clone();
        let program = program.clone();
        acc.and_then(move |argv| {
            f(argv.clone(), program).map(move |partial| {
                let mut argv = argv;
                argv.merge(partial);
                argv
            })
        })
    })
}

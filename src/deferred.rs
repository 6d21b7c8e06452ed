//! Uniform sync/async result used by every pipeline stage.
//!
//! A stage either produced its value already (`Ready`) or hands back a
//! single-threaded future (`Pending`). Combinators keep a chain of ready stages
//! ready, and collapse the whole chain into one future as soon as any stage
//! suspends, so call sites never branch on sync vs. async.

use std::future::{Future, IntoFuture};

use futures::future::{self, FutureExt, LocalBoxFuture};

use crate::error::{Error, Result};

pub enum Deferred<T> {
    Ready(Result<T>),
    Pending(LocalBoxFuture<'static, Result<T>>),
}

impl<T: 'static> Deferred<T> {
    pub fn ready(value: T) -> Self {
        Deferred::Ready(Ok(value))
    }

    pub fn err(error: impl Into<Error>) -> Self {
        Deferred::Ready(Err(error.into()))
    }

    pub fn from_future<F>(fut: F) -> Self
    where
        F: Future<Output = Result<T>> + 'static,
    {
        Deferred::Pending(fut.boxed_local())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Deferred::Pending(_))
    }

    /// Continue with the settled result, whether it is a value or an error.
    pub fn then<U, F>(self, f: F) -> Deferred<U>
    where
        U: 'static,
        F: FnOnce(Result<T>) -> Deferred<U> + 'static,
    {
        match self {
            Deferred::Ready(result) => f(result),
            Deferred::Pending(fut) => {
                Deferred::Pending(async move { f(fut.await).await }.boxed_local())
            }
        }
    }

    pub fn and_then<U, F>(self, f: F) -> Deferred<U>
    where
        U: 'static,
        F: FnOnce(T) -> Deferred<U> + 'static,
    {
        self.then(|result| match result {
            Ok(value) => f(value),
            Err(e) => Deferred::Ready(Err(e)),
        })
    }

    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.and_then(|value| Deferred::ready(f(value)))
    }

    pub fn map_err<F>(self, f: F) -> Deferred<T>
    where
        F: FnOnce(Error) -> Error + 'static,
    {
        self.then(|result| Deferred::Ready(result.map_err(f)))
    }

    /// Run `f` once the chain settles, keeping the settled result.
    pub fn finally<F>(self, f: F) -> Deferred<T>
    where
        F: FnOnce() + 'static,
    {
        self.then(|result| {
            f();
            Deferred::Ready(result)
        })
    }

    /// `Some` when nothing on the chain suspended.
    pub fn into_ready(self) -> Option<Result<T>> {
        match self {
            Deferred::Ready(result) => Some(result),
            Deferred::Pending(_) => None,
        }
    }

    pub fn into_local_future(self) -> LocalBoxFuture<'static, Result<T>> {
        match self {
            Deferred::Ready(result) => future::ready(result).boxed_local(),
            Deferred::Pending(fut) => fut,
        }
    }
}

impl<T: 'static> IntoFuture for Deferred<T> {
    type Output = Result<T>;
    type IntoFuture = LocalBoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.into_local_future()
    }
}

impl<T> From<Result<T>> for Deferred<T> {
    fn from(result: Result<T>) -> Self {
        Deferred::Ready(result)
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Deferred::Ready(Ok(_)) => f.write_str("Deferred::Ready(Ok(..))"),
            Deferred::Ready(Err(e)) => write!(f, "Deferred::Ready(Err({e}))"),
            Deferred::Pending(_) => f.write_str("Deferred::Pending(..)"),
        }
    }
}

/// Lift a user callback result into the library error space.
pub(crate) fn lift<T: 'static>(result: anyhow::Result<T>) -> Deferred<T> {
    Deferred::Ready(result.map_err(Error::from))
}

/// Lift a user future into the library error space.
pub(crate) fn lift_future<T, F>(fut: F) -> Deferred<T>
where
    T: 'static,
    F: Future<Output = anyhow::Result<T>> + 'static,
{
    Deferred::from_future(async move { fut.await.map_err(Error::from) })
}

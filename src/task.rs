//! Cooperative task wrapper and combinators.
//!
//! A [`Task`] is a detached send (or any fallible computation) running on
//! the tokio scheduler, carrying a cancellation token the executor
//! observes at its suspension points. Continuations chain with
//! [`Task::then`] / [`Task::catch`] / [`Task::finally`]; groups compose
//! with [`all`], [`race`], [`any`], [`map`], [`batch`] and [`sequence`].
//!
//! Ordering between concurrent tasks is unspecified; `all` indexes results
//! by input position, not completion order.

use crate::error::Error;
use futures::future::select_all;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A settleable value: a spawned computation plus its cancellation signal.
#[derive(Debug)]
pub struct Task<T> {
    handle: JoinHandle<Result<T, Error>>,
    token: CancellationToken,
}

impl<T: Send + 'static> Task<T> {
    /// Spawn a computation with a fresh cancellation token.
    ///
    /// The future receives the token so it can observe cancellation at its
    /// own suspension points.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(f(token.clone()));
        Self { handle, token }
    }

    /// Wrap an already-built future that observes the given token.
    pub fn from_future<Fut>(token: CancellationToken, future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
            token,
        }
    }

    /// Signal cancellation. The computation settles with `Cancelled` at
    /// its next suspension point; any child tasks sharing the token wake
    /// too.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The cancellation token, for deriving child tokens.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Await settlement.
    ///
    /// # Errors
    ///
    /// Returns the task's error, `Cancelled` if it was aborted, or a
    /// `Runtime` error if it panicked.
    pub async fn join(self) -> Result<T, Error> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => {
                Err(Error::cancelled("task", "aborted"))
            }
            Err(join_error) => Err(Error::runtime(format!("task panicked: {join_error}"))),
        }
    }

    /// Chain a transformation over the success value.
    #[must_use]
    pub fn then<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let token = self.token.clone();
        Task::from_future(token, async move { self.join().await.map(f) })
    }

    /// Chain a recovery over the error value; successes pass through.
    #[must_use]
    pub fn catch<F>(self, f: F) -> Self
    where
        F: FnOnce(Error) -> Result<T, Error> + Send + 'static,
    {
        let token = self.token.clone();
        Self::from_future(token, async move {
            match self.join().await {
                Ok(value) => Ok(value),
                Err(error) => f(error),
            }
        })
    }

    /// Run a side effect once the task settles, either way.
    #[must_use]
    pub fn finally<F>(self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.token.clone();
        Self::from_future(token, async move {
            let result = self.join().await;
            f();
            result
        })
    }
}

impl<T: Send + 'static> IntoFuture for Task<T> {
    type Output = Result<T, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.join())
    }
}

/// Await every task; results are indexed by input position. The first
/// error settles the whole group (remaining tasks keep running).
#[must_use]
pub fn all<T: Send + 'static>(tasks: Vec<Task<T>>) -> Task<Vec<T>> {
    Task::spawn(|_token| async move {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(task.join().await?);
        }
        Ok(results)
    })
}

/// The first task to settle, success or error. The rest keep running.
#[must_use]
pub fn race<T: Send + 'static>(tasks: Vec<Task<T>>) -> Task<T> {
    Task::spawn(|_token| async move {
        if tasks.is_empty() {
            return Err(Error::invalid_option("race", "requires at least one task"));
        }
        let futures: Vec<_> = tasks
            .into_iter()
            .map(|task| Box::pin(task.join()))
            .collect();
        let (result, _index, _rest) = select_all(futures).await;
        result
    })
}

/// The first task to succeed; errors collect until one succeeds. When
/// every task fails, the last error surfaces.
#[must_use]
pub fn any<T: Send + 'static>(tasks: Vec<Task<T>>) -> Task<T> {
    Task::spawn(|_token| async move {
        if tasks.is_empty() {
            return Err(Error::invalid_option("any", "requires at least one task"));
        }
        let mut futures: Vec<_> = tasks
            .into_iter()
            .map(|task| Box::pin(task.join()))
            .collect();
        let mut last_error = None;
        while !futures.is_empty() {
            let (result, _index, rest) = select_all(futures).await;
            match result {
                Ok(value) => return Ok(value),
                Err(error) => last_error = Some(error),
            }
            futures = rest;
        }
        Err(last_error.unwrap_or_else(|| Error::runtime("any: no tasks settled")))
    })
}

/// Run `f` over every item with at most `concurrency` in flight; results
/// are indexed by input position.
#[must_use]
pub fn map<I, T, F, Fut>(items: Vec<I>, concurrency: usize, f: F) -> Task<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    Task::spawn(move |_token| async move {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let f = Arc::new(f);

        let handles: Vec<JoinHandle<Result<T, Error>>> = items
            .into_iter()
            .map(|item| {
                let semaphore = semaphore.clone();
                let f = f.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| Error::runtime("map semaphore closed"))?;
                    f(item).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let value = handle
                .await
                .map_err(|e| Error::runtime(format!("map task failed: {e}")))??;
            results.push(value);
        }
        Ok(results)
    })
}

/// Run `f` over the items in chunks of `batch_size`, each chunk fully
/// concurrent, chunks strictly in order.
#[must_use]
pub fn batch<I, T, F, Fut>(items: Vec<I>, batch_size: usize, f: F) -> Task<Vec<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    let batch_size = batch_size.max(1);
    Task::spawn(move |_token| async move {
        let f = Arc::new(f);
        let mut results = Vec::with_capacity(items.len());
        let mut pending = items;

        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(batch_size));
            let chunk = std::mem::replace(&mut pending, rest);

            let handles: Vec<JoinHandle<Result<T, Error>>> = chunk
                .into_iter()
                .map(|item| {
                    let f = f.clone();
                    tokio::spawn(async move { f(item).await })
                })
                .collect();
            for handle in handles {
                results.push(
                    handle
                        .await
                        .map_err(|e| Error::runtime(format!("batch task failed: {e}")))??,
                );
            }
        }
        Ok(results)
    })
}

/// Run callables strictly one after another; each starts only after the
/// previous settles successfully.
#[must_use]
pub fn sequence<T, F, Fut>(callables: Vec<F>) -> Task<Vec<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    Task::spawn(move |_token| async move {
        let mut results = Vec::with_capacity(callables.len());
        for callable in callables {
            results.push(callable().await?);
        }
        Ok(results)
    })
}

use crate::diagnostics::DiagnosticLog;
use slowscope_protocol::{ErrorInfo, ErrorKind, FetchOutcome};
use slowscope_transport::CallError;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinHandle;

type Operation<T> = Pin<Box<dyn Future<Output = Result<T, CallError>> + Send + 'static>>;

/// A named unit of concurrent work with its own deadline.
pub struct FetchTask<T> {
    name: String,
    timeout: Duration,
    operation: Operation<T>,
}

impl<T> FetchTask<T> {
    pub fn new<F>(name: impl Into<String>, timeout: Duration, operation: F) -> Self
    where
        F: Future<Output = Result<T, CallError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout,
            operation: Box::pin(operation),
        }
    }
}

/// Spawned tasks that are aborted when `run_all` is dropped before they settle, so an outer
/// deadline also tears down the helper calls underneath it.
struct AbortOnDrop<T>(Vec<(String, JoinHandle<FetchOutcome<T>>)>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

/// Run every task concurrently and wait for all of them to settle.
///
/// Failures, deadline overruns and panics become failed outcomes (with `T::default()` as the
/// value) and are appended to `log`; nothing is propagated. A task's deadline drops its future,
/// which kills any helper process it owns. Dropping the returned future aborts every task still
/// running. Duplicate names get a `#n` suffix.
pub async fn run_all<T>(
    tasks: Vec<FetchTask<T>>,
    log: &DiagnosticLog,
) -> BTreeMap<String, FetchOutcome<T>>
where
    T: Default + Send + 'static,
{
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut handles = AbortOnDrop(Vec::with_capacity(tasks.len()));

    for task in tasks {
        let FetchTask {
            name,
            timeout,
            operation,
        } = task;
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        let name = if *count > 1 {
            format!("{name}#{count}")
        } else {
            name
        };

        let handle = tokio::spawn(async move {
            match tokio::time::timeout(timeout, operation).await {
                Ok(Ok(value)) => FetchOutcome::ok(value),
                Ok(Err(err)) => FetchOutcome::failed(err.to_info()),
                Err(_) => FetchOutcome::failed(ErrorInfo::new(
                    ErrorKind::Timeout,
                    format!("no result within {}ms", timeout.as_millis()),
                )),
            }
        });
        handles.0.push((name, handle));
    }

    let mut outcomes = BTreeMap::new();
    for (name, handle) in handles.0.iter_mut() {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => FetchOutcome::failed(ErrorInfo::new(
                ErrorKind::Internal,
                format!("Task panicked: {err}"),
            )),
        };
        if let Some(error) = &outcome.error {
            log::warn!("{name} failed ({}): {}", error.kind, error.message);
            log.record(name, error);
        } else {
            log::debug!("{name} settled");
        }
        outcomes.insert(name.clone(), outcome);
    }
    outcomes
}

//! Runs named long-running processes under one cancellation token, with
//! graceful shutdown on SIGINT/SIGTERM and bounded cleanup.
//!
//! - Processes run concurrently until one fails or a shutdown signal arrives
//! - A process that returns `Ok(())` on its own does not stop the others
//! - Closers run afterwards, regardless of how the processes ended
//!
//! # Example
//!
//! ```no_run
//! use station_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Runner::new()
//!         .with_app_process(|ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("working");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("cleaning up");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5));
//!
//!     runner.run().await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A process body: takes the shared cancellation token and runs until it fires
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>
        + Send,
>;

/// Cleanup run after every process has stopped
pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>> + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout defaults to 10 seconds
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Add an already boxed process under a name used in logs
    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process,
        });
        self
    }

    /// Add an unnamed process. If it returns an error, every process is
    /// cancelled and the closers run.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process_{}", self.app_processes.len());
        self.with_named_process(name, Box::new(|token| Box::pin(process(token))))
    }

    /// Closers run concurrently; a failing closer does not stop the others
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to trigger shutdown from a test
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until shutdown, then exit the process with 0 or 1
    pub async fn run(self) {
        let token = self.cancellation_token.clone();
        spawn_signal_handlers(token);

        match self.run_until_stopped().await {
            Ok(()) => {
                tracing::info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                tracing::error!("Application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Run every process until they all finish, one fails, or the token is
    /// cancelled; then run the closers. Returns the first process error.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::info!(process = %name, "App process starting");
                let result = process(process_token).await;
                (name, result)
            });
        }

        let mut first_error = None;
        loop {
            let joined = tokio::select! {
                joined = join_set.join_next() => joined,
                _ = token.cancelled() => break,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((name, Ok(()))) => {
                    tracing::info!(process = %name, "App process completed");
                }
                Ok((name, Err(err))) => {
                    tracing::error!(process = %name, "App process error: {:#}", err);
                    first_error = Some(err.context(format!("process {name} failed")));
                    token.cancel();
                    break;
                }
                Err(err) => {
                    tracing::error!("App process panicked: {}", err);
                    first_error = Some(anyhow::anyhow!("app process panicked: {err}"));
                    token.cancel();
                    break;
                }
            }
        }

        // Give cancelled processes the chance to observe the token and return
        token.cancel();
        while join_set.join_next().await.is_some() {}

        if !self.closers.is_empty() {
            tracing::info!("Running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => tracing::info!("All closers completed"),
                Err(_) => tracing::error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up SIGTERM handler: {}", err);
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("Closer completed successfully"),
            Ok(Err(err)) => tracing::error!("Closer error: {:#}", err),
            Err(err) => tracing::error!("Closer panicked: {}", err),
        }
    }
}

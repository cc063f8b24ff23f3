// 実行単位のログコンテキスト（グローバルなsubscriberは使わない）

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{Dispatch, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Logging context for one extraction run.
///
/// Holds the dispatcher every log record of the run goes to and the run's
/// root span. Worker threads enter it through [`RunContext::in_scope`].
#[derive(Clone)]
pub struct RunContext {
    dispatch: Dispatch,
    span: Span,
}

impl RunContext {
    /// Create a context whose root span is registered with `dispatch`.
    pub fn new(dispatch: Dispatch, input: &Path) -> Self {
        let span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::info_span!("extraction", input = %input.display())
        });
        RunContext { dispatch, span }
    }

    /// Context that logs to whatever dispatcher is current on this thread.
    pub fn current(input: &Path) -> Self {
        let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
        Self::new(dispatch, input)
    }

    /// Run `f` with this context's dispatcher and span active on the
    /// current thread.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }
}

/// stderr + 任意のログファイルへ出力する Dispatch を構築する。
///
/// フィルタは `RUST_LOG`、未設定なら `info`。
pub fn build_dispatch(log_file: Option<&Path>) -> crate::error::Result<Dispatch> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            // 同一秒に開始したジョブは同じファイルへ追記する
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer);

    Ok(Dispatch::new(subscriber))
}

/// `image_extraction_YYYYmmdd_HHMMSS.log` in `dir`.
pub fn run_log_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("image_extraction_{stamp}.log"))
}

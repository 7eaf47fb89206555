//! Report composition and persistence.
//!
//! Reports are plain UTF-8 text files named after the analysis timestamp.
//! Files are only ever created, never overwritten or removed.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{format_timestamp, AnalysisResult};

/// File name prefix shared by every report.
pub const REPORT_PREFIX: &str = "analysis_";
/// File extension shared by every report.
pub const REPORT_EXTENSION: &str = ".txt";

/// Name candidates tried before giving up on a collision.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
    #[error("no free report name for {base} after {attempts} attempts")]
    Exhausted { base: String, attempts: u32 },
}

/// Storage for report files.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create `name` holding `contents`.
    ///
    /// Must fail with [`io::ErrorKind::AlreadyExists`] if `name` exists.
    async fn create_new(&self, name: &str, contents: &str) -> io::Result<()>;
}

/// Report store backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsReportStore {
    dir: PathBuf,
}

impl FsReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create `name` and write `contents` through `wrap(file)`.
    ///
    /// A file whose write fails is removed again, so a report name on disk
    /// always holds a complete report.
    async fn create_with<W, F>(&self, name: &str, contents: &str, wrap: F) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
        F: FnOnce(tokio::fs::File) -> W,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(name);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let mut writer = wrap(file);
        let written = async {
            writer.write_all(contents.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(writer);
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!(
                    "Failed to remove partial report {}: {}",
                    path.display(),
                    remove_err
                );
            }
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for FsReportStore {
    async fn create_new(&self, name: &str, contents: &str) -> io::Result<()> {
        self.create_with(name, contents, |file| file).await
    }
}

/// Writes rendered reports through a [`ReportStore`].
#[derive(Clone)]
pub struct ReportPersister {
    store: Arc<dyn ReportStore>,
}

impl ReportPersister {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Persist `result` and return the report name.
    ///
    /// The name is `analysis_<timestamp>.txt`; if taken, `-1`, `-2`, ... is
    /// appended before the extension.
    pub async fn persist(&self, result: &AnalysisResult) -> Result<String, PersistError> {
        let contents = render_report(result);
        let base = report_stem(&format_timestamp(&result.timestamp));

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}{}", base, REPORT_EXTENSION)
            } else {
                format!("{}-{}{}", base, attempt, REPORT_EXTENSION)
            };

            match self.store.create_new(&name, &contents).await {
                Ok(()) => {
                    debug!("Saved report {}", name);
                    return Ok(name);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(PersistError::Io(e)),
            }
        }

        Err(PersistError::Exhausted {
            base,
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

/// `analysis_` plus the timestamp with `:` and `.` replaced by `-`.
fn report_stem(timestamp: &str) -> String {
    format!("{}{}", REPORT_PREFIX, timestamp.replace([':', '.'], "-"))
}

/// File name of the first-choice report for a formatted timestamp.
pub fn report_file_name(timestamp: &str) -> String {
    format!("{}{}", report_stem(timestamp), REPORT_EXTENSION)
}

/// Render the fixed human-readable report layout.
pub fn render_report(result: &AnalysisResult) -> String {
    format!(
        "Análisis de: {}\n\n\
         Resumen:\n{}\n\n\
         Puntos Clave:\n{}\n\n\
         Sentimiento (Resumen): {}\n\
         Sentimiento (Puntos Clave): {}",
        result.source,
        result.summary.text,
        result.key_points.text,
        result.summary.sentiment,
        result.key_points.sentiment,
    )
}

/// Whether `name` could have been produced by [`ReportPersister::persist`].
///
/// Only a single plain file name component is accepted.
pub fn is_report_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    single
        && !name.contains(['/', '\\'])
        && name.starts_with(REPORT_PREFIX)
        && name.ends_with(REPORT_EXTENSION)
}

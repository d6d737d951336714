//! Tracing setup for the bridge binary.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSettings};

const LOG_FILE_NAME: &str = "bridge.log";
const LOG_ROTATIONS: u32 = 3;

/// Platform data directory for the bridge (`$XDG_DATA_HOME/mcp-demo-bridge`
/// on Linux), falling back to `~/.mcp-demo-bridge`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("mcp-demo-bridge");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-demo-bridge")
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter. With `file` enabled, output is
/// also written to a fresh `bridge.log` after rotating the previous ones.
pub fn init_tracing(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("mcp_demo_bridge=info,warn"));

    let mut log_path = None;
    let writer = if settings.file {
        let dir = data_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(LOG_FILE_NAME);
        rotate_log_file(&path, LOG_ROTATIONS);

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        log_path = Some(path);
        BoxMakeWriter::new(std::io::stdout.and(FlushingWriter::new(file)))
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    match settings.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(log_path.is_none()).try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    let log_file = log_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_file,
        pid = std::process::id(),
        "=== MCP demo bridge starting ==="
    );
    Ok(())
}

/// Rotate `bridge.log` → `bridge.log.1` → … → `.{keep}`, dropping the oldest.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// File writer that flushes after every write so lines survive a crash.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub mod agent_core;
pub mod cli;
pub mod config;
pub mod documents;
pub mod inference;
pub mod mcp_client;
pub mod mcp_server;

use std::path::{Path, PathBuf};

/// Return the platform-standard data directory for docchat.
///
/// - macOS: `~/Library/Application Support/docchat/`
/// - Windows: `{FOLDERID_RoamingAppData}\docchat\`
/// - Linux: `$XDG_DATA_HOME/docchat/` (fallback `~/.local/share/docchat/`)
///
/// Falls back to `~/.docchat/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("docchat");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docchat")
}

/// Initialize the tracing subscriber, writing to `<data_dir>/docchat.log`.
///
/// On each startup:
/// 1. Rotates existing logs (docchat.log → docchat.log.1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh docchat.log with a line-flushing writer.
/// 3. Logs a startup banner with the data directory path.
///
/// Never writes to stdout: stdout is the chat surface, or the JSON-RPC
/// channel under `docchat serve`. Returns the log file path.
pub fn init_tracing(json: bool) -> std::io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("docchat.log");
    rotate_log_file(&log_path, 3);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let writer = FlushingWriter::new(log_file);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docchat=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        return Err(std::io::Error::other(format!(
            "tracing subscriber already set: {e}"
        )));
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== docchat starting ==="
    );

    Ok(log_path)
}

/// Shift `docchat.log` → `.1` → … → `.{keep}`, dropping the oldest.
///
/// Gaps in the chain are fine. Other failures are reported on stderr and
/// rotation carries on; logging must not stop the chat from starting.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let numbered = |n: u32| PathBuf::from(format!("{}.{n}", base_path.display()));
    let report = |what: &str, path: &Path, e: std::io::Error| {
        if e.kind() != std::io::ErrorKind::NotFound {
            eprintln!("warning: log rotation could not {what} {}: {e}", path.display());
        }
    };

    let oldest = numbered(keep);
    if let Err(e) = std::fs::remove_file(&oldest) {
        report("remove", &oldest, e);
    }
    let mut chain: Vec<PathBuf> = (1..keep).rev().map(numbered).collect();
    chain.push(base_path.to_path_buf());
    for (from, n) in chain.iter().zip((1..=keep).rev()) {
        if let Err(e) = std::fs::rename(from, numbered(n)) {
            report("rename", from, e);
        }
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so a
/// crash or Ctrl-C never loses the last log lines.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
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

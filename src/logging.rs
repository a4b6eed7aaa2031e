use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Writer for the per-run log file. The subscriber is installed before
/// the output directory is known, so the writer starts as a sink and is
/// pointed at the file once the context has resolved the path; records
/// emitted before that are console-only.
#[derive(Clone, Default)]
pub struct LogFileHandle {
    file: Arc<Mutex<Option<File>>>,
}

impl LogFileHandle {
    pub fn open(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        *self.lock() = Some(file);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Write for LogFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.lock() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.lock() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFileHandle {
    type Writer = LogFileHandle;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn build_subscriber(
    default_level: &str,
    log_file: LogFileHandle,
) -> impl tracing::Subscriber + Send + Sync {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = fmt::layer().with_target(false);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(log_file);
    Registry::default().with(filter).with(console).with(file_layer)
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured default level. The returned
/// handle attaches the per-run log file later via [`LogFileHandle::open`];
/// the batch tools point it at `<out_dir>/<name>.log`. Records emitted
/// through the `log` facade are bridged into tracing.
pub fn init_subscriber(default_level: &str) -> LogFileHandle {
    let log_file = LogFileHandle::default();
    let subscriber = build_subscriber(default_level, log_file.clone());
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        let _ = tracing_log::LogTracer::init();
    }
    log_file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_handle_discards_until_opened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let mut handle = LogFileHandle::default();

        assert_eq!(handle.write(b"before").unwrap(), 6);
        assert!(!path.exists());

        handle.open(&path).unwrap();
        handle.write_all(b"after\n").unwrap();
        handle.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "after\n");
    }

    #[test]
    fn test_file_layer_records_only_events_after_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let handle = LogFileHandle::default();
        let subscriber = build_subscriber("info", handle.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("resolving output directory");
            handle.open(&path).unwrap();
            tracing::info!("starting batch");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("resolving output directory"));
        assert!(contents.contains("starting batch"));
    }
}

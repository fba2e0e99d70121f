//! Scoped capture of diagnostic output.
//!
//! [`capture_output`] runs a future under its own tracing dispatcher that
//! writes into an in-memory buffer. The dispatcher is only active while the
//! future is polled, so the process-wide logger (and the stdio transport)
//! is untouched once the future completes, fails, or is dropped.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};

use tracing::instrument::WithSubscriber;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::MakeWriter;

use wandb_client::projects::Viewer;
use wandb_client::WandbApi;

/// Shared in-memory sink for a capturing subscriber.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[derive(Debug)]
pub struct CaptureWriter {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self.bytes.lock().unwrap_or_else(|p| p.into_inner());
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureBuffer {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            bytes: Arc::clone(&self.bytes),
        }
    }
}

/// Run `fut`, buffering every event it emits at `info` or above.
///
/// Returns the future's output and the captured text.
pub async fn capture_output<F: Future>(fut: F) -> (F::Output, String) {
    let buffer = CaptureBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .without_time()
        .finish();

    let output = fut.with_subscriber(subscriber).await;
    (output, buffer.contents())
}

/// Verify the API key against the viewer endpoint with client output
/// captured, then report what was suppressed through the server logger.
///
/// Failure is logged, not returned: a rejected key surfaces again on the
/// first tool call.
pub async fn login(api: &dyn WandbApi) -> Option<Viewer> {
    info!("Attempting explicit W&B login");
    let (result, captured) = capture_output(api.viewer()).await;

    let captured = captured.trim();
    if !captured.is_empty() {
        info!(output = %captured, "Suppressed output during W&B login");
    }

    match result {
        Ok(viewer) => {
            info!(
                username = viewer.username.as_deref().unwrap_or("unknown"),
                "Explicit W&B login attempt finished"
            );
            Some(viewer)
        }
        Err(e) => {
            error!(error = %e, "Error during explicit W&B login");
            None
        }
    }
}

//! HTTP transfer unit: one streamed POST per file.
//!
//! The request body is read from disk in chunks; every chunk handed to the
//! connection is reported as progress. `stop` cancels the in-flight request
//! and the unit reports `Stopped`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use futures_util::TryStreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client, Url};
use tokio::fs::File;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use ferry_core::{FileCandidate, TransferOutcome, TransferUnit, UnitFactory, UnitHandle, UnitId};

/// Header carrying the original file name.
pub const FILE_NAME_HEADER: &str = "X-File-Name";

/// Everything needed to send one file.
#[derive(Debug)]
struct UploadRequest {
    client: Client,
    endpoint: Url,
    path: PathBuf,
    name: String,
    size: u64,
}

/// Uploads a single local file.
pub struct HttpTransferUnit {
    request: Arc<UploadRequest>,
    runtime: Handle,
    cancel: Mutex<CancellationToken>,
}

impl HttpTransferUnit {
    fn token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransferUnit for HttpTransferUnit {
    fn start(&self, handle: UnitHandle) {
        let token = CancellationToken::new();
        *self.token() = token.clone();
        self.runtime.spawn(run(Arc::clone(&self.request), handle, token));
    }

    fn stop(&self) {
        self.token().cancel();
    }
}

async fn run(request: Arc<UploadRequest>, handle: UnitHandle, cancel: CancellationToken) {
    let outcome = tokio::select! {
        () = cancel.cancelled() => TransferOutcome::Stopped,
        result = post(&request, &handle) => match result {
            Ok(message) => TransferOutcome::Done { message },
            Err(e) => TransferOutcome::Failed { message: format!("{e:#}") },
        },
    };
    tracing::debug!(id = %handle.id(), name = %request.name, ?outcome, "Transfer ended");
    handle.finish(outcome);
}

async fn post(request: &UploadRequest, handle: &UnitHandle) -> Result<Option<String>> {
    let file = File::open(&request.path)
        .await
        .with_context(|| format!("Failed to open {}", request.path.display()))?;

    let (sent_tx, mut sent_rx) = watch::channel(0_u64);
    let mut sent = 0_u64;
    let body = ReaderStream::new(file).inspect_ok(move |chunk| {
        sent += chunk.len() as u64;
        sent_tx.send_replace(sent);
    });

    let response = request
        .client
        .post(request.endpoint.clone())
        .header(FILE_NAME_HEADER, request.name.as_str())
        .header(CONTENT_LENGTH, request.size)
        .body(Body::wrap_stream(body))
        .send();
    tokio::pin!(response);

    let response = loop {
        tokio::select! {
            result = &mut response => break result.context("Request failed")?,
            Ok(()) = sent_rx.changed() => {
                let sent = *sent_rx.borrow_and_update();
                handle.progress(sent);
            }
        }
    };

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("Server returned {status}: {}", text.trim());
    }

    handle.progress(request.size);
    Ok((!text.is_empty()).then_some(text))
}

/// Creates an [`HttpTransferUnit`] for every accepted file.
///
/// Candidates are matched to local paths by name, so names must be unique
/// within one invocation.
pub struct HttpUnitFactory {
    client: Client,
    endpoint: Url,
    runtime: Handle,
    paths: HashMap<String, PathBuf>,
}

impl HttpUnitFactory {
    /// Factory posting to `endpoint`, spawning transfers on `runtime`.
    pub fn new<I>(endpoint: Url, runtime: Handle, paths: I) -> Self
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        Self {
            client: Client::new(),
            endpoint,
            runtime,
            paths: paths.into_iter().collect(),
        }
    }
}

impl UnitFactory for HttpUnitFactory {
    fn create(&self, id: UnitId, file: &FileCandidate) -> Arc<dyn TransferUnit> {
        let path = self
            .paths
            .get(&file.name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(&file.name));
        tracing::debug!(id = %id, path = %path.display(), "Transfer unit created");

        Arc::new(HttpTransferUnit {
            request: Arc::new(UploadRequest {
                client: self.client.clone(),
                endpoint: self.endpoint.clone(),
                path,
                name: file.name.clone(),
                size: file.size,
            }),
            runtime: self.runtime.clone(),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }
}

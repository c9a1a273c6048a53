//! Rate-limited document client.

use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::ClientConfig;
use crate::document::{Document, DocumentId, DocumentSubmitter, HttpSubmitter, SubmissionRequest};
use crate::error::Result;
use crate::ratelimit::RateGate;

/// Creates documents on the remote service without exceeding the gate's rate.
///
/// Cloning is cheap and every clone shares the same gate, so one client can be
/// handed to any number of concurrent tasks.
pub struct DocumentClient<S: DocumentSubmitter = HttpSubmitter> {
    gate: Arc<RateGate>,
    submitter: Arc<S>,
}

impl<S: DocumentSubmitter> Clone for DocumentClient<S> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            submitter: Arc::clone(&self.submitter),
        }
    }
}

impl DocumentClient<HttpSubmitter> {
    /// Create an HTTP client from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let gate = config.rate_limiting.build_gate()?;
        let submitter = HttpSubmitter::from_config(&config.api)?;

        info!(
            endpoint = submitter.endpoint(),
            limit = gate.limit(),
            window_ms = gate.window().as_millis() as u64,
            "Document client initialized"
        );

        Ok(Self::new(gate, submitter))
    }
}

impl<S: DocumentSubmitter> DocumentClient<S> {
    /// Create a client that sends through `submitter` behind `gate`.
    pub fn new(gate: RateGate, submitter: S) -> Self {
        Self::with_shared_gate(Arc::new(gate), submitter)
    }

    /// Create a client that shares an existing gate with other clients.
    pub fn with_shared_gate(gate: Arc<RateGate>, submitter: S) -> Self {
        Self {
            gate,
            submitter: Arc::new(submitter),
        }
    }

    /// The gate every submission passes through.
    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    /// Validate `document`, wait for admission, then submit it.
    ///
    /// Invalid documents fail before the gate is touched. Every admitted call
    /// uses one slot of the window whether or not the submission succeeds.
    #[instrument(
        skip(self, document, signature),
        fields(product_group = %document.product_group)
    )]
    pub async fn create_document(
        &self,
        document: &Document,
        signature: &str,
    ) -> Result<DocumentId> {
        let request = SubmissionRequest::new(document, signature)?;
        self.gate.admit().await;
        self.send(&request).await
    }

    /// Like [`create_document`](Self::create_document), but gives up with
    /// [`ClientError::Cancelled`](crate::error::ClientError::Cancelled) if
    /// `cancel` resolves while waiting for admission.
    ///
    /// Once admitted the submission runs to completion.
    #[instrument(
        skip(self, document, signature, cancel),
        fields(product_group = %document.product_group)
    )]
    pub async fn create_document_until<F>(
        &self,
        document: &Document,
        signature: &str,
        cancel: F,
    ) -> Result<DocumentId>
    where
        F: Future<Output = ()>,
    {
        let request = SubmissionRequest::new(document, signature)?;
        self.gate.admit_until(cancel).await?;
        self.send(&request).await
    }

    async fn send(&self, request: &SubmissionRequest) -> Result<DocumentId> {
        match self.submitter.submit(request).await {
            Ok(id) => {
                info!(document_id = %id, "Document created");
                Ok(id)
            }
            Err(e) => {
                warn!(error = %e, "Document submission failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    /// Records call times and fails the calls whose index is listed.
    #[derive(Default)]
    struct RecordingSubmitter {
        calls: AtomicUsize,
        fail_calls: Vec<usize>,
        times: Mutex<Vec<Instant>>,
    }

    impl RecordingSubmitter {
        fn failing_on(fail_calls: Vec<usize>) -> Self {
            Self {
                fail_calls,
                ..Default::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentSubmitter for RecordingSubmitter {
        async fn submit(&self, _request: &SubmissionRequest) -> Result<DocumentId> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.times.lock().unwrap().push(Instant::now());

            if self.fail_calls.contains(&call) {
                return Err(ClientError::Api {
                    status: 500,
                    code: None,
                    message: "Failed to send API request".to_string(),
                    description: None,
                });
            }
            Ok(DocumentId::new(format!("doc-{}", call)))
        }
    }

    fn valid_document() -> Document {
        Document::new("cGF5bG9hZA==", "milk", "json", "LP_INTRODUCE_GOODS")
    }

    fn client(
        limit: u64,
        window: Duration,
        submitter: RecordingSubmitter,
    ) -> DocumentClient<RecordingSubmitter> {
        DocumentClient::new(RateGate::new(limit, window).unwrap(), submitter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_document_returns_id() {
        let client = client(3, Duration::from_secs(1), RecordingSubmitter::default());

        let id = client.create_document(&valid_document(), "sig").await.unwrap();
        assert_eq!(id.as_str(), "doc-0");
        assert_eq!(client.gate().snapshot().await.count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_document_never_reaches_gate_or_submitter() {
        let client = client(1, Duration::from_secs(1), RecordingSubmitter::default());

        let mut document = valid_document();
        document.document_format = None;
        let result = client.create_document(&document, "sig").await;
        assert!(matches!(result, Err(ClientError::InvalidDocument(_))));

        document.document_format = Some("pdf".to_string());
        let result = client.create_document(&document, "sig").await;
        assert!(matches!(result, Err(ClientError::InvalidDocument(_))));

        assert_eq!(client.submitter.call_count(), 0);
        assert_eq!(client.gate().snapshot().await.count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submission_consumes_a_slot() {
        let window = Duration::from_secs(1);
        let client = client(2, window, RecordingSubmitter::failing_on(vec![0]));
        let start = Instant::now();

        let err = client.create_document(&valid_document(), "sig").await.unwrap_err();
        assert_eq!(err.status(), Some(500));

        client.create_document(&valid_document(), "sig").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The failed call still counted, so the third waits for the next window.
        client.create_document(&valid_document(), "sig").await.unwrap();
        assert!(start.elapsed() >= window);
        assert_eq!(client.submitter.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_respect_limit() {
        let window = Duration::from_millis(100);
        let client = client(2, window, RecordingSubmitter::default());

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.create_document(&valid_document(), "sig").await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        let mut times = client.submitter.times.lock().unwrap().clone();
        times.sort();
        assert_eq!(times.len(), 6);
        // Any three consecutive submissions span at least one window.
        for triple in times.windows(3) {
            assert!(triple[2].duration_since(triple[0]) >= window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_document_until_cancelled() {
        let client = client(1, Duration::from_secs(1), RecordingSubmitter::default());
        client.create_document(&valid_document(), "sig").await.unwrap();

        let result = client
            .create_document_until(&valid_document(), "sig", sleep(Duration::from_millis(100)))
            .await;

        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert_eq!(client.submitter.call_count(), 1);
        assert_eq!(client.gate().snapshot().await.count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_sharing_a_gate() {
        let gate = Arc::new(RateGate::new(1, Duration::from_secs(1)).unwrap());
        let first =
            DocumentClient::with_shared_gate(Arc::clone(&gate), RecordingSubmitter::default());
        let second =
            DocumentClient::with_shared_gate(Arc::clone(&gate), RecordingSubmitter::default());
        let start = Instant::now();

        first.create_document(&valid_document(), "sig").await.unwrap();
        second.create_document(&valid_document(), "sig").await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crpt_client::config::ClientConfig;
use crpt_client::document::{Document, DocumentId, DocumentSubmitter};
use crpt_client::{ClientError, DocumentClient};

/// Submit documents to the Chestny ZNAK API under a client-side rate limit.
#[derive(Parser, Debug)]
#[command(name = "crpt-submit", version)]
struct Args {
    /// YAML configuration file; `CRPT__SECTION__KEY` variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signature sent with every document
    #[arg(short, long)]
    signature: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Document files (JSON) to submit
    #[arg(required = true)]
    documents: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting crpt-submit");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load(args.config.as_deref())?;
    info!(base_url = %config.api.base_url, "Configuration loaded");

    let client = DocumentClient::from_config(&config)?;
    let documents = load_documents(&args.documents).await?;

    let report = submit_all(&client, &documents, &args.signature, shutdown_signal()).await;

    let total = documents.len();
    if !report.unfinished.is_empty() {
        anyhow::bail!(
            "interrupted: {} submitted, {} failed, {} not confirmed of {} documents",
            report.submitted.len(),
            report.failed.len(),
            report.unfinished.len(),
            total
        );
    }

    if !report.failed.is_empty() {
        anyhow::bail!("{} of {} submissions failed", report.failed.len(), total);
    }

    info!(total, "All documents submitted");
    Ok(())
}

/// Outcome of one batch, keyed by the document file each result belongs to.
#[derive(Debug, Default)]
struct Report<'a> {
    submitted: Vec<(&'a Path, DocumentId)>,
    failed: Vec<(&'a Path, ClientError)>,
    /// Files whose submission was still waiting or in flight at shutdown
    unfinished: Vec<&'a Path>,
}

/// Submit every document concurrently, logging each outcome as it completes.
///
/// When `shutdown` resolves the remaining submissions are dropped, which
/// leaves the gate consistent, and their files are reported as unfinished.
async fn submit_all<'a, S, F>(
    client: &DocumentClient<S>,
    documents: &'a [(&'a Path, Document)],
    signature: &str,
    shutdown: F,
) -> Report<'a>
where
    S: DocumentSubmitter,
    F: Future<Output = ()>,
{
    let mut report = Report::default();
    let mut finished = vec![false; documents.len()];

    let mut submissions: FuturesUnordered<_> = documents
        .iter()
        .enumerate()
        .map(move |(index, (_, document))| async move {
            (index, client.create_document(document, signature).await)
        })
        .collect();

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            next = submissions.next() => {
                let Some((index, result)) = next else {
                    break;
                };
                finished[index] = true;
                let path = documents[index].0;
                match result {
                    Ok(id) => {
                        info!(path = %path.display(), document_id = %id, "Submitted");
                        report.submitted.push((path, id));
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Submission failed");
                        report.failed.push((path, e));
                    }
                }
            }
            _ = &mut shutdown => {
                report.unfinished = documents
                    .iter()
                    .zip(&finished)
                    .filter(|(_, done)| !**done)
                    .map(|((path, _), _)| *path)
                    .collect();
                for path in &report.unfinished {
                    warn!(path = %path.display(), "Submission not confirmed before shutdown");
                }
                break;
            }
        }
    }

    report
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn load_documents(paths: &[PathBuf]) -> anyhow::Result<Vec<(&Path, Document)>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document: Document = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        documents.push((path.as_path(), document));
    }
    Ok(documents)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crpt_client::document::SubmissionRequest;
    use crpt_client::ratelimit::RateGate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSubmitter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSubmitter for CountingSubmitter {
        async fn submit(&self, _request: &SubmissionRequest) -> crpt_client::Result<DocumentId> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DocumentId::new(format!("doc-{}", call)))
        }
    }

    fn client(limit: u64) -> DocumentClient<CountingSubmitter> {
        let gate = RateGate::new(limit, Duration::from_secs(1)).unwrap();
        DocumentClient::new(gate, CountingSubmitter::default())
    }

    fn documents<'a>(paths: &[&'a str]) -> Vec<(&'a Path, Document)> {
        paths
            .iter()
            .map(|p| {
                let document =
                    Document::new("cGF5bG9hZA==", "milk", "json", "LP_INTRODUCE_GOODS");
                (Path::new(*p), document)
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_all_reports_every_file() {
        let client = client(5);
        let mut docs = documents(&["a.json", "b.json", "c.json"]);
        docs[1].1.document_format = Some("pdf".to_string());

        let report = submit_all(&client, &docs, "sig", std::future::pending()).await;

        let mut submitted: Vec<_> = report.submitted.iter().map(|(p, _)| *p).collect();
        submitted.sort();
        assert_eq!(submitted, vec![Path::new("a.json"), Path::new("c.json")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Path::new("b.json"));
        assert!(matches!(report.failed[0].1, ClientError::InvalidDocument(_)));
        assert!(report.unfinished.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_finished_results_and_lists_the_rest() {
        let client = client(1);
        let docs = documents(&["first.json", "second.json", "third.json"]);

        let shutdown = tokio::time::sleep(Duration::from_millis(500));
        let report = submit_all(&client, &docs, "sig", shutdown).await;

        assert_eq!(report.submitted.len(), 1);
        assert!(report.failed.is_empty());

        let submitted = report.submitted[0].0;
        let mut expected: Vec<_> = docs
            .iter()
            .map(|(p, _)| *p)
            .filter(|p| *p != submitted)
            .collect();
        let mut unfinished = report.unfinished.clone();
        expected.sort();
        unfinished.sort();
        assert_eq!(unfinished, expected);

        // Cancelled submissions left the window as the first one set it.
        assert_eq!(client.gate().snapshot().await.count, 1);
    }
}

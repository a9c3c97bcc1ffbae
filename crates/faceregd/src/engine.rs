use std::time::Duration;

use facereg_core::{Analyzer, Embedding, EmbeddingProvider, MatchPolicy, ProviderError};
use tokio::sync::{mpsc, oneshot};

/// Requests queued ahead of the one being processed.
const ENGINE_QUEUE_DEPTH: usize = 4;

/// Messages sent from request handlers to the engine thread.
struct EmbedRequest {
    image: Vec<u8>,
    reply: oneshot::Sender<Result<Vec<Embedding>, ProviderError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EmbedRequest>,
    policy: MatchPolicy,
    timeout: Duration,
}

impl EngineHandle {
    /// Queue `image` for analysis and wait for the faces it contains.
    ///
    /// Queueing and analysis together are bounded by the configured timeout.
    pub async fn analyze(&self, image: Vec<u8>) -> Result<Vec<Embedding>, ProviderError> {
        let request = async {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.tx
                .send(EmbedRequest {
                    image,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| ProviderError::Unavailable)?;
            reply_rx.await.map_err(|_| ProviderError::Unavailable)?
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "embedding request timed out");
                Err(ProviderError::Timeout(self.timeout))
            }
        }
    }
}

/// Blocking bridge for the registry workflows.
///
/// Must be called from a thread inside the runtime that is allowed to block
/// (`spawn_blocking`); without a runtime the engine counts as unavailable.
impl EmbeddingProvider for EngineHandle {
    fn embed(&self, image: &[u8]) -> Result<Vec<Embedding>, ProviderError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            tracing::error!("embedding requested outside the tokio runtime");
            ProviderError::Unavailable
        })?;
        runtime.block_on(self.analyze(image.to_vec()))
    }

    fn is_match(&self, known: &Embedding, candidate: &Embedding) -> bool {
        self.policy.is_match(known, candidate)
    }
}

/// Spawn the analyzer on a dedicated OS thread.
///
/// The analyzer is loaded by the caller beforehand so that missing models fail
/// startup rather than the first request. The thread exits once every handle
/// has been dropped.
pub fn spawn_engine<A: Analyzer>(
    mut analyzer: A,
    policy: MatchPolicy,
    timeout: Duration,
) -> std::io::Result<EngineHandle> {
    let (tx, mut rx) = mpsc::channel::<EmbedRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facereg-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let result = analyzer.analyze(&req.image);
                if let Err(err) = &result {
                    tracing::debug!(error = %err, bytes = req.image.len(), "analysis failed");
                }
                // The caller may have timed out and gone away.
                let _ = req.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle {
        tx,
        policy,
        timeout,
    })
}

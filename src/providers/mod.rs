//! DoH provider adapters and their worker pools.
//!
//! Each adapter owns a pool of long-lived workers. Every worker builds one
//! HTTPS client at startup and then loops on the shared dispatch queue:
//! dequeue a question, resolve it against the provider's endpoint, write
//! exactly one reply to the question's sink.

pub mod cloudflare;
pub mod google;
pub mod opendns;

use crate::config::Config;
use crate::dispatch::{Dispatcher, QueryReceiver, next_query};
use crate::error::Result;
use crate::reply::NormalizedReply;
use crate::transport::HttpsClient;
use async_trait::async_trait;
use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};
use std::sync::Arc;
use tracing::{debug, info};

pub use cloudflare::CloudflareDns;
pub use google::GoogleDns;
pub use opendns::OpenDns;

/// Everything one resolver worker owns: a reusable HTTPS client and the
/// upstream address it talks to. Never shared between workers.
pub struct WorkerContext {
    pub client: HttpsClient,
    pub server: String,
}

/// A DoH upstream dialect plus its pool configuration.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Short module name used in logs.
    fn name(&self) -> &'static str;

    /// Worker pool size. Zero disables the provider; that is the only
    /// enable/disable mechanism.
    fn worker_count(&self) -> usize;

    /// Configured upstream address, before any auto-discovery.
    fn server(&self) -> String;

    /// Fresh HTTPS client for one worker talking to `server`.
    fn new_client(&self, server: &str) -> Result<HttpsClient>;

    /// Optional startup self-resolution of the provider's own FQDN.
    /// Returns a replacement upstream address if it succeeded.
    async fn discover_server(&self) -> Option<String> {
        None
    }

    /// Resolve one question. Infallible by contract: upstream failures
    /// come back as replies with `status == -1`.
    async fn resolve(&self, ctx: &WorkerContext, qname: &str, qtype: u16) -> NormalizedReply;
}

/// The compiled-in provider table. Explicit construction, no hidden
/// registration.
pub fn all_providers(config: &Config) -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(GoogleDns::new(config)),
        Arc::new(CloudflareDns::new(config)),
        Arc::new(OpenDns::new(config)),
    ]
}

/// Start a provider's worker pool on the dispatcher.
pub async fn start(provider: Arc<dyn Provider>, dispatcher: &Dispatcher) -> Result<()> {
    let workers = provider.worker_count();
    if workers == 0 {
        debug!("{}: disabled (0 workers)", provider.name());
        return Ok(());
    }

    let server = match provider.discover_server().await {
        Some(found) => found,
        None => provider.server(),
    };

    info!(
        "starting {} {} client(s) querying server {}",
        workers,
        provider.name(),
        server
    );
    for _ in 0..workers {
        let ctx = WorkerContext {
            client: provider.new_client(&server)?,
            server: server.clone(),
        };
        let queue = dispatcher.receiver();
        let provider = provider.clone();
        tokio::spawn(worker_loop(provider, ctx, queue));
    }
    Ok(())
}

async fn worker_loop(provider: Arc<dyn Provider>, ctx: WorkerContext, queue: QueryReceiver) {
    while let Some(query) = next_query(&queue).await {
        let reply = provider.resolve(&ctx, &query.qname, query.qtype).await;
        // exactly one reply per dequeued query; a handler that gave up on
        // its sink is not an error
        let _ = query.reply_sink.send(reply);
    }
}

/// Random alphanumeric padding value blinding the request length against
/// traffic analysis. Length is uniform in [0, 500).
pub fn random_padding() -> String {
    let mut rng = rand::rng();
    let len = rng.random_range(0..500);
    Alphanumeric.sample_string(&mut rng, len)
}

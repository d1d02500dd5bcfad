//! Google Public DNS JSON API client (`/resolve` on dns.google.com).

use super::{Provider, WorkerContext, random_padding};
use crate::config::{Config, GoogleConfig, TransportOptions};
use crate::error::Result;
use crate::reply::NormalizedReply;
use crate::transport::HttpsClient;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::form_urlencoded;

/// FQDN used for closest-server discovery.
const DISCOVERY_FQDN: &str = "dns.google.com";

pub struct GoogleDns {
    config: GoogleConfig,
    transport: TransportOptions,
}

impl GoogleDns {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.google.clone(),
            transport: config.transport.clone(),
        }
    }

    /// Request URI for one question, including EDNS client subnet and
    /// random padding when configured.
    pub fn query_uri(&self, qname: &str, qtype: u16) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("name", qname);
        query.append_pair("type", &qtype.to_string());
        if let Some(subnet) = &self.config.edns_subnet {
            query.append_pair("edns_client_subnet", subnet);
        }
        if self.config.enable_padding {
            query.append_pair("random_padding", &random_padding());
        }
        format!("/resolve?{}", query.finish())
    }

    async fn fetch(&self, client: &HttpsClient, qname: &str, qtype: u16) -> NormalizedReply {
        let uri = self.query_uri(qname, qtype);
        match client.get(&self.config.host, &uri).await {
            Ok(body) => NormalizedReply::from_dns_json(&body),
            Err(e) => {
                debug!("gdns: [{qname}/{qtype}] {e}");
                NormalizedReply::failure()
            }
        }
    }
}

#[async_trait]
impl Provider for GoogleDns {
    fn name(&self) -> &'static str {
        "gdns"
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    fn server(&self) -> String {
        self.config.server.clone()
    }

    fn new_client(&self, server: &str) -> Result<HttpsClient> {
        HttpsClient::new(&self.transport, &self.config.sni, server, false)
    }

    async fn discover_server(&self) -> Option<String> {
        if !self.config.auto_discover_v4 && !self.config.auto_discover_v6 {
            return None;
        }
        let client = match self.new_client(&self.config.server) {
            Ok(client) => client,
            Err(e) => {
                warn!("gdns: discovery client failed: {e}");
                return None;
            }
        };

        let mut discovered = None;
        if self.config.auto_discover_v4 {
            info!("gdns: resolving {DISCOVERY_FQDN}...");
            let probe = self.fetch(&client, DISCOVERY_FQDN, 1).await;
            if probe.status == 0 && !probe.answer.is_empty() {
                discovered = Some(probe.answer[0].data.clone());
            }
        }
        if self.config.auto_discover_v6 {
            info!("gdns: resolving {DISCOVERY_FQDN} (AAAA)...");
            let probe = self.fetch(&client, DISCOVERY_FQDN, 28).await;
            if probe.status == 0 && !probe.answer.is_empty() {
                discovered = Some(probe.answer[0].data.clone());
            }
        }
        discovered
    }

    async fn resolve(&self, ctx: &WorkerContext, qname: &str, qtype: u16) -> NormalizedReply {
        self.fetch(&ctx.client, qname, qtype).await
    }
}

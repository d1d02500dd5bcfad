//! Cloudflare DNS JSON API client (`/dns-query` on dns.cloudflare.com).
//!
//! The dialect matches Google's except that the endpoint negotiates its
//! content type through the `ct` query parameter.

use super::{Provider, WorkerContext, random_padding};
use crate::config::{CloudflareConfig, Config, TransportOptions};
use crate::error::Result;
use crate::reply::NormalizedReply;
use crate::transport::HttpsClient;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::form_urlencoded;

const DISCOVERY_FQDN: &str = "dns.cloudflare.com";

pub struct CloudflareDns {
    config: CloudflareConfig,
    transport: TransportOptions,
}

impl CloudflareDns {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.cloudflare.clone(),
            transport: config.transport.clone(),
        }
    }

    pub fn query_uri(&self, qname: &str, qtype: u16) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        // content type negotiation is via the query string on this endpoint
        query.append_pair("ct", "application/dns-json");
        query.append_pair("name", qname);
        query.append_pair("type", &qtype.to_string());
        if let Some(subnet) = &self.config.edns_subnet {
            query.append_pair("edns_client_subnet", subnet);
        }
        if self.config.enable_padding {
            query.append_pair("random_padding", &random_padding());
        }
        format!("/dns-query?{}", query.finish())
    }

    async fn fetch(&self, client: &HttpsClient, qname: &str, qtype: u16) -> NormalizedReply {
        let uri = self.query_uri(qname, qtype);
        match client.get(&self.config.host, &uri).await {
            Ok(body) => NormalizedReply::from_dns_json(&body),
            Err(e) => {
                debug!("cfdns: [{qname}/{qtype}] {e}");
                NormalizedReply::failure()
            }
        }
    }
}

#[async_trait]
impl Provider for CloudflareDns {
    fn name(&self) -> &'static str {
        "cfdns"
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
        if !self.config.auto_discover_v4 {
            return None;
        }
        let client = match self.new_client(&self.config.server) {
            Ok(client) => client,
            Err(e) => {
                warn!("cfdns: discovery client failed: {e}");
                return None;
            }
        };

        info!("cfdns: resolving {DISCOVERY_FQDN}...");
        let probe = self.fetch(&client, DISCOVERY_FQDN, 1).await;
        if probe.status == 0 && !probe.answer.is_empty() {
            return Some(probe.answer[0].data.clone());
        }
        None
    }

    async fn resolve(&self, ctx: &WorkerContext, qname: &str, qtype: u16) -> NormalizedReply {
        self.fetch(&ctx.client, qname, qtype).await
    }
}

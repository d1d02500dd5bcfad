//! OpenDNS REST client (`/{type}/{name}` on api.openresolve.com).
//!
//! This dialect differs from the dns-json ones: the URI carries the type
//! mnemonic instead of a numeric code, the RCODE arrives as a string, and
//! records come as structured per-type objects that the translator turns
//! into presentation rows. The endpoint only speaks HTTP/1.1.

use super::{Provider, WorkerContext, random_padding};
use crate::config::{Config, OpenDnsConfig, TransportOptions};
use crate::error::Result;
use crate::record::{structured_rows, type_mnemonic};
use crate::reply::NormalizedReply;
use crate::transport::HttpsClient;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::form_urlencoded;

pub struct OpenDns {
    config: OpenDnsConfig,
    transport: TransportOptions,
}

/// Top-level body shape. Sections are decoded row by row so one bad row
/// cannot poison a reply.
#[derive(Debug, Default, Deserialize)]
struct OpenDnsBody {
    #[serde(rename = "ReturnCode", default)]
    return_code: String,
    #[serde(rename = "AnswerSection", default)]
    answer: Vec<serde_json::Value>,
    #[serde(rename = "AuthoritySection", default)]
    authority: Vec<serde_json::Value>,
    #[serde(rename = "AdditionalSection", default)]
    additional: Vec<serde_json::Value>,
}

/// Reverse of the standard RCODE-to-mnemonic table. Unknown strings map
/// to a transport-style failure, which the listener turns into SERVFAIL.
fn status_from_return_code(return_code: &str) -> i32 {
    match return_code {
        "NOERROR" => 0,
        "FORMERR" => 1,
        "SERVFAIL" => 2,
        "NXDOMAIN" => 3,
        "NOTIMP" => 4,
        "REFUSED" => 5,
        "YXDOMAIN" => 6,
        "YXRRSET" => 7,
        "NXRRSET" => 8,
        "NOTAUTH" => 9,
        "NOTZONE" => 10,
        "BADSIG" => 16,
        "BADKEY" => 17,
        "BADTIME" => 18,
        "BADMODE" => 19,
        "BADNAME" => 20,
        "BADALG" => 21,
        "BADTRUNC" => 22,
        "BADCOOKIE" => 23,
        other => {
            debug!("odns: unknown ReturnCode {other:?}");
            -1
        }
    }
}

impl OpenDns {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.opendns.clone(),
            transport: config.transport.clone(),
        }
    }

    /// Request URI for one question: `/{mnemonic}/{qname}`, plus EDNS
    /// client subnet and random padding when configured.
    pub fn query_uri(&self, qname: &str, qtype: u16) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(subnet) = &self.config.edns_subnet {
            query.append_pair("edns_client_subnet", subnet);
        }
        if self.config.enable_padding {
            query.append_pair("random_padding", &random_padding());
        }
        let params = query.finish();
        if params.is_empty() {
            format!("/{}/{}", type_mnemonic(qtype), qname)
        } else {
            format!("/{}/{}?{}", type_mnemonic(qtype), qname, params)
        }
    }

    /// Translate one response body into the normalized shape.
    pub fn parse_body(body: &[u8]) -> NormalizedReply {
        let parsed: OpenDnsBody = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("odns: unparseable body: {e}");
                return NormalizedReply::failure();
            }
        };

        let mut reply = NormalizedReply::failure();
        reply.status = status_from_return_code(&parsed.return_code);
        reply.answer = structured_rows(&parsed.answer);
        reply.authority = structured_rows(&parsed.authority);
        reply.additional = structured_rows(&parsed.additional);
        reply
    }
}

#[async_trait]
impl Provider for OpenDns {
    fn name(&self) -> &'static str {
        "odns"
    }

    fn worker_count(&self) -> usize {
        self.config.workers
    }

    fn server(&self) -> String {
        self.config.server.clone()
    }

    fn new_client(&self, server: &str) -> Result<HttpsClient> {
        // the openresolve endpoint only negotiates HTTP/1.1
        HttpsClient::new(&self.transport, &self.config.sni, server, true)
    }

    async fn resolve(&self, ctx: &WorkerContext, qname: &str, qtype: u16) -> NormalizedReply {
        let uri = self.query_uri(qname, qtype);
        match ctx.client.get(&self.config.host, &uri).await {
            Ok(body) => Self::parse_body(&body),
            Err(e) => {
                debug!("odns: [{qname}/{qtype}] {e}");
                NormalizedReply::failure()
            }
        }
    }
}

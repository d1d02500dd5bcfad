//! The provider-agnostic reply shape shared by workers, cache, and listeners.
//!
//! `NormalizedReply` deserializes directly from the dns-json dialect spoken
//! by Google and Cloudflare; the OpenDNS adapter fills the same struct by
//! hand after translating its structured rows.

use serde::Deserialize;
use std::time::Instant;
use tracing::debug;

/// One resource record row: name and RDATA in presentation form, type as
/// the numeric DNS type code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Rr {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub rr_type: u16,
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
    /// Master-file representation of the RDATA, e.g. `93.184.216.34`
    /// or `10 mail.example.com.`.
    #[serde(rename = "data", alias = "Data", default)]
    pub data: String,
}

impl Rr {
    pub fn new(name: &str, rr_type: u16, ttl: u32, data: &str) -> Self {
        Self {
            name: name.to_string(),
            rr_type,
            ttl,
            data: data.to_string(),
        }
    }
}

/// A DoH answer normalized across providers.
///
/// `status` is the DNS RCODE, or `-1` when the upstream could not be
/// reached at all; the listener turns `-1` into SERVFAIL.
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizedReply {
    #[serde(rename = "Status", default = "failure_status")]
    pub status: i32,
    #[serde(rename = "TC", default)]
    pub tc: bool,
    #[serde(rename = "RD", default)]
    pub rd: bool,
    #[serde(rename = "RA", default)]
    pub ra: bool,
    #[serde(rename = "AD", default)]
    pub ad: bool,
    #[serde(rename = "CD", default)]
    pub cd: bool,
    #[serde(rename = "Question", default)]
    pub question: Vec<Rr>,
    #[serde(rename = "Answer", default)]
    pub answer: Vec<Rr>,
    #[serde(rename = "Authority", default)]
    pub authority: Vec<Rr>,
    #[serde(rename = "Additional", default)]
    pub additional: Vec<Rr>,
    #[serde(rename = "Comment", default)]
    pub comment: Option<String>,
    #[serde(skip, default = "Instant::now")]
    pub captured_at: Instant,
}

fn failure_status() -> i32 {
    -1
}

impl NormalizedReply {
    /// Synthetic reply for a failed upstream exchange.
    pub fn failure() -> Self {
        Self {
            status: -1,
            tc: false,
            rd: false,
            ra: false,
            ad: false,
            cd: false,
            question: Vec::new(),
            answer: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            comment: None,
            captured_at: Instant::now(),
        }
    }

    /// Parse a dns-json body. Missing fields stay at their zero values;
    /// a body that does not parse at all becomes a failure reply.
    pub fn from_dns_json(body: &[u8]) -> Self {
        match serde_json::from_slice::<NormalizedReply>(body) {
            Ok(reply) => {
                if let Some(comment) = &reply.comment {
                    debug!("upstream comment: {comment}");
                }
                reply
            }
            Err(e) => {
                debug!("unparseable dns-json body: {e}");
                Self::failure()
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status < 0
    }
}

//! The reusable HTTPS GET primitive each resolver worker owns.
//!
//! A client is configured once (wire mode, TLS, proxy) and then reused for
//! every request the worker handles. Three wire modes exist: HTTP/1.1
//! (also the proxy path), HTTP/2 (the default), and HTTP over QUIC behind
//! the `quic` cargo feature.

use crate::config::TransportOptions;
use crate::error::{RatatoskError, Result};
use reqwest::StatusCode;
use reqwest::header::HOST;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{trace, warn};

/// Whole-request deadline for one upstream exchange.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One worker's HTTPS client. Owned by exactly one worker task and never
/// shared.
pub struct HttpsClient {
    client: reqwest::Client,
    /// URL authority for every request: the SNI name when the upstream
    /// address is pinned by IP, otherwise the raw server string.
    authority: String,
}

impl HttpsClient {
    /// Build a client for `server` with `sni` as the TLS server name.
    ///
    /// Transport selection, first match wins: forced/process-wide
    /// HTTP/1.1 or a configured proxy -> HTTP/1.1; `use_quic` -> QUIC;
    /// otherwise HTTP/2.
    pub fn new(
        opts: &TransportOptions,
        sni: &str,
        server: &str,
        force_h1: bool,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(opts.insecure);

        // The TLS server name comes from the URL authority, so dial the
        // upstream IP through a pinned resolution of the SNI name.
        let authority = match server.parse::<IpAddr>() {
            Ok(ip) => {
                builder = builder.resolve(sni, SocketAddr::new(ip, 443));
                sni.to_string()
            }
            Err(_) => {
                warn!("upstream {server} is not an IP literal; using it as TLS authority and ignoring SNI {sni}");
                server.to_string()
            }
        };

        if force_h1 || opts.use_h1 || opts.proxy.is_some() {
            builder = builder.http1_only();
            if let Some(proxy) = &opts.proxy {
                builder = builder.proxy(proxy_from_url(proxy)?);
            }
        } else if opts.use_quic {
            builder = quic_transport(builder);
        } else {
            builder = builder.http2_prior_knowledge();
        }

        let client = builder
            .build()
            .map_err(|e| RatatoskError::ClientBuild(e.to_string()))?;
        Ok(Self { client, authority })
    }

    /// GET `https://{authority}{uri}` with the given `Host` header.
    /// Returns the body on HTTP 200; any transport failure, non-200
    /// status, or read failure is an error. Never retries.
    ///
    /// The Host header is advisory on the HTTP/2 and QUIC paths, where
    /// the authority pseudo-header comes from the URL.
    pub async fn get(&self, host: &str, uri: &str) -> Result<Vec<u8>> {
        let url = format!("https://{}{}", self.authority, uri);
        let response = self
            .client
            .get(&url)
            .header(HOST, host)
            .send()
            .await
            .map_err(|e| RatatoskError::Upstream(e.to_string()))?;

        let status = response.status();
        trace!("GET {url}: {status}");
        if status != StatusCode::OK {
            return Err(RatatoskError::UpstreamStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RatatoskError::Upstream(e.to_string()))?;
        Ok(body.to_vec())
    }
}

fn proxy_from_url(raw: &str) -> Result<reqwest::Proxy> {
    // accept the socks:// shorthand for socks5://
    let normalized = match raw.strip_prefix("socks://") {
        Some(rest) => format!("socks5://{rest}"),
        None => raw.to_string(),
    };
    reqwest::Proxy::all(normalized)
        .map_err(|e| RatatoskError::InvalidProxyUrl(format!("{raw}: {e}")))
}

#[cfg(feature = "quic")]
fn quic_transport(builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
    builder.http3_prior_knowledge()
}

#[cfg(not(feature = "quic"))]
fn quic_transport(builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
    warn!("QUIC transport requested but this build lacks the `quic` feature; using HTTP/2");
    builder
}

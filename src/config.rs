//! Command-line surface and the immutable configuration tree built from it.
//!
//! Everything here is parsed once at startup; the resulting structs are
//! shared read-only for the life of the process.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// A caching DNS proxy resolving over HTTPS.
#[derive(Debug, Parser)]
#[command(name = "ratatosk", version, about)]
pub struct Cli {
    /// IP address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Listen on port number
    #[arg(long, default_value_t = 32000)]
    pub port: u16,

    /// Use the HTTPS/1.1 transport
    #[arg(long)]
    pub h1: bool,

    /// Use the QUIC transport
    #[arg(long)]
    pub quic: bool,

    /// Disable TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// HTTP or SOCKS5 proxy URL, e.g. "http://127.0.0.1:8080" or
    /// "socks5://127.0.0.1:1080" (forces HTTPS/1.1)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Debugging level (0..7)
    #[arg(long, default_value_t = 2)]
    pub dbg: u8,

    /// Reply cache TTL in seconds
    #[arg(long, default_value_t = 10)]
    pub cache_ttl: u64,

    /// Google DNS: number of independent workers
    #[arg(long, default_value_t = 10)]
    pub gdns_workers: usize,

    /// Google DNS: server address
    #[arg(long, default_value = "216.58.195.78")]
    pub gdns_server: String,

    /// Google DNS: try to lookup the closest IPv4 server
    #[arg(long)]
    pub gdns_auto: bool,

    /// Google DNS: try to lookup the closest IPv6 server
    #[arg(long)]
    pub gdns_auto6: bool,

    /// Google DNS: SNI string to send (should match server certificate)
    #[arg(long, default_value = "www.google.com")]
    pub gdns_sni: String,

    /// Google DNS: HTTP 'Host' header (real FQDN, encrypted in TLS)
    #[arg(long, default_value = "dns.google.com")]
    pub gdns_host: String,

    /// Google DNS: EDNS client subnet (set 0.0.0.0/0 to disable)
    #[arg(long)]
    pub gdns_edns: Option<String>,

    /// Google DNS: disable random padding
    #[arg(long)]
    pub gdns_nopad: bool,

    /// Cloudflare DNS: number of independent workers
    #[arg(long, default_value_t = 10)]
    pub cfdns_workers: usize,

    /// Cloudflare DNS: server address
    #[arg(long, default_value = "1.1.1.1")]
    pub cfdns_server: String,

    /// Cloudflare DNS: try to lookup the closest IPv4 server
    #[arg(long)]
    pub cfdns_auto: bool,

    /// Cloudflare DNS: SNI string to send (should match server certificate)
    #[arg(long, default_value = "dns.cloudflare.com")]
    pub cfdns_sni: String,

    /// Cloudflare DNS: HTTP 'Host' header (real FQDN, encrypted in TLS)
    #[arg(long, default_value = "dns.cloudflare.com")]
    pub cfdns_host: String,

    /// Cloudflare DNS: EDNS client subnet (set 0.0.0.0/0 to disable)
    #[arg(long)]
    pub cfdns_edns: Option<String>,

    /// Cloudflare DNS: disable random padding
    #[arg(long)]
    pub cfdns_nopad: bool,

    /// OpenDNS: number of independent workers
    #[arg(long, default_value_t = 0)]
    pub odns_workers: usize,

    /// OpenDNS: web server address
    #[arg(long, default_value = "67.215.70.81")]
    pub odns_server: String,

    /// OpenDNS: SNI string to send (should match server certificate)
    #[arg(long, default_value = "www.openresolve.com")]
    pub odns_sni: String,

    /// OpenDNS: HTTP 'Host' header
    #[arg(long, default_value = "api.openresolve.com")]
    pub odns_host: String,

    /// OpenDNS: EDNS client subnet (set 0.0.0.0/0 to disable)
    #[arg(long)]
    pub odns_edns: Option<String>,

    /// OpenDNS: disable random padding
    #[arg(long)]
    pub odns_nopad: bool,
}

/// Process-wide transport options consulted when each worker builds its
/// HTTPS client.
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    /// Force HTTP/1.1 everywhere
    pub use_h1: bool,

    /// Use HTTP over QUIC instead of native HTTP/2
    pub use_quic: bool,

    /// Skip TLS certificate verification
    pub insecure: bool,

    /// Forward proxy URL; implies HTTP/1.1
    pub proxy: Option<String>,
}

/// Reply cache tuning.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Lifetime of every cached reply. Uniform for all entries; the
    /// records' own TTLs are ignored.
    pub entry_ttl: Duration,

    /// Cadence of the janitor sweep.
    pub janitor_interval: Duration,

    /// Upper bound on how long anything may sit in the cache.
    pub max_retention: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(10),
            janitor_interval: Duration::from_secs(60),
            max_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Google Public DNS adapter configuration.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub workers: usize,
    pub server: String,
    pub sni: String,
    pub host: String,
    pub edns_subnet: Option<String>,
    pub enable_padding: bool,
    pub auto_discover_v4: bool,
    pub auto_discover_v6: bool,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            server: "216.58.195.78".to_string(),
            sni: "www.google.com".to_string(),
            host: "dns.google.com".to_string(),
            edns_subnet: None,
            enable_padding: true,
            auto_discover_v4: false,
            auto_discover_v6: false,
        }
    }
}

/// Cloudflare DNS adapter configuration.
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    pub workers: usize,
    pub server: String,
    pub sni: String,
    pub host: String,
    pub edns_subnet: Option<String>,
    pub enable_padding: bool,
    pub auto_discover_v4: bool,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            server: "1.1.1.1".to_string(),
            sni: "dns.cloudflare.com".to_string(),
            host: "dns.cloudflare.com".to_string(),
            edns_subnet: None,
            enable_padding: true,
            auto_discover_v4: false,
        }
    }
}

/// OpenDNS (openresolve) adapter configuration. Disabled by default.
#[derive(Debug, Clone)]
pub struct OpenDnsConfig {
    pub workers: usize,
    pub server: String,
    pub sni: String,
    pub host: String,
    pub edns_subnet: Option<String>,
    pub enable_padding: bool,
}

impl Default for OpenDnsConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            server: "67.215.70.81".to_string(),
            sni: "www.openresolve.com".to_string(),
            host: "api.openresolve.com".to_string(),
            edns_subnet: None,
            enable_padding: true,
        }
    }
}

/// The full immutable configuration tree.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub verbosity: u8,
    pub transport: TransportOptions,
    pub cache: CacheOptions,
    pub google: GoogleConfig,
    pub cloudflare: CloudflareConfig,
    pub opendns: OpenDnsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 32000),
            verbosity: 2,
            transport: TransportOptions::default(),
            cache: CacheOptions::default(),
            google: GoogleConfig::default(),
            cloudflare: CloudflareConfig::default(),
            opendns: OpenDnsConfig::default(),
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            bind: SocketAddr::new(cli.bind, cli.port),
            verbosity: cli.dbg,
            transport: TransportOptions {
                use_h1: cli.h1,
                use_quic: cli.quic,
                insecure: cli.insecure,
                proxy: cli.proxy,
            },
            cache: CacheOptions {
                entry_ttl: Duration::from_secs(cli.cache_ttl),
                ..CacheOptions::default()
            },
            google: GoogleConfig {
                workers: cli.gdns_workers,
                server: cli.gdns_server,
                sni: cli.gdns_sni,
                host: cli.gdns_host,
                edns_subnet: cli.gdns_edns,
                enable_padding: !cli.gdns_nopad,
                auto_discover_v4: cli.gdns_auto,
                auto_discover_v6: cli.gdns_auto6,
            },
            cloudflare: CloudflareConfig {
                workers: cli.cfdns_workers,
                server: cli.cfdns_server,
                sni: cli.cfdns_sni,
                host: cli.cfdns_host,
                edns_subnet: cli.cfdns_edns,
                enable_padding: !cli.cfdns_nopad,
                auto_discover_v4: cli.cfdns_auto,
            },
            opendns: OpenDnsConfig {
                workers: cli.odns_workers,
                server: cli.odns_server,
                sni: cli.odns_sni,
                host: cli.odns_host,
                edns_subnet: cli.odns_edns,
                enable_padding: !cli.odns_nopad,
            },
        }
    }
}

impl Config {
    /// Default tracing directive for the `--dbg` verbosity scale.
    pub fn log_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "ratatosk=error",
            1 => "ratatosk=warn",
            2 => "ratatosk=info",
            3..=5 => "ratatosk=debug",
            _ => "ratatosk=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_upstream_defaults() {
        let config = Config::from(Cli::parse_from(["ratatosk"]));
        assert_eq!(config.bind.to_string(), "127.0.0.1:32000");
        assert_eq!(config.google.workers, 10);
        assert_eq!(config.google.server, "216.58.195.78");
        assert!(config.google.enable_padding);
        assert_eq!(config.cloudflare.server, "1.1.1.1");
        assert_eq!(config.opendns.workers, 0);
        assert!(config.opendns.enable_padding);
        assert!(config.opendns.edns_subnet.is_none());
        assert_eq!(config.cache.entry_ttl, Duration::from_secs(10));
        assert_eq!(config.cache.janitor_interval, Duration::from_secs(60));
    }

    #[test]
    fn proxy_and_nopad_flags() {
        let config = Config::from(Cli::parse_from([
            "ratatosk",
            "--proxy",
            "socks5://127.0.0.1:1080",
            "--gdns-nopad",
            "--odns-nopad",
            "--odns-edns",
            "192.0.2.0/24",
            "--port",
            "5353",
        ]));
        assert_eq!(config.transport.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert!(!config.google.enable_padding);
        assert!(config.cloudflare.enable_padding);
        assert!(!config.opendns.enable_padding);
        assert_eq!(config.opendns.edns_subnet.as_deref(), Some("192.0.2.0/24"));
        assert_eq!(config.bind.port(), 5353);
    }

    #[test]
    fn verbosity_maps_to_directives() {
        let mut config = Config::default();
        config.verbosity = 0;
        assert_eq!(config.log_directive(), "ratatosk=error");
        config.verbosity = 7;
        assert_eq!(config.log_directive(), "ratatosk=trace");
    }
}

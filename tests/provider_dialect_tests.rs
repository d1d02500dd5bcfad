//! Request/response dialect checks for the three provider adapters.

use ratatosk::config::Config;
use ratatosk::providers::{CloudflareDns, GoogleDns, OpenDns};
use ratatosk::reply::NormalizedReply;
use std::collections::HashSet;
use url::Url;

fn parse_query_pairs(uri: &str) -> Vec<(String, String)> {
    let url = Url::parse(&format!("https://upstream.test{uri}")).unwrap();
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn pair<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

#[test]
fn google_uri_carries_name_and_numeric_type() {
    let google = GoogleDns::new(&Config::default());
    let uri = google.query_uri("example.com.", 28);
    assert!(uri.starts_with("/resolve?"));
    let pairs = parse_query_pairs(&uri);
    assert_eq!(pair(&pairs, "name"), Some("example.com."));
    assert_eq!(pair(&pairs, "type"), Some("28"));
}

#[test]
fn google_padding_is_alphanumeric_and_bounded() {
    let google = GoogleDns::new(&Config::default());
    for _ in 0..50 {
        let pairs = parse_query_pairs(&google.query_uri("example.com.", 1));
        let padding = pair(&pairs, "random_padding").expect("padding enabled by default");
        assert!(padding.len() < 500);
        assert!(padding.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

#[test]
fn padded_uris_differ_across_requests() {
    let google = GoogleDns::new(&Config::default());
    let distinct: HashSet<String> =
        (0..10).map(|_| google.query_uri("example.com.", 1)).collect();
    assert!(distinct.len() > 1, "padding should vary the URI");
}

#[test]
fn google_nopad_and_edns_subnet() {
    let mut config = Config::default();
    config.google.enable_padding = false;
    config.google.edns_subnet = Some("192.0.2.0/24".to_string());
    let google = GoogleDns::new(&config);

    let pairs = parse_query_pairs(&google.query_uri("example.com.", 1));
    assert!(pair(&pairs, "random_padding").is_none());
    assert_eq!(pair(&pairs, "edns_client_subnet"), Some("192.0.2.0/24"));
}

#[test]
fn cloudflare_uri_negotiates_content_type_first() {
    let cloudflare = CloudflareDns::new(&Config::default());
    let uri = cloudflare.query_uri("example.com.", 1);
    // the ct parameter must be in the query string for this endpoint
    assert!(uri.starts_with("/dns-query?ct=application%2Fdns-json&"));
    let pairs = parse_query_pairs(&uri);
    assert_eq!(pair(&pairs, "ct"), Some("application/dns-json"));
    assert_eq!(pair(&pairs, "name"), Some("example.com."));
    assert_eq!(pair(&pairs, "type"), Some("1"));
    assert!(pair(&pairs, "random_padding").is_some());
}

#[test]
fn opendns_uri_uses_mnemonic_path() {
    let mut config = Config::default();
    config.opendns.enable_padding = false;
    let odns = OpenDns::new(&config);
    assert_eq!(odns.query_uri("example.com.", 1), "/A/example.com.");
    assert_eq!(odns.query_uri("example.com.", 16), "/TXT/example.com.");
    assert_eq!(
        odns.query_uri("4.3.2.1.in-addr.arpa.", 12),
        "/PTR/4.3.2.1.in-addr.arpa."
    );
}

#[test]
fn opendns_padding_and_edns_ride_the_query_string() {
    let mut config = Config::default();
    config.opendns.edns_subnet = Some("192.0.2.0/24".to_string());
    let odns = OpenDns::new(&config);

    let uri = odns.query_uri("example.com.", 1);
    assert!(uri.starts_with("/A/example.com.?"));
    let pairs = parse_query_pairs(&uri);
    assert_eq!(pair(&pairs, "edns_client_subnet"), Some("192.0.2.0/24"));
    let padding = pair(&pairs, "random_padding").expect("padding enabled by default");
    assert!(padding.len() < 500);
    assert!(padding.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[test]
fn dns_json_reply_normalizes() {
    // the documented reply shape for example.com/A
    let body = br#"{"Status":0,"TC":false,"RD":true,"RA":true,"AD":false,"CD":false,
        "Question":[{"Name":"example.com.","Type":1}],
        "Answer":[{"Name":"example.com.","Type":1,"TTL":3600,"data":"93.184.216.34"}],
        "Comment":"Response from 93.184.216.34."}"#;
    let reply = NormalizedReply::from_dns_json(body);
    assert_eq!(reply.status, 0);
    assert!(!reply.is_failure());
    assert_eq!(reply.answer.len(), 1);
    assert_eq!(reply.answer[0].data, "93.184.216.34");
    assert_eq!(reply.comment.as_deref(), Some("Response from 93.184.216.34."));
}

#[test]
fn opendns_reply_normalizes_structured_rows() {
    let body = br#"{
        "ReturnCode": "NOERROR",
        "AnswerSection": [
            {"Name": "example.com.", "Type": "A", "Class": "IN", "TTL": 3600,
             "Address": "93.184.216.34"},
            {"Name": "example.com.", "Type": "MX", "Class": "IN", "TTL": 300,
             "Preference": 10, "MailExchanger": "mail.example.com."}
        ],
        "AdditionalSection": []
    }"#;
    let reply = OpenDns::parse_body(body);
    assert_eq!(reply.status, 0);
    assert_eq!(reply.answer.len(), 2);
    assert_eq!(reply.answer[1].data, "10 mail.example.com.");
}

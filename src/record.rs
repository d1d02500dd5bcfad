//! Translation of provider record rows into wire-format resource records.
//!
//! Two input shapes exist: the dns-json rows already carrying RDATA in
//! presentation form (Google, Cloudflare), and the structured per-type
//! rows of the OpenDNS dialect. Both funnel into the DNS codec's
//! master-file parser. Translation failures are always per-row: one
//! malformed record never poisons the rest of a reply.

use crate::error::{RatatoskError, Result};
use crate::reply::Rr;
use hickory_proto::rr::{Name, Record, RecordType};
use hickory_proto::serialize::txt::Parser;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

/// Presentation mnemonic for a numeric RR type code, e.g. `1` -> `A`.
pub fn type_mnemonic(rr_type: u16) -> String {
    RecordType::from(rr_type).to_string()
}

/// Numeric type code for a mnemonic, if the codec knows it.
pub fn type_code(mnemonic: &str) -> Option<u16> {
    RecordType::from_str(mnemonic).ok().map(u16::from)
}

/// Build a wire RR from a `{name, type, ttl, data}` row by parsing the
/// presentation line `"{name} {ttl} IN {mnemonic} {data}"`.
pub fn wire_record(name: &str, rr_type: u16, ttl: u32, data: &str) -> Result<Record> {
    let line = format!("{} {} IN {} {}", name, ttl, type_mnemonic(rr_type), data);
    parse_rr_line(&line)
}

/// Wire RR for one dns-json row.
pub fn row_to_record(row: &Rr) -> Result<Record> {
    wire_record(&row.name, row.rr_type, row.ttl, &row.data)
}

fn parse_rr_line(line: &str) -> Result<Record> {
    let (_, rrsets) = Parser::new(line, None, Some(Name::root()))
        .parse()
        .map_err(|e| RatatoskError::RecordTranslation(format!("{line:?}: {e}")))?;
    rrsets
        .into_iter()
        .flat_map(|(_, rrset)| rrset.records_without_rrsigs().cloned().collect::<Vec<_>>())
        .next()
        .ok_or_else(|| RatatoskError::RecordTranslation(format!("{line:?}: no record produced")))
}

/// One structured row of the OpenDNS dialect: common header fields plus a
/// per-type RDATA shape selected by the `Type` tag. Unrecognized types
/// fall into `Unknown` and are dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct StructuredRow {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
    #[serde(flatten)]
    pub rdata: StructuredRdata,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "Type")]
pub enum StructuredRdata {
    A {
        #[serde(rename = "Address")]
        address: String,
    },
    #[serde(rename = "AAAA")]
    Aaaa {
        #[serde(rename = "Address")]
        address: String,
    },
    #[serde(rename = "CNAME")]
    Cname {
        #[serde(rename = "Target")]
        target: String,
    },
    #[serde(rename = "MX")]
    Mx {
        #[serde(rename = "Preference")]
        preference: u16,
        #[serde(rename = "MailExchanger")]
        mail_exchanger: String,
    },
    #[serde(rename = "NS")]
    Ns {
        #[serde(rename = "Target")]
        target: String,
    },
    #[serde(rename = "PTR")]
    Ptr {
        #[serde(rename = "Target")]
        target: String,
    },
    #[serde(rename = "TXT")]
    Txt {
        #[serde(rename = "TxtData")]
        txt_data: String,
    },
    #[serde(rename = "SOA")]
    Soa {
        #[serde(rename = "MasterServerName")]
        master_server_name: String,
        #[serde(rename = "MaintainerName")]
        maintainer_name: String,
        #[serde(rename = "Serial")]
        serial: u32,
        #[serde(rename = "Refresh")]
        refresh: i64,
        #[serde(rename = "Retry")]
        retry: i64,
        #[serde(rename = "Expire")]
        expire: i64,
        #[serde(rename = "NegativeTtl")]
        negative_ttl: i64,
    },
    #[serde(rename = "NAPTR")]
    Naptr {
        #[serde(rename = "Order")]
        order: u16,
        #[serde(rename = "Preference")]
        preference: u16,
        #[serde(rename = "Flags")]
        flags: String,
        #[serde(rename = "Service")]
        service: String,
        #[serde(rename = "Regexp")]
        regexp: String,
        #[serde(rename = "Replacement")]
        replacement: String,
    },
    #[serde(other)]
    Unknown,
}

impl StructuredRow {
    fn mnemonic(&self) -> Option<&'static str> {
        match self.rdata {
            StructuredRdata::A { .. } => Some("A"),
            StructuredRdata::Aaaa { .. } => Some("AAAA"),
            StructuredRdata::Cname { .. } => Some("CNAME"),
            StructuredRdata::Mx { .. } => Some("MX"),
            StructuredRdata::Ns { .. } => Some("NS"),
            StructuredRdata::Ptr { .. } => Some("PTR"),
            StructuredRdata::Txt { .. } => Some("TXT"),
            StructuredRdata::Soa { .. } => Some("SOA"),
            StructuredRdata::Naptr { .. } => Some("NAPTR"),
            StructuredRdata::Unknown => None,
        }
    }

    /// Presentation RDATA for the recognized types; `None` for `Unknown`.
    pub fn rdata_presentation(&self) -> Option<String> {
        match &self.rdata {
            StructuredRdata::A { address } | StructuredRdata::Aaaa { address } => {
                Some(address.clone())
            }
            StructuredRdata::Cname { target }
            | StructuredRdata::Ns { target }
            | StructuredRdata::Ptr { target } => Some(target.clone()),
            StructuredRdata::Mx {
                preference,
                mail_exchanger,
            } => Some(format!("{preference} {mail_exchanger}")),
            StructuredRdata::Txt { txt_data } => Some(txt_data.clone()),
            StructuredRdata::Soa {
                master_server_name,
                maintainer_name,
                serial,
                refresh,
                retry,
                expire,
                negative_ttl,
            } => Some(format!(
                "{master_server_name} {maintainer_name} {serial} {refresh} {retry} {expire} {negative_ttl}"
            )),
            StructuredRdata::Naptr {
                order,
                preference,
                flags,
                service,
                regexp,
                replacement,
            } => Some(format!(
                "{order} {preference} \"{flags}\" \"{service}\" \"{regexp}\" {replacement}"
            )),
            StructuredRdata::Unknown => None,
        }
    }

    /// Flatten into the shared row shape; `None` for unrecognized types.
    pub fn to_row(&self) -> Option<Rr> {
        let mnemonic = self.mnemonic()?;
        let rr_type = type_code(mnemonic)?;
        let data = self.rdata_presentation()?;
        Some(Rr::new(&self.name, rr_type, self.ttl, &data))
    }
}

/// Translate one structured section, dropping rows that fail to decode.
/// Each row is decoded independently so a single malformed record cannot
/// take the section down.
pub fn structured_rows(section: &[serde_json::Value]) -> Vec<Rr> {
    let mut rows = Vec::with_capacity(section.len());
    for value in section {
        match serde_json::from_value::<StructuredRow>(value.clone()) {
            Ok(row) => match row.to_row() {
                Some(rr) => rows.push(rr),
                None => debug!("dropping record row of unsupported type: {value}"),
            },
            Err(e) => debug!("dropping malformed record row ({e}): {value}"),
        }
    }
    rows
}

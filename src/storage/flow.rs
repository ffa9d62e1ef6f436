//! The `flows` table: its DDL and the row type written into it.

use std::net::{IpAddr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

pub const FLOWS_TABLE: &str = "flows";

/// Ten minute partitions, two weeks of retention.
pub const CREATE_FLOWS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS flows (
    agent           IPv6,
    int_in          UInt32,
    int_out         UInt32,
    src_addr        IPv6,
    dst_addr        IPv6,
    src_prefix_addr IPv6,
    src_prefix_len  UInt8,
    dst_prefix_addr IPv6,
    dst_prefix_len  UInt8,
    src_asn         UInt32,
    dst_asn         UInt32,
    protocol        UInt8,
    src_port        UInt16,
    dst_port        UInt16,
    timestamp       DateTime,
    size            UInt64,
    packets         UInt64,
    samplerate      UInt64
) ENGINE = MergeTree()
PARTITION BY toStartOfTenMinutes(timestamp)
ORDER BY (timestamp)
TTL timestamp + INTERVAL 14 DAY
SETTINGS index_granularity = 8192
";

/// One sampled flow as stored in ClickHouse. Serializes to a `JSONEachRow` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(serialize_with = "ipv6_text")]
    pub agent: IpAddr,
    pub int_in: u32,
    pub int_out: u32,
    #[serde(serialize_with = "ipv6_text")]
    pub src_addr: IpAddr,
    #[serde(serialize_with = "ipv6_text")]
    pub dst_addr: IpAddr,
    #[serde(serialize_with = "ipv6_opt_text")]
    pub src_prefix_addr: Option<IpAddr>,
    pub src_prefix_len: u8,
    #[serde(serialize_with = "ipv6_opt_text")]
    pub dst_prefix_addr: Option<IpAddr>,
    pub dst_prefix_len: u8,
    pub src_asn: u32,
    pub dst_asn: u32,
    pub protocol: u8,
    pub src_port: u16,
    pub dst_port: u16,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    pub packets: u64,
    pub samplerate: u64,
}

/// IPv6 columns hold IPv4 addresses in their mapped form.
fn to_v6(addr: &IpAddr) -> Ipv6Addr {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => *v6,
    }
}

fn ipv6_text<S: Serializer>(addr: &IpAddr, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&to_v6(addr))
}

// A missing prefix is stored as 0.0.0.0.
fn ipv6_opt_text<S: Serializer>(addr: &Option<IpAddr>, s: S) -> Result<S::Ok, S::Error> {
    let addr = addr.unwrap_or(IpAddr::from([0u8, 0, 0, 0]));
    s.collect_str(&to_v6(&addr))
}

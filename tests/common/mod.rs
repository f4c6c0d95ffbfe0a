//! Shared fixtures for the integration tests
#![allow(dead_code)]

pub mod writer;

use std::io::Write;
use tempfile::NamedTempFile;
use writer::{DatabaseBuilder, Value};

/// Every (ip version, record size) combination the format allows
pub const LAYOUTS: &[(u16, u16)] = &[(4, 24), (4, 28), (4, 32), (6, 24), (6, 28), (6, 32)];

/// (network, country iso code, city) fixture rows
pub const NETWORKS: &[(&str, &str, &str)] = &[
    ("1.0.0.0/24", "AU", "Brisbane"),
    ("2.125.160.216/29", "GB", "Boxford"),
    ("67.43.156.0/24", "BT", "Thimphu"),
    ("81.2.69.0/24", "GB", "London"),
    ("89.160.20.112/28", "SE", "Linköping"),
    ("175.16.199.0/24", "CN", "Changchun"),
    ("216.160.83.56/29", "US", "Milton"),
    ("2001:218::/32", "JP", "Tokyo"),
    ("2a02:d280::/29", "CZ", "Prague"),
];

fn names(en: &str) -> Value {
    Value::map([("en", Value::string(en)), ("de", Value::string(&format!("{} (de)", en)))])
}

/// A city-database style record
pub fn location(country: &str, city: &str) -> Value {
    Value::map([
        ("city", Value::map([("names", names(city))])),
        (
            "country",
            Value::map([("iso_code", Value::string(country)), ("names", names(country))]),
        ),
        (
            "location",
            Value::map([
                ("latitude", Value::Double(city.len() as f64)),
                ("longitude", Value::Double(-(country.len() as f64))),
                ("accuracy_radius", Value::Uint16(100)),
            ]),
        ),
    ])
}

/// Fixture rows that fit a tree of `ip_version`
pub fn networks_for(ip_version: u16) -> Vec<(&'static str, &'static str, &'static str)> {
    NETWORKS
        .iter()
        .copied()
        .filter(|(net, _, _)| ip_version == 6 || !net.contains(':'))
        .collect()
}

/// Fixture database (IPv6 trees alias ::ffff:0:0/96 onto the IPv4 subtree)
pub fn city_db(ip_version: u16, record_size: u16) -> Vec<u8> {
    let mut builder = DatabaseBuilder::new(ip_version, record_size)
        .shared_keys(true)
        .alias_ipv4(ip_version == 6)
        .database_type("Test-City");
    for (net, country, city) in networks_for(ip_version) {
        builder.insert(net, location(country, city));
    }
    builder.build()
}

/// Write bytes to a temporary file with the given suffix
pub fn temp_db(bytes: &[u8], suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

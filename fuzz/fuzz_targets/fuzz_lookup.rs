#![no_main]
use geolocations::{DataValue, Location, Reader};
use libfuzzer_sys::fuzz_target;
use std::net::IpAddr;
use std::sync::OnceLock;

#[allow(dead_code)]
#[path = "../../tests/common/writer.rs"]
mod writer;

use writer::{DatabaseBuilder, Value};

// Reader is Sync, so one shared instance serves every run
static CITY_DB: OnceLock<Reader> = OnceLock::new();

fn city_db() -> &'static Reader {
    CITY_DB.get_or_init(|| {
        let mut builder = DatabaseBuilder::new(6, 28).shared_keys(true).alias_ipv4(true);
        let names = |en: &str| Value::map([("en", Value::string(en))]);
        builder
            .insert("10.0.0.0/8", Value::map([("city", Value::map([("names", names("Ten"))]))]))
            .insert("81.2.69.0/24", Value::map([("country", Value::map([("iso_code", Value::string("GB"))]))]))
            .insert("2001:db8::/32", Value::map([("traits", Value::map([("isp", Value::string("doc"))]))]))
            .insert("fc00::/7", Value::Array(vec![Value::Uint16(1), Value::Bool(true)]));
        Reader::from_bytes(builder.build()).expect("fixture database")
    })
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the mode, the rest is either an address or a raw record
    let (mode, rest) = (data[0], &data[1..]);
    match mode % 3 {
        0 => {
            let mut octets = [0u8; 16];
            let n = rest.len().min(16);
            octets[..n].copy_from_slice(&rest[..n]);
            let ip = if n <= 4 {
                IpAddr::from([octets[0], octets[1], octets[2], octets[3]])
            } else {
                IpAddr::from(octets)
            };
            let _ = city_db().lookup::<Location>(ip);
            let _ = city_db().lookup::<DataValue>(ip);
        }
        1 => {
            if let Ok(text) = std::str::from_utf8(rest) {
                let _ = city_db().find_str::<Location>(text);
            }
        }
        _ => {
            // Arbitrary bytes as the stored record
            let mut builder = DatabaseBuilder::new(4, 24);
            builder.insert_raw("10.0.0.0/8", rest.to_vec());
            if let Ok(reader) = Reader::from_bytes(builder.build()) {
                let _ = reader.find_str::<Location>("10.0.0.1");
                let _ = reader.find_str::<DataValue>("10.0.0.1");
            }
        }
    }
});

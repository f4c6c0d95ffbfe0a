//! Minimal MMDB writer for tests.
//!
//! Std-only so it can be shared by the library's unit tests and the
//! integration tests. Produces complete files:
//! [search tree][16 zero bytes][data section][marker][metadata map].

use std::collections::HashMap;
use std::net::IpAddr;

/// Metadata marker
pub const MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// A value to encode. Maps keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Double(f64),
    Bytes(Vec<u8>),
    Uint16(u16),
    Uint32(u32),
    Map(Vec<(String, Value)>),
    Int32(i32),
    Uint64(u64),
    Uint128(u128),
    Array(Vec<Value>),
    Bool(bool),
    Float(f32),
    /// Raw pointer, relative to the pointer base
    Pointer(u32),
}

impl Value {
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

fn push_control(type_id: u8, size: usize, out: &mut Vec<u8>) {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };
    if type_id <= 7 {
        out.push((type_id << 5) | size_bits);
    } else {
        out.push(size_bits);
        out.push(type_id - 7);
    }
    out.extend_from_slice(&extra);
}

fn push_uint(type_id: u8, be: &[u8], out: &mut Vec<u8>) {
    let skip = be.iter().take_while(|&&b| b == 0).count();
    push_control(type_id, be.len() - skip, out);
    out.extend_from_slice(&be[skip..]);
}

/// Encode a pointer to `relative` using the shortest form
pub fn encode_pointer(relative: u32) -> Vec<u8> {
    if relative < 2048 {
        vec![0x20 | ((relative >> 8) & 0x7) as u8, relative as u8]
    } else if relative < 526_336 {
        let v = relative - 2048;
        vec![0x28 | ((v >> 16) & 0x7) as u8, (v >> 8) as u8, v as u8]
    } else if relative < 134_744_064 {
        let v = relative - 526_336;
        vec![
            0x30 | ((v >> 24) & 0x7) as u8,
            (v >> 16) as u8,
            (v >> 8) as u8,
            v as u8,
        ]
    } else {
        let mut out = vec![0x38];
        out.extend_from_slice(&relative.to_be_bytes());
        out
    }
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Pointer(p) => out.extend(encode_pointer(*p)),
        Value::String(s) => {
            push_control(2, s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Double(d) => {
            push_control(3, 8, out);
            out.extend_from_slice(&d.to_be_bytes());
        }
        Value::Bytes(b) => {
            push_control(4, b.len(), out);
            out.extend_from_slice(b);
        }
        Value::Uint16(n) => push_uint(5, &n.to_be_bytes(), out),
        Value::Uint32(n) => push_uint(6, &n.to_be_bytes(), out),
        Value::Map(entries) => {
            push_control(7, entries.len(), out);
            for (k, v) in entries {
                encode_into(&Value::String(k.clone()), out);
                encode_into(v, out);
            }
        }
        Value::Int32(n) => push_uint(8, &n.to_be_bytes(), out),
        Value::Uint64(n) => push_uint(9, &n.to_be_bytes(), out),
        Value::Uint128(n) => push_uint(10, &n.to_be_bytes(), out),
        Value::Array(items) => {
            push_control(11, items.len(), out);
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Bool(b) => push_control(14, *b as usize, out),
        Value::Float(f) => {
            push_control(15, 4, out);
            out.extend_from_slice(&f.to_be_bytes());
        }
    }
}

/// Encode one value on its own (pointer base 0)
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Data section builder with de-duplication of identical values and,
/// optionally, map keys stored once and referenced through pointers.
#[derive(Default)]
pub struct DataWriter {
    bytes: Vec<u8>,
    dedup: HashMap<Vec<u8>, u32>,
    keys: HashMap<String, u32>,
    shared_keys: bool,
}

impl DataWriter {
    pub fn new(shared_keys: bool) -> Self {
        Self {
            shared_keys,
            ..Self::default()
        }
    }

    fn intern_key(&mut self, key: &str) -> u32 {
        if let Some(&offset) = self.keys.get(key) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        encode_into(&Value::string(key), &mut self.bytes);
        self.keys.insert(key.to_string(), offset);
        offset
    }

    fn encode_shared(&mut self, value: &Value, out: &mut Vec<u8>) {
        match value {
            Value::Map(entries) if self.shared_keys => {
                push_control(7, entries.len(), out);
                for (k, v) in entries {
                    let offset = self.intern_key(k);
                    out.extend(encode_pointer(offset));
                    self.encode_shared(v, out);
                }
            }
            Value::Array(items) if self.shared_keys => {
                push_control(11, items.len(), out);
                for item in items {
                    self.encode_shared(item, out);
                }
            }
            other => encode_into(other, out),
        }
    }

    /// Store a value and return its offset within the data section
    pub fn add(&mut self, value: &Value) -> u32 {
        let mut out = Vec::new();
        self.encode_shared(value, &mut out);
        if let Some(&offset) = self.dedup.get(&out) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(&out);
        self.dedup.insert(out, offset);
        offset
    }

    /// Append raw bytes, returning their offset
    pub fn add_raw(&mut self, raw: &[u8]) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(raw);
        offset
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Rec {
    Empty,
    Node(usize),
    Data(u32),
}

struct Tree {
    nodes: Vec<[Rec; 2]>,
}

fn bit_at(bytes: &[u8], depth: usize) -> usize {
    ((bytes[depth >> 3] >> (7 - (depth % 8))) & 1) as usize
}

impl Tree {
    fn insert(&mut self, bytes: &[u8], prefix: usize, rec: Rec) {
        assert!(prefix > 0, "a /0 network cannot be stored below the root");
        let mut node = 0;
        for depth in 0..prefix {
            let bit = bit_at(bytes, depth);
            if depth == prefix - 1 {
                self.nodes[node][bit] = rec;
                return;
            }
            match self.nodes[node][bit] {
                Rec::Node(next) => node = next,
                other => {
                    let next = self.nodes.len();
                    self.nodes.push([other, other]);
                    self.nodes[node][bit] = Rec::Node(next);
                    node = next;
                }
            }
        }
    }

    fn walk_zeros(&self, depth: usize) -> Option<usize> {
        let mut node = 0;
        for _ in 0..depth {
            match self.nodes[node][0] {
                Rec::Node(next) => node = next,
                _ => return None,
            }
        }
        Some(node)
    }
}

/// Sizes of the parts of a built file
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub node_count: u32,
    pub tree_size: usize,
    pub data_start: usize,
    pub metadata_start: usize,
}

/// Builds a complete database from (network, value) pairs
pub struct DatabaseBuilder {
    ip_version: u16,
    record_size: u16,
    shared_keys: bool,
    alias_ipv4: bool,
    database_type: String,
    languages: Vec<String>,
    build_epoch: u64,
    networks: Vec<([u8; 16], usize, Value)>,
    raw_networks: Vec<([u8; 16], usize, Vec<u8>)>,
}

impl DatabaseBuilder {
    pub fn new(ip_version: u16, record_size: u16) -> Self {
        assert!(ip_version == 4 || ip_version == 6);
        Self {
            ip_version,
            record_size,
            shared_keys: false,
            alias_ipv4: false,
            database_type: "Test-City".to_string(),
            languages: vec!["en".to_string(), "de".to_string()],
            build_epoch: 1_700_000_000,
            networks: Vec::new(),
            raw_networks: Vec::new(),
        }
    }

    pub fn shared_keys(mut self, shared: bool) -> Self {
        self.shared_keys = shared;
        self
    }

    /// Point ::ffff:0:0/96 at the IPv4 subtree (IPv6 trees only)
    pub fn alias_ipv4(mut self, alias: bool) -> Self {
        self.alias_ipv4 = alias;
        self
    }

    pub fn database_type(mut self, name: &str) -> Self {
        self.database_type = name.to_string();
        self
    }

    pub fn build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = epoch;
        self
    }

    fn parse(&self, cidr: &str) -> ([u8; 16], usize) {
        let (addr, prefix) = cidr.split_once('/').expect("network must be in CIDR form");
        let addr: IpAddr = addr.parse().expect("valid address");
        let prefix: usize = prefix.parse().expect("valid prefix");
        let mut bytes = [0u8; 16];
        match addr {
            IpAddr::V4(v4) if self.ip_version == 6 => {
                bytes[12..].copy_from_slice(&v4.octets());
                (bytes, prefix + 96)
            }
            IpAddr::V4(v4) => {
                bytes[..4].copy_from_slice(&v4.octets());
                (bytes, prefix)
            }
            IpAddr::V6(v6) => {
                assert_eq!(self.ip_version, 6, "IPv6 network in an IPv4 tree");
                (v6.octets(), prefix)
            }
        }
    }

    pub fn insert(&mut self, cidr: &str, value: Value) -> &mut Self {
        let (bytes, prefix) = self.parse(cidr);
        self.networks.push((bytes, prefix, value));
        self
    }

    /// Store pre-encoded bytes for a network (for corrupt-data tests)
    pub fn insert_raw(&mut self, cidr: &str, raw: Vec<u8>) -> &mut Self {
        let (bytes, prefix) = self.parse(cidr);
        self.raw_networks.push((bytes, prefix, raw));
        self
    }

    fn metadata(&self, node_count: u32) -> Value {
        Value::map([
            ("binary_format_major_version", Value::Uint16(2)),
            ("binary_format_minor_version", Value::Uint16(0)),
            ("build_epoch", Value::Uint64(self.build_epoch)),
            ("database_type", Value::string(&self.database_type)),
            (
                "description",
                Value::map([
                    ("en", Value::string("Test database")),
                    ("de", Value::string("Testdatenbank")),
                ]),
            ),
            ("ip_version", Value::Uint16(self.ip_version)),
            (
                "languages",
                Value::Array(self.languages.iter().map(|l| Value::string(l)).collect()),
            ),
            ("node_count", Value::Uint32(node_count)),
            ("record_size", Value::Uint16(self.record_size)),
        ])
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_layout().0
    }

    pub fn build_layout(&self) -> (Vec<u8>, Layout) {
        let mut data = DataWriter::new(self.shared_keys);
        let mut entries: Vec<([u8; 16], usize, u32)> = Vec::new();
        for (bytes, prefix, value) in &self.networks {
            entries.push((*bytes, *prefix, data.add(value)));
        }
        for (bytes, prefix, raw) in &self.raw_networks {
            entries.push((*bytes, *prefix, data.add_raw(raw)));
        }
        // Less specific first so longer prefixes split and overwrite them
        entries.sort_by_key(|(_, prefix, _)| *prefix);

        let mut tree = Tree {
            nodes: vec![[Rec::Empty, Rec::Empty]],
        };
        for (bytes, prefix, offset) in &entries {
            tree.insert(bytes, *prefix, Rec::Data(*offset));
        }

        if self.alias_ipv4 && self.ip_version == 6 {
            if let Some(start) = tree.walk_zeros(96) {
                let mut mapped = [0u8; 16];
                mapped[10] = 0xff;
                mapped[11] = 0xff;
                tree.insert(&mapped, 96, Rec::Node(start));
            }
        }

        let node_count = tree.nodes.len() as u32;
        let record_value = |rec: Rec| -> u32 {
            match rec {
                Rec::Empty => node_count,
                Rec::Node(n) => n as u32,
                Rec::Data(offset) => node_count + 16 + offset,
            }
        };

        let mut out = Vec::new();
        for [left, right] in &tree.nodes {
            let (l, r) = (record_value(*left), record_value(*right));
            match self.record_size {
                24 => {
                    out.extend_from_slice(&l.to_be_bytes()[1..]);
                    out.extend_from_slice(&r.to_be_bytes()[1..]);
                }
                28 => {
                    out.extend_from_slice(&l.to_be_bytes()[1..]);
                    out.push((((l >> 24) & 0x0F) << 4) as u8 | ((r >> 24) & 0x0F) as u8);
                    out.extend_from_slice(&r.to_be_bytes()[1..]);
                }
                32 => {
                    out.extend_from_slice(&l.to_be_bytes());
                    out.extend_from_slice(&r.to_be_bytes());
                }
                other => panic!("unsupported record size {}", other),
            }
        }
        let tree_size = out.len();
        out.extend_from_slice(&[0u8; 16]);
        let data_start = out.len();
        out.extend(data.into_bytes());
        out.extend_from_slice(MARKER);
        let metadata_start = out.len();
        out.extend(encode_value(&self.metadata(node_count)));

        (
            out,
            Layout {
                node_count,
                tree_size,
                data_start,
                metadata_start,
            },
        )
    }
}

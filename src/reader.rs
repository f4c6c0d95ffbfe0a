//! Database reader
//!
//! [`Reader`] owns the database bytes, the decoded [`Metadata`] and the
//! [`SearchTree`] geometry. It answers point lookups from any number of
//! threads and produces full-database iterations ([`FindAll`]).
//!
//! # Example
//!
//! ```no_run
//! use geolocations::{AccessMode, Location, Reader};
//!
//! let reader = Reader::from_path("GeoLite2-City.mmdb")
//!     .mode(AccessMode::Memory)
//!     .open()?;
//!
//! if let Some(location) = reader.find::<Location>("81.2.69.160".parse()?)? {
//!     println!("{:?}", location.city.name("en"));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::activator::{ActivatorRegistry, InjectableValues};
use crate::buffer::{AccessMode, Buffer};
use crate::cache::CachedDictionary;
use crate::decoder::{Decode, DecodeContext, Decoder};
use crate::error::{Error, Result};
use crate::mmdb::{IpVersion, Metadata, SearchTree, TreeRecord, IPV4_SUBTREE_DEPTH, METADATA_MARKER};
use crate::network::Network;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options for opening a database
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// How the file is brought into memory
    pub mode: AccessMode,
    /// Activator registry to share; a fresh one is created when `None`
    pub registry: Option<Arc<ActivatorRegistry>>,
}

/// Builder returned by [`Reader::from_path`]
#[derive(Debug, Clone)]
pub struct ReaderOpener {
    path: PathBuf,
    options: ReaderOptions,
}

impl ReaderOpener {
    /// Access mode (memory-mapped by default)
    pub fn mode(mut self, mode: AccessMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Share an activator registry with other readers
    pub fn registry(mut self, registry: Arc<ActivatorRegistry>) -> Self {
        self.options.registry = Some(registry);
        self
    }

    /// Replace all options at once
    pub fn options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Open the database
    ///
    /// Files ending in `.gz` are inflated into memory whatever the
    /// requested mode.
    pub fn open(self) -> Result<Reader> {
        let gzipped = self
            .path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"));

        let buffer = if gzipped {
            log::debug!("inflating gzip database {}", self.path.display());
            Buffer::from_reader(GzDecoder::new(File::open(&self.path)?))?
        } else {
            Buffer::open(&self.path, self.options.mode)?
        };
        log::debug!(
            "opened {} ({} bytes, {})",
            self.path.display(),
            buffer.len(),
            if buffer.is_mapped() { "memory-mapped" } else { "in memory" }
        );
        Reader::with_buffer(buffer, self.options.registry)
    }
}

/// Outcome of a point lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult<T> {
    /// Decoded record, `None` on a miss
    pub data: Option<T>,
    /// The queried address with the prefix length of the deciding tree
    /// record (for a miss, the depth of the empty branch)
    pub network: Network,
    /// True when a record was found
    pub found: bool,
}

impl<T> LookupResult<T> {
    /// Prefix length of the matching (or empty) branch
    pub fn prefix_len(&self) -> u8 {
        self.network.prefix_len()
    }
}

/// Options for [`Reader::find_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindAllOptions {
    /// Capacity of the decode cache (0 is raised to 1)
    pub cache_size: usize,
    /// Skip subtrees that alias the IPv4 range inside an IPv6 tree
    pub skip_aliased_networks: bool,
}

impl Default for FindAllOptions {
    fn default() -> Self {
        Self {
            cache_size: 16_384,
            skip_aliased_networks: true,
        }
    }
}

/// One (network, record) pair produced by full iteration
#[derive(Debug, Clone)]
pub struct NetworkRecord<T> {
    /// Network covered by the record
    pub network: Network,
    /// Decoded record, shared by every network pointing at the same data
    pub data: Arc<T>,
}

impl<T> NetworkRecord<T> {
    /// Network address
    pub fn ip(&self) -> IpAddr {
        self.network.ip()
    }

    /// Prefix length
    pub fn prefix_len(&self) -> u8 {
        self.network.prefix_len()
    }
}

/// Read-only database handle
///
/// `Reader` is `Send + Sync`; a single instance serves concurrent point
/// lookups. Dropping it (or calling [`Reader::close`]) releases the file.
#[derive(Debug)]
pub struct Reader {
    buffer: Buffer,
    metadata: Metadata,
    tree: SearchTree,
    registry: Arc<ActivatorRegistry>,
    data_end: usize,
}

impl Reader {
    /// Start opening a database file
    pub fn from_path<P: AsRef<Path>>(path: P) -> ReaderOpener {
        ReaderOpener {
            path: path.as_ref().to_path_buf(),
            options: ReaderOptions::default(),
        }
    }

    /// Open a database file with default options (memory-mapped)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_path(path).open()
    }

    /// Open a database held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::with_buffer(Buffer::from_vec(bytes), None)
    }

    /// Read a whole stream into memory and open it
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::with_buffer(Buffer::from_reader(reader)?, None)
    }

    /// Open a database over an existing buffer
    pub fn with_buffer(buffer: Buffer, registry: Option<Arc<ActivatorRegistry>>) -> Result<Self> {
        let registry = registry.unwrap_or_default();
        let (metadata, metadata_start) = Metadata::read(&buffer, &registry)?;
        let data_end = metadata_start - METADATA_MARKER.len();
        let tree = SearchTree::new(
            metadata.node_count,
            metadata.record_size,
            metadata.ip_version,
            data_end,
        )?;

        log::debug!(
            "{} database: {} nodes, {}-bit records, IPv{}, built {}",
            metadata.database_type,
            metadata.node_count,
            metadata.record_size.bits(),
            metadata.ip_version.number(),
            metadata.build_epoch
        );

        Ok(Self {
            buffer,
            metadata,
            tree,
            registry,
            data_end,
        })
    }

    /// Release the database. Equivalent to dropping the reader.
    pub fn close(self) {
        log::debug!("closing {} database", self.metadata.database_type);
    }

    /// Database metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Search tree geometry
    pub fn search_tree(&self) -> &SearchTree {
        &self.tree
    }

    /// Underlying bytes
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Registry used to construct records
    pub fn registry(&self) -> &Arc<ActivatorRegistry> {
        &self.registry
    }

    fn decoder(&self) -> Decoder<'_> {
        Decoder::new(&self.buffer, self.tree.data_section_start())
    }

    /// Record for `ip`, or `None` when the address is not in the database
    pub fn find<T: Decode>(&self, ip: IpAddr) -> Result<Option<T>> {
        Ok(self.lookup_inner(ip, None)?.data)
    }

    /// Like [`Reader::find`], handing `injectables` to records that ask
    /// for them
    pub fn find_with<T: Decode>(&self, ip: IpAddr, injectables: &InjectableValues) -> Result<Option<T>> {
        Ok(self.lookup_inner(ip, Some(injectables))?.data)
    }

    /// Record for `ip` together with the matched network
    pub fn lookup<T: Decode>(&self, ip: IpAddr) -> Result<LookupResult<T>> {
        self.lookup_inner(ip, None)
    }

    /// [`Reader::lookup`] with injectables
    pub fn lookup_with<T: Decode>(
        &self,
        ip: IpAddr,
        injectables: &InjectableValues,
    ) -> Result<LookupResult<T>> {
        self.lookup_inner(ip, Some(injectables))
    }

    /// [`Reader::find`] for address text
    pub fn find_str<T: Decode>(&self, address: &str) -> Result<Option<T>> {
        self.find(parse_address(address)?)
    }

    /// [`Reader::lookup`] for address text
    pub fn lookup_str<T: Decode>(&self, address: &str) -> Result<LookupResult<T>> {
        self.lookup(parse_address(address)?)
    }

    fn lookup_inner<T: Decode>(
        &self,
        ip: IpAddr,
        injectables: Option<&InjectableValues>,
    ) -> Result<LookupResult<T>> {
        let (record, prefix_len) = self.tree.walk(&self.buffer, ip)?;
        let network = Network::new(ip, prefix_len);

        let pointer = match record {
            TreeRecord::Data(pointer) => pointer,
            _ => {
                return Ok(LookupResult {
                    data: None,
                    network,
                    found: false,
                })
            }
        };

        let offset = self.tree.resolve_data_pointer(pointer, self.data_end)?;
        let ctx = DecodeContext::new(&self.registry)
            .with_network(Some(network))
            .with_injectables(injectables);
        let (data, _) = self.decoder().decode::<T>(offset, &ctx)?;

        Ok(LookupResult {
            data: Some(data),
            network,
            found: true,
        })
    }

    /// Every network in the database with its decoded record, in address
    /// order.
    ///
    /// Records shared by several networks are decoded once and handed out
    /// as the same `Arc`. Record network slots receive `None` here. Each
    /// call starts a fresh walk with its own cache.
    pub fn find_all<'r, T: Decode>(
        &'r self,
        options: FindAllOptions,
        injectables: Option<&'r InjectableValues>,
    ) -> FindAll<'r, T> {
        FindAll {
            reader: self,
            injectables,
            cache: CachedDictionary::new(options.cache_size),
            stack: vec![NetNode {
                bytes: [0u8; 16],
                bit: 0,
                record: 0,
            }],
            skip_aliases: options.skip_aliased_networks
                && self.tree.ip_version() == IpVersion::V6,
            failed: false,
        }
    }
}

fn parse_address(address: &str) -> Result<IpAddr> {
    address
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("'{}' is not an IPv4 or IPv6 address", address)))
}

/// Pending subtree of a full iteration
#[derive(Debug, Clone, Copy)]
struct NetNode {
    bytes: [u8; 16],
    bit: usize,
    record: u32,
}

/// Iterator returned by [`Reader::find_all`]
///
/// Depth-first over an explicit stack: the left child is followed at once
/// and the right child is pushed for later. Stops after the first error.
pub struct FindAll<'r, T> {
    reader: &'r Reader,
    injectables: Option<&'r InjectableValues>,
    cache: CachedDictionary<T>,
    stack: Vec<NetNode>,
    skip_aliases: bool,
    failed: bool,
}

impl<'r, T: Decode> FindAll<'r, T> {
    /// Decode-cache (hits, misses) so far
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    fn is_alias(&self, node: &NetNode, index: u32) -> Result<bool> {
        if !self.skip_aliases {
            return Ok(false);
        }
        let reader = self.reader;
        // The real IPv4 subtree is reached through 96 zero bits; any other
        // path to the same node is an alias.
        Ok(index == reader.tree.ipv4_start(&reader.buffer)?
            && node.bytes.iter().any(|&b| b != 0))
    }

    fn descend(&mut self, mut node: NetNode) -> Result<Option<NetworkRecord<T>>> {
        let reader = self.reader;
        let bit_count = reader.tree.ip_version().bit_count();

        loop {
            match reader.tree.classify(node.record) {
                TreeRecord::Empty => return Ok(None),
                TreeRecord::Data(pointer) => {
                    let network = network_of(&node, reader.tree.ip_version());
                    let offset = reader.tree.resolve_data_pointer(pointer, reader.data_end)?;
                    let ctx = DecodeContext::new(&reader.registry).with_injectables(self.injectables);
                    let decoder = reader.decoder();
                    let data = self.cache.get_or_decode(pointer, || {
                        decoder.decode::<T>(offset, &ctx).map(|(value, _)| value)
                    })?;
                    return Ok(Some(NetworkRecord { network, data }));
                }
                TreeRecord::Node(index) => {
                    if self.is_alias(&node, index)? {
                        log::trace!("skipping aliased subtree at bit {}", node.bit);
                        return Ok(None);
                    }
                    if node.bit >= bit_count {
                        return Err(Error::invalid(format!(
                            "search tree reaches node {} below bit {}",
                            index, bit_count
                        )));
                    }

                    let mut right = node.bytes;
                    right[node.bit >> 3] |= 0x80 >> (node.bit % 8);
                    self.stack.push(NetNode {
                        bytes: right,
                        bit: node.bit + 1,
                        record: reader.tree.read_node(&reader.buffer, index, 1)?,
                    });
                    node = NetNode {
                        bytes: node.bytes,
                        bit: node.bit + 1,
                        record: reader.tree.read_node(&reader.buffer, index, 0)?,
                    };
                }
            }
        }
    }
}

impl<'r, T: Decode> Iterator for FindAll<'r, T> {
    type Item = Result<NetworkRecord<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some(node) = self.stack.pop() {
            match self.descend(node) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => {
                    self.failed = true;
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Network for a record reached after `node.bit` bits. Records under the
/// IPv4 subtree of an IPv6 tree are reported as IPv4 networks.
fn network_of(node: &NetNode, ip_version: IpVersion) -> Network {
    let prefix = node.bit as u8;
    match ip_version {
        IpVersion::V4 => {
            let [a, b, c, d, ..] = node.bytes;
            Network::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), prefix)
        }
        IpVersion::V6 => {
            if node.bit >= IPV4_SUBTREE_DEPTH && node.bytes[..12].iter().all(|&b| b == 0) {
                let [.., a, b, c, d] = node.bytes;
                Network::new(
                    IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
                    prefix - IPV4_SUBTREE_DEPTH as u8,
                )
            } else {
                Network::new(IpAddr::V6(Ipv6Addr::from(node.bytes)), prefix)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_value::DataValue;
    use crate::test_writer::{DatabaseBuilder, Value};

    fn city(name: &str) -> Value {
        Value::map([("city", Value::string(name))])
    }

    fn reader(builder: &DatabaseBuilder) -> Reader {
        Reader::from_bytes(builder.build()).unwrap()
    }

    #[test]
    fn test_reader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Reader>();
    }

    #[test]
    fn test_find_v4_tree() {
        let mut builder = DatabaseBuilder::new(4, 24);
        builder
            .insert("1.2.3.0/24", city("Alpha"))
            .insert("10.0.0.0/8", city("Beta"));
        let reader = reader(&builder);

        let hit = reader.lookup::<DataValue>("1.2.3.4".parse().unwrap()).unwrap();
        assert!(hit.found);
        assert_eq!(hit.prefix_len(), 24);
        assert_eq!(hit.data.unwrap().get("city").and_then(DataValue::as_str), Some("Alpha"));

        let miss = reader.lookup::<DataValue>("9.9.9.9".parse().unwrap()).unwrap();
        assert!(!miss.found);
        assert!(miss.data.is_none());
        assert!(miss.prefix_len() > 0);
    }

    #[test]
    fn test_find_str_invalid_address() {
        let reader = reader(&DatabaseBuilder::new(4, 24));
        let err = reader.find_str::<DataValue>("not-an-ip").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn test_ipv4_in_v6_tree() {
        let mut builder = DatabaseBuilder::new(6, 28);
        builder
            .insert("81.2.69.0/24", city("London"))
            .insert("2001:db8::/32", city("Doc"));
        let reader = reader(&builder);

        let hit = reader.lookup::<DataValue>("81.2.69.160".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix_len(), 24);
        assert_eq!(hit.network.to_string(), "81.2.69.0/24");

        let hit = reader.lookup::<DataValue>("2001:db8::1".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix_len(), 32);
    }

    #[test]
    fn test_find_all_order_and_rebase() {
        let mut builder = DatabaseBuilder::new(6, 32).alias_ipv4(true);
        builder
            .insert("1.2.3.0/24", city("A"))
            .insert("1.2.4.0/24", city("A"))
            .insert("2001:db8::/32", city("B"));
        let reader = reader(&builder);

        let found: Vec<_> = reader
            .find_all::<DataValue>(FindAllOptions::default(), None)
            .collect::<Result<_>>()
            .unwrap();
        let networks: Vec<String> = found.iter().map(|r| r.network.to_string()).collect();
        assert_eq!(networks, vec!["1.2.3.0/24", "1.2.4.0/24", "2001:db8::/32"]);

        // identical records share one decoded object
        assert!(Arc::ptr_eq(&found[0].data, &found[1].data));
    }

    #[test]
    fn test_find_all_without_alias_skipping() {
        let mut builder = DatabaseBuilder::new(6, 24).alias_ipv4(true);
        builder.insert("1.2.3.0/24", city("A"));
        let reader = reader(&builder);

        let options = FindAllOptions {
            skip_aliased_networks: false,
            ..FindAllOptions::default()
        };
        let networks: Vec<String> = reader
            .find_all::<DataValue>(options, None)
            .map(|r| r.map(|r| r.network.to_string()))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(networks, vec!["1.2.3.0/24", "::ffff:1.2.3.0/120"]);
    }

    #[test]
    fn test_corrupt_pointer_stops_iteration() {
        let mut bytes = {
            let mut builder = DatabaseBuilder::new(4, 32);
            builder.insert("128.0.0.0/1", city("X"));
            builder.build()
        };
        // node 0 right record -> far beyond the data section
        bytes[4..8].copy_from_slice(&0x7fff_ffffu32.to_be_bytes());
        let reader = Reader::from_bytes(bytes).unwrap();

        let mut iter = reader.find_all::<DataValue>(FindAllOptions::default(), None);
        assert!(iter.next().unwrap().unwrap_err().is_invalid_database());
        assert!(iter.next().is_none());

        let err = reader.find::<DataValue>("200.0.0.1".parse().unwrap()).unwrap_err();
        assert!(err.is_invalid_database());
    }

    #[test]
    fn test_empty_stream_rejected() {
        let err = Reader::from_reader(std::io::empty()).unwrap_err();
        assert!(err.is_invalid_database());
    }
}

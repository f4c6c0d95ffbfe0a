//! MMDB Search Tree Traversal
//!
//! The file starts with `node_count` nodes. Each node holds two records
//! (left for bit 0, right for bit 1) that point to either:
//! - Another node (value < node_count, continue traversal)
//! - The empty marker (value == node_count, no data)
//! - A data section entry (value > node_count)
//!
//! The tree does not own the bytes it walks; every call takes the
//! [`Buffer`] the tree was built over.

use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, IPV4_SUBTREE_DEPTH};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use std::net::IpAddr;
use std::sync::OnceLock;

/// A record classified against the node count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeRecord {
    /// Index of another node
    Node(u32),
    /// Empty branch
    Empty,
    /// Raw data pointer (still relative to the node count)
    Data(u32),
}

/// Result of a point lookup that reached data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHit {
    /// Raw record value of the data pointer
    pub pointer: u32,
    /// Number of address bits consumed to reach the pointer
    pub prefix_len: u8,
}

/// Search tree geometry plus the cached IPv4 start node
#[derive(Debug)]
pub struct SearchTree {
    node_count: u32,
    record_size: RecordSize,
    ip_version: IpVersion,
    tree_size: usize,
    ipv4_start: OnceLock<u32>,
}

impl SearchTree {
    /// Describe the tree at the start of a buffer of `buffer_len` bytes.
    ///
    /// The tree and its separator must fit inside the buffer.
    pub fn new(
        node_count: u32,
        record_size: RecordSize,
        ip_version: IpVersion,
        buffer_len: usize,
    ) -> Result<Self> {
        let tree_size = (node_count as usize)
            .checked_mul(record_size.node_bytes())
            .ok_or_else(|| Error::invalid(format!("node count {} overflows", node_count)))?;
        if tree_size + DATA_SECTION_SEPARATOR_SIZE > buffer_len {
            return Err(Error::invalid(format!(
                "search tree of {} bytes does not fit in a {} byte file",
                tree_size, buffer_len
            )));
        }
        Ok(Self {
            node_count,
            record_size,
            ip_version,
            tree_size,
            ipv4_start: OnceLock::new(),
        })
    }

    /// Number of nodes
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Size of the tree in bytes
    pub fn tree_size(&self) -> usize {
        self.tree_size
    }

    /// IP version of the tree
    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    /// Offset where the data section begins (after the separator)
    pub fn data_section_start(&self) -> usize {
        self.tree_size + DATA_SECTION_SEPARATOR_SIZE
    }

    /// Read one record of a node
    ///
    /// `side` 0 = left record (bit 0), anything else = right record (bit 1)
    pub fn read_node(&self, buffer: &Buffer, node: u32, side: u8) -> Result<u32> {
        if node >= self.node_count {
            return Err(Error::invalid(format!(
                "node index {} exceeds node count {}",
                node, self.node_count
            )));
        }
        let base = node as usize * self.record_size.node_bytes();
        let right = side != 0;

        match self.record_size {
            RecordSize::Bits24 => buffer.read_var_uint(base + if right { 3 } else { 0 }, 3),
            RecordSize::Bits28 => {
                // [left 24 bits][left high nibble | right high nibble][right 24 bits]
                if right {
                    Ok(buffer.read_be_i32(base + 3)? as u32 & 0x0FFF_FFFF)
                } else {
                    let v = buffer.read_be_i32(base)? as u32;
                    Ok(((v & 0xF0) << 20) | (v >> 8))
                }
            }
            RecordSize::Bits32 => {
                Ok(buffer.read_be_i32(base + if right { 4 } else { 0 })? as u32)
            }
        }
    }

    /// Classify a record value
    #[inline]
    pub fn classify(&self, record: u32) -> TreeRecord {
        use std::cmp::Ordering;
        match record.cmp(&self.node_count) {
            Ordering::Less => TreeRecord::Node(record),
            Ordering::Equal => TreeRecord::Empty,
            Ordering::Greater => TreeRecord::Data(record),
        }
    }

    /// Absolute buffer offset of the value a data record points to
    ///
    /// The offset must land inside the data section.
    pub fn resolve_data_pointer(&self, record: u32, buffer_len: usize) -> Result<usize> {
        let resolved = (record as usize)
            .checked_sub(self.node_count as usize)
            .map(|rel| rel + self.tree_size)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "record {} is not a data pointer (node count {})",
                    record, self.node_count
                ))
            })?;
        if resolved >= buffer_len {
            return Err(Error::invalid(
                "the search tree is corrupt: contains a pointer larger than the database",
            ));
        }
        if resolved < self.data_section_start() {
            return Err(Error::invalid(format!(
                "the search tree is corrupt: pointer {} lands in the data section separator",
                record
            )));
        }
        Ok(resolved)
    }

    /// Record reached by following 96 zero bits from the root of an IPv6
    /// tree. Computed once, then cached. For an IPv4 tree this is node 0.
    pub fn ipv4_start(&self, buffer: &Buffer) -> Result<u32> {
        if let Some(&start) = self.ipv4_start.get() {
            return Ok(start);
        }
        let start = match self.ip_version {
            IpVersion::V4 => 0,
            IpVersion::V6 => {
                let mut node = 0u32;
                for _ in 0..IPV4_SUBTREE_DEPTH {
                    if node >= self.node_count {
                        break;
                    }
                    node = self.read_node(buffer, node, 0)?;
                }
                node
            }
        };
        log::debug!("IPv4 start node: {}", start);
        Ok(*self.ipv4_start.get_or_init(|| start))
    }

    /// Look up an address
    ///
    /// Returns `Ok(None)` for an empty branch. The prefix length counts
    /// the bits of the queried address, so an IPv4 address matched in an
    /// IPv6 tree reports at most 32.
    pub fn lookup(&self, buffer: &Buffer, ip: IpAddr) -> Result<Option<TreeHit>> {
        match self.walk(buffer, ip)? {
            (TreeRecord::Data(pointer), prefix_len) => Ok(Some(TreeHit { pointer, prefix_len })),
            _ => Ok(None),
        }
    }

    /// Descend the tree along the bits of `ip`
    ///
    /// Returns the terminal record (never [`TreeRecord::Node`]) and the
    /// number of address bits consumed to reach it, for hits and misses
    /// alike.
    pub fn walk(&self, buffer: &Buffer, ip: IpAddr) -> Result<(TreeRecord, u8)> {
        let (bytes, bit_count, start): ([u8; 16], usize, u32) = match ip {
            IpAddr::V4(v4) => {
                let mut bytes = [0u8; 16];
                bytes[..4].copy_from_slice(&v4.octets());
                (bytes, 32, self.ipv4_start(buffer)?)
            }
            IpAddr::V6(v6) => {
                if self.ip_version == IpVersion::V4 {
                    return Err(Error::InvalidAddress(format!(
                        "cannot look up IPv6 address {} in an IPv4-only database",
                        v6
                    )));
                }
                (v6.octets(), 128, 0)
            }
        };

        let mut record = start;
        let mut depth = 0usize;
        while depth < bit_count && record < self.node_count {
            let bit = (bytes[depth >> 3] >> (7 - (depth % 8))) & 1;
            record = self.read_node(buffer, record, bit)?;
            depth += 1;
        }

        match self.classify(record) {
            TreeRecord::Node(node) => Err(Error::invalid(format!(
                "search tree still at node {} after consuming all {} address bits",
                node, bit_count
            ))),
            terminal => Ok((terminal, depth as u8)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(node_count: u32, record_size: RecordSize, ip_version: IpVersion, len: usize) -> SearchTree {
        SearchTree::new(node_count, record_size, ip_version, len).unwrap()
    }

    #[test]
    fn test_read_24bit_record() {
        // Node 0: left=1, right=2
        let mut data = vec![0u8; 100];
        data[2] = 0x01;
        data[5] = 0x02;
        let buffer = Buffer::from_vec(data);
        let tree = tree(10, RecordSize::Bits24, IpVersion::V6, 100);

        assert_eq!(tree.read_node(&buffer, 0, 0).unwrap(), 1);
        assert_eq!(tree.read_node(&buffer, 0, 1).unwrap(), 2);
    }

    #[test]
    fn test_read_28bit_record() {
        // Left: 0x1000001, Right: 0x2000002
        let mut data = vec![0u8; 100];
        data[2] = 0x01;
        data[3] = 0x12; // middle byte: 0x1 for left high, 0x2 for right high
        data[6] = 0x02;
        let buffer = Buffer::from_vec(data);
        let tree = tree(10, RecordSize::Bits28, IpVersion::V6, 100);

        assert_eq!(tree.read_node(&buffer, 0, 0).unwrap(), 0x1000001);
        assert_eq!(tree.read_node(&buffer, 0, 1).unwrap(), 0x2000002);
    }

    #[test]
    fn test_read_32bit_record() {
        let mut data = vec![0u8; 100];
        data[8..16].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x00, 0x01, 0x00]);
        let buffer = Buffer::from_vec(data);
        let tree = tree(4, RecordSize::Bits32, IpVersion::V4, 100);

        assert_eq!(tree.read_node(&buffer, 1, 0).unwrap(), 0xdeadbeef);
        assert_eq!(tree.read_node(&buffer, 1, 1).unwrap(), 0x100);
        assert!(tree.read_node(&buffer, 4, 0).is_err());
    }

    #[test]
    fn test_resolve_data_pointer() {
        let tree = tree(100, RecordSize::Bits24, IpVersion::V6, 1000);

        // 116 - 100 + 600 = 616 = first byte of the data section
        assert_eq!(tree.resolve_data_pointer(116, 1000).unwrap(), 616);
        assert_eq!(tree.resolve_data_pointer(200, 1000).unwrap(), 700);
        // Inside the separator
        assert!(tree.resolve_data_pointer(105, 1000).is_err());
        // Past the end of the buffer
        assert!(tree.resolve_data_pointer(500, 1000).is_err());
        // Not a data pointer at all
        assert!(tree.resolve_data_pointer(50, 1000).is_err());
    }

    #[test]
    fn test_tree_larger_than_file() {
        assert!(SearchTree::new(100, RecordSize::Bits32, IpVersion::V4, 500).is_err());
        assert!(SearchTree::new(u32::MAX, RecordSize::Bits32, IpVersion::V4, 500).is_err());
    }

    #[test]
    fn test_classify() {
        let tree = tree(10, RecordSize::Bits24, IpVersion::V4, 100);
        assert_eq!(tree.classify(3), TreeRecord::Node(3));
        assert_eq!(tree.classify(10), TreeRecord::Empty);
        assert_eq!(tree.classify(42), TreeRecord::Data(42));
    }

    #[test]
    fn test_single_node_v4_lookup() {
        // One node: left branch -> data, right branch -> empty
        // node_count = 1, data record = 1 + 16 = 17 (first data byte)
        let mut data = vec![0u8; 6 + 16 + 1];
        data[2] = 17;
        data[5] = 1;
        let buffer = Buffer::from_vec(data);
        let tree = tree(1, RecordSize::Bits24, IpVersion::V4, buffer.len());

        let hit = tree.lookup(&buffer, "1.2.3.4".parse().unwrap()).unwrap().unwrap();
        assert_eq!(hit, TreeHit { pointer: 17, prefix_len: 1 });
        assert_eq!(tree.resolve_data_pointer(hit.pointer, buffer.len()).unwrap(), 22);

        assert!(tree.lookup(&buffer, "200.0.0.1".parse().unwrap()).unwrap().is_none());
        assert!(matches!(
            tree.lookup(&buffer, "::1".parse().unwrap()),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_exhausted_bits_is_corruption() {
        // A v4 tree whose node 0 points to itself forever
        let data = vec![0u8; 6 + 16];
        let buffer = Buffer::from_vec(data);
        let tree = tree(1, RecordSize::Bits24, IpVersion::V4, buffer.len());

        let err = tree.lookup(&buffer, "1.2.3.4".parse().unwrap()).unwrap_err();
        assert!(err.is_invalid_database());
    }
}

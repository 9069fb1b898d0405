//! Read-only Berkeley DB B-tree reader.
//!
//! Bitcoin Core stores legacy wallets as a Berkeley DB file holding several
//! named subdatabases. Wallet records live in the one named `main`. This
//! module reads that layout directly from the file image without linking
//! libdb.
//!
//! ## Layout
//!
//! - Page 0 is the metadata page of the master database. Its root page
//!   indexes subdatabase names to the page number of their own metadata page
//!   (stored big-endian regardless of file byte order).
//! - Internal pages (type 3) hold `(len, type, pgno, nrecs, key)` items whose
//!   `pgno` points at the child page.
//! - Leaf pages (type 5) hold alternating key and value items. Small items are
//!   stored inline; large ones point at a chain of overflow pages (type 7).
//!
//! Built-in BDB encryption and page checksums are not supported.

use super::{Backend, KvSource, RawRecord};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, trace};

/// Magic number of a B-tree metadata page
const BTREE_MAGIC: u32 = 0x0005_3162;

const MIN_PAGE_SIZE: usize = 512;
const MAX_PAGE_SIZE: usize = 65_536;

/// Size of the generic page header preceding the item index
const PAGE_HEADER_LEN: usize = 26;

const PAGE_INTERNAL: u8 = 3;
const PAGE_LEAF: u8 = 5;
const PAGE_OVERFLOW: u8 = 7;
const PAGE_BTREE_META: u8 = 9;

const ITEM_KEYDATA: u8 = 1;
const ITEM_DUPLICATE: u8 = 2;
const ITEM_OVERFLOW: u8 = 3;
const ITEM_DELETED: u8 = 0x80;

/// Metadata flag: the file contains named subdatabases
const META_FLAG_SUBDB: u32 = 0x20;
/// Metadata-only flag: pages carry checksums
const META_CHECKSUM: u8 = 0x01;

/// Subdatabase holding wallet records
const MAIN_DATABASE: &[u8] = b"main";

/// Upper bound on a reassembled overflow item
const MAX_OVERFLOW_LEN: usize = 64 * 1024 * 1024;

/// Deepest B-tree the walker will descend
const MAX_DEPTH: usize = 32;

/// Fields of a B-tree metadata page
#[derive(Debug, Clone, Copy)]
struct MetaPage {
    flags: u32,
    root: u32,
}

/// Fields of the generic page header
#[derive(Debug, Clone, Copy)]
struct PageHeader {
    next_pgno: u32,
    entries: u16,
    hf_offset: u16,
    kind: u8,
}

/// A decoded leaf item
#[derive(Debug)]
struct Item {
    deleted: bool,
    data: Bytes,
}

/// The whole database file, addressed by page number
#[derive(Debug, Clone)]
struct PageFile {
    image: Bytes,
    page_size: usize,
    big_endian: bool,
}

impl PageFile {
    fn parse(image: Bytes) -> Result<Self> {
        if image.len() < MIN_PAGE_SIZE {
            return Err(Error::invalid_format(
                0,
                format!("file too small for a Berkeley DB ({} bytes)", image.len()),
            ));
        }

        let magic = ByteCursor::at(&image, 12)?.read_u32_le()?;
        let big_endian = if magic == BTREE_MAGIC {
            false
        } else if magic.swap_bytes() == BTREE_MAGIC {
            true
        } else {
            return Err(Error::invalid_format(
                12,
                format!("not a B-tree database (magic {magic:#010x})"),
            ));
        };

        let mut file = Self {
            image,
            page_size: MIN_PAGE_SIZE,
            big_endian,
        };

        let page_size = file.u32_at(&file.image, 20)? as usize;
        if !page_size.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::invalid_format(
                20,
                format!("invalid page size {page_size}"),
            ));
        }
        if file.image[24] != 0 {
            return Err(Error::invalid_format(
                24,
                "built-in Berkeley DB encryption is not supported",
            ));
        }
        if file.image[26] & META_CHECKSUM != 0 {
            return Err(Error::invalid_format(26, "page checksums are not supported"));
        }

        file.page_size = page_size;
        Ok(file)
    }

    fn u16_at(&self, buf: &[u8], offset: usize) -> Result<u16> {
        let mut cursor = ByteCursor::at(buf, offset)?;
        if self.big_endian {
            cursor.read_u16_be()
        } else {
            cursor.read_u16_le()
        }
    }

    fn u32_at(&self, buf: &[u8], offset: usize) -> Result<u32> {
        let mut cursor = ByteCursor::at(buf, offset)?;
        if self.big_endian {
            cursor.read_u32_be()
        } else {
            cursor.read_u32_le()
        }
    }

    fn page_start(&self, pgno: u32) -> usize {
        pgno as usize * self.page_size
    }

    fn page(&self, pgno: u32) -> Result<&[u8]> {
        let start = self.page_start(pgno);
        let end = start + self.page_size;
        if end > self.image.len() {
            return Err(Error::invalid_format(
                start,
                format!("page {pgno} lies beyond end of file"),
            ));
        }
        Ok(&self.image[start..end])
    }

    fn header(&self, page: &[u8]) -> Result<PageHeader> {
        Ok(PageHeader {
            next_pgno: self.u32_at(page, 16)?,
            entries: self.u16_at(page, 20)?,
            hf_offset: self.u16_at(page, 22)?,
            kind: page[25],
        })
    }

    fn meta(&self, pgno: u32) -> Result<MetaPage> {
        let page = self.page(pgno)?;
        let magic = self.u32_at(page, 12)?;
        if page[25] != PAGE_BTREE_META || magic != BTREE_MAGIC {
            return Err(Error::invalid_format(
                self.page_start(pgno),
                format!("page {pgno} is not a B-tree metadata page"),
            ));
        }
        Ok(MetaPage {
            flags: self.u32_at(page, 48)?,
            root: self.u32_at(page, 88)?,
        })
    }

    fn item_offset(&self, page: &[u8], index: usize) -> Result<usize> {
        let offset = self.u16_at(page, PAGE_HEADER_LEN + 2 * index)? as usize;
        if offset < PAGE_HEADER_LEN || offset >= page.len() {
            return Err(Error::invalid_format(
                offset,
                format!("item {index} offset outside page"),
            ));
        }
        Ok(offset)
    }

    fn internal_child(&self, page: &[u8], index: usize) -> Result<u32> {
        let offset = self.item_offset(page, index)?;
        self.u32_at(page, offset + 4)
    }

    fn read_item(&self, pgno: u32, page: &[u8], index: usize) -> Result<Item> {
        let offset = self.item_offset(page, index)?;
        let kind = *page
            .get(offset + 2)
            .ok_or_else(|| Error::invalid_format(offset, "truncated item header"))?;
        let deleted = kind & ITEM_DELETED != 0;

        match kind & !ITEM_DELETED {
            ITEM_KEYDATA => {
                let len = self.u16_at(page, offset)? as usize;
                let start = offset + 3;
                let end = start + len;
                if end > page.len() {
                    return Err(Error::invalid_format(
                        offset,
                        format!("item of {len} bytes overruns page {pgno}"),
                    ));
                }
                let base = self.page_start(pgno);
                Ok(Item {
                    deleted,
                    data: self.image.slice(base + start..base + end),
                })
            }
            ITEM_OVERFLOW => {
                let first = self.u32_at(page, offset + 4)?;
                let total = self.u32_at(page, offset + 8)? as usize;
                Ok(Item {
                    deleted,
                    data: Bytes::from(self.read_overflow(first, total)?),
                })
            }
            ITEM_DUPLICATE => Err(Error::invalid_format(
                offset,
                "duplicate-key items are not supported",
            )),
            other => Err(Error::invalid_format(
                offset,
                format!("unknown item type {other}"),
            )),
        }
    }

    fn read_overflow(&self, first: u32, total: usize) -> Result<Vec<u8>> {
        if total > MAX_OVERFLOW_LEN {
            return Err(Error::invalid_format(
                self.page_start(first),
                format!("overflow item of {total} bytes exceeds limit"),
            ));
        }

        let mut data = Vec::with_capacity(total);
        let mut seen = HashSet::new();
        let mut pgno = first;

        while data.len() < total {
            if pgno == 0 || !seen.insert(pgno) {
                return Err(Error::invalid_format(
                    self.page_start(first),
                    format!("broken overflow chain at page {pgno}"),
                ));
            }
            let page = self.page(pgno)?;
            let header = self.header(page)?;
            if header.kind != PAGE_OVERFLOW {
                return Err(Error::invalid_format(
                    self.page_start(pgno),
                    format!("page {pgno} is not an overflow page"),
                ));
            }
            let end = PAGE_HEADER_LEN + header.hf_offset as usize;
            if end > page.len() {
                return Err(Error::invalid_format(
                    self.page_start(pgno),
                    "overflow chunk overruns page",
                ));
            }
            data.extend_from_slice(&page[PAGE_HEADER_LEN..end]);
            pgno = header.next_pgno;
        }

        if data.len() != total {
            return Err(Error::invalid_format(
                self.page_start(first),
                format!("overflow chain holds {} bytes, expected {total}", data.len()),
            ));
        }
        Ok(data)
    }

    /// Resolve a subdatabase name to its metadata page number
    fn find_subdatabase(&self, root: u32, name: &[u8]) -> Result<u32> {
        let mut walker = TreeWalker::new(root);
        while let Some((key, value)) = walker.next(self)? {
            if key.as_ref() == name {
                if value.len() != 4 {
                    return Err(Error::invalid_format(
                        0,
                        format!("subdatabase entry has {} bytes, expected 4", value.len()),
                    ));
                }
                return ByteCursor::new(&value).read_u32_be();
            }
        }
        Err(Error::invalid_format(
            0,
            format!(
                "subdatabase '{}' not found",
                String::from_utf8_lossy(name)
            ),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    pgno: u32,
    index: usize,
}

/// Depth-first, in-order walk over the leaves of one B-tree
#[derive(Debug, Default)]
struct TreeWalker {
    stack: Vec<Frame>,
    visited: HashSet<u32>,
}

impl TreeWalker {
    fn new(root: u32) -> Self {
        let mut walker = Self::default();
        walker.visited.insert(root);
        walker.stack.push(Frame {
            pgno: root,
            index: 0,
        });
        walker
    }

    fn advance(&mut self, by: usize) {
        if let Some(frame) = self.stack.last_mut() {
            frame.index += by;
        }
    }

    fn descend(&mut self, pgno: u32) -> Result<()> {
        if !self.visited.insert(pgno) {
            return Err(Error::invalid_format(
                0,
                format!("page {pgno} referenced twice in B-tree"),
            ));
        }
        if self.stack.len() >= MAX_DEPTH {
            return Err(Error::invalid_format(0, "B-tree too deep"));
        }
        self.stack.push(Frame { pgno, index: 0 });
        Ok(())
    }

    fn next(&mut self, file: &PageFile) -> Result<Option<(Bytes, Bytes)>> {
        loop {
            let Some(&Frame { pgno, index }) = self.stack.last() else {
                return Ok(None);
            };

            let page = file.page(pgno)?;
            let header = file.header(page)?;
            let entries = header.entries as usize;
            if index >= entries {
                self.stack.pop();
                continue;
            }

            match header.kind {
                PAGE_INTERNAL => {
                    let child = file.internal_child(page, index)?;
                    self.advance(1);
                    self.descend(child)?;
                }
                PAGE_LEAF => {
                    if index + 1 >= entries {
                        return Err(Error::invalid_format(
                            file.page_start(pgno),
                            format!("leaf page {pgno} has an unpaired key"),
                        ));
                    }
                    let key = file.read_item(pgno, page, index)?;
                    let value = file.read_item(pgno, page, index + 1)?;
                    self.advance(2);
                    if key.deleted || value.deleted {
                        trace!("Skipping deleted item {} on page {}", index, pgno);
                        continue;
                    }
                    return Ok(Some((key.data, value.data)));
                }
                other => {
                    return Err(Error::invalid_format(
                        file.page_start(pgno),
                        format!("unexpected page type {other} for page {pgno}"),
                    ));
                }
            }
        }
    }
}

/// Key/value source over the `main` database of a Berkeley DB wallet
#[derive(Debug)]
pub struct BerkeleySource {
    file: PageFile,
    walker: TreeWalker,
}

impl BerkeleySource {
    /// Read and validate a Berkeley DB file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_bytes(image)
    }

    /// Validate an in-memory Berkeley DB image
    pub fn from_bytes(image: impl Into<Bytes>) -> Result<Self> {
        let file = PageFile::parse(image.into())?;

        let outer = file.meta(0)?;
        if outer.flags & META_FLAG_SUBDB == 0 {
            return Err(Error::invalid_format(48, "database has no named subdatabases"));
        }
        let main_meta = file.find_subdatabase(outer.root, MAIN_DATABASE)?;
        let main = file.meta(main_meta)?;

        debug!(
            "Berkeley DB: page size {}, {}, main root page {}",
            file.page_size,
            if file.big_endian { "big-endian" } else { "little-endian" },
            main.root
        );

        Ok(Self {
            walker: TreeWalker::new(main.root),
            file,
        })
    }
}

impl KvSource for BerkeleySource {
    fn backend(&self) -> Backend {
        Backend::BerkeleyDb
    }

    fn next_pair(&mut self) -> Result<Option<RawRecord>> {
        Ok(self
            .walker
            .next(&self.file)?
            .map(|(key, value)| RawRecord { key, value }))
    }
}

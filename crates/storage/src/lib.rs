//! Simulated rotating-platter disk.
//!
//! A `Disk` materializes fixed-size logical blocks over a tree of per-sector
//! files on the host filesystem, and owns the allocation bitmap and the
//! logical-to-physical map that the rest of the engine is built on.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use common::{BlockStatus, Config, DbError, DbResult, LogicalPageId, PageType, PhysicalAddress};

#[cfg(test)]
mod tests;

/// Fixed-size prefix of the disk-metadata page: `name[256]` followed by
/// seven `u32` fields (geometry, block/sector size, next page id).
const NAME_FIELD_LEN: usize = 256;
const METADATA_HEADER_LEN: usize = NAME_FIELD_LEN + 4 * 7;

/// A simulated disk rooted at `<disks_root>/<disk_name>/`.
///
/// Geometry and block size are fixed at creation. Every mutation of the
/// allocation map (`allocate`, `deallocate`, `update_status`) persists the
/// whole metadata page before returning, matching the write-through
/// behavior of `SaveDiskMetadata` in the source this is grounded on.
#[derive(Debug)]
pub struct Disk {
    root: PathBuf,
    name: String,
    num_platters: u32,
    num_surfaces_per_platter: u32,
    num_cylinders: u32,
    num_sectors_per_track: u32,
    block_size: u32,
    sector_size: u32,
    next_logical_page_id: u32,
    /// One entry per logical block, indexed in allocation order: outer loop
    /// over cylinders, then combined platter/surface, then block offset
    /// within the track. This is the same order `find_block` scans in and
    /// the order the bitmap is serialized in.
    block_status: Vec<BlockStatus>,
    logical_to_physical: std::collections::HashMap<LogicalPageId, PhysicalAddress>,
}

impl Disk {
    /// Sectors spanned by one block.
    pub fn sectors_per_block(&self) -> u32 {
        self.block_size / self.sector_size
    }

    fn combined_surfaces(&self) -> u32 {
        self.num_platters * self.num_surfaces_per_platter
    }

    fn blocks_per_track(&self) -> u32 {
        self.num_sectors_per_track / self.sectors_per_block()
    }

    fn disk_dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    fn sector_path(&self, addr: PhysicalAddress) -> PathBuf {
        self.disk_dir()
            .join("body")
            .join(format!("Platter_{}", addr.platter))
            .join(format!("Surface_{}", addr.surface))
            .join(format!("Track_{}", addr.cylinder))
            .join(format!("Sector_{}.bin", addr.sector))
    }

    /// `(cylinder, platter/surface index, block offset within the track)` for
    /// an address that is known to be a block start.
    fn block_coords(&self, addr: PhysicalAddress) -> (u32, u32, u32) {
        let ps_idx = addr.platter * self.num_surfaces_per_platter + addr.surface;
        (addr.cylinder, ps_idx, addr.sector / self.sectors_per_block())
    }

    fn block_status_index(&self, cylinder: u32, ps_idx: u32, block_idx: u32) -> usize {
        ((cylinder * self.combined_surfaces() + ps_idx) * self.blocks_per_track() + block_idx)
            as usize
    }

    fn address_for(&self, cylinder: u32, ps_idx: u32, block_idx: u32) -> PhysicalAddress {
        PhysicalAddress::new(
            ps_idx / self.num_surfaces_per_platter,
            ps_idx % self.num_surfaces_per_platter,
            cylinder,
            block_idx * self.sectors_per_block(),
        )
    }

    fn metadata_address() -> PhysicalAddress {
        PhysicalAddress::new(0, 0, 0, 0)
    }

    /// Creates a disk with the given geometry, wiping any prior disk of the
    /// same name in `root`.
    ///
    /// The source this is grounded on ("El disco ya existe. Eliminando
    /// contenido existente...") treats re-creating a disk as destructive;
    /// the rewrite keeps that behavior rather than failing, but documents
    /// it here instead of leaving it an implicit side effect.
    pub fn create(root: impl AsRef<Path>, name: &str, config: &Config) -> DbResult<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        let disk_dir = root.join(name);
        if disk_dir.exists() {
            fs::remove_dir_all(&disk_dir)?;
        }

        let mut disk = Disk {
            root,
            name: name.to_string(),
            num_platters: config.num_platters,
            num_surfaces_per_platter: config.num_surfaces_per_platter,
            num_cylinders: config.num_cylinders,
            num_sectors_per_track: config.num_sectors_per_track,
            block_size: config.block_size,
            sector_size: config.sector_size,
            next_logical_page_id: 1,
            block_status: Vec::new(),
            logical_to_physical: std::collections::HashMap::new(),
        };

        let total_blocks =
            (disk.num_cylinders * disk.combined_surfaces() * disk.blocks_per_track()) as usize;
        disk.block_status = vec![BlockStatus::Empty; total_blocks];

        disk.create_sector_files()?;

        let metadata_idx = disk.block_status_index(0, 0, 0);
        disk.block_status[metadata_idx] = BlockStatus::Full;
        disk.logical_to_physical
            .insert(LogicalPageId::METADATA, Self::metadata_address());

        disk.save_metadata()?;
        Ok(disk)
    }

    fn create_sector_files(&self) -> DbResult<()> {
        let zero_sector = vec![0u8; self.sector_size as usize];
        for platter in 0..self.num_platters {
            for surface in 0..self.num_surfaces_per_platter {
                for cylinder in 0..self.num_cylinders {
                    let track_dir = self
                        .disk_dir()
                        .join("body")
                        .join(format!("Platter_{platter}"))
                        .join(format!("Surface_{surface}"))
                        .join(format!("Track_{cylinder}"));
                    fs::create_dir_all(&track_dir)?;
                    for sector in 0..self.num_sectors_per_track {
                        let path = track_dir.join(format!("Sector_{sector}.bin"));
                        fs::write(&path, &zero_sector)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-opens a previously created disk. `config` must describe the same
    /// geometry it was created with; the stored metadata page is read back
    /// and used to rebuild the allocation map and the id counter.
    pub fn open(root: impl AsRef<Path>, name: &str, config: &Config) -> DbResult<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        if !root.join(name).exists() {
            return Err(DbError::NotFound(format!("disk {name}")));
        }

        let mut disk = Disk {
            root,
            name: name.to_string(),
            num_platters: config.num_platters,
            num_surfaces_per_platter: config.num_surfaces_per_platter,
            num_cylinders: config.num_cylinders,
            num_sectors_per_track: config.num_sectors_per_track,
            block_size: config.block_size,
            sector_size: config.sector_size,
            next_logical_page_id: 1,
            block_status: Vec::new(),
            logical_to_physical: std::collections::HashMap::new(),
        };
        disk.load_metadata()?;
        Ok(disk)
    }

    fn read_sector(&self, addr: PhysicalAddress) -> DbResult<Vec<u8>> {
        let path = self.sector_path(addr);
        let mut file = fs::File::open(&path)?;
        let mut buf = vec![0u8; self.sector_size as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_sector(&self, addr: PhysicalAddress, data: &[u8]) -> DbResult<()> {
        let path = self.sector_path(addr);
        let mut file = fs::OpenOptions::new().write(true).open(&path)?;
        file.write_all(data)?;
        Ok(())
    }

    fn address_of(&self, page_id: LogicalPageId) -> DbResult<PhysicalAddress> {
        self.logical_to_physical
            .get(&page_id)
            .copied()
            .ok_or_else(|| DbError::NotFound(format!("page {page_id:?}")))
    }

    /// Reads the `block_size` bytes of `page_id` via `sectors_per_block`
    /// sequential sector reads. A short sector read is a hard `IO_ERROR`,
    /// surfaced unchanged by `read_exact`.
    pub fn read_block(&self, page_id: LogicalPageId) -> DbResult<Vec<u8>> {
        let addr = self.address_of(page_id)?;
        let mut buf = Vec::with_capacity(self.block_size as usize);
        for i in 0..self.sectors_per_block() {
            let sector_addr = PhysicalAddress::new(addr.platter, addr.surface, addr.cylinder, addr.sector + i);
            buf.extend_from_slice(&self.read_sector(sector_addr)?);
        }
        Ok(buf)
    }

    /// Writes `data` (exactly `block_size` bytes) via `sectors_per_block`
    /// sequential sector writes.
    pub fn write_block(&self, page_id: LogicalPageId, data: &[u8]) -> DbResult<()> {
        if data.len() != self.block_size as usize {
            return Err(DbError::InvalidParameter(format!(
                "block payload must be exactly {} bytes, got {}",
                self.block_size,
                data.len()
            )));
        }
        let addr = self.address_of(page_id)?;
        let sector_size = self.sector_size as usize;
        for i in 0..self.sectors_per_block() {
            let sector_addr = PhysicalAddress::new(addr.platter, addr.surface, addr.cylinder, addr.sector + i);
            let chunk = &data[(i as usize) * sector_size..(i as usize + 1) * sector_size];
            self.write_sector(sector_addr, chunk)?;
        }
        Ok(())
    }

    /// Scans for a free block to host a page of the given type: for a
    /// `DATA` hint, an `INCOMPLETE` block in the data-preferred range wins
    /// first (without changing its status); otherwise an `EMPTY` block in
    /// the hinted type's preferred range; otherwise any `EMPTY` block on
    /// the disk.
    pub fn allocate(&mut self, hint: PageType) -> DbResult<(LogicalPageId, PhysicalAddress)> {
        let track_len = self.num_sectors_per_track;
        let sectors_needed = self.sectors_per_block();

        let mut catalog_end = track_len / 10;
        if catalog_end < sectors_needed {
            catalog_end = sectors_needed;
        }
        catalog_end = catalog_end.min(track_len);

        let index_start = catalog_end;
        let mut index_end = catalog_end + track_len / 5;
        if index_end < sectors_needed {
            index_end = sectors_needed;
        }
        index_end = index_end.min(track_len);

        let data_start = index_end;
        let data_end = track_len;

        let mut found = None;
        if hint == PageType::Data {
            found = self.find_block(data_start, data_end, true);
        }
        if found.is_none() {
            found = match hint {
                PageType::Catalog => self.find_block(0, catalog_end, false),
                PageType::Index => self.find_block(index_start, index_end, false),
                PageType::Data => self.find_block(data_start, data_end, false),
            };
        }
        if found.is_none() {
            found = self.find_block(0, track_len, false);
        }

        let (address, status_idx) = found.ok_or(DbError::DiskFull)?;
        if self.block_status[status_idx] != BlockStatus::Incomplete {
            self.block_status[status_idx] = BlockStatus::Incomplete;
        }

        let page_id = LogicalPageId(self.next_logical_page_id);
        self.next_logical_page_id += 1;
        self.logical_to_physical.insert(page_id, address);
        self.save_metadata()?;
        Ok((page_id, address))
    }

    /// One candidate block start per `sectors_per_block` stride within
    /// `[range_start, range_end)` of every track — this, not any runtime
    /// check, is what keeps a block from crossing a track boundary.
    fn find_block(
        &self,
        range_start: u32,
        range_end: u32,
        prioritize_incomplete: bool,
    ) -> Option<(PhysicalAddress, usize)> {
        let sectors_per_block = self.sectors_per_block();
        let candidate = |want: BlockStatus| {
            for cylinder in 0..self.num_cylinders {
                for ps_idx in 0..self.combined_surfaces() {
                    for block_idx in 0..self.blocks_per_track() {
                        let sector_start = block_idx * sectors_per_block;
                        if sector_start < range_start || sector_start + sectors_per_block > range_end
                        {
                            continue;
                        }
                        let idx = self.block_status_index(cylinder, ps_idx, block_idx);
                        if self.block_status[idx] == want {
                            return Some((self.address_for(cylinder, ps_idx, block_idx), idx));
                        }
                    }
                }
            }
            None
        };

        if prioritize_incomplete {
            if let Some(found) = candidate(BlockStatus::Incomplete) {
                return Some(found);
            }
        }
        candidate(BlockStatus::Empty)
    }

    /// Marks `page_id`'s block `EMPTY` and drops the mapping. Forbidden for
    /// the metadata page.
    pub fn deallocate(&mut self, page_id: LogicalPageId) -> DbResult<()> {
        if page_id.is_metadata() {
            return Err(DbError::InvalidParameter(
                "the disk-metadata page cannot be deallocated".into(),
            ));
        }
        let addr = self
            .logical_to_physical
            .remove(&page_id)
            .ok_or_else(|| DbError::NotFound(format!("page {page_id:?}")))?;
        let (cylinder, ps_idx, block_idx) = self.block_coords(addr);
        let idx = self.block_status_index(cylinder, ps_idx, block_idx);
        self.block_status[idx] = BlockStatus::Empty;
        self.save_metadata()
    }

    /// Changes only the bitmap entry for `page_id`. Forbidden for the
    /// metadata page. This is how the Record Manager announces
    /// INCOMPLETE/FULL/EMPTY transitions to the allocator.
    pub fn update_status(&mut self, page_id: LogicalPageId, status: BlockStatus) -> DbResult<()> {
        if page_id.is_metadata() {
            return Err(DbError::InvalidParameter(
                "the disk-metadata page's status is implicit".into(),
            ));
        }
        let addr = self.address_of(page_id)?;
        let (cylinder, ps_idx, block_idx) = self.block_coords(addr);
        let idx = self.block_status_index(cylinder, ps_idx, block_idx);
        self.block_status[idx] = status;
        self.save_metadata()
    }

    pub fn next_logical_page_id(&self) -> u32 {
        self.next_logical_page_id
    }

    pub fn status_of(&self, page_id: LogicalPageId) -> DbResult<BlockStatus> {
        let addr = self.address_of(page_id)?;
        let (cylinder, ps_idx, block_idx) = self.block_coords(addr);
        Ok(self.block_status[self.block_status_index(cylinder, ps_idx, block_idx)])
    }

    fn total_blocks(&self) -> usize {
        self.block_status.len()
    }

    /// Serializes and writes the disk-metadata page: the fixed header,
    /// the packed 2-bit-per-block bitmap, then the logical->physical map,
    /// in that exact byte order.
    fn save_metadata(&self) -> DbResult<()> {
        let mut buf = vec![0u8; self.block_size as usize];
        let mut offset = 0usize;

        let name_bytes = self.name.as_bytes();
        let copy_len = name_bytes.len().min(NAME_FIELD_LEN);
        buf[offset..offset + copy_len].copy_from_slice(&name_bytes[..copy_len]);
        offset += NAME_FIELD_LEN;

        for field in [
            self.num_platters,
            self.num_surfaces_per_platter,
            self.num_cylinders,
            self.num_sectors_per_track,
            self.block_size,
            self.sector_size,
            self.next_logical_page_id,
        ] {
            buf[offset..offset + 4].copy_from_slice(&field.to_le_bytes());
            offset += 4;
        }
        debug_assert_eq!(offset, METADATA_HEADER_LEN);

        let bitmap_len = self.total_blocks().div_ceil(4);
        if offset + bitmap_len > buf.len() {
            return Err(DbError::OutOfMemory);
        }
        for (i, status) in self.block_status.iter().enumerate() {
            let byte_idx = offset + i / 4;
            let shift = (i % 4) * 2;
            buf[byte_idx] |= status.to_bits() << shift;
        }
        offset += bitmap_len;

        let entry_count = self.logical_to_physical.len() as u32;
        let map_len = 4 + entry_count as usize * (4 + 4 * 4);
        if offset + map_len > buf.len() {
            return Err(DbError::OutOfMemory);
        }
        buf[offset..offset + 4].copy_from_slice(&entry_count.to_le_bytes());
        offset += 4;

        let mut entries: Vec<_> = self.logical_to_physical.iter().collect();
        entries.sort_by_key(|(id, _)| id.0);
        for (page_id, addr) in entries {
            buf[offset..offset + 4].copy_from_slice(&page_id.0.to_le_bytes());
            offset += 4;
            for field in [addr.platter, addr.surface, addr.cylinder, addr.sector] {
                buf[offset..offset + 4].copy_from_slice(&field.to_le_bytes());
                offset += 4;
            }
        }

        self.write_metadata_block(&buf)
    }

    fn write_metadata_block(&self, buf: &[u8]) -> DbResult<()> {
        let addr = Self::metadata_address();
        let sector_size = self.sector_size as usize;
        for i in 0..self.sectors_per_block() {
            let sector_addr =
                PhysicalAddress::new(addr.platter, addr.surface, addr.cylinder, addr.sector + i);
            let chunk = &buf[(i as usize) * sector_size..(i as usize + 1) * sector_size];
            self.write_sector(sector_addr, chunk)?;
        }
        Ok(())
    }

    fn read_metadata_block(&self) -> DbResult<Vec<u8>> {
        let addr = Self::metadata_address();
        let mut buf = Vec::with_capacity(self.block_size as usize);
        for i in 0..self.sectors_per_block() {
            let sector_addr =
                PhysicalAddress::new(addr.platter, addr.surface, addr.cylinder, addr.sector + i);
            buf.extend_from_slice(&self.read_sector(sector_addr)?);
        }
        Ok(buf)
    }

    fn load_metadata(&mut self) -> DbResult<()> {
        let buf = self.read_metadata_block()?;
        let mut offset = NAME_FIELD_LEN;

        let mut read_u32 = |buf: &[u8], offset: &mut usize| -> u32 {
            let v = u32::from_le_bytes(buf[*offset..*offset + 4].try_into().unwrap());
            *offset += 4;
            v
        };

        self.num_platters = read_u32(&buf, &mut offset);
        self.num_surfaces_per_platter = read_u32(&buf, &mut offset);
        self.num_cylinders = read_u32(&buf, &mut offset);
        self.num_sectors_per_track = read_u32(&buf, &mut offset);
        self.block_size = read_u32(&buf, &mut offset);
        self.sector_size = read_u32(&buf, &mut offset);
        self.next_logical_page_id = read_u32(&buf, &mut offset);
        debug_assert_eq!(offset, METADATA_HEADER_LEN);

        let total_blocks =
            (self.num_cylinders * self.combined_surfaces() * self.blocks_per_track()) as usize;
        let bitmap_len = total_blocks.div_ceil(4);
        let mut block_status = Vec::with_capacity(total_blocks);
        for i in 0..total_blocks {
            let byte = buf[offset + i / 4];
            let shift = (i % 4) * 2;
            let bits = (byte >> shift) & 0b11;
            block_status.push(BlockStatus::from_bits(bits).map_err(|_| {
                DbError::Io(std::io::Error::other("corrupt disk-metadata bitmap"))
            })?);
        }
        offset += bitmap_len;
        self.block_status = block_status;

        let entry_count = read_u32(&buf, &mut offset);
        let mut map = std::collections::HashMap::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let page_id = LogicalPageId(read_u32(&buf, &mut offset));
            let platter = read_u32(&buf, &mut offset);
            let surface = read_u32(&buf, &mut offset);
            let cylinder = read_u32(&buf, &mut offset);
            let sector = read_u32(&buf, &mut offset);
            map.insert(page_id, PhysicalAddress::new(platter, surface, cylinder, sector));
        }
        self.logical_to_physical = map;
        Ok(())
    }
}

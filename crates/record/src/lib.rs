//! Slotted-page record manager.
//!
//! Every data page starts with a fixed [`BlockHeader`], followed by a slot
//! directory that grows toward the end of the block, while record bytes are
//! appended from the block's high end downward. The manager never
//! compacts a page and never shrinks `num_slots`, so a slot id stays valid
//! for the lifetime of the page once assigned.
//!
//! Every operation here just borrows a [`BufferPool`] for the call rather
//! than holding one for its whole lifetime, so there's no constructor-order
//! dependency on a catalog to route around.

use buffer::BufferPool;
use common::{BlockStatus, DbError, DbResult, LogicalPageId, PageType};

#[cfg(test)]
mod tests;

/// Size in bytes of the fixed portion of every page's header.
const HEADER_SIZE: usize = 4 + 1 + 4 + 4 + 4;
/// Size in bytes of one slot directory entry.
const SLOT_ENTRY_SIZE: usize = 4 + 4 + 1;

fn page_type_to_byte(page_type: PageType) -> u8 {
    match page_type {
        PageType::Data => 0,
        PageType::Catalog => 1,
        PageType::Index => 2,
    }
}

fn page_type_from_byte(byte: u8) -> DbResult<PageType> {
    match byte {
        0 => Ok(PageType::Data),
        1 => Ok(PageType::Catalog),
        2 => Ok(PageType::Index),
        _ => Err(DbError::InvalidPageType),
    }
}

/// The general header common to every page type, overlaid at the start of
/// each block.
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    page_id: u32,
    page_type: u8,
    num_slots: u32,
    header_and_slot_directory_size: u32,
    data_end_offset: u32,
}

fn read_block_header(page_data: &[u8]) -> BlockHeader {
    let mut offset = 0;
    let mut next_u32 = |len: usize| -> u32 {
        let v = u32::from_le_bytes(page_data[offset..offset + 4].try_into().unwrap());
        offset += len;
        v
    };
    let page_id = next_u32(4);
    let page_type = page_data[offset];
    offset += 1;
    let num_slots = next_u32(4);
    let header_and_slot_directory_size = next_u32(4);
    let data_end_offset = next_u32(4);
    BlockHeader {
        page_id,
        page_type,
        num_slots,
        header_and_slot_directory_size,
        data_end_offset,
    }
}

fn write_block_header(page_data: &mut [u8], header: &BlockHeader) {
    let mut offset = 0;
    page_data[offset..offset + 4].copy_from_slice(&header.page_id.to_le_bytes());
    offset += 4;
    page_data[offset] = header.page_type;
    offset += 1;
    page_data[offset..offset + 4].copy_from_slice(&header.num_slots.to_le_bytes());
    offset += 4;
    page_data[offset..offset + 4]
        .copy_from_slice(&header.header_and_slot_directory_size.to_le_bytes());
    offset += 4;
    page_data[offset..offset + 4].copy_from_slice(&header.data_end_offset.to_le_bytes());
}

/// One directory entry: where a record lives in the block and how long it is.
#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    offset: u32,
    length: u32,
    occupied: bool,
}

fn slot_directory_start_offset() -> usize {
    HEADER_SIZE
}

fn slot_entry_offset(slot_id: u32) -> usize {
    slot_directory_start_offset() + slot_id as usize * SLOT_ENTRY_SIZE
}

fn read_slot_entry(page_data: &[u8], slot_id: u32) -> SlotEntry {
    let base = slot_entry_offset(slot_id);
    let offset = u32::from_le_bytes(page_data[base..base + 4].try_into().unwrap());
    let length = u32::from_le_bytes(page_data[base + 4..base + 8].try_into().unwrap());
    let occupied = page_data[base + 8] != 0;
    SlotEntry {
        offset,
        length,
        occupied,
    }
}

fn write_slot_entry(page_data: &mut [u8], slot_id: u32, entry: &SlotEntry) {
    let base = slot_entry_offset(slot_id);
    page_data[base..base + 4].copy_from_slice(&entry.offset.to_le_bytes());
    page_data[base + 4..base + 8].copy_from_slice(&entry.length.to_le_bytes());
    page_data[base + 8] = entry.occupied as u8;
}

/// Free bytes between the end of the slot directory and the start of
/// record storage. Zero once a page is full.
fn calculate_free_space(header: &BlockHeader) -> u32 {
    let slot_directory_end =
        slot_directory_start_offset() as u32 + header.num_slots * SLOT_ENTRY_SIZE as u32;
    header.data_end_offset - slot_directory_end
}

fn require_data_page(header: &BlockHeader) -> DbResult<()> {
    if header.page_type != page_type_to_byte(PageType::Data) {
        return Err(DbError::InvalidPageType);
    }
    Ok(())
}

/// Writes a fresh [`BlockHeader`] (zero slots, empty record area) into
/// `page_id` and zero-fills the rest of the block.
pub fn init_data_page(pool: &mut BufferPool, page_id: LogicalPageId) -> DbResult<()> {
    let mut guard = pool.fetch(page_id)?;
    let block_size = guard.bytes().len() as u32;
    let header = BlockHeader {
        page_id: page_id.0,
        page_type: page_type_to_byte(PageType::Data),
        num_slots: 0,
        header_and_slot_directory_size: HEADER_SIZE as u32,
        data_end_offset: block_size,
    };
    {
        let mut bytes = guard.bytes_mut();
        bytes[HEADER_SIZE..].fill(0);
        write_block_header(&mut bytes, &header);
    }
    guard.unpin(true)
}

/// Inserts `data` into `page_id`, reusing a deleted slot if one exists,
/// otherwise appending a new slot entry. Fails with `BufferFull` if the
/// page lacks room for the record plus any new slot entry; in that case
/// the page's header is left exactly as it was found.
pub fn insert(pool: &mut BufferPool, page_id: LogicalPageId, data: &[u8]) -> DbResult<u32> {
    let mut guard = pool.fetch(page_id)?;
    let mut header = read_block_header(&guard.bytes());
    if let Err(e) = require_data_page(&header) {
        guard.unpin(false)?;
        return Err(e);
    }

    let record_length = data.len() as u32;

    let mut found_slot_id = None;
    for slot_id in 0..header.num_slots {
        if !read_slot_entry(&guard.bytes(), slot_id).occupied {
            found_slot_id = Some(slot_id);
            break;
        }
    }

    let (slot_id, grew_directory) = match found_slot_id {
        Some(id) => (id, false),
        None => {
            let id = header.num_slots;
            header.num_slots += 1;
            header.header_and_slot_directory_size =
                slot_directory_start_offset() as u32 + header.num_slots * SLOT_ENTRY_SIZE as u32;
            (id, true)
        }
    };

    let space_needed_for_slot_entry = if grew_directory {
        SLOT_ENTRY_SIZE as u32
    } else {
        0
    };
    let total_space_needed = record_length + space_needed_for_slot_entry;

    if calculate_free_space(&header) < total_space_needed {
        // No mutation has been written to the page yet; only `header`
        // (our local copy) grew. Nothing to revert on the page itself.
        guard.unpin(false)?;
        return Err(DbError::BufferFull);
    }

    header.data_end_offset -= record_length;
    let record_offset = header.data_end_offset;

    {
        let mut bytes = guard.bytes_mut();
        bytes[record_offset as usize..(record_offset + record_length) as usize]
            .copy_from_slice(data);
        write_slot_entry(
            &mut bytes,
            slot_id,
            &SlotEntry {
                offset: record_offset,
                length: record_length,
                occupied: true,
            },
        );
        write_block_header(&mut bytes, &header);
    }

    let free_space_after = calculate_free_space(&header);
    guard.unpin(true)?;

    let new_status = if free_space_after == 0 {
        BlockStatus::Full
    } else {
        BlockStatus::Incomplete
    };
    pool.update_block_status_on_disk(page_id, new_status)?;

    Ok(slot_id)
}

/// Returns a copy of the record stored at `slot_id`. Errors with
/// `NotFound` if the slot is out of range or has been deleted.
pub fn get(pool: &mut BufferPool, page_id: LogicalPageId, slot_id: u32) -> DbResult<Vec<u8>> {
    let guard = pool.fetch(page_id)?;
    let header = read_block_header(&guard.bytes());
    require_data_page(&header)?;

    if slot_id >= header.num_slots {
        guard.unpin(false)?;
        return Err(DbError::NotFound(format!(
            "slot {slot_id} out of range on page {page_id:?}"
        )));
    }
    let entry = read_slot_entry(&guard.bytes(), slot_id);
    if !entry.occupied {
        guard.unpin(false)?;
        return Err(DbError::NotFound(format!(
            "slot {slot_id} on page {page_id:?} is not occupied"
        )));
    }

    let start = entry.offset as usize;
    let end = start + entry.length as usize;
    let data = guard.bytes()[start..end].to_vec();
    guard.unpin(false)?;
    Ok(data)
}

/// Overwrites the record at `slot_id` in place when `new_data` fits within
/// the slot's current length; otherwise deletes the old record and
/// re-inserts `new_data`, which may land in a different slot. Returns the
/// (possibly new) slot id.
pub fn update(
    pool: &mut BufferPool,
    page_id: LogicalPageId,
    slot_id: u32,
    new_data: &[u8],
) -> DbResult<u32> {
    let mut guard = pool.fetch(page_id)?;
    let header = read_block_header(&guard.bytes());
    if let Err(e) = require_data_page(&header) {
        guard.unpin(false)?;
        return Err(e);
    }

    if slot_id >= header.num_slots || !read_slot_entry(&guard.bytes(), slot_id).occupied {
        guard.unpin(false)?;
        return Err(DbError::NotFound(format!(
            "slot {slot_id} on page {page_id:?} is not occupied"
        )));
    }

    let old_entry = read_slot_entry(&guard.bytes(), slot_id);
    let new_length = new_data.len() as u32;

    if new_length <= old_entry.length {
        {
            let mut bytes = guard.bytes_mut();
            let start = old_entry.offset as usize;
            bytes[start..start + new_data.len()].copy_from_slice(new_data);
            if new_length < old_entry.length {
                bytes[start + new_data.len()..start + old_entry.length as usize].fill(0);
            }
            if new_length != old_entry.length {
                write_slot_entry(
                    &mut bytes,
                    slot_id,
                    &SlotEntry {
                        offset: old_entry.offset,
                        length: new_length,
                        occupied: true,
                    },
                );
            }
        }
        let free_space_after = calculate_free_space(&header);
        guard.unpin(true)?;
        let new_status = if free_space_after == 0 {
            BlockStatus::Full
        } else {
            BlockStatus::Incomplete
        };
        pool.update_block_status_on_disk(page_id, new_status)?;
        return Ok(slot_id);
    }

    // The new record doesn't fit in the old slot's footprint. Release our
    // pin before delegating to `delete`/`insert`, which each fetch the page
    // again themselves.
    guard.unpin(false)?;
    delete(pool, page_id, slot_id)?;
    insert(pool, page_id, new_data)
}

/// Marks `slot_id` free and zero-fills its record bytes. Stable slot ids:
/// `num_slots` never decreases, so the slot can be reused by a later
/// `insert` but its id is never reassigned to an unrelated record.
pub fn delete(pool: &mut BufferPool, page_id: LogicalPageId, slot_id: u32) -> DbResult<()> {
    let mut guard = pool.fetch(page_id)?;
    let header = read_block_header(&guard.bytes());
    if let Err(e) = require_data_page(&header) {
        guard.unpin(false)?;
        return Err(e);
    }

    if slot_id >= header.num_slots || !read_slot_entry(&guard.bytes(), slot_id).occupied {
        guard.unpin(false)?;
        return Err(DbError::NotFound(format!(
            "slot {slot_id} on page {page_id:?} is not occupied"
        )));
    }

    let entry = read_slot_entry(&guard.bytes(), slot_id);
    {
        let mut bytes = guard.bytes_mut();
        write_slot_entry(
            &mut bytes,
            slot_id,
            &SlotEntry {
                offset: entry.offset,
                length: entry.length,
                occupied: false,
            },
        );
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        bytes[start..end].fill(0);
    }
    guard.unpin(true)?;

    let remaining = num_records(pool, page_id)?;
    let new_status = if remaining == 0 {
        BlockStatus::Empty
    } else {
        BlockStatus::Incomplete
    };
    pool.update_block_status_on_disk(page_id, new_status)
}

/// Number of occupied slots on `page_id` (not the same as `num_slots`,
/// which also counts deleted-but-retained slots).
pub fn num_records(pool: &mut BufferPool, page_id: LogicalPageId) -> DbResult<u32> {
    let guard = pool.fetch(page_id)?;
    let header = read_block_header(&guard.bytes());
    if let Err(e) = require_data_page(&header) {
        guard.unpin(false)?;
        return Err(e);
    }
    let mut count = 0;
    for slot_id in 0..header.num_slots {
        if read_slot_entry(&guard.bytes(), slot_id).occupied {
            count += 1;
        }
    }
    guard.unpin(false)?;
    Ok(count)
}

/// Bytes still available for new records and slot entries on `page_id`.
pub fn free_space(pool: &mut BufferPool, page_id: LogicalPageId) -> DbResult<u32> {
    let guard = pool.fetch(page_id)?;
    let header = read_block_header(&guard.bytes());
    if let Err(e) = require_data_page(&header) {
        guard.unpin(false)?;
        return Err(e);
    }
    let fs = calculate_free_space(&header);
    guard.unpin(false)?;
    Ok(fs)
}

/// Returns `(slot_id, bytes)` for every occupied slot on `page_id`, in slot
/// id order. Used by the catalog to walk its metadata page without
/// duplicating the slot-directory layout.
pub fn scan(pool: &mut BufferPool, page_id: LogicalPageId) -> DbResult<Vec<(u32, Vec<u8>)>> {
    let guard = pool.fetch(page_id)?;
    let header = read_block_header(&guard.bytes());
    if let Err(e) = require_data_page(&header) {
        guard.unpin(false)?;
        return Err(e);
    }
    let mut out = Vec::new();
    for slot_id in 0..header.num_slots {
        let entry = read_slot_entry(&guard.bytes(), slot_id);
        if entry.occupied {
            let start = entry.offset as usize;
            let end = start + entry.length as usize;
            out.push((slot_id, guard.bytes()[start..end].to_vec()));
        }
    }
    guard.unpin(false)?;
    Ok(out)
}

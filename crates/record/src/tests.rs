use super::*;
use common::{Config, PageType};
use storage::Disk;
use tempfile::tempdir;

fn new_pool() -> (tempfile::TempDir, BufferPool) {
    let dir = tempdir().unwrap();
    let config = Config::builder()
        .num_platters(2)
        .num_surfaces_per_platter(1)
        .num_cylinders(2)
        .num_sectors_per_track(8)
        .block_size(256)
        .sector_size(128)
        .buffer_pool_size(4)
        .build();
    let disk = Disk::create(dir.path(), "T", &config).unwrap();
    (dir, BufferPool::new(disk, &config))
}

fn new_data_page(pool: &mut BufferPool) -> LogicalPageId {
    let (page_id, guard) = pool.new_page(PageType::Data).unwrap();
    guard.unpin(false).unwrap();
    init_data_page(pool, page_id).unwrap();
    page_id
}

#[test]
fn insert_and_get_round_trip() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);

    let slot = insert(&mut pool, page_id, b"hello").unwrap();
    assert_eq!(slot, 0);
    assert_eq!(get(&mut pool, page_id, slot).unwrap(), b"hello");
}

/// spec.md §8 scenario S4: three inserts get slots 0,1,2; deleting slot 1
/// drops `num_records` to 2; a follow-up insert reuses slot 1 or appends a
/// new slot 3 — either is permitted.
#[test]
fn s4_slotted_round_trip_and_reuse() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);

    let s1 = insert(&mut pool, page_id, b"abc").unwrap();
    let s2 = insert(&mut pool, page_id, b"defghi").unwrap();
    let s3 = insert(&mut pool, page_id, b"jk").unwrap();
    assert_eq!((s1, s2, s3), (0, 1, 2));

    delete(&mut pool, page_id, s2).unwrap();
    assert_eq!(num_records(&mut pool, page_id).unwrap(), 2);

    let s4 = insert(&mut pool, page_id, b"xy").unwrap();
    assert!(s4 == 1 || s4 == 3);

    assert_eq!(get(&mut pool, page_id, 0).unwrap(), b"abc");
    assert_eq!(get(&mut pool, page_id, 2).unwrap(), b"jk");
    assert_eq!(get(&mut pool, page_id, s4).unwrap(), b"xy");
    if s4 != s2 {
        assert!(get(&mut pool, page_id, s2).is_err());
    }
}

/// spec.md §8 scenario S5: growing a record past its slot's current length
/// relocates it; the old slot becomes unoccupied, and the returned slot id
/// yields the new payload.
#[test]
fn s5_relocating_update() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);

    let slot = insert(&mut pool, page_id, b"short").unwrap();
    let free_before = free_space(&mut pool, page_id).unwrap();

    let new_slot = update(&mut pool, page_id, slot, b"a much longer payload").unwrap();
    assert_eq!(get(&mut pool, page_id, new_slot).unwrap(), b"a much longer payload");

    if new_slot != slot {
        assert!(get(&mut pool, page_id, slot).is_err());
    }

    let free_after = free_space(&mut pool, page_id).unwrap();
    let shrink = free_before - free_after;
    assert!(shrink >= (21 - 5) as u32);
}

#[test]
fn in_place_update_keeps_same_slot() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);

    let slot = insert(&mut pool, page_id, b"0123456789").unwrap();
    let new_slot = update(&mut pool, page_id, slot, b"abc").unwrap();
    assert_eq!(new_slot, slot);
    assert_eq!(get(&mut pool, page_id, slot).unwrap(), b"abc");
}

#[test]
fn delete_marks_page_empty_when_last_record_removed() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);

    let slot = insert(&mut pool, page_id, b"only").unwrap();
    assert_eq!(num_records(&mut pool, page_id).unwrap(), 1);

    delete(&mut pool, page_id, slot).unwrap();
    assert_eq!(num_records(&mut pool, page_id).unwrap(), 0);
}

#[test]
fn insert_fails_with_buffer_full_when_page_has_no_room() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);

    let payload = vec![7u8; 256];
    let err = insert(&mut pool, page_id, &payload).unwrap_err();
    assert!(matches!(err, DbError::BufferFull));

    // The header was left untouched by the failed insert: a normal-size
    // record still fits afterward.
    let slot = insert(&mut pool, page_id, b"fits").unwrap();
    assert_eq!(slot, 0);
}

#[test]
fn get_out_of_range_slot_is_not_found() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);
    insert(&mut pool, page_id, b"only").unwrap();

    let err = get(&mut pool, page_id, 99).unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[test]
fn scan_returns_only_occupied_slots_in_order() {
    let (_dir, mut pool) = new_pool();
    let page_id = new_data_page(&mut pool);

    insert(&mut pool, page_id, b"abc").unwrap();
    let middle = insert(&mut pool, page_id, b"defghi").unwrap();
    insert(&mut pool, page_id, b"jk").unwrap();
    delete(&mut pool, page_id, middle).unwrap();

    let entries = scan(&mut pool, page_id).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].1, b"abc");
    assert_eq!(entries[1].1, b"jk");
}

#[test]
fn operations_reject_non_data_pages() {
    let (_dir, mut pool) = new_pool();
    let (page_id, mut guard) = pool.new_page(PageType::Catalog).unwrap();
    {
        let header = BlockHeader {
            page_id: page_id.0,
            page_type: page_type_to_byte(PageType::Catalog),
            num_slots: 0,
            header_and_slot_directory_size: HEADER_SIZE as u32,
            data_end_offset: guard.bytes().len() as u32,
        };
        write_block_header(&mut guard.bytes_mut(), &header);
    }
    guard.unpin(true).unwrap();

    let err = insert(&mut pool, page_id, b"x").unwrap_err();
    assert!(matches!(err, DbError::InvalidPageType));
}

use super::*;
use tempfile::tempdir;
use testsupport::prelude::*;

fn tiny_config() -> Config {
    Config::builder()
        .num_platters(2)
        .num_surfaces_per_platter(1)
        .num_cylinders(2)
        .num_sectors_per_track(8)
        .block_size(512)
        .sector_size(256)
        .build()
}

#[test]
fn create_lays_out_sector_and_metadata_files() {
    let dir = tempdir().unwrap();
    let disk = Disk::create(dir.path(), "T0", &tiny_config()).unwrap();

    let sector0 = dir
        .path()
        .join("T0/body/Platter_0/Surface_0/Track_0/Sector_0.bin");
    assert!(sector0.exists());
    assert_eq!(fs::metadata(&sector0).unwrap().len(), 256);
    assert_eq!(disk.next_logical_page_id(), 1);
    assert_eq!(
        disk.status_of(LogicalPageId::METADATA).unwrap(),
        BlockStatus::Full
    );
}

/// Scenario S1: disk create + reopen durability.
#[test]
fn s1_create_allocate_write_reopen_round_trip() {
    let dir = tempdir().unwrap();
    let config = tiny_config();
    let (p1, p2) = {
        let mut disk = Disk::create(dir.path(), "T1", &config).unwrap();
        let (p1, _) = disk.allocate(PageType::Data).unwrap();
        let (p2, _) = disk.allocate(PageType::Data).unwrap();
        disk.write_block(p1, &[0xAAu8; 512]).unwrap();
        disk.write_block(p2, &[0xBBu8; 512]).unwrap();
        (p1, p2)
    };

    let disk = Disk::open(dir.path(), "T1", &config).unwrap();
    assert_eq!(disk.read_block(p1).unwrap(), vec![0xAAu8; 512]);
    assert_eq!(disk.read_block(p2).unwrap(), vec![0xBBu8; 512]);
    assert_eq!(disk.next_logical_page_id(), 3);
}

#[test]
fn allocate_assigns_monotonic_ids_and_marks_incomplete() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::create(dir.path(), "T2", &tiny_config()).unwrap();

    let (p1, _) = disk.allocate(PageType::Data).unwrap();
    let (p2, _) = disk.allocate(PageType::Data).unwrap();
    assert!(p2.0 > p1.0);
    assert_eq!(disk.status_of(p1).unwrap(), BlockStatus::Incomplete);
}

/// A second `DATA` allocation finds the first one's still-`INCOMPLETE`
/// block again rather than minting a fresh block for it — but it still
/// mints a fresh `LogicalPageId` for that same physical address, so the
/// two ids end up aliased to one block. This is the inherited quirk
/// documented in DESIGN.md: harmless here because nothing in this
/// workspace ever grows a table past its first data block.
#[test]
fn allocate_reuses_incomplete_block_but_still_mints_a_new_id() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::create(dir.path(), "T3", &tiny_config()).unwrap();

    let (p1, addr1) = disk.allocate(PageType::Data).unwrap();
    assert_eq!(disk.status_of(p1).unwrap(), BlockStatus::Incomplete);

    let (p2, addr2) = disk.allocate(PageType::Data).unwrap();
    assert_ne!(p1, p2);
    assert_eq!(addr1, addr2);
    assert_eq!(disk.status_of(p1).unwrap(), BlockStatus::Incomplete);
}

#[test]
fn deallocate_frees_block_and_forbids_metadata_page() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::create(dir.path(), "T4", &tiny_config()).unwrap();

    let (p1, _) = disk.allocate(PageType::Data).unwrap();
    disk.deallocate(p1).unwrap();
    assert!(matches!(disk.address_of(p1), Err(DbError::NotFound(_))));

    let err = disk.deallocate(LogicalPageId::METADATA).unwrap_err();
    assert!(matches!(err, DbError::InvalidParameter(_)));
}

#[test]
fn deallocate_missing_page_is_not_found() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::create(dir.path(), "T5", &tiny_config()).unwrap();
    let err = disk.deallocate(LogicalPageId(99)).unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[test]
fn update_status_forbidden_on_metadata_page() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::create(dir.path(), "T6", &tiny_config()).unwrap();
    let err = disk
        .update_status(LogicalPageId::METADATA, BlockStatus::Empty)
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidParameter(_)));
}

#[test]
fn write_block_rejects_wrong_length_payload() {
    let dir = tempdir().unwrap();
    let mut disk = Disk::create(dir.path(), "T7", &tiny_config()).unwrap();
    let (p1, _) = disk.allocate(PageType::Data).unwrap();
    let err = disk.write_block(p1, &[0u8; 10]).unwrap_err();
    assert!(matches!(err, DbError::InvalidParameter(_)));
}

#[test]
fn allocate_exhausts_to_disk_full() {
    let dir = tempdir().unwrap();
    // platters=2, surfaces=1, cylinders=1, sectors_per_track=2, block=sector
    // => exactly 2 logical blocks total (minus the metadata block's track).
    let config = Config::builder()
        .num_platters(2)
        .num_surfaces_per_platter(1)
        .num_cylinders(1)
        .num_sectors_per_track(2)
        .block_size(256)
        .sector_size(256)
        .build();
    let mut disk = Disk::create(dir.path(), "T8", &config).unwrap();

    // total blocks = 2 platters * 1 surface * 1 cylinder * 2 sectors/track
    // (sectors_per_block=1) = 4; one is reserved for metadata.
    for _ in 0..3 {
        disk.allocate(PageType::Data).unwrap();
    }
    assert_disk_full(disk.allocate(PageType::Data));
}

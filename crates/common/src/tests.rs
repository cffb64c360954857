use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.block_size, 4096);
    assert_eq!(cfg.sector_size, 512);
    assert_eq!(cfg.sectors_per_block(), 8);
    cfg.validate().unwrap();
}

#[test]
fn validate_rejects_odd_platter_count() {
    let cfg = Config::builder().num_platters(3).build();
    assert!(cfg.validate().is_err());
}

#[test]
fn validate_rejects_block_size_not_multiple_of_sector_size() {
    let cfg = Config::builder().block_size(500).sector_size(256).build();
    assert!(cfg.validate().is_err());
}

#[test]
fn validate_rejects_too_few_sectors_per_track() {
    let cfg = Config::builder()
        .block_size(1024)
        .sector_size(256)
        .num_sectors_per_track(2)
        .build();
    assert!(cfg.validate().is_err());
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::DiskFull;
    assert_eq!(format!("{err}"), "disk full");
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}

#[test]
fn block_status_bit_round_trip() {
    for s in [BlockStatus::Empty, BlockStatus::Incomplete, BlockStatus::Full] {
        assert_eq!(BlockStatus::from_bits(s.to_bits()).unwrap(), s);
    }
    assert!(BlockStatus::from_bits(3).is_err());
}

#[test]
fn logical_page_id_zero_is_metadata() {
    assert!(LogicalPageId(0).is_metadata());
    assert!(!LogicalPageId(1).is_metadata());
}

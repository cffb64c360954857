use super::*;
use testsupport::prelude::*;

fn int_col(name: &str) -> ColumnMetadata {
    int_column(name)
}

fn varchar_col(name: &str, size: u32) -> ColumnMetadata {
    varchar_column(name, size)
}

#[test]
fn bootstrap_creates_empty_catalog() {
    let (_dir, catalog) = fresh_catalog("T");
    assert!(catalog.list_tables().is_empty());
}

#[test]
fn create_table_then_get_schema_round_trips() {
    let (_dir, mut catalog) = fresh_catalog("T");

    let schema = catalog
        .create_table(
            "users",
            vec![int_col("id"), varchar_col("name", 32)],
            false,
        )
        .unwrap();
    assert_eq!(schema.table_id, 1);
    assert_eq!(schema.name, "users");
    assert!(!schema.is_fixed_length);
    assert_eq!(schema.fixed_record_size, None);

    let fetched = catalog.get_schema("users").unwrap();
    assert_eq!(fetched, &schema);
}

#[test]
fn create_table_rejects_duplicate_name() {
    let (_dir, mut catalog) = fresh_catalog("T");

    catalog.create_table("events", vec![int_col("ts")], true).unwrap();
    let err = catalog
        .create_table("events", vec![int_col("ts")], true)
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateEntry(_)));
}

#[test]
fn fixed_length_table_rejects_varchar_column() {
    let (_dir, mut catalog) = fresh_catalog("T");

    let result = catalog.create_table("bad", vec![varchar_col("name", 16)], true);
    assert_error_contains(result, "VARCHAR");
}

#[test]
fn get_schema_on_unknown_table_is_not_found() {
    let (_dir, catalog) = fresh_catalog("T");
    let err = catalog.get_schema("nope").unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

#[test]
fn drop_table_removes_it_from_the_catalog() {
    let (_dir, mut catalog) = fresh_catalog("T");

    catalog.create_table("temp", vec![int_col("x")], true).unwrap();
    assert_eq!(catalog.list_tables(), vec!["temp".to_string()]);

    catalog.drop_table("temp").unwrap();
    assert!(catalog.list_tables().is_empty());
    assert!(matches!(
        catalog.get_schema("temp").unwrap_err(),
        DbError::NotFound(_)
    ));
}

#[test]
fn drop_table_on_unknown_name_is_not_found() {
    let (_dir, mut catalog) = fresh_catalog("T");
    let err = catalog.drop_table("ghost").unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}

/// spec.md §8 scenario S6: two tables (one variable-length, one
/// fixed-length) survive a catalog re-open with their schemas intact.
#[test]
fn s6_catalog_survives_reopen() {
    let (dir, mut catalog) = fresh_catalog("T");
    catalog
        .create_table("users", vec![int_col("id"), varchar_col("name", 32)], false)
        .unwrap();
    catalog
        .create_table("events", vec![int_col("ts"), int_col("v")], true)
        .unwrap();
    drop(catalog);

    let pool = reopen_pool(&dir, "T");
    let catalog = Catalog::init(pool).unwrap();

    assert_eq!(
        catalog.list_tables(),
        vec!["events".to_string(), "users".to_string()]
    );

    let events = catalog.get_schema("events").unwrap();
    assert_eq!(events.fixed_record_size, Some(8));
    assert!(events.is_fixed_length);

    let users = catalog.get_schema("users").unwrap();
    assert!(!users.is_fixed_length);
    assert_eq!(users.columns.len(), 2);
    assert_eq!(users.columns[1].ty, ColumnType::Varchar);
}

#[test]
fn serialize_deserialize_round_trip_preserves_schema() {
    let schema = TableSchema {
        table_id: 7,
        name: "widgets".to_string(),
        is_fixed_length: true,
        fixed_record_size: Some(12),
        columns: vec![int_col("id"), int_col("weight"), int_col("count")],
        data_page_ids: vec![LogicalPageId(3)],
        num_records: 0,
    };

    let bytes = serialize_schema(&schema).unwrap();
    let restored = deserialize_schema(&bytes).unwrap();
    assert_eq!(restored, schema);
}

#[test]
fn create_table_from_file_infers_types_from_sample_row() {
    let (dir, mut catalog) = fresh_catalog("T");

    let file_path = dir.path().join("accounts.csv");
    std::fs::write(&file_path, "id,name,balance\n1,alice,100\n").unwrap();

    let schema = catalog.create_table_from_file(&file_path).unwrap();
    assert_eq!(schema.name, "accounts");
    assert_eq!(schema.columns.len(), 3);
    assert_eq!(schema.columns[0].ty, ColumnType::Int);
    assert_eq!(schema.columns[1].ty, ColumnType::Varchar);
    assert_eq!(schema.columns[2].ty, ColumnType::Int);
    assert!(!schema.is_fixed_length);
}

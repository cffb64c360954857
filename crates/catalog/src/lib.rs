//! Table catalog: owns table schemas and their page lists, persisted on a
//! distinguished catalog page via the [`record`] crate.

use std::collections::HashMap;
use std::path::Path;

use buffer::BufferPool;
use common::{DbError, DbResult, LogicalPageId, PageType};

#[cfg(test)]
mod tests;

const NAME_FIELD_LEN: usize = 64;

/// The page the very first `Catalog`-hinted allocation always lands on,
/// since nothing but the disk-metadata page (id 0) is ever allocated
/// before it. `Catalog::init` relies on this to find its root page again
/// across a reopen without a separate "where's the catalog" pointer.
const CATALOG_ROOT_PAGE_ID: LogicalPageId = LogicalPageId(1);

/// A column's declared type. `ColumnMetadata::size` carries the `n` for
/// `CHAR(n)`/`VARCHAR(n)`, and the (fixed) byte width for `INT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Char,
    Varchar,
}

impl ColumnType {
    fn to_byte(self) -> u8 {
        match self {
            ColumnType::Int => 0,
            ColumnType::Char => 1,
            ColumnType::Varchar => 2,
        }
    }

    fn from_byte(byte: u8) -> DbResult<Self> {
        match byte {
            0 => Ok(ColumnType::Int),
            1 => Ok(ColumnType::Char),
            2 => Ok(ColumnType::Varchar),
            other => Err(DbError::InvalidParameter(format!(
                "unknown column type tag {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub ty: ColumnType,
    pub size: u32,
}

/// A table's full schema as the catalog holds it in memory. Only
/// `data_page_ids[0]` round-trips through the packed on-disk form (see
/// DESIGN.md) — every table created by `create_table` has exactly one
/// data page at creation time, and nothing in this crate ever appends to
/// the list, so the two representations stay in sync in practice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table_id: u32,
    pub name: String,
    pub is_fixed_length: bool,
    pub fixed_record_size: Option<u32>,
    pub columns: Vec<ColumnMetadata>,
    pub data_page_ids: Vec<LogicalPageId>,
    pub num_records: u32,
}

fn pad_name(name: &str) -> DbResult<[u8; NAME_FIELD_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() >= NAME_FIELD_LEN {
        return Err(DbError::InvalidParameter(format!(
            "name '{name}' exceeds {NAME_FIELD_LEN} bytes"
        )));
    }
    let mut buf = [0u8; NAME_FIELD_LEN];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

fn unpad_name(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn serialize_schema(schema: &TableSchema) -> DbResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&schema.table_id.to_le_bytes());
    buf.extend_from_slice(&pad_name(&schema.name)?);
    buf.push(schema.is_fixed_length as u8);
    let first_data_page_id = schema.data_page_ids.first().map(|id| id.0).unwrap_or(0);
    buf.extend_from_slice(&first_data_page_id.to_le_bytes());
    buf.extend_from_slice(&schema.num_records.to_le_bytes());
    buf.extend_from_slice(&schema.fixed_record_size.unwrap_or(0).to_le_bytes());

    buf.extend_from_slice(&(schema.columns.len() as u32).to_le_bytes());
    for col in &schema.columns {
        buf.extend_from_slice(&pad_name(&col.name)?);
        buf.push(col.ty.to_byte());
        buf.extend_from_slice(&col.size.to_le_bytes());
    }
    Ok(buf)
}

fn deserialize_schema(bytes: &[u8]) -> DbResult<TableSchema> {
    let mut offset = 0usize;
    let mut take = |len: usize| -> DbResult<&[u8]> {
        if offset + len > bytes.len() {
            return Err(DbError::Other("truncated table-schema record".into()));
        }
        let slice = &bytes[offset..offset + len];
        offset += len;
        Ok(slice)
    };

    let table_id = u32::from_le_bytes(take(4)?.try_into().unwrap());
    let name = unpad_name(take(NAME_FIELD_LEN)?);
    let is_fixed_length = take(1)?[0] != 0;
    let first_data_page_id = u32::from_le_bytes(take(4)?.try_into().unwrap());
    let num_records = u32::from_le_bytes(take(4)?.try_into().unwrap());
    let fixed_record_size = u32::from_le_bytes(take(4)?.try_into().unwrap());

    let column_count = u32::from_le_bytes(take(4)?.try_into().unwrap());
    let mut columns = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
        let name = unpad_name(take(NAME_FIELD_LEN)?);
        let ty = ColumnType::from_byte(take(1)?[0])?;
        let size = u32::from_le_bytes(take(4)?.try_into().unwrap());
        columns.push(ColumnMetadata { name, ty, size });
    }

    Ok(TableSchema {
        table_id,
        name,
        is_fixed_length,
        fixed_record_size: if is_fixed_length {
            Some(fixed_record_size)
        } else {
            None
        },
        columns,
        data_page_ids: vec![LogicalPageId(first_data_page_id)],
        num_records,
    })
}

/// Owns the in-memory schema map and drives the catalog page through the
/// [`record`] crate's slotted-page operations. Never touches `storage::Disk`
/// directly — it only ever reaches the disk through the buffer pool.
pub struct Catalog {
    pool: BufferPool,
    catalog_page_id: LogicalPageId,
    schemas: HashMap<String, TableSchema>,
    next_table_id: u32,
}

impl Catalog {
    /// Loads an existing catalog off `pool`, or bootstraps a fresh one if
    /// none exists yet.
    pub fn init(mut pool: BufferPool) -> DbResult<Self> {
        match pool.fetch(CATALOG_ROOT_PAGE_ID) {
            Ok(guard) => {
                guard.unpin(false)?;
                let mut catalog = Catalog {
                    pool,
                    catalog_page_id: CATALOG_ROOT_PAGE_ID,
                    schemas: HashMap::new(),
                    next_table_id: 1,
                };
                catalog.load()?;
                Ok(catalog)
            }
            Err(DbError::NotFound(_)) => {
                let (page_id, guard) = pool.new_page(PageType::Catalog)?;
                guard.unpin(true)?;
                record::init_data_page(&mut pool, page_id)?;

                let mut catalog = Catalog {
                    pool,
                    catalog_page_id: page_id,
                    schemas: HashMap::new(),
                    next_table_id: 1,
                };
                catalog.save()?;
                Ok(catalog)
            }
            Err(e) => Err(e),
        }
    }

    /// Rewrites the catalog page from scratch with every in-memory schema.
    /// Not atomic across a crash mid-write: a failure here may leave the
    /// page inconsistent, and the failure is surfaced rather than retried.
    pub fn save(&mut self) -> DbResult<()> {
        record::init_data_page(&mut self.pool, self.catalog_page_id)?;
        let mut names: Vec<&String> = self.schemas.keys().collect();
        names.sort();
        for name in names {
            let schema = &self.schemas[name];
            let bytes = serialize_schema(schema)?;
            record::insert(&mut self.pool, self.catalog_page_id, &bytes)?;
        }
        Ok(())
    }

    fn load(&mut self) -> DbResult<()> {
        self.schemas.clear();
        let mut max_id = 0u32;
        for (_slot_id, bytes) in record::scan(&mut self.pool, self.catalog_page_id)? {
            let schema = deserialize_schema(&bytes)?;
            max_id = max_id.max(schema.table_id);
            self.schemas.insert(schema.name.clone(), schema);
        }
        self.next_table_id = max_id + 1;
        Ok(())
    }

    /// Creates `name` with `columns`, allocating and initializing its
    /// first data page. Rejects a duplicate name and a fixed-length table
    /// that declares a `VARCHAR` column.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<ColumnMetadata>,
        is_fixed_length: bool,
    ) -> DbResult<TableSchema> {
        if self.schemas.contains_key(name) {
            return Err(DbError::DuplicateEntry(name.to_string()));
        }
        if is_fixed_length && columns.iter().any(|c| c.ty == ColumnType::Varchar) {
            return Err(DbError::InvalidParameter(
                "a fixed-length table cannot declare a VARCHAR column".into(),
            ));
        }

        let table_id = self.next_table_id;
        let (data_page_id, guard) = self.pool.new_page(PageType::Data)?;
        guard.unpin(true)?;
        record::init_data_page(&mut self.pool, data_page_id)?;

        let fixed_record_size = if is_fixed_length {
            Some(columns.iter().map(|c| c.size).sum())
        } else {
            None
        };

        let schema = TableSchema {
            table_id,
            name: name.to_string(),
            is_fixed_length,
            fixed_record_size,
            columns,
            data_page_ids: vec![data_page_id],
            num_records: 0,
        };

        self.next_table_id += 1;
        self.schemas.insert(name.to_string(), schema.clone());
        self.save()?;
        Ok(schema)
    }

    /// Removes `name` and asks the buffer pool to delete every page it
    /// owns. Best-effort: a page-delete failure is swallowed so the
    /// catalog save still proceeds, matching the source's `DropTable`.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let schema = self
            .schemas
            .remove(name)
            .ok_or_else(|| DbError::NotFound(name.to_string()))?;
        for page_id in schema.data_page_ids {
            let _ = self.pool.delete_page(page_id);
        }
        self.save()
    }

    /// Infers a schema from a two-line text file (`name[,name...]` header,
    /// one sample data row) and delegates to [`Catalog::create_table`].
    /// The table name is the file's stem. Only the header lines are read;
    /// no data rows are loaded.
    pub fn create_table_from_file(&mut self, path: &Path) -> DbResult<TableSchema> {
        let table_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DbError::InvalidParameter(format!("bad table file path {path:?}")))?
            .to_string();

        let contents = std::fs::read_to_string(path)?;
        let mut lines = contents.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| DbError::InvalidParameter("file has no column-name line".into()))?;
        let sample_line = lines.next().ok_or_else(|| {
            DbError::InvalidParameter("file has no sample data row to infer types from".into())
        })?;

        let names: Vec<&str> = split_row(header_line);
        let samples: Vec<&str> = split_row(sample_line);
        if names.len() != samples.len() {
            return Err(DbError::InvalidParameter(
                "column-name count does not match sample-row value count".into(),
            ));
        }

        let mut columns = Vec::with_capacity(names.len());
        let mut is_fixed_length = true;
        for (name, sample) in names.iter().zip(samples.iter()) {
            if sample.parse::<i64>().is_ok() {
                columns.push(ColumnMetadata {
                    name: name.to_string(),
                    ty: ColumnType::Int,
                    size: 4,
                });
            } else {
                is_fixed_length = false;
                columns.push(ColumnMetadata {
                    name: name.to_string(),
                    ty: ColumnType::Varchar,
                    size: sample.len() as u32,
                });
            }
        }

        self.create_table(&table_name, columns, is_fixed_length)
    }

    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_schema(&self, name: &str) -> DbResult<&TableSchema> {
        self.schemas
            .get(name)
            .ok_or_else(|| DbError::NotFound(name.to_string()))
    }
}

fn split_row(line: &str) -> Vec<&str> {
    let sep = if line.contains(',') { ',' } else { '\t' };
    line.split(sep).map(|s| s.trim()).collect()
}

//! Custom assertion helpers for testing the storage stack's error taxonomy.

use common::{DbError, DbResult};

/// Assert that `result` failed with a `DbError::NotFound`.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
/// use common::DbError;
///
/// let result: Result<(), DbError> = Err(DbError::NotFound("users".into()));
/// assert_not_found(result);
/// ```
pub fn assert_not_found<T>(result: DbResult<T>) {
    match result {
        Ok(_) => panic!("expected NotFound, got Ok"),
        Err(DbError::NotFound(_)) => {}
        Err(other) => panic!("expected NotFound, got {other}"),
    }
}

/// Assert that `result` failed with a `DbError::BufferFull`.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
/// use common::DbError;
///
/// let result: Result<(), DbError> = Err(DbError::BufferFull);
/// assert_buffer_full(result);
/// ```
pub fn assert_buffer_full<T>(result: DbResult<T>) {
    match result {
        Ok(_) => panic!("expected BufferFull, got Ok"),
        Err(DbError::BufferFull) => {}
        Err(other) => panic!("expected BufferFull, got {other}"),
    }
}

/// Assert that `result` failed with a `DbError::DiskFull`.
pub fn assert_disk_full<T>(result: DbResult<T>) {
    match result {
        Ok(_) => panic!("expected DiskFull, got Ok"),
        Err(DbError::DiskFull) => {}
        Err(other) => panic!("expected DiskFull, got {other}"),
    }
}

/// Assert that an operation returns an error whose `Display` contains
/// `expected_msg`.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
/// use common::DbError;
///
/// let result: Result<(), DbError> = Err(DbError::InvalidParameter("bad name".into()));
/// assert_error_contains(result, "bad name");
/// ```
pub fn assert_error_contains<T>(result: DbResult<T>, expected_msg: &str) {
    match result {
        Ok(_) => panic!("expected error containing '{expected_msg}', but got Ok"),
        Err(e) => {
            let error_string = e.to_string();
            assert!(
                error_string.contains(expected_msg),
                "expected error to contain '{expected_msg}', but got: {error_string}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_not_found() {
        let result: DbResult<()> = Err(DbError::NotFound("x".into()));
        assert_not_found(result);
    }

    #[test]
    #[should_panic(expected = "expected NotFound")]
    fn test_assert_not_found_fails_on_wrong_variant() {
        let result: DbResult<()> = Err(DbError::BufferFull);
        assert_not_found(result);
    }

    #[test]
    fn test_assert_error_contains() {
        let result: DbResult<()> = Err(DbError::InvalidParameter("bad name".into()));
        assert_error_contains(result, "bad name");
    }

    #[test]
    #[should_panic(expected = "but got Ok")]
    fn test_assert_error_contains_no_error() {
        let result: DbResult<()> = Ok(());
        assert_error_contains(result, "some error");
    }
}

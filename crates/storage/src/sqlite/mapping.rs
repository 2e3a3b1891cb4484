use chrono::{DateTime, Utc};
use progress_core::model::{
    Progress, ProgressId, ProgressStatus, ProgressType, SubjectId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::records::ProgressRecord;
use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Classify a driver error: a missing table means the schema was never installed.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.message().contains("no such table") {
            return StorageError::Schema(db.message().to_owned());
        }
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
    }
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn get_u64(row: &SqliteRow, column: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(column, row.try_get::<i64, _>(column).map_err(ser)?)
}

pub(crate) fn get_opt_u64(row: &SqliteRow, column: &'static str) -> Result<Option<u64>, StorageError> {
    row.try_get::<Option<i64>, _>(column)
        .map_err(ser)?
        .map(|v| i64_to_u64(column, v))
        .transpose()
}

/// Parse an id stored as text in a metadata value.
pub(crate) fn meta_id(raw: Option<&str>) -> Option<SubjectId> {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .map(SubjectId::new)
}

pub(crate) fn map_progress_record(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let kind_raw: String = row.try_get("type").map_err(ser)?;
    let kind = ProgressType::parse(&kind_raw)
        .ok_or_else(|| StorageError::Serialization(format!("invalid progress type: {kind_raw}")))?;

    Ok(ProgressRecord {
        kind,
        subject_id: SubjectId::new(get_u64(row, "subject_id")?),
        user_id: UserId::new(get_u64(row, "user_id")?),
        parent_subject_id: get_opt_u64(row, "parent_subject_id")?.map(SubjectId::new),
        status: row.try_get("status").map_err(ser)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_progress_row<S: ProgressStatus>(
    row: &SqliteRow,
) -> Result<Progress<S>, StorageError> {
    let status_raw: String = row.try_get("status").map_err(ser)?;
    let status = S::parse(&status_raw).ok_or_else(|| {
        StorageError::Serialization(format!("invalid {} status: {status_raw}", S::KIND))
    })?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(ser)?;

    Progress::from_persisted(
        ProgressId::new(get_u64(row, "id")?),
        SubjectId::new(get_u64(row, "subject_id")?),
        UserId::new(get_u64(row, "user_id")?),
        status,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        created_at,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_ids_ignore_blank_and_zero() {
        assert_eq!(meta_id(Some("12")), Some(SubjectId::new(12)));
        assert_eq!(meta_id(Some(" 7 ")), Some(SubjectId::new(7)));
        assert_eq!(meta_id(Some("0")), None);
        assert_eq!(meta_id(Some("")), None);
        assert_eq!(meta_id(None), None);
    }

    #[test]
    fn id_conversions_reject_overflow() {
        assert!(id_i64("subject_id", u64::MAX).is_err());
        assert!(i64_to_u64("subject_id", -1).is_err());
        assert_eq!(id_i64("subject_id", 5).unwrap(), 5);
    }
}

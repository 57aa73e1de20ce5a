use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::entities::{
    Doctor, Hospital, IncomeRecord, LedgerEntry, ProgressEntry, RecordId, RecordLedger,
    Subscription, SurgeryRecord,
};
use crate::error::{LedgerError, LedgerResult};

/// Event for the audit trail: every mutation of a ledger is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> LedgerResult<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS doctors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doctor_uuid TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            plan TEXT NOT NULL DEFAULT 'free',
            subscription_status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Hospital ledgers (one row per hospital, records in income_records)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS hospitals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hospital_uuid TEXT UNIQUE NOT NULL,
            doctor_uuid TEXT NOT NULL REFERENCES doctors(doctor_uuid),
            name TEXT NOT NULL,
            wht_enabled INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Row order (id) is insertion order; ledgers read it DESC for newest-first.
    // idempotency_hash is only set for imported rows (NULLs never collide).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS income_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_uuid TEXT UNIQUE NOT NULL,
            hospital_uuid TEXT NOT NULL REFERENCES hospitals(hospital_uuid) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('channeling', 'surgical')),
            date TEXT NOT NULL,
            patient_count INTEGER,
            income REAL,
            bht TEXT,
            amount REAL,
            idempotency_hash TEXT UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS surgery_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_uuid TEXT UNIQUE NOT NULL,
            doctor_uuid TEXT NOT NULL REFERENCES doctors(doctor_uuid),
            patient_name TEXT NOT NULL,
            bht TEXT,
            surgery TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS progress_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_uuid TEXT UNIQUE NOT NULL,
            record_uuid TEXT NOT NULL REFERENCES surgery_records(record_uuid) ON DELETE CASCADE,
            notes TEXT NOT NULL,
            images TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_hospitals_doctor ON hospitals(doctor_uuid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_income_hospital ON income_records(hospital_uuid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_surgery_doctor ON surgery_records(doctor_uuid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_record ON progress_entries(record_uuid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW HELPERS
// ============================================================================

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = LedgerError>,
{
    value
        .parse()
        .map_err(|e: LedgerError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_doctor(row: &Row) -> rusqlite::Result<Doctor> {
    let plan: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(Doctor {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        subscription: Subscription {
            plan: parse_column(3, &plan)?,
            status: parse_column(4, &status)?,
        },
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn row_to_ledger_entry(row: &Row) -> rusqlite::Result<LedgerEntry> {
    let kind: String = row.get(1)?;
    let date: String = row.get(2)?;
    let created_at: String = row.get(7)?;

    let record = match kind.as_str() {
        "channeling" => IncomeRecord::Channeling {
            date,
            patient_count: row.get(3)?,
            income: row.get(4)?,
        },
        _ => IncomeRecord::Surgical {
            date,
            bht: row.get(5)?,
            amount: row.get(6)?,
        },
    };

    Ok(LedgerEntry {
        id: RecordId::from(row.get::<_, String>(0)?),
        record,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

fn row_to_progress_entry(row: &Row) -> rusqlite::Result<ProgressEntry> {
    let images_json: String = row.get(2)?;
    let created_at: String = row.get(3)?;

    Ok(ProgressEntry {
        id: row.get(0)?,
        notes: row.get(1)?,
        images: serde_json::from_str(&images_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
        })?,
        created_at: parse_timestamp(3, &created_at)?,
    })
}

// ============================================================================
// DOCTORS
// ============================================================================

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO doctors (doctor_uuid, name, email, plan, subscription_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doctor.id,
            doctor.name,
            doctor.email,
            doctor.subscription.plan.as_str(),
            doctor.subscription.status.as_str(),
            doctor.created_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

pub fn get_doctor(conn: &Connection, doctor_id: &str) -> LedgerResult<Doctor> {
    conn.query_row(
        "SELECT doctor_uuid, name, email, plan, subscription_status, created_at
         FROM doctors WHERE doctor_uuid = ?1",
        [doctor_id],
        row_to_doctor,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("Doctor", doctor_id))
}

pub fn update_subscription(
    conn: &Connection,
    doctor_id: &str,
    subscription: &Subscription,
) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE doctors SET plan = ?1, subscription_status = ?2 WHERE doctor_uuid = ?3",
        params![
            subscription.plan.as_str(),
            subscription.status.as_str(),
            doctor_id
        ],
    )?;

    if changed == 0 {
        return Err(LedgerError::not_found("Doctor", doctor_id));
    }
    Ok(())
}

// ============================================================================
// HOSPITALS & INCOME RECORDS
// ============================================================================

/// Insert a hospital together with any records already in its ledger
pub fn insert_hospital(conn: &Connection, hospital: &Hospital) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO hospitals (hospital_uuid, doctor_uuid, name, wht_enabled, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            hospital.id,
            hospital.doctor_id,
            hospital.name,
            hospital.wht_enabled,
            hospital.created_at.to_rfc3339(),
        ],
    )?;

    // Oldest first so that row order keeps the ledger's newest-first reading
    let entries: Vec<&LedgerEntry> = hospital.records.iter().collect();
    for entry in entries.into_iter().rev() {
        insert_income_record(conn, &hospital.id, entry, None)?;
    }

    Ok(())
}

fn load_ledger(conn: &Connection, hospital_id: &str) -> LedgerResult<RecordLedger> {
    let mut stmt = conn.prepare(
        "SELECT record_uuid, kind, date, patient_count, income, bht, amount, created_at
         FROM income_records
         WHERE hospital_uuid = ?1
         ORDER BY id DESC",
    )?;

    let entries = stmt
        .query_map([hospital_id], row_to_ledger_entry)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RecordLedger::from_entries(entries))
}

/// Load one of the doctor's hospitals with its full ledger.
/// A hospital owned by another doctor is reported as not found.
pub fn get_hospital(conn: &Connection, doctor_id: &str, hospital_id: &str) -> LedgerResult<Hospital> {
    let row = conn
        .query_row(
            "SELECT hospital_uuid, doctor_uuid, name, wht_enabled, created_at
             FROM hospitals WHERE hospital_uuid = ?1 AND doctor_uuid = ?2",
            params![hospital_id, doctor_id],
            |row| {
                let created_at: String = row.get(4)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    parse_timestamp(4, &created_at)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("Hospital", hospital_id))?;

    let (id, doctor_id, name, wht_enabled, created_at) = row;
    let records = load_ledger(conn, &id)?;

    Ok(Hospital {
        id,
        doctor_id,
        name,
        wht_enabled,
        records,
        created_at,
    })
}

pub fn get_hospitals_for_doctor(conn: &Connection, doctor_id: &str) -> LedgerResult<Vec<Hospital>> {
    let mut stmt = conn.prepare(
        "SELECT hospital_uuid FROM hospitals WHERE doctor_uuid = ?1 ORDER BY id",
    )?;

    let ids = stmt
        .query_map([doctor_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    ids.iter()
        .map(|id| get_hospital(conn, doctor_id, id))
        .collect()
}

pub fn count_hospitals(conn: &Connection, doctor_id: &str) -> LedgerResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM hospitals WHERE doctor_uuid = ?1",
        [doctor_id],
        |row| row.get(0),
    )?;

    Ok(count as usize)
}

pub fn update_hospital(
    conn: &Connection,
    doctor_id: &str,
    hospital_id: &str,
    name: Option<&str>,
    wht_enabled: Option<bool>,
) -> LedgerResult<()> {
    let changed = conn.execute(
        "UPDATE hospitals
         SET name = COALESCE(?1, name),
             wht_enabled = COALESCE(?2, wht_enabled)
         WHERE hospital_uuid = ?3 AND doctor_uuid = ?4",
        params![name, wht_enabled, hospital_id, doctor_id],
    )?;

    if changed == 0 {
        return Err(LedgerError::not_found("Hospital", hospital_id));
    }
    Ok(())
}

pub fn delete_hospital(conn: &Connection, doctor_id: &str, hospital_id: &str) -> LedgerResult<()> {
    // Ownership first, so another doctor's hospital keeps its records
    get_hospital(conn, doctor_id, hospital_id)?;

    conn.execute(
        "DELETE FROM income_records WHERE hospital_uuid = ?1",
        [hospital_id],
    )?;
    conn.execute(
        "DELETE FROM hospitals WHERE hospital_uuid = ?1 AND doctor_uuid = ?2",
        params![hospital_id, doctor_id],
    )?;

    Ok(())
}

/// Insert one ledger entry. Returns false when `idempotency_hash` is already
/// present (a duplicate import), true otherwise.
pub fn insert_income_record(
    conn: &Connection,
    hospital_id: &str,
    entry: &LedgerEntry,
    idempotency_hash: Option<&str>,
) -> LedgerResult<bool> {
    let (patient_count, income, bht, amount) = match &entry.record {
        IncomeRecord::Channeling {
            patient_count,
            income,
            ..
        } => (*patient_count, *income, None, None),
        IncomeRecord::Surgical { bht, amount, .. } => (None, None, bht.clone(), *amount),
    };

    let result = conn.execute(
        "INSERT INTO income_records (
            record_uuid, hospital_uuid, kind, date, patient_count, income, bht, amount,
            idempotency_hash, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id.as_str(),
            hospital_id,
            entry.record.kind(),
            entry.record.date(),
            patient_count,
            income,
            bht,
            amount,
            idempotency_hash,
            entry.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation && idempotency_hash.is_some() =>
        {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM income_records WHERE idempotency_hash = ?1)",
                [idempotency_hash],
                |row| row.get(0),
            )?;
            if exists {
                Ok(false)
            } else {
                Err(rusqlite::Error::SqliteFailure(err, None).into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete a record from a hospital ledger. Returns whether a row was removed.
pub fn delete_income_record(
    conn: &Connection,
    hospital_id: &str,
    record_id: &RecordId,
) -> LedgerResult<bool> {
    let changed = conn.execute(
        "DELETE FROM income_records WHERE hospital_uuid = ?1 AND record_uuid = ?2",
        params![hospital_id, record_id.as_str()],
    )?;

    Ok(changed > 0)
}

// ============================================================================
// SURGERY RECORDS & PROGRESS ENTRIES
// ============================================================================

pub fn insert_surgery_record(conn: &Connection, record: &SurgeryRecord) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO surgery_records (record_uuid, doctor_uuid, patient_name, bht, surgery, date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.doctor_id,
            record.patient_name,
            record.bht,
            record.surgery,
            record.date,
            record.created_at.to_rfc3339(),
        ],
    )?;

    for entry in record.entries.iter().rev() {
        insert_progress_entry(conn, &record.id, entry)?;
    }

    Ok(())
}

pub fn insert_progress_entry(conn: &Connection, record_id: &str, entry: &ProgressEntry) -> LedgerResult<()> {
    let images_json = serde_json::to_string(&entry.images)?;

    conn.execute(
        "INSERT INTO progress_entries (entry_uuid, record_uuid, notes, images, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.id,
            record_id,
            entry.notes,
            images_json,
            entry.created_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

fn load_progress_entries(conn: &Connection, record_id: &str) -> LedgerResult<Vec<ProgressEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entry_uuid, notes, images, created_at
         FROM progress_entries
         WHERE record_uuid = ?1
         ORDER BY id DESC",
    )?;

    let entries = stmt
        .query_map([record_id], row_to_progress_entry)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

pub fn get_surgery_record(conn: &Connection, doctor_id: &str, record_id: &str) -> LedgerResult<SurgeryRecord> {
    let mut record = conn
        .query_row(
            "SELECT record_uuid, doctor_uuid, patient_name, bht, surgery, date, created_at
             FROM surgery_records WHERE record_uuid = ?1 AND doctor_uuid = ?2",
            params![record_id, doctor_id],
            |row| {
                let created_at: String = row.get(6)?;
                Ok(SurgeryRecord {
                    id: row.get(0)?,
                    doctor_id: row.get(1)?,
                    patient_name: row.get(2)?,
                    bht: row.get(3)?,
                    surgery: row.get(4)?,
                    date: row.get(5)?,
                    entries: Vec::new(),
                    created_at: parse_timestamp(6, &created_at)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| LedgerError::not_found("SurgeryRecord", record_id))?;

    record.entries = load_progress_entries(conn, &record.id)?;
    Ok(record)
}

/// All of a doctor's surgery records, newest first
pub fn get_surgery_records_for_doctor(conn: &Connection, doctor_id: &str) -> LedgerResult<Vec<SurgeryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT record_uuid FROM surgery_records WHERE doctor_uuid = ?1 ORDER BY id DESC",
    )?;

    let ids = stmt
        .query_map([doctor_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    ids.iter()
        .map(|id| get_surgery_record(conn, doctor_id, id))
        .collect()
}

pub fn count_surgery_records(conn: &Connection, doctor_id: &str) -> LedgerResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM surgery_records WHERE doctor_uuid = ?1",
        [doctor_id],
        |row| row.get(0),
    )?;

    Ok(count as usize)
}

/// Entry count of one of the doctor's surgery records
pub fn count_progress_entries(conn: &Connection, doctor_id: &str, record_id: &str) -> LedgerResult<usize> {
    let owned: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM surgery_records WHERE record_uuid = ?1 AND doctor_uuid = ?2)",
        params![record_id, doctor_id],
        |row| row.get(0),
    )?;

    if !owned {
        return Err(LedgerError::not_found("SurgeryRecord", record_id));
    }

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM progress_entries WHERE record_uuid = ?1",
        [record_id],
        |row| row.get(0),
    )?;

    Ok(count as usize)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> LedgerResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> LedgerResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_timestamp(1, &timestamp_str)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{NewIncomeRecord, NewSurgeryRecord, Plan, SubscriptionStatus};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn test_doctor(conn: &Connection) -> Doctor {
        let doctor = Doctor::new("Dr. Test".to_string(), "test@example.com".to_string());
        insert_doctor(conn, &doctor).unwrap();
        doctor
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_doctor_round_trip_and_subscription() {
        let conn = test_db();
        let doctor = test_doctor(&conn);

        let loaded = get_doctor(&conn, &doctor.id).unwrap();
        assert_eq!(loaded.name, "Dr. Test");
        assert_eq!(loaded.plan(), Plan::Free);

        update_subscription(&conn, &doctor.id, &Subscription::premium()).unwrap();
        let upgraded = get_doctor(&conn, &doctor.id).unwrap();
        assert_eq!(upgraded.plan(), Plan::Premium);
        assert_eq!(upgraded.subscription.status, SubscriptionStatus::Active);

    }

    #[test]
    fn test_missing_doctor() {
        let conn = test_db();
        assert!(get_doctor(&conn, "nobody").unwrap_err().is_not_found());
        assert!(update_subscription(&conn, "nobody", &Subscription::free())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_ledger_persists_newest_first() {
        let conn = test_db();
        let doctor = test_doctor(&conn);

        let mut hospital = Hospital::new(&doctor.id, "Central".to_string(), true);
        hospital
            .add_record(NewIncomeRecord::channeling("2024-01-01", Some(5), Some(500.0)))
            .unwrap();
        hospital
            .add_record(NewIncomeRecord::surgical("2024-01-02", Some("B-3"), Some(9000.0)))
            .unwrap();
        insert_hospital(&conn, &hospital).unwrap();

        let loaded = get_hospital(&conn, &doctor.id, &hospital.id).unwrap();
        assert_eq!(loaded.records, hospital.records);
        assert!(loaded.wht_enabled);

        let entry = LedgerEntry::new(IncomeRecord::Channeling {
            date: "2024-01-03".to_string(),
            patient_count: None,
            income: None,
        });
        assert!(insert_income_record(&conn, &hospital.id, &entry, None).unwrap());

        let reloaded = get_hospital(&conn, &doctor.id, &hospital.id).unwrap();
        assert_eq!(reloaded.records.len(), 3);
        assert_eq!(reloaded.records.iter().next().unwrap().id, entry.id);
    }

    #[test]
    fn test_hospital_scoped_to_owner() {
        let conn = test_db();
        let owner = test_doctor(&conn);
        let other = test_doctor(&conn);

        let hospital = Hospital::new(&owner.id, "Private".to_string(), false);
        insert_hospital(&conn, &hospital).unwrap();

        assert!(get_hospital(&conn, &other.id, &hospital.id).unwrap_err().is_not_found());
        assert!(delete_hospital(&conn, &other.id, &hospital.id).unwrap_err().is_not_found());
        assert_eq!(get_hospitals_for_doctor(&conn, &other.id).unwrap().len(), 0);
        assert_eq!(get_hospitals_for_doctor(&conn, &owner.id).unwrap().len(), 1);
    }

    #[test]
    fn test_update_and_delete_hospital() {
        let conn = test_db();
        let doctor = test_doctor(&conn);

        let mut hospital = Hospital::new(&doctor.id, "Old Name".to_string(), false);
        hospital
            .add_record(NewIncomeRecord::channeling("2024-01-01", None, Some(10.0)))
            .unwrap();
        insert_hospital(&conn, &hospital).unwrap();

        update_hospital(&conn, &doctor.id, &hospital.id, None, Some(true)).unwrap();
        let loaded = get_hospital(&conn, &doctor.id, &hospital.id).unwrap();
        assert_eq!(loaded.name, "Old Name");
        assert!(loaded.wht_enabled);

        update_hospital(&conn, &doctor.id, &hospital.id, Some("New Name"), None).unwrap();
        assert_eq!(get_hospital(&conn, &doctor.id, &hospital.id).unwrap().name, "New Name");

        delete_hospital(&conn, &doctor.id, &hospital.id).unwrap();
        assert_eq!(count_hospitals(&conn, &doctor.id).unwrap(), 0);
        let orphaned: i64 = conn
            .query_row("SELECT COUNT(*) FROM income_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphaned, 0);
    }

    #[test]
    fn test_delete_income_record() {
        let conn = test_db();
        let doctor = test_doctor(&conn);

        let mut hospital = Hospital::new(&doctor.id, "H".to_string(), false);
        let id = hospital
            .add_record(NewIncomeRecord::surgical("2024-01-01", None, Some(1.0)))
            .unwrap()
            .id
            .clone();
        insert_hospital(&conn, &hospital).unwrap();

        assert!(delete_income_record(&conn, &hospital.id, &id).unwrap());
        assert!(!delete_income_record(&conn, &hospital.id, &id).unwrap());
    }

    #[test]
    fn test_duplicate_hash_skipped() {
        let conn = test_db();
        let doctor = test_doctor(&conn);
        let hospital = Hospital::new(&doctor.id, "H".to_string(), false);
        insert_hospital(&conn, &hospital).unwrap();

        let record = IncomeRecord::Surgical {
            date: "2024-02-02".to_string(),
            bht: Some("B-1".to_string()),
            amount: Some(100.0),
        };

        let first = LedgerEntry::new(record.clone());
        let second = LedgerEntry::new(record);
        assert!(insert_income_record(&conn, &hospital.id, &first, Some("hash-1")).unwrap());
        assert!(!insert_income_record(&conn, &hospital.id, &second, Some("hash-1")).unwrap());
    }

    #[test]
    fn test_surgery_records_and_entries() {
        let conn = test_db();
        let doctor = test_doctor(&conn);

        let record = SurgeryRecord::new(
            &doctor.id,
            NewSurgeryRecord {
                patient_name: "A. Patient".to_string(),
                bht: Some("BHT-1".to_string()),
                surgery: "Cholecystectomy".to_string(),
                date: Some("2024-04-04".to_string()),
            },
        );
        insert_surgery_record(&conn, &record).unwrap();

        insert_progress_entry(&conn, &record.id, &ProgressEntry::new("first".to_string(), vec![])).unwrap();
        insert_progress_entry(
            &conn,
            &record.id,
            &ProgressEntry::new("second".to_string(), vec!["scan.png".to_string()]),
        )
        .unwrap();

        let loaded = get_surgery_record(&conn, &doctor.id, &record.id).unwrap();
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded.entries[0].notes, "second");
        assert_eq!(loaded.entries[0].images, vec!["scan.png".to_string()]);

        assert_eq!(count_surgery_records(&conn, &doctor.id).unwrap(), 1);
        assert_eq!(count_progress_entries(&conn, &doctor.id, &record.id).unwrap(), 2);
        assert!(count_progress_entries(&conn, "someone-else", &record.id)
            .unwrap_err()
            .is_not_found());
        assert_eq!(get_surgery_records_for_doctor(&conn, &doctor.id).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_images_column_is_an_error() {
        let conn = test_db();
        let doctor = test_doctor(&conn);
        let record = SurgeryRecord::new(
            &doctor.id,
            NewSurgeryRecord {
                patient_name: "B. Patient".to_string(),
                ..Default::default()
            },
        );
        insert_surgery_record(&conn, &record).unwrap();
        insert_progress_entry(
            &conn,
            &record.id,
            &ProgressEntry::new("x-ray".to_string(), vec!["xray.png".to_string()]),
        )
        .unwrap();

        conn.execute("UPDATE progress_entries SET images = 'not json'", [])
            .unwrap();

        match get_surgery_record(&conn, &doctor.id, &record.id) {
            Err(LedgerError::Database(rusqlite::Error::FromSqlConversionFailure(idx, _, _))) => {
                assert_eq!(idx, 2)
            }
            other => panic!("expected conversion failure, got {:?}", other),
        }
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "record_added",
            "hospital",
            "hospital-123",
            serde_json::json!({"kind": "channeling"}),
            "doctor-1",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "hospital", "hospital-123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "record_added");
        assert_eq!(events[0].actor, "doctor-1");
    }
}

// 📊 Finance Service - doctor-scoped operations over an injected store handle
//
// Every operation takes the acting doctor's id and only touches that
// doctor's hospitals and surgery records. Quota-gated inserts run the plan
// check and the insert inside one IMMEDIATE transaction, so concurrent
// requests from the same doctor cannot push a free account over quota.

use std::collections::HashMap;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::{self, Event};
use crate::entities::{
    Doctor, Hospital, LedgerEntry, NewIncomeRecord, NewProgressEntry, NewSurgeryRecord,
    ProgressEntry, RecordId, Subscription, SurgeryRecord,
};
use crate::error::{LedgerError, LedgerResult};
use crate::finance::{round_for_display, summarize_hospital, HospitalOverview};
use crate::import::{compute_idempotency_hash, ImportReport};
use crate::plan_limits::{check_plan_limit, PlanAction, PlanLimits};

/// Doctor dashboard rollup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Total payable income across all hospitals, rounded once
    pub income: f64,
    /// Number of surgery records
    pub records: usize,
}

pub struct FinanceService<'a> {
    conn: &'a Connection,
    limits: PlanLimits,
}

impl<'a> FinanceService<'a> {
    pub fn new(conn: &'a Connection, limits: PlanLimits) -> Self {
        FinanceService { conn, limits }
    }

    /// Run `f` in a write transaction; rolled back if `f` fails
    fn in_transaction<T>(&self, f: impl FnOnce(&Connection) -> LedgerResult<T>) -> LedgerResult<T> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Count-and-insert under one transaction: the quota read and the write
    /// see the same state.
    fn guarded<T>(
        &self,
        doctor_id: &str,
        action: PlanAction,
        f: impl FnOnce(&Connection) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        self.in_transaction(|conn| {
            check_plan_limit(conn, doctor_id, &action, &self.limits)?.into_result()?;
            f(conn)
        })
    }

    fn hospital_name(name: &str) -> LedgerResult<&str> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidInput("hospital name is required".to_string()));
        }
        Ok(name)
    }

    // ========================================================================
    // DOCTORS & SUBSCRIPTIONS
    // ========================================================================

    pub fn register_doctor(&self, name: &str, email: &str) -> LedgerResult<Doctor> {
        let doctor = Doctor::new(name.trim().to_string(), email.trim().to_string());

        self.in_transaction(|conn| {
            db::insert_doctor(conn, &doctor)?;
            db::insert_event(
                conn,
                &Event::new(
                    "doctor_registered",
                    "doctor",
                    &doctor.id,
                    serde_json::json!({ "plan": doctor.subscription.plan }),
                    &doctor.id,
                ),
            )
        })?;

        info!(doctor_id = %doctor.id, "doctor registered");
        Ok(doctor)
    }

    pub fn doctor(&self, doctor_id: &str) -> LedgerResult<Doctor> {
        db::get_doctor(self.conn, doctor_id)
    }

    /// Apply a subscription change (payment confirmed or cancelled)
    pub fn set_subscription(&self, doctor_id: &str, subscription: Subscription) -> LedgerResult<Doctor> {
        self.in_transaction(|conn| {
            db::update_subscription(conn, doctor_id, &subscription)?;
            db::insert_event(
                conn,
                &Event::new(
                    "subscription_changed",
                    "doctor",
                    doctor_id,
                    serde_json::to_value(subscription)?,
                    doctor_id,
                ),
            )
        })?;

        info!(doctor_id, plan = %subscription.plan, "subscription changed");
        self.doctor(doctor_id)
    }

    // ========================================================================
    // HOSPITAL LEDGERS
    // ========================================================================

    /// One summary row per hospital
    pub fn finance_overview(&self, doctor_id: &str) -> LedgerResult<Vec<HospitalOverview>> {
        let hospitals = self.hospitals(doctor_id)?;

        Ok(hospitals.iter().map(HospitalOverview::from).collect())
    }

    /// Full ledgers, in creation order
    pub fn hospitals(&self, doctor_id: &str) -> LedgerResult<Vec<Hospital>> {
        db::get_doctor(self.conn, doctor_id)?;
        db::get_hospitals_for_doctor(self.conn, doctor_id)
    }

    pub fn hospital(&self, doctor_id: &str, hospital_id: &str) -> LedgerResult<Hospital> {
        db::get_hospital(self.conn, doctor_id, hospital_id)
    }

    pub fn add_hospital(&self, doctor_id: &str, name: &str, wht_enabled: bool) -> LedgerResult<Hospital> {
        let hospital = Hospital::new(doctor_id, Self::hospital_name(name)?.to_string(), wht_enabled);

        self.guarded(doctor_id, PlanAction::AddHospital, |conn| {
            db::insert_hospital(conn, &hospital)?;
            db::insert_event(
                conn,
                &Event::new(
                    "hospital_added",
                    "hospital",
                    &hospital.id,
                    serde_json::json!({ "name": hospital.name, "whtEnabled": wht_enabled }),
                    doctor_id,
                ),
            )
        })?;

        info!(doctor_id, hospital_id = %hospital.id, "hospital added");
        Ok(hospital)
    }

    pub fn update_hospital(
        &self,
        doctor_id: &str,
        hospital_id: &str,
        name: Option<&str>,
        wht_enabled: Option<bool>,
    ) -> LedgerResult<Hospital> {
        let name = name.map(Self::hospital_name).transpose()?;

        self.in_transaction(|conn| {
            db::update_hospital(conn, doctor_id, hospital_id, name, wht_enabled)?;
            db::insert_event(
                conn,
                &Event::new(
                    "hospital_updated",
                    "hospital",
                    hospital_id,
                    serde_json::json!({ "name": name, "whtEnabled": wht_enabled }),
                    doctor_id,
                ),
            )
        })?;

        self.hospital(doctor_id, hospital_id)
    }

    pub fn delete_hospital(&self, doctor_id: &str, hospital_id: &str) -> LedgerResult<()> {
        self.in_transaction(|conn| {
            db::delete_hospital(conn, doctor_id, hospital_id)?;
            db::insert_event(
                conn,
                &Event::new("hospital_deleted", "hospital", hospital_id, serde_json::json!({}), doctor_id),
            )
        })?;

        info!(doctor_id, hospital_id, "hospital deleted");
        Ok(())
    }

    /// Add an income record to the front of a hospital ledger
    pub fn add_record(
        &self,
        doctor_id: &str,
        hospital_id: &str,
        new_record: NewIncomeRecord,
    ) -> LedgerResult<Hospital> {
        let mut hospital = db::get_hospital(self.conn, doctor_id, hospital_id)?;
        let entry: LedgerEntry = hospital.add_record(new_record)?.clone();

        self.in_transaction(|conn| {
            db::insert_income_record(conn, hospital_id, &entry, None)?;
            db::insert_event(
                conn,
                &Event::new(
                    "record_added",
                    "hospital",
                    hospital_id,
                    serde_json::json!({
                        "recordId": entry.id,
                        "kind": entry.record.kind(),
                        "value": entry.record.value(),
                    }),
                    doctor_id,
                ),
            )
        })?;

        debug!(doctor_id, hospital_id, record_id = %entry.id, "income record added");
        Ok(hospital)
    }

    /// Remove a record by id. An unknown record id is not an error: the
    /// hospital is returned unchanged.
    pub fn delete_record(
        &self,
        doctor_id: &str,
        hospital_id: &str,
        record_id: &RecordId,
    ) -> LedgerResult<Hospital> {
        let mut hospital = db::get_hospital(self.conn, doctor_id, hospital_id)?;

        if hospital.delete_record(record_id).is_none() {
            return Ok(hospital);
        }

        self.in_transaction(|conn| {
            db::delete_income_record(conn, hospital_id, record_id)?;
            db::insert_event(
                conn,
                &Event::new(
                    "record_deleted",
                    "hospital",
                    hospital_id,
                    serde_json::json!({ "recordId": record_id }),
                    doctor_id,
                ),
            )
        })?;

        debug!(doctor_id, hospital_id, record_id = %record_id, "income record deleted");
        Ok(hospital)
    }

    /// Bulk insert records into one hospital ledger, in file order (the
    /// last row ends up newest). Re-imported rows are skipped by hash;
    /// rows with an unknown kind are counted and skipped.
    pub fn import_records(
        &self,
        doctor_id: &str,
        hospital_id: &str,
        rows: Vec<NewIncomeRecord>,
    ) -> LedgerResult<ImportReport> {
        db::get_hospital(self.conn, doctor_id, hospital_id)?;

        let report = self.in_transaction(|conn| {
            let mut report = ImportReport::default();
            let mut seen: HashMap<String, usize> = HashMap::new();

            for row in rows {
                let record = match row.into_record() {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(hospital_id, error = %e, "skipping import row");
                        report.rejected += 1;
                        continue;
                    }
                };

                let occurrence = seen
                    .entry(compute_idempotency_hash(hospital_id, &record, 0))
                    .or_insert(0);
                let hash = compute_idempotency_hash(hospital_id, &record, *occurrence);
                *occurrence += 1;
                if db::insert_income_record(conn, hospital_id, &LedgerEntry::new(record), Some(&hash))? {
                    report.inserted += 1;
                } else {
                    report.duplicates += 1;
                }
            }

            db::insert_event(
                conn,
                &Event::new(
                    "records_imported",
                    "hospital",
                    hospital_id,
                    serde_json::to_value(&report)?,
                    doctor_id,
                ),
            )?;
            Ok(report)
        })?;

        info!(
            doctor_id,
            hospital_id,
            inserted = report.inserted,
            duplicates = report.duplicates,
            rejected = report.rejected,
            "import finished"
        );
        Ok(report)
    }

    // ========================================================================
    // SURGERY RECORDS
    // ========================================================================

    pub fn surgery_records(&self, doctor_id: &str) -> LedgerResult<Vec<SurgeryRecord>> {
        db::get_doctor(self.conn, doctor_id)?;
        db::get_surgery_records_for_doctor(self.conn, doctor_id)
    }

    pub fn surgery_record(&self, doctor_id: &str, record_id: &str) -> LedgerResult<SurgeryRecord> {
        db::get_surgery_record(self.conn, doctor_id, record_id)
    }

    pub fn create_surgery_record(
        &self,
        doctor_id: &str,
        details: NewSurgeryRecord,
    ) -> LedgerResult<SurgeryRecord> {
        let record = SurgeryRecord::new(doctor_id, details);

        self.guarded(doctor_id, PlanAction::CreateRecord, |conn| {
            db::insert_surgery_record(conn, &record)?;
            db::insert_event(
                conn,
                &Event::new(
                    "surgery_record_created",
                    "surgery_record",
                    &record.id,
                    serde_json::json!({ "patientName": record.patient_name }),
                    doctor_id,
                ),
            )
        })?;

        info!(doctor_id, record_id = %record.id, "surgery record created");
        Ok(record)
    }

    pub fn add_entry(
        &self,
        doctor_id: &str,
        record_id: &str,
        new_entry: NewProgressEntry,
    ) -> LedgerResult<SurgeryRecord> {
        let entry = ProgressEntry::new(new_entry.notes, new_entry.images);
        let action = PlanAction::AddEntry {
            record_id: record_id.to_string(),
        };

        let mut record = self.guarded(doctor_id, action, |conn| {
            // Premium skips the entry count, so ownership is checked here for every plan
            let record = db::get_surgery_record(conn, doctor_id, record_id)?;
            db::insert_progress_entry(conn, record_id, &entry)?;
            db::insert_event(
                conn,
                &Event::new(
                    "entry_added",
                    "surgery_record",
                    record_id,
                    serde_json::json!({ "entryId": entry.id, "images": entry.images.len() }),
                    doctor_id,
                ),
            )?;
            Ok(record)
        })?;

        debug!(doctor_id, record_id, entry_id = %entry.id, "progress entry added");
        record.add_entry(entry);
        Ok(record)
    }

    // ========================================================================
    // DASHBOARD
    // ========================================================================

    /// Total payable income is summed unrounded across hospitals and
    /// rounded once at the end.
    pub fn dashboard_stats(&self, doctor_id: &str) -> LedgerResult<DashboardStats> {
        db::get_doctor(self.conn, doctor_id)?;

        let hospitals = db::get_hospitals_for_doctor(self.conn, doctor_id)?;
        let total: f64 = hospitals
            .iter()
            .map(|h| summarize_hospital(h).total_payable)
            .sum();

        Ok(DashboardStats {
            income: round_for_display(total),
            records: db::count_surgery_records(self.conn, doctor_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, setup_database};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn premium_doctor(service: &FinanceService) -> Doctor {
        let doctor = service.register_doctor("Dr. Premium", "p@example.com").unwrap();
        service.set_subscription(&doctor.id, Subscription::premium()).unwrap()
    }

    fn new_record(patient: &str) -> NewSurgeryRecord {
        NewSurgeryRecord {
            patient_name: patient.to_string(),
            surgery: "Hernia repair".to_string(),
            ..Default::default()
        }
    }

    fn entry(notes: &str) -> NewProgressEntry {
        NewProgressEntry {
            notes: notes.to_string(),
            images: vec![],
        }
    }

    #[test]
    fn test_dashboard_rounds_grand_total_once() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = premium_doctor(&service);

        let a = service.add_hospital(&doctor.id, "A", false).unwrap();
        let b = service.add_hospital(&doctor.id, "B", false).unwrap();
        service
            .add_record(&doctor.id, &a.id, NewIncomeRecord::channeling("2024-01-01", None, Some(1000.40)))
            .unwrap();
        service
            .add_record(&doctor.id, &b.id, NewIncomeRecord::surgical("2024-01-01", None, Some(2000.40)))
            .unwrap();

        let stats = service.dashboard_stats(&doctor.id).unwrap();
        assert_eq!(stats.income, 3001.0);

        let per_hospital: f64 = service
            .finance_overview(&doctor.id)
            .unwrap()
            .iter()
            .map(|row| row.total_payable.round())
            .sum();
        assert_ne!(stats.income, per_hospital);
    }

    #[test]
    fn test_dashboard_empty_and_record_count() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Empty", "e@example.com").unwrap();

        assert_eq!(
            service.dashboard_stats(&doctor.id).unwrap(),
            DashboardStats { income: 0.0, records: 0 }
        );

        service.create_surgery_record(&doctor.id, new_record("P1")).unwrap();
        service.create_surgery_record(&doctor.id, new_record("P2")).unwrap();
        assert_eq!(service.dashboard_stats(&doctor.id).unwrap().records, 2);
    }

    #[test]
    fn test_dashboard_applies_wht() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Tax", "t@example.com").unwrap();

        let h = service.add_hospital(&doctor.id, "Taxed", true).unwrap();
        service
            .add_record(&doctor.id, &h.id, NewIncomeRecord::channeling("2024-01-01", Some(20), Some(10000.0)))
            .unwrap();
        service
            .add_record(&doctor.id, &h.id, NewIncomeRecord::surgical("2024-01-02", Some("B-1"), Some(5000.0)))
            .unwrap();

        assert_eq!(service.dashboard_stats(&doctor.id).unwrap().income, 14250.0);
        let overview = service.finance_overview(&doctor.id).unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].channeling_income, 10000.0);
        assert_eq!(overview[0].surgical_income, 5000.0);
    }

    #[test]
    fn test_unknown_doctor_is_not_found() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());

        assert!(service.dashboard_stats("ghost").unwrap_err().is_not_found());
        assert!(service.finance_overview("ghost").unwrap_err().is_not_found());
        assert!(service.add_hospital("ghost", "X", false).unwrap_err().is_not_found());
    }

    #[test]
    fn test_free_plan_hospital_quota() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Free", "free@example.com").unwrap();

        service.add_hospital(&doctor.id, "First", false).unwrap();
        let err = service.add_hospital(&doctor.id, "Second", false).unwrap_err();

        match err {
            LedgerError::QuotaExceeded { upgrade_required, .. } => assert!(upgrade_required),
            other => panic!("expected quota error, got {:?}", other),
        }
        assert_eq!(service.finance_overview(&doctor.id).unwrap().len(), 1);
    }

    #[test]
    fn test_free_plan_surgery_record_quota() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Free", "free@example.com").unwrap();

        for i in 0..4 {
            service
                .create_surgery_record(&doctor.id, new_record(&format!("P{}", i)))
                .unwrap();
        }
        let err = service.create_surgery_record(&doctor.id, new_record("P5")).unwrap_err();
        assert!(err.is_quota_exceeded());

        // Upgrading lifts the limit
        service.set_subscription(&doctor.id, Subscription::premium()).unwrap();
        service.create_surgery_record(&doctor.id, new_record("P5")).unwrap();
        assert_eq!(service.surgery_records(&doctor.id).unwrap().len(), 5);
    }

    #[test]
    fn test_free_plan_entry_quota() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Free", "free@example.com").unwrap();
        let record = service.create_surgery_record(&doctor.id, new_record("P")).unwrap();

        for i in 0..3 {
            service
                .add_entry(&doctor.id, &record.id, entry(&format!("day {}", i)))
                .unwrap();
        }
        assert!(service
            .add_entry(&doctor.id, &record.id, entry("day 4"))
            .unwrap_err()
            .is_quota_exceeded());

        let loaded = service.surgery_record(&doctor.id, &record.id).unwrap();
        assert_eq!(loaded.entries.len(), 3);
        assert_eq!(loaded.entries[0].notes, "day 2");
    }

    #[test]
    fn test_add_entry_to_foreign_record_not_found() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let owner = service.register_doctor("Dr. Owner", "o@example.com").unwrap();
        let other = service.register_doctor("Dr. Other", "x@example.com").unwrap();
        let record = service.create_surgery_record(&owner.id, new_record("P")).unwrap();

        assert!(service
            .add_entry(&other.id, &record.id, entry("sneaky"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_premium_add_entry_checks_record_owner() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let owner = service.register_doctor("Dr. Owner", "o@example.com").unwrap();
        let intruder = premium_doctor(&service);
        let record = service.create_surgery_record(&owner.id, new_record("P")).unwrap();

        assert!(service
            .add_entry(&intruder.id, &record.id, entry("sneaky"))
            .unwrap_err()
            .is_not_found());
        assert!(service
            .surgery_record(&owner.id, &record.id)
            .unwrap()
            .entries
            .is_empty());

        assert!(service
            .add_entry(&intruder.id, "missing", entry("nowhere"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_add_entry_returns_record_as_stored() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = premium_doctor(&service);
        let record = service.create_surgery_record(&doctor.id, new_record("P")).unwrap();

        service.add_entry(&doctor.id, &record.id, entry("day 1")).unwrap();
        let returned = service.add_entry(&doctor.id, &record.id, entry("day 2")).unwrap();
        let stored = service.surgery_record(&doctor.id, &record.id).unwrap();

        let ids = |r: &SurgeryRecord| r.entries.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(returned.entries[0].notes, "day 2");
        assert_eq!(ids(&returned), ids(&stored));
    }

    #[test]
    fn test_delete_missing_record_returns_unchanged_hospital() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. D", "d@example.com").unwrap();
        let h = service.add_hospital(&doctor.id, "H", false).unwrap();
        let with_record = service
            .add_record(&doctor.id, &h.id, NewIncomeRecord::channeling("2024-01-01", Some(1), Some(10.0)))
            .unwrap();

        let after = service
            .delete_record(&doctor.id, &h.id, &RecordId::from("missing"))
            .unwrap();
        assert_eq!(after.records, with_record.records);

        let id = with_record.records.iter().next().unwrap().id.clone();
        let emptied = service.delete_record(&doctor.id, &h.id, &id).unwrap();
        assert!(emptied.records.is_empty());
        assert!(service.hospital(&doctor.id, &h.id).unwrap().records.is_empty());
    }

    #[test]
    fn test_invalid_record_kind_rejected() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. D", "d@example.com").unwrap();
        let h = service.add_hospital(&doctor.id, "H", false).unwrap();

        let bad = NewIncomeRecord {
            kind: "lab".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            service.add_record(&doctor.id, &h.id, bad),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_update_hospital_toggles_wht() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. U", "u@example.com").unwrap();
        let h = service.add_hospital(&doctor.id, "H", false).unwrap();
        service
            .add_record(&doctor.id, &h.id, NewIncomeRecord::channeling("2024-01-01", None, Some(100.0)))
            .unwrap();

        let updated = service.update_hospital(&doctor.id, &h.id, None, Some(true)).unwrap();
        assert!(updated.wht_enabled);
        assert_eq!(service.finance_overview(&doctor.id).unwrap()[0].total_payable, 95.0);

        service.delete_hospital(&doctor.id, &h.id).unwrap();
        assert!(service.hospital(&doctor.id, &h.id).unwrap_err().is_not_found());
        // The freed slot can be reused on the free plan
        service.add_hospital(&doctor.id, "Replacement", false).unwrap();
    }

    #[test]
    fn test_hospital_name_must_not_be_blank() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. N", "n@example.com").unwrap();

        assert!(matches!(
            service.add_hospital(&doctor.id, "", false),
            Err(LedgerError::InvalidInput(_))
        ));

        let h = service.add_hospital(&doctor.id, "  Central  ", false).unwrap();
        assert_eq!(h.name, "Central");

        assert!(matches!(
            service.update_hospital(&doctor.id, &h.id, Some("   "), None),
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(service.hospital(&doctor.id, &h.id).unwrap().name, "Central");

        let renamed = service.update_hospital(&doctor.id, &h.id, Some("North"), None).unwrap();
        assert_eq!(renamed.name, "North");
    }

    #[test]
    fn test_mutations_are_audited() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Audit", "a@example.com").unwrap();
        let h = service.add_hospital(&doctor.id, "H", false).unwrap();
        service
            .add_record(&doctor.id, &h.id, NewIncomeRecord::surgical("2024-01-01", None, Some(1.0)))
            .unwrap();

        let events = get_events_for_entity(&conn, "hospital", &h.id).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["record_added", "hospital_added"]);
        assert!(events.iter().all(|e| e.actor == doctor.id));
    }

    #[test]
    fn test_denied_insert_rolls_back() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. R", "r@example.com").unwrap();
        service.add_hospital(&doctor.id, "Only", false).unwrap();
        let _ = service.add_hospital(&doctor.id, "Extra", false);

        let hospital_events: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE event_type = 'hospital_added'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hospital_events, 1);
    }

    #[test]
    fn test_import_is_idempotent() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Import", "i@example.com").unwrap();
        let h = service.add_hospital(&doctor.id, "H", false).unwrap();

        let rows = vec![
            NewIncomeRecord::channeling("2024-01-01", Some(10), Some(1000.0)),
            NewIncomeRecord::surgical("2024-01-02", Some("B-1"), Some(500.0)),
            NewIncomeRecord {
                kind: "refund".to_string(),
                ..Default::default()
            },
        ];

        let first = service.import_records(&doctor.id, &h.id, rows.clone()).unwrap();
        assert_eq!(
            first,
            ImportReport {
                inserted: 2,
                duplicates: 0,
                rejected: 1
            }
        );

        let second = service.import_records(&doctor.id, &h.id, rows).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);

        let hospital = service.hospital(&doctor.id, &h.id).unwrap();
        assert_eq!(hospital.records.len(), 2);
        assert_eq!(hospital.records.iter().next().unwrap().record.kind(), "surgical");
        assert_eq!(service.dashboard_stats(&doctor.id).unwrap().income, 1500.0);
    }

    #[test]
    fn test_import_keeps_repeated_identical_rows() {
        let conn = test_db();
        let service = FinanceService::new(&conn, PlanLimits::default());
        let doctor = service.register_doctor("Dr. Twice", "t@example.com").unwrap();
        let h = service.add_hospital(&doctor.id, "H", false).unwrap();

        let session = NewIncomeRecord::channeling("2024-01-01", Some(5), Some(200.0));
        let rows = vec![session.clone(), session];

        let first = service.import_records(&doctor.id, &h.id, rows.clone()).unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.duplicates, 0);

        let again = service.import_records(&doctor.id, &h.id, rows).unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 2);

        assert_eq!(service.hospital(&doctor.id, &h.id).unwrap().records.len(), 2);
        assert_eq!(service.dashboard_stats(&doctor.id).unwrap().income, 400.0);
    }

    #[test]
    fn test_concurrent_guarded_inserts_respect_quota() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");

        let doctor_id = {
            let conn = Connection::open(&path).unwrap();
            setup_database(&conn).unwrap();
            FinanceService::new(&conn, PlanLimits::default())
                .register_doctor("Dr. Race", "race@example.com")
                .unwrap()
                .id
        };

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let path = path.clone();
                let doctor_id = doctor_id.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let conn = Connection::open(&path).unwrap();
                    conn.busy_timeout(Duration::from_secs(10)).unwrap();
                    let service = FinanceService::new(&conn, PlanLimits::default());
                    barrier.wait();
                    service
                        .add_hospital(&doctor_id, &format!("Hospital {}", i), false)
                        .map(|h| h.id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let allowed = results.iter().filter(|r| r.is_ok()).count();
        let denied = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_quota_exceeded()))
            .count();

        assert_eq!((allowed, denied), (1, 1));

        let conn = Connection::open(&path).unwrap();
        assert_eq!(db::count_hospitals(&conn, &doctor_id).unwrap(), 1);
    }
}

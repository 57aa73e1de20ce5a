// 📥 CSV import of income records into one hospital ledger
//
// Expected header: kind,date,patient_count,income,bht,amount
// Empty cells are read as missing values. Each row gets an idempotency
// hash so importing the same file twice adds nothing the second time.
// Identical rows within one file are told apart by their occurrence number
// (first, second, ...), so two equal sessions on the same day both land.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::entities::{IncomeRecord, NewIncomeRecord};
use crate::error::LedgerResult;

#[derive(Debug, Clone, Deserialize)]
struct CsvRow {
    kind: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    patient_count: Option<u32>,
    #[serde(default)]
    income: Option<f64>,
    #[serde(default)]
    bht: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
}

impl From<CsvRow> for NewIncomeRecord {
    fn from(row: CsvRow) -> Self {
        NewIncomeRecord {
            kind: row.kind,
            date: row.date,
            patient_count: row.patient_count,
            income: row.income,
            bht: row.bht,
            amount: row.amount,
        }
    }
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub duplicates: usize,
    /// Rows whose kind was neither channeling nor surgical
    pub rejected: usize,
}

pub fn load_csv(csv_path: &Path) -> LedgerResult<Vec<NewIncomeRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let row: CsvRow = result?;
        records.push(row.into());
    }

    Ok(records)
}

/// Deduplication key for an imported record within a hospital.
/// Identity is the RecordId; this hash only detects re-imports.
/// `occurrence` counts earlier identical rows in the same file.
pub fn compute_idempotency_hash(hospital_id: &str, record: &IncomeRecord, occurrence: usize) -> String {
    let detail = match record {
        IncomeRecord::Channeling {
            patient_count,
            income,
            ..
        } => format!("{:?}|{:?}", patient_count, income),
        IncomeRecord::Surgical { bht, amount, .. } => format!("{:?}|{:?}", bht, amount),
    };

    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}",
        hospital_id,
        record.kind(),
        record.date(),
        detail,
        occurrence
    ));
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_csv_reads_both_kinds() {
        let file = write_csv(
            "kind,date,patient_count,income,bht,amount\n\
             channeling,2024-01-01,12,2400,,\n\
             surgical,2024-01-02,,,BHT-9,15000\n\
             channeling,2024-01-03,,,,\n",
        );

        let rows = load_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kind, "channeling");
        assert_eq!(rows[0].income, Some(2400.0));
        assert_eq!(rows[1].bht.as_deref(), Some("BHT-9"));
        assert_eq!(rows[1].amount, Some(15000.0));
        assert_eq!(rows[2].income, None);
    }

    #[test]
    fn test_hash_is_stable_and_hospital_scoped() {
        let record = NewIncomeRecord::channeling("2024-01-01", Some(3), Some(300.0))
            .into_record()
            .unwrap();

        let a = compute_idempotency_hash("h-1", &record, 0);
        let b = compute_idempotency_hash("h-1", &record, 0);
        let c = compute_idempotency_hash("h-2", &record, 0);
        let repeat = compute_idempotency_hash("h-1", &record, 1);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, repeat);
        assert_eq!(a.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_hash_differs_by_amount() {
        let one = NewIncomeRecord::surgical("2024-01-01", Some("B"), Some(1.0))
            .into_record()
            .unwrap();
        let two = NewIncomeRecord::surgical("2024-01-01", Some("B"), Some(2.0))
            .into_record()
            .unwrap();

        assert_ne!(
            compute_idempotency_hash("h", &one, 0),
            compute_idempotency_hash("h", &two, 0)
        );
    }
}

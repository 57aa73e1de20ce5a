// 🏥 Hospital Entity - one finance ledger per hospital a doctor works at
//
// Each hospital holds an ordered ledger of income records, newest first.
// Records are addressed by a stable RecordId, never by position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, LedgerResult};

// ============================================================================
// RECORD IDENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new() -> Self {
        RecordId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        RecordId(id.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// INCOME RECORD
// ============================================================================

/// An income line in a hospital ledger.
///
/// Only the fields of the record's own kind exist. Numeric fields are
/// optional: a missing value counts as zero when the ledger is summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IncomeRecord {
    /// Consultation session billed per patient
    #[serde(rename_all = "camelCase")]
    Channeling {
        date: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        patient_count: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        income: Option<f64>,
    },

    /// Surgery fee tied to an admission (BHT)
    #[serde(rename_all = "camelCase")]
    Surgical {
        date: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bht: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<f64>,
    },
}

impl IncomeRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            IncomeRecord::Channeling { .. } => "channeling",
            IncomeRecord::Surgical { .. } => "surgical",
        }
    }

    pub fn date(&self) -> &str {
        match self {
            IncomeRecord::Channeling { date, .. } | IncomeRecord::Surgical { date, .. } => date,
        }
    }

    /// Monetary value of this record, zero when not supplied
    pub fn value(&self) -> f64 {
        match self {
            IncomeRecord::Channeling { income, .. } => income.unwrap_or(0.0),
            IncomeRecord::Surgical { amount, .. } => amount.unwrap_or(0.0),
        }
    }
}

/// Record as submitted by a client: a kind plus the optional fields of
/// either kind. Converting it keeps only the fields meaningful for the kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncomeRecord {
    pub kind: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub patient_count: Option<u32>,
    #[serde(default)]
    pub income: Option<f64>,
    #[serde(default)]
    pub bht: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl NewIncomeRecord {
    pub fn channeling(date: &str, patient_count: Option<u32>, income: Option<f64>) -> Self {
        NewIncomeRecord {
            kind: "channeling".to_string(),
            date: Some(date.to_string()),
            patient_count,
            income,
            ..Default::default()
        }
    }

    pub fn surgical(date: &str, bht: Option<&str>, amount: Option<f64>) -> Self {
        NewIncomeRecord {
            kind: "surgical".to_string(),
            date: Some(date.to_string()),
            bht: bht.map(str::to_string),
            amount,
            ..Default::default()
        }
    }

    /// Build the typed record. Fields of the other kind are not applicable
    /// and are dropped; missing numbers stay missing. Only an unknown kind
    /// is rejected.
    pub fn into_record(self) -> LedgerResult<IncomeRecord> {
        let date = self
            .date
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());

        match self.kind.trim().to_lowercase().as_str() {
            "channeling" => {
                if self.bht.is_some() || self.amount.is_some() {
                    tracing::debug!("ignoring surgical fields on channeling record");
                }
                Ok(IncomeRecord::Channeling {
                    date,
                    patient_count: self.patient_count,
                    income: self.income,
                })
            }
            "surgical" => {
                if self.patient_count.is_some() || self.income.is_some() {
                    tracing::debug!("ignoring channeling fields on surgical record");
                }
                Ok(IncomeRecord::Surgical {
                    date,
                    bht: self.bht.filter(|b| !b.trim().is_empty()),
                    amount: self.amount,
                })
            }
            other => Err(LedgerError::InvalidInput(format!(
                "unknown record kind '{}' (expected channeling or surgical)",
                other
            ))),
        }
    }
}

// ============================================================================
// RECORD LEDGER (ordered, id-indexed)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: IncomeRecord,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(record: IncomeRecord) -> Self {
        LedgerEntry {
            id: RecordId::new(),
            record,
            created_at: Utc::now(),
        }
    }
}

/// Income records of one hospital, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordLedger {
    entries: Vec<LedgerEntry>,
}

impl RecordLedger {
    pub fn new() -> Self {
        RecordLedger {
            entries: Vec::new(),
        }
    }

    /// Build from entries already ordered newest first
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        RecordLedger { entries }
    }

    /// Insert at the front (newest position)
    pub fn prepend(&mut self, entry: LedgerEntry) -> &LedgerEntry {
        self.entries.insert(0, entry);
        &self.entries[0]
    }

    /// Remove by identity. Returns None if no entry has this id.
    pub fn remove(&mut self, id: &RecordId) -> Option<LedgerEntry> {
        let pos = self.entries.iter().position(|e| &e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &IncomeRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// HOSPITAL ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub id: String,
    pub doctor_id: String,
    pub name: String,
    pub wht_enabled: bool,
    pub records: RecordLedger,
    pub created_at: DateTime<Utc>,
}

impl Hospital {
    pub fn new(doctor_id: &str, name: String, wht_enabled: bool) -> Self {
        Hospital {
            id: uuid::Uuid::new_v4().to_string(),
            doctor_id: doctor_id.to_string(),
            name,
            wht_enabled,
            records: RecordLedger::new(),
            created_at: Utc::now(),
        }
    }

    /// Validate and prepend a new income record
    pub fn add_record(&mut self, new_record: NewIncomeRecord) -> LedgerResult<&LedgerEntry> {
        let record = new_record.into_record()?;
        Ok(self.records.prepend(LedgerEntry::new(record)))
    }

    /// Remove a record by id; an unknown id leaves the ledger unchanged
    pub fn delete_record(&mut self, record_id: &RecordId) -> Option<LedgerEntry> {
        let removed = self.records.remove(record_id);
        if removed.is_none() {
            tracing::debug!(hospital_id = %self.id, record_id = %record_id, "record not in ledger, nothing to delete");
        }
        removed
    }
}

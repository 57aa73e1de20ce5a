// 🔪 Surgery Record Entity - per-patient surgical follow-up notes
//
// A surgery record collects progress entries (notes + image references),
// newest first. Image upload transport lives outside this crate; entries
// only keep the stored paths/URLs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub id: String,
    pub notes: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn new(notes: String, images: Vec<String>) -> Self {
        ProgressEntry {
            id: uuid::Uuid::new_v4().to_string(),
            notes,
            images,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurgeryRecord {
    pub id: String,
    pub doctor_id: String,
    pub patient_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bht: Option<String>,
    pub surgery: String,
    pub date: String,
    /// Newest first
    pub entries: Vec<ProgressEntry>,
    pub created_at: DateTime<Utc>,
}

impl SurgeryRecord {
    pub fn new(doctor_id: &str, details: NewSurgeryRecord) -> Self {
        SurgeryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            doctor_id: doctor_id.to_string(),
            patient_name: details.patient_name,
            bht: details.bht,
            surgery: details.surgery,
            date: details
                .date
                .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string()),
            entries: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn add_entry(&mut self, entry: ProgressEntry) {
        self.entries.insert(0, entry);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSurgeryRecord {
    pub patient_name: String,
    #[serde(default)]
    pub bht: Option<String>,
    #[serde(default)]
    pub surgery: String,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProgressEntry {
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_newest_first() {
        let mut record = SurgeryRecord::new(
            "doc-1",
            NewSurgeryRecord {
                patient_name: "K. Silva".to_string(),
                bht: Some("BHT-42".to_string()),
                surgery: "Appendectomy".to_string(),
                date: Some("2024-06-01".to_string()),
            },
        );

        record.add_entry(ProgressEntry::new("Day 1".to_string(), vec![]));
        record.add_entry(ProgressEntry::new("Day 2".to_string(), vec!["img/2.png".to_string()]));

        assert_eq!(record.entries.len(), 2);
        assert_eq!(record.entries[0].notes, "Day 2");
        assert_eq!(record.entries[1].notes, "Day 1");
    }
}

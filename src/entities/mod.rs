// Entity Models
//
// Each entity has a stable UUID identity. Hospitals own an id-indexed
// ledger of income records; surgery records own progress entries.

pub mod doctor;
pub mod hospital;
pub mod surgery;

pub use doctor::{Doctor, Plan, Subscription, SubscriptionStatus};
pub use hospital::{Hospital, IncomeRecord, LedgerEntry, NewIncomeRecord, RecordId, RecordLedger};
pub use surgery::{NewProgressEntry, NewSurgeryRecord, ProgressEntry, SurgeryRecord};

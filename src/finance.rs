// 💰 Income Aggregator - per-hospital income summary with withholding tax
//
//   channeling = Σ income  (channeling records)
//   surgical   = Σ amount  (surgical records)
//   payable    = (channeling + surgical) × (1 - 0.05)   when WHT is enabled
//
// Missing amounts count as zero. Nothing is rounded here; rounding is a
// display concern (see round_for_display).

use serde::{Deserialize, Serialize};

use crate::entities::{Hospital, IncomeRecord};

/// Flat withholding tax deducted when a hospital has WHT enabled
pub const WHT_RATE: f64 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalSummary {
    pub channeling_income: f64,
    pub surgical_income: f64,
    pub total_payable: f64,
}

impl HospitalSummary {
    pub fn gross_total(&self) -> f64 {
        self.channeling_income + self.surgical_income
    }

    /// Amount withheld (zero when WHT is disabled)
    pub fn withheld(&self) -> f64 {
        self.gross_total() - self.total_payable
    }
}

/// Reduce a hospital's ledger to its income summary
pub fn summarize_hospital(hospital: &Hospital) -> HospitalSummary {
    let mut channeling_income = 0.0;
    let mut surgical_income = 0.0;

    for record in hospital.records.records() {
        match record {
            IncomeRecord::Channeling { income, .. } => channeling_income += income.unwrap_or(0.0),
            IncomeRecord::Surgical { amount, .. } => surgical_income += amount.unwrap_or(0.0),
        }
    }

    let gross = channeling_income + surgical_income;
    let total_payable = if hospital.wht_enabled {
        gross * (1.0 - WHT_RATE)
    } else {
        gross
    };

    HospitalSummary {
        channeling_income,
        surgical_income,
        total_payable,
    }
}

/// Round to a whole currency unit for display
pub fn round_for_display(value: f64) -> f64 {
    value.round()
}

/// One row of the finance overview: a hospital and its summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalOverview {
    pub id: String,
    pub name: String,
    pub wht_enabled: bool,
    pub channeling_income: f64,
    pub surgical_income: f64,
    pub total_payable: f64,
    pub record_count: usize,
}

impl From<&Hospital> for HospitalOverview {
    fn from(hospital: &Hospital) -> Self {
        let summary = summarize_hospital(hospital);
        HospitalOverview {
            id: hospital.id.clone(),
            name: hospital.name.clone(),
            wht_enabled: hospital.wht_enabled,
            channeling_income: summary.channeling_income,
            surgical_income: summary.surgical_income,
            total_payable: summary.total_payable,
            record_count: hospital.records.len(),
        }
    }
}

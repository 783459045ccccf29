//! Typed participant profile records stored as JSONB.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lifecycle::{normalize_amount, LifecycleError, Location, ServiceType};
use crate::models::Correspondent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInfo {
    pub bank: String,
    pub agency: String,
    pub account: String,
    pub account_type: String,
    pub document: String,
}

impl BankInfo {
    fn validate(&self) -> Result<(), LifecycleError> {
        let fields = [
            ("bank", &self.bank),
            ("agency", &self.agency),
            ("account", &self.account),
            ("account_type", &self.account_type),
            ("document", &self.document),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(LifecycleError::Validation(format!(
                    "bank_info.{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// What a correspondent offers: services, prices per service and covered cities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrespondentProfile {
    #[serde(default)]
    pub specialties: Vec<ServiceType>,
    #[serde(default)]
    pub rates: BTreeMap<ServiceType, Decimal>,
    #[serde(default)]
    pub service_areas: Vec<Location>,
    #[serde(default)]
    pub bank_info: Option<BankInfo>,
}

impl CorrespondentProfile {
    /// Checks every sub-record and normalizes rates and locations.
    pub fn validated(mut self) -> Result<Self, LifecycleError> {
        if self.specialties.is_empty() {
            return Err(LifecycleError::Validation("at least one specialty is required".into()));
        }
        self.specialties.sort();
        self.specialties.dedup();

        let mut rates = BTreeMap::new();
        for (service, rate) in self.rates {
            let rate = normalize_amount(&format!("rates.{service}"), rate)?;
            rates.insert(service, rate);
        }
        self.rates = rates;

        self.service_areas = self
            .service_areas
            .iter()
            .map(|area| Location::new(&area.city, &area.state))
            .collect::<Result<_, _>>()?;

        if let Some(bank_info) = &self.bank_info {
            bank_info.validate()?;
        }
        Ok(self)
    }

    pub fn from_row(row: &Correspondent) -> Self {
        Self {
            specialties: from_json(&row.specialties),
            rates: from_json(&row.rates),
            service_areas: from_json(&row.service_areas),
            bank_info: row.bank_info.as_ref().and_then(|value| from_json_opt(value)),
        }
    }

    pub fn covers(&self, location: &Location) -> bool {
        self.service_areas.iter().any(|area| area.matches(location))
    }
}

fn from_json<T: for<'de> Deserialize<'de> + Default>(value: &Value) -> T {
    from_json_opt(value).unwrap_or_default()
}

fn from_json_opt<T: for<'de> Deserialize<'de>>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

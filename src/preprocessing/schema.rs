use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

/// Fixed column roles for the long-quote dataset. Persisted inside every model
/// artifact so serving applies exactly the layout the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    /// Offset-aware submission timestamp, converted to UTC.
    pub submitted_at: String,
    /// Policy start; its wall-clock time is relabelled as UTC.
    pub effective_start_date: String,
    pub duration_column: String,
    pub dropped: Vec<String>,
    pub categorical: Vec<String>,
    pub numerical: Vec<String>,
    pub intensity: Vec<String>,
    pub label: String,
    pub unknown_sentinel: String,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl FeatureSchema {
    pub fn lead_quotes() -> Self {
        Self {
            version: SCHEMA_VERSION,
            submitted_at: "submitted_at".to_string(),
            effective_start_date: "effective_start_date".to_string(),
            duration_column: "time_difference_days".to_string(),
            dropped: owned(&[
                "last_utm_source",
                "long_quote_id",
                "lead_id",
                "rbs_result",
                "policy_subscribed_at",
                "contract_id",
                "payment_frequency",
                "submitted_at",
                "effective_start_date",
                "has_subscribed_online",
            ]),
            categorical: owned(&[
                "provider",
                "product_third_party",
                "product_intermediate",
                "product_all_risks",
                "chosen_formula",
                "chosen_product",
                "main_driver_gender",
                "vehicle_class",
                "vehicle_region",
            ]),
            numerical: owned(&[
                "main_driver_age",
                "main_driver_licence_age",
                "main_driver_bonus",
                "vehicle_age",
                "vehicle_group",
            ]),
            intensity: owned(&[
                "annual_price_third_party",
                "annual_price_intermediate",
                "annual_price_all_risks",
            ]),
            label: "has_subscribed".to_string(),
            unknown_sentinel: "unknown".to_string(),
        }
    }

    /// Model input columns, in matrix order.
    pub fn feature_names(&self) -> Vec<String> {
        self.categorical
            .iter()
            .chain(&self.numerical)
            .chain(&self.intensity)
            .chain(std::iter::once(&self.duration_column))
            .cloned()
            .collect()
    }

    /// Raw columns a record must carry before preprocessing.
    pub fn required_inputs(&self) -> Vec<&str> {
        std::iter::once(self.submitted_at.as_str())
            .chain(std::iter::once(self.effective_start_date.as_str()))
            .chain(self.categorical.iter().map(String::as_str))
            .chain(self.numerical.iter().map(String::as_str))
            .chain(self.intensity.iter().map(String::as_str))
            .collect()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::lead_quotes()
    }
}

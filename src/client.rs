use anyhow::{anyhow, Context, Result};
use rand::Rng;
use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::data::{load_csv, Table};
use crate::preprocessing::FeatureSchema;
use crate::web::PredictResponse;

/// Picks one row at random and strips the label so it looks like an unseen lead.
pub fn sample_lead(table: &Table, label: &str) -> Result<serde_json::Map<String, serde_json::Value>> {
    if table.is_empty() {
        return Err(anyhow!("no rows available to sample"));
    }
    let idx = rand::thread_rng().gen_range(0..table.n_rows());
    let mut record = table
        .record(idx)
        .ok_or_else(|| anyhow!("row {} out of range", idx))?;
    record.remove(label);
    Ok(record)
}

pub async fn run(config: &Config) -> Result<()> {
    let raw = load_csv(&config.data.raw_data_path)?;
    let schema = FeatureSchema::lead_quotes();
    let input_data = sample_lead(&raw, &schema.label)?;

    let payload = json!({
        "model_name": config.client.model_name,
        "input_data": input_data,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);

    info!(url = %config.client.url, "Sending prediction request");
    let response = reqwest::Client::new()
        .post(&config.client.url)
        .json(&payload)
        .send()
        .await
        .with_context(|| format!("posting to {}", config.client.url))?;

    let status = response.status();
    if status.is_success() {
        let result: PredictResponse = response.json().await?;
        println!("Predictions:");
        println!("{:?}", result.predictions);
    } else {
        let body = response.text().await.unwrap_or_default();
        println!("Error: {} {}", status.as_u16(), body);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    #[test]
    fn sampled_lead_has_no_label() {
        let mut table = Table::new(vec!["brand".into(), "has_subscribed".into()]);
        table
            .push_row(vec![Value::Text("acme".into()), Value::Text("True".into())])
            .unwrap();

        let record = sample_lead(&table, "has_subscribed").unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record["brand"], json!("acme"));
    }

    #[test]
    fn empty_table_cannot_be_sampled() {
        let table = Table::new(vec!["brand".into()]);
        assert!(sample_lead(&table, "has_subscribed").is_err());
    }
}

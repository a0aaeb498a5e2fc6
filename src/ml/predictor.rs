use nalgebra::DMatrix;
use std::path::Path;
use tracing::debug;

use super::artifact::ModelArtifact;
use crate::data::Table;
use crate::error::{LeadError, Result};

/// Runs a persisted model over raw or already-preprocessed records.
#[derive(Debug)]
pub struct LeadPredictor {
    artifact: ModelArtifact,
}

impl LeadPredictor {
    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_artifact(ModelArtifact::load(path)?))
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// With `preprocess`, raw records go through the fitted transformer first and rows
    /// dropped by its missing-value filter get no prediction. Without it, the table's
    /// columns must match the model's feature layout exactly.
    fn prepare(&self, input: &Table, preprocess: bool) -> Result<DMatrix<f64>> {
        let features = if preprocess {
            self.artifact.transformer.transform(input)?
        } else {
            if input.columns() != self.artifact.feature_names.as_slice() {
                return Err(LeadError::Schema(format!(
                    "expected feature columns {:?}, got {:?}",
                    self.artifact.feature_names,
                    input.columns()
                )));
            }
            input.clone()
        };

        debug!(rows = features.n_rows(), "Prepared feature matrix");
        features.to_matrix()
    }

    /// Predicted labels, one per surviving input row, in input order.
    pub fn predict(&self, input: &Table, preprocess: bool) -> Result<Vec<i64>> {
        let x = self.prepare(input, preprocess)?;
        if x.nrows() == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .artifact
            .model
            .predict(&x)?
            .into_iter()
            .map(|label| label as i64)
            .collect())
    }

    pub fn predict_proba(&self, input: &Table, preprocess: bool) -> Result<DMatrix<f64>> {
        let x = self.prepare(input, preprocess)?;
        if x.nrows() == 0 {
            return Ok(DMatrix::zeros(0, self.artifact.model.classes().len()));
        }
        self.artifact.model.predict_proba(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::read_csv;
    use crate::ml::trainer::{train_model, TrainerSettings};
    use crate::preprocessing::{split_label, FeatureSchema, Preprocessor};

    const HEADER: &str = "long_quote_id,submitted_at,effective_start_date,provider,product_third_party,product_intermediate,product_all_risks,chosen_formula,chosen_product,main_driver_gender,vehicle_class,vehicle_region,main_driver_age,main_driver_licence_age,main_driver_bonus,vehicle_age,vehicle_group,annual_price_third_party,annual_price_intermediate,annual_price_all_risks,has_subscribed";

    /// Young drivers on cheap quotes convert, everyone else does not.
    fn raw(n: usize) -> Table {
        let mut csv = format!("{HEADER}\n");
        for i in 0..n {
            let converts = i % 2 == 0;
            let (age, price) = if converts { ("20-30", "low") } else { ("50+", "high") };
            csv.push_str(&format!(
                "{i},2023-03-01 10:00:00+00:00,2023-03-{day:02},{provider},tp,im,ar,basic,car,M,A,north,{age},{lic},50,{va},10,{price},medium,{price},{label}\n",
                day = 2 + i % 20,
                provider = if i % 3 == 0 { "acme" } else { "zeta" },
                lic = i % 7,
                va = i % 5,
                label = u8::from(converts),
            ));
        }
        read_csv(csv.as_bytes()).unwrap()
    }

    fn predictor(raw: &Table) -> LeadPredictor {
        let (fitted, prepared) = Preprocessor::new(FeatureSchema::lead_quotes())
            .fit_transform(raw)
            .unwrap();
        let (features, labels) = split_label(&prepared, "has_subscribed").unwrap();
        let settings = TrainerSettings {
            n_estimators: 10,
            seed: Some(42),
            ..TrainerSettings::default()
        };
        let model = train_model(&features, &labels, &settings).unwrap();
        LeadPredictor::from_artifact(ModelArtifact::new(fitted, model))
    }

    #[test]
    fn raw_records_are_preprocessed() {
        let raw = raw(40);
        let predictor = predictor(&raw);

        let mut leads = raw.take_rows(&[0, 1, 2, 3]);
        leads.drop_columns(&["has_subscribed", "long_quote_id"]);
        let labels = predictor.predict(&leads, true).unwrap();
        assert_eq!(labels, vec![1, 0, 1, 0]);

        let proba = predictor.predict_proba(&leads, true).unwrap();
        assert_eq!(proba.shape(), (4, 2));
        for row in proba.row_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn preprocessed_input_must_match_layout() {
        let raw = raw(20);
        let predictor = predictor(&raw);

        let err = predictor.predict(&raw, false).unwrap_err();
        assert!(matches!(err, LeadError::Schema(_)));
    }

    #[test]
    fn empty_input_yields_no_predictions() {
        let raw = raw(20);
        let predictor = predictor(&raw);
        let empty = Table::new(raw.columns().to_vec());
        assert!(predictor.predict(&empty, true).unwrap().is_empty());
    }

    #[test]
    fn saved_artifact_round_trips() {
        let raw = raw(20);
        let predictor = predictor(&raw);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("m.json");
        predictor.artifact().save(&path).unwrap();

        let reloaded = LeadPredictor::load(&path).unwrap();
        let leads = raw.take_rows(&[0, 1, 5]);
        assert_eq!(
            reloaded.predict(&leads, true).unwrap(),
            predictor.predict(&leads, true).unwrap()
        );

        let err = LeadPredictor::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, LeadError::FileAccess { .. }));
        assert!(format!("{:?}", reloaded).contains("LeadPredictor"));
    }
}

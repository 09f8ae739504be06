//! Training service: Fits a pipeline on a dataset and publishes its artifacts.
//!
//! Order of operations:
//! 1. Validate the configuration and the dataset schema
//! 2. Parse the binary target and split rows into training / held-out sets
//! 3. Parse cells; impute numeric gaps with training-split medians and fill
//!    categorical gaps with the missing-category marker
//! 4. Fit the transformer (encoders on all rows, scaler on training rows)
//! 5. Encode every row through the same path inference uses
//! 6. Oversample the training rows with SMOTE
//! 7. Fit the forest, score it on the untouched held-out rows
//! 8. Publish transformer and model together
//!
//! Any failure before step 8 leaves the store untouched.

use std::sync::Arc;

use crate::adapters::ArtifactError;
use crate::domain::{
    is_missing, FeatureRecord, FeatureValue, PipelineConfig, RawTable, TransformerSpec,
    MISSING_CATEGORY,
};
use crate::model::{ModelMetrics, RandomForest, TrainedModel};
use crate::ports::{ArtifactManifest, ArtifactStore, Classifier};
use crate::preprocessing::{
    class_counts, encode_record, train_test_split, CategoricalEncoder, CategoricalEncoderSet,
    MedianImputer, Smote, StandardScaler, Transformer,
};
use crate::{Result, StrokewatchError};

/// Transformer and model fitted by one run, not yet published.
#[derive(Debug, Clone)]
pub struct FittedPipeline {
    pub transformer: Transformer,
    pub model: TrainedModel,
}

/// Parsed cell of a feature column before imputation.
enum Cell {
    Numeric(Option<f64>),
    Categorical(String),
}

fn data_error(message: impl Into<String>) -> StrokewatchError {
    StrokewatchError::TrainingData(message.into())
}

fn parse_label(row: usize, raw: &str) -> Result<u8> {
    if is_missing(raw) {
        return Err(data_error(format!("Row {}: target value is missing", row + 1)));
    }
    match raw.trim().parse::<f64>() {
        Ok(v) if v == 0.0 => Ok(0),
        Ok(v) if v == 1.0 => Ok(1),
        Ok(v) => Err(data_error(format!(
            "Row {}: target must be binary (0 or 1), got {v}",
            row + 1
        ))),
        Err(_) => Err(data_error(format!(
            "Row {}: unparsable target value {raw:?}",
            row + 1
        ))),
    }
}

fn parse_numeric(row: usize, column: &str, raw: &str) -> Result<Option<f64>> {
    if is_missing(raw) {
        return Ok(None);
    }
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(data_error(format!(
            "Row {}: column {column:?} has unparsable numeric value {raw:?}",
            row + 1
        ))),
    }
}

/// Fit a pipeline without touching any store.
///
/// # Errors
/// `Config` for an inconsistent configuration, `TrainingData` for any dataset
/// defect, `Model` if the forest cannot be fitted.
pub fn fit_pipeline(config: &PipelineConfig, table: &RawTable) -> Result<FittedPipeline> {
    config.validate().map_err(StrokewatchError::Config)?;

    if table.is_empty() {
        return Err(data_error("Dataset has no rows"));
    }

    let target_idx = table
        .column_index(&config.target)
        .ok_or_else(|| data_error(format!("Target column {:?} not found", config.target)))?;

    let missing: Vec<&str> = config
        .features
        .iter()
        .filter(|f| table.column_index(f).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(data_error(format!("Feature columns not found: {missing:?}")));
    }

    let ignored: Vec<&str> = table
        .columns()
        .iter()
        .filter(|c| {
            **c != config.target && !config.features.contains(c) && !config.drop_columns.contains(c)
        })
        .map(String::as_str)
        .collect();
    if !ignored.is_empty() {
        tracing::warn!("Ignoring columns not used by pipeline {}: {:?}", config.id, ignored);
    }

    let rows = table.rows();
    let labels: Vec<u8> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_label(i, &row[target_idx]))
        .collect::<Result<_>>()?;

    let split = train_test_split(rows.len(), config.split.test_fraction, config.split.seed)
        .map_err(|e| data_error(e.to_string()))?;

    // Column-major parsed cells, in feature order.
    let mut cells: Vec<Vec<Cell>> = Vec::with_capacity(config.features.len());
    for feature in &config.features {
        let idx = table
            .column_index(feature)
            .ok_or_else(|| data_error(format!("Feature column {feature:?} not found")))?;
        let column = if config.is_categorical(feature) {
            rows.iter()
                .map(|row| {
                    let raw = row[idx].trim();
                    Cell::Categorical(if is_missing(raw) {
                        MISSING_CATEGORY.to_string()
                    } else {
                        raw.to_string()
                    })
                })
                .collect()
        } else {
            rows.iter()
                .enumerate()
                .map(|(i, row)| parse_numeric(i, feature, &row[idx]).map(Cell::Numeric))
                .collect::<Result<Vec<_>>>()?
        };
        cells.push(column);
    }

    // Medians from training rows only.
    let numeric_features: Vec<String> = config
        .features
        .iter()
        .filter(|f| !config.is_categorical(f))
        .cloned()
        .collect();
    let numeric_train: Vec<Vec<Option<f64>>> = config
        .features
        .iter()
        .zip(&cells)
        .filter(|(f, _)| !config.is_categorical(f))
        .map(|(_, column)| {
            split
                .train
                .iter()
                .map(|&i| match &column[i] {
                    Cell::Numeric(v) => *v,
                    Cell::Categorical(_) => None,
                })
                .collect()
        })
        .collect();
    let imputer = MedianImputer::fit(&numeric_features, &numeric_train).map_err(data_error)?;

    let records: Vec<FeatureRecord> = (0..rows.len())
        .map(|i| {
            let mut record = FeatureRecord::new();
            for (feature, column) in config.features.iter().zip(&cells) {
                let value = match &column[i] {
                    Cell::Categorical(s) => FeatureValue::Categorical(s.clone()),
                    // Every numeric feature has a fitted median, so fill never yields None.
                    Cell::Numeric(v) => FeatureValue::Numeric(imputer.fill(feature, *v).unwrap_or(f64::NAN)),
                };
                record.insert(feature, value);
            }
            record
        })
        .collect();

    let transformer = fit_transformer(config, &cells, &records, &split.train)?;
    tracing::info!(
        "Fitted {} transformer on columns {:?}",
        transformer.kind(),
        transformer.columns()
    );

    let encoded: Vec<Vec<f64>> = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            encode_record(&config.features, &transformer, record)
                .map_err(|e| data_error(format!("Row {}: {e}", i + 1)))
        })
        .collect::<Result<_>>()?;

    let x_train: Vec<Vec<f64>> = split.train.iter().map(|&i| encoded[i].clone()).collect();
    let y_train: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();
    let x_test: Vec<Vec<f64>> = split.test.iter().map(|&i| encoded[i].clone()).collect();
    let y_test: Vec<u8> = split.test.iter().map(|&i| labels[i]).collect();

    let before = class_counts(&y_train);
    let (x_res, y_res) = Smote::new(config.smote)
        .fit_resample(&x_train, &y_train)
        .map_err(|e| data_error(format!("Training split cannot be balanced: {e}")))?;
    let after = class_counts(&y_res);
    tracing::info!(
        "Class balance in training split: {:?} -> {:?} after SMOTE",
        before,
        after
    );

    let forest = RandomForest::fit(&x_res, &y_res, &config.forest)?;

    let mut correct = 0usize;
    for (row, &label) in x_test.iter().zip(&y_test) {
        let p = forest.predict_proba(row)?;
        if u8::from(p > crate::domain::CLASS_DECISION_BOUNDARY) == label {
            correct += 1;
        }
    }
    let accuracy = correct as f64 / y_test.len() as f64;

    let metrics = ModelMetrics {
        accuracy,
        train_rows: split.train.len(),
        test_rows: split.test.len(),
        class_counts_before: before,
        class_counts_after: after,
        test_class_counts: class_counts(&y_test),
    };
    tracing::info!(
        "Pipeline {} held-out accuracy: {:.4} on {} rows",
        config.id,
        accuracy,
        y_test.len()
    );

    let model = TrainedModel::new(config.features.clone(), forest, metrics)?;
    Ok(FittedPipeline { transformer, model })
}

fn fit_transformer(
    config: &PipelineConfig,
    cells: &[Vec<Cell>],
    records: &[FeatureRecord],
    train: &[usize],
) -> Result<Transformer> {
    match &config.transformer {
        TransformerSpec::Scaler { columns } => {
            let values: Vec<Vec<f64>> = columns
                .iter()
                .map(|c| {
                    train
                        .iter()
                        .map(|&i| records[i].get(c).and_then(FeatureValue::as_f64).unwrap_or(f64::NAN))
                        .collect()
                })
                .collect();
            let scaler = StandardScaler::fit(columns, &values).map_err(data_error)?;
            Ok(Transformer::Scaler(scaler))
        }
        TransformerSpec::Encoders {
            columns,
            merge_expected_categories,
        } => {
            let mut encoders = Vec::with_capacity(columns.len());
            for spec in columns {
                let position = config
                    .features
                    .iter()
                    .position(|f| *f == spec.name)
                    .ok_or_else(|| data_error(format!("Categorical column {:?} not found", spec.name)))?;
                let observed = cells[position].iter().filter_map(|cell| match cell {
                    Cell::Categorical(s) => Some(s.as_str()),
                    Cell::Numeric(_) => None,
                });
                encoders.push(CategoricalEncoder::fit(spec, observed, *merge_expected_categories));
            }
            Ok(Transformer::Encoders(CategoricalEncoderSet::new(encoders)))
        }
    }
}

/// Outcome of a published training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub manifest: ArtifactManifest,
}

impl TrainingReport {
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.manifest.metrics.accuracy
    }
}

/// Service for training pipelines and publishing their artifacts.
pub struct TrainingService<S>
where
    S: ArtifactStore,
{
    store: Arc<S>,
}

impl<S> TrainingService<S>
where
    S: ArtifactStore,
    S::Error: Into<ArtifactError>,
{
    /// Create a new training service.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Fit `config` on `table` and publish the result as the pipeline's current run.
    ///
    /// # Errors
    /// Any fitting error, or `Artifact` if publishing fails. In both cases the
    /// previously published run stays current.
    pub fn train(&self, config: &PipelineConfig, table: &RawTable) -> Result<TrainingReport> {
        tracing::info!(
            "Training pipeline {} on {} rows ({} features)",
            config.id,
            table.len(),
            config.features.len()
        );

        let fitted = fit_pipeline(config, table)?;
        debug_assert_eq!(fitted.model.feature_names(), config.features.as_slice());

        let manifest = self
            .store
            .publish(&config.id, &fitted.transformer, &fitted.model)
            .map_err(|e| StrokewatchError::Artifact(e.into()))?;

        Ok(TrainingReport { manifest })
    }
}

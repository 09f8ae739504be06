//! Typed form inputs for the two built-in pipelines.
//!
//! These mirror the input widgets of the serving UI: they carry the documented
//! ranges and defaults, and convert into `FeatureRecord`s keyed by the
//! pipeline's feature names.

use serde::{Deserialize, Serialize};

use super::pipeline::{CATEGORICAL_PIPELINE, CLINICAL_PIPELINE};
use super::record::FeatureRecord;

/// Biological sex as offered by the clinical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Sex {
    #[default]
    Male,
    Female,
}

/// Inputs of the clinical (framingham) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalForm {
    pub sex: Sex,
    /// Age in years (20-90)
    pub age: f64,
    pub current_smoker: bool,
    /// Cigarettes per day (0-40); ignored when not a current smoker
    pub cigs_per_day: f64,
    pub bp_meds: bool,
    pub prevalent_stroke: bool,
    pub prevalent_hyp: bool,
    pub diabetes: bool,
    /// Total cholesterol in mg/dL (100-600)
    pub tot_chol: f64,
    /// Systolic blood pressure in mmHg (80-250)
    pub sys_bp: f64,
    /// Diastolic blood pressure in mmHg (50-150)
    pub dia_bp: f64,
    /// Body mass index (10.0-50.0)
    pub bmi: f64,
    /// Resting heart rate in BPM (40-150)
    pub heart_rate: f64,
    /// Blood glucose in mg/dL (50-300)
    pub glucose: f64,
}

impl Default for ClinicalForm {
    fn default() -> Self {
        Self {
            sex: Sex::Male,
            age: 50.0,
            current_smoker: false,
            cigs_per_day: 10.0,
            bp_meds: false,
            prevalent_stroke: false,
            prevalent_hyp: false,
            diabetes: false,
            tot_chol: 200.0,
            sys_bp: 120.0,
            dia_bp: 80.0,
            bmi: 25.0,
            heart_rate: 75.0,
            glucose: 100.0,
        }
    }
}

fn check_range(errors: &mut Vec<String>, label: &str, value: f64, min: f64, max: f64) {
    if !(min..=max).contains(&value) {
        errors.push(format!("{label} {value} out of range [{min}, {max}]"));
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl ClinicalForm {
    /// Validate that all fields are within the form's ranges.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        check_range(&mut errors, "Age", self.age, 20.0, 90.0);
        if self.current_smoker {
            check_range(&mut errors, "Cigarettes per day", self.cigs_per_day, 0.0, 40.0);
        }
        check_range(&mut errors, "Total cholesterol", self.tot_chol, 100.0, 600.0);
        check_range(&mut errors, "Systolic BP", self.sys_bp, 80.0, 250.0);
        check_range(&mut errors, "Diastolic BP", self.dia_bp, 50.0, 150.0);
        check_range(&mut errors, "BMI", self.bmi, 10.0, 50.0);
        check_range(&mut errors, "Heart rate", self.heart_rate, 40.0, 150.0);
        check_range(&mut errors, "Glucose", self.glucose, 50.0, 300.0);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, then convert.
    ///
    /// # Errors
    /// Returns the validation errors; no record is built.
    pub fn checked_record(&self) -> Result<FeatureRecord, Vec<String>> {
        self.validate()?;
        Ok(self.to_record())
    }

    /// Convert to a record keyed by the clinical pipeline's features.
    #[must_use]
    pub fn to_record(&self) -> FeatureRecord {
        let cigs = if self.current_smoker { self.cigs_per_day } else { 0.0 };
        FeatureRecord::new()
            .with("male", flag(self.sex == Sex::Male))
            .with("age", self.age)
            .with("currentSmoker", flag(self.current_smoker))
            .with("cigsPerDay", cigs)
            .with("BPMeds", flag(self.bp_meds))
            .with("prevalentStroke", flag(self.prevalent_stroke))
            .with("prevalentHyp", flag(self.prevalent_hyp))
            .with("diabetes", flag(self.diabetes))
            .with("totChol", self.tot_chol)
            .with("sysBP", self.sys_bp)
            .with("diaBP", self.dia_bp)
            .with("BMI", self.bmi)
            .with("heartRate", self.heart_rate)
            .with("glucose", self.glucose)
    }
}

/// Inputs of the categorical (healthcare-dataset-stroke) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeForm {
    pub gender: String,
    pub age: f64,
    pub hypertension: bool,
    pub heart_disease: bool,
    pub ever_married: String,
    pub work_type: String,
    pub residence_type: String,
    pub avg_glucose_level: f64,
    pub bmi: f64,
    pub smoking_status: String,
}

impl Default for StrokeForm {
    fn default() -> Self {
        Self {
            gender: "Male".to_string(),
            age: 50.0,
            hypertension: false,
            heart_disease: false,
            ever_married: "Yes".to_string(),
            work_type: "Private".to_string(),
            residence_type: "Urban".to_string(),
            avg_glucose_level: 100.0,
            bmi: 25.0,
            smoking_status: "Never smoked".to_string(),
        }
    }
}

impl StrokeForm {
    /// Validate numeric fields. Categories are checked by the fitted encoders.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        check_range(&mut errors, "Age", self.age, 0.0, 120.0);
        check_range(&mut errors, "Average glucose level", self.avg_glucose_level, 50.0, 300.0);
        check_range(&mut errors, "BMI", self.bmi, 10.0, 60.0);
        for (label, value) in [
            ("Gender", &self.gender),
            ("Ever married", &self.ever_married),
            ("Work type", &self.work_type),
            ("Residence type", &self.residence_type),
            ("Smoking status", &self.smoking_status),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{label} must not be empty"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, then convert.
    ///
    /// # Errors
    /// Returns the validation errors; no record is built.
    pub fn checked_record(&self) -> Result<FeatureRecord, Vec<String>> {
        self.validate()?;
        Ok(self.to_record())
    }

    /// Convert to a record keyed by the categorical pipeline's features.
    #[must_use]
    pub fn to_record(&self) -> FeatureRecord {
        FeatureRecord::new()
            .with("gender", self.gender.as_str())
            .with("age", self.age)
            .with("hypertension", flag(self.hypertension))
            .with("heart_disease", flag(self.heart_disease))
            .with("ever_married", self.ever_married.as_str())
            .with("work_type", self.work_type.as_str())
            .with("residence_type", self.residence_type.as_str())
            .with("avg_glucose_level", self.avg_glucose_level)
            .with("bmi", self.bmi)
            .with("smoking_status", self.smoking_status.as_str())
    }
}

/// The validated default form record of a built-in pipeline, or `None` when
/// the pipeline has no form.
#[must_use]
pub fn default_form_record(pipeline: &str) -> Option<Result<FeatureRecord, Vec<String>>> {
    match pipeline {
        CLINICAL_PIPELINE => Some(ClinicalForm::default().checked_record()),
        CATEGORICAL_PIPELINE => Some(StrokeForm::default().checked_record()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PipelineConfig;

    #[test]
    fn test_default_form_records_pass_validation() {
        for id in [CLINICAL_PIPELINE, CATEGORICAL_PIPELINE] {
            let record = default_form_record(id)
                .expect("Built-in pipeline has a form")
                .expect("Defaults are in range");
            assert!(!record.is_empty());
        }
        assert!(default_form_record("custom").is_none());
    }

    #[test]
    fn test_out_of_range_form_builds_no_record() {
        let form = StrokeForm {
            bmi: 75.0,
            ..Default::default()
        };
        let errors = form.checked_record().expect_err("BMI is out of range");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("BMI"));
    }

    #[test]
    fn test_clinical_defaults_are_valid() {
        let form = ClinicalForm::default();
        assert!(form.validate().is_ok());
        let record = form.to_record();
        assert_eq!(record.len(), 14);
        assert_eq!(record.get("male").and_then(|v| v.as_f64()), Some(1.0));
        assert_eq!(record.get("cigsperday").and_then(|v| v.as_f64()), Some(0.0));
    }

    #[test]
    fn test_clinical_record_matches_pipeline_features() {
        let record = ClinicalForm::default().to_record();
        let config = PipelineConfig::clinical();
        let names: Vec<&str> = record.names().collect();
        let mut expected: Vec<&str> = config.features.iter().map(String::as_str).collect();
        expected.sort_unstable();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_stroke_record_matches_pipeline_features() {
        let record = StrokeForm::default().to_record();
        let config = PipelineConfig::categorical();
        assert_eq!(record.len(), config.features.len());
        assert!(config.features.iter().all(|f| record.contains(f)));
    }

    #[test]
    fn test_clinical_range_violations() {
        let form = ClinicalForm {
            age: 10.0,
            bmi: 70.0,
            current_smoker: true,
            cigs_per_day: 80.0,
            ..Default::default()
        };
        let errors = form.validate().expect_err("Should be invalid");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_smoker_keeps_cigarettes() {
        let form = ClinicalForm {
            current_smoker: true,
            cigs_per_day: 15.0,
            sex: Sex::Female,
            ..Default::default()
        };
        let record = form.to_record();
        assert_eq!(record.get("cigsPerDay").and_then(|v| v.as_f64()), Some(15.0));
        assert_eq!(record.get("male").and_then(|v| v.as_f64()), Some(0.0));
    }
}

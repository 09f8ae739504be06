//! Risk verdict types.
//!
//! Represents the output of a stroke-risk prediction and the explicit
//! decision policies that map a model output to a risk level.

use serde::{Deserialize, Serialize};

/// Probability at or above which the clinical pipeline reports high risk.
pub const CLINICAL_HIGH_RISK_THRESHOLD: f64 = 0.30;

/// Probability above which the forest's discrete class is 1.
pub const CLASS_DECISION_BOUNDARY: f64 = 0.5;

/// Binary risk classification for stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Low risk of stroke
    Low,
    /// High risk, intervention recommended
    High,
}

impl RiskLevel {
    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk of stroke",
            Self::High => "High risk of stroke",
        }
    }

    /// Guidance shown alongside the verdict.
    #[must_use]
    pub fn guidance(&self) -> &'static [&'static str] {
        match self {
            Self::Low => &[
                "Maintain a healthy lifestyle",
                "Walk at least 30 minutes a day",
                "Eat more fruits & vegetables",
                "Keep stress levels low",
            ],
            Self::High => &[
                "Engage in daily physical activity",
                "Follow a balanced diet",
                "Quit smoking immediately",
                "Manage blood pressure & diabetes",
            ],
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// How a pipeline turns model output into a risk level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// High risk when the class-1 probability is at or above the threshold.
    ProbabilityThreshold { threshold: f64 },
    /// High risk exactly when the discrete predicted class is 1.
    PredictedClass,
}

impl DecisionPolicy {
    /// Policy used by the clinical pipeline.
    #[must_use]
    pub fn clinical() -> Self {
        Self::ProbabilityThreshold {
            threshold: CLINICAL_HIGH_RISK_THRESHOLD,
        }
    }

    /// Classify a model output. Returns the risk level and the confidence in it.
    #[must_use]
    pub fn classify(&self, probability: f64, prediction: u8) -> (RiskLevel, f64) {
        match self {
            Self::ProbabilityThreshold { threshold } => {
                if probability >= *threshold {
                    (RiskLevel::High, probability)
                } else {
                    (RiskLevel::Low, 1.0 - probability)
                }
            }
            Self::PredictedClass => {
                if prediction == 1 {
                    (RiskLevel::High, probability)
                } else {
                    (RiskLevel::Low, 1.0 - probability)
                }
            }
        }
    }

    /// Validate the policy parameters.
    ///
    /// # Errors
    /// Returns an error message when a threshold lies outside [0, 1].
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ProbabilityThreshold { threshold } if !(0.0..=1.0).contains(threshold) => {
                Err(format!("Decision threshold {threshold} out of range [0, 1]"))
            }
            _ => Ok(()),
        }
    }
}

/// Complete verdict for one prediction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskVerdict {
    /// Pipeline that produced the verdict
    pub pipeline: String,

    /// Discrete predicted class (0 = no stroke, 1 = stroke)
    pub prediction: u8,

    /// Class-1 probability (0.0 to 1.0)
    pub probability: f64,

    /// Confidence in the reported risk level (0.0 to 1.0)
    pub confidence: f64,

    /// Risk classification
    pub risk_level: RiskLevel,

    /// Guidance text for the risk level
    pub guidance: Vec<String>,
}

impl RiskVerdict {
    /// Build a verdict from a model output under the given policy.
    #[must_use]
    pub fn new(pipeline: impl Into<String>, policy: DecisionPolicy, probability: f64, prediction: u8) -> Self {
        let (risk_level, confidence) = policy.classify(probability, prediction);
        Self {
            pipeline: pipeline.into(),
            prediction,
            probability,
            confidence,
            risk_level,
            guidance: risk_level.guidance().iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Risk score as a whole percentage, for progress-style display.
    #[must_use]
    pub fn risk_percent(&self) -> u8 {
        (self.probability.clamp(0.0, 1.0) * 100.0) as u8
    }
}

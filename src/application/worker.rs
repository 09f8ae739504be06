//! Batch inference workers.
//!
//! A fixed pool of threads drains a shared job queue. Every worker holds the
//! same read-only `Arc<InferenceService>`, and each job's outcome is reported
//! over a progress channel. One bad request never affects the others.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::domain::{FeatureRecord, RiskVerdict};
use crate::ports::Classifier;
use crate::preprocessing::parse_record;

use super::InferenceService;

/// One request of a batch. A request that failed to parse carries its error.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// 1-based input line
    pub line: usize,
    pub record: Result<FeatureRecord, String>,
}

/// Result of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub line: usize,
    #[serde(flatten)]
    pub result: OutcomeBody,
}

/// Verdict or isolated error of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeBody {
    Verdict(RiskVerdict),
    Error(String),
}

/// Progress updates from the worker pool.
#[derive(Debug, Clone)]
pub enum BatchProgress {
    /// A job finished
    Done(BatchOutcome),
    /// A worker found the queue empty and exited
    WorkerFinished { worker: usize },
}

/// Handle to a running worker pool.
pub struct BatchHandle {
    /// Receiver for progress updates
    pub progress_rx: Receiver<BatchProgress>,
    workers: Vec<JoinHandle<()>>,
    total: usize,
}

impl BatchHandle {
    /// Number of jobs submitted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Try to receive the next progress update (non-blocking).
    #[must_use]
    pub fn try_recv(&self) -> Option<BatchProgress> {
        self.progress_rx.try_recv().ok()
    }

    /// Block until every job is done; outcomes are returned in input order.
    #[must_use]
    pub fn wait(self) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(self.total);
        for update in &self.progress_rx {
            match update {
                BatchProgress::Done(outcome) => {
                    outcomes.push(outcome);
                    if outcomes.len() % 1000 == 0 {
                        tracing::info!("Batch progress: {}/{}", outcomes.len(), self.total);
                    }
                }
                BatchProgress::WorkerFinished { worker } => {
                    tracing::debug!("Batch worker {} finished", worker);
                }
            }
        }
        for handle in self.workers {
            if handle.join().is_err() {
                tracing::error!("A batch worker panicked");
            }
        }
        outcomes.sort_by_key(|o| o.line);
        outcomes
    }
}

/// Pool of batch inference workers.
pub struct BatchWorkerPool;

impl BatchWorkerPool {
    /// Spawn `workers` threads (at least one) over `jobs`.
    ///
    /// Returns a handle to receive progress updates.
    pub fn spawn<C>(service: Arc<InferenceService<C>>, jobs: Vec<BatchJob>, workers: usize) -> BatchHandle
    where
        C: Classifier + 'static,
    {
        let total = jobs.len();
        let (job_tx, job_rx) = mpsc::channel();
        for job in jobs {
            // The receiver is alive until the workers below exit.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (tx, rx) = mpsc::channel();
        let workers = (0..workers.max(1).min(total.max(1)))
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let service = Arc::clone(&service);
                let tx = tx.clone();
                thread::spawn(move || Self::run_worker(worker, &service, &queue, &tx))
            })
            .collect();

        tracing::info!(
            "Started batch of {} requests for {}",
            total,
            service.pipeline()
        );

        BatchHandle {
            progress_rx: rx,
            workers,
            total,
        }
    }

    fn run_worker<C>(
        worker: usize,
        service: &InferenceService<C>,
        queue: &Mutex<Receiver<BatchJob>>,
        tx: &Sender<BatchProgress>,
    ) where
        C: Classifier,
    {
        loop {
            let job = {
                let rx = queue.lock().unwrap_or_else(PoisonError::into_inner);
                rx.recv()
            };
            let Ok(job) = job else { break };

            let result = match &job.record {
                Ok(record) => match service.predict(record) {
                    Ok(verdict) => OutcomeBody::Verdict(verdict),
                    Err(e) => OutcomeBody::Error(e.to_string()),
                },
                Err(e) => OutcomeBody::Error(e.clone()),
            };

            if tx
                .send(BatchProgress::Done(BatchOutcome {
                    line: job.line,
                    result,
                }))
                .is_err()
            {
                break;
            }
        }
        let _ = tx.send(BatchProgress::WorkerFinished { worker });
    }
}

/// Parse newline-delimited JSON records into jobs. Blank lines are skipped.
#[must_use]
pub fn parse_jobs(input: &str) -> Vec<BatchJob> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| BatchJob {
            line: i + 1,
            record: parse_record(line).map_err(|e| format!("Invalid record: {e}")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PipelineConfig;
    use crate::model::ModelError;
    use crate::preprocessing::{CategoricalEncoder, CategoricalEncoderSet, Transformer};

    /// Probability grows with age so verdicts differ between requests.
    struct AgeClassifier {
        features: Vec<String>,
    }

    impl Classifier for AgeClassifier {
        fn feature_names(&self) -> &[String] {
            &self.features
        }

        fn predict_proba(&self, row: &[f64]) -> Result<f64, ModelError> {
            Ok((row[1] / 100.0).clamp(0.0, 1.0))
        }
    }

    fn service() -> Arc<InferenceService<AgeClassifier>> {
        let config = PipelineConfig::categorical();
        let crate::domain::TransformerSpec::Encoders { columns, .. } = &config.transformer else {
            panic!("Categorical pipeline uses encoders");
        };
        let encoders = columns
            .iter()
            .map(|c| CategoricalEncoder::fit(c, std::iter::empty(), true))
            .collect();
        let transformer = Transformer::Encoders(CategoricalEncoderSet::new(encoders));
        let classifier = Arc::new(AgeClassifier {
            features: config.features.clone(),
        });
        Arc::new(InferenceService::new(config, transformer, classifier).expect("Should build"))
    }

    fn input() -> String {
        let mut lines = Vec::new();
        for age in 20..60 {
            lines.push(format!(
                r#"{{"gender":"Female","age":{age},"hypertension":0,"heart_disease":0,"ever_married":"Yes","work_type":"Private","Residence_type":"Urban","avg_glucose_level":90.5,"bmi":24.1,"smoking_status":"Never smoked"}}"#
            ));
        }
        lines.push("not json".to_string());
        lines.push(String::new());
        lines.push(r#"{"gender":"Female"}"#.to_string());
        lines.join("\n")
    }

    #[test]
    fn test_concurrent_matches_sequential() {
        let service = service();
        let jobs = parse_jobs(&input());
        assert_eq!(jobs.len(), 42);

        let sequential: Vec<BatchOutcome> = jobs
            .iter()
            .map(|job| BatchOutcome {
                line: job.line,
                result: match &job.record {
                    Ok(r) => match service.predict(r) {
                        Ok(v) => OutcomeBody::Verdict(v),
                        Err(e) => OutcomeBody::Error(e.to_string()),
                    },
                    Err(e) => OutcomeBody::Error(e.clone()),
                },
            })
            .collect();

        let concurrent = BatchWorkerPool::spawn(Arc::clone(&service), jobs, 4).wait();
        assert_eq!(concurrent, sequential);
    }

    #[test]
    fn test_errors_are_isolated_per_line() {
        let outcomes = BatchWorkerPool::spawn(service(), parse_jobs(&input()), 3).wait();
        let errors: Vec<usize> = outcomes
            .iter()
            .filter(|o| matches!(o.result, OutcomeBody::Error(_)))
            .map(|o| o.line)
            .collect();
        assert_eq!(errors, vec![41, 43]);
        assert!(outcomes
            .iter()
            .filter(|o| o.line <= 40)
            .all(|o| matches!(&o.result, OutcomeBody::Verdict(v) if v.pipeline == "categorical")));

        let strict = BatchWorkerPool::spawn(service(), parse_jobs(r#"{"gender":"Female"}"#), 1).wait();
        assert!(matches!(&strict[0].result, OutcomeBody::Error(e) if e.contains("Schema mismatch")));
    }

    #[test]
    fn test_colliding_field_names_fail_their_line() {
        let mut lines: Vec<String> = input().lines().take(2).map(str::to_string).collect();
        lines[1] = lines[1].replacen('{', r#"{"BMI":49.0,"#, 1);
        let jobs = parse_jobs(&lines.join("\n"));
        assert!(jobs[0].record.is_ok());
        assert!(matches!(&jobs[1].record, Err(e) if e.contains("Schema mismatch") && e.contains("bmi")));
    }

    #[test]
    fn test_empty_batch() {
        let handle = BatchWorkerPool::spawn(service(), Vec::new(), 8);
        assert_eq!(handle.total(), 0);
        assert!(handle.wait().is_empty());
    }
}

use std::thread;

use anyhow::{bail, Result};
use prism_contracts::events::{BatchEvent, EventPayload, EventWriter};
use prism_contracts::extract::OutputExtractor;
use prism_contracts::poller::{poll_until_done, CancelToken, PollPolicy, Scheduler, StatusSource};
use prism_contracts::predictions::PredictionHandle;
use serde_json::{json, Value};

/// Submission side of a prediction client; status comes from [`StatusSource`].
pub trait PredictionClient: StatusSource + Sync {
    fn submit(&self, model_key: &str, input: &Value) -> Result<PredictionHandle>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSuccess {
    pub index: usize,
    pub prediction_id: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: usize,
    pub prediction_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    /// In submission order.
    pub successes: Vec<BatchSuccess>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.successes
            .iter()
            .flat_map(|success| success.image_urls.iter().map(String::as_str))
    }

    /// `None` when every prediction succeeded.
    pub fn notice(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(format!(
            "{} of {} generations failed",
            self.failures.len(),
            self.total
        ))
    }
}

pub struct BatchOptions<'a, S: ?Sized> {
    pub policy: PollPolicy,
    pub extractor: OutputExtractor,
    pub scheduler: &'a S,
    pub cancel: CancelToken,
    pub events: Option<EventWriter>,
}

/// Runs one submit-then-poll lifecycle per input, all at once.
///
/// Failures stay isolated to their own prediction. The batch is only an
/// error when nothing succeeded.
pub fn run_batch<C, S>(
    client: &C,
    model_key: &str,
    inputs: &[Value],
    options: &BatchOptions<'_, S>,
) -> Result<BatchReport>
where
    C: PredictionClient + ?Sized,
    S: Scheduler + Sync + ?Sized,
{
    let total = inputs.len();
    if total == 0 {
        bail!("batch needs at least one input");
    }
    record(
        options.events.as_ref(),
        BatchEvent::BatchStarted,
        json!({ "model": model_key, "count": total }),
    );

    let outcomes: Vec<Result<BatchSuccess, BatchFailure>> = thread::scope(|scope| {
        let workers: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                scope.spawn(move || run_one(client, model_key, index, input, options))
            })
            .collect();
        workers
            .into_iter()
            .enumerate()
            .map(|(index, worker)| {
                worker.join().unwrap_or_else(|_| {
                    Err(BatchFailure {
                        index,
                        prediction_id: None,
                        error: "generation worker panicked".to_string(),
                    })
                })
            })
            .collect()
    });

    let mut report = BatchReport {
        total,
        successes: Vec::new(),
        failures: Vec::new(),
    };
    for outcome in outcomes {
        match outcome {
            Ok(success) => report.successes.push(success),
            Err(failure) => report.failures.push(failure),
        }
    }

    record(
        options.events.as_ref(),
        BatchEvent::BatchFinished,
        json!({ "succeeded": report.successes.len(), "failed": report.failures.len() }),
    );
    if report.successes.is_empty() {
        let first = report
            .failures
            .first()
            .map(|failure| failure.error.as_str())
            .unwrap_or_default();
        bail!("all {total} generations failed: {first}");
    }
    if let Some(notice) = report.notice() {
        tracing::warn!(model = model_key, "{notice}");
    }
    Ok(report)
}

fn run_one<C, S>(
    client: &C,
    model_key: &str,
    index: usize,
    input: &Value,
    options: &BatchOptions<'_, S>,
) -> Result<BatchSuccess, BatchFailure>
where
    C: PredictionClient + ?Sized,
    S: Scheduler + Sync + ?Sized,
{
    let events = options.events.as_ref();
    let handle = client.submit(model_key, input).map_err(|err| {
        let failure = BatchFailure {
            index,
            prediction_id: None,
            error: format!("{err:#}"),
        };
        record(
            events,
            BatchEvent::PredictionFailed,
            json!({ "index": index, "error": failure.error }),
        );
        failure
    })?;
    record(
        events,
        BatchEvent::PredictionSubmitted,
        json!({ "index": index, "prediction_id": handle.id }),
    );

    match poll_until_done(
        &handle.id,
        options.policy,
        options.extractor.clone(),
        options.scheduler,
        client,
        &options.cancel,
    ) {
        Ok(outcome) => {
            record(
                events,
                BatchEvent::PredictionSucceeded,
                json!({
                    "index": index,
                    "prediction_id": handle.id,
                    "image_urls": outcome.image_urls,
                    "polls": outcome.polls,
                }),
            );
            Ok(BatchSuccess {
                index,
                prediction_id: handle.id,
                image_urls: outcome.image_urls,
            })
        }
        Err(err) => {
            record(
                events,
                BatchEvent::PredictionFailed,
                json!({ "index": index, "prediction_id": handle.id, "error": err.to_string() }),
            );
            Err(BatchFailure {
                index,
                prediction_id: Some(handle.id),
                error: err.to_string(),
            })
        }
    }
}

fn record(events: Option<&EventWriter>, event: BatchEvent, payload: Value) {
    let Some(events) = events else {
        return;
    };
    let payload: EventPayload = match payload {
        Value::Object(map) => map,
        _ => EventPayload::new(),
    };
    if let Err(err) = events.record(event, payload) {
        tracing::warn!(event = event.as_str(), "failed to write event: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use prism_contracts::events::EventWriter;
    use prism_contracts::extract::OutputExtractor;
    use prism_contracts::poller::{CancelToken, PollPolicy, Scheduler, StatusSource};
    use prism_contracts::predictions::{PredictionHandle, PredictionStatus, StatusReport};
    use serde_json::{json, Value};

    use super::{run_batch, BatchOptions, PredictionClient};

    /// Sleeps return immediately.
    struct NoWait;

    impl Scheduler for NoWait {
        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn sleep(&self, _delay: Duration, cancel: &CancelToken) -> bool {
            !cancel.is_canceled()
        }
    }

    /// Prompts containing "fail" are rejected like an upstream 500.
    #[derive(Default)]
    struct FakeClient {
        submitted: AtomicUsize,
    }

    impl StatusSource for FakeClient {
        fn fetch_status(&self, id: &str) -> Result<StatusReport> {
            Ok(StatusReport {
                id: id.to_string(),
                status: PredictionStatus::Succeeded,
                output: json!([format!("https://replicate.delivery/{id}/out.png")]),
                image_url: None,
                image_urls: None,
                error: None,
                logs: None,
            })
        }
    }

    impl PredictionClient for FakeClient {
        fn submit(&self, _model_key: &str, input: &Value) -> Result<PredictionHandle> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            let prompt = input["prompt"].as_str().unwrap_or_default();
            if prompt.contains("fail") {
                return Err(anyhow!("proxy request failed (500): Replicate request failed"));
            }
            Ok(PredictionHandle {
                id: prompt.to_string(),
                status: PredictionStatus::Starting,
                stream_url: None,
                web_url: None,
            })
        }
    }

    fn options(events: Option<EventWriter>) -> BatchOptions<'static, NoWait> {
        BatchOptions {
            policy: PollPolicy::default(),
            extractor: OutputExtractor::default(),
            scheduler: &NoWait,
            cancel: CancelToken::new(),
            events,
        }
    }

    #[test]
    fn one_failed_submission_is_reported_as_partial() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let client = FakeClient::default();
        let inputs = vec![
            json!({"prompt": "first"}),
            json!({"prompt": "fail second"}),
            json!({"prompt": "third"}),
        ];

        let report = run_batch(
            &client,
            "flux_1_1_pro",
            &inputs,
            &options(Some(EventWriter::new(&events_path, "batch-1"))),
        )?;

        assert_eq!(client.submitted.load(Ordering::SeqCst), 3);
        let urls: Vec<&str> = report.image_urls().collect();
        assert_eq!(
            urls,
            vec![
                "https://replicate.delivery/first/out.png",
                "https://replicate.delivery/third/out.png",
            ]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(report.failures[0].error.contains("500"));
        let notice = report.notice().unwrap_or_default();
        assert!(notice.contains("1 of 3"));

        let content = fs::read_to_string(&events_path)?;
        let types: Vec<String> = content
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).map(|v| v["type"].to_string()))
            .collect::<Result<_, _>>()?;
        assert_eq!(types.first().map(String::as_str), Some("\"batch_started\""));
        assert_eq!(types.last().map(String::as_str), Some("\"batch_finished\""));
        assert_eq!(types.len(), 7);
        Ok(())
    }

    #[test]
    fn full_success_has_no_notice() -> Result<()> {
        let client = FakeClient::default();
        let inputs = vec![json!({"prompt": "a"}), json!({"prompt": "b"})];
        let report = run_batch(&client, "imagen4", &inputs, &options(None))?;
        assert_eq!(report.successes.len(), 2);
        assert_eq!(report.successes[1].prediction_id, "b");
        assert!(report.notice().is_none());
        Ok(())
    }

    #[test]
    fn total_failure_is_an_error() {
        let client = FakeClient::default();
        let inputs = vec![json!({"prompt": "fail a"}), json!({"prompt": "fail b"})];
        let err = run_batch(&client, "imagen4", &inputs, &options(None)).unwrap_err();
        assert!(err.to_string().starts_with("all 2 generations failed"));
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(run_batch(&FakeClient::default(), "imagen4", &[], &options(None)).is_err());
    }
}

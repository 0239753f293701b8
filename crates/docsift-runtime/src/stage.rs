//! Failure containment for pipeline stages.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use docsift_core::{ExtractionResult, RawDocument, Result};
use docsift_extract::ContentExtractor;
use tracing::warn;

/// Why an extraction attempt produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The per-document bound elapsed; the worker is abandoned.
    Timeout,
    Failed(String),
}

/// Run a stage, turning both errors and panics into a message.
pub fn guard<T>(f: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one extraction strategy, bounded by `timeout` when set.
///
/// With a bound, the extractor runs on a worker thread and the caller waits
/// at most `timeout`; a worker that overruns keeps running detached and its
/// result is discarded.
pub fn run_extractor(
    extractor: Arc<dyn ContentExtractor>,
    document: Arc<RawDocument>,
    timeout: Option<Duration>,
) -> std::result::Result<ExtractionResult, ExtractionError> {
    let Some(timeout) = timeout else {
        return guard(|| extractor.extract(&document)).map_err(ExtractionError::Failed);
    };

    let (tx, rx) = mpsc::sync_channel(1);
    let name = extractor.name().to_string();
    let spawned = std::thread::Builder::new()
        .name(format!("docsift-extract-{}", name))
        .spawn(move || {
            let outcome = guard(|| extractor.extract(&document));
            // The receiver is gone after a timeout.
            let _ = tx.send(outcome);
        });
    if let Err(e) = spawned {
        return Err(ExtractionError::Failed(format!(
            "could not start extraction worker: {}",
            e
        )));
    }

    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome.map_err(ExtractionError::Failed),
        Err(RecvTimeoutError::Timeout) => {
            warn!("Extractor {} exceeded {:?}", name, timeout);
            Err(ExtractionError::Timeout)
        }
        Err(RecvTimeoutError::Disconnected) => Err(ExtractionError::Failed(format!(
            "extractor {} stopped without a result",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_core::{Error, ExtractionMethod};

    #[test]
    fn test_guard_passes_value() {
        assert_eq!(guard(|| Ok(7)), Ok(7));
    }

    #[test]
    fn test_guard_maps_error() {
        let out: std::result::Result<(), String> =
            guard(|| Err(Error::Analysis("bad signals".into())));
        assert_eq!(out, Err("Analysis error: bad signals".to_string()));
    }

    #[test]
    fn test_guard_catches_panic() {
        let out: std::result::Result<(), String> = guard(|| panic!("boom"));
        assert_eq!(out, Err("panicked: boom".to_string()));
    }

    struct Sleepy(Duration);

    impl ContentExtractor for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::PlainText
        }

        fn extract(&self, _document: &RawDocument) -> Result<ExtractionResult> {
            std::thread::sleep(self.0);
            Ok(ExtractionResult::new(
                "done".into(),
                ExtractionMethod::PlainText,
                1.0,
            ))
        }
    }

    fn doc() -> Arc<RawDocument> {
        Arc::new(RawDocument::new(b"x".to_vec(), "x.txt"))
    }

    #[test]
    fn test_timeout_elapses() {
        let out = run_extractor(
            Arc::new(Sleepy(Duration::from_secs(2))),
            doc(),
            Some(Duration::from_millis(50)),
        );
        assert_eq!(out.unwrap_err(), ExtractionError::Timeout);
    }

    #[test]
    fn test_finishes_within_bound() {
        let out = run_extractor(
            Arc::new(Sleepy(Duration::from_millis(1))),
            doc(),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(out.unwrap().text, "done");
    }

    #[test]
    fn test_unbounded_runs_inline() {
        let out = run_extractor(Arc::new(Sleepy(Duration::ZERO)), doc(), None);
        assert_eq!(out.unwrap().word_count, 1);
    }
}

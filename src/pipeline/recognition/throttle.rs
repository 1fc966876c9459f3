use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{RecognitionError, RecognitionGateway, RecognitionRequest};

/// Spaces consecutive calls to the wrapped gateway by at least `delay`,
/// measured from the end of one call to the start of the next. Does not retry.
pub struct Throttled<G> {
    inner: G,
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl<G: RecognitionGateway> Throttled<G> {
    pub fn new(inner: G, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn into_inner(self) -> G {
        self.inner
    }
}

impl<G: RecognitionGateway> RecognitionGateway for Throttled<G> {
    fn recognize(&self, request: &RecognitionRequest<'_>) -> Result<String, RecognitionError> {
        // Held across the call so concurrent callers cannot interleave.
        let mut last = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                let wait = self.delay - elapsed;
                tracing::debug!(wait_ms = %wait.as_millis(), "Throttling recognition call");
                std::thread::sleep(wait);
            }
        }

        let result = self.inner.recognize(request);
        *last = Some(Instant::now());
        result
    }
}

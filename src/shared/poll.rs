// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded polling.
//!
//! `poll_until` repeatedly runs a check at a fixed interval until it yields a
//! value or the budget is spent. Errors returned by the check are treated as
//! transient: they are logged and polling continues. Nothing here waits
//! without a bound.

use crate::shared::error::Result;
use backon::{ConstantBuilder, Retryable};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Returned when the budget ran out before the check succeeded.
#[derive(Debug, Clone)]
pub struct PollTimeout {
    pub waited: Duration,
    pub last_error: Option<String>,
}

impl fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_error {
            Some(err) => write!(f, "gave up after {:?} (last error: {})", self.waited, err),
            None => write!(f, "gave up after {:?}", self.waited),
        }
    }
}

enum Attempt {
    Pending,
    Failed(String),
}

/// Poll `check` every `interval` until it returns `Ok(Some(_))` or `budget` elapses.
pub async fn poll_until<T, F, Fut>(
    budget: Duration,
    interval: Duration,
    mut check: F,
) -> std::result::Result<T, PollTimeout>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let interval_ms = interval.as_millis().max(1);
    let max_times = (budget.as_millis() / interval_ms) as usize + 1;
    let backoff = ConstantBuilder::default()
        .with_delay(interval)
        .with_max_times(max_times);

    let attempt = || {
        let fut = check();
        async move {
            match fut.await {
                Ok(Some(value)) => Ok(value),
                Ok(None) => Err(Attempt::Pending),
                Err(e) => Err(Attempt::Failed(e.to_string())),
            }
        }
    };

    let mut last_error = None;
    let outcome = tokio::time::timeout(
        budget,
        attempt.retry(&backoff).notify(|err: &Attempt, _| {
            if let Attempt::Failed(e) = err {
                debug!(error = %e, "ignoring transient error while polling");
                last_error = Some(e.clone());
            }
        }),
    )
    .await;

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Attempt::Failed(e))) => Err(PollTimeout {
            waited: started.elapsed(),
            last_error: Some(e),
        }),
        Ok(Err(Attempt::Pending)) | Err(_) => Err(PollTimeout {
            waited: started.elapsed(),
            last_error,
        }),
    }
}

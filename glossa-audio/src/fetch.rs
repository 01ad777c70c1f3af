//! Completed-exercise fetch client
//!
//! The generation service persists an exercise in two phases: the progress
//! stream reports completion first, then the activity document becomes
//! fetchable shortly after. A fetch landing in that window gets a
//! "generating" placeholder - a legitimate transient, not an error - so the
//! await helper retries on a fixed delay.

use crate::error::{Error, Result};
use glossa_common::wire::{Activity, ExerciseResponse};
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of one completed-exercise fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// The service is still persisting; retry after a short delay
    Generating,
    /// The finished activity, audio payloads included
    Ready(Box<Activity>),
}

/// Fetch the exercise for `session_id` once.
pub async fn fetch_exercise(
    client: &reqwest::Client,
    base_url: &str,
    session_id: &str,
) -> Result<FetchOutcome> {
    let url = format!(
        "{}/exercises/{}",
        base_url.trim_end_matches('/'),
        session_id
    );
    let response = client.get(&url).send().await?.error_for_status()?;
    let body: ExerciseResponse = response.json().await?;

    if let Some(activity) = body.activity {
        info!(
            "Fetched exercise for session {} ({} audio clips)",
            session_id,
            activity.audio_data.len()
        );
        return Ok(FetchOutcome::Ready(Box::new(activity)));
    }

    match body.status.as_deref() {
        Some("generating") => Ok(FetchOutcome::Generating),
        other => Err(Error::Stream(format!(
            "unexpected exercise response status: {:?}",
            other
        ))),
    }
}

/// Fetch with fixed-backoff retries until the exercise is ready.
pub async fn await_exercise(
    client: &reqwest::Client,
    base_url: &str,
    session_id: &str,
    retry_delay: Duration,
    max_attempts: u32,
) -> Result<Activity> {
    for attempt in 1..=max_attempts {
        match fetch_exercise(client, base_url, session_id).await? {
            FetchOutcome::Ready(activity) => return Ok(*activity),
            FetchOutcome::Generating => {
                debug!(
                    "Exercise for session {} still generating (attempt {}/{})",
                    session_id, attempt, max_attempts
                );
                tokio::time::sleep(retry_delay).await;
            }
        }
    }

    Err(Error::Stream(format!(
        "exercise for session {} not ready after {} attempts",
        session_id, max_attempts
    )))
}

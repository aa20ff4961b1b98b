use shared::{error::SwapError, protocol::ProgressEvent};

const GENERIC_PROCESSING_FAILURE: &str = "Processing failed on the remote service";

/// A failed completion is returned as [`SwapError::Processing`] so the caller
/// ends the request with it.
pub fn relay(event: &ProgressEvent) -> Result<Option<String>, SwapError> {
    match event {
        ProgressEvent::Estimation { rank, rank_eta, .. } => {
            let position = rank.unwrap_or(0).saturating_add(1);
            Ok(Some(match rank_eta.and_then(rounded_seconds) {
                Some(eta) => format!("Queue position: {position} (estimated wait {eta}s)"),
                None => format!("Queue position: {position}"),
            }))
        }
        ProgressEvent::ProcessStarts { eta } => Ok(Some(match eta.and_then(rounded_seconds) {
            Some(eta) => format!("Processing... ETA {eta}s"),
            None => "Processing...".to_string(),
        })),
        ProgressEvent::ProcessCompleted { success: false, .. } => Err(SwapError::Processing(
            event
                .output_error()
                .unwrap_or_else(|| GENERIC_PROCESSING_FAILURE.to_string()),
        )),
        ProgressEvent::ProcessCompleted { success: true, .. } | ProgressEvent::Unknown => Ok(None),
    }
}

fn rounded_seconds(seconds: f64) -> Option<u64> {
    (seconds.is_finite() && seconds >= 0.0).then(|| seconds.round() as u64)
}

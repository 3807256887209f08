//! Recording download.
//!
//! Recordings become available some time after the call completes, so the
//! fetch retries on an explicit exponential schedule and is never coupled to
//! the call task's lifetime. MP3 is preferred; WAV is the fallback rendition.

use std::time::Duration;

use crate::rest::TelephonyClient;
use crate::TelephonyError;

/// Waits before attempts 2..=5.
const RETRY_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(8),
];

/// Downloaded recording bytes plus the extension that worked.
pub struct Recording {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Fetch `<url>.mp3`, falling back to `<url>.wav`, retrying each round on
/// the exponential schedule with a hard cap.
pub async fn download_recording(
    client: &TelephonyClient,
    url: &str,
) -> Result<Recording, TelephonyError> {
    let mut last_error = String::new();

    for (attempt, wait) in std::iter::once(None)
        .chain(RETRY_SCHEDULE.iter().map(Some))
        .enumerate()
    {
        if let Some(wait) = wait {
            tokio::time::sleep(*wait).await;
        }

        for extension in ["mp3", "wav"] {
            match client.get_bytes(&format!("{url}.{extension}")).await {
                Ok(bytes) if !bytes.is_empty() => {
                    tracing::debug!(attempt, extension, size = bytes.len(), "recording downloaded");
                    return Ok(Recording { bytes, extension });
                }
                Ok(_) => last_error = "empty recording body".to_string(),
                Err(e) => last_error = e.to_string(),
            }
        }
    }

    Err(TelephonyError::RecordingUnavailable(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_is_exponential_with_cap() {
        let total: Duration = RETRY_SCHEDULE.iter().sum();
        assert_eq!(total, Duration::from_secs(15));
        for pair in RETRY_SCHEDULE.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }
}

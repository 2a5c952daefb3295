//! Bounded waits for external calls.

use std::future::Future;
use std::time::Duration;

use medassist_config::TimeoutConfig;
use medassist_core::error::ProviderError;

/// Deadlines applied to each kind of external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub classify: Duration,
    pub answer: Duration,
    /// Maximum wait between two streamed frames
    pub frame: Option<Duration>,
    pub vision: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            classify: Duration::from_secs(config.classify_secs),
            answer: Duration::from_secs(config.answer_secs),
            frame: Some(Duration::from_secs(config.frame_secs)),
            vision: Duration::from_secs(config.vision_secs),
        }
    }
}

/// Run `call`, turning an elapsed deadline into `ProviderError::Timeout`.
pub(crate) async fn within<T, F>(limit: Duration, what: &str, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(format!("{what} exceeded {limit:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_seconds() {
        let t = Timeouts::from(&TimeoutConfig {
            classify_secs: 1,
            answer_secs: 2,
            frame_secs: 3,
            vision_secs: 4,
        });
        assert_eq!(t.classify, Duration::from_secs(1));
        assert_eq!(t.answer, Duration::from_secs(2));
        assert_eq!(t.frame, Some(Duration::from_secs(3)));
        assert_eq!(t.vision, Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_a_timeout_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ProviderError>(1)
        };
        let err = within(Duration::from_millis(50), "answer", slow)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(ref m) if m.contains("answer")));
    }

    #[tokio::test]
    async fn inner_result_passes_through() {
        let ok = within(Duration::from_secs(1), "x", async { Ok::<_, ProviderError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        let err = within(Duration::from_secs(1), "x", async {
            Err::<u8, _>(ProviderError::Network("down".into()))
        })
        .await;
        assert!(matches!(err, Err(ProviderError::Network(_))));
    }
}

//! # Request/Retry Correlator
//!
//! Requests one packet type from the drone and waits for its arrival.
//!
//! The drone answers over a lossy radio hop, so a request is sent up to three
//! times: once at the start, then again after each resend threshold. Success
//! is observed purely through the storage count for the requested type.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::Link;
use crate::packet::payload::{Payload, Request};
use crate::packet::protocol::DataType;

impl Link {
    /// Request `data_type` and wait until a fresh packet of that type arrives
    ///
    /// If `min_interval` is given and the last packet of this type arrived
    /// more recently than that, nothing is sent and `false` is returned; the
    /// cached value stays available through [`latest`](Link::latest).
    ///
    /// Polls every `poll_interval` and gives up on the first poll at or after
    /// `timeout`, so with the default timings the wait is at most 150 ms.
    ///
    /// Never fails: a send error counts as a dropped request.
    pub async fn fetch(&self, data_type: DataType, min_interval: Option<Duration>) -> bool {
        let config = &self.shared.config.fetch;
        let storage = &self.shared.storage;
        let background = self.shared.config.transport.background_processing;
        let start = Instant::now();

        if let (Some(min_interval), Some(last)) = (min_interval, storage.received_at(data_type)) {
            if start.saturating_duration_since(last) < min_interval {
                debug!("{:?} is fresh, not requesting", data_type);
                return false;
            }
        }

        let before = storage.count(data_type);

        self.request_quietly(data_type).await;
        let mut resends = [config.first_resend(), config.second_resend()].into_iter().peekable();

        loop {
            if !background {
                self.drain_all().await;
            }
            if storage.count(data_type) > before {
                return true;
            }

            let elapsed = start.elapsed();
            if elapsed >= config.timeout() {
                debug!("No {:?} after {:?}", data_type, elapsed);
                return false;
            }
            if resends.next_if(|&at| elapsed > at).is_some() {
                debug!("Resending request for {:?}", data_type);
                self.request_quietly(data_type).await;
            }

            sleep(config.poll_interval()).await;
        }
    }

    async fn request_quietly(&self, data_type: DataType) {
        let request: Payload = Request { data_type }.into();
        if let Err(e) = self.send(request).await {
            warn!("Request for {:?} failed: {}", data_type, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::link::mock_link;
    use crate::packet::encoder::encode_payload;
    use crate::packet::payload::Attitude;
    use crate::serial::port_trait::mocks::requested_type;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    /// Answer only the `answer_on`-th request for attitude
    fn answer_nth(answer_on: usize) -> (Arc<AtomicUsize>, impl FnMut(&[u8]) -> Option<Vec<u8>>) {
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = requests.clone();
        let responder = move |frame: &[u8]| {
            if requested_type(frame) != Some(DataType::Attitude) {
                return None;
            }
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            (n == answer_on).then(|| {
                encode_payload(&Attitude { roll: 5, pitch: 6, yaw: 7 }.into()).to_vec()
            })
        };
        (requests, responder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_answered_immediately() {
        let (mut link, line) = mock_link(&Config::default());
        let (requests, responder) = answer_nth(1);
        line.set_responder(responder);

        let start = Instant::now();
        assert!(link.fetch(DataType::Attitude, None).await);
        assert!(start.elapsed() <= Duration::from_millis(20));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(link.latest::<Attitude>().map(|a| a.yaw), Some(7));

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_succeeds_on_third_request() {
        let (mut link, line) = mock_link(&Config::default());
        let (requests, responder) = answer_nth(3);
        line.set_responder(responder);

        let start = Instant::now();
        assert!(link.fetch(DataType::Attitude, None).await);
        assert!(start.elapsed() <= Duration::from_millis(150));
        assert_eq!(requests.load(Ordering::SeqCst), 3);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_gives_up_after_timeout() {
        let (mut link, line) = mock_link(&Config::default());

        let start = Instant::now();
        assert!(!link.fetch(DataType::Attitude, None).await);

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(160));
        assert_eq!(line.requests(), vec![DataType::Attitude; 3]);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_rate_limited() {
        let (mut link, line) = mock_link(&Config::default());
        let (requests, responder) = answer_nth(1);
        line.set_responder(responder);

        assert!(link.fetch(DataType::Attitude, None).await);

        // Fresh value: completes on the first poll without sending
        let mut fetch = task::spawn(link.fetch(DataType::Attitude, Some(Duration::from_millis(100))));
        assert!(!assert_ready!(fetch.poll()));
        drop(fetch);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(link.latest::<Attitude>().is_some());

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_waits_for_reply() {
        let (mut link, line) = mock_link(&Config::default());

        let mut fetch = task::spawn(link.fetch(DataType::Attitude, None));
        assert_pending!(fetch.poll());
        assert_eq!(line.requests(), vec![DataType::Attitude]);
        drop(fetch);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_after_min_interval_requests_again() {
        let (mut link, line) = mock_link(&Config::default());
        line.set_responder(|frame| {
            (requested_type(frame) == Some(DataType::Attitude))
                .then(|| encode_payload(&Attitude::default().into()).to_vec())
        });

        assert!(link.fetch(DataType::Attitude, None).await);
        sleep(Duration::from_millis(150)).await;
        assert!(link.fetch(DataType::Attitude, Some(Duration::from_millis(100))).await);
        assert_eq!(link.count(DataType::Attitude), 2);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_in_foreground_mode() {
        let mut config = Config::default();
        config.transport.background_processing = false;
        let (mut link, line) = mock_link(&config);
        let (_requests, responder) = answer_nth(2);
        line.set_responder(responder);

        assert!(link.fetch(DataType::Attitude, None).await);
        assert_eq!(link.count(DataType::Attitude), 1);

        link.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_swallows_send_errors() {
        let (mut link, line) = mock_link(&Config::default());
        line.set_write_error(io::ErrorKind::BrokenPipe);

        assert!(!link.fetch(DataType::State, None).await);

        link.close().await;
    }
}

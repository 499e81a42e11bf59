//! Retry driver for RPCs
//!
//! [`ConnectionManager::execute`] runs one operation against whatever
//! channel the selector hands out. A failed call is classified into a
//! [`ReconnectionSignal`] which is reported back to the selector before the
//! status is turned into a typed [`Error`]:
//!
//! | signal        | action                              |
//! |---------------|-------------------------------------|
//! | `NewLeader`   | retry at once on the leader          |
//! | `Rediscover`  | back off, retry after rediscovery    |
//! | `None`        | return the error to the caller       |
//!
//! Every operation gets a fresh [`BackoffPolicy`] and at most
//! `max_discover_attempts` attempts.

use crate::backoff::{BackoffPolicy, BackoffPolicyFactory};
use crate::channel_cache::{Channel, ChannelCache};
use crate::gossip::GossipClient;
use crate::reconnect::ReconnectionSignal;
use crate::selector::ChannelSelector;
use crate::settings::{ClientSettings, Credentials};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chronicle_protocol::headers;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::metadata::{AsciiMetadataValue, MetadataValue};
use tonic::Status;
use tracing::{debug, info, warn};

/// Per-call request decoration: credentials, deadline, leader routing
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    authorization: Option<AsciiMetadataValue>,
    deadline: Option<Duration>,
    requires_leader: bool,
}

impl CallOptions {
    /// Options derived from client settings
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let authorization = settings
            .credentials
            .as_ref()
            .map(basic_authorization)
            .transpose()?;
        Ok(Self {
            authorization,
            deadline: settings.default_deadline,
            requires_leader: false,
        })
    }

    /// Replace the client-wide credentials for this call
    pub fn with_credentials(mut self, credentials: &Credentials) -> Result<Self> {
        self.authorization = Some(basic_authorization(credentials)?);
        Ok(self)
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn requires_leader(mut self, requires_leader: bool) -> Self {
        self.requires_leader = requires_leader;
        self
    }

    /// Wrap `message` in a request carrying these options
    pub fn request<M>(&self, message: M) -> tonic::Request<M> {
        let mut request = tonic::Request::new(message);
        if let Some(deadline) = self.deadline {
            request.set_timeout(deadline);
        }
        let metadata = request.metadata_mut();
        if let Some(authorization) = &self.authorization {
            metadata.insert(headers::AUTHORIZATION, authorization.clone());
        }
        metadata.insert(
            headers::REQUIRES_LEADER,
            MetadataValue::from_static(if self.requires_leader { "true" } else { "false" }),
        );
        request
    }
}

fn basic_authorization(credentials: &Credentials) -> Result<AsciiMetadataValue> {
    let token = BASE64.encode(format!("{}:{}", credentials.username, credentials.password));
    AsciiMetadataValue::try_from(format!("Basic {}", token))
        .map_err(|e| Error::InvalidConfig(format!("invalid credentials header: {}", e)))
}

/// Owns the channel cache and selector of one client
pub struct ConnectionManager {
    cache: Arc<ChannelCache>,
    selector: ChannelSelector,
    gossip: Arc<dyn GossipClient>,
    backoff: BackoffPolicyFactory,
    max_attempts: u32,
    gossip_timeout: Duration,
    options: CallOptions,
}

impl ConnectionManager {
    pub fn new(settings: &ClientSettings, gossip: Arc<dyn GossipClient>) -> Result<Self> {
        settings.validate()?;
        let cache = Arc::new(ChannelCache::new(settings)?);
        let selector = ChannelSelector::from_settings(settings, cache.clone(), gossip.clone())?;
        Ok(Self {
            cache,
            selector,
            gossip,
            backoff: BackoffPolicyFactory::from_settings(settings),
            max_attempts: settings.max_discover_attempts,
            gossip_timeout: settings.gossip_timeout,
            options: CallOptions::from_settings(settings)?,
        })
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    pub fn cache(&self) -> &ChannelCache {
        &self.cache
    }

    pub fn gossip(&self) -> &dyn GossipClient {
        self.gossip.as_ref()
    }

    pub fn gossip_timeout(&self) -> Duration {
        self.gossip_timeout
    }

    /// Client-wide call options
    pub fn call_options(&self) -> CallOptions {
        self.options.clone()
    }

    /// Run `op` until it succeeds, fails with an application error, runs
    /// out of attempts, or `cancel` fires
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(Channel) -> Fut,
        Fut: Future<Output = std::result::Result<T, Status>>,
    {
        let mut backoff = self.backoff.create();
        let mut last_error: Option<Error> = None;

        for attempt in 1..=self.max_attempts {
            let more = attempt < self.max_attempts;

            let channel = match self.selector.select_channel(cancel).await {
                Ok(channel) => channel,
                Err(e) if e.is_connectivity() => {
                    warn!("Channel selection failed on attempt {}: {}", attempt, e);
                    last_error = Some(e);
                    if more {
                        self.pause(&mut backoff, cancel).await?;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let endpoint = channel.endpoint().clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = op(channel) => result,
            };

            let status = match result {
                Ok(value) => return Ok(value),
                Err(status) => status,
            };

            let signal = ReconnectionSignal::from_status(&status);
            self.selector.report(signal.clone()).await;
            let error = Error::from(status);

            match signal {
                ReconnectionSignal::None => return Err(error),
                ReconnectionSignal::NewLeader(leader) => {
                    info!(
                        "{} is not leader, retrying on {} (attempt {})",
                        endpoint, leader, attempt
                    );
                }
                ReconnectionSignal::Rediscover => {
                    warn!(
                        "Call to {} failed on attempt {}: {}",
                        endpoint, attempt, error
                    );
                    if more {
                        self.pause(&mut backoff, cancel).await?;
                    }
                }
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or(Error::DiscoveryExhausted { attempts: 0 }))
    }

    async fn pause(&self, backoff: &mut BackoffPolicy, cancel: &CancellationToken) -> Result<()> {
        let delay = backoff.next_backoff();
        debug!("Backing off for {:?}", delay);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Close every channel; later calls fail with [`Error::ShutDown`]
    pub fn shutdown(&self) {
        self.selector.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::gossip::{ClusterTopology, MemberInfo, MemberState};
    use async_trait::async_trait;
    use chronicle_protocol::headers::exceptions;
    use parking_lot::Mutex;

    /// Every node reports `leader` as the cluster leader
    struct StaticGossip {
        leader: Mutex<Endpoint>,
        calls: Mutex<usize>,
    }

    impl StaticGossip {
        fn new(leader: Endpoint) -> Arc<Self> {
            Arc::new(Self {
                leader: Mutex::new(leader),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl GossipClient for StaticGossip {
        async fn get_cluster_info(
            &self,
            _channel: &Channel,
            _timeout: Duration,
        ) -> Result<ClusterTopology> {
            *self.calls.lock() += 1;
            let leader = self.leader.lock().clone();
            Ok(ClusterTopology::new(vec![MemberInfo::new(
                leader,
                MemberState::Leader,
                true,
            )]))
        }
    }

    fn manager(gossip: Arc<StaticGossip>, attempts: u32) -> ConnectionManager {
        let settings = ClientSettings::builder()
            .gossip_seeds(vec![Endpoint::new("seed", 2113)])
            .tls(false)
            .max_discover_attempts(attempts)
            .backoff(Duration::from_millis(100), Duration::from_secs(1))
            .build()
            .unwrap();
        ConnectionManager::new(&settings, gossip).unwrap()
    }

    fn not_leader(host: &str) -> Status {
        let mut status = Status::not_found("not leader");
        let md = status.metadata_mut();
        md.insert(headers::EXCEPTION, MetadataValue::from_static(exceptions::NOT_LEADER));
        md.insert(
            headers::LEADER_ENDPOINT_HOST,
            MetadataValue::try_from(host).unwrap(),
        );
        md.insert(headers::LEADER_ENDPOINT_PORT, MetadataValue::from_static("2113"));
        status
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let gossip = StaticGossip::new(Endpoint::new("a", 2113));
        let manager = manager(gossip.clone(), 3);

        let result = manager
            .execute(&CancellationToken::new(), |channel| async move {
                Ok::<_, Status>(channel.endpoint().host().to_string())
            })
            .await
            .unwrap();

        assert_eq!(result, "a");
        assert_eq!(*gossip.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_not_leader_retries_on_leader_without_gossip() {
        let gossip = StaticGossip::new(Endpoint::new("a", 2113));
        let manager = manager(gossip.clone(), 3);
        let seen = Mutex::new(Vec::new());

        let result = manager
            .execute(&CancellationToken::new(), |channel| {
                let host = channel.endpoint().host().to_string();
                seen.lock().push(host.clone());
                async move {
                    if host == "a" {
                        Err(not_leader("b"))
                    } else {
                        Ok(host)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "b");
        assert_eq!(*seen.lock(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(*gossip.calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_rediscovers_until_exhausted() {
        let gossip = StaticGossip::new(Endpoint::new("a", 2113));
        let manager = manager(gossip.clone(), 3);
        let calls = Mutex::new(0);

        let err = manager
            .execute(&CancellationToken::new(), |_channel| {
                *calls.lock() += 1;
                async { Err::<(), _>(Status::unavailable("connection refused")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ConnectionError(_)));
        assert_eq!(*calls.lock(), 3);
        assert_eq!(*gossip.calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rediscovery_finds_moved_leader() {
        let gossip = StaticGossip::new(Endpoint::new("a", 2113));
        let manager = manager(gossip.clone(), 5);

        let result = manager
            .execute(&CancellationToken::new(), |channel| {
                let host = channel.endpoint().host().to_string();
                *gossip.leader.lock() = Endpoint::new("b", 2113);
                async move {
                    if host == "a" {
                        Err(Status::unavailable("node down"))
                    } else {
                        Ok(host)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "b");
    }

    #[tokio::test]
    async fn test_application_error_returned_immediately() {
        let gossip = StaticGossip::new(Endpoint::new("a", 2113));
        let manager = manager(gossip, 5);
        let calls = Mutex::new(0);

        let err = manager
            .execute(&CancellationToken::new(), |_channel| {
                *calls.lock() += 1;
                async { Err::<(), _>(Status::permission_denied("no")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AccessDenied(_)));
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_during_backoff() {
        let gossip = StaticGossip::new(Endpoint::new("a", 2113));
        let settings = ClientSettings::builder()
            .gossip_seeds(vec![Endpoint::new("seed", 2113)])
            .tls(false)
            .backoff(Duration::from_secs(3600), Duration::from_secs(3600))
            .build()
            .unwrap();
        let manager = ConnectionManager::new(&settings, gossip).unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let err = manager
            .execute(&cancel, move |_channel| {
                trigger.cancel();
                async { Err::<(), _>(Status::unavailable("down")) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_call_options_decorate_request() {
        let options = CallOptions::default()
            .with_credentials(&Credentials::new("admin", "changeit"))
            .unwrap()
            .with_deadline(Duration::from_secs(2))
            .requires_leader(true);
        let request = options.request(());

        let md = request.metadata();
        assert_eq!(
            md.get(headers::AUTHORIZATION).unwrap().to_str().unwrap(),
            "Basic YWRtaW46Y2hhbmdlaXQ="
        );
        assert_eq!(
            md.get(headers::REQUIRES_LEADER).unwrap().to_str().unwrap(),
            "true"
        );
        assert!(md.get("grpc-timeout").is_some());
    }

    #[tokio::test]
    async fn test_shutdown_fails_later_calls() {
        let gossip = StaticGossip::new(Endpoint::new("a", 2113));
        let manager = manager(gossip, 3);
        manager.shutdown();

        let err = manager
            .execute(&CancellationToken::new(), |_channel| async { Ok::<_, Status>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ShutDown));
    }
}

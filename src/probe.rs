use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client as PingClient, Config as PingConfig, PingIdentifier, PingSequence, ICMP};
use tracing::{debug, info};

/// Echo requests sent per probe.
pub const PROBE_COUNT: u16 = 3;

const PAYLOAD: [u8; 56] = [0u8; 56];

/// Reduces a reachability check to a yes/no answer.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Never fails: any error while probing counts as unreachable.
    async fn probe(&self, address: &str, timeout: Duration) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PingStats {
    pub sent: u16,
    pub received: u16,
    pub avg_rtt_ms: Option<f64>,
}

impl PingStats {
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        f64::from(self.sent - self.received) * 100.0 / f64::from(self.sent)
    }
}

pub struct IcmpProber {
    dns_resolver: TokioResolver,
}

impl IcmpProber {
    pub fn new() -> Self {
        let dns_resolver = TokioResolver::builder_with_config(
            ResolverConfig::cloudflare(),
            TokioConnectionProvider::default(),
        )
        .build();
        Self { dns_resolver }
    }

    async fn resolve(&self, address: &str) -> Result<IpAddr> {
        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(ip);
        }
        let lookup = self
            .dns_resolver
            .lookup_ip(address)
            .await
            .with_context(|| format!("DNS resolution failed for {}", address))?;
        lookup.iter().next().ok_or_else(|| anyhow!("no IP address found for {}", address))
    }

    /// Sends the full burst and counts replies.
    async fn ping(&self, address: &str, timeout: Duration) -> Result<PingStats> {
        let ip = self.resolve(address).await?;

        // Built per probe: creation fails without raw-socket privileges.
        let config = match ip {
            IpAddr::V4(_) => PingConfig::default(),
            IpAddr::V6(_) => PingConfig::builder().kind(ICMP::V6).build(),
        };
        let client = PingClient::new(&config).context("failed to create ICMP client")?;

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        let mut stats = PingStats::default();
        let mut total_rtt = Duration::ZERO;
        for seq in 0..PROBE_COUNT {
            stats.sent += 1;
            match pinger.ping(PingSequence(seq), &PAYLOAD).await {
                Ok((_, rtt)) => {
                    stats.received += 1;
                    total_rtt += rtt;
                }
                Err(e) => debug!("Echo {} to {} failed: {}", seq, ip, e),
            }
        }
        if stats.received > 0 {
            stats.avg_rtt_ms =
                Some(total_rtt.as_secs_f64() * 1000.0 / f64::from(stats.received));
        }
        Ok(stats)
    }
}

impl Default for IcmpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, address: &str, timeout: Duration) -> bool {
        match self.ping(address, timeout).await {
            Ok(stats) => {
                info!(
                    sent = stats.sent,
                    received = stats.received,
                    loss_percent = stats.loss_percent(),
                    avg_rtt_ms = stats.avg_rtt_ms.unwrap_or_default(),
                    "Ping {} finished",
                    address
                );
                stats.received > 0
            }
            Err(e) => {
                debug!("Probe of {} could not run: {:#}", address, e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted prober that counts invocations.
    #[derive(Default)]
    pub(crate) struct FakeProber {
        pub calls: AtomicUsize,
        pub reachable: AtomicBool,
        pub delay: Option<Duration>,
    }

    impl FakeProber {
        pub fn reachable() -> Arc<Self> {
            let prober = Self::default();
            prober.reachable.store(true, Ordering::SeqCst);
            Arc::new(prober)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, _address: &str, _timeout: Duration) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reachable.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn unresolvable_host_is_unreachable() {
        let prober = IcmpProber::new();

        assert!(!prober.probe("no-such-host.invalid", Duration::from_secs(1)).await);
    }

    #[test]
    fn loss_is_computed_from_the_burst() {
        let stats = PingStats { sent: 3, received: 1, avg_rtt_ms: Some(12.0) };
        assert!((stats.loss_percent() - 66.666).abs() < 0.01);
        assert_eq!(PingStats::default().loss_percent(), 100.0);
    }
}

//! beacon-statsd — push-based metrics side channel.
//!
//! Emits DogStatsD line-format datagrams (`name:value|type|#tag,...`) over
//! UDP to a local agent. This path is independent of the pull-based
//! registry: it carries application-level events (signups) rather than
//! per-request HTTP metrics.
//!
//! Delivery is fire-and-forget. UDP send failures are logged at debug and
//! dropped; the client never fails a request on behalf of telemetry.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::debug;

/// StatsD client handle. Cheap to clone; `disabled()` yields a no-op
/// client for deployments without an agent (and for tests).
#[derive(Clone)]
pub struct StatsdClient {
    inner: Option<Arc<UdpSocket>>,
}

impl StatsdClient {
    /// Bind an ephemeral local socket and connect it to the agent address.
    pub async fn bind(agent: SocketAddr) -> io::Result<Self> {
        let bind_addr: SocketAddr = if agent.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(agent).await?;
        debug!(%agent, "statsd client connected");
        Ok(Self {
            inner: Some(Arc::new(socket)),
        })
    }

    /// A client that silently drops every metric.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Increment a counter by one.
    pub async fn incr(&self, name: &str, tags: &[String]) {
        self.send(&format_line(name, "1", "c", tags)).await;
    }

    /// Record a histogram sample.
    pub async fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        self.send(&format_line(name, &value.to_string(), "h", tags))
            .await;
    }

    async fn send(&self, line: &str) {
        let Some(socket) = &self.inner else {
            return;
        };
        if let Err(e) = socket.send(line.as_bytes()).await {
            debug!(error = %e, line, "statsd send failed");
        }
    }
}

fn format_line(name: &str, value: &str, kind: &str, tags: &[String]) -> String {
    if tags.is_empty() {
        format!("{name}:{value}|{kind}")
    } else {
        format!("{name}:{value}|{kind}|#{}", tags.join(","))
    }
}

//! Health probes

use crate::error::{ProbeError, ProbeResult};
use crate::service::Service;
use async_trait::async_trait;
use std::str::FromStr;
use tokio::net::TcpStream;

/// A single liveness check against one instance.
///
/// Implementations do not need their own deadline; the
/// [`HealthChecker`](crate::HealthChecker) bounds every call.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, service: &Service) -> ProbeResult<()>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Which probe to build from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Http,
    Tcp,
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProbeKind::Http),
            "tcp" => Ok(ProbeKind::Tcp),
            other => Err(format!("unknown probe kind '{}'", other)),
        }
    }
}

/// HTTP GET probe; any 2xx response is healthy.
pub struct HttpProbe {
    client: reqwest::Client,
    health_path: String,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            health_path: "/health".to_string(),
        }
    }

    /// Path appended to `http://address:port` when the instance has no
    /// explicit health check URL.
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, service: &Service) -> ProbeResult<()> {
        let url = service.health_url(&self.health_path);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_connect() {
                ProbeError::Connection(e.to_string())
            } else {
                ProbeError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::UnhealthyStatus(status.as_u16()))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// TCP connect probe; an accepted connection is healthy.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, service: &Service) -> ProbeResult<()> {
        TcpStream::connect((service.address.as_str(), service.port))
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Connection(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `count` HTTP requests with a fixed status line.
    async fn serve(status_line: &'static str, count: usize) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            for _ in 0..count {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        port
    }

    fn http_probe() -> HttpProbe {
        HttpProbe::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
    }

    #[test]
    fn test_probe_kind_from_str() {
        assert_eq!("HTTP".parse::<ProbeKind>(), Ok(ProbeKind::Http));
        assert_eq!("tcp".parse::<ProbeKind>(), Ok(ProbeKind::Tcp));
        assert!("grpc".parse::<ProbeKind>().is_err());
    }

    #[tokio::test]
    async fn test_http_probe_success() {
        let port = serve("200 OK", 1).await;
        let service = Service::new("api", "127.0.0.1", port);

        assert!(http_probe().probe(&service).await.is_ok());
    }

    #[tokio::test]
    async fn test_http_probe_unhealthy_status() {
        let port = serve("503 Service Unavailable", 1).await;
        let service = Service::new("api", "127.0.0.1", port);

        let result = http_probe().probe(&service).await;
        assert!(matches!(result, Err(ProbeError::UnhealthyStatus(503))));
    }

    #[tokio::test]
    async fn test_http_probe_uses_explicit_url() {
        let port = serve("204 No Content", 1).await;
        let service = Service::new("api", "192.0.2.1", 1)
            .with_health_check(format!("http://127.0.0.1:{}/ready", port));

        assert!(http_probe().probe(&service).await.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let service = Service::new("db", "127.0.0.1", port);
        assert!(TcpProbe.probe(&service).await.is_ok());

        drop(listener);
        let result = TcpProbe.probe(&service).await;
        assert!(matches!(result, Err(ProbeError::Connection(_))));
    }
}

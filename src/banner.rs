//! Banner grabbing for open TCP connections.
//!
//! Each protocol the fingerprinter understands has a handler that returns
//! an explicit [`Banner`]. Handlers are selected through a dispatch table
//! keyed by service name. A whole grab, across every read and write, shares
//! one deadline derived from the probe timeout, and any fault degrades to
//! [`Banner::NotFound`].

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Bytes read from an SSH identification string.
const SSH_BANNER_SIZE: usize = 50;

/// Bytes read from an FTP greeting.
const FTP_BANNER_SIZE: usize = 100;

/// Upper bound on an HTTP response head.
const MAX_HTTP_HEAD_SIZE: usize = 1024;

/// Request methods tried in order until one yields identifying headers.
const HTTP_METHODS: &[&str] = &["HEAD", "GET", "OPTIONS"];

/// Response headers that identify the server implementation.
const HTTP_BANNER_HEADERS: &[&str] = &["Server", "X-Powered-By", "X-AspNet-Version"];

const USER_AGENT: &str = concat!("portsight/", env!("CARGO_PKG_VERSION"));

/// Outcome of a banner grab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    /// Identifying text returned by the service.
    Found(String),
    /// Nothing usable was obtained.
    NotFound,
}

impl Banner {
    fn from_text(text: String) -> Self {
        if text.is_empty() {
            Self::NotFound
        } else {
            Self::Found(text)
        }
    }

    /// The banner text, if any.
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Found(text) => Some(text),
            Self::NotFound => None,
        }
    }
}

/// What a protocol handler needs besides the stream itself.
#[derive(Debug, Clone, Copy)]
pub struct ProbeContext<'a> {
    /// Host used for the HTTP `Host` header.
    pub host: &'a str,
    /// Instant by which the whole grab must finish.
    pub deadline: Instant,
}

/// A protocol-specific banner handler.
#[async_trait]
pub trait BannerProbe: Send + Sync {
    /// Attempt to elicit a banner on an already connected stream.
    async fn grab(&self, stream: &mut TcpStream, ctx: ProbeContext<'_>) -> io::Result<Banner>;
}

/// Reads the greeting a server sends unsolicited right after connect.
pub struct GreetingProbe {
    max_bytes: usize,
}

#[async_trait]
impl BannerProbe for GreetingProbe {
    async fn grab(&self, stream: &mut TcpStream, ctx: ProbeContext<'_>) -> io::Result<Banner> {
        let mut buffer = vec![0u8; self.max_bytes];
        let n = with_deadline(ctx.deadline, stream.read(&mut buffer)).await?;
        Ok(Banner::from_text(sanitize_banner(&buffer[..n])))
    }
}

/// Issues minimal HTTP requests and collects identifying response headers.
pub struct HttpProbe;

#[async_trait]
impl BannerProbe for HttpProbe {
    async fn grab(&self, stream: &mut TcpStream, ctx: ProbeContext<'_>) -> io::Result<Banner> {
        for method in HTTP_METHODS {
            if Instant::now() >= ctx.deadline {
                break;
            }
            let request = format!(
                "{} / HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\n\r\n",
                method, ctx.host, USER_AGENT
            );
            with_deadline(ctx.deadline, stream.write_all(request.as_bytes())).await?;

            let head = read_response_head(stream, ctx.deadline).await?;
            if head.is_empty() {
                // peer closed the connection, later methods cannot succeed
                break;
            }

            let values = extract_server_headers(&String::from_utf8_lossy(&head));
            if !values.is_empty() {
                return Ok(Banner::Found(values.join(", ")));
            }
        }
        Ok(Banner::NotFound)
    }
}

static SSH_PROBE: GreetingProbe = GreetingProbe {
    max_bytes: SSH_BANNER_SIZE,
};
static FTP_PROBE: GreetingProbe = GreetingProbe {
    max_bytes: FTP_BANNER_SIZE,
};
static HTTP_PROBE: HttpProbe = HttpProbe;

/// Dispatch table: service name to the handler that knows its protocol.
static HANDLERS: &[(&str, &dyn BannerProbe)] = &[
    ("ssh", &SSH_PROBE),
    ("ftp", &FTP_PROBE),
    ("http", &HTTP_PROBE),
    ("https", &HTTP_PROBE),
    ("http-alt", &HTTP_PROBE),
    ("https-alt", &HTTP_PROBE),
    ("http-proxy", &HTTP_PROBE),
    ("www", &HTTP_PROBE),
    ("www-http", &HTTP_PROBE),
];

/// Find the handler for a service name.
pub fn handler_for(service: &str) -> Option<&'static dyn BannerProbe> {
    HANDLERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(service))
        .map(|(_, handler)| *handler)
}

/// Whether the fingerprinter knows how to banner-grab `service`.
pub fn supports(service: &str) -> bool {
    handler_for(service).is_some()
}

/// Best-effort protocol-aware banner grabbing.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    budget: Duration,
}

impl Fingerprinter {
    /// Create a fingerprinter that gives each grab `budget` in total.
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Grab a banner from `stream`, assuming it speaks `service`.
    ///
    /// Never fails: unknown services, timeouts and socket faults all
    /// yield [`Banner::NotFound`].
    pub async fn fingerprint(&self, stream: &mut TcpStream, service: &str, host: &str) -> Banner {
        let Some(handler) = handler_for(service) else {
            return Banner::NotFound;
        };

        let ctx = ProbeContext {
            host,
            deadline: Instant::now() + self.budget,
        };
        match handler.grab(stream, ctx).await {
            Ok(banner) => banner,
            Err(e) => {
                debug!(service, error = %e, "banner grab failed");
                Banner::NotFound
            }
        }
    }
}

/// Append a banner to a service label, e.g. `ssh (SSH-2.0-OpenSSH_8.2)`.
pub fn annotate(service: &str, banner: &Banner) -> String {
    match banner.as_deref() {
        Some(text) => format!("{} ({})", service, text),
        None => service.to_string(),
    }
}

async fn with_deadline<T>(
    deadline: Instant,
    fut: impl std::future::Future<Output = io::Result<T>>,
) -> io::Result<T> {
    timeout_at(deadline, fut)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "banner I/O timed out"))?
}

/// Read until the end of the response head, EOF, the size cap or the deadline.
async fn read_response_head(stream: &mut TcpStream, deadline: Instant) -> io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(MAX_HTTP_HEAD_SIZE);
    let mut chunk = [0u8; 512];

    loop {
        let n = match timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(read) => read?,
            // keep a partial head rather than discarding it
            Err(_) if !head.is_empty() => break,
            Err(_) => {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no HTTP response"));
            }
        };
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if head.len() >= MAX_HTTP_HEAD_SIZE || head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    head.truncate(MAX_HTTP_HEAD_SIZE);
    Ok(head)
}

/// Pull identifying header values out of a raw response head.
fn extract_server_headers(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(name, _)| {
            HTTP_BANNER_HEADERS
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(name.trim()))
        })
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Sanitize banner by removing non-printable characters and collapsing whitespace.
fn sanitize_banner(data: &[u8]) -> String {
    let s: String = data
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else if b == b'\r' || b == b'\n' || b == b'\t' {
                ' '
            } else {
                '.'
            }
        })
        .collect();

    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    const TEST_TIMEOUT: Duration = Duration::from_millis(500);

    /// Accept one connection on an ephemeral port and hand it to `serve`.
    async fn serve_once<F, Fut>(serve: F) -> SocketAddr
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                serve(stream).await;
            }
        });
        addr
    }

    async fn grab(addr: SocketAddr, service: &str) -> Banner {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        Fingerprinter::new(TEST_TIMEOUT)
            .fingerprint(&mut stream, service, "localhost")
            .await
    }

    #[test]
    fn test_sanitize_banner() {
        assert_eq!(sanitize_banner(b"SSH-2.0-OpenSSH_8.9\r\n"), "SSH-2.0-OpenSSH_8.9");
        assert_eq!(sanitize_banner(b"\x00\x01Hello\x02World\x03"), "..Hello.World.");
        assert_eq!(sanitize_banner(b"220  (vsFTPd 3.0.3)\r\n"), "220 (vsFTPd 3.0.3)");
    }

    #[test]
    fn test_extract_server_headers() {
        let response = "HTTP/1.1 200 OK\r\nserver: nginx/1.18.0\r\nContent-Length: 0\r\n\
                        X-Powered-By: PHP/8.1\r\nX-AspNet-Version: 4.0.30319\r\n\r\n";
        assert_eq!(
            extract_server_headers(response),
            vec!["nginx/1.18.0", "PHP/8.1", "4.0.30319"]
        );
        assert!(extract_server_headers("HTTP/1.1 204 No Content\r\n\r\n").is_empty());
    }

    #[test]
    fn test_dispatch_table() {
        assert!(supports("ssh"));
        assert!(supports("ftp"));
        assert!(supports("http"));
        assert!(supports("https-alt"));
        assert!(!supports("mysql"));
        assert!(!supports("unknown"));
    }

    #[test]
    fn test_annotate() {
        let banner = Banner::Found("SSH-2.0-OpenSSH_8.2".to_string());
        assert_eq!(annotate("ssh", &banner), "ssh (SSH-2.0-OpenSSH_8.2)");
        assert_eq!(annotate("http", &Banner::NotFound), "http");
    }

    #[tokio::test]
    async fn test_ssh_greeting() {
        let addr = serve_once(|mut stream| async move {
            let _ = stream.write_all(b"SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5\r\n").await;
        })
        .await;

        assert_eq!(
            grab(addr, "ssh").await,
            Banner::Found("SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5".to_string())
        );
    }

    #[tokio::test]
    async fn test_ssh_greeting_is_truncated() {
        let addr = serve_once(|mut stream| async move {
            let long = format!("SSH-2.0-{}\r\n", "x".repeat(100));
            let _ = stream.write_all(long.as_bytes()).await;
        })
        .await;

        let banner = grab(addr, "ssh").await;
        assert_eq!(banner.as_deref().map(str::len), Some(SSH_BANNER_SIZE));
    }

    #[tokio::test]
    async fn test_ftp_greeting() {
        let addr = serve_once(|mut stream| async move {
            let _ = stream.write_all(b"220 (vsFTPd 3.0.3)\r\n").await;
        })
        .await;

        assert_eq!(
            grab(addr, "ftp").await,
            Banner::Found("220 (vsFTPd 3.0.3)".to_string())
        );
    }

    #[tokio::test]
    async fn test_silent_server_yields_nothing() {
        let addr = serve_once(|stream| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        })
        .await;

        assert_eq!(grab(addr, "ssh").await, Banner::NotFound);
    }

    #[tokio::test]
    async fn test_http_server_headers() {
        let addr = serve_once(|mut stream| async move {
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            assert!(buf[..n].starts_with(b"HEAD / HTTP/1.1\r\nHost: localhost\r\n"));
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nServer: Apache/2.4.41\r\nX-Powered-By: PHP/7.4\r\n\r\n")
                .await;
        })
        .await;

        assert_eq!(
            grab(addr, "http").await,
            Banner::Found("Apache/2.4.41, PHP/7.4".to_string())
        );
    }

    #[tokio::test]
    async fn test_http_falls_back_to_get() {
        let addr = serve_once(|mut stream| async move {
            let mut buf = [0u8; 1024];
            // HEAD: anonymous response
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
            // GET: identifying response
            let n = stream.read(&mut buf).await.unwrap_or(0);
            assert!(buf[..n].starts_with(b"GET / HTTP/1.1"));
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nServer: lighttpd\r\nContent-Length: 0\r\n\r\n")
                .await;
        })
        .await;

        assert_eq!(grab(addr, "http-alt").await, Banner::Found("lighttpd".to_string()));
    }

    #[tokio::test]
    async fn test_http_without_identifying_headers() {
        let addr = serve_once(|mut stream| async move {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\n\r\n").await;
        })
        .await;

        assert_eq!(grab(addr, "http").await, Banner::NotFound);
    }

    #[tokio::test]
    async fn test_slow_drip_http_is_cut_at_budget() {
        let addr = serve_once(|mut stream| async move {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            // never finishes the response head
            loop {
                if stream.write_all(b"X").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
        .await;

        let started = std::time::Instant::now();
        assert_eq!(grab(addr, "http").await, Banner::NotFound);
        assert!(started.elapsed() < TEST_TIMEOUT * 3);
    }

    #[tokio::test]
    async fn test_unsupported_service_does_no_io() {
        let addr = serve_once(|mut stream| async move {
            let _ = stream.write_all(b"+PONG\r\n").await;
        })
        .await;

        assert_eq!(grab(addr, "redis").await, Banner::NotFound);
    }
}

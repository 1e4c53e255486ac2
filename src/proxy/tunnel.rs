//! TCP tunnels through HTTP CONNECT, SOCKS4 and SOCKS5 proxies
//!
//! reqwest handles proxying for plain HTTP calls; the measurement WebSocket
//! needs a raw stream, which is opened here.

use crate::error::TransportError;
use crate::proxy::models::{ProxyEndpoint, ProxyScheme};
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};

/// Upper bound for an HTTP CONNECT response head
const MAX_RESPONSE_HEAD: usize = 8192;

/// Open a stream to `host:port` through `endpoint`
pub async fn open(
    endpoint: &ProxyEndpoint,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, connect(endpoint, host, port)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TransportError::Tunnel(format!("{}: {}", endpoint, e)).into()),
        Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64).into()),
    }
}

async fn connect(endpoint: &ProxyEndpoint, host: &str, port: u16) -> io::Result<TcpStream> {
    let mut stream = TcpStream::connect(endpoint.address()).await?;
    stream.set_nodelay(true)?;

    match endpoint.scheme {
        // https proxies are spoken to with the same plaintext CONNECT exchange
        ProxyScheme::Http | ProxyScheme::Https => {
            http_connect(&mut stream, endpoint, host, port).await?
        }
        ProxyScheme::Socks4 => socks4_connect(&mut stream, endpoint, host, port).await?,
        ProxyScheme::Socks5 => socks5_connect(&mut stream, endpoint, host, port).await?,
    }

    Ok(stream)
}

async fn http_connect(
    stream: &mut TcpStream,
    endpoint: &ProxyEndpoint,
    host: &str,
    port: u16,
) -> io::Result<()> {
    let target = format!("{}:{}", host, port);
    let mut request = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n", target);
    if let Some(auth) = &endpoint.auth {
        let credentials = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", credentials));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Read byte by byte so nothing past the head is consumed
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(io::Error::other("CONNECT response head too large"));
        }
        stream.read_exact(&mut byte).await?;
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok());
    if !matches!(status, Some(200..=299)) {
        return Err(io::Error::other(format!(
            "CONNECT rejected: {}",
            head.lines().next().unwrap_or_default()
        )));
    }
    Ok(())
}

async fn socks4_connect(
    stream: &mut TcpStream,
    endpoint: &ProxyEndpoint,
    host: &str,
    port: u16,
) -> io::Result<()> {
    // SOCKS4 only carries IPv4 destinations
    let ip = lookup_host((host, port))
        .await?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| io::Error::other(format!("no IPv4 address for {}", host)))?;

    let mut request = vec![0x04, 0x01];
    request.extend_from_slice(&port.to_be_bytes());
    request.extend_from_slice(&ip.octets());
    if let Some(auth) = &endpoint.auth {
        request.extend_from_slice(auth.username.as_bytes());
    }
    request.push(0x00);
    stream.write_all(&request).await?;

    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x5A {
        return Err(io::Error::other(format!(
            "SOCKS4 request rejected: code {:#04x}",
            reply[1]
        )));
    }
    Ok(())
}

async fn socks5_connect(
    stream: &mut TcpStream,
    endpoint: &ProxyEndpoint,
    host: &str,
    port: u16,
) -> io::Result<()> {
    // Method negotiation
    let greeting: &[u8] = if endpoint.auth.is_some() {
        &[0x05, 0x02, 0x00, 0x02]
    } else {
        &[0x05, 0x01, 0x00]
    };
    stream.write_all(greeting).await?;

    let mut response = [0u8; 2];
    stream.read_exact(&mut response).await?;
    if response[0] != 0x05 {
        return Err(io::Error::other("Invalid SOCKS version"));
    }

    match (response[1], &endpoint.auth) {
        (0x00, _) => {}
        (0x02, Some(auth)) => {
            // Each field carries a one-byte length
            let username = u8::try_from(auth.username.len())
                .map_err(|_| io::Error::other("SOCKS5 username too long"))?;
            let password = u8::try_from(auth.password.len())
                .map_err(|_| io::Error::other("SOCKS5 password too long"))?;
            let mut auth_req = vec![0x01, username];
            auth_req.extend_from_slice(auth.username.as_bytes());
            auth_req.push(password);
            auth_req.extend_from_slice(auth.password.as_bytes());
            stream.write_all(&auth_req).await?;

            let mut auth_resp = [0u8; 2];
            stream.read_exact(&mut auth_resp).await?;
            if auth_resp[1] != 0x00 {
                return Err(io::Error::other("SOCKS5 authentication failed"));
            }
        }
        (0x02, None) => return Err(io::Error::other("SOCKS5 proxy requires credentials")),
        (method, _) => {
            return Err(io::Error::other(format!(
                "Unsupported SOCKS5 auth method {:#04x}",
                method
            )))
        }
    }

    // CONNECT
    let mut request = vec![0x05, 0x01, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(0x01);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(0x04);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let name = host.as_bytes();
            if name.len() > u8::MAX as usize {
                return Err(io::Error::other("destination host name too long"));
            }
            request.push(0x03);
            request.push(name.len() as u8);
            request.extend_from_slice(name);
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(io::Error::other(format!(
            "SOCKS5 error: reply code {}",
            reply[1]
        )));
    }

    // Skip the bound address
    let remaining = match reply[3] {
        0x01 => 4 + 2,
        0x04 => 16 + 2,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize + 2
        }
        other => {
            return Err(io::Error::other(format!(
                "SOCKS5 reply with unknown address type {}",
                other
            )))
        }
    };
    let mut bound = vec![0u8; remaining];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn read_head(socket: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            socket.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    #[tokio::test]
    async fn test_http_connect_tunnel() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_head(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\nhello")
                .await
                .unwrap();
            head
        });

        let endpoint = ProxyEndpoint::new(ProxyScheme::Http, "127.0.0.1".to_string(), port)
            .with_auth("user".to_string(), "pass".to_string());
        let mut stream = open(&endpoint, "ndt.example.net", 443, Duration::from_secs(5))
            .await
            .unwrap();

        let mut greeting = [0u8; 5];
        stream.read_exact(&mut greeting).await.unwrap();
        assert_eq!(&greeting, b"hello");

        let head = server.await.unwrap();
        assert!(head.starts_with("CONNECT ndt.example.net:443 HTTP/1.1\r\n"));
        assert!(head.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
    }

    #[tokio::test]
    async fn test_http_connect_rejected() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_head(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await
                .unwrap();
        });

        let endpoint = ProxyEndpoint::new(ProxyScheme::Http, "127.0.0.1".to_string(), port);
        let err = open(&endpoint, "ndt.example.net", 443, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Tunnel(_))));
        assert!(err.to_string().contains("407"));
    }

    #[tokio::test]
    async fn test_http_connect_accepts_any_success_status() {
        let (listener, port) = listener().await;
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_head(&mut socket).await;
            socket
                .write_all(b"HTTP/1.0 204 No Content\r\n\r\nok")
                .await
                .unwrap();
        });

        let endpoint = ProxyEndpoint::new(ProxyScheme::Http, "127.0.0.1".to_string(), port);
        let mut stream = open(&endpoint, "ndt.example.net", 443, Duration::from_secs(5))
            .await
            .unwrap();
        let mut payload = [0u8; 2];
        stream.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload, b"ok");
    }

    #[tokio::test]
    async fn test_socks5_rejects_oversized_username() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 4];
            socket.read_exact(&mut greeting).await.unwrap();
            socket.write_all(&[0x05, 0x02]).await.unwrap();
            let mut rest = Vec::new();
            socket.read_to_end(&mut rest).await.unwrap();
            rest
        });

        let endpoint = ProxyEndpoint::new(ProxyScheme::Socks5, "127.0.0.1".to_string(), port)
            .with_auth("u".repeat(300), "pass".to_string());
        let err = open(&endpoint, "ndt.example.net", 443, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("username too long"));

        // Nothing past the greeting reaches the proxy
        assert!(server.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_socks5_tunnel_with_domain_name() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            socket.read_exact(&mut greeting).await.unwrap();
            socket.write_all(&[0x05, 0x00]).await.unwrap();

            let mut header = [0u8; 5];
            socket.read_exact(&mut header).await.unwrap();
            let mut rest = vec![0u8; header[4] as usize + 2];
            socket.read_exact(&mut rest).await.unwrap();

            socket
                .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90])
                .await
                .unwrap();
            socket.write_all(b"hi").await.unwrap();
            (greeting, header, rest)
        });

        let endpoint = ProxyEndpoint::new(ProxyScheme::Socks5, "127.0.0.1".to_string(), port);
        let mut stream = open(&endpoint, "ndt.example.net", 443, Duration::from_secs(5))
            .await
            .unwrap();
        let mut payload = [0u8; 2];
        stream.read_exact(&mut payload).await.unwrap();
        assert_eq!(&payload, b"hi");

        let (greeting, header, rest) = server.await.unwrap();
        assert_eq!(greeting, [0x05, 0x01, 0x00]);
        assert_eq!(header[..4], [0x05, 0x01, 0x00, 0x03]);
        assert_eq!(&rest[..rest.len() - 2], b"ndt.example.net");
        assert_eq!(&rest[rest.len() - 2..], &443u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_socks4_tunnel() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 8];
            socket.read_exact(&mut request).await.unwrap();
            let mut user = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                socket.read_exact(&mut byte).await.unwrap();
                if byte[0] == 0 {
                    break;
                }
                user.push(byte[0]);
            }
            socket
                .write_all(&[0x00, 0x5A, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();
            (request, user)
        });

        let endpoint = ProxyEndpoint::new(ProxyScheme::Socks4, "127.0.0.1".to_string(), port)
            .with_auth("alice".to_string(), String::new());
        open(&endpoint, "127.0.0.1", 8080, Duration::from_secs(5))
            .await
            .unwrap();

        let (request, user) = server.await.unwrap();
        assert_eq!(request, [0x04, 0x01, 0x1F, 0x90, 127, 0, 0, 1]);
        assert_eq!(user, b"alice");
    }
}

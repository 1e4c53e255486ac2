//! One download-then-upload throughput trial over ndt7 WebSockets

use crate::error::{Error, TransportError};
use crate::logger;
use crate::measurement::locate::{self, MeasurementServer};
use crate::measurement::message::Measurement;
use crate::measurement::speed::{DownloadMeter, SpeedResult, TickAction, UploadMeter};
use crate::proxy::{tunnel, Transport};
use crate::Result;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use reqwest::Client;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use url::Url;

/// WebSocket subprotocol spoken by measurement servers
pub const NDT7_SUBPROTOCOL: &str = "net.measurementlab.ndt.v7";

const DEFAULT_LOCATE_URL: &str = "https://locate.measurementlab.net/v2/nearest/ndt/ndt7";
const DEFAULT_CLIENT_NAME: &str = "speed-measurementlab-net-1";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for a measurement trial
#[derive(Debug, Clone)]
pub struct MeasurementConfig {
    pub locate_url: String,
    pub client_name: String,
    /// Measuring window for each direction
    pub measure_for: Duration,
    /// Hard ceiling for one direction, regardless of progress
    pub session_timeout: Duration,
    /// Size of each upload message
    pub chunk_size: usize,
    /// No upload chunk is queued while this many bytes are unflushed
    pub buffer_limit: usize,
    /// Upload send tick
    pub tick: Duration,
    /// Timeout for the locate request and the WebSocket handshake
    pub request_timeout: Duration,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            locate_url: DEFAULT_LOCATE_URL.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            measure_for: Duration::from_secs(10),
            session_timeout: Duration::from_secs(15),
            chunk_size: 16 * 1024,
            buffer_limit: 1024 * 1024,
            tick: Duration::from_millis(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl MeasurementConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locate_url(mut self, url: String) -> Self {
        self.locate_url = url;
        self
    }

    pub fn with_measure_for(mut self, window: Duration) -> Self {
        self.measure_for = window;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Runs throughput trials; never fails, a broken direction reports zero
pub struct MeasurementSession {
    config: MeasurementConfig,
    client: Client,
}

impl MeasurementSession {
    pub fn new(config: MeasurementConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self { config, client })
    }

    /// Locate a server, then measure download and upload in sequence
    pub async fn run(&self, transport: Option<&Transport>) -> SpeedResult {
        logger::network("Starting network speed measurement...");

        logger::info("Locating speed test server...");
        let server = match self.locate(transport).await {
            Ok(server) => server,
            Err(e) => {
                logger::error(format!("Speed test error: {}", e));
                return SpeedResult::default();
            }
        };
        logger::success(format!("Selected server: {}", server.machine));

        logger::network("Starting download test...");
        let download = match self.download(&server.download_url, transport).await {
            Ok(speed) => speed,
            Err(e) => {
                logger::error(format!("Download test error: {}", e));
                0.0
            }
        };
        logger::speed(format!("Download: {:.2} Mbps", download));

        logger::network("Starting upload test...");
        let upload = match self.upload(&server.upload_url, transport).await {
            Ok(speed) => speed,
            Err(e) => {
                logger::error(format!("Upload test error: {}", e));
                0.0
            }
        };
        logger::speed(format!("Upload: {:.2} Mbps", upload));

        SpeedResult::new(download, upload)
    }

    async fn locate(&self, transport: Option<&Transport>) -> Result<MeasurementServer> {
        let client = transport.map_or(&self.client, Transport::client);
        locate::locate(
            client,
            &self.config.locate_url,
            &self.config.client_name,
            self.config.request_timeout,
        )
        .await
    }

    async fn connect(&self, url: &str, transport: Option<&Transport>) -> Result<Socket> {
        let parsed = Url::parse(url).map_err(TransportError::Url)?;
        let host = parsed
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| TransportError::Tunnel(format!("no host in {}", url)))?;
        let port = parsed.port_or_known_default().unwrap_or(443);

        let stream = match transport {
            Some(transport) => {
                tunnel::open(transport.endpoint(), &host, port, transport.timeout()).await?
            }
            None => {
                with_timeout(self.config.request_timeout, async {
                    Ok::<_, Error>(TcpStream::connect((host.as_str(), port)).await?)
                })
                .await?
            }
        };

        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(NDT7_SUBPROTOCOL));

        let (socket, _response) = with_timeout(self.config.request_timeout, async {
            Ok::<_, Error>(client_async_tls_with_config(request, stream, None, None).await?)
        })
        .await?;
        Ok(socket)
    }

    async fn download(&self, url: &str, transport: Option<&Transport>) -> Result<f64> {
        let mut socket = self.connect(url, transport).await?;
        let started = Instant::now();
        let deadline = started + self.config.session_timeout;
        let mut meter = DownloadMeter::new(self.config.measure_for);
        let mut speed = 0.0;

        let expired = tokio::time::sleep_until(deadline);
        tokio::pin!(expired);

        loop {
            tokio::select! {
                message = socket.next() => match message {
                    Some(Ok(Message::Binary(data))) => {
                        if let Some(mbps) = meter.record(data.len(), started.elapsed()) {
                            speed = mbps;
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => trace_measurement("download", &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
                _ = &mut expired => {
                    tracing::debug!(bytes = meter.total_bytes(), "download hit the session timeout");
                    break;
                }
            }
        }

        // Closing is best-effort; past the deadline the socket is just dropped
        let _ = tokio::time::timeout_at(deadline, socket.close(None)).await;
        Ok(speed)
    }

    async fn upload(&self, url: &str, transport: Option<&Transport>) -> Result<f64> {
        let socket = self.connect(url, transport).await?;
        let (mut sink, mut stream) = socket.split();

        let mut chunk = vec![0u8; self.config.chunk_size];
        rand::thread_rng().fill(&mut chunk[..]);

        // Bytes handed to the writer and not yet flushed to the socket
        let buffered = AtomicUsize::new(0);
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let mut meter = UploadMeter::new(self.config.measure_for, self.config.buffer_limit);
        let started = Instant::now();
        let deadline = started + self.config.session_timeout;

        let writer = async {
            while let Some(payload) = rx.recv().await {
                let len = payload.len();
                if let Err(e) = sink.send(Message::Binary(payload)).await {
                    rx.close();
                    return Err(Error::from(e));
                }
                buffered.fetch_sub(len, Ordering::Relaxed);
            }
            let _ = sink.close().await;
            Ok(())
        };

        let reader = async {
            let tx = tx;
            let mut ticker = tokio::time::interval(self.config.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let expired = tokio::time::sleep_until(deadline);
            tokio::pin!(expired);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match meter.on_tick(started.elapsed(), buffered.load(Ordering::Relaxed)) {
                            TickAction::Close => break,
                            TickAction::Send => {
                                buffered.fetch_add(chunk.len(), Ordering::Relaxed);
                                if tx.send(chunk.clone()).is_err() {
                                    break;
                                }
                                meter.record_sent(chunk.len());
                            }
                            TickAction::Wait => {}
                        }
                    }
                    message = stream.next() => match message {
                        Some(Ok(Message::Text(text))) => match Measurement::parse(&text) {
                            Ok(measurement) => {
                                if meter.observe(&measurement) {
                                    tracing::debug!(mbps = meter.server_mbps(), "server-reported upload rate");
                                }
                            }
                            Err(e) => logger::error(format!("Error parsing server message: {}", e)),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(Error::from(e)),
                    },
                    _ = &mut expired => {
                        tracing::debug!(bytes = meter.bytes_sent(), "upload hit the session timeout");
                        break;
                    }
                }
            }

            drop(tx);
            Ok(meter.finish(started.elapsed()))
        };

        // A writer stuck on a peer that stopped reading is cut off at the deadline
        let (speed, written) = tokio::join!(reader, tokio::time::timeout_at(deadline, writer));
        match written {
            Ok(Err(e)) => return Err(e),
            Err(_) => tracing::debug!("upload writer did not drain before the deadline"),
            Ok(Ok(())) => {}
        }
        speed
    }
}

async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit.as_millis() as u64).into()),
    }
}

fn trace_measurement(direction: &str, text: &str) {
    match Measurement::parse(text) {
        Ok(m) => tracing::debug!(direction, origin = ?m.origin, app = ?m.app_info, "measurement"),
        Err(e) => tracing::debug!(direction, error = %e, "unparseable measurement"),
    }
}

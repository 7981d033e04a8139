use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::errors::{DecodeError, OgnError, Result};
use crate::ogn::{DecodedMessage, DecoderRegistry};
use crate::transport::Transport;

pub const DEFAULT_SERVER: &str = "aprs.glidernet.org";
/// Unfiltered full feed
pub const FULL_FEED_PORT: u16 = 10152;
/// Port that honours `filter` expressions
pub const FILTERED_PORT: u16 = 14580;
/// Passcode for receive-only guest access
pub const DEFAULT_PASSCODE: &str = "-1";
/// Seconds of send silence after which a keepalive line is written
pub const KEEPALIVE_INTERVAL_SECONDS: i64 = 240;
/// Floor for every reconnect delay after the first attempt
const MIN_RETRY_DELAY_SECONDS: u64 = 1;

const PRODUCT_NAME: &str = env!("CARGO_PKG_NAME");
const PRODUCT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration for the APRS client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AprsClientConfig {
    /// APRS server hostname
    pub server: String,
    /// APRS server port; derived from `filter` when unset
    pub port: Option<u16>,
    /// Callsign for authentication
    pub callsign: String,
    pub passcode: String,
    /// APRS filter string (optional)
    pub filter: Option<String>,
    /// Reconnect attempts after a dropped connection before giving up
    pub max_retries: u32,
    /// Initial delay between reconnection attempts in seconds (will use exponential backoff)
    pub retry_delay_seconds: u64,
    /// Maximum delay between reconnection attempts in seconds (cap for exponential backoff)
    pub max_retry_delay_seconds: u64,
}

impl Default for AprsClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            port: None,
            callsign: "N0CALL".to_string(),
            passcode: DEFAULT_PASSCODE.to_string(),
            filter: None,
            max_retries: 5,
            retry_delay_seconds: 0, // Reconnect immediately on first failure
            max_retry_delay_seconds: 60, // Cap at 60 seconds
        }
    }
}

impl AprsClientConfig {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.filter.is_some() {
            FILTERED_PORT
        } else {
            FULL_FEED_PORT
        })
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
}

/// Outcome of a successful login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// Passcode accepted; the session may send
    Verified,
    /// Passcode rejected, receiving only
    ReadOnly,
    /// Logged in with the guest passcode
    Guest,
}

/// What the receive callback is handed
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Raw(String),
    Decoded(Box<DecodedMessage>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Reconnect after transport failures instead of returning the error
    pub reconnect: bool,
    /// Hand raw lines to the callback instead of decoded records
    pub raw: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            raw: false,
        }
    }
}

/// Stops a running `receive` loop from another task or a signal handler.
///
/// The loop notices the flag before it reads the next line.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    kill: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.kill.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }
}

/// Why the read loop stopped without an error
enum ReadLoopExit {
    Killed,
    EndOfStream,
}

/// APRS-IS session: authentication, keepalive, reconnection and dispatch of
/// received lines to the decoder registry
pub struct AprsClient<T: Transport> {
    config: AprsClientConfig,
    transport: T,
    registry: Arc<DecoderRegistry>,
    clock: Arc<dyn Clock>,
    kill: Arc<AtomicBool>,
    state: SessionState,
    login_status: Option<LoginStatus>,
    last_send: Option<DateTime<Utc>>,
    retry_count: u32,
}

impl<T: Transport> AprsClient<T> {
    /// Create a client with the built-in decoders and the system clock
    pub fn new(config: AprsClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            registry: Arc::new(DecoderRegistry::with_builtin_decoders()),
            clock: Arc::new(SystemClock),
            kill: Arc::new(AtomicBool::new(false)),
            state: SessionState::Disconnected,
            login_status: None,
            last_send: None,
            retry_count: 0,
        }
    }

    pub fn with_registry(mut self, registry: Arc<DecoderRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AprsClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DecoderRegistry> {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn login_status(&self) -> Option<LoginStatus> {
        self.login_status
    }

    /// True only for a verified login
    pub fn is_authenticated(&self) -> bool {
        self.login_status == Some(LoginStatus::Verified)
    }

    pub fn last_send(&self) -> Option<DateTime<Utc>> {
        self.last_send
    }

    /// Reconnect attempts made since the session last delivered an APRS line.
    ///
    /// A login alone does not refill the budget, so a server that accepts the
    /// connection and drops it straight away still runs out of retries.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            kill: self.kill.clone(),
        }
    }

    fn is_killed(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }

    /// Open the transport and log in.
    ///
    /// Clears a previous shutdown request. On any failure the transport is
    /// closed before the error is returned.
    #[tracing::instrument(skip(self), fields(server = %self.config.server, port = self.config.effective_port()))]
    pub async fn connect(&mut self) -> Result<LoginStatus> {
        self.kill.store(false, Ordering::SeqCst);
        self.retry_count = 0;
        self.open_session().await
    }

    async fn open_session(&mut self) -> Result<LoginStatus> {
        self.login_status = None;
        self.state = SessionState::Connecting;

        let port = self.config.effective_port();
        info!(
            "Connecting to {}:{} as {}. Filter: {}",
            self.config.server,
            port,
            self.config.callsign,
            self.config.filter.as_deref().unwrap_or("not set")
        );

        if let Err(e) = self.transport.connect(&self.config.server, port).await {
            self.state = SessionState::Disconnected;
            metrics::counter!("aprs.connection_failed_total").increment(1);
            return Err(OgnError::transport(
                format!("failed to connect to {}:{}", self.config.server, port),
                e,
            ));
        }

        match self.authenticate().await {
            Ok(status) => {
                self.login_status = Some(status);
                self.state = SessionState::Connected;
                metrics::counter!("aprs.connection.established_total").increment(1);
                Ok(status)
            }
            Err(e) => {
                error!("Failed to authenticate: {}", e);
                self.transport.close().await;
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn authenticate(&mut self) -> Result<LoginStatus> {
        let greeting = self.read_required("greeting").await?;
        debug!("Connection response: {}", greeting.trim());

        self.state = SessionState::Authenticating;
        let login_cmd = build_login_command(&self.config);
        self.send(&login_cmd).await?;

        let response = self.read_required("login response").await?;
        debug!("Login status: {}", response.trim());
        validate_login(response.trim(), &self.config.passcode)
    }

    async fn read_required(&mut self, what: &str) -> Result<String> {
        match self.transport.read_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(OgnError::connection(format!(
                "connection closed while waiting for {}",
                what
            ))),
            Err(e) => Err(OgnError::transport(format!("failed to read {}", what), e)),
        }
    }

    /// Write one line, replacing any leading/trailing newlines with a single terminator
    pub async fn send(&mut self, message: &str) -> Result<()> {
        let line = format!("{}\n", message.trim_matches('\n'));
        debug!("Sending: {}", line.trim_end());

        self.transport
            .send_all(line.as_bytes())
            .await
            .map_err(|e| OgnError::transport("failed to send", e))?;
        self.last_send = Some(self.clock.now());
        Ok(())
    }

    /// Send a keepalive if nothing was sent for longer than the interval.
    ///
    /// Returns whether a keepalive went out.
    pub async fn keepalive(&mut self) -> Result<bool> {
        let now = self.clock.now();
        let due = self
            .last_send
            .is_none_or(|sent| (now - sent).num_seconds() > KEEPALIVE_INTERVAL_SECONDS);
        if !due {
            return Ok(false);
        }

        self.send(&format!("# {} keepalive", PRODUCT_NAME)).await?;
        trace!("Sent keepalive to APRS server");
        metrics::counter!("aprs.keepalive.sent_total").increment(1);
        Ok(true)
    }

    /// Read lines until shut down, handing each one to `callback`.
    ///
    /// Undecodable lines are logged and skipped. Transport failures either
    /// trigger bounded reconnection or are returned, depending on `options`.
    #[tracing::instrument(skip(self, callback), fields(server = %self.config.server))]
    pub async fn receive<F>(&mut self, mut callback: F, options: ReceiveOptions) -> Result<()>
    where
        F: FnMut(Received) + Send,
    {
        loop {
            let failure = match self.read_loop(&mut callback, options.raw).await {
                Ok(ReadLoopExit::Killed) => {
                    info!("Receive loop stopped by shutdown request");
                    return Ok(());
                }
                Ok(ReadLoopExit::EndOfStream) => {
                    info!("APRS connection closed by server");
                    metrics::counter!("aprs.connection.server_closed_total").increment(1);
                    if !options.reconnect {
                        self.close_transport().await;
                        return Ok(());
                    }
                    OgnError::connection("connection closed by server")
                }
                Err(e) => {
                    metrics::counter!("aprs.connection.operation_failed_total").increment(1);
                    if !options.reconnect {
                        self.close_transport().await;
                        return Err(e);
                    }
                    e
                }
            };

            warn!("APRS connection lost: {}", failure);
            self.reconnect().await?;
        }
    }

    async fn read_loop<F>(&mut self, callback: &mut F, raw: bool) -> Result<ReadLoopExit>
    where
        F: FnMut(Received) + Send,
    {
        loop {
            if self.is_killed() {
                return Ok(ReadLoopExit::Killed);
            }

            self.keepalive().await?;

            let line = match self.transport.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(ReadLoopExit::EndOfStream),
                Err(_) if self.is_killed() => return Ok(ReadLoopExit::Killed),
                Err(e) => return Err(OgnError::transport("failed to read from server", e)),
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let is_server_message = line.starts_with('#');
            if is_server_message {
                metrics::counter!("aprs.raw_message.received.server_total").increment(1);
            } else {
                metrics::counter!("aprs.raw_message.received.aprs_total").increment(1);
                if self.retry_count > 0 {
                    debug!(
                        "Connection healthy again after {} reconnect attempts",
                        self.retry_count
                    );
                    self.retry_count = 0;
                }
            }

            if raw {
                callback(Received::Raw(line.to_string()));
                continue;
            }

            if is_server_message {
                trace!("Server message: {}", line);
                continue;
            }

            match self.registry.dispatch(line, self.clock.now()) {
                Ok(message) => {
                    metrics::counter!("aprs.message.decoded_total").increment(1);
                    callback(Received::Decoded(Box::new(message)));
                }
                Err(e) => {
                    metrics::counter!("aprs.message.decode_failed_total").increment(1);
                    debug!("Skipping undecodable line: {}", e);
                }
            }
        }
    }

    /// Re-establish the session while the retry budget lasts.
    ///
    /// The budget is only refilled once a session delivers an APRS line, so
    /// attempts add up across connections that drop right after login.
    async fn reconnect(&mut self) -> Result<()> {
        self.transport.close().await;
        self.state = SessionState::Reconnecting;

        while self.retry_count < self.config.max_retries {
            if self.is_killed() {
                return Ok(());
            }

            let delay = reconnect_delay(&self.config, self.retry_count);
            if delay > 0 {
                info!("Waiting {} seconds before retry", delay);
                self.clock.sleep(Duration::from_secs(delay)).await;
            }

            self.retry_count += 1;
            info!(
                "Reconnecting to APRS server at {}:{} (retry attempt {}/{})",
                self.config.server,
                self.config.effective_port(),
                self.retry_count,
                self.config.max_retries
            );
            metrics::counter!("aprs.connection.reconnect_total").increment(1);

            match self.open_session().await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", self.retry_count, e);
                    self.state = SessionState::Reconnecting;
                }
            }
        }

        self.close_transport().await;
        error!(
            "Giving up on {}:{} after {} reconnect attempts",
            self.config.server,
            self.config.effective_port(),
            self.config.max_retries
        );
        Err(OgnError::connection(format!(
            "unable to reconnect after {} attempts",
            self.config.max_retries
        )))
    }

    async fn close_transport(&mut self) {
        self.transport.close().await;
        self.state = SessionState::Disconnected;
        self.login_status = None;
    }

    /// Stop receiving and close the connection. Safe to call repeatedly.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        self.kill.store(true, Ordering::SeqCst);
        if self.state != SessionState::Disconnected {
            info!("Disconnecting from {}", self.config.server);
        }
        self.close_transport().await;
    }
}

/// Delay before reconnect attempt `attempt` (zero-based).
///
/// The first attempt waits `retry_delay_seconds`, which may be zero. Later
/// attempts double from at least one second, capped at `max_retry_delay_seconds`.
pub fn reconnect_delay(config: &AprsClientConfig, attempt: u32) -> u64 {
    if attempt == 0 {
        return config.retry_delay_seconds;
    }
    let base = config.retry_delay_seconds.max(MIN_RETRY_DELAY_SECONDS);
    let cap = config.max_retry_delay_seconds.max(MIN_RETRY_DELAY_SECONDS);
    base.saturating_mul(2u64.saturating_pow(attempt)).min(cap)
}

/// Build the login command for APRS-IS authentication
pub fn build_login_command(config: &AprsClientConfig) -> String {
    let mut login_cmd = format!(
        "user {} pass {} vers {} {}",
        config.callsign, config.passcode, PRODUCT_NAME, PRODUCT_VERSION
    );

    if let Some(filter) = &config.filter {
        login_cmd.push_str(" filter ");
        login_cmd.push_str(filter);
    }

    login_cmd
}

/// Check a `# logresp <user> <status>, server <name>` line
pub fn validate_login(response: &str, passcode: &str) -> Result<LoginStatus> {
    let body = response
        .strip_prefix("# logresp")
        .ok_or_else(|| OgnError::Login(format!("not a login message: {}", response)))?;

    let malformed = || OgnError::parse(response, DecodeError::LoginResponse(response.to_string()));
    let mut parts = body.split(", ");
    let (Some(user_info), Some(server_info), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let user_words: Vec<&str> = user_info.split_whitespace().collect();
    let [username, status] = user_words[..] else {
        return Err(malformed());
    };
    let server = server_info.strip_prefix("server ").ok_or_else(malformed)?;

    match status {
        "verified" => {
            info!("Successfully connected to {} as {}", server, username);
            Ok(LoginStatus::Verified)
        }
        "unverified" if passcode != DEFAULT_PASSCODE => {
            info!("Connected to {}", server);
            warn!("Wrong username/passcode, continuing in read-only mode");
            Ok(LoginStatus::ReadOnly)
        }
        "unverified" => {
            info!("Connected to {} as guest", server);
            Ok(LoginStatus::Guest)
        }
        _ => Err(OgnError::Login(format!("login failed: {}", response))),
    }
}

/// Builder pattern for creating APRS client configurations
pub struct AprsClientConfigBuilder {
    config: AprsClientConfig,
}

impl AprsClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AprsClientConfig::default(),
        }
    }

    pub fn server<S: Into<String>>(mut self, server: S) -> Self {
        self.config.server = server.into();
        self
    }

    pub fn port(mut self, port: Option<u16>) -> Self {
        self.config.port = port;
        self
    }

    pub fn callsign<S: Into<String>>(mut self, callsign: S) -> Self {
        self.config.callsign = callsign.into();
        self
    }

    pub fn passcode<S: Into<String>>(mut self, passcode: S) -> Self {
        self.config.passcode = passcode.into();
        self
    }

    pub fn filter<S: Into<String>>(mut self, filter: Option<S>) -> Self {
        self.config.filter = filter.map(|f| f.into());
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.config.retry_delay_seconds = seconds;
        self
    }

    pub fn max_retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.config.max_retry_delay_seconds = seconds;
        self
    }

    pub fn build(self) -> AprsClientConfig {
        self.config
    }
}

impl Default for AprsClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = AprsClientConfigBuilder::new()
            .server("test.aprs.net")
            .port(Some(14581))
            .callsign("TEST123")
            .passcode("12345")
            .filter(Some("r/47.0/-122.0/100"))
            .max_retries(3)
            .retry_delay_seconds(10)
            .build();

        assert_eq!(config.server, "test.aprs.net");
        assert_eq!(config.effective_port(), 14581);
        assert_eq!(config.callsign, "TEST123");
        assert_eq!(config.passcode, "12345");
        assert_eq!(config.filter, Some("r/47.0/-122.0/100".to_string()));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_seconds, 10);
        assert_eq!(config.max_retry_delay_seconds, 60);
    }

    #[test]
    fn test_reconnect_delay() {
        let immediate = AprsClientConfig::default();
        let delays: Vec<u64> = (0..8).map(|n| reconnect_delay(&immediate, n)).collect();
        assert_eq!(delays, vec![0, 2, 4, 8, 16, 32, 60, 60]);

        let paced = AprsClientConfigBuilder::new().retry_delay_seconds(3).build();
        assert_eq!(reconnect_delay(&paced, 0), 3);
        assert_eq!(reconnect_delay(&paced, 1), 6);

        let huge = AprsClientConfigBuilder::new()
            .retry_delay_seconds(u64::MAX)
            .max_retry_delay_seconds(u64::MAX)
            .build();
        assert_eq!(reconnect_delay(&huge, 40), u64::MAX);
    }

    #[test]
    fn test_default_ports() {
        let config = AprsClientConfig::default();
        assert_eq!(config.server, "aprs.glidernet.org");
        assert_eq!(config.passcode, "-1");
        assert_eq!(config.effective_port(), 10152);

        let filtered = AprsClientConfigBuilder::new()
            .filter(Some("r/49/14/100"))
            .build();
        assert_eq!(filtered.effective_port(), 14580);
    }

    #[test]
    fn test_login_command_with_filter() {
        let config = AprsClientConfigBuilder::new()
            .callsign("TEST123")
            .passcode("12345")
            .filter(Some("r/47.0/-122.0/100"))
            .build();

        assert_eq!(
            build_login_command(&config),
            format!(
                "user TEST123 pass 12345 vers {} {} filter r/47.0/-122.0/100",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )
        );
    }

    #[test]
    fn test_login_command_without_filter() {
        let config = AprsClientConfigBuilder::new().callsign("TEST123").build();
        assert_eq!(
            build_login_command(&config),
            format!(
                "user TEST123 pass -1 vers {} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )
        );
    }

    #[test]
    fn test_validate_login_verified() {
        assert_eq!(
            validate_login("# logresp user verified, server GLIDERN3", "12345").unwrap(),
            LoginStatus::Verified
        );
    }

    #[test]
    fn test_validate_login_unverified() {
        assert_eq!(
            validate_login("# logresp user unverified, server GLIDERN3", "12345").unwrap(),
            LoginStatus::ReadOnly
        );
        assert_eq!(
            validate_login("# logresp user unverified, server GLIDERN3", "-1").unwrap(),
            LoginStatus::Guest
        );
    }

    #[test]
    fn test_validate_login_rejected() {
        assert!(matches!(
            validate_login("# logresp user blocked, server GLIDERN3", "-1"),
            Err(OgnError::Login(_))
        ));
        assert!(matches!(
            validate_login("# aprsc 2.1.4-g408ed49", "-1"),
            Err(OgnError::Login(_))
        ));
    }

    #[test]
    fn test_validate_login_malformed() {
        assert!(matches!(
            validate_login("# logresp 2.1.4-g408ed49", "-1"),
            Err(OgnError::Parse {
                source: DecodeError::LoginResponse(_),
                ..
            })
        ));
        assert!(matches!(
            validate_login("# logresp user verified, GLIDERN3", "-1"),
            Err(OgnError::Parse { .. })
        ));
    }

    #[test]
    fn test_shutdown_handle_shares_flag() {
        let client = AprsClient::new(
            AprsClientConfig::default(),
            crate::transport::TcpTransport::new(),
        );
        let handle = client.shutdown_handle();
        assert!(!handle.is_shutdown());
        handle.clone().shutdown();
        assert!(handle.is_shutdown());
        assert!(client.is_killed());
    }
}

//! Shared fixtures for session integration tests
//!
//! `ScriptedTransport` replays a fixed list of server lines per connection and
//! records everything the client sends. `ManualClock` only moves when a test
//! (or a retry sleep) advances it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use ogn_client::{Clock, Transport};

pub const GREETING: &str = "# aprsc 2.1.4-g408ed49";
pub const GUEST_LOGIN: &str = "# logresp N0CALL unverified, server GLIDERN1";

pub const FLARM_LINE: &str = "FLRDD83BC>APRS,qAS,EDLF:/163148h5124.56N/00634.42E'276/075/A=001551 id0ADD83BC +079fpm -0.6rot";
pub const SERVER_BEACON_LINE: &str =
    "LKHS>APRS,TCPIP*,qAC,GLIDERN2:/163012h4902.45NI01429.51E&000/000/A=001689";

/// One event in a scripted connection
#[derive(Debug, Clone)]
pub enum Step {
    Line(String),
    Fail(io::ErrorKind),
}

pub fn line(text: &str) -> Step {
    Step::Line(text.to_string())
}

/// Greeting and guest login response followed by `steps`
pub fn guest_session(steps: Vec<Step>) -> Vec<Step> {
    let mut session = vec![line(GREETING), line(GUEST_LOGIN)];
    session.extend(steps);
    session
}

/// Observes a `ScriptedTransport` after it has been moved into a client
#[derive(Debug, Clone, Default)]
pub struct TransportProbe {
    sent: Arc<Mutex<Vec<String>>>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl TransportProbe {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Each `connect` consumes the next scripted session; a connection reaches
/// end of stream once its steps run out. Connecting with no sessions left
/// fails with `ConnectionRefused`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    sessions: VecDeque<Vec<Step>>,
    current: Option<VecDeque<Step>>,
    probe: TransportProbe,
}

impl ScriptedTransport {
    pub fn new(sessions: Vec<Vec<Step>>) -> Self {
        Self {
            sessions: sessions.into(),
            ..Default::default()
        }
    }

    pub fn probe(&self) -> TransportProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self, _host: &str, _port: u16) -> io::Result<()> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        match self.sessions.pop_front() {
            Some(steps) => {
                self.current = Some(steps.into());
                Ok(())
            }
            None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let steps = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        match steps.pop_front() {
            Some(Step::Line(text)) => Ok(Some(text)),
            Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
            None => Ok(None),
        }
    }

    async fn send_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.current.is_none() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        self.probe
            .sent
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    async fn close(&mut self) {
        if self.current.take().is_some() {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

/// Clock that only moves on `advance` or `sleep`
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// 2024-05-02 18:00:00 UTC
    pub fn new() -> Arc<Self> {
        Self::at(Utc.with_ymd_and_hms(2024, 5, 2, 18, 0, 0).unwrap())
    }

    pub fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, seconds: i64) {
        *self.now.lock().unwrap() += chrono::Duration::seconds(seconds);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        if let Ok(step) = chrono::Duration::from_std(duration) {
            *self.now.lock().unwrap() += step;
        }
    }
}

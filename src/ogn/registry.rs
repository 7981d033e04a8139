//! Destination-token routing to format decoders.
//!
//! The registry is explicit state owned by whoever builds the client; there is
//! no process-wide table. Tokens may be registered while the registry is
//! shared, so the map is a `DashMap`.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{trace, warn};

use crate::errors::{DecodeError, OgnError, Result};
use crate::ogn::decoders::{
    FlarmDecoder, MessageDecoder, NaviterDecoder, ServerDecoder, SpotDecoder,
};
use crate::ogn::header::POSITION_MARKER;
use crate::ogn::message::DecodedMessage;

/// First path token of lines injected by the APRS servers themselves
const SERVER_PATH_TOKEN: &str = "TCPIP*";

#[derive(Default)]
pub struct DecoderRegistry {
    decoders: DashMap<String, Arc<dyn MessageDecoder>>,
    default: RwLock<Option<Arc<dyn MessageDecoder>>>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("tokens", &self.registered_tokens())
            .field("default", &self.default_name())
            .finish()
    }
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in format, server decoder as the default
    pub fn with_builtin_decoders() -> Self {
        let registry = Self::new();
        registry.register(["APRS", "OGFLR"], Arc::new(FlarmDecoder));
        registry.register(["OGNAVI", "OGNAVI-1"], Arc::new(NaviterDecoder));
        registry.register(["OGSPOT"], Arc::new(SpotDecoder));
        registry.set_default(Arc::new(ServerDecoder));
        registry
    }

    /// Bind `decoder` to every token. Re-binding a token replaces the previous decoder.
    pub fn register<I, S>(&self, tokens: I, decoder: Arc<dyn MessageDecoder>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            let token = token.into();
            if let Some(previous) = self.decoders.insert(token.clone(), decoder.clone()) {
                warn!(
                    "Decoder '{}' replaces '{}' for destination {}",
                    decoder.name(),
                    previous.name(),
                    token
                );
            }
        }
    }

    /// Set the fallback decoder, returning the one it replaces.
    ///
    /// Last call wins.
    pub fn set_default(&self, decoder: Arc<dyn MessageDecoder>) -> Option<Arc<dyn MessageDecoder>> {
        let mut slot = self.default.write().unwrap_or_else(PoisonError::into_inner);
        let previous = slot.replace(decoder);
        if let (Some(previous), Some(current)) = (&previous, slot.as_ref()) {
            warn!(
                "Default decoder '{}' replaced by '{}'",
                previous.name(),
                current.name()
            );
        }
        previous
    }

    pub fn default_decoder(&self) -> Option<Arc<dyn MessageDecoder>> {
        self.default
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn default_name(&self) -> Option<&'static str> {
        self.default_decoder().map(|d| d.name())
    }

    /// Sorted list of bound destination tokens
    pub fn registered_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.decoders.iter().map(|e| e.key().clone()).collect();
        tokens.sort();
        tokens
    }

    /// Pick the decoder for a raw line.
    ///
    /// Server-originated lines (`TCPIP*` path) and lines without a position
    /// marker go to the default decoder when one is set. Everything else is
    /// looked up by destination token, falling back to the default.
    pub fn resolve(&self, raw: &str) -> Result<Arc<dyn MessageDecoder>> {
        let (_, body) = raw
            .split_once('>')
            .ok_or_else(|| OgnError::parse(raw, DecodeError::MissingOrigin))?;
        let routing = body.split(':').next().unwrap_or(body);
        let mut fields = routing.split(',');
        let destto = fields.next().unwrap_or_default();
        let server_line =
            fields.next() == Some(SERVER_PATH_TOKEN) || !body.contains(POSITION_MARKER);

        let default = self.default_decoder();
        if server_line {
            if let Some(default) = default.clone() {
                trace!("Routing {} to default decoder '{}'", destto, default.name());
                return Ok(default);
            }
        }

        if let Some(decoder) = self.decoders.get(destto) {
            return Ok(decoder.value().clone());
        }

        default.ok_or_else(|| OgnError::DecoderNotFound {
            destto: destto.to_string(),
            registered: self.registered_tokens(),
        })
    }

    /// Decode a raw line with whichever decoder `resolve` picks
    pub fn dispatch(&self, raw: &str, now: DateTime<Utc>) -> Result<DecodedMessage> {
        let decoder = self.resolve(raw)?;
        decoder
            .decode(raw, now)
            .map_err(|source| OgnError::parse(raw, source))
    }
}

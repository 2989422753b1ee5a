//! Shared peer address types.
use std::net;

use microserde as serde;

use crate::LocalTime;

/// Address source. Specifies where an address originated from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Source {
    /// An address that was shared by another peer.
    Peer(net::SocketAddr),
    /// An address that came from a DNS seed.
    Dns,
    /// An address supplied by the user, eg. through configuration.
    #[default]
    Imported,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Peer(addr) => write!(f, "{}", addr),
            Self::Dns => write!(f, "DNS"),
            Self::Imported => write!(f, "imported"),
        }
    }
}

impl Source {
    fn to_json(self) -> serde::json::Value {
        use serde::json::Value;

        match self {
            Self::Peer(addr) => Value::String(format!("peer:{}", addr)),
            Self::Dns => Value::String("dns".to_owned()),
            Self::Imported => Value::String("imported".to_owned()),
        }
    }

    fn from_json(v: Option<&serde::json::Value>) -> Result<Self, serde::Error> {
        use serde::json::Value;

        match v {
            Some(Value::String(s)) if s == "dns" => Ok(Self::Dns),
            Some(Value::String(s)) if s == "imported" => Ok(Self::Imported),
            Some(Value::String(s)) => match s.strip_prefix("peer:") {
                Some(addr) => addr.parse().map(Self::Peer).map_err(|_| serde::Error),
                None => Err(serde::Error),
            },
            _ => Err(serde::Error),
        }
    }
}

/// A known peer address along with its dialing history.
///
/// Known addresses are never forgotten, only deprioritized as failures add up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownAddress {
    /// Network address.
    pub addr: net::SocketAddr,
    /// Where we learned about this address.
    pub source: Source,
    /// Number of successful connections.
    pub success_count: u32,
    /// Number of failed connections.
    pub failure_count: u32,
    /// Last time this address was tried.
    pub last_attempt: Option<LocalTime>,
    /// Last time this address was used to successfully connect to a peer.
    pub last_success: Option<LocalTime>,
}

impl KnownAddress {
    /// Create a new, never tried, known address.
    pub fn new(addr: net::SocketAddr, source: Source) -> Self {
        Self {
            addr,
            source,
            success_count: 0,
            failure_count: 0,
            last_attempt: None,
            last_success: None,
        }
    }

    /// Check whether this address was ever tried.
    pub fn is_tried(&self) -> bool {
        self.last_attempt.is_some()
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde::json::Value {
        use serde::json::{Number, Object, Value};

        fn time(t: Option<LocalTime>) -> Value {
            match t {
                Some(t) => Value::Number(Number::U64(t.as_secs())),
                None => Value::Null,
            }
        }
        let mut obj = Object::new();

        obj.insert("address".to_owned(), Value::String(self.addr.to_string()));
        obj.insert("source".to_owned(), self.source.to_json());
        obj.insert(
            "success_count".to_owned(),
            Value::Number(Number::U64(self.success_count as u64)),
        );
        obj.insert(
            "failure_count".to_owned(),
            Value::Number(Number::U64(self.failure_count as u64)),
        );
        obj.insert("last_attempt".to_owned(), time(self.last_attempt));
        obj.insert("last_success".to_owned(), time(self.last_success));

        Value::Object(obj)
    }

    /// Convert from a JSON value.
    pub fn from_json(v: serde::json::Value) -> Result<Self, serde::Error> {
        use serde::json::{Number, Value};

        fn count(v: Option<&Value>) -> Result<u32, serde::Error> {
            match v {
                Some(Value::Number(Number::U64(n))) => {
                    u32::try_from(*n).map_err(|_| serde::Error)
                }
                _ => Err(serde::Error),
            }
        }
        fn time(v: Option<&Value>) -> Result<Option<LocalTime>, serde::Error> {
            match v {
                Some(Value::Null) => Ok(None),
                Some(Value::Number(Number::U64(n))) => Ok(Some(LocalTime::from_secs(*n))),
                _ => Err(serde::Error),
            }
        }

        let obj = match v {
            Value::Object(obj) => obj,
            _ => return Err(serde::Error),
        };
        let addr = match obj.get("address") {
            Some(Value::String(addr)) => addr.parse().map_err(|_| serde::Error)?,
            _ => return Err(serde::Error),
        };

        Ok(Self {
            addr,
            source: Source::from_json(obj.get("source"))?,
            success_count: count(obj.get("success_count"))?,
            failure_count: count(obj.get("failure_count"))?,
            last_attempt: time(obj.get("last_attempt"))?,
            last_success: time(obj.get("last_success"))?,
        })
    }
}

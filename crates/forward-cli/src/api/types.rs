//! Control API request and response types.
//!
//! Deserialization structs matching the control API JSON bodies. Numeric
//! fields are tolerant of string encodings since older servers send
//! `"hostport": "3000"`.

use std::fmt;

use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use forward_core::TunnelRequest;

/// Field key under which errors not tied to a single option are reported.
pub const BASE_ERRORS: &str = "base";

/// Server-side tunnel description returned on create and show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TunnelRecord {
    #[serde(rename = "_id", alias = "id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub subdomain: String,
    #[serde(default)]
    pub cname: Option<String>,
    #[serde(default)]
    pub vhost: Option<String>,
    /// Local port the tunnel forwards to, echoed back from the request.
    #[serde(default, deserialize_with = "de_number")]
    pub hostport: u16,
    /// Port the tunnel server listens on for this tunnel.
    #[serde(rename = "port", default, deserialize_with = "de_number")]
    pub remote_port: u16,
    /// Host the transport connects to.
    #[serde(rename = "tunneler_public", default)]
    pub tunneler_host: String,
    /// Seconds of inactivity before the client closes the tunnel; 0 disables.
    #[serde(rename = "timeout", default, deserialize_with = "de_number")]
    pub idle_timeout: u64,
    #[serde(default)]
    pub state: Option<String>,
}

impl TunnelRecord {
    /// Whether the server reports the tunnel as ready to accept the transport.
    pub fn is_ready(&self) -> bool {
        self.state.as_deref().is_none_or(|state| state != "pending")
    }

    /// Non-empty CNAME alias, if any.
    pub fn cname_alias(&self) -> Option<&str> {
        self.cname.as_deref().filter(|c| !c.is_empty())
    }
}

/// Entry in the account's tunnel list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TunnelSummary {
    #[serde(rename = "_id", alias = "id", deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_number")]
    pub hostport: u16,
}

/// Structured error body: `{"type": ..., "message": ..., "errors": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "errors", default)]
    pub field_errors: FieldErrors,
}

/// Per-field rejection reasons, in the order the server listed them.
///
/// Decoding never fails: `null` or an unexpected shape yields no entries,
/// so the envelope's `type` and `message` survive a malformed `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<(String, Vec<String>)>);

impl FieldErrors {
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, reasons)| reasons.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, reasons)| (name.as_str(), reasons.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Vec<String>)> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Reasons for one field: a list of strings or a single string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Reasons {
    Many(Vec<String>),
    One(String),
    Other(IgnoredAny),
}

impl From<Reasons> for Vec<String> {
    fn from(reasons: Reasons) -> Self {
        match reasons {
            Reasons::Many(list) => list,
            Reasons::One(reason) => vec![reason],
            Reasons::Other(_) => Vec::new(),
        }
    }
}

impl<'de> Deserialize<'de> for FieldErrors {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldErrorsVisitor;

        impl<'de> Visitor<'de> for FieldErrorsVisitor {
            type Value = FieldErrors;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to reasons")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((field, reasons)) = map.next_entry::<String, Reasons>()? {
                    entries.push((field, reasons.into()));
                }
                Ok(FieldErrors(entries))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(FieldErrors::default())
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FieldErrors::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FieldErrors::default())
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
                Ok(FieldErrors::default())
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
                Ok(FieldErrors::default())
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
                Ok(FieldErrors::default())
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
                Ok(FieldErrors::default())
            }

            fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
                Ok(FieldErrors::default())
            }
        }

        deserializer.deserialize_any(FieldErrorsVisitor)
    }
}

/// Body of `POST /tunnels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateTunnelParams {
    pub hostport: u16,
    pub vhost: String,
    pub client: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub no_auth: bool,
}

impl CreateTunnelParams {
    pub fn from_request(request: &TunnelRequest, client: &str) -> Self {
        let (username, password) = request
            .credentials
            .as_ref()
            .map(|c| (c.username.clone(), c.password.clone()))
            .unzip();
        Self {
            hostport: request.local_port,
            vhost: request.local_host.clone(),
            client: client.to_string(),
            subdomain: request.subdomain_prefix.clone(),
            cname: request.cname.clone(),
            username,
            password,
            no_auth: request.no_auth,
        }
    }
}

/// Account returned by the token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiUser {
    #[serde(default)]
    pub email: Option<String>,
    pub api_token: String,
}

#[derive(Deserialize)]
pub(crate) struct TunnelEnvelope {
    pub tunnel: TunnelRecord,
}

#[derive(Deserialize)]
pub(crate) struct TunnelListEnvelope {
    #[serde(default)]
    pub tunnels: Vec<TunnelSummary>,
}

#[derive(Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: ApiUser,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(u64),
    Text(String),
}

fn de_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64> + Default,
{
    use serde::de::Error;

    let value = match Option::<Loose>::deserialize(deserializer)? {
        None => return Ok(T::default()),
        Some(Loose::Number(n)) => n,
        Some(Loose::Text(s)) if s.trim().is_empty() => return Ok(T::default()),
        Some(Loose::Text(s)) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("not a number: {s:?}")))?,
    };
    T::try_from(value).map_err(|_| D::Error::custom(format!("out of range: {value}")))
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Loose::deserialize(deserializer)? {
        Loose::Number(n) => n.to_string(),
        Loose::Text(s) => s,
    })
}

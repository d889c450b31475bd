/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! HTTP client for a proof-of-sequential-work (PoET) proving service.
//!
//! The ingest side of the surrounding node submits challenges to a PoET service and later fetches
//! the round proof. The service speaks JSON-encoded protobuf over HTTP under `/v1`: camelCase
//! field names, bytes as standard Base64 strings, durations as `"<secs>s"` strings, and 64-bit
//! integers as decimal strings. Every request runs with a 10-second timeout.
//!
//! Response status codes are mapped onto the error kinds callers retry on:
//! 200 is success, 404 is [`PoetError::NotFound`] (e.g. the round's proof is not ready),
//! 503 is [`PoetError::Unavailable`], and any other non-2xx status is a generic
//! [`PoetError::Status`].

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use log;
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::basic::Hash32;

/// Default per-request timeout.
pub const DEFAULT_POET_TIMEOUT: Duration = Duration::from_secs(10);

/// The public key identifying a PoET proving service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoetServiceId(Vec<u8>);

impl PoetServiceId {
    pub fn new(bytes: Vec<u8>) -> PoetServiceId {
        PoetServiceId(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The round a submitted challenge was registered into.
#[derive(Clone, Debug)]
pub struct PoetRound {
    pub id: String,
    pub challenge_hash: Hash32,
    /// When the round closes, if the service reported it.
    pub end: Option<SystemTime>,
}

/// A round's proof, together with the service key it verifies under.
#[derive(Clone, Debug)]
pub struct PoetProof {
    pub root: Vec<u8>,
    pub proven_leaves: Vec<Vec<u8>>,
    pub proof_nodes: Vec<Vec<u8>>,
    pub members: Vec<Vec<u8>>,
    pub leaf_count: u64,
    pub service_id: PoetServiceId,
}

#[derive(Debug)]
pub enum PoetError {
    /// The requested resource does not exist (yet): e.g. the proof of a still-open round.
    NotFound,
    /// The service is temporarily unable to answer.
    Unavailable,
    /// Any other non-OK response status.
    Status { status: u16 },
    /// The request could not be performed (connect, timeout, ...).
    Http(reqwest::Error),
    /// The response decoded, but its content violates the protocol.
    InvalidResponse { reason: String },
}

pub struct HttpPoetClient {
    base_url: String,
    client: Client,
    service_id: Mutex<Option<PoetServiceId>>,
}

impl HttpPoetClient {
    /// Create a client for the service at `target` (a `host[:port]`).
    pub fn new(target: &str) -> Result<HttpPoetClient, PoetError> {
        let client = Client::builder()
            .timeout(DEFAULT_POET_TIMEOUT)
            .build()
            .map_err(PoetError::Http)?;
        Ok(HttpPoetClient {
            base_url: format!("http://{}/v1", target),
            client,
            service_id: Mutex::new(None),
        })
    }

    /// Administrative endpoint that tells the proving service to start. Mostly used in tests,
    /// since it requires administrative permissions to the proving service.
    pub fn start(&self, gateway_addresses: Vec<String>) -> Result<(), PoetError> {
        let body = StartRequest { gateway_addresses };
        self.send(Method::POST, "/start", Some(serde_json::to_value(&body).unwrap()))?;
        Ok(())
    }

    /// Register a challenge in the service's current open round.
    pub fn submit(&self, challenge: Vec<u8>, signature: Vec<u8>) -> Result<PoetRound, PoetError> {
        let body = SubmitRequest {
            challenge,
            signature,
        };
        let data = self.send(Method::POST, "/submit", Some(serde_json::to_value(&body).unwrap()))?;
        let response: SubmitResponse = decode(&data)?;

        if response.hash.len() != 32 {
            return Err(PoetError::InvalidResponse {
                reason: format!("invalid hash length ({} instead of 32)", response.hash.len()),
            });
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&response.hash);

        let end = match response.round_end {
            Some(round_end) => Some(SystemTime::now() + parse_proto_duration(&round_end)?),
            None => None,
        };
        Ok(PoetRound {
            id: response.round_id,
            challenge_hash: Hash32::new(hash),
            end,
        })
    }

    /// The public key of the proving service, cached after the first successful fetch.
    pub fn service_id(&self) -> Result<PoetServiceId, PoetError> {
        if let Some(id) = self.service_id.lock().unwrap().clone() {
            return Ok(id);
        }
        let data = self.send(Method::GET, "/info", None)?;
        let response: GetInfoResponse = decode(&data)?;
        let id = PoetServiceId::new(response.service_pubkey);
        *self.service_id.lock().unwrap() = Some(id.clone());
        Ok(id)
    }

    /// Fetch the proof of a closed round.
    pub fn proof(&self, round_id: &str) -> Result<PoetProof, PoetError> {
        let data = self.send(Method::GET, &format!("/proofs/{}", round_id), None)?;
        let response: GetProofResponse = decode(&data)?;
        let service_id = PoetServiceId::new(response.pubkey);
        {
            let mut cached = self.service_id.lock().unwrap();
            if cached.is_none() {
                *cached = Some(service_id.clone());
            }
        }
        Ok(PoetProof {
            root: response.proof.proof.root,
            proven_leaves: response.proof.proof.proven_leaves,
            proof_nodes: response.proof.proof.proof_nodes,
            members: response.proof.members,
            leaf_count: response.proof.leaves,
            service_id,
        })
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Vec<u8>, PoetError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        request = match body {
            Some(body) => request.json(&body),
            None => request,
        };

        let response = request.send().map_err(PoetError::Http)?;
        let status = response.status();
        let data = response.bytes().map_err(PoetError::Http)?.to_vec();
        log::debug!(
            "response from poet service: status {}, body {}",
            status,
            String::from_utf8_lossy(&data)
        );

        match status {
            StatusCode::OK => Ok(data),
            StatusCode::NOT_FOUND => Err(PoetError::NotFound),
            StatusCode::SERVICE_UNAVAILABLE => Err(PoetError::Unavailable),
            other => Err(PoetError::Status {
                status: other.as_u16(),
            }),
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(data: &'a [u8]) -> Result<T, PoetError> {
    serde_json::from_slice(data).map_err(|err| PoetError::InvalidResponse {
        reason: format!("response json decode failure: {}", err),
    })
}

// A protojson duration: decimal seconds with an "s" suffix, e.g. "86400s" or "3.5s".
fn parse_proto_duration(value: &str) -> Result<Duration, PoetError> {
    let seconds = value
        .strip_suffix('s')
        .and_then(|secs| secs.parse::<f64>().ok())
        .filter(|secs| *secs >= 0.0)
        .ok_or_else(|| PoetError::InvalidResponse {
            reason: format!("invalid duration {:?}", value),
        })?;
    Ok(Duration::from_secs_f64(seconds))
}

/* ↓↓↓ Wire messages (JSON-encoded protobuf) ↓↓↓ */

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    gateway_addresses: Vec<String>,
}

#[derive(Serialize)]
struct SubmitRequest {
    #[serde(with = "b64")]
    challenge: Vec<u8>,
    #[serde(with = "b64")]
    signature: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    round_id: String,
    #[serde(default, with = "b64")]
    hash: Vec<u8>,
    #[serde(default)]
    round_end: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetInfoResponse {
    #[serde(default, with = "b64")]
    service_pubkey: Vec<u8>,
}

#[derive(Deserialize)]
struct GetProofResponse {
    #[serde(default)]
    proof: ProofEnvelope,
    #[serde(default, with = "b64")]
    pubkey: Vec<u8>,
}

#[derive(Default, Deserialize)]
struct ProofEnvelope {
    #[serde(default)]
    proof: MerkleProofMessage,
    #[serde(default, with = "b64_vec")]
    members: Vec<Vec<u8>>,
    #[serde(default, with = "string_u64")]
    leaves: u64,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MerkleProofMessage {
    #[serde(default, with = "b64")]
    root: Vec<u8>,
    #[serde(default, with = "b64_vec")]
    proven_leaves: Vec<Vec<u8>>,
    #[serde(default, with = "b64_vec")]
    proof_nodes: Vec<Vec<u8>>,
}

// protojson encodes bytes as standard Base64 strings.
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod b64_vec {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|item| STANDARD.decode(item.as_bytes()))
            .collect::<Result<_, _>>()
            .map_err(serde::de::Error::custom)
    }
}

// protojson encodes 64-bit integers as decimal strings; tolerate plain numbers too.
mod string_u64 {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(value) => value.parse().map_err(serde::de::Error::custom),
            StringOrNumber::Number(value) => Ok(value),
        }
    }
}

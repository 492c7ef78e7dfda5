//! Read access to the root published by the ledger contract

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ctree::{Address, Hash32};
use serde::Serialize;
use serde_json::Value as JsonValue;

const GET_METHOD_NAME: &str = "get_merkle_root";

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Root currently stored by the contract at `address`
    async fn merkle_root(&self, address: &Address) -> Result<Hash32>;
}

/// `runGetMethod` over the ledger's HTTP API
pub struct ToncenterClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct RunGetMethod<'a> {
    address: String,
    method: &'a str,
    stack: Vec<JsonValue>,
}

impl ToncenterClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building ledger http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LedgerClient for ToncenterClient {
    async fn merkle_root(&self, address: &Address) -> Result<Hash32> {
        let url = format!("{}/runGetMethod", self.base_url);
        let body = RunGetMethod {
            address: address.to_string(),
            method: GET_METHOD_NAME,
            stack: vec![],
        };

        let resp: JsonValue = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("ledger request failed")?
            .json()
            .await
            .context("ledger response is not json")?;

        parse_root(&resp)
    }
}

/// Extracts `result.stack[0][1]` as 32 big-endian bytes.
///
/// The value is an integer literal: hex with a `0x` prefix, decimal otherwise.
fn parse_root(resp: &JsonValue) -> Result<Hash32> {
    if resp.get("ok").and_then(JsonValue::as_bool) != Some(true) {
        bail!("response is not successful");
    }

    let value = resp
        .pointer("/result/stack/0/1")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| anyhow!("response has no stack value"))?;

    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => parse_hex(digits),
        None => parse_decimal(value),
    }
}

fn parse_hex(digits: &str) -> Result<Hash32> {
    let digits = digits.trim_start_matches('0');
    if digits.len() > 64 {
        bail!("stack value wider than 32 bytes");
    }

    let padded = format!("{digits:0>64}");
    let mut root = [0u8; 32];
    hex::decode_to_slice(&padded, &mut root).context("stack value is not hex")?;
    Ok(root)
}

fn parse_decimal(digits: &str) -> Result<Hash32> {
    if digits.is_empty() {
        bail!("stack value is empty");
    }

    let mut root = [0u8; 32];
    for c in digits.chars() {
        let digit = c
            .to_digit(10)
            .ok_or_else(|| anyhow!("stack value {digits:?} is not a decimal integer"))?;

        // root = root * 10 + digit, big-endian
        let mut carry = digit;
        for byte in root.iter_mut().rev() {
            let v = u32::from(*byte) * 10 + carry;
            *byte = (v & 0xff) as u8;
            carry = v >> 8;
        }
        if carry != 0 {
            bail!("stack value wider than 32 bytes");
        }
    }
    Ok(root)
}

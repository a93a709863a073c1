//! Client for the contract gateway fronting the on-chain lottery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::LotteryOutcome;

const LOTTERY_WINNER_EVENT: &str = "LotteryWinner";
const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Receipt of a mined lottery transaction, with the contract events the
/// gateway decoded out of its logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub gas_used: Option<String>,
    #[serde(default)]
    pub logs: Vec<ReceiptLog>,
}

/// One decoded contract event from a receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLog {
    pub event: String,
    #[serde(default)]
    pub disaster_hash: Option<String>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub participant_count: Option<u64>,
    #[serde(default)]
    pub prize_amount: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LotteryRequest<'a> {
    disaster_hash: &'a str,
    contract_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct GatewayEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<TransactionReceipt>,
}

/// The one operation this service needs from the chain. The contract itself
/// stays behind the gateway; callers interpret the returned receipt.
#[async_trait]
pub trait LotteryGateway: Send + Sync {
    async fn lottery(&self, disaster_hash: &str) -> Result<TransactionReceipt>;
}

/// Gateway client speaking the agent-server envelope over HTTP.
pub struct HttpGateway {
    host: String,
    contract_address: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: &Config) -> Self {
        HttpGateway {
            host: config.gateway_url.trim_end_matches('/').to_string(),
            contract_address: config.contract_address.clone(),
            auth_token: config.gateway_auth_token.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LotteryGateway for HttpGateway {
    async fn lottery(&self, disaster_hash: &str) -> Result<TransactionReceipt> {
        let token = self.auth_token.as_deref().ok_or(Error::MissingCredential)?;
        let body = LotteryRequest {
            disaster_hash,
            contract_address: &self.contract_address,
        };
        let response = self
            .client
            .post(format!("{}/lottery", self.host))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            // the gateway reports call failures in the same envelope
            if let Ok(envelope) = response.json::<GatewayEnvelope>().await {
                if let Some(error) = envelope.error {
                    return Err(Error::Contract(error));
                }
            }
            return Err(Error::Gateway(format!("gateway returned {status}")));
        }
        let envelope: GatewayEnvelope = response.json().await?;
        if !envelope.success {
            let message = envelope
                .error
                .unwrap_or_else(|| "Unknown contract error".to_string());
            return Err(Error::Contract(message));
        }
        envelope
            .data
            .ok_or_else(|| Error::Gateway("gateway response missing receipt data".to_string()))
    }
}

/// Normalize a disaster hash to the form the contract expects: `0x` followed
/// by 64 hex digits.
pub fn normalize_disaster_hash(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidDisasterHash(trimmed.to_string()));
    }
    Ok(format!("0x{}", digits.to_lowercase()))
}

/// Perform one on-chain lottery call and interpret the receipt.
///
/// A receipt without a `LotteryWinner` event is a failure; a `LotteryWinner`
/// with an empty or zero winner address is a lottery nobody donated to and
/// comes back as a success with an empty winner.
pub async fn execute_lottery(
    gateway: &dyn LotteryGateway,
    disaster_hash: &str,
) -> Result<LotteryOutcome> {
    let hash = normalize_disaster_hash(disaster_hash)?;
    let receipt = gateway.lottery(&hash).await?;
    let log = receipt
        .logs
        .iter()
        .find(|log| log.event == LOTTERY_WINNER_EVENT)
        .ok_or(Error::WinnerEventMissing)?;
    let winner = match log.winner.as_deref() {
        Some(address) if !address.is_empty() && address.to_lowercase() != ZERO_ADDRESS => {
            address.to_string()
        }
        _ => String::new(),
    };
    Ok(LotteryOutcome {
        winner,
        participant_count: log.participant_count.unwrap_or(0),
        prize_amount: log.prize_amount,
        transaction_hash: receipt.transaction_hash.clone(),
        gas_used: receipt.gas_used.clone(),
    })
}

//! Turns charge requests into mined blocks on the chain.
//!
//! All writers go through [`Recorder::record`], which holds a single lock from
//! reading the tip until the mined block is appended, so every block links to
//! the block that was the tip when it was built.

use crate::{
    chain::{Chain, ChainStore},
    constants::DEFAULT_DIFFICULTY,
    mine::{mine_block_bounded, mine_block_parallel, MineControl},
    now_millis, Block, RecordError, Transaction, ValidationError,
};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::sync::{atomic::AtomicBool, Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Incoming charge as received from a client. Every field is optional so that
/// missing fields surface as a [`ValidationError`] instead of a parse failure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    #[serde(rename = "fromNumber", default)]
    pub from_number: Option<String>,
    #[serde(rename = "toNumber", default)]
    pub to_number: Option<String>,
    #[serde(rename = "amountUSD", default)]
    pub amount_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<serde_json::Value>,
}

impl ChargeRequest {
    pub fn new(from_number: &str, to_number: &str, amount_usd: f64) -> Self {
        Self {
            from_number: Some(from_number.to_string()),
            to_number: Some(to_number.to_string()),
            amount_usd: Some(amount_usd),
            bytes: None,
        }
    }

    /// Checks required fields and stamps the transaction with `timestamp`.
    pub fn into_transaction(self, timestamp: u64) -> Result<Transaction, ValidationError> {
        let from_number = self
            .from_number
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("fromNumber"))?;
        let to_number = self
            .to_number
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingField("toNumber"))?;
        // A zero amount counts as absent, the same as an empty number.
        let amount_usd = self
            .amount_usd
            .filter(|a| *a != 0.0)
            .ok_or(ValidationError::MissingField("amountUSD"))?;
        if !amount_usd.is_finite() || amount_usd <= 0.0 {
            return Err(ValidationError::InvalidAmount(amount_usd));
        }
        Ok(Transaction {
            from_number,
            to_number,
            amount_usd,
            bytes: self.bytes,
            timestamp,
        })
    }
}

#[derive(Clone, Debug)]
pub struct RecorderConfig {
    pub difficulty: u32,
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
    pub parallel: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            max_attempts: None,
            timeout: None,
            parallel: false,
        }
    }
}

pub struct Recorder<S: ChainStore> {
    chain: Chain<S>,
    config: RecorderConfig,
    cancel: Arc<AtomicBool>,
    writer: Mutex<()>,
}

impl<S: ChainStore> Recorder<S> {
    pub fn new(chain: Chain<S>, config: RecorderConfig) -> Self {
        Self {
            chain,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            writer: Mutex::new(()),
        }
    }

    pub fn chain(&self) -> &Chain<S> {
        &self.chain
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Flag that aborts any in-flight and future mining once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn control(&self) -> MineControl {
        MineControl::new(self.cancel_handle())
            .with_max_attempts(self.config.max_attempts)
            .with_timeout(self.config.timeout)
    }

    /// Validate, build on the tip, mine, append. Exactly one append on success,
    /// none on failure.
    pub fn record(&self, request: ChargeRequest) -> Result<Block, RecordError> {
        let tx = request.into_transaction(now_millis())?;

        let _guard = self
            .writer
            .lock()
            .map_err(|_| anyhow!("recorder writer lock poisoned"))?;

        let tip = self.chain.tip()?;
        let block = Block::new(tip.index + 1, tip.hash, vec![tx]);
        debug!(
            index = block.index,
            previous_hash = %block.previous_hash,
            difficulty = self.config.difficulty,
            "mining block"
        );

        let control = self.control();
        let mined = if self.config.parallel {
            mine_block_parallel(block, self.config.difficulty, &control)?
        } else {
            mine_block_bounded(block, self.config.difficulty, &control)?
        };

        self.chain.append(mined.clone())?;
        info!(index = mined.index, hash = %mined.hash, "block appended");
        Ok(mined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn charge_request_parses_wire_names() {
        let req: ChargeRequest = serde_json::from_value(json!({
            "fromNumber": "+1000",
            "toNumber": "+2000",
            "amountUSD": 9.99,
            "bytes": {"memo": "coffee"}
        }))
        .unwrap();
        assert_eq!(req.from_number.as_deref(), Some("+1000"));
        assert_eq!(req.to_number.as_deref(), Some("+2000"));
        assert_eq!(req.amount_usd, Some(9.99));
        assert_eq!(req.bytes, Some(json!({"memo": "coffee"})));
    }

    #[test]
    fn charge_request_tolerates_missing_fields() {
        let req: ChargeRequest = serde_json::from_value(json!({"fromNumber": "+1000"})).unwrap();
        assert_eq!(req.to_number, None);
        assert_eq!(req.amount_usd, None);
    }

    #[test]
    fn into_transaction_example() {
        let tx = ChargeRequest::new("+1000", "+2000", 9.99)
            .into_transaction(42)
            .unwrap();
        assert_eq!(tx.from_number, "+1000");
        assert_eq!(tx.to_number, "+2000");
        assert_eq!(tx.amount_usd, 9.99);
        assert_eq!(tx.bytes, None);
        assert_eq!(tx.timestamp, 42);
    }

    #[test]
    fn into_transaction_reports_first_missing_field() {
        let req = ChargeRequest {
            from_number: Some("+1000".into()),
            ..Default::default()
        };
        assert_eq!(
            req.into_transaction(0),
            Err(ValidationError::MissingField("toNumber"))
        );

        let req = ChargeRequest {
            to_number: Some("+2000".into()),
            amount_usd: Some(1.0),
            ..Default::default()
        };
        assert_eq!(
            req.into_transaction(0),
            Err(ValidationError::MissingField("fromNumber"))
        );

        let req = ChargeRequest {
            from_number: Some("+1000".into()),
            to_number: Some("+2000".into()),
            ..Default::default()
        };
        assert_eq!(
            req.into_transaction(0),
            Err(ValidationError::MissingField("amountUSD"))
        );
    }

    #[test]
    fn into_transaction_treats_empty_numbers_as_missing() {
        let req = ChargeRequest::new("", "+2000", 1.0);
        assert_eq!(
            req.into_transaction(0),
            Err(ValidationError::MissingField("fromNumber"))
        );
    }

    #[test]
    fn into_transaction_treats_zero_amount_as_missing() {
        for amount in [0.0, -0.0] {
            assert_eq!(
                ChargeRequest::new("+1000", "+2000", amount).into_transaction(0),
                Err(ValidationError::MissingField("amountUSD"))
            );
        }
    }

    #[test]
    fn into_transaction_rejects_bad_amounts() {
        for amount in [-1.0, -0.01, f64::INFINITY, f64::NEG_INFINITY] {
            let err = ChargeRequest::new("+1000", "+2000", amount)
                .into_transaction(0)
                .unwrap_err();
            assert!(matches!(err, ValidationError::InvalidAmount(_)));
        }
        let err = ChargeRequest::new("+1000", "+2000", f64::NAN)
            .into_transaction(0)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAmount(a) if a.is_nan()));
    }

    #[test]
    fn default_config_uses_default_difficulty() {
        let config = RecorderConfig::default();
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(config.max_attempts, None);
        assert_eq!(config.timeout, None);
        assert!(!config.parallel);
    }
}

#![allow(dead_code)]

use chargechain_core::{
    chain::Chain,
    recorder::{ChargeRequest, Recorder, RecorderConfig},
};
use chargechain_store::MemoryStore;
use std::sync::Arc;

pub fn create_chain() -> Chain<MemoryStore> {
    let chain = Chain::new(Arc::new(MemoryStore::new()));
    chain.ensure_genesis().expect("Failed to create genesis");
    chain
}

pub fn create_recorder(difficulty: u32) -> Recorder<MemoryStore> {
    create_recorder_with(RecorderConfig {
        difficulty,
        ..RecorderConfig::default()
    })
}

pub fn create_recorder_with(config: RecorderConfig) -> Recorder<MemoryStore> {
    Recorder::new(create_chain(), config)
}

pub fn charge(from: &str, to: &str, amount: f64) -> ChargeRequest {
    ChargeRequest::new(from, to, amount)
}

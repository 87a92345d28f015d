// src/blockchain/mock_ledger.rs
//! In-memory [`DocumentLedger`] used by service and router tests.

use async_trait::async_trait;
use ethers::types::U256;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    AnchorReceipt, ChainError, DocumentLedger, OnChainSignature, PaymentCheck, SignatureReceipt,
};

#[derive(Default)]
struct LedgerState {
    anchored: HashSet<Uuid>,
    verified: HashSet<Uuid>,
    signatures: HashMap<Uuid, Vec<OnChainSignature>>,
    tx_counter: u64,
}

/// Records every call; fails writes when `fail_writes` is set.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
    fail_writes: bool,
    balance: U256,
    payment_verified: bool,
}

impl MockLedger {
    pub fn new() -> Self {
        MockLedger {
            balance: U256::exp10(18),
            payment_verified: true,
            ..MockLedger::default()
        }
    }

    pub fn failing() -> Self {
        MockLedger {
            fail_writes: true,
            ..MockLedger::new()
        }
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }

    /// Every payment lookup reports an underpaid transfer.
    pub fn with_unverified_payments(mut self) -> Self {
        self.payment_verified = false;
        self
    }

    pub fn is_anchored(&self, document_id: &Uuid) -> bool {
        self.state.lock().unwrap().anchored.contains(document_id)
    }

    fn next_tx(&self) -> Result<String, ChainError> {
        if self.fail_writes {
            return Err(ChainError::Rpc("execution reverted: not an admin".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.tx_counter += 1;
        Ok(format!("0x{:064x}", state.tx_counter))
    }
}

#[async_trait]
impl DocumentLedger for MockLedger {
    async fn add_document(
        &self,
        _did: &str,
        _ipfs_hash: &str,
        document_id: Uuid,
    ) -> Result<AnchorReceipt, ChainError> {
        let tx_hash = self.next_tx()?;
        self.state.lock().unwrap().anchored.insert(document_id);
        Ok(AnchorReceipt {
            tx_hash,
            block_number: Some(1),
        })
    }

    async fn verify_document(&self, document_id: Uuid) -> Result<AnchorReceipt, ChainError> {
        let tx_hash = self.next_tx()?;
        self.state.lock().unwrap().verified.insert(document_id);
        Ok(AnchorReceipt {
            tx_hash,
            block_number: Some(2),
        })
    }

    async fn is_document_verified(&self, document_id: Uuid) -> Result<bool, ChainError> {
        Ok(self.state.lock().unwrap().verified.contains(&document_id))
    }

    async fn add_admin_signature(
        &self,
        document_id: Uuid,
        admin_id: Uuid,
    ) -> Result<SignatureReceipt, ChainError> {
        let tx_hash = self.next_tx()?;
        self.state
            .lock()
            .unwrap()
            .signatures
            .entry(document_id)
            .or_default()
            .push(OnChainSignature {
                admin: admin_id.to_string(),
                signed_at: 1_700_000_000,
            });
        Ok(SignatureReceipt {
            signature: format!("0xsig-{}", admin_id.simple()),
            tx_hash,
        })
    }

    async fn get_admin_signatures(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<OnChainSignature>, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .signatures
            .get(&document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_multi_sig_complete(&self, _document_id: Uuid) -> Result<bool, ChainError> {
        Ok(false)
    }

    async fn balance_of(&self, _address: &str) -> Result<U256, ChainError> {
        Ok(self.balance)
    }

    async fn verify_payment(
        &self,
        _tx_hash: &str,
        expected_from: &str,
        expected_to: Option<&str>,
        _expected_wei: U256,
    ) -> Result<PaymentCheck, ChainError> {
        Ok(PaymentCheck {
            verified: self.payment_verified,
            from: expected_from.to_string(),
            to: expected_to.map(str::to_string),
            actual_amount: "0.02".into(),
            reason: (!self.payment_verified).then(|| "paid 0 ETH, expected 0.02 ETH".to_string()),
        })
    }
}

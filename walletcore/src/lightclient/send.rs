//! The two-phase send: a proposal reserves notes and fixes the fee, confirming it signs,
//! broadcasts and records the transaction.

use json::JsonValue;
use log::{error, info, warn};
use thiserror::Error;
use zcash_protocol::TxId;

use crate::{
    chain::ChainError,
    wallet::{
        propose::{Proposal, ProposalId, ProposeError, Recipient, ShieldError, ShieldSource},
        send::BuildError,
    },
};

use super::LightClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmError {
    #[error("No proposal. Call send or shield first.")]
    NoProposal,
    #[error("proposal {0} is not outstanding")]
    UnknownProposal(ProposalId),
    #[error("The transaction could not be built: {0}")]
    Build(#[from] BuildError),
    #[error("Broadcast failed: {0}")]
    Broadcast(#[from] ChainError),
}

impl LightClient {
    /// Proposes a payment and makes it the proposal a bare confirm applies to. The
    /// previous implicit proposal is abandoned first, so its notes can be reused.
    pub async fn propose_send(&self, recipients: Vec<Recipient>) -> Result<Proposal, ProposeError> {
        let mut current = self.current_proposal.lock().await;
        if let Some(previous) = current.take() {
            self.wallet.abandon_proposal(previous).await;
        }
        let proposal = self.wallet.propose_send(recipients).await?;
        *current = Some(proposal.id);
        Ok(proposal)
    }

    /// Like [`LightClient::propose_send`] for moving `source` funds to orchard.
    pub async fn propose_shield(&self, source: ShieldSource) -> Result<Proposal, ShieldError> {
        let mut current = self.current_proposal.lock().await;
        if let Some(previous) = current.take() {
            self.wallet.abandon_proposal(previous).await;
        }
        let proposal = self.wallet.propose_shield(source).await?;
        *current = Some(proposal.id);
        Ok(proposal)
    }

    pub async fn current_proposal(&self) -> Option<ProposalId> {
        *self.current_proposal.lock().await
    }

    /// Confirms the implicit proposal.
    pub async fn confirm_current(&self) -> Result<TxId, ConfirmError> {
        let id = self
            .current_proposal()
            .await
            .ok_or(ConfirmError::NoProposal)?;
        self.confirm(id).await
    }

    /// Signs and broadcasts proposal `id`. On success the transaction is recorded as
    /// pending, its inputs stay marked spent and the proposal is gone. On failure the
    /// proposal stays outstanding and can be confirmed again or abandoned.
    pub async fn confirm(&self, id: ProposalId) -> Result<TxId, ConfirmError> {
        let proposal = self
            .wallet
            .proposals
            .lock()
            .await
            .begin_confirm(id)
            .ok_or(ConfirmError::UnknownProposal(id))?;
        self.wallet.reset_send_progress().await;

        match self.build_and_broadcast(&proposal).await {
            Ok(txid) => {
                self.wallet.proposals.lock().await.confirm_succeeded(id);
                let mut current = self.current_proposal.lock().await;
                if *current == Some(id) {
                    *current = None;
                }
                drop(current);
                self.wallet.set_send_result(Ok(txid.to_string())).await;
                info!("Broadcast {txid} for proposal {id}");

                if let Err(e) = self.do_save().await {
                    warn!("could not save wallet after send: {e}");
                }
                Ok(txid)
            }
            Err(e) => {
                error!("Confirming proposal {id} failed: {e}");
                self.wallet.proposals.lock().await.confirm_failed(id);
                self.wallet.set_send_result(Err(e.to_string())).await;
                Err(e)
            }
        }
    }

    async fn build_and_broadcast(&self, proposal: &Proposal) -> Result<TxId, ConfirmError> {
        let built = self.wallet.build_transaction(proposal).await?;
        let txid = self.chain.send_transaction(built.transaction.to_bytes()).await?;
        if txid != built.txid {
            warn!("server reported txid {txid} for {}", built.txid);
        }
        // Recorded while the proposal still holds its notes.
        self.wallet
            .transactions
            .write()
            .await
            .insert_pending(built.record);
        Ok(built.txid)
    }

    /// Drops a proposal, the implicit one when `id` is `None`. Returns whether anything
    /// was abandoned.
    pub async fn abandon(&self, id: Option<ProposalId>) -> bool {
        let mut current = self.current_proposal.lock().await;
        let Some(id) = id.or(*current) else {
            return false;
        };
        if *current == Some(id) {
            *current = None;
        }
        self.wallet.abandon_proposal(id).await
    }

    pub async fn do_send_progress(&self) -> JsonValue {
        let progress = self.wallet.get_send_progress().await;
        progress.to_json(self.get_sync_interrupt().await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zcash_protocol::PoolType;

    use super::*;
    use crate::{
        chain::fake_chain::FakeChain,
        lightclient::test_support::{first_address, test_client},
    };

    const TADDR: &str = "tmBsTi2xWTjUdEXnuTceL7fecEQKeWaPDJd";
    const ZEC: u64 = 100_000_000;

    async fn funded_client(
        dir: &tempfile::TempDir,
        value: u64,
    ) -> (Arc<LightClient>, Arc<FakeChain>) {
        let (client, chain) = test_client(dir).await;
        let address = first_address(&client).await;
        chain.fund(&address, value, None).unwrap();
        chain.mine_block();
        client.do_sync().await.unwrap();
        (client, chain)
    }

    fn pay(amount: u64) -> Vec<Recipient> {
        vec![Recipient {
            address: TADDR.to_string(),
            amount,
            memo: None,
        }]
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_to_transparent_reduces_balance_by_amount_and_fee() {
        let dir = tempfile::tempdir().unwrap();
        let (client, chain) = funded_client(&dir, 2 * ZEC).await;
        assert_eq!(client.wallet.balances().await.orchard.spendable, 2 * ZEC);

        let proposal = client.propose_send(pay(ZEC)).await.unwrap();
        assert!(proposal.fee > 0);
        let txid = client.confirm_current().await.unwrap();

        let hex = txid.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            client.wallet.balances().await.total(),
            2 * ZEC - ZEC - proposal.fee
        );
        assert_eq!(chain.mempool_len(), 1);
        assert_eq!(client.current_proposal().await, None);

        let progress = client.do_send_progress().await;
        assert_eq!(progress["txid"], hex);
        assert_eq!(progress["sending"], false);

        chain.mine_block();
        client.do_sync().await.unwrap();
        let balances = client.wallet.balances().await;
        assert_eq!(balances.pool(PoolType::ORCHARD).total, ZEC - proposal.fee);
        assert_eq!(balances.pool(PoolType::ORCHARD).spendable, ZEC - proposal.fee);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overspend_is_rejected_without_changing_the_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = funded_client(&dir, 2 * ZEC).await;
        let before = client.wallet.balances().await;

        let err = client.propose_send(pay(3 * ZEC)).await.unwrap_err();
        assert!(matches!(err, ProposeError::InsufficientFunds { .. }));
        assert!(err.to_string().contains("insufficient funds"));
        assert_eq!(client.wallet.balances().await, before);
        assert!(client.wallet.proposals.lock().await.ids().is_empty());
        assert_eq!(
            client.confirm_current().await,
            Err(ConfirmError::NoProposal)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_proposals_cannot_share_the_only_note() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = funded_client(&dir, 2 * ZEC).await;

        let (a, b) = tokio::join!(
            client.wallet.propose_send(pay(ZEC / 2)),
            client.wallet.propose_send(pay(ZEC / 2)),
        );
        let (winner, loser) = match (a, b) {
            (Ok(winner), Err(loser)) | (Err(loser), Ok(winner)) => (winner, loser),
            other => panic!("expected exactly one proposal to succeed: {other:?}"),
        };
        assert_eq!(loser, ProposeError::FundsReserved(winner.id));
        assert!(loser.to_string().starts_with("insufficient funds"));

        client.confirm(winner.id).await.unwrap();
        assert!(matches!(
            client.wallet.propose_send(pay(ZEC / 2)).await,
            Err(ProposeError::InsufficientFunds { .. })
        ));
        assert_eq!(
            client.confirm(winner.id).await,
            Err(ConfirmError::UnknownProposal(winner.id))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_new_send_replaces_the_implicit_proposal() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = funded_client(&dir, 2 * ZEC).await;

        let first = client.propose_send(pay(ZEC)).await.unwrap();
        let second = client.propose_send(pay(ZEC / 4)).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(client.wallet.proposals.lock().await.ids(), vec![second.id]);
        assert_eq!(client.current_proposal().await, Some(second.id));

        assert!(client.abandon(None).await);
        assert!(!client.abandon(Some(second.id)).await);
        assert_eq!(client.current_proposal().await, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_broadcast_keeps_the_proposal() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _chain) = funded_client(&dir, 2 * ZEC).await;
        let proposal = client.propose_send(pay(ZEC)).await.unwrap();

        // Broadcasting the same spend twice is rejected by the chain.
        let built = client.wallet.build_transaction(&proposal).await.unwrap();
        client
            .chain()
            .send_transaction(built.transaction.to_bytes())
            .await
            .unwrap();

        let err = client.confirm(proposal.id).await.unwrap_err();
        assert!(matches!(err, ConfirmError::Broadcast(_)));
        assert_eq!(
            client.wallet.proposals.lock().await.ids(),
            vec![proposal.id]
        );
        let progress = client.do_send_progress().await;
        assert!(progress["error"].as_str().unwrap().contains("Broadcast failed"));
        assert!(progress["txid"].is_null());
        assert!(client.abandon(Some(proposal.id)).await);
    }
}

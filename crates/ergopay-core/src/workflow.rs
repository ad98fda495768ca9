//! dApp-initiated signing: fetch a request, sign, broadcast, report back

use std::fmt;
use std::sync::Arc;

use cold_signing::{response_collector, response_from_collector, ColdSigningRequest};
use qr_transport::{PageCollector, ReassembleError};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use wallet_core::{
    EventBus, SigningSecret, TransactionBroadcaster, TransactionPreview, TransactionPreviewer,
    TransactionSigner, TxId, TxOutcome, WalletInfo, WorkflowError, WorkflowEvent,
};

use crate::error::ErgoPayError;
use crate::transport::ErgoPayTransport;
use crate::types::{ErgoPaySigningRequest, MessageSeverity, ReplyPayload};
use crate::uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErgoPayState {
    WaitForWallet,
    WaitForAddress,
    FetchData,
    WaitForConfirmation,
    Done,
}

impl fmt::Display for ErgoPayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitForWallet => "WAIT_FOR_WALLET",
            Self::WaitForAddress => "WAIT_FOR_ADDRESS",
            Self::FetchData => "FETCH_DATA",
            Self::WaitForConfirmation => "WAIT_FOR_CONFIRMATION",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Collaborators of an [`ErgoPayWorkflow`]
#[derive(Clone)]
pub struct ErgoPayServices {
    pub transport: Arc<dyn ErgoPayTransport>,
    pub previewer: Arc<dyn TransactionPreviewer>,
    pub signer: Arc<dyn TransactionSigner>,
    pub broadcaster: Arc<dyn TransactionBroadcaster>,
}

/// One ErgoPay request from URI to final message
pub struct ErgoPayWorkflow {
    request_uri: String,
    wallets: Vec<WalletInfo>,
    services: ErgoPayServices,
    state: ErgoPayState,
    wallet: Option<WalletInfo>,
    derivation_index: Option<u32>,
    request: Option<ErgoPaySigningRequest>,
    preview: Option<TransactionPreview>,
    last_message: Option<String>,
    last_severity: MessageSeverity,
    tx_id: Option<TxId>,
    signed_collector: Option<PageCollector>,
    reply_task: Option<JoinHandle<()>>,
    events: EventBus<ErgoPayState>,
}

impl ErgoPayWorkflow {
    /// `wallets` are the wallets the user may pick from
    pub fn new(request_uri: impl Into<String>, wallets: Vec<WalletInfo>, services: ErgoPayServices) -> Self {
        Self {
            request_uri: request_uri.into().trim().to_string(),
            wallets,
            services,
            state: ErgoPayState::WaitForWallet,
            wallet: None,
            derivation_index: None,
            request: None,
            preview: None,
            last_message: None,
            last_severity: MessageSeverity::None,
            tx_id: None,
            signed_collector: None,
            reply_task: None,
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent<ErgoPayState>> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ErgoPayState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.events.is_busy()
    }

    pub fn wallet(&self) -> Option<&WalletInfo> {
        self.wallet.as_ref()
    }

    pub fn derivation_index(&self) -> Option<u32> {
        self.derivation_index
    }

    pub fn request(&self) -> Option<&ErgoPaySigningRequest> {
        self.request.as_ref()
    }

    pub fn preview(&self) -> Option<&TransactionPreview> {
        self.preview.as_ref()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn last_severity(&self) -> MessageSeverity {
        self.last_severity
    }

    pub fn tx_id(&self) -> Option<&TxId> {
        self.tx_id.as_ref()
    }

    /// A finished request can be fetched again only if it came from a URL
    /// and nothing was broadcast for it yet
    pub fn can_reload_from_dapp(&self) -> bool {
        self.state == ErgoPayState::Done
            && uri::is_ergopay_request(&self.request_uri)
            && !uri::is_static_request(&self.request_uri)
            && self.tx_id.is_none()
    }

    /// Background reply-to callback, if one was started
    pub fn take_reply_task(&mut self) -> Option<JoinHandle<()>> {
        self.reply_task.take()
    }

    fn require(&self, expected: ErgoPayState, operation: &'static str) -> Result<(), WorkflowError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkflowError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    fn set_state(&mut self, state: ErgoPayState) {
        tracing::debug!(from = %self.state, to = %state, "ergopay state change");
        self.state = state;
        self.events.emit(WorkflowEvent::StateChanged(state));
    }

    fn finish(&mut self, message: impl Into<String>, severity: MessageSeverity) {
        let message = message.into();
        if severity == MessageSeverity::Error {
            self.events.emit(WorkflowEvent::Error(message.clone()));
        }
        self.last_message = Some(message);
        self.last_severity = severity;
        self.set_state(ErgoPayState::Done);
    }

    /// Begin processing. A wallet and address supplied by the caller skip
    /// the corresponding selection steps.
    pub async fn start(
        &mut self,
        wallet_id: Option<i64>,
        derivation_index: Option<u32>,
    ) -> Result<(), WorkflowError> {
        self.require(ErgoPayState::WaitForWallet, "start")?;

        if !uri::is_ergopay_request(&self.request_uri) {
            let err = ErgoPayError::NotErgoPay(self.request_uri.clone());
            self.finish(err.to_string(), MessageSeverity::Error);
            return Ok(());
        }

        let wallet = match wallet_id {
            Some(id) => Some(
                self.wallets
                    .iter()
                    .find(|w| w.id == id)
                    .cloned()
                    .ok_or(WorkflowError::NoWallet)?,
            ),
            None if self.wallets.len() == 1 => self.wallets.first().cloned(),
            None => None,
        };

        match wallet {
            Some(wallet) => self.use_wallet(wallet, derivation_index).await,
            None if self.wallets.is_empty() => {
                self.finish("No wallet available to sign this request", MessageSeverity::Error);
                Ok(())
            }
            None => {
                self.set_state(ErgoPayState::WaitForWallet);
                Ok(())
            }
        }
    }

    /// Pick the wallet while waiting for one
    pub async fn select_wallet(&mut self, wallet_id: i64) -> Result<(), WorkflowError> {
        self.require(ErgoPayState::WaitForWallet, "select_wallet")?;
        let wallet = self
            .wallets
            .iter()
            .find(|w| w.id == wallet_id)
            .cloned()
            .ok_or(WorkflowError::NoWallet)?;
        self.use_wallet(wallet, None).await
    }

    /// Pick the address while waiting for one
    pub async fn select_address(&mut self, derivation_index: u32) -> Result<(), WorkflowError> {
        self.require(ErgoPayState::WaitForAddress, "select_address")?;
        let wallet = self.wallet.as_ref().ok_or(WorkflowError::NoWallet)?;
        if wallet.address_for_index(derivation_index).is_none() {
            return Err(WorkflowError::UnknownAddress {
                wallet_id: wallet.id,
                index: derivation_index,
            });
        }
        self.derivation_index = Some(derivation_index);
        self.fetch_data().await;
        Ok(())
    }

    async fn use_wallet(
        &mut self,
        wallet: WalletInfo,
        derivation_index: Option<u32>,
    ) -> Result<(), WorkflowError> {
        if let Some(index) = derivation_index {
            if wallet.address_for_index(index).is_none() {
                return Err(WorkflowError::UnknownAddress {
                    wallet_id: wallet.id,
                    index,
                });
            }
        }

        let derivation_index = derivation_index.or_else(|| match wallet.addresses.as_slice() {
            [only] => Some(only.derivation_index),
            _ => None,
        });
        let needs_address = uri::needs_address(&self.request_uri);
        self.wallet = Some(wallet);
        self.derivation_index = derivation_index;

        if needs_address && derivation_index.is_none() {
            self.set_state(ErgoPayState::WaitForAddress);
        } else {
            self.fetch_data().await;
        }
        Ok(())
    }

    fn chosen_address(&self) -> Option<String> {
        let wallet = self.wallet.as_ref()?;
        let index = self.derivation_index?;
        wallet.address_for_index(index).map(|a| a.to_string())
    }

    async fn load_request(&self) -> Result<ErgoPaySigningRequest, ErgoPayError> {
        if uri::is_static_request(&self.request_uri) {
            return uri::parse_static_request(&self.request_uri);
        }
        let address = self.chosen_address();
        let url = uri::fetch_url(&self.request_uri, address.as_deref())?;
        tracing::info!(url = %url, "Fetching ErgoPay request");
        let body = self.services.transport.fetch(&url).await?;
        ErgoPaySigningRequest::from_json(&body)
    }

    async fn fetch_data(&mut self) {
        self.last_message = None;
        self.last_severity = MessageSeverity::None;
        self.request = None;
        self.preview = None;
        self.signed_collector = None;
        self.set_state(ErgoPayState::FetchData);

        let loaded = match self.events.lock() {
            Ok(_guard) => self.load_request().await,
            Err(e) => {
                self.finish(e.to_string(), MessageSeverity::Error);
                return;
            }
        };

        let request = match loaded {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, code = e.error_code(), "ErgoPay request could not be loaded");
                self.finish(format!("An error occurred: {}", e), MessageSeverity::Error);
                return;
            }
        };
        self.on_request(request).await;
    }

    async fn on_request(&mut self, request: ErgoPaySigningRequest) {
        let requested_index = match (&request.p2pk_address, &self.wallet) {
            (Some(expected), Some(wallet)) => Some(
                wallet
                    .addresses
                    .iter()
                    .find(|a| a.address.as_str() == expected)
                    .map(|a| a.derivation_index)
                    .ok_or_else(|| {
                        format!(
                            "The dApp requested address {} which is not part of wallet {}",
                            expected, wallet.name
                        )
                    }),
            ),
            _ => None,
        };
        match requested_index {
            Some(Ok(index)) => self.derivation_index = Some(index),
            Some(Err(message)) => {
                self.request = Some(request);
                self.finish(message, MessageSeverity::Error);
                return;
            }
            None => {}
        }

        let Some(reduced_tx) = request.reduced_tx.clone() else {
            let message = request.message.clone().unwrap_or_default();
            let severity = request.message_severity;
            self.request = Some(request);
            self.finish(message, severity);
            return;
        };

        let preview = {
            let Ok(_guard) = self.events.lock() else {
                self.finish(WorkflowError::Busy.to_string(), MessageSeverity::Error);
                return;
            };
            self.services.previewer.preview(&reduced_tx, &[]).await
        };

        match preview {
            Ok(preview) => {
                tracing::info!(tx_id = %preview.tx_id, "ErgoPay transaction ready for confirmation");
                self.last_message = request.message.clone();
                self.last_severity = request.message_severity;
                self.request = Some(request);
                self.preview = Some(preview);
                self.set_state(ErgoPayState::WaitForConfirmation);
            }
            Err(e) => {
                self.request = Some(request);
                self.finish(format!("An error occurred: {}", e), MessageSeverity::Error);
            }
        }
    }

    /// Fetch the request again after a failure
    pub async fn reload_from_dapp(&mut self) -> Result<(), WorkflowError> {
        if !self.can_reload_from_dapp() {
            return Err(WorkflowError::InvalidState {
                operation: "reload_from_dapp",
                state: self.state.to_string(),
            });
        }
        self.fetch_data().await;
        Ok(())
    }

    fn confirmation_tx(&self, operation: &'static str) -> Result<Vec<u8>, WorkflowError> {
        self.require(ErgoPayState::WaitForConfirmation, operation)?;
        self.request
            .as_ref()
            .and_then(|r| r.reduced_tx.clone())
            .ok_or(WorkflowError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
    }

    /// Sign with the wallet's keys and broadcast.
    ///
    /// Signing failures keep the request so the user can retry; they are
    /// returned as a failed outcome.
    pub async fn confirm_signing(&mut self, secret: &SigningSecret) -> Result<TxOutcome, WorkflowError> {
        let reduced_tx = self.confirmation_tx("confirm_signing")?;
        let wallet = self.wallet.as_ref().ok_or(WorkflowError::NoWallet)?;
        if wallet.read_only {
            return Err(WorkflowError::InvalidState {
                operation: "confirm_signing",
                state: "read-only wallet".to_string(),
            });
        }
        let indices = match self.derivation_index {
            Some(index) => vec![index],
            None => wallet.derivation_indices(),
        };

        let _guard = self.events.lock()?;
        let signed = self
            .services
            .signer
            .sign_reduced(&reduced_tx, secret, &indices)
            .await;

        match signed {
            Ok(signed_tx) => Ok(self.broadcast(&signed_tx).await),
            Err(e) => {
                tracing::warn!(error = %e, authentication = e.is_authentication(), "ErgoPay signing failed");
                let outcome = TxOutcome::failed(e.to_string());
                self.events.emit(WorkflowEvent::Error(e.to_string()));
                self.events.emit(WorkflowEvent::TxResult(outcome.clone()));
                Ok(outcome)
            }
        }
    }

    /// For read-only wallets: build the EIP-19 request an external signer
    /// has to sign, announce it and start collecting the signed answer
    pub fn prepare_external_signing(&mut self) -> Result<String, WorkflowError> {
        let reduced_tx = self.confirmation_tx("prepare_external_signing")?;
        let inputs = self
            .preview
            .as_ref()
            .map(|p| p.serialized_inputs.clone())
            .unwrap_or_default();
        let sender = self
            .chosen_address()
            .or_else(|| self.wallet.as_ref()?.first_address().map(|a| a.to_string()));

        let json = ColdSigningRequest {
            reduced_tx,
            sender,
            inputs,
        }
        .to_json()
        .map_err(|e| WorkflowError::Payload(e.to_string()))?;

        self.signed_collector = Some(response_collector());
        self.events.emit(WorkflowEvent::SigningPromptReady(json.clone()));
        Ok(json)
    }

    /// Feed a scanned chunk of the externally signed transaction. Broadcasts
    /// once all pages are in.
    pub async fn add_signed_chunk(&mut self, raw: &str) -> Result<bool, WorkflowError> {
        self.require(ErgoPayState::WaitForConfirmation, "add_signed_chunk")?;
        let collector = self
            .signed_collector
            .as_mut()
            .ok_or(WorkflowError::InvalidState {
                operation: "add_signed_chunk",
                state: "no external signing prepared".to_string(),
            })?;

        if !collector.add_chunk(raw) {
            return Ok(false);
        }
        if !collector.has_all_pages() {
            return Ok(true);
        }

        match response_from_collector(collector) {
            Ok(response) => {
                let _guard = self.events.lock()?;
                self.broadcast(&response.signed_tx).await;
            }
            Err(ReassembleError::PagesMissing { .. }) => {}
            Err(ReassembleError::Deserialize(e)) => {
                collector.reset();
                self.events
                    .emit(WorkflowEvent::Error(format!("Not a signed transaction: {}", e)));
            }
        }
        Ok(true)
    }

    /// Broadcast and report. Always ends in `Done`; the caller holds the busy guard.
    async fn broadcast(&mut self, signed_tx: &[u8]) -> TxOutcome {
        let reply_to = self.request.as_ref().and_then(|r| r.reply_to_url.clone());

        let (outcome, reply) = match self.services.broadcaster.broadcast(signed_tx).await {
            Ok(tx_id) => {
                tracing::info!(tx_id = %tx_id, "ErgoPay transaction submitted");
                self.tx_id = Some(tx_id.clone());
                self.finish(
                    format!("Transaction {} submitted", tx_id),
                    MessageSeverity::Information,
                );
                (
                    TxOutcome::submitted(tx_id.clone()),
                    ReplyPayload::Submitted {
                        tx_id: tx_id.to_string(),
                    },
                )
            }
            Err(e) => {
                tracing::warn!(error = %e, "ErgoPay broadcast failed");
                self.finish(format!("Transaction not submitted: {}", e), MessageSeverity::Error);
                (
                    TxOutcome::failed(e.to_string()),
                    ReplyPayload::Failed {
                        error: e.to_string(),
                    },
                )
            }
        };
        self.events.emit(WorkflowEvent::TxResult(outcome.clone()));

        if let Some(url) = reply_to {
            self.reply_task = Some(self.spawn_reply(url, reply));
        }
        outcome
    }

    fn spawn_reply(&self, url: String, payload: ReplyPayload) -> JoinHandle<()> {
        let transport = self.services.transport.clone();
        tokio::spawn(async move {
            match transport.reply(&url, &payload).await {
                Ok(()) => tracing::debug!(url = %url, "dApp notified"),
                Err(e) => tracing::warn!(url = %url, error = %e, "Reply to dApp failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cold_signing::response_to_chunks;
    use cold_signing::ColdSigningResponse;
    use qr_transport::{ChunkPresets, QrResolution};
    use wallet_core::{
        Address, DerivedAddress, NodeError, PreviewError, SigningError, TransportError,
    };

    const DAPP_URI: &str = "ergopay://dapp.example/tx/1";
    const DAPP_URL: &str = "https://dapp.example/tx/1";
    const TX_ID: &str = "4c6282be413c6e300a530618b37790be5f286ded758accc2aebd41554a1be308";

    #[derive(Default)]
    struct FakeTransport {
        bodies: Mutex<HashMap<String, Result<String, TransportError>>>,
        fetched: Mutex<Vec<String>>,
        replies: Mutex<Vec<(String, ReplyPayload)>>,
        fail_replies: bool,
    }

    impl FakeTransport {
        fn serve(&self, url: &str, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), Ok(body.to_string()));
        }

        fn fail(&self, url: &str) {
            self.bodies.lock().unwrap().insert(
                url.to_string(),
                Err(TransportError::RequestFailed {
                    url: url.to_string(),
                    message: "connection refused".into(),
                }),
            );
        }
    }

    #[async_trait]
    impl ErgoPayTransport for FakeTransport {
        async fn fetch(&self, url: &str) -> Result<String, TransportError> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.bodies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or(Err(TransportError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }))
        }

        async fn reply(&self, url: &str, payload: &ReplyPayload) -> Result<(), TransportError> {
            self.replies
                .lock()
                .unwrap()
                .push((url.to_string(), payload.clone()));
            if self.fail_replies {
                return Err(TransportError::HttpStatus {
                    url: url.to_string(),
                    status: 500,
                });
            }
            Ok(())
        }
    }

    struct FakePreviewer;

    #[async_trait]
    impl TransactionPreviewer for FakePreviewer {
        async fn preview(
            &self,
            _reduced_tx: &[u8],
            _input_boxes: &[Vec<u8>],
        ) -> Result<TransactionPreview, PreviewError> {
            Ok(TransactionPreview {
                tx_id: TxId::new(TX_ID),
                inputs: vec![],
                outputs: vec![],
                serialized_inputs: vec![vec![1, 2, 3]],
            })
        }
    }

    #[derive(Default)]
    struct FakeSigner {
        indices: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl TransactionSigner for FakeSigner {
        async fn sign_reduced(
            &self,
            reduced_tx: &[u8],
            secret: &SigningSecret,
            derivation_indices: &[u32],
        ) -> Result<Vec<u8>, SigningError> {
            if secret.mnemonic().is_empty() {
                return Err(SigningError::InvalidSecret);
            }
            *self.indices.lock().unwrap() = derivation_indices.to_vec();
            Ok(reduced_tx.iter().rev().copied().collect())
        }
    }

    #[derive(Default)]
    struct FakeBroadcaster {
        reject: bool,
        submitted: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl TransactionBroadcaster for FakeBroadcaster {
        async fn broadcast(&self, signed_tx: &[u8]) -> Result<TxId, NodeError> {
            if self.reject {
                return Err(NodeError::Rejected {
                    message: "double spending attempt".into(),
                });
            }
            self.submitted.lock().unwrap().push(signed_tx.to_vec());
            Ok(TxId::new(TX_ID))
        }
    }

    struct Harness {
        transport: Arc<FakeTransport>,
        signer: Arc<FakeSigner>,
        broadcaster: Arc<FakeBroadcaster>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(FakeTransport::default(), FakeBroadcaster::default())
        }

        fn with(transport: FakeTransport, broadcaster: FakeBroadcaster) -> Self {
            Self {
                transport: Arc::new(transport),
                signer: Arc::new(FakeSigner::default()),
                broadcaster: Arc::new(broadcaster),
            }
        }

        fn workflow(&self, uri: &str, wallets: Vec<WalletInfo>) -> ErgoPayWorkflow {
            ErgoPayWorkflow::new(
                uri,
                wallets,
                ErgoPayServices {
                    transport: self.transport.clone(),
                    previewer: Arc::new(FakePreviewer),
                    signer: self.signer.clone(),
                    broadcaster: self.broadcaster.clone(),
                },
            )
        }
    }

    fn wallet(id: i64, indices: &[u32], read_only: bool) -> WalletInfo {
        WalletInfo {
            id,
            name: format!("wallet {}", id),
            addresses: indices
                .iter()
                .map(|i| DerivedAddress {
                    derivation_index: *i,
                    address: Address::new(format!("9w{}a{}", id, i)),
                })
                .collect(),
            read_only,
        }
    }

    fn secret() -> SigningSecret {
        SigningSecret::new("abandon abandon", "")
    }

    #[tokio::test]
    async fn test_url_request_signed_broadcast_and_replied() {
        let harness = Harness::new();
        harness.transport.serve(
            DAPP_URL,
            r#"{"reducedTx":"BwcH","message":"Swap","messageSeverity":"INFORMATION","replyTo":"https://dapp.example/reply"}"#,
        );
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0, 2], false)]);

        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForConfirmation);
        assert_eq!(workflow.last_message(), Some("Swap"));
        assert!(workflow.preview().is_some());

        let outcome = workflow.confirm_signing(&secret()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_severity(), MessageSeverity::Information);
        assert_eq!(workflow.tx_id().map(TxId::as_str), Some(TX_ID));
        assert_eq!(*harness.signer.indices.lock().unwrap(), vec![0, 2]);
        assert_eq!(
            harness.broadcaster.submitted.lock().unwrap().as_slice(),
            &[vec![7, 7, 7]]
        );
        assert!(!workflow.can_reload_from_dapp());
        assert!(!workflow.is_busy());

        workflow.take_reply_task().unwrap().await.unwrap();
        let replies = harness.transport.replies.lock().unwrap();
        assert_eq!(
            replies.as_slice(),
            &[(
                "https://dapp.example/reply".to_string(),
                ReplyPayload::Submitted {
                    tx_id: TX_ID.to_string()
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_allows_reload_for_url_requests() {
        let harness = Harness::new();
        harness.transport.fail(DAPP_URL);
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0], false)]);

        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_severity(), MessageSeverity::Error);
        assert!(workflow.can_reload_from_dapp());

        harness.transport.serve(DAPP_URL, r#"{"reducedTx":"BwcH"}"#);
        workflow.reload_from_dapp().await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForConfirmation);
        assert_eq!(workflow.last_severity(), MessageSeverity::None);
        assert_eq!(harness.transport.fetched.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_inline_failure_cannot_reload() {
        let harness = Harness::new();
        let mut workflow = harness.workflow("ergopay:!!!", vec![wallet(1, &[0], false)]);

        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_severity(), MessageSeverity::Error);
        assert!(!workflow.can_reload_from_dapp());
        assert!(workflow.reload_from_dapp().await.is_err());
        assert!(harness.transport.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inline_request_skips_fetch() {
        let harness = Harness::new();
        let mut workflow = harness.workflow("ergopay:BwcH", vec![wallet(1, &[0], false)]);
        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForConfirmation);
        assert!(harness.transport.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_only_response_ends_with_dapp_severity() {
        let harness = Harness::new();
        harness.transport.serve(
            DAPP_URL,
            r#"{"message":"Nothing to sign yet","messageSeverity":"WARNING"}"#,
        );
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0], false)]);
        workflow.start(None, None).await.unwrap();

        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_message(), Some("Nothing to sign yet"));
        assert_eq!(workflow.last_severity(), MessageSeverity::Warning);
    }

    #[tokio::test]
    async fn test_empty_response_never_reaches_confirmation() {
        let harness = Harness::new();
        harness
            .transport
            .serve(DAPP_URL, r#"{"replyTo":"https://dapp.example/reply"}"#);
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0], false)]);
        let mut events = workflow.subscribe();

        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_severity(), MessageSeverity::Error);

        while let Ok(event) = events.try_recv() {
            assert_ne!(
                event,
                WorkflowEvent::StateChanged(ErgoPayState::WaitForConfirmation)
            );
        }
    }

    #[tokio::test]
    async fn test_requested_address_must_belong_to_wallet() {
        let harness = Harness::new();
        harness
            .transport
            .serve(DAPP_URL, r#"{"reducedTx":"BwcH","address":"9someoneElse"}"#);
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0, 1], false)]);
        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_severity(), MessageSeverity::Error);

        harness
            .transport
            .serve(DAPP_URL, r#"{"reducedTx":"BwcH","address":"9w1a1"}"#);
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0, 1], false)]);
        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForConfirmation);
        assert_eq!(workflow.derivation_index(), Some(1));

        workflow.confirm_signing(&secret()).await.unwrap();
        assert_eq!(*harness.signer.indices.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_wallet_and_address_selection() {
        let harness = Harness::new();
        let uri = "ergopay://dapp.example/tx/#P2PK_ADDRESS#";
        harness
            .transport
            .serve("https://dapp.example/tx/9w2a5", r#"{"reducedTx":"BwcH"}"#);
        let mut workflow = harness.workflow(
            uri,
            vec![wallet(1, &[0], false), wallet(2, &[0, 5], false)],
        );

        workflow.start(None, None).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForWallet);

        workflow.select_wallet(2).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForAddress);
        assert!(matches!(
            workflow.select_address(9).await,
            Err(WorkflowError::UnknownAddress { index: 9, .. })
        ));

        workflow.select_address(5).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForConfirmation);
        assert_eq!(
            harness.transport.fetched.lock().unwrap().as_slice(),
            &["https://dapp.example/tx/9w2a5".to_string()]
        );
    }

    #[tokio::test]
    async fn test_caller_supplied_wallet_and_address_skip_selection() {
        let harness = Harness::new();
        harness
            .transport
            .serve("https://dapp.example/tx/9w2a5", r#"{"reducedTx":"BwcH"}"#);
        let mut workflow = harness.workflow(
            "ergopay://dapp.example/tx/#P2PK_ADDRESS#",
            vec![wallet(1, &[0], false), wallet(2, &[0, 5], false)],
        );
        let mut events = workflow.subscribe();

        workflow.start(Some(2), Some(5)).await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::WaitForConfirmation);
        while let Ok(event) = events.try_recv() {
            assert_ne!(event, WorkflowEvent::StateChanged(ErgoPayState::WaitForAddress));
        }
    }

    #[tokio::test]
    async fn test_signing_failure_keeps_confirmation() {
        let harness = Harness::new();
        let mut workflow = harness.workflow("ergopay:BwcH", vec![wallet(1, &[0], false)]);
        workflow.start(None, None).await.unwrap();

        let outcome = workflow
            .confirm_signing(&SigningSecret::new("", ""))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(workflow.state(), ErgoPayState::WaitForConfirmation);
        assert!(harness.broadcaster.submitted.lock().unwrap().is_empty());
        assert!(!workflow.is_busy());
    }

    #[tokio::test]
    async fn test_broadcast_failure_reported_to_dapp() {
        let harness = Harness::with(
            FakeTransport::default(),
            FakeBroadcaster {
                reject: true,
                ..Default::default()
            },
        );
        harness.transport.serve(
            DAPP_URL,
            r#"{"reducedTx":"BwcH","replyTo":"https://dapp.example/reply"}"#,
        );
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0], false)]);
        workflow.start(None, None).await.unwrap();

        let outcome = workflow.confirm_signing(&secret()).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_severity(), MessageSeverity::Error);

        workflow.take_reply_task().unwrap().await.unwrap();
        let replies = harness.transport.replies.lock().unwrap();
        assert!(matches!(replies[0].1, ReplyPayload::Failed { .. }));
    }

    #[tokio::test]
    async fn test_failed_reply_does_not_undo_submission() {
        let harness = Harness::with(
            FakeTransport {
                fail_replies: true,
                ..Default::default()
            },
            FakeBroadcaster::default(),
        );
        harness.transport.serve(
            DAPP_URL,
            r#"{"reducedTx":"BwcH","replyTo":"https://dapp.example/reply"}"#,
        );
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0], false)]);
        workflow.start(None, None).await.unwrap();
        workflow.confirm_signing(&secret()).await.unwrap();

        workflow.take_reply_task().unwrap().await.unwrap();
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(workflow.last_severity(), MessageSeverity::Information);
        assert!(workflow.tx_id().is_some());
        assert_eq!(harness.broadcaster.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_wallet_signs_externally() {
        let harness = Harness::new();
        harness.transport.serve(DAPP_URL, r#"{"reducedTx":"BwcH"}"#);
        let mut workflow = harness.workflow(DAPP_URI, vec![wallet(1, &[0], true)]);
        let mut events = workflow.subscribe();
        workflow.start(None, None).await.unwrap();

        assert!(workflow.confirm_signing(&secret()).await.is_err());

        let json = workflow.prepare_external_signing().unwrap();
        let request = ColdSigningRequest::from_json(&json).unwrap();
        assert_eq!(request.reduced_tx, vec![7, 7, 7]);
        assert_eq!(request.inputs, vec![vec![1, 2, 3]]);
        assert_eq!(request.sender.as_deref(), Some("9w1a0"));

        let mut prompted = false;
        while let Ok(event) = events.try_recv() {
            if event == WorkflowEvent::SigningPromptReady(json.clone()) {
                prompted = true;
            }
        }
        assert!(prompted);

        let response = ColdSigningResponse {
            signed_tx: vec![9; 400],
        };
        let presets = ChunkPresets {
            standard: 2900,
            low_res: 200,
        };
        let chunks = response_to_chunks(&response, &presets, QrResolution::LowRes).unwrap();
        assert!(chunks.len() > 1);

        assert!(!workflow.add_signed_chunk("CSR-not-this-one").await.unwrap());
        for chunk in &chunks {
            assert!(workflow.add_signed_chunk(chunk).await.unwrap());
        }
        assert_eq!(workflow.state(), ErgoPayState::Done);
        assert_eq!(
            harness.broadcaster.submitted.lock().unwrap().as_slice(),
            &[vec![9; 400]]
        );
    }
}

//! Air-gapped signing: scan a request, confirm, show the signed result

use std::fmt;
use std::sync::Arc;

use qr_transport::{ChunkPresets, ChunkTag, PageCollector, QrResolution, ReassembleError};
use serde::Serialize;
use tokio::sync::broadcast;
use wallet_core::{
    EventBus, SigningError, SigningSecret, TransactionPreview, TransactionPreviewer,
    TransactionSigner, TxOutcome, WalletInfo, WorkflowError, WorkflowEvent,
};

use crate::payload::{
    request_collector, request_from_collector, ColdSigningRequest, ColdSigningResponse,
    SigningResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColdSigningState {
    Scanning,
    WaitingToConfirm,
    PresentResult,
}

impl fmt::Display for ColdSigningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scanning => "SCANNING",
            Self::WaitingToConfirm => "WAITING_TO_CONFIRM",
            Self::PresentResult => "PRESENT_RESULT",
        };
        f.write_str(name)
    }
}

/// Progress of the current scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub pages_added: usize,
    pub pages_count: usize,
}

/// Signing workflow of the cold device.
///
/// One instance serves one request; dropping it discards everything scanned.
pub struct ColdSigningWorkflow {
    wallet: WalletInfo,
    signer: Arc<dyn TransactionSigner>,
    previewer: Arc<dyn TransactionPreviewer>,
    presets: ChunkPresets,
    resolution: QrResolution,
    state: ColdSigningState,
    collector: PageCollector,
    request: Option<ColdSigningRequest>,
    preview: Option<TransactionPreview>,
    last_error: Option<String>,
    response_json: Option<String>,
    result_chunks: Vec<String>,
    page: usize,
    events: EventBus<ColdSigningState>,
}

impl ColdSigningWorkflow {
    pub fn new(
        wallet: WalletInfo,
        signer: Arc<dyn TransactionSigner>,
        previewer: Arc<dyn TransactionPreviewer>,
        presets: ChunkPresets,
    ) -> Self {
        Self {
            wallet,
            signer,
            previewer,
            presets,
            resolution: QrResolution::Standard,
            state: ColdSigningState::Scanning,
            collector: request_collector(),
            request: None,
            preview: None,
            last_error: None,
            response_json: None,
            result_chunks: Vec::new(),
            page: 0,
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent<ColdSigningState>> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ColdSigningState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.events.is_busy()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn request(&self) -> Option<&ColdSigningRequest> {
        self.request.as_ref()
    }

    pub fn preview(&self) -> Option<&TransactionPreview> {
        self.preview.as_ref()
    }

    pub fn scan_progress(&self) -> ScanProgress {
        ScanProgress {
            pages_added: self.collector.pages_added(),
            pages_count: self.collector.pages_count(),
        }
    }

    pub fn resolution(&self) -> QrResolution {
        self.resolution
    }

    fn require(&self, expected: ColdSigningState, operation: &'static str) -> Result<(), WorkflowError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkflowError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    fn set_state(&mut self, state: ColdSigningState) {
        tracing::debug!(from = %self.state, to = %state, "cold signing state change");
        self.state = state;
        self.events.emit(WorkflowEvent::StateChanged(state));
    }

    fn fail_scan(&mut self, message: String) {
        tracing::warn!(error = %message, "Scanned signing request rejected");
        self.collector.reset();
        self.last_error = Some(message.clone());
        self.events.emit(WorkflowEvent::Error(message));
    }

    /// Feed one scanned string.
    ///
    /// Returns whether it was accepted as a request chunk. A complete but
    /// unreadable request keeps the workflow scanning with `last_error` set.
    pub async fn add_scanned_chunk(&mut self, raw: &str) -> Result<bool, WorkflowError> {
        self.require(ColdSigningState::Scanning, "add_scanned_chunk")?;

        if !self.collector.add_chunk(raw) {
            return Ok(false);
        }
        if !self.collector.has_all_pages() {
            return Ok(true);
        }

        let request = match request_from_collector(&self.collector) {
            Ok(request) => request,
            Err(ReassembleError::PagesMissing { .. }) => return Ok(true),
            Err(ReassembleError::Deserialize(e)) => {
                self.fail_scan(format!("Not a valid signing request: {}", e));
                return Ok(true);
            }
        };

        let preview = {
            let _guard = self.events.lock()?;
            self.previewer
                .preview(&request.reduced_tx, &request.inputs)
                .await
        };
        match preview {
            Ok(preview) => {
                tracing::info!(tx_id = %preview.tx_id, "Signing request scanned");
                self.last_error = None;
                self.request = Some(request);
                self.preview = Some(preview);
                self.set_state(ColdSigningState::WaitingToConfirm);
            }
            Err(e) => self.fail_scan(format!("Transaction could not be read: {}", e)),
        }
        Ok(true)
    }

    /// Sign the scanned request with keys of every wallet address.
    ///
    /// A signing failure leaves the request in place so the user can retry
    /// with another secret; it is returned as an unsuccessful result.
    pub async fn confirm_signing(
        &mut self,
        secret: &SigningSecret,
    ) -> Result<SigningResult, WorkflowError> {
        self.require(ColdSigningState::WaitingToConfirm, "confirm_signing")?;
        let reduced_tx = match &self.request {
            Some(request) => request.reduced_tx.clone(),
            None => {
                return Err(WorkflowError::InvalidState {
                    operation: "confirm_signing",
                    state: self.state.to_string(),
                })
            }
        };

        let signed = {
            let _guard = self.events.lock()?;
            self.signer
                .sign_reduced(&reduced_tx, secret, &self.wallet.derivation_indices())
                .await
        }
        .and_then(|signed_tx| {
            let response = ColdSigningResponse {
                signed_tx: signed_tx.clone(),
            };
            let json = response
                .to_json()
                .map_err(|e| SigningError::Failed(e.to_string()))?;
            Ok((signed_tx, json))
        });

        match signed {
            Ok((signed_tx, json)) => {
                self.result_chunks = self
                    .presets
                    .encode(ChunkTag::ColdSignedTx, &json, self.resolution);
                self.response_json = Some(json);
                self.page = 0;
                self.last_error = None;
                tracing::info!(
                    wallet = %self.wallet.name,
                    pages = self.result_chunks.len(),
                    "Transaction signed"
                );
                self.set_state(ColdSigningState::PresentResult);
                self.events.emit(WorkflowEvent::TxResult(TxOutcome::signed()));
                Ok(SigningResult::signed(signed_tx))
            }
            Err(e) => {
                tracing::warn!(error = %e, authentication = e.is_authentication(), "Signing failed");
                let message = e.to_string();
                self.last_error = Some(message.clone());
                self.events.emit(WorkflowEvent::Error(message.clone()));
                Ok(SigningResult::failed(message))
            }
        }
    }

    /// Switch QR density. While showing a result the chunks are re-encoded
    /// and display restarts at the first page.
    pub fn toggle_resolution(&mut self) {
        self.resolution = self.resolution.toggled();
        if let Some(json) = &self.response_json {
            self.result_chunks = self
                .presets
                .encode(ChunkTag::ColdSignedTx, json, self.resolution);
            self.page = 0;
        }
    }

    /// Whether the result is long enough for a resolution switch to matter
    pub fn offers_resolution_toggle(&self) -> bool {
        self.response_json
            .as_deref()
            .is_some_and(|json| self.presets.offers_toggle(json))
    }

    pub fn result_chunks(&self) -> &[String] {
        &self.result_chunks
    }

    pub fn current_page(&self) -> usize {
        self.page
    }

    pub fn current_chunk(&self) -> Option<&str> {
        self.result_chunks.get(self.page).map(String::as_str)
    }

    pub fn next_page(&mut self) {
        if self.page + 1 < self.result_chunks.len() {
            self.page += 1;
        }
    }

    pub fn previous_page(&mut self) {
        self.page = self.page.saturating_sub(1);
    }

    /// Leave the result screen and start over with an empty scan
    pub fn dismiss(&mut self) {
        self.collector.reset();
        self.request = None;
        self.preview = None;
        self.last_error = None;
        self.response_json = None;
        self.result_chunks.clear();
        self.page = 0;
        self.set_state(ColdSigningState::Scanning);
    }
}

use std::sync::Arc;

use anyhow::{bail, Result};
use ergo_node_client::{derive_wallet, MnemonicSigner, NodeBroadcaster, NodeClient};
use ergopay_core::{
    fetch_url, is_ergopay_request, is_static_request, parse_static_request, ErgoPayServices,
    ErgoPaySigningRequest, ErgoPayState, ErgoPayTransport, ErgoPayWorkflow, HttpTransport,
    MessageSeverity,
};
use wallet_core::{AppConfig, TransactionPreviewer};

pub fn describe_request(request: &ErgoPaySigningRequest) -> String {
    let mut out = Vec::new();
    if let Some(message) = &request.message {
        out.push(format!("Message ({:?}): {}", request.message_severity, message));
    }
    if let Some(address) = &request.p2pk_address {
        out.push(format!("Requested signer: {}", address));
    }
    if let Some(reply_to) = &request.reply_to_url {
        out.push(format!("Reply to: {}", reply_to));
    }
    match &request.reduced_tx {
        Some(tx) => out.push(format!("Reduced transaction: {} bytes", tx.len())),
        None => out.push("No transaction to sign".to_string()),
    }
    out.join("\n")
}

async fn describe(config: &AppConfig, uri: &str, address: Option<&str>) -> Result<()> {
    let request = if is_static_request(uri) {
        parse_static_request(uri)?
    } else {
        let url = fetch_url(uri, address)?;
        let body = HttpTransport::new(&config.ergopay)?.fetch(&url).await?;
        ErgoPaySigningRequest::from_json(&body)?
    };
    println!("{}", describe_request(&request));

    if let Some(reduced_tx) = &request.reduced_tx {
        let previewer = super::previewer(config).await;
        let preview = previewer.preview(reduced_tx, &[]).await?;
        println!("{}", super::describe_preview(&preview, None));
    }
    Ok(())
}

async fn sign_and_submit(config: &AppConfig, uri: &str) -> Result<()> {
    let secret = super::secret_from_env()?;
    let client = NodeClient::new(config.node.clone(), config.network).await?;
    let wallet = derive_wallet(0, "hot wallet", &secret, &[0], config.network)?;

    let services = ErgoPayServices {
        transport: Arc::new(HttpTransport::new(&config.ergopay)?),
        previewer: Arc::new(ergo_node_client::ErgoLibPreviewer::with_node(client.clone())),
        signer: Arc::new(MnemonicSigner::new()),
        broadcaster: Arc::new(NodeBroadcaster::new(client)),
    };
    let mut workflow = ErgoPayWorkflow::new(uri, vec![wallet.clone()], services);
    workflow.start(Some(wallet.id), Some(0)).await?;

    if workflow.state() == ErgoPayState::WaitForConfirmation {
        if let Some(preview) = workflow.preview() {
            eprintln!("{}", super::describe_preview(preview, Some(&wallet)));
        }
        workflow.confirm_signing(&secret).await?;
    }
    if let Some(reply) = workflow.take_reply_task() {
        let _ = reply.await;
    }

    let message = workflow.last_message().unwrap_or_default();
    match workflow.last_severity() {
        MessageSeverity::Error => bail!("{}", message),
        severity => println!("{:?}: {}", severity, message),
    }
    if let Some(tx_id) = workflow.tx_id() {
        println!("Submitted {}", tx_id);
    }
    Ok(())
}

pub async fn run(config: &AppConfig, uri: &str, address: Option<String>, sign: bool) -> Result<()> {
    if !is_ergopay_request(uri) {
        bail!("not an ErgoPay request: {}", uri);
    }
    if sign {
        sign_and_submit(config, uri).await
    } else {
        describe(config, uri, address.as_deref()).await
    }
}

use std::sync::Arc;

use anyhow::{anyhow, Result};
use babel_fee::{format_token_amount, BabelFeeFinder, BabelSwapData, HeldToken};
use ergo_node_client::{NodeBabelBoxSource, NodeClient};
use rand::rngs::StdRng;
use rand::SeedableRng;
use wallet_core::{AppConfig, TokenId};

pub fn describe_swap(swap: &BabelSwapData, decimals: u8) -> String {
    format!(
        "Pay {} of {} to babel box {} for {} nanoERG (price {} nanoERG per unit)",
        format_token_amount(swap.token_to_swap.amount, decimals),
        swap.token_to_swap.token_id.short(),
        swap.babel_box.box_id,
        swap.babel_amount_nano_erg,
        swap.price_per_token
    )
}

fn contract_template(config: &AppConfig) -> Result<&str> {
    config
        .babel_fee
        .contract_template
        .as_deref()
        .filter(|template| !template.trim().is_empty())
        .ok_or_else(|| {
            anyhow!(
                "babel_fee.contract_template is not configured: set `contract_template` in the \
                 [babel_fee] section of the config file to the babel contract ErgoTree hex, \
                 with {{tokenId}} in place of the token id"
            )
        })
}

pub async fn run(config: &AppConfig, token: &str, balance: u64, decimals: u8, fee: u64) -> Result<()> {
    let template = contract_template(config)?;
    let client = NodeClient::new(config.node.clone(), config.network).await?;
    let source = NodeBabelBoxSource::new(client, template);
    let finder = BabelFeeFinder::new(Arc::new(source), config.babel_fee.clone());

    let held = [HeldToken {
        token_id: TokenId::new(token),
        amount: balance,
        name: None,
        decimals,
    }];
    let mut rng = StdRng::from_entropy();
    let swap = finder.find_babel_box(&[], &held, fee, &mut rng).await?;
    println!("{}", describe_swap(&swap, decimals));
    Ok(())
}

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ergo_signer::init_tracing();
    ergo_signer::run(ergo_signer::Cli::parse()).await
}

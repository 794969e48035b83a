use anyhow::{bail, Context, Result};
use chargechain_core::{
    chain::validate_chain, constants::DEFAULT_DIFFICULTY, recorder::ChargeRequest, Block,
};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chargechain-cli")]
#[command(about = "CLI client for the chargechain node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:3000)
    #[arg(
        long,
        global = true,
        env = "CHARGECHAIN_NODE",
        default_value = "http://127.0.0.1:3000"
    )]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a charge and notify both numbers
    Charge {
        /// Payer's phone number
        #[arg(long)]
        from: String,
        /// Payee's phone number
        #[arg(long)]
        to: String,
        /// Amount in USD
        #[arg(long)]
        amount: f64,
        /// Extra JSON payload stored with the transaction
        #[arg(long, value_parser = parse_json)]
        bytes: Option<serde_json::Value>,
    },
    /// Print the node's chain
    Chain,
    /// Fetch the chain and check linkage and proof of work locally
    Verify {
        /// Difficulty the node mines at
        #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: u32,
    },
}

fn parse_json(s: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(s)
}

async fn fetch_chain(client: &reqwest::Client, node: &str) -> Result<Vec<Block>> {
    let res = client
        .get(format!("{node}/api/chain"))
        .send()
        .await
        .with_context(|| format!("could not reach {node}"))?
        .error_for_status()?;
    Ok(res.json().await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = reqwest::Client::new();
    match cli.cmd {
        Command::Charge {
            from,
            to,
            amount,
            bytes,
        } => {
            let charge = ChargeRequest {
                bytes,
                ..ChargeRequest::new(&from, &to, amount)
            };
            debug!(?charge, "submitting charge");
            let res = client
                .post(format!("{node}/api/charge-and-notify"))
                .json(&charge)
                .send()
                .await
                .with_context(|| format!("could not reach {node}"))?;
            let status = res.status();
            let body = res.text().await?;
            println!("status: {}", status);
            println!("{body}");
        }
        Command::Chain => {
            let blocks = fetch_chain(&client, node).await?;
            println!("{}", serde_json::to_string_pretty(&blocks)?);
        }
        Command::Verify { difficulty } => {
            let blocks = fetch_chain(&client, node).await?;
            if let Err(fault) = validate_chain(&blocks, difficulty) {
                bail!("chain is invalid: {fault}");
            }
            println!("chain ok: {} blocks at difficulty {difficulty}", blocks.len());
        }
    }
    Ok(())
}

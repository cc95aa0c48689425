use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use tracing_subscriber::EnvFilter;

use paydist::{AlloyLedger, DeploymentConfig, EligibilityChecker, ExecutionMode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = DeploymentConfig::from_env()?;

    let payer: Address = match std::env::var("PAYDIST_PAYER") {
        Ok(v) => v.trim().parse()?,
        Err(_) => {
            eprintln!("ERROR: PAYDIST_PAYER is required (the address to check).");
            std::process::exit(1);
        }
    };

    let rpc_url = std::env::var("PAYDIST_RPC_URL")
        .ok()
        .or_else(|| config.network.rpc_urls.first().cloned())
        .ok_or("no RPC URL configured")?;

    println!("Checking payment eligibility...");
    println!("  Network:  {} ({})", config.network.chain_name, config.network.chain_id);
    println!("  Token:    {} ({})", config.token, config.token_symbol);
    println!("  Mode:     {:?}", config.mode());
    if let Some(spender) = config.route.spender() {
        println!("  Spender:  {spender}");
    }
    println!("  Payer:    {payer}");
    println!("  Required: {} {}", config.required_total, config.token_symbol);

    let provider = ProviderBuilder::new().connect_http(rpc_url.parse()?);
    let ledger = AlloyLedger::new(provider);

    let checker = EligibilityChecker::new(config.token, config.route.spender());
    let snapshot = checker
        .check(&ledger, payer, &config.required_total)
        .await?;

    println!("\nBalance:   {} {}", snapshot.current_balance(), config.token_symbol);
    match snapshot.current_allowance() {
        Some(a) => println!("Allowance: {a} {}", config.token_symbol),
        None => println!("Allowance: not required"),
    }

    match snapshot.unmet(&config.token_symbol) {
        None => println!("\nEligible: payment can be executed."),
        Some(e) => {
            println!("\nNot eligible: {e}");
            if config.mode() == ExecutionMode::SmartContract && snapshot.has_balance {
                println!("Approve the distributor for {} {} first.", config.required_total, config.token_symbol);
            }
        }
    }

    println!("\nRecipients:");
    for d in &config.distributions {
        println!(
            "  {:<12} {} {} ({})  {}",
            d.label,
            d.amount,
            config.token_symbol,
            d.percentage,
            config.network.address_url(&d.recipient)
        );
    }

    Ok(())
}

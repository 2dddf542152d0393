//! Reconstruct and sign a transaction proposal offline.
//!
//! Usage: sign-proposal <wallet_seed> <proposal.json>
//!
//! Reads a proposal document from a JSON file, rebuilds the spend
//! transaction, and prints the raw transaction hex plus this copayer's
//! per-input signatures. Nothing touches the network.

use copay_client::proposal::{ProposalTransactionBuilder, TransactionProposal};
use copay_client::wallet::WalletCredentials;

fn main() {
    env_logger::init();

    let platform_seed =
        std::env::var("PLATFORM_WALLET_SEED").unwrap_or_else(|_| "TESTPLATFORMSEED".to_string());

    let mut args = std::env::args().skip(1);
    let (wallet_seed, proposal_path) = match (args.next(), args.next()) {
        (Some(seed), Some(path)) => (seed, path),
        _ => {
            eprintln!("Usage: sign-proposal <wallet_seed> <proposal.json>");
            std::process::exit(1);
        }
    };

    if let Err(error) = run(&platform_seed, &wallet_seed, &proposal_path) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}

fn run(
    platform_seed: &str,
    wallet_seed: &str,
    proposal_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = WalletCredentials::from_seeds(platform_seed, wallet_seed)?;

    let proposal_json = std::fs::read_to_string(proposal_path)?;
    let proposal: TransactionProposal = serde_json::from_str(&proposal_json)?;

    let builder = ProposalTransactionBuilder::new();
    let transaction = builder.build_transaction(&proposal, true)?;
    println!(
        "unsigned tx: {}",
        bitcoin::consensus::encode::serialize_hex(&transaction)
    );

    let signatures = builder.build_signatures(credentials.address_xpriv()?, &proposal)?;
    for (index, signature) in signatures.iter().enumerate() {
        println!("input {}: {}", index, hex::encode(signature));
    }
    Ok(())
}

//! Derive and print a wallet's credential set.
//!
//! Usage: wallet-show-keys <wallet_seed>
//!
//! The platform seed comes from the PLATFORM_WALLET_SEED environment
//! variable (a test default is used when unset).

use copay_client::wallet::WalletCredentials;

fn main() {
    env_logger::init();

    let platform_seed =
        std::env::var("PLATFORM_WALLET_SEED").unwrap_or_else(|_| "TESTPLATFORMSEED".to_string());

    let wallet_seed = match std::env::args().nth(1) {
        Some(seed) => seed,
        None => {
            eprintln!("Usage: wallet-show-keys <wallet_seed>");
            std::process::exit(1);
        }
    };

    let credentials = match WalletCredentials::from_seeds(&platform_seed, &wallet_seed) {
        Ok(credentials) => credentials,
        Err(error) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    };

    match credentials.export() {
        Ok(export) => {
            println!("{}", serde_json::to_string_pretty(&export).unwrap());
        }
        Err(error) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    }
}

//! Prints the authentication headers for a request, for debugging integrations.

use anyhow::{Context, Result};
use clap::Args;
use risk_guard_lnmarkets::{signing_payload, LnMarketsSigner, API_PREFIX};
use secrecy::SecretString;

#[derive(Args, Debug)]
pub struct SignArgs {
    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// Request path without the version prefix, e.g. `/futures`
    #[arg(short, long)]
    pub path: String,

    /// Encoded query string without the leading `?`
    #[arg(short, long, default_value = "")]
    pub query: String,

    /// JSON body exactly as sent
    #[arg(short, long, default_value = "")]
    pub body: String,

    /// Millisecond timestamp (defaults to now)
    #[arg(long)]
    pub timestamp: Option<u128>,

    #[arg(long, env = "LNM_API_KEY")]
    pub api_key: String,

    #[arg(long, env = "LNM_API_SECRET", hide_env_values = true)]
    pub api_secret: String,

    #[arg(long, env = "LNM_API_PASSPHRASE", hide_env_values = true)]
    pub passphrase: String,
}

/// Renders the signed payload and headers. The passphrase is never printed.
///
/// # Errors
/// Returns an error if the key material is empty or signing fails.
pub fn render(args: &SignArgs) -> Result<String> {
    let signer = LnMarketsSigner::new(
        args.api_key.clone(),
        SecretString::from(args.api_secret.clone()),
        SecretString::from(args.passphrase.clone()),
    )
    .context("invalid key material")?;

    let path = format!("{API_PREFIX}{}", args.path);
    let headers = match args.timestamp {
        Some(ts) => signer.sign_with_timestamp(&args.method, &path, &args.query, &args.body, ts),
        None => signer.sign(&args.method, &path, &args.query, &args.body),
    }
    .context("signing failed")?;

    let payload = signing_payload(&headers.timestamp, &args.method, &path, &args.query, &args.body);
    let mut out = format!("payload: {payload}\n");
    for (name, value) in headers.as_tuples() {
        let value = if name == risk_guard_lnmarkets::auth::HEADER_PASSPHRASE {
            "[REDACTED]"
        } else {
            value
        };
        out.push_str(&format!("{name}: {value}\n"));
    }
    Ok(out)
}

pub fn run_sign(args: SignArgs) -> Result<()> {
    print!("{}", render(&args)?);
    Ok(())
}

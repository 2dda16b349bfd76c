// SPDX-FileCopyrightText: 2026 Quire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quire verify`: receiver-side signature check.
//!
//! Reads the raw request body from a file or stdin and checks the
//! `X-Webhook-Signature` header value against one key source: a key file,
//! the production key derived for a subscription from the configured master
//! key, or the out-of-band key used by test probes.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgGroup, Args};
use quire_config::model::QuireConfig;
use quire_core::{QuireError, SubscriptionId};
use quire_security::{KeyDeriver, TestKey, verify};
use secrecy::SecretString;

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("key").required(true).args(["key_file", "subscription", "test"])))]
pub struct VerifyArgs {
    /// Value of the X-Webhook-Signature header (`t=<ts>,v1=<hex>`).
    #[arg(long, short = 's')]
    pub signature: String,

    /// File holding the raw request body. Reads stdin when omitted or `-`.
    #[arg(long, short = 'b')]
    pub body: Option<PathBuf>,

    /// File holding the signing key.
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Derive the signing key for this subscription from the configured
    /// master key.
    #[arg(long)]
    pub subscription: Option<String>,

    /// Use the test-probe key for this subscription.
    #[arg(long)]
    pub test: Option<String>,

    /// Maximum clock skew in seconds. Defaults to
    /// `webhooks.signature_tolerance_secs`.
    #[arg(long)]
    pub tolerance: Option<u64>,
}

/// Runs the `quire verify` command. Exit code 0 means the signature is valid.
pub fn run_verify(config: &QuireConfig, args: VerifyArgs) -> ExitCode {
    match check(config, &args) {
        Ok(true) => {
            println!("signature valid");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("signature invalid");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn check(config: &QuireConfig, args: &VerifyArgs) -> Result<bool, QuireError> {
    let body = read_body(args.body.as_deref())?;
    let key = resolve_key(config, args)?;
    let tolerance = args
        .tolerance
        .unwrap_or(config.webhooks.signature_tolerance_secs);
    Ok(verify(&body, args.signature.trim(), &key, tolerance))
}

fn read_body(path: Option<&Path>) -> Result<String, QuireError> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path).map_err(|e| {
            QuireError::Validation(format!("cannot read body from {}: {e}", path.display()))
        }),
        _ => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .map_err(|e| QuireError::Validation(format!("cannot read body from stdin: {e}")))?;
            Ok(body)
        }
    }
}

fn resolve_key(config: &QuireConfig, args: &VerifyArgs) -> Result<Vec<u8>, QuireError> {
    if let Some(path) = &args.key_file {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            QuireError::Validation(format!("cannot read key from {}: {e}", path.display()))
        })?;
        let key = raw.trim_end_matches(['\r', '\n']);
        if key.is_empty() {
            return Err(QuireError::Validation(format!(
                "key file {} is empty",
                path.display()
            )));
        }
        return Ok(key.as_bytes().to_vec());
    }

    if let Some(id) = &args.subscription {
        let master = config.webhooks.signing_master_key.clone().ok_or_else(|| {
            QuireError::Config(
                "webhooks.signing_master_key is required to derive subscription keys".into(),
            )
        })?;
        let deriver = KeyDeriver::new(&SecretString::from(master))?;
        let key = deriver.derive(&SubscriptionId::from(id.as_str()));
        return Ok(key.as_bytes().to_vec());
    }

    if let Some(id) = &args.test {
        return Ok(TestKey::for_subscription(&SubscriptionId::from(id.as_str()))
            .as_bytes()
            .to_vec());
    }

    Err(QuireError::Validation(
        "one of --key-file, --subscription or --test is required".into(),
    ))
}

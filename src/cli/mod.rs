//! Command-line interface for Storelink
//!
//! `serve` runs the HTTP server; `credentials` inspects and maintains the
//! credential store offline; `sign` computes webhook signatures for testing.

use crate::auth::{HttpOAuthProvider, RefreshCoordinator};
use crate::config::Config;
use crate::model::Credential;
use crate::storage::create_storage_from_config;
use crate::{Result, StorelinkError};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::sync::Arc;

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(crate::constants::CONFIG_FILE_NAME);
    let config = Config::load_from_path(config_path)?;

    crate::init_logging(config.log_filter());

    match matches.subcommand() {
        Some(("serve", sub)) => handle_serve_command(sub, config).await,
        Some(("credentials", sub)) => handle_credentials_command(sub, &config).await,
        Some(("sign", sub)) => handle_sign_command(sub, &config),
        _ => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Build the command tree
pub fn build_cli() -> Command {
    Command::new("storelink")
        .about("Storelink - OAuth token lifecycle and webhook trust")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .env("STORELINK_CONFIG")
                .help("Path to the configuration file (JSON or YAML)"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP server")
                .arg(Arg::new("host").long("host").help("Override http.host"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(clap::value_parser!(u16))
                        .help("Override http.port"),
                ),
        )
        .subcommand(
            Command::new("credentials")
                .about("Inspect and maintain stored credentials")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .about("List live credentials")
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("revoke")
                        .about("Soft-delete a credential")
                        .arg(Arg::new("authorized-app-id").required(true).index(1)),
                )
                .subcommand(
                    Command::new("refresh")
                        .about("Refresh a credential's token now")
                        .arg(Arg::new("authorized-app-id").required(true).index(1)),
                ),
        )
        .subcommand(
            Command::new("sign")
                .about("Compute the HMAC-SHA256 signature of a payload")
                .arg(
                    Arg::new("secret")
                        .long("secret")
                        .env("STORELINK_CLIENT_SECRET")
                        .help("Signing secret (defaults to oauth.clientSecret)"),
                )
                .arg(Arg::new("payload").required(true).index(1)),
        )
}

fn required_arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| StorelinkError::validation(format!("{} is required", name)))
}

async fn handle_serve_command(matches: &ArgMatches, mut config: Config) -> Result<()> {
    if let Some(host) = matches.get_one::<String>("host") {
        config.http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.http.port = *port;
    }

    println!(
        "Starting Storelink server on {}:{}",
        config.http.host, config.http.port
    );
    println!("   Press Ctrl+C to stop\n");

    crate::http::start_server(config).await
}

async fn handle_credentials_command(matches: &ArgMatches, config: &Config) -> Result<()> {
    let Some((name, sub)) = matches.subcommand() else {
        return Err(StorelinkError::validation(
            "credentials needs a subcommand (list, revoke or refresh)",
        ));
    };
    config.validate_storage()?;
    let store = create_storage_from_config(&config.storage).await?;

    let result = match (name, sub) {
        ("list", sub) => {
            let credentials = store.list().await?;
            if sub.get_flag("json") {
                let redacted: Vec<_> = credentials.iter().map(redacted_json).collect();
                println!("{}", serde_json::to_string_pretty(&redacted)?);
            } else {
                print!("{}", format_credentials(&credentials));
            }
            Ok(())
        }
        ("revoke", sub) => {
            let id = required_arg(sub, "authorized-app-id")?;
            store.soft_delete(id).await?;
            println!("Credential '{}' revoked", id);
            Ok(())
        }
        ("refresh", sub) => {
            let id = required_arg(sub, "authorized-app-id")?;
            let provider = Arc::new(HttpOAuthProvider::new(&config.oauth, &config.http)?);
            let coordinator = RefreshCoordinator::new(store.clone(), provider);
            let credential = coordinator.refresh_now(id).await?;
            println!(
                "Credential '{}' refreshed, expires {}",
                credential.authorized_app_id,
                credential.expire_date.to_rfc3339()
            );
            Ok(())
        }
        (other, _) => Err(StorelinkError::validation(format!(
            "unknown credentials subcommand: {}",
            other
        ))),
    };

    store.close().await?;
    result
}

fn handle_sign_command(matches: &ArgMatches, config: &Config) -> Result<()> {
    let secret = matches
        .get_one::<String>("secret")
        .cloned()
        .unwrap_or_else(|| config.oauth.client_secret.clone());
    if secret.is_empty() {
        return Err(StorelinkError::validation(
            "no signing secret: pass --secret or set oauth.clientSecret",
        ));
    }

    let payload = required_arg(matches, "payload")?;
    println!("{}", crate::auth::sign(payload.as_bytes(), &secret));
    Ok(())
}

/// Credential as JSON with token values removed
fn redacted_json(credential: &Credential) -> serde_json::Value {
    serde_json::json!({
        "authorizedAppId": credential.authorized_app_id,
        "merchantId": credential.merchant_id,
        "scope": credential.scope,
        "expireDate": credential.expire_date.to_rfc3339(),
        "salesChannelId": credential.sales_channel_id,
        "createdAt": credential.created_at.to_rfc3339(),
    })
}

/// One line per credential for terminal output
fn format_credentials(credentials: &[Credential]) -> String {
    if credentials.is_empty() {
        return "No credentials stored\n".to_string();
    }

    let mut out = String::from("\nCredentials:\n");
    for credential in credentials {
        let status = if credential.is_expired() {
            "expired"
        } else {
            "fresh"
        };
        out.push_str(&format!(
            "  {} (merchant {}, {} until {})\n",
            credential.authorized_app_id,
            credential.merchant_id,
            status,
            credential.expire_date.to_rfc3339()
        ));
    }
    out
}

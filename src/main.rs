// src/main.rs

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use myp_license::config::{IssuerConfig, LoggingConfig};
use myp_license::encryption::StoreKey;
use myp_license::errors::{LicenseError, LicenseResult};
use myp_license::hardware::resolve_machine_identity;
use myp_license::issue::{IssuedLicense, Issuer, LicenseRequest};
use myp_license::license_key::parse_scheme;
use myp_license::prompt::{complete_request, split_features};
use myp_license::remote::fetch_remote_seed_blocking;

/// License generator for the MYP desktop application.
///
/// Fields not given on the command line are asked for interactively.
#[derive(Parser, Debug)]
#[command(name = "license_generator", version, about)]
struct Cli {
    /// Machine ID of the target computer (aa:bb:cc:dd:ee:ff)
    machine_id: Option<String>,

    /// Name of the customer
    customer_name: Option<String>,

    /// Expiry date in YYYY-MM-DD format (default: one year from now)
    #[arg(long)]
    expiry: Option<String>,

    /// Comma-separated list of features
    #[arg(long)]
    features: Option<String>,

    /// License the machine this command runs on. A single positional
    /// argument is then taken as the customer name.
    #[arg(long)]
    current_machine: bool,

    /// License store to merge into
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Key scheme: deterministic or randomized
    #[arg(long)]
    scheme: Option<String>,

    /// Write the store unencrypted even if a key is configured
    #[arg(long)]
    no_encrypt: bool,

    /// Published store used to seed the merge
    #[arg(long)]
    remote_url: Option<String>,

    /// Config file (default: license_generator.toml)
    #[arg(long, env = "MYP_LICENSE_CONFIG")]
    config: Option<PathBuf>,

    /// Print a new random store key and exit
    #[arg(long)]
    generate_key: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Key generation must work even when the config file is broken.
    if cli.generate_key {
        return match StoreKey::generate() {
            Ok(key) => {
                println!("{}", key.to_base64());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let config = match IssuerConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("License generation failed: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let env = env_logger::Env::default().default_filter_or(logging.filter());
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

fn run(cli: Cli, mut config: IssuerConfig) -> LicenseResult<()> {
    if let Some(path) = &cli.output {
        config.store.path = path.clone();
    }
    if let Some(scheme) = &cli.scheme {
        config.license.key_scheme = parse_scheme(scheme)?.to_string();
    }
    if let Some(url) = &cli.remote_url {
        config.store.remote_url = url.clone();
    }

    let mut issuer = Issuer::from_config(&config)?;
    if cli.no_encrypt {
        issuer = issuer.with_key(None);
    }

    let request = gather_request(&cli)?;

    if let Some(url) = config.store.remote_url() {
        let seed = fetch_remote_seed_blocking(url, issuer.key(), config.store.remote_timeout());
        issuer = issuer.with_seed(seed);
    }

    let issued = issuer.issue(&request)?;
    print_summary(&issued, issuer.key().is_some());
    Ok(())
}

/// Build the request from arguments, prompting for anything missing.
fn gather_request(cli: &Cli) -> LicenseResult<LicenseRequest> {
    let (machine_arg, customer_arg) = positional_fields(cli)?;

    let current = if cli.current_machine || machine_arg.is_none() {
        match resolve_machine_identity() {
            Ok(identity) => Some(identity.to_string()),
            Err(e) => {
                log::warn!("{e}; enter the machine ID manually");
                None
            }
        }
    } else {
        None
    };

    let machine_id = match (cli.current_machine, machine_arg, &current) {
        (true, _, Some(current)) => current.clone(),
        (_, Some(given), _) => given,
        _ => String::new(),
    };

    let partial = LicenseRequest {
        machine_id,
        customer_name: customer_arg.unwrap_or_default(),
        expiry: cli.expiry.clone(),
        features: cli.features.as_deref().map(split_features).unwrap_or_default(),
    };

    // Both required fields on the command line: no prompting, defaults apply.
    if !partial.machine_id.trim().is_empty() && !partial.customer_name.trim().is_empty() {
        return Ok(partial);
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    complete_request(partial, current.as_deref(), &mut input, &mut output)
}

/// Map positional arguments to `(machine_id, customer_name)`.
///
/// With `--current-machine` the only accepted positional is the customer name.
fn positional_fields(cli: &Cli) -> LicenseResult<(Option<String>, Option<String>)> {
    if !cli.current_machine {
        return Ok((cli.machine_id.clone(), cli.customer_name.clone()));
    }
    if cli.customer_name.is_some() {
        return Err(LicenseError::ConfigError(
            "--current-machine takes only a customer name; drop the machine ID or the flag"
                .to_string(),
        ));
    }
    Ok((None, cli.machine_id.clone()))
}

fn print_summary(issued: &IssuedLicense, encrypted: bool) {
    let record = &issued.record;
    let persisted = &issued.persisted;

    println!("License generated for {}", record.customer_name);
    println!("License Key: {}", record.license_key);
    println!("Expiry Date: {}", record.expiry_date);
    println!("Machine ID: {}", record.machine_id);
    println!("Features: {}", record.features.join(", "));
    println!(
        "Saved to {} ({} license(s){})",
        persisted.path.display(),
        persisted.records,
        if encrypted { ", encrypted" } else { "" }
    );
    if persisted.used_fallback {
        println!("Note: the requested location could not be written; used the fallback path.");
    }
    if persisted.replaced {
        println!("Note: an existing license with this key was overwritten.");
    }
    if let Some(summary) = &persisted.summary_path {
        println!("Customer summary: {}", summary.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("license_generator").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn positionals_map_to_machine_and_customer() {
        let cli = parse(&["aa:bb:cc:dd:ee:ff", "Acme Corp"]);
        let (machine, customer) = positional_fields(&cli).unwrap();
        assert_eq!(machine.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(customer.as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn current_machine_takes_single_positional_as_customer() {
        let cli = parse(&["--current-machine", "Acme Corp"]);
        let (machine, customer) = positional_fields(&cli).unwrap();
        assert!(machine.is_none());
        assert_eq!(customer.as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn current_machine_with_explicit_machine_id_is_rejected() {
        let cli = parse(&["--current-machine", "aa:bb:cc:dd:ee:ff", "Acme Corp"]);
        match positional_fields(&cli) {
            Err(LicenseError::ConfigError(msg)) => assert!(msg.contains("--current-machine")),
            other => panic!("Expected ConfigError, got: {:?}", other),
        }
    }

    #[test]
    fn generate_key_parses_without_other_arguments() {
        let cli = parse(&["--generate-key"]);
        assert!(cli.generate_key);
        assert!(cli.machine_id.is_none());
    }
}

//! adctl - idempotent Active Directory provisioning from the command line.
//!
//! Connection settings come from `LDAP_*` environment variables, optionally loaded from a
//! `.env` file in the working directory.

use adctl_ldap::{DirectoryClient, DirectoryConfig, LdapEntry};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "adctl")]
#[command(version)]
#[command(about = "Idempotent Active Directory provisioning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ADCTL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Print the first entry below the search base matching a filter, as JSON
    Search {
        /// LDAP filter, e.g. "(sAMAccountName=jdoe)"
        filter: String,

        /// Attributes to return (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        attributes: Vec<String>,
    },

    /// Replace attribute values of an entry
    Modify {
        /// Distinguished name of the entry
        dn: String,

        /// Attribute assignment, repeatable
        #[arg(long = "set", value_name = "ATTRIBUTE=VALUE", value_parser = parse_assignment)]
        changes: Vec<(String, String)>,
    },

    /// Create an organizational unit under LDAP_OU_BASE
    CreateOu {
        /// OU name
        name: String,
    },

    /// Print the DN an organizational unit has under LDAP_OU_BASE
    GetOu {
        /// OU name
        name: String,
    },

    /// Create a global security group
    CreateGroup {
        /// Group name (cn and sAMAccountName)
        name: String,

        /// DN of the containing OU
        #[arg(long)]
        ou: String,
    },

    /// Add a user to a group
    AddMember {
        /// User DN
        user: String,
        /// Group DN
        group: String,
    },

    /// Remove a user from a group
    RemoveMember {
        /// User DN
        user: String,
        /// Group DN
        group: String,
    },
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    let config = DirectoryConfig::from_env().context("failed to load directory configuration")?;

    match run(cli.command, config) {
        Ok(Output::Entry(entry)) => println!("{}", serde_json::to_string_pretty(&entry)?),
        Ok(Output::Line(line)) => println!("{line}"),
        Ok(Output::Nothing) => {}
        Err(err) => {
            if err.should_log() {
                error!(code = err.error_code(), result_code = ?err.result_code(), "{err}");
            } else {
                warn!(code = err.error_code(), result_code = ?err.result_code(), "{err}");
            }
            return Err(err.into());
        }
    }
    Ok(())
}

/// What a command prints on success.
enum Output {
    Entry(LdapEntry),
    Line(String),
    Nothing,
}

fn run(command: Commands, config: DirectoryConfig) -> adctl_core::Result<Output> {
    // Pure composition, no connection needed.
    if let Commands::GetOu { name } = &command {
        return Ok(Output::Line(config.ou_dn(name).to_string()));
    }

    let mut client = DirectoryClient::connect(config)?;
    let result = execute(&mut client, command);
    client.close();
    result
}

fn execute(client: &mut DirectoryClient, command: Commands) -> adctl_core::Result<Output> {
    let output = match command {
        Commands::Search { filter, attributes } => {
            let attributes = attributes.iter().map(String::as_str).collect::<Vec<_>>();
            match client.find_entry(&filter, &attributes)? {
                Some(entry) => Output::Entry(entry),
                None => {
                    info!(filter = %filter, "no entry matched");
                    Output::Nothing
                }
            }
        }
        Commands::Modify { dn, changes } => {
            client.modify(&dn, changes)?;
            Output::Line(dn)
        }
        Commands::CreateOu { name } => Output::Line(client.create_ou(&name)?),
        Commands::GetOu { name } => Output::Line(client.get_ou(&name)),
        Commands::CreateGroup { name, ou } => Output::Line(client.create_group(&name, &ou)?),
        Commands::AddMember { user, group } => {
            client.user_group_add(&user, &group)?;
            Output::Nothing
        }
        Commands::RemoveMember { user, group } => {
            client.user_group_remove(&user, &group)?;
            Output::Nothing
        }
    };
    Ok(output)
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (attribute, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ATTRIBUTE=VALUE, got `{raw}`"))?;
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(format!("missing attribute name in `{raw}`"));
    }
    Ok((attribute.to_string(), value.to_string()))
}

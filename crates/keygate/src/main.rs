use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keygate::MemorySessionStore;
use keygate::client::AuthOrchestrator;
use keygate::oauth::{
    AccessToken, ClaimsDecoder, PermissionEvaluator, ProviderConfig, RoleEvaluator, Roles,
};
use miette::IntoDiagnostic;

#[derive(Parser, Debug)]
#[command(author, version, about = "Keygate - Keycloak OAuth2/OIDC client demo")]
struct Args {
    /// Provider configuration (JSON)
    #[arg(short, long, global = true, default_value = "keycloak.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh authorization URL
    LoginUrl,
    /// Decode an access token offline and check roles against it
    Inspect {
        /// Compact access token
        token: String,
        /// Role to check (repeatable)
        #[arg(short, long)]
        role: Vec<String>,
        /// Client whose roles to check; defaults to the configured client
        #[arg(long)]
        resource: Option<String>,
    },
    /// Fetch the RPT for a token and list its permissions
    Permissions {
        /// Compact access token
        token: String,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ProviderConfig::from_json_file(&args.config)?;

    match args.command {
        Command::LoginUrl => {
            let auth = AuthOrchestrator::new(
                reqwest::Client::new(),
                config,
                MemorySessionStore::default(),
            )?;
            println!("{}", auth.login_url().await?);
        }
        Command::Inspect {
            token,
            role,
            resource,
        } => {
            let decoder = ClaimsDecoder::from_config(&config)?;
            let token = AccessToken::from_bearer(token, &decoder);
            let claims = token.claims(&decoder)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&claims).into_diagnostic()?
            );
            match token.expires_at {
                Some(at) if token.is_expired() => println!("\ntoken expired at {at}"),
                Some(at) => println!("\ntoken expires at {at}"),
                None => println!("\ntoken has no readable expiry"),
            }

            let roles = RoleEvaluator::new(&config, &decoder);
            let client = resource.as_deref().unwrap_or(config.client_id.as_str());
            for name in &role {
                let realm = roles.has_realm_role(&token, Roles::from(name.as_str()))?;
                let on_client =
                    roles.has_resource_role(&token, Roles::from(name.as_str()), Some(client))?;
                println!("{name}: realm={realm} {client}={on_client}");
            }
        }
        Command::Permissions { token } => {
            let decoder = ClaimsDecoder::from_config(&config)?;
            let client = reqwest::Client::new();
            let permissions = PermissionEvaluator::new(&client, &config, &decoder)
                .load_permissions(&AccessToken::from_bearer(token, &decoder))
                .await?;

            println!("{} permissions:", permissions.len());
            for permission in &permissions {
                let scopes: Vec<&str> = permission.scopes.iter().map(|s| s.as_str()).collect();
                println!(
                    "  {} ({}): {}",
                    permission.resource_name,
                    permission.resource_id,
                    scopes.join(", ")
                );
            }
        }
    }

    Ok(())
}

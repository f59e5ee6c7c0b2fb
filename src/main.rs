//! CLI entry point for b2c-users — an Azure AD B2C user directory client.
//!
//! Authenticates via OAuth2 (client credentials by default, device code
//! with `--device-code`), then dispatches to the appropriate directory
//! operation based on CLI flags (`-s` for search, `-l` for list, etc.).
//! Results are printed as pretty JSON.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (auth failure, API error, missing semantic args)
//! - 2: argument validation error (clap handles this automatically)

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use b2c_users::auth::{AccessToken, Credentials, TerminalPrompt, TokenProvider};
use b2c_users::client::GraphClient;
use b2c_users::error::{GraphError, Result};
use b2c_users::users::{B2cUsers, NewUser, UserRecord};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Azure AD application (client) ID.
    #[arg(long)]
    app_id: String,

    /// Azure AD tenant ID (UUID).
    #[arg(long)]
    tenant_id: String,

    /// Azure/Entra tenant name, e.g. mytenant.onmicrosoft.com.
    #[arg(long)]
    tenant_name: String,

    /// Client secret for the client-credentials grant. Prefer setting via
    /// the B2C_CLIENT_SECRET environment variable to avoid exposing the
    /// secret in process listings and shell history.
    #[arg(long, env = "B2C_CLIENT_SECRET")]
    secret: Option<String>,

    /// Sign in interactively via the OAuth2 device-code flow instead of
    /// using a client secret.
    #[arg(long)]
    device_code: bool,

    /// Scopes for device-code sign-in, comma separated. Include openid and
    /// profile if an ID token is needed.
    #[arg(long, value_delimiter = ',')]
    scopes: Vec<String>,

    /// Graph API base URL. Only change this for the beta endpoint.
    #[arg(long, default_value = "https://graph.microsoft.com/v1.0")]
    api_url: String,

    /// Email address (required for -s and -c).
    #[arg(long)]
    email: Option<String>,

    /// User object id (required for -p, -u, -d, -w).
    #[arg(long)]
    user_id: Option<String>,

    /// Maximum accounts to fetch with -l; 0 pages through everything.
    #[arg(long, default_value_t = 0)]
    max: u32,

    /// Extra attributes to include with -l, comma separated, by display
    /// name (e.g. "city,loyaltynumber").
    #[arg(long, value_delimiter = ',')]
    attributes: Vec<String>,

    /// Password (required for -c and -w).
    #[arg(long)]
    password: Option<String>,

    /// JSON object of user fields keyed by display name (used by -c,
    /// required for -u). Example: '{"givenName":"Ada","city":"Utrecht"}'.
    #[arg(long)]
    fields: Option<String>,

    /// Display name for -c. Defaults to "<givenName> <surname>".
    #[arg(long)]
    display_name: Option<String>,

    #[command(flatten)]
    actions: ActionFlags,
}

/// Action flags — exactly one must be set per invocation.
///
/// Clap enforces this at parse time via the `group` attribute:
/// - If none are set, clap prints an error and exits with code 2.
/// - If more than one is set, clap prints an error and exits with code 2.
#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct ActionFlags {
    /// Search users by sign-in email address.
    #[arg(short)]
    search: bool,

    /// List customer (LocalAccount) users.
    #[arg(short)]
    list: bool,

    /// Fetch one user's full profile.
    #[arg(short)]
    profile: bool,

    /// Create a user. Requires --email and --password.
    #[arg(short)]
    create: bool,

    /// Update a user. Requires --user-id and --fields.
    #[arg(short)]
    update: bool,

    /// Delete a user. Requires --user-id.
    #[arg(short)]
    delete: bool,

    /// Reset a user's password. Requires --user-id and --password.
    #[arg(short = 'w')]
    password_reset: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
}

/// Acquires a token in the mode selected by the CLI flags.
async fn acquire_token(args: &Cli) -> Result<AccessToken> {
    if args.device_code {
        let scopes: Vec<&str> = args.scopes.iter().map(String::as_str).collect();
        let credentials = Credentials::delegated(&args.app_id, &args.tenant_id, &scopes);
        TokenProvider::new(credentials).device_code(&TerminalPrompt).await
    } else {
        let secret = args.secret.as_deref().ok_or_else(|| GraphError::Auth {
            message: "--secret (or B2C_CLIENT_SECRET) is required unless --device-code is set"
                .to_string(),
            source: None,
        })?;
        let credentials = Credentials::application(&args.app_id, &args.tenant_id, secret);
        TokenProvider::new(credentials).client_credentials().await
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("failed to serialize output")
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Cli::parse();

    let token = match acquire_token(&args).await {
        Ok(token) => token,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = GraphClient::with_base_url(token, &args.api_url);
    let users = match B2cUsers::connect(client, &args.tenant_name).await {
        Ok(users) => users,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Dispatch on the selected action flag. Per-action required args
    // (--email, --user-id, ...) are semantic requirements that clap can't
    // enforce via groups because the flags are shared across action types,
    // so they are validated here at runtime.
    let outcome: Result<()> = if args.actions.search {
        let Some(email) = args.email.as_deref() else {
            eprintln!("Error: --email is required when using -s (search)");
            return ExitCode::FAILURE;
        };
        users.search(email).await.map(|hits| print_json(&hits))
    } else if args.actions.list {
        let extra: Vec<&str> = args.attributes.iter().map(String::as_str).collect();
        users
            .list(args.max, &extra)
            .await
            .map(|records| print_json(&records))
    } else if args.actions.profile {
        let Some(user_id) = args.user_id.as_deref() else {
            eprintln!("Error: --user-id is required when using -p (profile)");
            return ExitCode::FAILURE;
        };
        users
            .profile(user_id, None)
            .await
            .map(|profile| print_json(&profile))
    } else if args.actions.create {
        let (Some(email), Some(password)) = (args.email.as_deref(), args.password.as_deref())
        else {
            eprintln!("Error: --email and --password are required when using -c (create)");
            return ExitCode::FAILURE;
        };
        let attributes: UserRecord = match args.fields.as_deref() {
            Some(fields) => match serde_json::from_str(fields) {
                Ok(fields) => fields,
                Err(e) => {
                    eprintln!("Error: --fields is not a JSON object: {e}");
                    return ExitCode::FAILURE;
                }
            },
            None => UserRecord::new(),
        };
        let new_user = NewUser {
            email: email.to_string(),
            password: password.to_string(),
            display_name: args.display_name.clone(),
            attributes,
        };
        users
            .create(&new_user)
            .await
            .map(|created| print_json(&created))
    } else if args.actions.update {
        let (Some(user_id), Some(fields)) = (args.user_id.as_deref(), args.fields.as_deref())
        else {
            eprintln!("Error: --user-id and --fields are required when using -u (update)");
            return ExitCode::FAILURE;
        };
        let fields: UserRecord = match serde_json::from_str(fields) {
            Ok(fields) => fields,
            Err(e) => {
                eprintln!("Error: --fields is not a JSON object: {e}");
                return ExitCode::FAILURE;
            }
        };
        users
            .update(user_id, &fields)
            .await
            .map(|acknowledged| println!("updated: {acknowledged}"))
    } else if args.actions.delete {
        let Some(user_id) = args.user_id.as_deref() else {
            eprintln!("Error: --user-id is required when using -d (delete)");
            return ExitCode::FAILURE;
        };
        users
            .delete(user_id)
            .await
            .map(|acknowledged| println!("deleted: {acknowledged}"))
    } else if args.actions.password_reset {
        let (Some(user_id), Some(password)) = (args.user_id.as_deref(), args.password.as_deref())
        else {
            eprintln!("Error: --user-id and --password are required when using -w (password reset)");
            return ExitCode::FAILURE;
        };
        users
            .change_password(user_id, password)
            .await
            .map(|acknowledged| println!("password changed: {acknowledged}"))
    } else {
        // Unreachable because clap enforces exactly one action flag via
        // the group constraint, but handled explicitly to avoid silently
        // succeeding with no action.
        eprintln!("Error: no action flag provided");
        return ExitCode::FAILURE;
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

//! CLI module for the mailpulse command-line interface.
//!
//! Provides subcommands on top of the dashboard library:
//! - `serve` - Run the legacy API proxy (also the default without a subcommand)
//! - `login` / `logout` / `whoami` - Manage the vendor session
//! - `campaigns` - Show campaign statistics, newest first
//! - `legacy campaigns` - Show recent campaigns through the API-key proxy
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, Mode};
use crate::dashboard::Dashboard;
use crate::legacy::{count_or_dash, LegacyClient, LegacyError};
use crate::session::{CredentialStore, FileStore};
use crate::vendor::{Campaign, VendorClient};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "mailpulse")]
#[command(author, version, about = "Email campaign statistics dashboard", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "mailpulse.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Override the configured mode
    #[arg(long, env = "MAILPULSE_MODE", value_enum)]
    pub mode: Option<Mode>,

    /// Proxy URL used by the legacy commands
    #[arg(long, env = "MAILPULSE_API_URL", default_value = "http://localhost:3000")]
    pub api_url: String,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the legacy API proxy server
    Serve,

    /// Log in with the account email and password
    Login {
        #[arg(long)]
        email: String,
        /// Account password (can also be set via MAILPULSE_PASSWORD env var)
        #[arg(long, env = "MAILPULSE_PASSWORD", hide_env_values = true)]
        password: String,
        /// Keep the credentials for silent re-login
        #[arg(long)]
        remember: bool,
    },

    /// Show campaign statistics
    Campaigns {
        /// Number of pages to load
        #[arg(short, long, default_value = "1")]
        pages: u32,
    },

    /// Show the logged-in account
    Whoami,

    /// End the session
    Logout {
        /// Keep saved credentials for the next login
        #[arg(long)]
        keep_credentials: bool,
    },

    /// API-key dashboard commands
    #[command(subcommand)]
    Legacy(LegacyCommands),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Legacy subcommands
#[derive(Subcommand, Debug)]
pub enum LegacyCommands {
    /// List the most recent campaigns with their stats
    Campaigns {
        /// API key (saved for later runs; the saved key is used when omitted)
        #[arg(long, env = "MAILPULSE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// Forget the saved API key
    Logout,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

fn open_store(config: &Config) -> CredentialStore {
    CredentialStore::new(Arc::new(FileStore::new(config.session_file())))
}

fn open_dashboard(config: &Config) -> Result<Dashboard> {
    config.ensure_valid()?;
    let client = VendorClient::from_config(config)?;
    Ok(Dashboard::new(
        Arc::new(client),
        open_store(config),
        config.dashboard.page_size,
    ))
}

/// Run a CLI command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::Login {
            email,
            password,
            remember,
        }) => {
            let remember = *remember || config.dashboard.remember_credentials;
            cmd_login(config, email, password, remember).await
        }
        Some(Commands::Campaigns { pages }) => cmd_campaigns(config, *pages).await,
        Some(Commands::Whoami) => cmd_whoami(config).await,
        Some(Commands::Logout { keep_credentials }) => cmd_logout(config, *keep_credentials),
        Some(Commands::Legacy(LegacyCommands::Campaigns { api_key })) => {
            cmd_legacy_campaigns(cli, config, api_key.as_deref()).await
        }
        Some(Commands::Legacy(LegacyCommands::Logout)) => cmd_legacy_logout(config),
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Serve) | None => {
            // Serving is handled in main.rs
            Ok(())
        }
    }
}

async fn cmd_login(config: &Config, email: &str, password: &str, remember: bool) -> Result<()> {
    let mut dashboard = open_dashboard(config)?;

    if let Err(e) = dashboard.login(email, password, remember).await {
        match &e.code {
            Some(code) => anyhow::bail!("{} ({})", e.message, code),
            None => anyhow::bail!("{}", e.message),
        }
    }

    println!("[OK] Logged in as {}", email);
    if remember {
        println!("     Credentials saved for automatic re-login.");
    }
    print_campaigns(&dashboard);
    Ok(())
}

async fn cmd_campaigns(config: &Config, pages: u32) -> Result<()> {
    let mut dashboard = open_dashboard(config)?;

    if !dashboard.start().await {
        anyhow::bail!(
            "{}",
            dashboard
                .error()
                .unwrap_or("Not logged in. Run `mailpulse login` first.")
        );
    }

    for _ in 1..pages.max(1) {
        if !dashboard.has_more() || !dashboard.load_more().await {
            break;
        }
    }

    if let Some(error) = dashboard.error() {
        anyhow::bail!("{}", error);
    }

    print_campaigns(&dashboard);
    if dashboard.has_more() {
        println!("More campaigns available. Use --pages to load more.");
    }
    Ok(())
}

async fn cmd_whoami(config: &Config) -> Result<()> {
    let mut dashboard = open_dashboard(config)?;

    if dashboard.auth().store().token()?.is_none()
        && dashboard.auth().store().credentials()?.is_none()
    {
        anyhow::bail!("Not logged in. Run `mailpulse login` first.");
    }

    if !dashboard.restore().await {
        anyhow::bail!("{}", dashboard.error().unwrap_or("Not logged in"));
    }

    let user = dashboard.load_user().await.cloned();
    match user {
        Some(user) => {
            println!("ID:     {}", count_or_dash(user.id));
            println!("Email:  {}", user.email.as_deref().unwrap_or("-"));
            println!("Name:   {}", user.name.as_deref().unwrap_or("-"));
            Ok(())
        }
        None => anyhow::bail!("{}", dashboard.error().unwrap_or("Failed to load user")),
    }
}

fn cmd_logout(config: &Config, keep_credentials: bool) -> Result<()> {
    open_dashboard(config)?.logout(keep_credentials);
    println!("[OK] Logged out");
    Ok(())
}

fn print_campaigns(dashboard: &Dashboard) {
    let campaigns = dashboard.campaigns();
    if campaigns.is_empty() {
        println!("No campaigns found.");
        return;
    }

    println!();
    println!(
        "{:<30}  {:<20}  {:<8}  {:<19}  {:>8}  {:>9}  {:>7}  {:>7}",
        "SUBJECT", "LIST", "STATUS", "DATE", "SENT", "DELIVERED", "OPENED", "CLICKED"
    );
    println!("{}", "-".repeat(124));

    for campaign in campaigns {
        print_campaign_row(campaign);
    }

    println!();
}

fn print_campaign_row(campaign: &Campaign) {
    println!(
        "{:<30}  {:<20}  {:<8}  {:<19}  {:>8}  {:>8.1}%  {:>6.1}%  {:>6.1}%",
        truncate(&campaign.subject, 30),
        truncate(&campaign.list_name, 20),
        campaign.status.to_string(),
        campaign.display_time(),
        campaign.sent,
        campaign.delivery_rate(),
        campaign.open_rate(),
        campaign.click_rate()
    );
}

async fn cmd_legacy_campaigns(cli: &Cli, config: &Config, api_key: Option<&str>) -> Result<()> {
    let store = open_store(config);

    let api_key = match api_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => key.to_string(),
        None => store
            .legacy_api_key()?
            .context("No API key. Pass --api-key or set MAILPULSE_API_KEY.")?,
    };

    let client = LegacyClient::new(&cli.api_url, config.dashboard.legacy_recent_count)?;
    let campaigns = match client.recent_campaigns(&api_key).await {
        Ok(campaigns) => campaigns,
        Err(LegacyError::NoCampaigns) => {
            store.save_legacy_api_key(&api_key)?;
            println!("{}", LegacyError::NoCampaigns);
            return Ok(());
        }
        Err(e) => anyhow::bail!("{}", e),
    };
    store.save_legacy_api_key(&api_key)?;

    let stats = client.campaign_stats(&api_key, &campaigns).await;

    println!();
    println!(
        "{:<10}  {:<30}  {:<12}  {:<19}  {:>8}  {:>9}  {:>15}  {:>15}",
        "ID", "SUBJECT", "STATUS", "STARTED", "SENT", "DELIVERED", "OPENS", "CLICKS"
    );
    println!("{}", "-".repeat(134));

    for campaign in &campaigns {
        let stats = stats.get(&campaign.id).cloned().unwrap_or_default();
        println!(
            "{:<10}  {:<30}  {:<12}  {:<19}  {:>8}  {:>9}  {:>15}  {:>15}",
            campaign.id,
            truncate(&campaign.subject, 30),
            truncate(&campaign.status, 12),
            campaign.start_time,
            count_or_dash(stats.sent),
            count_or_dash(stats.delivered),
            stats.opens_display(),
            stats.clicks_display()
        );
    }

    println!();
    Ok(())
}

fn cmd_legacy_logout(config: &Config) -> Result<()> {
    open_store(config).clear_legacy_api_key()?;
    println!("[OK] API key removed");
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("Built-in defaults will be used.");
        println!("To create a custom configuration, copy mailpulse.example.toml to mailpulse.toml");
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            println!("[!!] {}", problem);
        }
        anyhow::bail!("Configuration has {} problem(s)", problems.len());
    }

    println!("[OK] Configuration file is valid!");
    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("Mode:           {:?}", config.mode);
    println!();
    println!("Server:");
    println!("  Host:         {}", config.server.host);
    println!("  Port:         {}", config.server.port);
    println!("  Data Dir:     {}", config.server.data_dir.display());
    println!();
    println!("Vendor:");
    println!("  API:          {}", config.vendor.api_base_url);
    println!("  Legacy API:   {}", config.vendor.legacy_api_base_url);
    println!("  Timeout:      {}s", config.vendor.request_timeout_secs);
    println!();
    println!("Dashboard:");
    println!("  Page Size:    {}", config.dashboard.page_size);
    println!(
        "  Cache:        {}",
        if config.cache_enabled() {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    println!();
    Ok(())
}

/// Truncate a string to max length with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

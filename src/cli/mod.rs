//! Command-line interface.
//!
//! Without a subcommand the binary starts the web server. The subcommands
//! work directly against the database and need no running server:
//! - `cleanup` - purge expired sessions and reset tokens once
//! - `create-admin` - provision a super-admin account
//! - `config check` - validate the configuration file

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::auth::AuthService;
use crate::config::Config;
use crate::engine::AuthCleanup;

#[derive(Parser, Debug)]
#[command(name = "prayerwall")]
#[command(author, version, about = "Church prayer wall with moderated member updates", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PRAYERWALL_CONFIG", default_value = "prayerwall.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Remove expired sessions and used or expired reset tokens
    Cleanup,

    /// Create a super-admin account
    CreateAdmin {
        username: String,
        /// Password (or set PRAYERWALL_ADMIN_PASSWORD)
        #[arg(long, env = "PRAYERWALL_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Run an offline subcommand
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::Cleanup) => cmd_cleanup(config).await,
        Some(Commands::CreateAdmin { username, password }) => {
            cmd_create_admin(config, username, password).await
        }
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        // No subcommand means start the server - this is handled in main.rs
        None => Ok(()),
    }
}

async fn open_auth(config: &Config) -> Result<AuthService> {
    let db = crate::db::init(&config.server.data_dir).await?;
    Ok(AuthService::new(db, &config.auth))
}

async fn cmd_cleanup(config: &Config) -> Result<()> {
    let cleanup = AuthCleanup::new(open_auth(config).await?);
    let stats = cleanup
        .run_cleanup()
        .await
        .context("Cleanup failed")?;

    println!("Removed {} expired session(s)", stats.sessions_removed);
    println!("Removed {} reset token(s)", stats.reset_tokens_removed);
    Ok(())
}

async fn cmd_create_admin(config: &Config, username: &str, password: &str) -> Result<()> {
    let auth = open_auth(config).await?;
    let user = auth
        .provision_super_admin(username, password, Utc::now())
        .await
        .context("Failed to create super-admin")?;

    println!("Created super-admin '{}' (id {})", user.username, user.id);
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[!!] Configuration file not found: {}", config_path.display());
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    let config = Config::load(config_path)?;
    println!("[OK] Configuration file is valid!");
    println!();
    println!("Server:");
    println!("  Listen:       {}:{}", config.server.host, config.server.port);
    println!("  Data Dir:     {}", config.server.data_dir.display());
    println!("  Public URL:   {}", config.server.public_url);
    println!("  Secure cookies: {}", enabled(config.server.secure_cookies));
    println!();
    println!("Auth:");
    println!("  Session TTL:  {}h", config.auth.session_ttl_hours);
    println!("  Reset TTL:    {}m", config.auth.reset_token_ttl_minutes);
    println!(
        "  Bootstrap:    {}",
        config.auth.bootstrap_username.as_deref().unwrap_or("(none)")
    );
    println!();
    println!("Prayers:");
    println!("  Categories:   {}", config.prayers.categories.join(", "));
    println!("  Stale after:  {} days", config.prayers.stale_after_days);
    println!();
    println!("Security:");
    println!("  Rate Limiting: {}", enabled(config.rate_limit.enabled));
    println!("  Email:        {}", enabled(config.email.is_configured()));

    if config.auth.bootstrap_username.is_some() != config.auth.bootstrap_password.is_some() {
        println!();
        println!("[!!] bootstrap_username and bootstrap_password must be set together");
    }

    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "Enabled"
    } else {
        "Disabled"
    }
}

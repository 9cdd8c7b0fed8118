//! Command-line interface.
//!
//! Without a subcommand the binary starts the server. Subcommands talk to a
//! running server through a saved client session, or operate on the local
//! database directly:
//! - `status` - Show server health and version
//! - `login` / `logout` / `whoami` - Manage the client session
//! - `dashboard` / `stats` / `tags` - Print an athlete's data
//! - `config check` - Validate configuration file
//! - `db seed-global-tags` / `db prune-global-tags` - Manage global tags

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analytics::{format_rate, AthleteDashboard, AthleteStats, OutcomeRate};
use crate::api::error::ErrorResponse;
use crate::api::HealthResponse;
use crate::config::Config;
use crate::db::{AuthResponse, MeResponse, Tag, TagCategory};

pub const DEFAULT_API_URL: &str = "http://localhost:4000";

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "combat-analyzer")]
#[command(author, version, about = "Training video tagging and performance analytics for athletes", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "combat-analyzer.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Skip startup self-checks (for development only)
    #[arg(long)]
    pub skip_checks: bool,

    /// API URL to connect to (overrides the saved session)
    #[arg(long, env = "COMBAT_ANALYZER_API_URL")]
    pub api_url: Option<String>,

    /// Authentication token (overrides the saved session)
    #[arg(long, env = "COMBAT_ANALYZER_TOKEN")]
    pub token: Option<String>,

    /// Where the client session is stored (default: ~/.combat-analyzer/session.json)
    #[arg(long, env = "COMBAT_ANALYZER_SESSION")]
    pub session_file: Option<PathBuf>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show server status (health, version)
    Status,

    /// Log in and save the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Revoke the saved token and remove the session file
    Logout,

    /// Show the logged-in user and athlete
    Whoami,

    /// Print a dashboard (your own unless --athlete is given)
    Dashboard {
        #[arg(long)]
        athlete: Option<i64>,
    },

    /// Print performance statistics (your own unless --athlete is given)
    Stats {
        #[arg(long)]
        athlete: Option<i64>,
    },

    /// List the tags you can apply
    Tags {
        /// Only show one category (e.g. TECHNICAL_ERROR)
        #[arg(long)]
        category: Option<TagCategory>,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Insert the built-in global tags (existing ones are kept)
    SeedGlobalTags,
    /// Delete all global tags and their applications
    PruneGlobalTags {
        /// Perform the deletion (without this flag, just shows what would be deleted)
        #[arg(long)]
        execute: bool,
    },
}

// ============================================================================
// Client session
// ============================================================================

/// Server address and token used by every client command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSession {
    pub api_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
        }
    }
}

impl ClientSession {
    /// `~/.combat-analyzer/session.json`, or the working directory without a home
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".combat-analyzer")
            .join("session.json")
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let session = serde_json::from_str(&content)
            .with_context(|| format!("Invalid session file: {}", path.display()))?;
        Ok(Some(session))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }

    /// Remove the session file; returns whether one existed
    pub fn clear(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove session file: {}", path.display()))?;
        Ok(true)
    }

    /// Saved session with command-line overrides applied
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut session = Self::load(&session_path(cli))?.unwrap_or_default();
        if let Some(url) = &cli.api_url {
            session.api_url = url.clone();
        }
        if let Some(token) = &cli.token {
            session.token = Some(token.clone());
        }
        session.api_url = session.api_url.trim_end_matches('/').to_string();
        Ok(session)
    }
}

fn session_path(cli: &Cli) -> PathBuf {
    cli.session_file
        .clone()
        .unwrap_or_else(ClientSession::default_path)
}

// ============================================================================
// HTTP client
// ============================================================================

/// Create an HTTP client with the given token
fn create_client(token: Option<&str>) -> Result<Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Some(token) = token {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token)
                .parse()
                .context("Invalid token format")?,
        );
    }

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")
}

pub struct ApiClient {
    http: Client,
    session: ClientSession,
}

impl ApiClient {
    pub fn new(session: ClientSession) -> Result<Self> {
        let http = create_client(session.token.as_deref())?;
        Ok(Self { http, session })
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    fn require_token(&self) -> Result<()> {
        if self.session.token.is_none() {
            anyhow::bail!("Not logged in. Run `combat-analyzer login --email ... --password ...` first.");
        }
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.session.api_url, path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.with_context(|| {
            format!(
                "Failed to connect to {}. Is the server running?",
                self.session.api_url
            )
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED && self.session.token.is_some() {
            anyhow::bail!("Session expired or revoked. Log in again.");
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error.message)
            .unwrap_or(text);
        anyhow::bail!("Server returned error {}: {}", status, message)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        self.send(Method::POST, path, Some(body))
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    /// POST without a body, ignoring the response content
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        self.send(Method::POST, path, None).await?;
        Ok(())
    }
}

// ============================================================================
// CLI Command Handlers
// ============================================================================

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Status) => cmd_status(cli).await,
        Some(Commands::Login { email, password }) => cmd_login(cli, email, password).await,
        Some(Commands::Logout) => cmd_logout(cli).await,
        Some(Commands::Whoami) => cmd_whoami(cli).await,
        Some(Commands::Dashboard { athlete }) => cmd_dashboard(cli, *athlete).await,
        Some(Commands::Stats { athlete }) => cmd_stats(cli, *athlete).await,
        Some(Commands::Tags { category }) => cmd_tags(cli, *category).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli).await,
        Some(Commands::Db(DbCommands::SeedGlobalTags)) => cmd_seed_global_tags(cli).await,
        Some(Commands::Db(DbCommands::PruneGlobalTags { execute })) => {
            cmd_prune_global_tags(cli, *execute).await
        }
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

async fn cmd_status(cli: &Cli) -> Result<()> {
    let client = ApiClient::new(ClientSession::resolve(cli)?)?;
    println!("Connecting to {}...", client.session().api_url);

    let health: HealthResponse = client.get("/health").await?;

    println!();
    println!("=== Combat Analyzer Server Status ===");
    println!();
    let icon = if health.status == "ok" { "[OK]" } else { "[!!]" };
    println!("Version:    v{}", health.version);
    println!("Status:     {} {}", icon, health.message);
    println!(
        "Session:    {}",
        if client.session().token.is_some() {
            "logged in"
        } else {
            "not logged in"
        }
    );
    println!();
    Ok(())
}

async fn cmd_login(cli: &Cli, email: &str, password: &str) -> Result<()> {
    let mut session = ClientSession::resolve(cli)?;
    session.token = None;
    let client = ApiClient::new(session.clone())?;

    let response: AuthResponse = client
        .post(
            "/api/auth/login",
            &serde_json::json!({ "email": email, "password": password }),
        )
        .await?;

    session.token = Some(response.token);
    let path = session_path(cli);
    session.save(&path)?;

    match &response.athlete {
        Some(athlete) => println!(
            "Logged in as {} (athlete: {}, #{})",
            response.user.email, athlete.name, athlete.id
        ),
        None => println!("Logged in as {}", response.user.email),
    }
    println!("Session saved to {}", path.display());
    Ok(())
}

async fn cmd_logout(cli: &Cli) -> Result<()> {
    let session = ClientSession::resolve(cli)?;

    if session.token.is_some() {
        let client = ApiClient::new(session)?;
        // The local session is removed even if the server is unreachable
        if let Err(e) = client.post_empty("/api/auth/logout").await {
            println!("[!] Could not revoke token on the server: {}", e);
        }
    }

    if ClientSession::clear(&session_path(cli))? {
        println!("Logged out.");
    } else {
        println!("No saved session.");
    }
    Ok(())
}

async fn cmd_whoami(cli: &Cli) -> Result<()> {
    let client = ApiClient::new(ClientSession::resolve(cli)?)?;
    client.require_token()?;

    let me: MeResponse = client.get("/api/auth/me").await?;
    println!("User:     {} (#{})", me.user.email, me.user.id);
    match me.athlete {
        Some(athlete) => println!("Athlete:  {} (#{})", athlete.name, athlete.id),
        None => println!("Athlete:  -"),
    }
    println!("Server:   {}", client.session().api_url);
    Ok(())
}

async fn cmd_dashboard(cli: &Cli, athlete: Option<i64>) -> Result<()> {
    let client = ApiClient::new(ClientSession::resolve(cli)?)?;
    let path = match athlete {
        Some(id) => format!("/api/athletes/{}/dashboard", id),
        None => {
            client.require_token()?;
            "/api/my/dashboard".to_string()
        }
    };

    let dashboard: AthleteDashboard = client.get(&path).await?;
    for line in dashboard_lines(&dashboard) {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_stats(cli: &Cli, athlete: Option<i64>) -> Result<()> {
    let client = ApiClient::new(ClientSession::resolve(cli)?)?;
    let path = match athlete {
        Some(id) => format!("/api/athletes/{}/stats", id),
        None => {
            client.require_token()?;
            "/api/my/stats".to_string()
        }
    };

    let stats: AthleteStats = client.get(&path).await?;
    for line in stats_lines(&stats) {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_tags(cli: &Cli, category: Option<TagCategory>) -> Result<()> {
    let client = ApiClient::new(ClientSession::resolve(cli)?)?;
    client.require_token()?;

    let path = match category {
        Some(c) => format!("/api/my/tags?category={}", c.as_str()),
        None => "/api/my/tags".to_string(),
    };
    let tags: Vec<Tag> = client.get(&path).await?;

    if tags.is_empty() {
        println!("No tags found.");
        return Ok(());
    }

    println!();
    println!(
        "{:<6}  {:<28}  {:<20}  {:<8}  {:<6}",
        "ID", "NAME", "CATEGORY", "OUTCOME", "SCOPE"
    );
    println!("{}", "-".repeat(76));
    for tag in tags {
        println!(
            "{:<6}  {:<28}  {:<20}  {:<8}  {:<6}",
            tag.id,
            truncate(&tag.name, 28),
            tag.kind.category().as_str(),
            tag.kind.outcome().map(|o| o.as_str()).unwrap_or("-"),
            if tag.is_global() { "global" } else { "own" }
        );
    }
    println!();
    Ok(())
}

async fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!("  Static Dir:   {}", config.server.static_dir.display());
            println!();
            println!("Auth:");
            println!("  Token TTL:    {} days", config.auth.token_ttl_days);
            println!("  Min Password: {} characters", config.auth.min_password_length);
            println!();
            println!("Uploads:");
            println!("  Dir:          {}", config.uploads.dir.display());
            println!("  Max Size:     {}", format_bytes(config.uploads.max_bytes as u64));
            println!();

            let warnings = config_warnings(&config);
            if !warnings.is_empty() {
                println!("Warnings:");
                for warning in warnings {
                    println!("  [!] {}", warning);
                }
                println!();
            }

            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            println!();
            anyhow::bail!("Invalid configuration file");
        }
    }
}

fn config_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.cors.allowed_origins.is_empty() {
        warnings.push(
            "No CORS origins configured - requests from any origin are accepted".to_string(),
        );
    }
    if config.auth.token_ttl_days <= 0 {
        warnings.push(
            "token_ttl_days is not positive - every issued token is already expired".to_string(),
        );
    }
    if config.auth.min_password_length < 8 {
        warnings.push(format!(
            "min_password_length is {} - passwords shorter than 8 characters are weak",
            config.auth.min_password_length
        ));
    }
    warnings
}

async fn open_local_db(cli: &Cli) -> Result<crate::DbPool> {
    let config = Config::load(&cli.config)?;
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;
    crate::db::init(&config.database_path()).await
}

async fn cmd_seed_global_tags(cli: &Cli) -> Result<()> {
    let pool = open_local_db(cli).await?;
    let inserted = crate::db::seed_global_tags(&pool).await?;
    println!("Inserted {} global tag(s).", inserted);
    Ok(())
}

async fn cmd_prune_global_tags(cli: &Cli, execute: bool) -> Result<()> {
    let pool = open_local_db(cli).await?;

    if !execute {
        let found = crate::db::prune_global_tags(&pool, false).await?;
        println!(
            "[DRY RUN] {} global tag(s) would be deleted, together with their applications.",
            found
        );
        println!("Use --execute to delete them.");
        return Ok(());
    }

    let deleted = crate::db::prune_global_tags(&pool, true).await?;
    println!("Deleted {} global tag(s).", deleted);
    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

fn dashboard_lines(dashboard: &AthleteDashboard) -> Vec<String> {
    let summary = &dashboard.summary;
    let mut lines = vec![
        String::new(),
        format!("=== Dashboard: {} ===", dashboard.athlete.name),
        String::new(),
        format!("Sessions:           {}", summary.session_count),
        format!("Tags applied:       {}", summary.total_tags),
        format!("Avg tags/session:   {:.1}", summary.average_tags_per_session),
        format!("Distinct tags:      {}", summary.distinct_tags_count),
        format!(
            "Most used tag:      {}",
            summary
                .most_used_tag
                .as_ref()
                .map(|t| format!("{} ({})", t.name, t.count))
                .unwrap_or_else(|| "-".to_string())
        ),
    ];

    if !dashboard.recent_sessions.is_empty() {
        lines.push(String::new());
        lines.push("Recent sessions:".to_string());
        for session in &dashboard.recent_sessions {
            lines.push(format!(
                "  #{:<5} {:<10}  {:>3} tags  {}",
                session.session_id,
                session.created_at.get(..10).unwrap_or(&session.created_at),
                session.tag_count,
                truncate(session.notes.as_deref().unwrap_or("-"), 40)
            ));
        }
    }

    if !dashboard.top_tags.is_empty() {
        lines.push(String::new());
        lines.push("Top tags:".to_string());
        for tag in &dashboard.top_tags {
            lines.push(format!("  {:>4}x  {}", tag.count, truncate(&tag.name, 40)));
        }
    }

    lines.push(String::new());
    lines
}

fn rate_line(label: &str, rate: &OutcomeRate) -> String {
    format!(
        "{:<12} {:>5}  ({} success / {} fail)",
        label,
        format_rate(rate.rate.unwrap_or(f64::NAN)),
        rate.successes,
        rate.failures
    )
}

fn stats_lines(stats: &AthleteStats) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "=== Performance Statistics ===".to_string(),
        String::new(),
        format!("Sessions:    {}", stats.session_count),
        rate_line("Offensive:", &stats.offensive),
        rate_line("Defensive:", &stats.defensive),
        String::new(),
    ];

    match &stats.most_frequent_weakness {
        Some(weakness) => {
            lines.push(format!("Most frequent weakness: {}", weakness));
            for point in &stats.weakness_trend {
                lines.push(format!(
                    "  {}  #{:<5} {}",
                    point.date,
                    point.session_id,
                    "*".repeat(point.count)
                ));
            }
        }
        None => lines.push("Most frequent weakness: -".to_string()),
    }

    lines.push(String::new());
    if stats.dominant_strengths.is_empty() {
        lines.push("Dominant strengths: -".to_string());
    } else {
        lines.push("Dominant strengths:".to_string());
        for strength in &stats.dominant_strengths {
            lines.push(format!("  {:>4}x  {}", strength.count, strength.name));
        }
    }
    lines.push(String::new());
    lines
}

/// Format bytes to human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
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

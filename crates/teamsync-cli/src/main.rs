//! Teamsync CLI
//!
//! Runs the node daemon and wraps teamsync-core for command-line usage.
//! Local state (identity, network preference, skill checks) is read and
//! written directly; team operations go through a running daemon's API.
//!
//! ## Usage
//!
//! ```bash
//! # Set who you are, then start the daemon
//! teamsync identity set "Ada"
//! teamsync serve --port 19960
//!
//! # Create a team on this node, or join one
//! teamsync team create "Core"
//! teamsync team join 192.168.1.20:19960
//!
//! # Find teams on the LAN
//! teamsync discover
//!
//! # This week's activity across the team (on the leader)
//! teamsync team report <team-id>
//!
//! # Check a skill before publishing it
//! teamsync skill validate ./skills/code-review
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use teamsync_core::config::DEFAULT_PORT;
use teamsync_core::network::discover;
use teamsync_core::skill::packager;
use teamsync_core::skill::InstalledSkillState;
use teamsync_core::{
    Config, IdentityStore, LoggingBuilder, NetworkManager, Storage, TeamError, TeamNode,
    TeamRegistry,
};
use tracing::{info, warn};

/// Teamsync - LAN team coordination and skill sync
#[derive(Parser)]
#[command(name = "teamsync")]
#[command(version)]
#[command(about = "Teamsync - LAN team coordination and skill sync")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.teamsync)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node daemon
    Serve {
        /// HTTP port (default: 19960)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind host (default: 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Create the identity with this name if none exists
        #[arg(long)]
        name: Option<String>,

        /// Only write the JSONL log file, nothing to the console
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show node information
    Info,

    /// Identity management
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Team management
    Team {
        /// Base URL of the running daemon
        #[arg(long, global = true, default_value_t = default_api())]
        api: String,

        #[command(subcommand)]
        action: TeamAction,
    },

    /// Skill checks
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },

    /// Network preference
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },

    /// Look for teams on the local network
    Discover {
        /// How long to browse for answers
        #[arg(long, default_value_t = 3000)]
        timeout_ms: u64,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Show the identity
    Show,
    /// Create or rename the identity
    Set { name: String },
}

#[derive(Subcommand)]
enum TeamAction {
    /// List the team held on this node
    List,
    /// Create a team led by the daemon
    Create {
        name: String,
        #[arg(long)]
        interface: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Join the team led at ENDPOINT (ip:port)
    Join { endpoint: String },
    /// Leave a team
    Leave { team_id: String },
    /// Dissolve a team this daemon leads
    Dissolve { team_id: String },
    /// List team members
    Members { team_id: String },
    /// Weekly activity report (leader only)
    Report {
        team_id: String,
        /// Any day of the wanted week, YYYY-MM-DD (default: this week)
        #[arg(long)]
        week: Option<String>,
        /// Fetch fresh stats from every member first
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    /// Validate a skill directory
    Validate { path: PathBuf },
    /// Print the content checksum of a skill directory
    Checksum { path: PathBuf },
    /// List installed team skills
    Installed,
}

#[derive(Subcommand)]
enum NetworkAction {
    /// Show the preference and the advertised endpoint
    Show,
    /// Set the preferred interface and/or address
    Set {
        #[arg(long)]
        interface: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },
    /// List IPv4 interfaces
    Interfaces,
}

fn default_api() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_PORT)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        config.set_data_dir(data_dir);
    }

    match cli.command {
        Commands::Serve {
            port,
            host,
            name,
            quiet,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(host) = host {
                config.host = host;
            }
            let mut logging = LoggingBuilder::from_verbosity(cli.verbose.max(1))
                .with_jsonl(config.logs_dir(), "node");
            if quiet {
                logging = logging.no_console();
            }
            logging.init()?;
            serve(config, name).await?;
        }

        other => {
            LoggingBuilder::from_verbosity(cli.verbose).init()?;
            run_local(other, &config).await?;
        }
    }

    Ok(())
}

async fn serve(config: Config, name: Option<String>) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let node = TeamNode::new(config).await?;
    match name {
        Some(name) => {
            node.identity().ensure(&name)?;
        }
        None if !node.identity().is_set() => {
            warn!("No identity set; run `teamsync identity set <name>` before creating or joining a team");
        }
        None => {}
    }

    let listener = node
        .bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, data_dir = %node.data_dir().display(), "Teamsync daemon starting");
    node.serve(listener, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_local(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Serve { .. } => bail!("serve is handled by main"),

        Commands::Info => {
            let storage = Storage::new(&config.data_dir)?;
            let identity = IdentityStore::load(storage.clone())?;
            let registry = TeamRegistry::load(storage.clone())?;
            let installed = InstalledSkillState::load(&storage)?;

            println!("Teamsync v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Identity:");
            match identity.get() {
                Ok(me) => {
                    println!("  Name: {}", me.name);
                    println!("  ID: {}", me.id);
                }
                Err(_) => println!("  (not set)"),
            }
            println!();
            println!("Team:");
            match registry.current() {
                Some(team) => print_team(&team),
                None => println!("  (none)"),
            }
            println!();
            println!("Data directory: {}", config.data_dir.display());
            println!("Skills directory: {}", config.skills_dir.display());
            println!("Installed team skills: {}", installed.skills.len());
        }

        Commands::Identity { action } => {
            let identity = IdentityStore::load(Storage::new(&config.data_dir)?)?;
            match action {
                IdentityAction::Show => match identity.get() {
                    Ok(me) => {
                        println!("Identity:");
                        println!("  Name: {}", me.name);
                        println!("  ID: {}", me.id);
                    }
                    Err(TeamError::IdentityRequired) => {
                        println!("Identity not set. Use `teamsync identity set <name>`.");
                    }
                    Err(e) => return Err(e.into()),
                },
                IdentityAction::Set { name } => {
                    let me = if identity.is_set() {
                        identity.update(&name)?
                    } else {
                        identity.create(&name)?
                    };
                    println!("Identity set: {} ({})", me.name, me.id);
                }
            }
        }

        Commands::Team { api, action } => run_team(&api, action, config).await?,

        Commands::Skill { action } => match action {
            SkillAction::Validate { path } => validate_skill(&path)?,
            SkillAction::Checksum { path } => {
                println!("{}", packager::checksum_dir(&path)?);
            }
            SkillAction::Installed => {
                let installed = InstalledSkillState::load(&Storage::new(&config.data_dir)?)?;
                if installed.skills.is_empty() {
                    println!("No team skills installed.");
                }
                for (id, skill) in &installed.skills {
                    println!("{}  v{}  {}", id, skill.version, skill.installed_at);
                }
            }
        },

        Commands::Network { action } => {
            let network = NetworkManager::load(Storage::new(&config.data_dir)?, config.port)?;
            match action {
                NetworkAction::Show => {
                    let pref = network.config();
                    println!("Network:");
                    println!(
                        "  Preferred interface: {}",
                        pref.preferred_interface.as_deref().unwrap_or("(auto)")
                    );
                    println!(
                        "  Preferred IP: {}",
                        pref.preferred_ip.as_deref().unwrap_or("(auto)")
                    );
                    match network.endpoint() {
                        Ok(endpoint) => println!("  Endpoint: {}", endpoint),
                        Err(e) => println!("  Endpoint: (unavailable: {})", e),
                    }
                }
                NetworkAction::Set { interface, ip } => {
                    let pref = network.set_config(interface, ip)?;
                    println!(
                        "Network preference saved: interface={} ip={}",
                        pref.preferred_interface.as_deref().unwrap_or("(auto)"),
                        pref.preferred_ip.as_deref().unwrap_or("(auto)")
                    );
                }
                NetworkAction::Interfaces => {
                    for iface in network.interfaces()? {
                        let mut flags = Vec::new();
                        if iface.is_loopback {
                            flags.push("loopback");
                        }
                        if iface.is_virtual {
                            flags.push("virtual");
                        }
                        println!(
                            "{:<16} {:<32} {}",
                            iface.name,
                            iface.addresses.join(", "),
                            flags.join(",")
                        );
                    }
                }
            }
        }

        Commands::Discover { timeout_ms } => {
            let teams = discover(Duration::from_millis(timeout_ms)).await?;
            if teams.is_empty() {
                println!("No teams found.");
            }
            for team in teams {
                println!(
                    "{}  {}  leader={}  endpoint={}  members={}",
                    team.team_id, team.name, team.leader_name, team.endpoint, team.member_count
                );
            }
        }
    }
    Ok(())
}

fn print_team(team: &teamsync_core::Team) {
    println!("  Name: {}", team.name);
    println!("  ID: {}", team.id);
    println!("  Role: {}", if team.is_leader { "leader" } else { "member" });
    println!("  Leader: {} ({})", team.leader_name, team.leader_endpoint);
    println!("  Members: {}", team.member_count);
}

fn validate_skill(path: &Path) -> Result<()> {
    let result = packager::validate(path)?;
    if !result.valid {
        bail!(
            "invalid skill: {}",
            result.error.unwrap_or_else(|| "unknown error".into())
        );
    }
    println!("Valid skill: {} v{}", result.name, result.version);
    if !result.description.is_empty() {
        println!("  {}", result.description);
    }
    println!("  Files: {} ({} bytes)", result.files.len(), result.total_size);
    if !result.missing_fields.is_empty() {
        println!("  Missing metadata: {}", result.missing_fields.join(", "));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Daemon API
// ═══════════════════════════════════════════════════════════════════════════

struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base, path)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("daemon not reachable at {}", self.base))?;
        Self::read(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("daemon not reachable at {}", self.base))?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["error"].as_str().unwrap_or("request failed");
            bail!("{} ({})", message, status);
        }
        Ok(body)
    }
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("?")
}

async fn run_team(api: &str, action: TeamAction, config: &Config) -> Result<()> {
    let client = ApiClient::new(api);
    match action {
        TeamAction::List => {
            let registry = TeamRegistry::load(Storage::new(&config.data_dir)?)?;
            let teams = registry.list_teams();
            if teams.is_empty() {
                println!("No team.");
            }
            for team in teams {
                println!("Team:");
                print_team(&team);
            }
        }
        TeamAction::Create {
            name,
            interface,
            ip,
        } => {
            let team = client
                .post(
                    "/teams",
                    json!({"name": name, "interface": interface, "ip": ip}),
                )
                .await?;
            println!("Team created: {} ({})", text(&team, "name"), text(&team, "id"));
            println!("  Endpoint: {}", text(&team, "leader_endpoint"));
        }
        TeamAction::Join { endpoint } => {
            let team = client.post("/teams/join", json!({"endpoint": endpoint})).await?;
            println!("Joined team: {} ({})", text(&team, "name"), text(&team, "id"));
        }
        TeamAction::Leave { team_id } => {
            client.post(&format!("/teams/{}/leave", team_id), json!({})).await?;
            println!("Left team {}", team_id);
        }
        TeamAction::Dissolve { team_id } => {
            client
                .post(&format!("/teams/{}/dissolve", team_id), json!({}))
                .await?;
            println!("Team {} dissolved", team_id);
        }
        TeamAction::Members { team_id } => {
            let members = client.get(&format!("/teams/{}/members", team_id)).await?;
            for member in members.as_array().into_iter().flatten() {
                let online = member["is_online"].as_bool().unwrap_or(false);
                let leader = member["is_leader"].as_bool().unwrap_or(false);
                println!(
                    "{} {}  {}  {}{}",
                    if online { "●" } else { "○" },
                    text(member, "name"),
                    text(member, "endpoint"),
                    text(member, "id"),
                    if leader { "  (leader)" } else { "" }
                );
            }
        }
        TeamAction::Report {
            team_id,
            week,
            refresh,
        } => {
            let query = week.map(|w| format!("?week_start={}", w)).unwrap_or_default();
            if refresh {
                let outcome = client
                    .post(&format!("/teams/{}/weekly-report/refresh{}", team_id, query), json!({}))
                    .await?;
                let failed = outcome["failed"].as_array().map_or(0, Vec::len);
                if failed > 0 {
                    warn!(failed, "Some members could not be refreshed");
                }
            }
            let view = client
                .get(&format!("/teams/{}/weekly-report{}", team_id, query))
                .await?;
            print_weekly_report(&view);
        }
    }
    Ok(())
}

/// Members down, days across, commit counts in the cells.
fn print_weekly_report(view: &Value) {
    println!("Week {} .. {}", text(view, "week_start"), text(view, "week_end"));
    let days: Vec<&Value> = view["calendar"].as_array().into_iter().flatten().collect();
    let Some(first) = days.first() else {
        return;
    };

    print!("{:<20}", "");
    for day in &days {
        print!(" {:>6}", text(day, "date").get(5..).unwrap_or("?"));
    }
    println!();
    for (row, member) in first["members"].as_array().into_iter().flatten().enumerate() {
        let online = member["is_online"].as_bool().unwrap_or(false);
        print!("{} {:<18}", if online { "●" } else { "○" }, text(member, "member_name"));
        for day in &days {
            let cell = &day["members"][row];
            let commits = cell["commits"].as_u64().unwrap_or(0);
            let report = if cell["has_report"].as_bool().unwrap_or(false) { "*" } else { " " };
            print!(" {:>5}{}", commits, report);
        }
        println!();
    }

    let projects = view["project_summary"].as_array().into_iter().flatten();
    for project in projects {
        println!(
            "{}  {} commits  +{} -{}",
            text(project, "project_name"),
            project["total_commits"].as_u64().unwrap_or(0),
            project["total_added"].as_u64().unwrap_or(0),
            project["total_removed"].as_u64().unwrap_or(0),
        );
    }
}

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skillspotter::config::Config;
use skillspotter::matching;
use skillspotter::models::analytics::TimeRange;
use skillspotter::models::credential::{LoginRequest, RegisterRequest, Role};
use skillspotter::models::job::{Job, JobFilters, JobStatus, SkillSet};
use skillspotter::models::user::UserFilters;
use skillspotter::resume::ResumeFile;
use skillspotter::state::AppState;

#[derive(Parser)]
#[command(name = "skillspotter")]
#[command(about = "Resume skill extraction and job matching from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and keep the session in the local cache
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Register {
        name: String,
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Check that the backend is reachable
    Health,
    /// Upload a resume and wait for its skills to be extracted
    UploadResume { path: PathBuf },
    /// Skill analysis against the current job market
    Skills,
    Dashboard,
    Jobs {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Jobs ranked by how well they match your extracted skills
    Matches {
        #[arg(long)]
        min_match: Option<u8>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Score a skill set against a job's required skills, offline
    Score {
        #[arg(long, value_delimiter = ',')]
        user: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        required: Vec<String>,
    },
    /// Post a job (admin)
    CreateJob {
        title: String,
        company: String,
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        draft: bool,
    },
    /// Delete a job (admin)
    DeleteJob { id: String },
    /// List user accounts (admin)
    Users {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        admins: bool,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Platform statistics for week, month, year or all (admin)
    Stats {
        #[arg(long, default_value = "month")]
        range: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Pure computation; no backend or cache needed.
    if let Command::Score { user, required } = &cli.command {
        return score_skills(user, required);
    }

    info!("SkillSpotter v{} ({})", env!("CARGO_PKG_VERSION"), config.environment);
    let state = AppState::build(config).await?;
    if let Some(user) = state.auth.restore().await? {
        info!("Restored session for {}", user.email);
    }

    run(&state, cli.command).await
}

async fn run(state: &AppState, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let user = state.auth.login(LoginRequest { email, password }).await?;
            println!("Signed in as {} ({})", user.email, user.role.as_str());
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let user = state
                .auth
                .register(RegisterRequest {
                    name,
                    email,
                    password,
                })
                .await?;
            println!("Registered {}", user.email);
        }
        Command::Logout => {
            state.auth.logout().await;
            println!("Signed out");
        }
        Command::Whoami => match state.auth.check_auth_status().await {
            Some(user) => println!(
                "{} <{}> ({})",
                user.name.as_deref().unwrap_or("-"),
                user.email,
                user.role.as_str()
            ),
            None => println!("Not signed in"),
        },
        Command::Health => {
            let health = state.api.health().await;
            println!(
                "{}: {}",
                if health.is_healthy { "healthy" } else { "unhealthy" },
                health.detail
            );
        }
        Command::UploadResume { path } => {
            require_login(state)?;
            let file = ResumeFile::from_path(&path).await?;
            let upload = state.resume.upload_and_extract(file).await?;
            print_json(&upload)?;
        }
        Command::Skills => {
            require_login(state)?;
            print_json(&state.skills.analysis().await?)?;
        }
        Command::Dashboard => {
            require_login(state)?;
            print_json(&state.skills.dashboard().await?)?;
        }
        Command::Jobs {
            search,
            page,
            limit,
        } => {
            let filters = JobFilters {
                search,
                page,
                limit,
                ..Default::default()
            };
            print_json(&state.jobs.jobs(&filters).await?)?;
        }
        Command::Matches { min_match, page } => {
            require_login(state)?;
            let filters = JobFilters {
                min_match,
                page,
                ..Default::default()
            };
            print_json(&state.jobs.job_matches(&filters).await?)?;
        }
        Command::Score { user, required } => score_skills(&user, &required)?,
        Command::CreateJob {
            title,
            company,
            skills,
            description,
            location,
            draft,
        } => {
            require_admin(state)?;
            let mut job = Job::new(title, company).with_skills(skills);
            job.description = description.unwrap_or_default();
            job.location = location;
            if draft {
                job.status = JobStatus::Draft;
            }
            match state.jobs.create_job(&job).await {
                Ok(created) => print_json(&created)?,
                Err(e) => bail!(e.user_message()),
            }
        }
        Command::DeleteJob { id } => {
            require_admin(state)?;
            if let Err(e) = state.jobs.delete_job(&id).await {
                bail!(e.user_message());
            }
            println!("Deleted job {id}");
        }
        Command::Users {
            search,
            admins,
            page,
        } => {
            require_admin(state)?;
            let filters = UserFilters {
                search,
                role: admins.then_some(Role::Admin),
                page,
                ..Default::default()
            };
            print_json(&state.admin.users(&filters).await?)?;
        }
        Command::Stats { range } => {
            require_admin(state)?;
            let overview = state.admin.overview(TimeRange::parse(&range)).await?;
            if overview.from_cache {
                warn!("Backend unavailable; statistics computed from cached data");
            }
            print_json(&overview)?;
        }
    }
    Ok(())
}

fn score_skills(user: &[String], required: &[String]) -> Result<()> {
    let user: SkillSet = user.iter().map(|s| s.trim().to_string()).collect();
    let required: SkillSet = required.iter().map(|s| s.trim().to_string()).collect();
    print_json(&matching::score(&user, &required))
}

fn require_login(state: &AppState) -> Result<()> {
    if !state.auth.is_authenticated() {
        bail!("Not signed in. Run `skillspotter login` first.");
    }
    Ok(())
}

fn require_admin(state: &AppState) -> Result<()> {
    require_login(state)?;
    if !state.auth.is_admin() {
        bail!("This command requires an admin account.");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

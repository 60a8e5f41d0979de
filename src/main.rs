//! Fresh Pick server and maintenance commands.
//!
//! ```bash
//! freshpick                      # same as `freshpick serve`
//! freshpick check-config
//! freshpick init
//! freshpick process-recurring
//! freshpick create-admin -e admin@example.com -n "Admin" -p 'long password'
//! ```
//!
//! With the snapshot store the maintenance commands refuse to run while a
//! server holds the data directory; stop the server first.

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use freshpick::auth::{hash_password, MIN_PASSWORD_LEN};
use freshpick::config::AppConfig;
use freshpick::models::{NewUser, UpdateUser, ROLE_ADMIN};
use freshpick::openapi::ApiDoc;
use freshpick::repo::{Repo, RepoError, UserRepo};
use freshpick::{config, recurring, telemetry, AppState};

#[derive(Parser)]
#[command(name = "freshpick")]
#[command(author, version, about = "Fresh Pick grocery storefront backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Validate the environment configuration and exit
    CheckConfig,
    /// Create the data store with the built-in roles
    Init,
    /// Run one recurring-order batch and print the report. With the snapshot
    /// store the server must be stopped first
    ProcessRecurring,
    /// Create an admin account, or promote an existing one. With the snapshot
    /// store the server must be stopped first
    CreateAdmin {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        password: String,
    },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env().context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::CheckConfig => {
            info!(bind = %cfg.bind_addr, data_dir = %cfg.data_dir.display(), postgres = cfg.database_url.is_some(), "configuration ok");
            Ok(())
        }
        Command::Init => init_store(&cfg).await,
        Command::ProcessRecurring => {
            let repo = open_repo(&cfg, true).await?;
            let report = recurring::process_due(repo.as_ref(), &cfg.pricing, chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::CreateAdmin { email, name, password } => {
            let repo = open_repo(&cfg, true).await?;
            create_admin(repo.as_ref(), &email, &name, &password).await
        }
    }
}

fn uses_postgres(cfg: &AppConfig) -> bool {
    cfg!(feature = "postgres-store") && cfg.database_url.is_some()
}

/// `offline` is set for one-off commands that must not race a running server.
async fn open_repo(cfg: &AppConfig, offline: bool) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    {
        if let Some(url) = cfg.database_url.as_deref() {
            let repo = freshpick::repo::pg::PgRepo::connect(url).await?;
            info!("Using Postgres repository backend");
            return Ok(Arc::new(repo));
        }
    }
    #[cfg(feature = "inmem-store")]
    {
        use freshpick::repo::inmem::InMemRepo;
        let repo = if offline { InMemRepo::open_offline(&cfg.data_dir)? } else { InMemRepo::open(&cfg.data_dir)? };
        info!("Using in-memory repository backend at '{}'", cfg.data_dir.display());
        return Ok(Arc::new(repo));
    }
    #[allow(unreachable_code)]
    {
        bail!("no storage backend: build with inmem-store or set DATABASE_URL")
    }
}

async fn init_store(cfg: &AppConfig) -> anyhow::Result<()> {
    #[cfg(feature = "postgres-store")]
    {
        if cfg.database_url.is_some() {
            // connecting runs the migrations and seeds the roles
            open_repo(cfg, true).await?;
            info!("postgres store initialised");
            return Ok(());
        }
    }
    #[cfg(feature = "inmem-store")]
    {
        std::fs::create_dir_all(&cfg.data_dir).with_context(|| format!("create '{}'", cfg.data_dir.display()))?;
        freshpick::repo::inmem::InMemRepo::open_offline(&cfg.data_dir)?.flush()?;
        info!("snapshot written to '{}'", cfg.data_dir.display());
        return Ok(());
    }
    #[allow(unreachable_code)]
    {
        bail!("no storage backend: build with inmem-store or set DATABASE_URL")
    }
}

async fn create_admin(repo: &dyn Repo, email: &str, name: &str, password: &str) -> anyhow::Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }
    let user = match repo.find_user_by_email(email).await {
        Ok(existing) => {
            let upd = UpdateUser { role: Some(ROLE_ADMIN.into()), active: Some(true), ..Default::default() };
            repo.update_user(existing.id, upd).await?
        }
        Err(RepoError::NotFound) => {
            let password_hash = hash_password(password)?;
            repo.create_user(NewUser { name: name.into(), email: email.into(), password_hash, role: ROLE_ADMIN.into() })
                .await?
        }
        Err(e) => return Err(e.into()),
    };
    info!(user_id = user.id, email = %user.email, "admin account ready");
    Ok(())
}

async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    info!("Bootstrapping Fresh Pick server");
    telemetry::install();

    #[cfg(feature = "inmem-store")]
    let _server_lock = if uses_postgres(&cfg) {
        None
    } else {
        Some(freshpick::repo::inmem::InMemRepo::lock_for_server(&cfg.data_dir)?)
    };
    let repo = open_repo(&cfg, false).await?;
    let bind_addr = cfg.bind_addr.clone();
    let frontend_url = cfg.frontend_url.clone();
    let state = AppState::new(repo, cfg);

    recurring::spawn_worker(state.repo.clone(), state.config.pricing, state.config.recurring_interval);
    if let Some(limiter) = state.rate_limiter.clone() {
        actix_web::rt::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                let purged = limiter.limiter.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "rate limit windows purged");
                }
            }
        });
    }

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind_addr)
    .with_context(|| format!("bind {bind_addr}"))?;

    info!("Listening on http://{bind_addr}");
    server.run().await?;
    Ok(())
}

/// CLI surface (X1, §6.5): a thin command surface over the component APIs.
/// Pretty-printing, spinners, and colour are explicitly out of scope — every
/// arm below dispatches into a component and prints its result as JSON.
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use crate::application::Application;
use crate::graph::adapter::{create_graph_adapter, AdapterConfig, AdapterType};
use crate::graph::ingestion::ingest_repository;
use crate::graph::migration::{migrate, MigrationMode};
use crate::recovery::{evaluate_recovery_strategy, execute_recovery, RecoveryDeps, RecoveryKind};
use crate::repo::{RepositoryInfo, RepositoryStatus};

#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List every tracked repository and its status.
    Status,
    /// Register a repository for indexing. Cloning and the initial full
    /// scan are orchestrated by an external collaborator; this only
    /// records the repository so `update` can run against it.
    Index {
        url: String,
        #[clap(long, default_value = "main")]
        branch: String,
        #[clap(long)]
        local_path: Option<String>,
    },
    /// Run an incremental update for one repository.
    Update { repository: String },
    /// Run an incremental update for every ready repository.
    UpdateAll,
    /// Forget a repository (metadata only; does not touch the vector store).
    Remove { repository: String },
    /// Clear or act on an interrupted-update marker.
    ResetUpdate {
        repository: String,
        #[clap(long)]
        recover: bool,
        #[clap(long)]
        force: bool,
    },
    #[clap(subcommand)]
    Graph(GraphCommands),
    #[clap(subcommand)]
    Token(TokenCommands),
    #[clap(subcommand)]
    Models(ModelsCommands),
}

#[derive(Debug, Subcommand)]
pub enum GraphCommands {
    /// Parse a repository checkout into graph nodes and edges.
    Populate {
        repository: String,
        #[clap(long)]
        force: bool,
    },
    /// Copy every node and relationship from one backend to another.
    Transfer {
        #[clap(long)]
        source: AdapterType,
        #[clap(long)]
        target: AdapterType,
        #[clap(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum TokenCommands {
    Create {
        name: String,
        #[clap(long, value_delimiter = ',', default_value = "read")]
        scopes: Vec<String>,
        #[clap(long, value_delimiter = ',', default_value = "private")]
        instance_access: Vec<String>,
        #[clap(long)]
        expires_in_seconds: Option<u64>,
    },
    List,
    Revoke { hash_prefix: String },
    Rotate { hash_prefix: String },
}

/// Embedding-provider management: the concrete providers (OpenAI, local,
/// Ollama) are an external collaborator (Non-goal), so these arms surface
/// that boundary rather than implement it.
#[derive(Debug, Subcommand)]
pub enum ModelsCommands {
    List,
    Status,
    Validate,
    Clear,
    Path,
    Import { path: String },
}

pub async fn run(app: &Application, cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Status => cmd_status(app).await,
        Commands::Index { url, branch, local_path } => cmd_index(app, url, branch, local_path).await,
        Commands::Update { repository } => cmd_update(app, &repository).await,
        Commands::UpdateAll => cmd_update_all(app).await,
        Commands::Remove { repository } => cmd_remove(app, &repository).await,
        Commands::ResetUpdate { repository, recover, force } => {
            cmd_reset_update(app, &repository, recover, force).await
        }
        Commands::Graph(GraphCommands::Populate { repository, force }) => {
            cmd_graph_populate(app, &repository, force).await
        }
        Commands::Graph(GraphCommands::Transfer { source, target, dry_run }) => {
            cmd_graph_transfer(app, source, target, dry_run).await
        }
        Commands::Token(sub) => cmd_token(app, sub).await,
        Commands::Models(sub) => cmd_models(sub).await,
    }
}

async fn cmd_status(app: &Application) -> anyhow::Result<i32> {
    let repos = app.repo_store.list().await?;
    println!("{}", serde_json::to_string_pretty(&repos)?);
    Ok(0)
}

async fn cmd_index(
    app: &Application,
    url: String,
    branch: String,
    local_path: Option<String>,
) -> anyhow::Result<i32> {
    let name = RepositoryInfo::derive_name(&url);
    if app.repo_store.get(&name).await?.is_some() {
        println!("{}", json!({"error": "repository already registered"}));
        return Ok(1);
    }
    let info = RepositoryInfo::new(&url, branch, local_path);
    app.repo_store.create(&info).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(0)
}

async fn cmd_update(app: &Application, repository: &str) -> anyhow::Result<i32> {
    match app.coordinator.update_repository(repository).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(0)
        }
        Err(err) => {
            println!("{}", json!({"error": err.to_string()}));
            Ok(1)
        }
    }
}

async fn cmd_update_all(app: &Application) -> anyhow::Result<i32> {
    let repos = app.repo_store.list().await?;
    let mut any_failed = false;
    let mut results = Vec::new();
    for repo in repos.into_iter().filter(|r| r.status == RepositoryStatus::Ready) {
        match app.coordinator.update_repository(&repo.name).await {
            Ok(result) => results.push(json!({"repository": repo.name, "result": result})),
            Err(err) => {
                any_failed = true;
                results.push(json!({"repository": repo.name, "error": err.to_string()}));
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(if any_failed { 1 } else { 0 })
}

async fn cmd_remove(app: &Application, repository: &str) -> anyhow::Result<i32> {
    app.repo_store.delete(repository).await?;
    println!("{}", json!({"removed": repository}));
    Ok(0)
}

async fn cmd_reset_update(app: &Application, repository: &str, recover: bool, force: bool) -> anyhow::Result<i32> {
    let info = app.repo_store.require(repository).await?;
    if !recover {
        if !info.update_in_progress && !force {
            println!("{}", json!({"error": "no update in progress; pass --force to clear anyway"}));
            return Ok(1);
        }
        app.repo_store.clear_update_marker(repository).await?;
        println!("{}", json!({"repository": repository, "marker_cleared": true}));
        return Ok(0);
    }

    let strategy = evaluate_recovery_strategy(&info);
    if !strategy.can_auto_recover && !force {
        println!("{}", serde_json::to_string_pretty(&strategy)?);
        return Ok(1);
    }
    let deps = RecoveryDeps {
        repo_store: app.repo_store.clone(),
        coordinator: app.coordinator.clone(),
        full_reindex: Arc::new(|repository: String| {
            Box::pin(async move {
                anyhow::bail!("full reindex for {repository} requires the external scan/clone collaborator")
            })
        }),
    };
    execute_recovery(&info, &strategy, &deps).await?;
    let failed = matches!(strategy.kind, RecoveryKind::ManualRequired);
    println!("{}", serde_json::to_string_pretty(&strategy)?);
    Ok(if failed { 1 } else { 0 })
}

async fn cmd_graph_populate(app: &Application, repository: &str, force: bool) -> anyhow::Result<i32> {
    let info = app.repo_store.require(repository).await?;
    let Some(local_path) = info.local_path.as_deref() else {
        println!("{}", json!({"error": "repository has no local checkout"}));
        return Ok(1);
    };
    if !force && info.status != RepositoryStatus::Ready {
        println!("{}", json!({"error": "repository is not ready; pass --force to proceed anyway"}));
        return Ok(1);
    }
    let result = ingest_repository(repository, std::path::Path::new(local_path), app.graph_adapter.clone()).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(0)
}

async fn cmd_graph_transfer(
    app: &Application,
    source: AdapterType,
    target: AdapterType,
    dry_run: bool,
) -> anyhow::Result<i32> {
    let source_adapter = create_graph_adapter(source, graph_config_for(&app.config, source));
    let target_adapter = create_graph_adapter(target, graph_config_for(&app.config, target));
    let mode = if dry_run { MigrationMode::DryRun } else { MigrationMode::Apply };
    let report = migrate(source_adapter, target_adapter, mode).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.errors.is_empty() { 0 } else { 1 })
}

fn graph_config_for(config: &crate::application::Configuration, kind: AdapterType) -> AdapterConfig {
    let base = AdapterConfig::default();
    match kind {
        AdapterType::Neo4j => AdapterConfig {
            uri: config.neo4j_uri.clone(),
            username: config.neo4j_user.clone(),
            password: config.neo4j_password.clone(),
            ..base
        },
        AdapterType::FalkorDb => AdapterConfig { uri: config.falkordb_url.clone(), ..base },
    }
}

async fn cmd_token(app: &Application, sub: TokenCommands) -> anyhow::Result<i32> {
    match sub {
        TokenCommands::Create { name, scopes, instance_access, expires_in_seconds } => {
            let params = crate::auth::GenerateTokenParams { name, scopes, instance_access, expires_in_seconds };
            match app.token_service.generate_token(params) {
                Ok(token) => {
                    println!("{}", serde_json::to_string_pretty(&json!({
                        "token": token.raw_token,
                        "metadata": token.metadata,
                    }))?);
                    Ok(0)
                }
                Err(err) => {
                    println!("{}", json!({"error": err.to_string()}));
                    Ok(1)
                }
            }
        }
        TokenCommands::List => {
            println!("{}", serde_json::to_string_pretty(&app.token_service.list())?);
            Ok(0)
        }
        TokenCommands::Revoke { hash_prefix } => {
            let matches = app.token_service.find_by_hash_prefix(&hash_prefix);
            let Some(found) = matches.first() else {
                println!("{}", json!({"error": "no token matches that prefix"}));
                return Ok(1);
            };
            app.token_service.revoke_token(&found.token_hash)?;
            println!("{}", json!({"revoked": found.token_hash}));
            Ok(0)
        }
        TokenCommands::Rotate { hash_prefix } => {
            let matches = app.token_service.find_by_hash_prefix(&hash_prefix);
            let Some(found) = matches.first() else {
                println!("{}", json!({"error": "no token matches that prefix"}));
                return Ok(1);
            };
            let rotated = app.token_service.rotate_token(&found.token_hash)?;
            println!("{}", serde_json::to_string_pretty(&json!({
                "token": rotated.raw_token,
                "metadata": rotated.metadata,
            }))?);
            Ok(0)
        }
    }
}

/// The embedding provider concrete implementation is supplied by the caller
/// of `Application::initialize`, not by this CLI; model-catalogue verbs have
/// no component API to dispatch into and surface that boundary explicitly.
async fn cmd_models(sub: ModelsCommands) -> anyhow::Result<i32> {
    let verb = match sub {
        ModelsCommands::List => "list",
        ModelsCommands::Status => "status",
        ModelsCommands::Validate => "validate",
        ModelsCommands::Clear => "clear",
        ModelsCommands::Path => "path",
        ModelsCommands::Import { .. } => "import",
    };
    println!(
        "{}",
        json!({"error": format!("models {verb} requires a concrete embedding provider implementation, which is supplied externally")})
    );
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }
}

//! # Sparkify ETL
//!
//! ## Visão Geral
//! Carrega os datasets de metadados de músicas e de logs de atividade (JSON
//! Lines) num modelo estrela em SQLite: dimensões `songs`, `artists`, `time`,
//! `users` e a fato `songplays`.
//!
//! ## Princípios de Engenharia
//! - **Fail-Fast**: O primeiro erro encerra a execução com status não zero.
//! - **Commit por arquivo**: Arquivos já processados permanecem; o que falhou é desfeito.
//! - **Idempotência nas dimensões**: Reexecutar não duplica dimensões, só reproduções.

mod discovery;
mod errors;
mod impl_errors;
mod loader;
mod models;
mod pipeline;
mod processor;
mod records;
mod schema;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::errors::EtlError;
use crate::models::Config;
use crate::processor::{FileProcessor, process_log_file, process_song_file};

#[derive(Parser, Debug)]
#[command(version, about = "Carga dos datasets Sparkify num modelo estrela SQLite")]
struct CliArgs {
    /// Arquivo TOML de configuração (padrão: sparkify.toml, se existir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Banco SQLite de destino, sobrepõe `database.path`
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Desliga a barra de progresso no stderr
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove e recria as cinco tabelas
    CreateTables,
    /// Carrega o dataset de músicas (songs, artists)
    Songs { path: Option<PathBuf> },
    /// Carrega o dataset de logs (time, users, songplays)
    Logs { path: Option<PathBuf> },
    /// Músicas e depois logs (padrão)
    Run,
}

fn init_tracing() {
    // Logs no stderr: o stdout fica só com as linhas de progresso.
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();
}

fn load_dataset(
    conn: &mut Connection,
    config: &Config,
    name: &str,
    root: &Path,
    func: FileProcessor,
) -> Result<(), EtlError> {
    info!("Dataset {}: {}", name, root.display());
    let summary = pipeline::process_data(
        conn,
        root,
        &config.data.extension,
        func,
        config.pipeline.progress_bar,
        &mut std::io::stdout(),
    )?;
    summary.log(name);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let global_timer = Instant::now();
    let cli_args = CliArgs::parse();
    init_tracing();

    let mut config = Config::resolve(cli_args.config.as_deref())?;
    if let Some(database) = cli_args.database {
        config.database.path = database;
    }
    if cli_args.no_progress {
        config.pipeline.progress_bar = false;
    }

    // Conexão única para toda a execução; fechada no drop em qualquer saída.
    let mut conn = Connection::open(&config.database.path).map_err(EtlError::from)?;
    info!("Banco: {}", config.database.path.display());

    match cli_args.command.unwrap_or(Command::Run) {
        Command::CreateTables => schema::reset_schema(&mut conn)?,
        Command::Songs { path } => {
            schema::ensure_ready(&conn)?;
            let root = path.unwrap_or_else(|| config.data.song_data.clone());
            load_dataset(&mut conn, &config, "songs", &root, process_song_file)?;
        }
        Command::Logs { path } => {
            schema::ensure_ready(&conn)?;
            let root = path.unwrap_or_else(|| config.data.log_data.clone());
            load_dataset(&mut conn, &config, "logs", &root, process_log_file)?;
        }
        Command::Run => {
            schema::ensure_ready(&conn)?;
            // Músicas primeiro: a busca de ids das reproduções depende delas.
            load_dataset(&mut conn, &config, "songs", &config.data.song_data, process_song_file)?;
            load_dataset(&mut conn, &config, "logs", &config.data.log_data, process_log_file)?;
        }
    }

    info!("Tempo de execução: {:.2?}", global_timer.elapsed());
    Ok(())
}

// src/main.rs
// ---------------------------------------------------------------------------
// CLI do resolvedor de táticas: `solve` roda um lote de FENs contra o motor,
// `export` converte as soluções brutas em puzzles canônicos.
// ---------------------------------------------------------------------------

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

mod config;
mod engine;
mod line;
mod material;
mod puzzle;
mod runner;
mod score;
mod solver;

/// Args CLI - Argumentos da linha de comando
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    #[arg(long, default_value = "info")]
    pub log_level: String,                                    // Nível de logging
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve um lote de puzzles (um FEN por linha)
    Solve {
        #[arg(short, long)]
        puzzles: PathBuf,                                     // Arquivo de FENs
        #[arg(short, long)]
        solutions: PathBuf,                                   // JSONL de soluções (entrada e saída)
        #[arg(short, long, default_value_t = 1)]
        number: u32,                                          // Puzzles novos a tentar
        #[arg(short, long)]
        engine: Option<String>,                               // Caminho do motor UCI
        #[arg(short = 'S', long)]
        settings: Option<PathBuf>,                            // Arquivo JSON de configurações
    },
    /// Exporta soluções brutas como puzzles canônicos
    Export {
        #[arg(short, long)]
        solutions: PathBuf,                                   // JSONL de soluções brutas
        #[arg(short, long)]
        output: PathBuf,                                      // JSONL de puzzles canônicos
    },
}

/// Configura o logger com o nível especificado
fn setup_logger(level: &str) {
    env_logger::Builder::new()
        .filter_level(level.parse().unwrap_or(log::LevelFilter::Info))
        .init();
}

/// Sinal de cancelamento: Ctrl-C liga a flag consultada entre gerações
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.store(true, Ordering::Relaxed);
        }
    });
    flag
}

/// Ponto de entrada principal do programa
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(&args.log_level);

    match args.command {
        Command::Solve {
            puzzles,
            solutions,
            number,
            engine,
            settings,
        } => {
            let solve_args = runner::SolveArgs {
                puzzles,
                solutions,
                number,
                engine_path: engine,
                settings,
            };
            let summary = runner::run_batch(&solve_args, interrupt_flag())
                .await
                .context("erro resolvendo puzzles")?;
            info!(
                "lote encerrado: {}/{} resolvidos{}",
                summary.solved,
                summary.attempted,
                if summary.interrupted { " (interrompido)" } else { "" }
            );
        }
        Command::Export { solutions, output } => {
            let (exported, skipped) = runner::export_puzzles(&solutions, &output)
                .context("erro exportando puzzles")?;
            info!("exportados: {exported} | sem solução: {skipped}");
        }
    }

    Ok(())
}

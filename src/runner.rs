// src/runner.rs
// ---------------------------------------------------------------------------
// Fronteira por-puzzle do resolvedor.
//  • Retoma de um arquivo de soluções JSONL (FENs já vistos são pulados)
//  • Motor aberto por puzzle e liberado em qualquer saída (sucesso,
//    CannotSolve, cancelamento, erro fatal)
//  • Sonda a categoria antes de resolver para escolher a configuração de
//    mate quando for o caso
// ---------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
    time::Instant,
};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::{
    config::{self, Settings, SolverConf},
    engine::{Engine, UciEngine},
    line::{CannotSolve, Category},
    puzzle::{normalize_fen, Puzzle},
    solver::{Interrupted, SolveReport, Solver},
};

/// Parâmetros do lote de resolução.
pub struct SolveArgs {
    pub puzzles: PathBuf,       // Arquivo com um FEN por linha
    pub solutions: PathBuf,     // JSONL de saída (e fonte da retomada)
    pub number: u32,            // Quantos puzzles novos tentar
    pub engine_path: Option<String>,
    pub settings: Option<PathBuf>,
}

/// Resultado do lote.
pub struct RunSummary {
    pub attempted: u64,
    pub solved: u64,
    pub interrupted: bool,
}

// ---------------------------------------------------------------------------
// Configuração
// ---------------------------------------------------------------------------

/// Carrega as configurações do arquivo indicado, da variável de ambiente ou
/// usa o padrão.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return Settings::load(path);
    }
    if let Ok(path) = std::env::var(config::SETTINGS_ENV) {
        return Settings::load(Path::new(&path));
    }
    Ok(Settings::default())
}

/// Caminho do motor: argumento > variável de ambiente > configurações.
pub fn resolve_engine_path(explicit: Option<&str>, settings: &Settings) -> Result<String> {
    let path = explicit
        .map(str::to_string)
        .or_else(|| std::env::var(config::ENGINE_PATH_ENV).ok())
        .unwrap_or_else(|| settings.engine_path.clone());

    if path.is_empty() {
        bail!("caminho do motor não configurado");
    }
    Ok(path)
}

// ---------------------------------------------------------------------------
// Retomada
// ---------------------------------------------------------------------------

/// Carrega as soluções já gravadas, chaveadas pelo FEN normalizado, na
/// ordem do arquivo.
pub fn load_solved(path: &Path) -> Result<IndexMap<String, SolveReport>> {
    let mut solved = IndexMap::new();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(solved),
        Err(e) => return Err(e).with_context(|| format!("abrir {}", path.display())),
    };

    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SolveReport>(&line) {
            Ok(report) => {
                solved.insert(normalize_fen(&report.fen), report);
            }
            Err(e) => warn!("solução ilegível na linha {}: {e}", n + 1),
        }
    }
    Ok(solved)
}

fn append_solution(file: &mut File, report: &SolveReport) -> Result<()> {
    let json = serde_json::to_string(report)?;
    writeln!(file, "{json}").context("gravar solução")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Lote
// ---------------------------------------------------------------------------

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.blue} {msg} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn print_resume_summary(solved: &IndexMap<String, SolveReport>) {
    let with_solution = solved.values().filter(|r| r.is_solved).count();
    println!("{}", "-".repeat(100));
    println!("{}", format!("Puzzles resolvidos: {with_solution}").green());
    println!(
        "{}",
        format!("Puzzles sem solução: {}", solved.len() - with_solution).red()
    );
    println!("{}", format!("Total: {}", solved.len()).green());
    println!("{}", "-".repeat(100));
}

/// Resolve um puzzle com o motor já aberto: sonda a categoria, escolhe a
/// configuração e roda o solver de verdade.
async fn solve_one(
    engine: &mut UciEngine,
    fen: &str,
    settings: &Settings,
    interrupt: Arc<AtomicBool>,
) -> Result<(Category, SolveReport)> {
    let probe_conf = SolverConf {
        max_line_length: 1,
        ..settings.solver_conf()
    };
    let mut probe = Solver::new(engine, probe_conf);
    let category = probe.probe_category(fen).await?;
    drop(probe);

    let conf = if category == Category::Mate {
        settings.mate_solver_conf()
    } else {
        settings.solver_conf()
    };

    let mut solver = Solver::new(engine, conf).with_interrupt(interrupt);
    let outcome = solver.solve(fen).await;
    let report = solver.report();
    outcome.map(|()| (category, report))
}

/// Percorre o arquivo de puzzles e tenta resolver `number` FENs ainda não
/// vistos, gravando cada resultado no JSONL de soluções.
pub async fn run_batch(args: &SolveArgs, interrupt: Arc<AtomicBool>) -> Result<RunSummary> {
    let settings = load_settings(args.settings.as_deref())?;
    let engine_path = resolve_engine_path(args.engine_path.as_deref(), &settings)?;
    debug!("configurações em uso: {settings:?}");
    info!("motor: {engine_path}");

    let solved = load_solved(&args.solutions)?;
    print_resume_summary(&solved);

    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.solutions)
        .with_context(|| format!("abrir {}", args.solutions.display()))?;

    let puzzles = File::open(&args.puzzles)
        .with_context(|| format!("abrir {}", args.puzzles.display()))?;

    let pb = progress_bar(u64::from(args.number));
    let mut summary = RunSummary {
        attempted: 0,
        solved: 0,
        interrupted: false,
    };

    for line in BufReader::new(puzzles).lines() {
        let fen = normalize_fen(&line?);
        if fen.is_empty() || solved.contains_key(&fen) {
            continue;
        }
        if summary.attempted >= u64::from(args.number) {
            break;
        }
        if interrupt.load(std::sync::atomic::Ordering::Relaxed) {
            summary.interrupted = true;
            break;
        }

        pb.set_message(fen.clone());

        // Motor novo por puzzle: tabelas de hash zeradas, sem contaminação
        let mut engine = UciEngine::spawn(&engine_path).await?;
        let started = Instant::now();
        let outcome = solve_one(&mut engine, &fen, &settings, interrupt.clone()).await;
        let _ = engine.quit().await;
        drop(engine);

        match outcome {
            Ok((category, report)) => {
                append_solution(&mut out, &report)?;
                let puzzle = Puzzle::from_report(&report)?;
                pb.println(format!("{}", format!("Resolvido em {:.2?}", started.elapsed()).green()));
                pb.println(format!(
                    "{}",
                    format!(
                        "Categoria: {category:?} | Soluções: {}",
                        puzzle.solutions_number()
                    )
                    .green()
                ));
                summary.solved += 1;
            }
            Err(e) if e.is::<CannotSolve>() => {
                append_solution(
                    &mut out,
                    &SolveReport {
                        fen: fen.clone(),
                        is_solved: false,
                        lines: Vec::new(),
                    },
                )?;
                pb.println(format!("{}", format!("Sem solução limpa: {fen}").red()));
            }
            Err(e) if e.is::<Interrupted>() => {
                // nada é persistido para o puzzle cancelado
                pb.println(format!("{}", "Interrompido, parando o lote".red()));
                summary.interrupted = true;
                break;
            }
            Err(e) => return Err(e),
        }

        summary.attempted += 1;
        pb.inc(1);
    }

    pb.finish_with_message("lote concluído");
    info!(
        "tentados: {} | resolvidos: {}",
        summary.attempted, summary.solved
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Exportação para a forma canônica
// ---------------------------------------------------------------------------

/// Converte um JSONL de soluções brutas em registros canônicos de puzzle.
/// Devolve (exportados, pulados).
pub fn export_puzzles(solutions: &Path, output: &Path) -> Result<(u64, u64)> {
    let solved = load_solved(solutions)?;
    let mut out = File::create(output)
        .with_context(|| format!("criar {}", output.display()))?;

    let mut exported = 0u64;
    let mut skipped = 0u64;

    for report in solved.values() {
        if !report.is_solved {
            skipped += 1;
            continue;
        }
        let puzzle = Puzzle::from_report(report)?;
        writeln!(out, "{}", serde_json::to_string(&puzzle)?).context("gravar puzzle")?;
        exported += 1;
    }

    info!("puzzles exportados: {exported} (pulados: {skipped})");
    Ok((exported, skipped))
}

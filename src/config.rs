// Configurações centralizadas do resolvedor de táticas

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::engine::{Limit, SearchConf};

// Limiares de pontuação
pub const WINNING_SCORE: i32 = 270;       // Avaliação mínima (cp) para considerar um lance vencedor
pub const CP_CLOSE_SCORE: i32 = 100;      // Distância máxima (cp) entre lances equivalentes
pub const MATE_CLOSE_SCORE: i32 = 3;      // Distância máxima (plies) entre mates equivalentes
pub const SIMILARITY_FACTOR: f64 = 5.0 / 3.0; // Fator proporcional de proximidade para cp

// Limites do solver
pub const MAX_NUMBER_BEST_MOVES: usize = 2;       // Candidatos por expansão (multipv - 1)
pub const MAX_LINE_LENGTH: usize = 24;            // Lances máximos por linha
pub const MAX_LINES_NUMBER: usize = 30;           // Linhas abertas + fechadas máximas
pub const MATE_MAX_NUMBER_BEST_MOVES: usize = 15; // Variante para puzzles de mate
pub const MATE_MAX_LINES_NUMBER: usize = 300;

// Busca no motor
pub const SEARCH_DEPTH: u32 = 29;      // Profundidade padrão de análise
pub const MATE_SEARCH_DEPTH: u32 = 20; // Profundidade para puzzles de mate
pub const MULTIPV: u32 = 3;            // Slots multi-PV no lance do jogador
pub const MATE_MULTIPV: u32 = 16;
pub const THREADS: u32 = 4;            // Threads para análise single-PV
pub const MULTI_THREADS: u32 = 8;      // Threads para análise multi-PV
pub const HASH_MB: u32 = 1024;

// Variável de ambiente consultada quando a CLI não informa o caminho/arquivo
pub const ENGINE_PATH_ENV: &str = "TACTIC_SOLVER_ENGINE_PATH";
pub const SETTINGS_ENV: &str = "TACTIC_SOLVER_SETTINGS";

lazy_static! {
    /// Tabela de degraus `(piso em cp, fator)` para o limiar por faixas.
    pub static ref SIMILARITY_FACTORS: Vec<(i32, f64)> = vec![
        (1800, 2.0),
        (900, 1.8),
        (500, 5.0 / 3.0),
        (270, 300.0 / 270.0),
        (0, 1.0),
    ];
}

fn engine_options(threads: u32) -> IndexMap<String, String> {
    IndexMap::from([
        ("Threads".to_string(), threads.to_string()),
        ("Hash".to_string(), HASH_MB.to_string()),
    ])
}

// ---------------------------------------------------------------------------
// SolverConf - configuração explícita de um solver
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConf {
    pub best_move_search_conf: SearchConf,  // Análise single-PV (resposta do computador)
    pub best_moves_search_conf: SearchConf, // Análise multi-PV (candidatos do jogador)
    pub max_number_best_moves: usize,
    pub max_line_length: usize,
    pub max_lines_number: usize,
    pub winning_score: i32,
    pub cp_close_score: i32,
    pub mate_close_score: i32,
    pub similarity_factor: f64,
}

impl Default for SolverConf {
    fn default() -> Self {
        SolverConf {
            best_move_search_conf: SearchConf {
                limit: Limit::depth(SEARCH_DEPTH),
                multipv: None,
                options: engine_options(THREADS),
            },
            best_moves_search_conf: SearchConf {
                limit: Limit::depth(SEARCH_DEPTH),
                multipv: Some(MULTIPV),
                options: engine_options(MULTI_THREADS),
            },
            max_number_best_moves: MAX_NUMBER_BEST_MOVES,
            max_line_length: MAX_LINE_LENGTH,
            max_lines_number: MAX_LINES_NUMBER,
            winning_score: WINNING_SCORE,
            cp_close_score: CP_CLOSE_SCORE,
            mate_close_score: MATE_CLOSE_SCORE,
            similarity_factor: SIMILARITY_FACTOR,
        }
    }
}

// ---------------------------------------------------------------------------
// Settings - configuração global carregável de arquivo JSON
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine_path: String,
    pub solver: SolverConf,
    pub mate_search_conf: SearchConf,      // Multi-PV alargado para puzzles de mate
    pub mate_max_number_best_moves: usize,
    pub mate_max_lines_number: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            engine_path: String::new(),
            solver: SolverConf::default(),
            mate_search_conf: SearchConf {
                limit: Limit::depth(MATE_SEARCH_DEPTH),
                multipv: Some(MATE_MULTIPV),
                options: engine_options(MULTI_THREADS),
            },
            mate_max_number_best_moves: MATE_MAX_NUMBER_BEST_MOVES,
            mate_max_lines_number: MATE_MAX_LINES_NUMBER,
        }
    }
}

impl Settings {
    /// Carrega um arquivo JSON de configuração; campos ausentes ficam com o
    /// padrão.
    pub fn load(path: &Path) -> Result<Settings> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("abrir configurações {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("interpretar configurações {}", path.display()))
    }

    /// Configuração do solver para o caso comum.
    pub fn solver_conf(&self) -> SolverConf {
        self.solver.clone()
    }

    /// Configuração alargada para puzzles categorizados como mate: mais
    /// slots multi-PV e tetos maiores de candidatos e de linhas.
    pub fn mate_solver_conf(&self) -> SolverConf {
        SolverConf {
            best_moves_search_conf: self.mate_search_conf.clone(),
            max_number_best_moves: self.mate_max_number_best_moves,
            max_lines_number: self.mate_max_lines_number,
            ..self.solver.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Testes
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let conf = SolverConf::default();
        assert_eq!(conf.best_move_search_conf.multipv, None);
        assert!(conf.best_moves_search_conf.multipv.unwrap() > 1);
        assert_eq!(
            conf.max_number_best_moves,
            conf.best_moves_search_conf.multipv.unwrap() as usize - 1
        );
        assert_eq!(conf.winning_score, 270);
    }

    #[test]
    fn mate_variant_widens_the_search() {
        let settings = Settings::default();
        let mate = settings.mate_solver_conf();
        assert_eq!(mate.best_moves_search_conf.multipv, Some(MATE_MULTIPV));
        assert_eq!(mate.max_number_best_moves, MATE_MAX_NUMBER_BEST_MOVES);
        assert_eq!(mate.max_lines_number, MATE_MAX_LINES_NUMBER);
        // o restante permanece igual ao padrão
        assert_eq!(mate.best_move_search_conf, settings.solver.best_move_search_conf);
        assert_eq!(mate.max_line_length, settings.solver.max_line_length);
    }

    #[test]
    fn settings_json_overrides_defaults() {
        let parsed: Settings = serde_json::from_str(
            r#"{
                "engine_path": "/usr/bin/stockfish",
                "solver": {"max_lines_number": 10, "winning_score": 666}
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.engine_path, "/usr/bin/stockfish");
        assert_eq!(parsed.solver.max_lines_number, 10);
        assert_eq!(parsed.solver.winning_score, 666);
        // não informados continuam com o padrão
        assert_eq!(parsed.solver.max_line_length, MAX_LINE_LENGTH);
        assert_eq!(parsed.mate_max_lines_number, MATE_MAX_LINES_NUMBER);
    }

    #[test]
    fn similarity_table_has_zero_floor() {
        assert!(SIMILARITY_FACTORS.iter().any(|(floor, _)| *floor == 0));
    }
}

// src/puzzle.rs
// ---------------------------------------------------------------------------
// Canonização de puzzles resolvidos.
//  • FEN normalizado (espaços colapsados) e id = prefixo do SHA-256
//  • Linhas MATERIAL perdem os dois últimos lances (a prova, não a tática)
//    e têm o material recalculado no tabuleiro aparado
//  • Duplicatas descartadas preservando a primeira ocorrência
// ---------------------------------------------------------------------------

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shakmaty::{fen::Fen, uci::UciMove, CastlingMode, Chess, Color, Position};

use crate::line::{Category, LineRecord, PlayerColor};
use crate::material::material;
use crate::solver::SolveReport;

pub const PUZZLE_ID_LENGTH: usize = 16;

/// Linha canonizada de um puzzle persistido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleLine {
    pub category: Category,
    pub initial_comp_material: f64,
    pub initial_player_material: f64,
    pub player_material: f64,
    pub comp_material: f64,
    pub moves: Vec<String>,
}

/// Registro persistido de um puzzle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Puzzle {
    pub id: String,
    pub fen: String,
    pub player_color: PlayerColor,
    pub category: Category,
    pub lines: Vec<PuzzleLine>,
}

/// Colapsa qualquer espaço em branco do FEN em separadores únicos.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identificador estável: primeiros 16 hex do SHA-256 do FEN normalizado.
pub fn puzzle_id(normalized_fen: &str) -> String {
    let digest = Sha256::digest(normalized_fen.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..PUZZLE_ID_LENGTH].to_string()
}

/// Categoria do puzzle a partir das categorias das linhas.
pub fn puzzle_category<I>(categories: I) -> Category
where
    I: IntoIterator<Item = Category>,
{
    let mut mate = false;
    let mut material = false;
    let mut other = false;

    for cat in categories {
        match cat {
            Category::Mate => mate = true,
            Category::Material => material = true,
            _ => other = true,
        }
    }

    match (mate, material, other) {
        (true, true, false) => Category::MateMaterial,
        (true, false, false) => Category::Mate,
        (false, true, false) => Category::Material,
        _ => Category::Unknown,
    }
}

impl Puzzle {
    /// Converte a saída bruta do solver na forma canônica persistida.
    pub fn from_report(report: &SolveReport) -> Result<Puzzle> {
        let fen = normalize_fen(&report.fen);
        let board: Chess = fen
            .parse::<Fen>()
            .with_context(|| format!("FEN inválido: {fen}"))?
            .into_position(CastlingMode::Standard)?;
        let player_color = board.turn();

        let mut lines: Vec<PuzzleLine> = Vec::new();
        for record in &report.lines {
            let line = canonical_line(&board, player_color, record)?;
            if !lines.contains(&line) {
                lines.push(line);
            }
        }

        Ok(Puzzle {
            id: puzzle_id(&fen),
            fen,
            player_color: PlayerColor::from(player_color),
            category: puzzle_category(lines.iter().map(|l| l.category)),
            lines,
        })
    }

    pub fn solutions_number(&self) -> usize {
        self.lines.len()
    }
}

/// Canoniza uma linha: MATERIAL perde os dois últimos lances (padrão
/// J - C - J de fechamento); o material final é recalculado no tabuleiro
/// resultante, os iniciais ficam como o solver reportou.
fn canonical_line(board: &Chess, player_color: Color, record: &LineRecord) -> Result<PuzzleLine> {
    let keep = match record.category {
        Category::Material => record.moves.len().saturating_sub(2),
        _ => record.moves.len(),
    };
    let moves: Vec<String> = record.moves[..keep].to_vec();

    let mut replay = board.clone();
    for mv in &moves {
        let mv = mv
            .parse::<UciMove>()
            .with_context(|| format!("lance inválido: {mv}"))?
            .to_move(&replay)
            .with_context(|| format!("lance ilegal na linha: {mv}"))?;
        replay.play_unchecked(&mv);
    }

    Ok(PuzzleLine {
        category: record.category,
        initial_comp_material: record.initial_comp_material,
        initial_player_material: record.initial_player_material,
        player_material: material(&replay, player_color),
        comp_material: material(&replay, !player_color),
        moves,
    })
}

// ---------------------------------------------------------------------------
// Testes
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: Category, moves: &[&str]) -> LineRecord {
        LineRecord {
            category,
            is_closed: true,
            player_color: PlayerColor::Black,
            moves: moves.iter().map(|m| m.to_string()).collect(),
            initial_player_material: 21.5,
            initial_comp_material: 23.0,
            player_material: 0.0,
            comp_material: 0.0,
        }
    }

    // Dama preta recolhe a torre: J captura - C responde - J consolida
    const FEN: &str = "6k1/5ppp/8/8/4q3/8/2R2PPP/6K1 b - - 0 1";

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_fen("  6k1/5ppp/8/8/4q3/8/2R2PPP/6K1   b  - - 0  1 "),
            "6k1/5ppp/8/8/4q3/8/2R2PPP/6K1 b - - 0 1"
        );
        // idempotente
        let once = normalize_fen(FEN);
        assert_eq!(normalize_fen(&once), once);
    }

    #[test]
    fn id_is_stable_hex_prefix() {
        let id = puzzle_id(FEN);
        assert_eq!(id.len(), PUZZLE_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, puzzle_id(FEN));
        assert_ne!(id, puzzle_id("8/8/4k3/8/8/4K3/8/8 w - - 0 1"));
    }

    #[test]
    fn category_combinations() {
        use Category::*;
        assert_eq!(puzzle_category([Mate, Material]), MateMaterial);
        assert_eq!(puzzle_category([Material, Mate, Mate]), MateMaterial);
        assert_eq!(puzzle_category([Mate, Mate]), Mate);
        assert_eq!(puzzle_category([Material]), Material);
        assert_eq!(puzzle_category([Material, Unknown]), Unknown);
        assert_eq!(puzzle_category(Vec::<Category>::new()), Unknown);
    }

    #[test]
    fn material_line_is_trimmed_and_recomputed() {
        let report = SolveReport {
            fen: FEN.to_string(),
            is_solved: true,
            lines: vec![record(Category::Material, &["e4c2", "g1h1", "c2b2"])],
        };
        let puzzle = Puzzle::from_report(&report).unwrap();

        assert_eq!(puzzle.lines.len(), 1);
        let line = &puzzle.lines[0];
        // só o lance da tática sobra
        assert_eq!(line.moves, vec!["e4c2"]);
        // material recalculado no tabuleiro aparado: torre branca capturada
        assert_eq!(line.player_material, 9.0 + 3.0);
        assert_eq!(line.comp_material, 3.0);
        // iniciais ficam como o solver reportou
        assert_eq!(line.initial_player_material, 21.5);
        assert_eq!(line.initial_comp_material, 23.0);
    }

    #[test]
    fn mate_line_keeps_all_moves() {
        let report = SolveReport {
            fen: FEN.to_string(),
            is_solved: true,
            lines: vec![record(Category::Mate, &["e4e1"])],
        };
        let puzzle = Puzzle::from_report(&report).unwrap();
        assert_eq!(puzzle.lines[0].moves, vec!["e4e1"]);
        assert_eq!(puzzle.category, Category::Mate);
    }

    #[test]
    fn duplicate_lines_are_counted_once() {
        let report = SolveReport {
            fen: FEN.to_string(),
            is_solved: true,
            lines: vec![
                record(Category::Mate, &["e4e1"]),
                record(Category::Material, &["e4c2", "g1h1", "c2b2"]),
                record(Category::Mate, &["e4e1"]),
            ],
        };
        let puzzle = Puzzle::from_report(&report).unwrap();
        assert_eq!(puzzle.lines.len(), 2);
        assert_eq!(puzzle.lines[0].moves, vec!["e4e1"]);
        assert_eq!(puzzle.category, Category::MateMaterial);
    }

    #[test]
    fn player_color_follows_side_to_move() {
        let report = SolveReport {
            fen: format!("  {FEN}  "),
            is_solved: true,
            lines: vec![record(Category::Mate, &["e4e1"])],
        };
        let puzzle = Puzzle::from_report(&report).unwrap();
        assert_eq!(puzzle.player_color, PlayerColor::Black);
        assert_eq!(puzzle.fen, FEN);

        let json = serde_json::to_value(&puzzle).unwrap();
        assert_eq!(json["player_color"], "BLACK");
        assert_eq!(json["id"], puzzle.id.as_str());
    }

    #[test]
    fn id_depends_only_on_normalized_fen() {
        let a = SolveReport {
            fen: FEN.to_string(),
            is_solved: true,
            lines: vec![record(Category::Mate, &["e4e1"])],
        };
        let b = SolveReport {
            fen: format!("\t{FEN}\n"),
            is_solved: true,
            lines: Vec::new(),
        };
        assert_eq!(
            Puzzle::from_report(&a).unwrap().id,
            Puzzle::from_report(&b).unwrap().id
        );
    }
}

// src/score.rs
// ---------------------------------------------------------------------------
// Álgebra de pontuações do motor.
//  • Score: tipo soma Cp / Mate / MateGiven, sempre relativo a quem joga
//  • Ordenação total: Mate(0) < mates negativos < cp < mates positivos < MateGiven
//  • close(): regra de proximidade usada na seleção de candidatos
// ---------------------------------------------------------------------------

use std::cmp::Ordering;
use std::ops::Neg;

/// Pontuação relativa ao lado que joga. `Mate(n)` positivo = dá mate em n,
/// negativo = sofre mate em |n|, zero = já está em mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Cp(i32),
    Mate(i32),
    MateGiven,
}

impl Score {
    pub fn is_mate(self) -> bool {
        !matches!(self, Score::Cp(_))
    }

    /// Distância até o mate; `MateGiven` reporta 0, como `Mate(0)`.
    pub fn mate(self) -> Option<i32> {
        match self {
            Score::Cp(_) => None,
            Score::Mate(n) => Some(n),
            Score::MateGiven => Some(0),
        }
    }

    pub fn cp(self) -> Option<i32> {
        match self {
            Score::Cp(v) => Some(v),
            _ => None,
        }
    }

    // Classe de ordenação + valor dentro da classe. Para mates, menos
    // jogadas até o mate é melhor quando positivo e pior quando negativo.
    fn key(self) -> (u8, i64) {
        match self {
            Score::MateGiven => (4, 0),
            Score::Mate(n) if n > 0 => (3, -(n as i64)),
            Score::Cp(v) => (2, v as i64),
            Score::Mate(n) => (1, -(n as i64)),
        }
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Neg for Score {
    type Output = Score;

    fn neg(self) -> Score {
        match self {
            Score::Cp(v) => Score::Cp(-v),
            Score::MateGiven => Score::Mate(0),
            Score::Mate(0) => Score::MateGiven,
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

// ---------------------------------------------------------------------------
// Predicados de vitória / derrota
// ---------------------------------------------------------------------------

/// Um lance é vencedor se entrega mate ou se a avaliação fica acima do
/// limiar em centipawns.
pub fn is_winning(score: Score, threshold: i32) -> bool {
    match score {
        Score::MateGiven => true,
        Score::Mate(n) => n > 0,
        Score::Cp(v) => v >= threshold,
    }
}

pub fn is_losing(score: Score, threshold: i32) -> bool {
    is_winning(-score, threshold)
}

// ---------------------------------------------------------------------------
// Proximidade entre pontuações
// ---------------------------------------------------------------------------

/// Duas pontuações são próximas quando pertencem à mesma classe e a
/// distância fica dentro do limiar. Mate já dado (ou sofrido, mate 0)
/// nunca é próximo de nada além de si mesmo; mates de sinais opostos e
/// mate vs. cp nunca são próximos.
pub fn close(a: Score, b: Score, cp_threshold: f64, mate_threshold: i32) -> bool {
    if a == b {
        return true;
    }

    if a.mate() == Some(0) || b.mate() == Some(0) {
        return false;
    }

    match (a, b) {
        (Score::Mate(m), Score::Mate(n)) => {
            if (m < 0) != (n < 0) {
                return false;
            }
            (m - n).abs() <= mate_threshold
        }
        (Score::Cp(x), Score::Cp(y)) => f64::from((x - y).abs()) <= cp_threshold,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Extração dos melhores lances vencedores
// ---------------------------------------------------------------------------

/// Filtra as pontuações vencedoras e devolve, em ordem decrescente, o
/// melhor e todos os que ficam próximos dele.
pub fn extract_best_winning_moves(
    scores: &[Score],
    threshold: i32,
    cp_threshold: f64,
    mate_threshold: i32,
) -> Vec<Score> {
    let mut sorted: Vec<Score> = scores
        .iter()
        .copied()
        .filter(|s| is_winning(*s, threshold))
        .collect();
    sorted.sort_by(|a, b| b.cmp(a));

    let Some(&best) = sorted.first() else {
        return Vec::new();
    };

    sorted
        .into_iter()
        .filter(|s| close(best, *s, cp_threshold, mate_threshold))
        .collect()
}

/// Limiar proporcional de proximidade para a melhor pontuação cp:
/// quanto maior a vantagem, mais folga para considerar lances equivalentes.
pub fn close_score_threshold(max_score: Score, similarity_factor: f64) -> f64 {
    assert!(!max_score.is_mate(), "limiar proporcional exige cp");
    let ms = f64::from(max_score.cp().unwrap().abs());
    ms - ms / similarity_factor
}

/// Variante com fator escolhido numa tabela de degraus `(piso, fator)`.
/// A tabela precisa conter o piso 0; vale o maior piso ≤ |max_score|.
pub fn piecewise_close_threshold(max_score: Score, similarity_factors: &[(i32, f64)]) -> f64 {
    assert!(!max_score.is_mate(), "limiar proporcional exige cp");
    assert!(
        similarity_factors.iter().any(|(floor, _)| *floor == 0),
        "tabela de fatores sem piso 0"
    );

    let ms = max_score.cp().unwrap().abs();
    let factor = similarity_factors
        .iter()
        .filter(|(floor, _)| *floor <= ms)
        .max_by_key(|(floor, _)| *floor)
        .map(|(_, f)| *f)
        .unwrap();

    let ms = f64::from(ms);
    ms - ms / factor
}

// src/solver.rs
// ---------------------------------------------------------------------------
// Laço principal do resolvedor de táticas.
//  • Expande todas as linhas abertas um lance por vez: multi-PV no lance do
//    jogador, melhor resposta única no lance do computador
//  • Fecha linhas vencedoras, poda repetições, aborta nos predicados de
//    terminação (linha quebrada, candidatos demais, fundo demais, linhas
//    demais)
//  • Genérico sobre a capacidade Engine: testes usam um motor roteirizado
// ---------------------------------------------------------------------------

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shakmaty::{fen::Fen, CastlingMode, Chess, Position};

use crate::{
    config::SolverConf,
    engine::{AnalysisInfo, Engine},
    line::{CannotSolve, Category, LineId, LineRecord, LineTree},
    score::{close_score_threshold, extract_best_winning_moves, Score},
};

/// Cancelamento externo: o puzzle corrente é abandonado sem resultado.
#[derive(Debug, Clone, Copy)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resolução interrompida")
    }
}

impl std::error::Error for Interrupted {}

/// Saída bruta do solver, antes da canonização.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    pub fen: String,
    pub is_solved: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<LineRecord>,
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------
pub struct Solver<'e, E: Engine> {
    engine: &'e mut E,
    conf: SolverConf,
    tree: LineTree,
    open_lines: Vec<LineId>,
    closed_lines: Vec<LineId>,
    fen: Option<String>,
    depth: u32,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<'e, E: Engine> Solver<'e, E> {
    pub fn new(engine: &'e mut E, conf: SolverConf) -> Self {
        Solver {
            engine,
            conf,
            tree: LineTree::new(),
            open_lines: Vec::new(),
            closed_lines: Vec::new(),
            fen: None,
            depth: 0,
            interrupt: None,
        }
    }

    /// Sinal de cancelamento consultado entre gerações.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn reset(&mut self) {
        self.tree = LineTree::new();
        self.open_lines.clear();
        self.closed_lines.clear();
        self.fen = None;
        self.depth = 0;
    }

    // ---------- laço principal ----------
    pub async fn solve(&mut self, fen: &str) -> Result<()> {
        info!("{}", "-".repeat(100));
        info!("{fen}");

        self.reset();
        self.fen = Some(fen.to_string());

        let board: Chess = fen
            .parse::<Fen>()?
            .into_position(CastlingMode::Standard)?;
        assert!(!board.is_game_over(), "posição inicial já terminada");

        let root = self.tree.root(board);
        self.open_lines.push(root);

        while !self.open_lines.is_empty() {
            self.check_interrupt()?;

            // Calcula a nova geração de linhas
            let generations = self.go_deeper().await?;

            // Avalia cada linha produzida
            for &id in generations.iter().flatten() {
                self.tree.evaluate(id)?;
            }

            // O solver deve parar de buscar?
            self.should_terminate(&generations)?;

            // Poda repetições e redistribui abertas/fechadas
            let kept: Vec<LineId> = generations
                .into_iter()
                .flatten()
                .filter(|&id| !self.tree[id].has_repetition())
                .collect();
            self.closed_lines
                .extend(kept.iter().copied().filter(|&id| self.tree[id].is_closed()));
            self.open_lines = kept
                .into_iter()
                .filter(|&id| self.tree[id].is_open())
                .collect();

            debug!("Linhas abertas: {}", self.open_lines.len());
            debug!("Linhas fechadas: {}", self.closed_lines.len());
        }

        Ok(())
    }

    pub fn is_solved(&self) -> bool {
        self.open_lines.is_empty()
    }

    pub fn report(&self) -> SolveReport {
        SolveReport {
            fen: self.fen.clone().unwrap_or_default(),
            is_solved: self.is_solved(),
            lines: self
                .closed_lines
                .iter()
                .map(|&id| self.tree[id].record())
                .collect(),
        }
    }

    /// Sonda a categoria do puzzle: uma única resposta do motor na raiz e a
    /// categoria da linha resultante (usada para escolher a configuração de
    /// mate antes da resolução de verdade).
    pub async fn probe_category(&mut self, fen: &str) -> Result<Category> {
        self.reset();
        let board: Chess = fen
            .parse::<Fen>()?
            .into_position(CastlingMode::Standard)?;
        let root = self.tree.root(board);
        let next = self.next_comp_line(root).await?;
        Ok(self.tree[next[0]].category())
    }

    fn check_interrupt(&self) -> Result<()> {
        if let Some(flag) = &self.interrupt {
            if flag.load(Ordering::Relaxed) {
                info!("Cancelamento solicitado, abandonando o puzzle");
                return Err(Interrupted.into());
            }
        }
        Ok(())
    }

    // ---------- expansão ----------
    /// Avança todas as linhas abertas um lance: fan-out de candidatos no
    /// lance do jogador, resposta única no lance do computador.
    async fn go_deeper(&mut self) -> Result<Vec<Vec<LineId>>> {
        let open = self.open_lines.clone();
        let mut generations = Vec::with_capacity(open.len());

        for id in open {
            let children = if self.tree[id].is_player_move() {
                self.next_player_lines(id).await?
            } else {
                self.next_comp_line(id).await?
            };
            generations.push(children);
        }

        self.depth += 1;
        Ok(generations)
    }

    async fn next_player_lines(&mut self, id: LineId) -> Result<Vec<LineId>> {
        let infos = self.search_best_moves(id).await?;
        let best = self.pick_candidates(infos, id);

        Ok(best
            .into_iter()
            .map(|info| {
                let mv = info.pv[0].clone();
                self.tree.make_move(id, mv, Some(info))
            })
            .collect())
    }

    async fn next_comp_line(&mut self, id: LineId) -> Result<Vec<LineId>> {
        let info = self.search_best_move(id).await?;
        let mv = info.pv[0].clone();
        Ok(vec![self.tree.make_move(id, mv, Some(info))])
    }

    async fn search_best_move(&mut self, id: LineId) -> Result<AnalysisInfo> {
        let conf = &self.conf.best_move_search_conf;
        assert!(conf.multipv.is_none(), "análise de resposta única com multipv");

        let board = self.tree[id].board().clone();
        let mut infos = self.engine.analyse(&board, conf).await?;
        if infos.is_empty() || infos[0].pv.is_empty() {
            anyhow::bail!("motor não devolveu resposta para {}", self.position_of(id));
        }
        Ok(infos.swap_remove(0))
    }

    async fn search_best_moves(&mut self, id: LineId) -> Result<Vec<AnalysisInfo>> {
        let conf = &self.conf.best_moves_search_conf;
        assert!(
            conf.multipv.unwrap_or(0) > 1,
            "análise de candidatos exige multipv > 1"
        );

        let board = self.tree[id].board().clone();
        self.engine.analyse(&board, conf).await
    }

    fn position_of(&self, id: LineId) -> String {
        Fen::from_position(self.tree[id].board().clone(), shakmaty::EnPassantMode::Legal)
            .to_string()
    }

    // ---------- seleção de candidatos ----------
    /// Limiar de proximidade em cp: fixo quando o melhor lance é mate,
    /// proporcional à vantagem caso contrário.
    fn calc_cp_threshold(&self, scores: &[Score]) -> f64 {
        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| b.cmp(a));
        let best = sorted[0];

        if best.is_mate() {
            f64::from(self.conf.cp_close_score)
        } else {
            close_score_threshold(best, self.conf.similarity_factor)
        }
    }

    /// Limiar de proximidade entre mates: encolhe conforme a linha
    /// aprofunda (perto do mate sobra menos espaço para equivalentes).
    fn calc_mate_threshold(&self, id: LineId) -> i32 {
        let depth_penalty = (self.tree[id].length() / 2) as i32;
        (self.conf.mate_close_score - depth_penalty).max(0)
    }

    /// Seleciona os candidatos do jogador: pontuações vencedoras próximas
    /// da melhor, descartando slots sem PV.
    fn pick_candidates(&self, infos: Vec<AnalysisInfo>, id: LineId) -> Vec<AnalysisInfo> {
        let scores: Vec<Score> = infos.iter().filter_map(|i| i.score).collect();
        if scores.is_empty() {
            return Vec::new();
        }

        let best_scores = extract_best_winning_moves(
            &scores,
            self.conf.winning_score,
            self.calc_cp_threshold(&scores),
            self.calc_mate_threshold(id),
        );

        infos
            .into_iter()
            .filter(|i| {
                i.score.is_some_and(|s| best_scores.contains(&s)) && !i.pv.is_empty()
            })
            .collect()
    }

    // ---------- predicados de terminação ----------
    fn should_terminate(&self, generations: &[Vec<LineId>]) -> Result<()> {
        self.stop_if_broken_line(generations)?;
        self.stop_if_too_many_good_moves(generations)?;
        self.stop_if_solution_too_long(generations)?;
        self.stop_if_too_many_solutions()?;
        Ok(())
    }

    fn stop_if_broken_line(&self, generations: &[Vec<LineId>]) -> Result<()> {
        if generations.iter().any(|g| g.is_empty()) {
            info!("Linha quebrada!");
            return Err(CannotSolve.into());
        }
        Ok(())
    }

    /// Geração cujos filhos fecharam todos como vitória de material conta
    /// como solução, não como ambiguidade.
    fn winning_material_generation(&self, generation: &[LineId]) -> bool {
        generation
            .iter()
            .all(|&id| self.tree[id].is_closed() && self.tree[id].category() == Category::Material)
    }

    fn stop_if_too_many_good_moves(&self, generations: &[Vec<LineId>]) -> Result<()> {
        for generation in generations {
            if self.winning_material_generation(generation) {
                continue;
            }
            if generation.len() > self.conf.max_number_best_moves {
                info!("Lances bons demais: {}!", generation.len());
                return Err(CannotSolve.into());
            }
        }
        Ok(())
    }

    fn stop_if_solution_too_long(&self, generations: &[Vec<LineId>]) -> Result<()> {
        for &id in generations.iter().flatten() {
            if self.tree[id].length() > self.conf.max_line_length {
                info!("Solução longa demais: {}!", self.tree[id].length());
                return Err(CannotSolve.into());
            }
        }
        Ok(())
    }

    fn stop_if_too_many_solutions(&self) -> Result<()> {
        let solutions = self.open_lines.len() + self.closed_lines.len();
        if solutions > self.conf.max_lines_number {
            info!("Soluções demais: {solutions}!");
            return Err(CannotSolve.into());
        }
        Ok(())
    }

    // ---------- acesso para testes ----------
    #[cfg(test)]
    fn tree(&self) -> &LineTree {
        &self.tree
    }
}

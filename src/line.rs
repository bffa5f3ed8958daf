// src/line.rs
// ---------------------------------------------------------------------------
// Árvore de linhas do solver.
//  • Arena com índices: pai/filhos sem nós compartilhados
//  • Linha cresce só por cópia-e-extensão (make_move); fechada nunca muda
//  • Repetições rastreadas por hash Zobrist de cada posição desde a raiz
// ---------------------------------------------------------------------------

use std::fmt;
use std::ops::Index;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use shakmaty::{
    uci::UciMove,
    zobrist::{Zobrist64, ZobristHash},
    CastlingMode, Chess, Color, EnPassantMode, Move, Position,
};

use crate::engine::AnalysisInfo;
use crate::material::{decisive_gain, material};

/// Falha de domínio: o puzzle não tem um conjunto limpo de soluções.
/// Tratada apenas na fronteira por-puzzle.
#[derive(Debug, Clone, Copy)]
pub struct CannotSolve;

impl fmt::Display for CannotSolve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "puzzle sem solução limpa")
    }
}

impl std::error::Error for CannotSolve {}

// ---------------------------------------------------------------------------
// Categorias
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "MATE")]
    Mate,
    #[serde(rename = "MATERIAL")]
    Material,
    #[serde(rename = "MATE_MATERIAL")]
    MateMaterial,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerColor {
    #[serde(rename = "WHITE")]
    White,
    #[serde(rename = "BLACK")]
    Black,
}

impl From<Color> for PlayerColor {
    fn from(color: Color) -> Self {
        match color {
            Color::White => PlayerColor::White,
            Color::Black => PlayerColor::Black,
        }
    }
}

/// Forma serializada de uma linha, como sai do solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub category: Category,
    pub is_closed: bool,
    pub player_color: PlayerColor,
    pub moves: Vec<String>,
    pub initial_player_material: f64,
    pub initial_comp_material: f64,
    pub player_material: f64,
    pub comp_material: f64,
}

// ---------------------------------------------------------------------------
// Identificador de linha na arena
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(usize);

// ---------------------------------------------------------------------------
// Line - um nó da árvore de variantes
// ---------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub struct Line {
    board: Chess,
    moves: Vec<Move>,
    analysis: Vec<Option<AnalysisInfo>>,
    hashes: Vec<Zobrist64>,
    player_color: Color,
    initial_player_material: f64,
    initial_comp_material: f64,
    parent: Option<LineId>,
    children: Vec<LineId>,
    closed: bool,
    repeated_position: bool,
}

impl Line {
    fn new(board: Chess) -> Self {
        let player_color = board.turn();
        let initial_player_material = material(&board, player_color);
        let initial_comp_material = material(&board, !player_color);
        let hash = board.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);

        Line {
            board,
            moves: Vec::new(),
            analysis: Vec::new(),
            hashes: vec![hash],
            player_color,
            initial_player_material,
            initial_comp_material,
            parent: None,
            children: Vec::new(),
            closed: false,
            repeated_position: false,
        }
    }

    pub fn board(&self) -> &Chess {
        &self.board
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn length(&self) -> usize {
        self.moves.len()
    }

    pub fn player_color(&self) -> Color {
        self.player_color
    }

    pub fn parent(&self) -> Option<LineId> {
        self.parent
    }

    pub fn children(&self) -> &[LineId] {
        &self.children
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// O próximo lance é do jogador?
    pub fn is_player_move(&self) -> bool {
        self.board.turn() == self.player_color
    }

    pub fn player_material(&self) -> f64 {
        material(&self.board, self.player_color)
    }

    pub fn comp_material(&self) -> f64 {
        material(&self.board, !self.player_color)
    }

    pub fn initial_player_material(&self) -> f64 {
        self.initial_player_material
    }

    pub fn initial_comp_material(&self) -> f64 {
        self.initial_comp_material
    }

    /// Mate no computador: a posição é mate e quem jogaria é o computador.
    pub fn player_won_game(&self) -> bool {
        self.board.is_checkmate() && !self.is_player_move()
    }

    /// O saldo de material do jogador cresceu o suficiente desde a raiz
    /// (pelo menos torre menos cavalo).
    pub fn player_gained_material(&self) -> bool {
        (self.player_material() - self.comp_material())
            - (self.initial_player_material - self.initial_comp_material)
            >= decisive_gain()
    }

    /// Categoria pela última análise registrada: mate anunciado → MATE,
    /// avaliação em cp → MATERIAL, sem análise → UNKNOWN.
    pub fn category(&self) -> Category {
        match self.analysis.last() {
            None | Some(None) => Category::Unknown,
            Some(Some(info)) => match info.score {
                Some(score) if score.is_mate() => Category::Mate,
                Some(_) => Category::Material,
                None => Category::Unknown,
            },
        }
    }

    /// Repetição dupla: a posição atual já ocorreu antes nesta linha.
    pub fn is_repetition(&self) -> bool {
        self.occurrences() >= 2
    }

    pub fn has_repetition(&self) -> bool {
        self.repeated_position
    }

    fn occurrences(&self) -> usize {
        let current = *self.hashes.last().unwrap();
        self.hashes.iter().filter(|h| **h == current).count()
    }

    // Fim de jogo contando empates reclamáveis: regra dos 50 lances e
    // repetição tripla dentro da linha.
    fn is_game_over_with_claims(&self) -> bool {
        self.board.is_game_over() || self.board.halfmoves() >= 100 || self.occurrences() >= 3
    }

    pub fn record(&self) -> LineRecord {
        LineRecord {
            category: self.category(),
            is_closed: self.closed,
            player_color: PlayerColor::from(self.player_color),
            moves: self
                .moves
                .iter()
                .map(|m| UciMove::from_move(m, CastlingMode::Standard).to_string())
                .collect(),
            initial_player_material: self.initial_player_material,
            initial_comp_material: self.initial_comp_material,
            player_material: self.player_material(),
            comp_material: self.comp_material(),
        }
    }
}

// ---------------------------------------------------------------------------
// LineTree - arena dona de todas as linhas de um puzzle
// ---------------------------------------------------------------------------
#[derive(Debug, Default)]
pub struct LineTree {
    nodes: Vec<Line>,
}

impl LineTree {
    pub fn new() -> Self {
        LineTree { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Cria a linha raiz a partir da posição inicial do puzzle.
    pub fn root(&mut self, board: Chess) -> LineId {
        self.push(Line::new(board))
    }

    /// Protocolo cópia-e-extensão: deriva uma nova linha com o lance e a
    /// análise que o motivou, ligando pai e filho. O pai não pode estar
    /// fechado.
    pub fn make_move(&mut self, parent: LineId, mv: Move, info: Option<AnalysisInfo>) -> LineId {
        let parent_line = &self.nodes[parent.0];
        assert!(!parent_line.closed, "extensão de linha fechada");

        let mut line = parent_line.clone();
        line.board.play_unchecked(&mv);
        line.moves.push(mv);
        line.analysis.push(info);
        line.hashes
            .push(line.board.zobrist_hash::<Zobrist64>(EnPassantMode::Legal));
        line.parent = Some(parent);
        line.children = Vec::new();

        let id = self.push(line);
        self.nodes[parent.0].children.push(id);
        id
    }

    fn push(&mut self, line: Line) -> LineId {
        let id = LineId(self.nodes.len());
        self.nodes.push(line);
        id
    }

    /// Fecho de linha de material, sempre num lance do jogador seguindo o
    /// padrão J(ganha material) - C - J(fecha): a categoria é MATERIAL, o
    /// pai já tinha o ganho decisivo, o computador tinha escolha (pai com
    /// mais de um filho) e a linha passa de três lances.
    pub fn can_close_material_line(&self, id: LineId) -> bool {
        let line = &self[id];
        let Some(parent) = line.parent else {
            return false;
        };

        line.category() == Category::Material
            && self[parent].player_gained_material()
            && self[parent].children.len() > 1
            && line.length() > 3
    }

    /// Atualiza o estado de repetição e decide o destino da linha: fecha
    /// nas posições vencedoras, sinaliza `CannotSolve` quando o jogo acabou
    /// sem vitória do jogador.
    pub fn evaluate(&mut self, id: LineId) -> Result<()> {
        let repeated = self[id].is_repetition();
        self.nodes[id.0].repeated_position = repeated;

        if self[id].player_won_game() || self.can_close_material_line(id) {
            self.nodes[id.0].closed = true;
            return Ok(());
        }

        if self[id].is_game_over_with_claims() {
            return Err(CannotSolve.into());
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn close(&mut self, id: LineId) {
        self.nodes[id.0].closed = true;
    }
}

impl Index<LineId> for LineTree {
    type Output = Line;

    fn index(&self, id: LineId) -> &Line {
        &self.nodes[id.0]
    }
}

// ---------------------------------------------------------------------------
// Testes
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Score;
    use shakmaty::fen::Fen;

    fn board(fen: &str) -> Chess {
        fen.parse::<Fen>()
            .unwrap()
            .into_position(CastlingMode::Standard)
            .unwrap()
    }

    fn uci(pos: &Chess, mv: &str) -> Move {
        mv.parse::<UciMove>().unwrap().to_move(pos).unwrap()
    }

    fn info(score: Score) -> AnalysisInfo {
        AnalysisInfo {
            score: Some(score),
            depth: Some(24),
            seldepth: None,
            nodes: None,
            multipv: Some(1),
            pv: Vec::new(),
        }
    }

    fn extend(tree: &mut LineTree, id: LineId, mv: &str, score: Score) -> LineId {
        let mv = uci(tree[id].board(), mv);
        tree.make_move(id, mv, Some(info(score)))
    }

    // Posição da troca rainha-por-torre usada nos testes de material
    const EXCHANGE_FEN: &str = "4r1k1/8/3R1Qpp/2p5/2P1p1q1/P3P3/1P2PK2/8 b - - 0 1";
    // Sequência: J captura nada - C captura torre - J captura dama - C dá xeque
    const EXCHANGE_MOVES: [&str; 4] = ["e8f8", "f6f8", "g8f8", "d6d8"];

    fn exchange_line(tree: &mut LineTree) -> LineId {
        let mut id = tree.root(board(EXCHANGE_FEN));
        for mv in EXCHANGE_MOVES {
            id = extend(tree, id, mv, Score::Cp(-820));
        }
        id
    }

    #[test]
    fn root_snapshots_player_and_materials() {
        let mut tree = LineTree::new();
        let id = tree.root(board(EXCHANGE_FEN));
        let line = &tree[id];
        assert_eq!(line.player_color(), Color::Black);
        assert_eq!(line.initial_player_material(), line.player_material());
        assert_eq!(line.initial_comp_material(), line.comp_material());
        assert_eq!(line.length(), 0);
        assert!(line.is_open());
        assert_eq!(line.category(), Category::Unknown);
    }

    fn fen_of(pos: &Chess) -> String {
        Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string()
    }

    #[test]
    fn make_move_copies_and_links() {
        let mut tree = LineTree::new();
        let root = tree.root(board(EXCHANGE_FEN));
        let root_fen = fen_of(tree[root].board());

        let child = extend(&mut tree, root, "e8f8", Score::Cp(815));

        // pai intacto
        assert_eq!(fen_of(tree[root].board()), root_fen);
        assert!(tree[root].moves().is_empty());
        // filho estendido e ligado
        assert_eq!(tree[child].length(), 1);
        assert_eq!(tree[child].parent(), Some(root));
        assert_eq!(tree[root].children(), &[child]);
        assert_eq!(tree[child].player_color(), tree[root].player_color());
        assert_eq!(
            tree[child].initial_player_material(),
            tree[root].initial_player_material()
        );
    }

    #[test]
    #[should_panic(expected = "extensão de linha fechada")]
    fn make_move_on_closed_line_panics() {
        let mut tree = LineTree::new();
        let root = tree.root(board(EXCHANGE_FEN));
        tree.close(root);
        let mv = uci(tree[root].board(), "e8f8");
        tree.make_move(root, mv, None);
    }

    #[test]
    fn replaying_moves_reproduces_board() {
        let mut tree = LineTree::new();
        let id = exchange_line(&mut tree);

        let mut replay = board(EXCHANGE_FEN);
        for mv in tree[id].moves() {
            replay.play_unchecked(mv);
        }
        assert_eq!(fen_of(&replay), fen_of(tree[id].board()));
        assert_eq!(tree[id].length(), tree[id].moves().len());
    }

    #[test]
    fn is_player_move_alternates_with_turn() {
        // negras jogam na raiz: jogador = negras
        let mut tree = LineTree::new();
        let root = tree.root(board(EXCHANGE_FEN));
        assert!(tree[root].is_player_move());
        let c1 = extend(&mut tree, root, "e8f8", Score::Cp(815));
        assert!(!tree[c1].is_player_move());
        let c2 = extend(&mut tree, c1, "f6f8", Score::Cp(-822));
        assert!(tree[c2].is_player_move());
    }

    #[test]
    fn material_snapshot_by_color() {
        let pos = board("2r3k1/pp4pp/8/3p4/1n1PRq2/1Q3N1b/PP3P1P/RB4K1 w - - 0 1");
        let mut tree = LineTree::new();
        let id = tree.root(pos.clone());
        // brancas jogam: jogador = brancas
        assert_eq!(tree[id].player_material(), 30.5);
        assert_eq!(tree[id].comp_material(), 25.5);
        assert_eq!(material(&pos, Color::Black), 25.5);
    }

    #[test]
    fn player_gains_material_after_queen_capture() {
        let mut tree = LineTree::new();
        let id = exchange_line(&mut tree);
        let line = &tree[id];
        assert!(line.initial_comp_material() > line.comp_material());
        assert!(line.player_gained_material());
    }

    #[test]
    fn category_follows_last_analysis() {
        let mut tree = LineTree::new();
        let root = tree.root(board(EXCHANGE_FEN));
        assert_eq!(tree[root].category(), Category::Unknown);

        let cp = extend(&mut tree, root, "e8f8", Score::Cp(815));
        assert_eq!(tree[cp].category(), Category::Material);

        let mate = extend(&mut tree, cp, "f6f8", Score::Mate(11));
        assert_eq!(tree[mate].category(), Category::Mate);
    }

    #[test]
    fn can_close_material_line_needs_choice_and_gain() {
        let mut tree = LineTree::new();
        let id = exchange_line(&mut tree);
        let parent = tree[id].parent().unwrap();

        // pai ganhou material mas o computador ainda não teve escolha
        assert!(tree[parent].player_gained_material());
        assert!(!tree.can_close_material_line(id));

        // segundo filho do pai: o computador tinha alternativa
        extend(&mut tree, parent, "d6d7", Score::Cp(-810));
        assert!(tree.can_close_material_line(id));

        // raiz não tem pai
        let root = LineId(0);
        assert!(!tree.can_close_material_line(root));
    }

    #[test]
    fn evaluate_closes_material_line() {
        let mut tree = LineTree::new();
        let id = exchange_line(&mut tree);
        let parent = tree[id].parent().unwrap();
        extend(&mut tree, parent, "d6d7", Score::Cp(-810));

        tree.evaluate(id).unwrap();
        assert!(tree[id].is_closed());
    }

    #[test]
    fn player_won_game_on_checkmate() {
        let pos = board("8/2p3Q1/p1RNKP2/n2p1p2/1P1k1p1R/1p1N1P1b/3PPPrb/8 w - - 0 1");
        let mut tree = LineTree::new();
        let mut id = tree.root(pos);
        for mv in ["d3c1", "b3b2", "e2e3"] {
            id = extend(&mut tree, id, mv, Score::Mate(1));
        }
        assert!(tree[id].player_won_game());
        tree.evaluate(id).unwrap();
        assert!(tree[id].is_closed());
    }

    const SHUFFLE_FEN: &str = "8/7p/5pk1/8/2b1p3/4PqPQ/PB5P/6K1 b - - 0 1";
    const SHUFFLE_MOVES: [&str; 5] = ["f3d1", "g1f2", "d1c2", "f2g1", "c2d1"];

    #[test]
    fn repetition_detected_after_shuffle() {
        let mut tree = LineTree::new();
        let mut id = tree.root(board(SHUFFLE_FEN));
        assert!(!tree[id].is_repetition());
        for mv in SHUFFLE_MOVES {
            id = extend(&mut tree, id, mv, Score::Cp(0));
        }
        assert!(tree[id].is_repetition());
    }

    #[test]
    fn evaluate_records_repetition_flag() {
        let mut tree = LineTree::new();
        let mut id = tree.root(board(SHUFFLE_FEN));
        tree.evaluate(id).unwrap();
        assert!(!tree[id].has_repetition());

        for mv in SHUFFLE_MOVES {
            id = extend(&mut tree, id, mv, Score::Cp(0));
        }
        tree.evaluate(id).unwrap();
        assert!(tree[id].has_repetition());
        assert!(tree[id].is_open());
    }

    #[test]
    fn evaluate_fails_on_dead_draw() {
        // rei contra rei: material insuficiente
        let mut tree = LineTree::new();
        let id = tree.root(board("8/8/4k3/8/8/4K3/8/8 w - - 0 1"));
        let err = tree.evaluate(id).unwrap_err();
        assert!(err.is::<CannotSolve>());
    }

    #[test]
    fn record_serializes_uci_moves() {
        let mut tree = LineTree::new();
        let mut id = tree.root(board(SHUFFLE_FEN));
        for mv in SHUFFLE_MOVES {
            id = extend(&mut tree, id, mv, Score::Cp(120));
        }
        let record = tree[id].record();
        assert_eq!(record.category, Category::Material);
        assert!(!record.is_closed);
        assert_eq!(record.player_color, PlayerColor::Black);
        assert_eq!(record.moves, SHUFFLE_MOVES.to_vec());
        assert_eq!(record.initial_player_material, tree[id].initial_player_material());
        assert_eq!(record.player_material, tree[id].player_material());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["player_color"], "BLACK");
        assert_eq!(json["category"], "MATERIAL");
    }
}

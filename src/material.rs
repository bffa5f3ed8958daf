// src/material.rs
// ---------------------------------------------------------------------------
// Contagem de material por cor e SEE (static exchange evaluation).
// ---------------------------------------------------------------------------

use shakmaty::{Bitboard, Chess, Color, Move, Position, Role};

/// Valor fixo de cada peça, em peões. Rei fora da soma.
pub fn piece_value(role: Role) -> f64 {
    match role {
        Role::Pawn => 1.0,
        Role::Knight => 3.0,
        Role::Bishop => 3.5,
        Role::Rook => 5.0,
        Role::Queen => 9.0,
        Role::King => 0.0,
    }
}

/// Margem de ganho decisivo: trocar um cavalo por uma torre.
pub fn decisive_gain() -> f64 {
    piece_value(Role::Rook) - piece_value(Role::Knight)
}

/// Soma do material de uma cor no tabuleiro.
pub fn material(pos: &Chess, color: Color) -> f64 {
    let side = pos.board().material_side(color);

    piece_value(Role::Pawn) * f64::from(side.pawn)
        + piece_value(Role::Knight) * f64::from(side.knight)
        + piece_value(Role::Bishop) * f64::from(side.bishop)
        + piece_value(Role::Rook) * f64::from(side.rook)
        + piece_value(Role::Queen) * f64::from(side.queen)
}

// ---------------------------------------------------------------------------
// SEE - troca estática na casa de destino
// ---------------------------------------------------------------------------

/// Saldo de material assumindo a melhor sequência de capturas na casa de
/// destino: cada lado responde com o atacante de menor valor enquanto a
/// troca compensar.
pub fn see(pos: &Chess, mv: &Move) -> f64 {
    let to = mv.to();
    let mut next = pos.clone();
    next.play_unchecked(mv);

    // Quanto o lado que responde perdeu com a captura
    let victim_side = next.turn();
    let gained = material(pos, victim_side) - material(&next, victim_side);

    let board = next.board();
    let attackers: Bitboard = board.attacks_to(to, victim_side, board.occupied());

    let cheapest = attackers
        .into_iter()
        .filter_map(|sq| board.role_at(sq).map(|r| (sq, r)))
        .min_by(|a, b| piece_value(a.1).total_cmp(&piece_value(b.1)));

    let Some((from, role)) = cheapest else {
        return gained;
    };
    if gained == 0.0 {
        return gained;
    }

    let recapture = Move::Normal {
        role,
        from,
        to,
        capture: board.role_at(to),
        promotion: None,
    };
    gained - see(&next, &recapture)
}

// ---------------------------------------------------------------------------
// Testes
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::{fen::Fen, uci::UciMove, CastlingMode};

    fn board(fen: &str) -> Chess {
        fen.parse::<Fen>()
            .unwrap()
            .into_position(CastlingMode::Standard)
            .unwrap()
    }

    fn uci(pos: &Chess, mv: &str) -> Move {
        mv.parse::<UciMove>().unwrap().to_move(pos).unwrap()
    }

    #[test]
    fn white_material_sum() {
        let pos = board("r7/3kn1p1/p2pq2p/2p1p3/Pp2P3/1Q2B2P/1PP2PP1/R5K1 w - - 0 1");
        assert_eq!(material(&pos, Color::White), 24.5);
    }

    #[test]
    fn black_material_sum() {
        let pos = board("2r2rk1/pR3p1p/3R1p2/2p2q2/Q7/5N2/P4PPP/6K1 b - - 0 1");
        assert_eq!(material(&pos, Color::Black), 24.5);
    }

    #[test]
    fn starting_position_is_even() {
        let pos = Chess::default();
        assert_eq!(material(&pos, Color::White), material(&pos, Color::Black));
        assert_eq!(material(&pos, Color::White), 8.0 + 6.0 + 7.0 + 10.0 + 9.0);
    }

    #[test]
    fn see_knight_takes_defended_bishop() {
        let pos = board("1k1r4/8/3r4/2Qb4/4B3/2N3B1/8/6K1 w - - 0 1");
        let mv = uci(&pos, "c3d5");
        assert_eq!(see(&pos, &mv), 7.0);
    }

    #[test]
    fn see_empty_square_is_zero() {
        let pos = board("1k1r4/8/3r4/2Q5/4B3/2N3B1/8/6K1 w - - 0 1");
        let mv = uci(&pos, "c3d5");
        assert_eq!(see(&pos, &mv), 0.0);
    }

    #[test]
    fn see_undefended_knight() {
        let pos = board("1k1r4/ppq5/8/3pN1p1/3pn1Q1/P2KP3/1P6/5RR1 b - - 0 1");
        let mv = uci(&pos, "c7e5");
        assert_eq!(see(&pos, &mv), 3.0);
    }

    #[test]
    fn see_losing_capture() {
        let pos = board("1k6/8/3r4/4n3/8/3R4/2P5/1K1R4 b - - 0 1");
        let mv = uci(&pos, "e5d3");
        assert_eq!(see(&pos, &mv), -2.0);
    }
}

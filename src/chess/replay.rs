use crate::Error;
use crate::chess::RawGame;
use crate::chess::Side;
use shakmaty::CastlingMode;
use shakmaty::Chess;
use shakmaty::EnPassantMode;
use shakmaty::Position;
use shakmaty::fen::Fen;
use shakmaty::san::San;

/// One half-move replayed on the board: the SAN that produced the position
/// and the FEN snapshot after it was played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyRecord {
    pub ply: usize,
    pub move_number: u32,
    pub side_to_move: Side,
    pub san: String,
    pub fen: String,
}

/// Replays a game's SAN tokens from the initial position (or a FEN header)
/// and emits one snapshot per ply. Illegal SAN aborts this game only.
pub fn replay(game: &RawGame) -> Result<Vec<PlyRecord>, Error> {
    if game.moves.is_empty() {
        return Err(Error::NoMoves);
    }
    let mut board = starting_board(game)?;
    let mut records = Vec::with_capacity(game.moves.len());
    for (index, san_text) in game.moves.iter().enumerate() {
        let ply = index + 1;
        let illegal = |_| Error::IllegalMove {
            ply,
            san: san_text.clone(),
        };
        let san = San::from_ascii(san_text.as_bytes()).map_err(illegal)?;
        let mv = san.to_move(&board).map_err(|_| Error::IllegalMove {
            ply,
            san: san_text.clone(),
        })?;
        let move_number = board.fullmoves().get();
        board.play_unchecked(mv);
        records.push(PlyRecord {
            ply,
            move_number,
            side_to_move: Side::from(board.turn()),
            san: san_text.clone(),
            fen: Fen::from_position(&board, EnPassantMode::Legal).to_string(),
        });
    }
    Ok(records)
}

fn starting_board(game: &RawGame) -> Result<Chess, Error> {
    match game.tag("FEN") {
        None => Ok(Chess::default()),
        Some(fen) => fen
            .parse::<Fen>()
            .map_err(|_| Error::BadInput(format!("invalid FEN header: {fen}")))?
            .into_position(CastlingMode::Standard)
            .map_err(|_| Error::BadInput(format!("unplayable FEN header: {fen}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::GameStream;

    fn first_game(pgn: &str) -> RawGame {
        GameStream::from(pgn).next().expect("one game")
    }

    #[test]
    fn emits_one_fen_per_ply() {
        let game = first_game("1. e4 e5 2. Nf3 *\n");
        let records = replay(&game).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ply, 1);
        assert_eq!(
            records[0].fen,
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
    }

    #[test]
    fn side_to_move_flips_each_ply() {
        let game = first_game("1. d4 Nf6 2. c4 g6 *\n");
        let records = replay(&game).unwrap();
        assert_eq!(records[0].side_to_move, Side::Black);
        assert_eq!(records[1].side_to_move, Side::White);
        assert_eq!(records[2].side_to_move, Side::Black);
        assert_eq!(records[3].side_to_move, Side::White);
    }

    #[test]
    fn move_numbers_follow_full_moves() {
        let game = first_game("1. e4 c5 2. Nf3 d6 3. d4 *\n");
        let records = replay(&game).unwrap();
        assert_eq!(
            records.iter().map(|r| r.move_number).collect::<Vec<_>>(),
            vec![1, 1, 2, 2, 3]
        );
    }

    #[test]
    fn no_moves_is_an_error() {
        let game = first_game("[Event \"Empty\"]\n[Result \"*\"]\n");
        assert!(matches!(replay(&game), Err(Error::NoMoves)));
    }

    #[test]
    fn illegal_san_reports_its_ply() {
        let game = first_game("1. e4 e5 2. Ke3 *\n");
        match replay(&game) {
            Err(Error::IllegalMove { ply, san }) => {
                assert_eq!(ply, 3);
                assert_eq!(san, "Ke3");
            }
            other => panic!("expected IllegalMove, got {other:?}"),
        }
    }

    #[test]
    fn fen_header_seeds_the_board() {
        let pgn = "[SetUp \"1\"]\n[FEN \"4k3/8/8/8/8/8/4P3/4K3 w - - 0 1\"]\n\n1. e4 *\n";
        let game = first_game(pgn);
        let records = replay(&game).unwrap();
        assert_eq!(records[0].fen, "4k3/8/8/8/4P3/8/8/4K3 b - - 0 1");
    }

    #[test]
    fn castling_and_promotion_parse() {
        let game = first_game(
            "1. e4 e5 2. Nf3 Nc6 3. Bb5 Nf6 4. O-O Nxe4 5. d4 Nd6 6. Bxc6 dxc6 7. dxe5 Nf5 *\n",
        );
        assert!(replay(&game).is_ok());
    }
}

use crate::Error;
use crate::chess::GameStream;
use crate::chess::replay;

/// One offending game found during precheck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub index: usize,
    pub white: String,
    pub black: String,
    pub problem: Problem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    NoMoves,
    MissingResult,
    IllegalMove { ply: usize, san: String },
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Problem::NoMoves => write!(f, "no moves"),
            Problem::MissingResult => write!(f, "missing Result tag"),
            Problem::IllegalMove { ply, san } => write!(f, "illegal SAN `{san}` at ply {ply}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct PrecheckReport {
    pub games: usize,
    pub issues: Vec<Issue>,
}

impl PrecheckReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validates a bulk archive (TWIC issues and similar) before ingest.
/// Reports every offending game rather than stopping at the first.
pub fn precheck(bytes: &[u8]) -> Result<PrecheckReport, Error> {
    let mut report = PrecheckReport::default();
    for (index, game) in GameStream::new(bytes)?.enumerate() {
        report.games += 1;
        let white = game.tag("White").unwrap_or("?").to_string();
        let black = game.tag("Black").unwrap_or("?").to_string();
        let mut push = |problem| {
            report.issues.push(Issue {
                index,
                white: white.clone(),
                black: black.clone(),
                problem,
            })
        };
        if game.terminator.is_none() && game.tag("Result").is_none() {
            push(Problem::MissingResult);
        }
        match replay(&game) {
            Ok(_) => {}
            Err(Error::NoMoves) => push(Problem::NoMoves),
            Err(Error::IllegalMove { ply, san }) => push(Problem::IllegalMove { ply, san }),
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_archives_report_nothing() {
        let report = precheck(b"[Result \"1-0\"]\n\n1. e4 e5 1-0\n").unwrap();
        assert_eq!(report.games, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn flags_empty_games_and_missing_results() {
        let pgn = "[White \"A\"]\n[Black \"B\"]\n\n\n[White \"C\"]\n[Black \"D\"]\n\n1. e4 e5\n";
        let report = precheck(pgn.as_bytes()).unwrap();
        assert_eq!(report.games, 2);
        assert!(
            report
                .issues
                .iter()
                .any(|i| i.index == 0 && i.problem == Problem::NoMoves)
        );
        assert!(
            report
                .issues
                .iter()
                .any(|i| i.index == 1 && i.problem == Problem::MissingResult)
        );
    }

    #[test]
    fn flags_illegal_moves_without_aborting() {
        let pgn = "[Result \"*\"]\n\n1. e4 e4 *\n\n[Result \"1-0\"]\n\n1. d4 d5 1-0\n";
        let report = precheck(pgn.as_bytes()).unwrap();
        assert_eq!(report.games, 2);
        assert_eq!(report.issues.len(), 1);
        assert!(matches!(
            report.issues[0].problem,
            Problem::IllegalMove { ply: 2, .. }
        ));
    }
}

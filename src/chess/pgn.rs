use crate::Error;
use crate::chess::GameResult;

/// One game split out of a PGN stream: header tags, sanitized SAN tokens,
/// the movetext terminator, and the verbatim PGN text for storage.
#[derive(Debug, Clone, Default)]
pub struct RawGame {
    pub tags: Vec<(String, String)>,
    pub moves: Vec<String>,
    pub terminator: Option<GameResult>,
    pub text: String,
}

impl RawGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// movetext terminator wins over the Result tag
    pub fn result(&self) -> GameResult {
        self.terminator
            .or_else(|| self.tag("Result").and_then(|t| GameResult::try_from(t).ok()))
            .unwrap_or(GameResult::Unknown)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.moves.is_empty()
    }
}

/// Iterator over concatenated games in a PGN stream. The stream must be
/// valid UTF-8; games are separated by blank lines, with a tag line after
/// movetext also accepted as the start of the next game.
pub struct GameStream<'a> {
    lines: std::iter::Peekable<std::str::Lines<'a>>,
}

impl<'a> GameStream<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, Error> {
        std::str::from_utf8(bytes)
            .map(Self::from)
            .map_err(|_| Error::BadEncoding)
    }
}

impl<'a> From<&'a str> for GameStream<'a> {
    fn from(text: &'a str) -> Self {
        Self {
            lines: text.lines().peekable(),
        }
    }
}

impl Iterator for GameStream<'_> {
    type Item = RawGame;

    fn next(&mut self) -> Option<RawGame> {
        while let Some(line) = self.lines.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                self.lines.next();
            } else {
                break;
            }
        }
        let mut text = String::new();
        let mut tags = Vec::new();
        while let Some(line) = self.lines.peek() {
            let trimmed = line.trim();
            if !trimmed.starts_with('[') {
                break;
            }
            if let Some(tag) = parse_tag(trimmed) {
                tags.push(tag);
            }
            text.push_str(line);
            text.push('\n');
            self.lines.next();
        }
        while let Some(line) = self.lines.peek() {
            if line.trim().is_empty() {
                self.lines.next();
            } else {
                break;
            }
        }
        let mut movetext = String::new();
        while let Some(line) = self.lines.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.lines.next();
                break;
            }
            if trimmed.starts_with('[') {
                break;
            }
            movetext.push_str(line);
            movetext.push('\n');
            self.lines.next();
        }
        if tags.is_empty() && movetext.trim().is_empty() {
            return None;
        }
        if !movetext.is_empty() {
            text.push('\n');
            text.push_str(&movetext);
        }
        let (moves, terminator) = tokenize(&movetext);
        Some(RawGame {
            tags,
            moves,
            terminator,
            text,
        })
    }
}

fn parse_tag(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let (key, value) = inner.split_once(' ')?;
    let value = value.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some((key.to_string(), value.to_string()))
}

/// Strips comments, variations, NAGs, move numbers, and annotation glyphs,
/// leaving plain SAN tokens and the terminator.
fn tokenize(movetext: &str) -> (Vec<String>, Option<GameResult>) {
    let mut moves = Vec::new();
    let mut terminator = None;
    let mut word = String::new();
    let mut depth = 0usize;
    let mut comment = false;
    let mut semicolon = false;
    for c in movetext.chars() {
        if semicolon {
            if c == '\n' {
                semicolon = false;
            }
            continue;
        }
        if comment {
            if c == '}' {
                comment = false;
            }
            continue;
        }
        match c {
            '{' => {
                flush(&mut word, depth, &mut moves, &mut terminator);
                comment = true;
            }
            ';' => {
                flush(&mut word, depth, &mut moves, &mut terminator);
                semicolon = true;
            }
            '(' => {
                flush(&mut word, depth, &mut moves, &mut terminator);
                depth += 1;
            }
            ')' => {
                flush(&mut word, depth, &mut moves, &mut terminator);
                depth = depth.saturating_sub(1);
            }
            c if c.is_whitespace() => flush(&mut word, depth, &mut moves, &mut terminator),
            c if depth == 0 => word.push(c),
            _ => {}
        }
    }
    flush(&mut word, depth, &mut moves, &mut terminator);
    (moves, terminator)
}

fn flush(
    word: &mut String,
    depth: usize,
    moves: &mut Vec<String>,
    terminator: &mut Option<GameResult>,
) {
    if word.is_empty() {
        return;
    }
    let token = std::mem::take(word);
    if depth > 0 {
        return;
    }
    if let Ok(result) = GameResult::try_from(token.as_str()) {
        *terminator = Some(result);
        return;
    }
    if let Some(san) = sanitize(&token) {
        moves.push(san);
    }
}

fn sanitize(token: &str) -> Option<String> {
    if token.starts_with('$') {
        return None;
    }
    // zero-glyph castling shows up in scanned archives
    let token = match token {
        "0-0" => "O-O",
        "0-0-0" => "O-O-O",
        t => t,
    };
    let stripped = token.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.');
    let cleaned = stripped.trim_end_matches(['!', '?', '+', '#']);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_GAMES: &str = r#"[Event "First"]
[White "Kasparov, Garry"]
[Black "Karpov, Anatoly"]
[Result "1-0"]

1. e4 e5 2. Nf3 {main line} Nc6 3. Bb5 (3. Bc4 Bc5) 3... a6 $1 1-0

[Event "Second"]
[Result "*"]

1. d4 d5 *
"#;

    #[test]
    fn splits_concatenated_games() {
        let games = GameStream::from(TWO_GAMES).collect::<Vec<_>>();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].tag("Event"), Some("First"));
        assert_eq!(games[1].tag("Event"), Some("Second"));
        assert_eq!(games[1].moves, vec!["d4", "d5"]);
    }

    #[test]
    fn strips_comments_variations_and_nags() {
        let games = GameStream::from(TWO_GAMES).collect::<Vec<_>>();
        assert_eq!(games[0].moves, vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"]);
        assert_eq!(games[0].terminator, Some(GameResult::WhiteWins));
    }

    #[test]
    fn keeps_raw_text_for_storage() {
        let games = GameStream::from(TWO_GAMES).collect::<Vec<_>>();
        assert!(games[0].text.contains("[White \"Kasparov, Garry\"]"));
        assert!(games[0].text.contains("1. e4 e5"));
    }

    #[test]
    fn header_only_game_has_no_moves() {
        let games = GameStream::from("[Event \"Empty\"]\n[Result \"*\"]\n")
            .collect::<Vec<_>>();
        assert_eq!(games.len(), 1);
        assert!(games[0].moves.is_empty());
    }

    #[test]
    fn missing_separator_before_next_header() {
        let input = "[Event \"A\"]\n1. e4 e5 1-0\n[Event \"B\"]\n1. c4 *\n";
        let games = GameStream::from(input).collect::<Vec<_>>();
        assert_eq!(games.len(), 2);
        assert_eq!(games[1].moves, vec!["c4"]);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let bytes = [0x5b, 0xff, 0xfe, 0x5d];
        assert!(matches!(
            GameStream::new(&bytes),
            Err(Error::BadEncoding)
        ));
    }

    #[test]
    fn zero_glyph_castling_is_normalized() {
        let games = GameStream::from("1. e4 e5 2. Ke2 Ke7 3. 0-0 *\n").collect::<Vec<_>>();
        assert_eq!(games[0].moves.last().map(String::as_str), Some("O-O"));
    }

    #[test]
    fn annotation_suffixes_are_trimmed() {
        let games = GameStream::from("1. e4! e5?? 2. Nf3+ Nc6# *\n").collect::<Vec<_>>();
        assert_eq!(games[0].moves, vec!["e4", "e5", "Nf3", "Nc6"]);
    }
}

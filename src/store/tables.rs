use const_format::concatcp;

pub const PLAYERS: &str = "players";
pub const GAMES: &str = "games";
pub const POSITIONS: &str = "positions";
pub const JOBS: &str = "embedding_jobs";

/// Idempotent DDL, executed once per connection at startup.
#[rustfmt::skip]
pub fn creates() -> &'static str {
    concatcp!(
        "CREATE TABLE IF NOT EXISTS ", PLAYERS, " (
            id        BIGSERIAL PRIMARY KEY,
            name      TEXT NOT NULL,
            fed_id    TEXT,
            peak_elo  INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_players_identity
            ON ", PLAYERS, " (name, COALESCE(fed_id, ''));
        CREATE TABLE IF NOT EXISTS ", GAMES, " (
            id            BIGSERIAL PRIMARY KEY,
            white_id      BIGINT NOT NULL REFERENCES ", PLAYERS, " (id),
            black_id      BIGINT NOT NULL REFERENCES ", PLAYERS, " (id),
            event         TEXT,
            site          TEXT,
            round         TEXT,
            played_on     DATE,
            result        TEXT NOT NULL,
            eco_code      TEXT,
            opening_slug  TEXT,
            opening_name  TEXT,
            white_elo     INTEGER,
            black_elo     INTEGER,
            pgn           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_opening_slug ON ", GAMES, " (opening_slug);
        CREATE INDEX IF NOT EXISTS idx_games_eco_code     ON ", GAMES, " (eco_code);
        CREATE INDEX IF NOT EXISTS idx_games_white_elo    ON ", GAMES, " (white_elo);
        CREATE INDEX IF NOT EXISTS idx_games_black_elo    ON ", GAMES, " (black_elo);
        CREATE INDEX IF NOT EXISTS idx_games_played_on    ON ", GAMES, " (played_on);
        CREATE TABLE IF NOT EXISTS ", POSITIONS, " (
            id            BIGSERIAL PRIMARY KEY,
            game_id       BIGINT NOT NULL REFERENCES ", GAMES, " (id) ON DELETE CASCADE,
            ply           INTEGER NOT NULL,
            move_number   INTEGER NOT NULL,
            side_to_move  TEXT NOT NULL,
            san           TEXT NOT NULL,
            fen           TEXT NOT NULL,
            vector_id     TEXT,
            UNIQUE (game_id, ply)
        );
        CREATE TABLE IF NOT EXISTS ", JOBS, " (
            id            BIGSERIAL PRIMARY KEY,
            position_id   BIGINT NOT NULL UNIQUE REFERENCES ", POSITIONS, " (id) ON DELETE CASCADE,
            fen           TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            attempts      INTEGER NOT NULL DEFAULT 0,
            last_error    TEXT,
            enqueued_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            started_at    TIMESTAMPTZ,
            completed_at  TIMESTAMPTZ
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_status_enqueued ON ", JOBS, " (status, enqueued_at);"
    )
}

use crate::Elo;
use crate::Error;
use crate::OVERFETCH_FACTOR;
use crate::OVERFETCH_FLOOR;
use crate::chess::GameResult;
use crate::chess::PlyRecord;
use crate::search::Plan;
use crate::store::GAMES;
use crate::store::PLAYERS;
use crate::store::POSITIONS;
use crate::vector::PointPayload;
use chrono::NaiveDate;
use const_format::concatcp;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_postgres::Client;
use tokio_postgres::Transaction;
use tokio_postgres::types::ToSql;

/// Everything known about a game before it hits the database.
#[derive(Debug, Clone)]
pub struct GameHeader {
    pub white_id: i64,
    pub black_id: i64,
    pub event: Option<String>,
    pub site: Option<String>,
    pub round: Option<String>,
    pub played_on: Option<NaiveDate>,
    pub result: GameResult,
    pub eco_code: Option<String>,
    pub opening_slug: Option<String>,
    pub opening_name: Option<String>,
    pub white_elo: Option<Elo>,
    pub black_elo: Option<Elo>,
}

/// Metadata row returned by game search, without the PGN body.
#[derive(Debug, Clone, Serialize)]
pub struct GameSummary {
    pub id: i64,
    pub white_name: String,
    pub black_name: String,
    pub event: Option<String>,
    pub played_on: Option<NaiveDate>,
    pub result: String,
    pub eco_code: Option<String>,
    pub opening_slug: Option<String>,
    pub opening_name: Option<String>,
    pub white_elo: Option<Elo>,
    pub black_elo: Option<Elo>,
}

impl From<tokio_postgres::Row> for GameSummary {
    fn from(row: tokio_postgres::Row) -> Self {
        Self {
            id: row.get::<_, i64>(0),
            white_name: row.get::<_, String>(1),
            black_name: row.get::<_, String>(2),
            event: row.get::<_, Option<String>>(3),
            played_on: row.get::<_, Option<NaiveDate>>(4),
            result: row.get::<_, String>(5),
            eco_code: row.get::<_, Option<String>>(6),
            opening_slug: row.get::<_, Option<String>>(7),
            opening_name: row.get::<_, Option<String>>(8),
            white_elo: row.get::<_, Option<i32>>(9),
            black_elo: row.get::<_, Option<i32>>(10),
        }
    }
}

/// A summary plus the stored PGN, for agent prompts and detail views.
#[derive(Debug, Clone, Serialize)]
pub struct GameDetail {
    #[serde(flatten)]
    pub summary: GameSummary,
    pub pgn: String,
}

/// Write interface used inside the per-game ingest transaction.
#[async_trait::async_trait]
pub trait Metadata: Send + Sync {
    async fn upsert_player(
        &self,
        name: &str,
        fed_id: Option<&str>,
        peak: Option<Elo>,
    ) -> Result<i64, Error>;
    async fn insert_game(&self, header: &GameHeader, pgn: &str) -> Result<i64, Error>;
    async fn insert_positions(&self, game_id: i64, plies: &[PlyRecord])
    -> Result<Vec<i64>, Error>;
}

#[async_trait::async_trait]
impl Metadata for Transaction<'_> {
    async fn upsert_player(
        &self,
        name: &str,
        fed_id: Option<&str>,
        peak: Option<Elo>,
    ) -> Result<i64, Error> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", PLAYERS, " (name, fed_id, peak_elo) ",
            "VALUES ($1, $2, $3) ",
            "ON CONFLICT (name, COALESCE(fed_id, '')) ",
            "DO UPDATE SET peak_elo = GREATEST(", PLAYERS, ".peak_elo, EXCLUDED.peak_elo) ",
            "RETURNING id"
        );
        Ok(self
            .query_one(SQL, &[&name, &fed_id, &peak])
            .await?
            .get::<_, i64>(0))
    }

    async fn insert_game(&self, header: &GameHeader, pgn: &str) -> Result<i64, Error> {
        const DUPE: &str = concatcp!(
            "SELECT pgn ",
            "FROM   ", GAMES, " ",
            "WHERE  white_id  = $1 ",
            "AND    black_id  = $2 ",
            "AND    played_on IS NOT DISTINCT FROM $3 ",
            "AND    event     IS NOT DISTINCT FROM $4 ",
            "AND    round     IS NOT DISTINCT FROM $5"
        );
        let twins = self
            .query(
                DUPE,
                &[
                    &header.white_id,
                    &header.black_id,
                    &header.played_on,
                    &header.event,
                    &header.round,
                ],
            )
            .await?;
        if twins.iter().any(|row| row.get::<_, String>(0) == pgn) {
            return Err(Error::DuplicateGame);
        }
        const SQL: &str = concatcp!(
            "INSERT INTO ", GAMES, " ",
            "(white_id, black_id, event, site, round, played_on, result, ",
            " eco_code, opening_slug, opening_name, white_elo, black_elo, pgn) ",
            "VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) ",
            "RETURNING id"
        );
        Ok(self
            .query_one(
                SQL,
                &[
                    &header.white_id,
                    &header.black_id,
                    &header.event,
                    &header.site,
                    &header.round,
                    &header.played_on,
                    &header.result.as_str(),
                    &header.eco_code,
                    &header.opening_slug,
                    &header.opening_name,
                    &header.white_elo,
                    &header.black_elo,
                    &pgn,
                ],
            )
            .await?
            .get::<_, i64>(0))
    }

    async fn insert_positions(
        &self,
        game_id: i64,
        plies: &[PlyRecord],
    ) -> Result<Vec<i64>, Error> {
        const SQL: &str = concatcp!(
            "INSERT INTO ", POSITIONS, " ",
            "(game_id, ply, move_number, side_to_move, san, fen) ",
            "SELECT $1, t.ply, t.move_number, t.side_to_move, t.san, t.fen ",
            "FROM UNNEST($2::int4[], $3::int4[], $4::text[], $5::text[], $6::text[]) ",
            "  AS t (ply, move_number, side_to_move, san, fen) ",
            "RETURNING id, ply"
        );
        let ply = plies.iter().map(|p| p.ply as i32).collect::<Vec<i32>>();
        let move_number = plies
            .iter()
            .map(|p| p.move_number as i32)
            .collect::<Vec<i32>>();
        let side = plies
            .iter()
            .map(|p| p.side_to_move.as_str().to_string())
            .collect::<Vec<String>>();
        let san = plies.iter().map(|p| p.san.clone()).collect::<Vec<String>>();
        let fen = plies.iter().map(|p| p.fen.clone()).collect::<Vec<String>>();
        // row order from RETURNING is unspecified; realign by ply
        let mut inserted = self
            .query(SQL, &[&game_id, &ply, &move_number, &side, &san, &fen])
            .await?
            .iter()
            .map(|row| (row.get::<_, i32>(1), row.get::<_, i64>(0)))
            .collect::<Vec<(i32, i64)>>();
        inserted.sort_by_key(|(ply, _)| *ply);
        Ok(inserted.into_iter().map(|(_, id)| id).collect())
    }
}

/// Read interface behind the hybrid executor; swapped for a deterministic
/// fake in tests.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    async fn search_games(&self, plan: &Plan) -> Result<Vec<GameSummary>, Error>;
    async fn fetch_games_with_pgn(&self, ids: &[i64]) -> Result<Vec<GameDetail>, Error>;
}

#[async_trait::async_trait]
impl Retriever for Arc<Client> {
    async fn search_games(&self, plan: &Plan) -> Result<Vec<GameSummary>, Error> {
        let query = SearchQuery::from_plan(plan);
        let params = query
            .params
            .iter()
            .map(Param::as_sql)
            .collect::<Vec<&(dyn ToSql + Sync)>>();
        Ok(self
            .query(&query.sql, &params)
            .await?
            .into_iter()
            .map(GameSummary::from)
            .collect())
    }

    async fn fetch_games_with_pgn(&self, ids: &[i64]) -> Result<Vec<GameDetail>, Error> {
        const SQL: &str = concatcp!(
            "SELECT g.id, w.name, b.name, g.event, g.played_on, g.result, ",
            "       g.eco_code, g.opening_slug, g.opening_name, ",
            "       g.white_elo, g.black_elo, g.pgn ",
            "FROM   ", GAMES, " g ",
            "JOIN   ", PLAYERS, " w ON w.id = g.white_id ",
            "JOIN   ", PLAYERS, " b ON b.id = g.black_id ",
            "WHERE  g.id = ANY($1)"
        );
        let ids = ids.to_vec();
        let mut by_id = self
            .query(SQL, &[&ids])
            .await?
            .into_iter()
            .map(|row| {
                let pgn = row.get::<_, String>(11);
                let summary = GameSummary::from(row);
                (summary.id, GameDetail { summary, pgn })
            })
            .collect::<HashMap<i64, GameDetail>>();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

/// Position-level updates shared by the worker pool and the prune path.
#[async_trait::async_trait]
pub trait Positions: Send + Sync {
    async fn set_vector_id(&self, position_id: i64, vector_id: &str) -> Result<(), Error>;
    async fn position_payload(&self, position_id: i64) -> Result<PointPayload, Error>;
}

#[async_trait::async_trait]
impl Positions for Client {
    async fn set_vector_id(&self, position_id: i64, vector_id: &str) -> Result<(), Error> {
        const SQL: &str = concatcp!(
            "UPDATE ", POSITIONS, " SET vector_id = $2 WHERE id = $1"
        );
        self.execute(SQL, &[&position_id, &vector_id]).await?;
        Ok(())
    }

    async fn position_payload(&self, position_id: i64) -> Result<PointPayload, Error> {
        const SQL: &str = concatcp!(
            "SELECT p.game_id, w.name, b.name, g.white_elo, g.black_elo, ",
            "       g.opening_slug, g.eco_code, p.ply, g.result ",
            "FROM   ", POSITIONS, " p ",
            "JOIN   ", GAMES, " g ON g.id = p.game_id ",
            "JOIN   ", PLAYERS, " w ON w.id = g.white_id ",
            "JOIN   ", PLAYERS, " b ON b.id = g.black_id ",
            "WHERE  p.id = $1"
        );
        let row = self.query_one(SQL, &[&position_id]).await?;
        Ok(PointPayload {
            game_id: row.get::<_, i64>(0),
            white_name: row.get::<_, String>(1),
            black_name: row.get::<_, String>(2),
            white_elo: row.get::<_, Option<i32>>(3),
            black_elo: row.get::<_, Option<i32>>(4),
            opening_slug: row.get::<_, Option<String>>(5),
            eco_code: row.get::<_, Option<String>>(6),
            ply: row.get::<_, i32>(7),
            result: row.get::<_, String>(8),
        })
    }
}

#[async_trait::async_trait]
impl Positions for Arc<Client> {
    async fn set_vector_id(&self, position_id: i64, vector_id: &str) -> Result<(), Error> {
        self.as_ref().set_vector_id(position_id, vector_id).await
    }
    async fn position_payload(&self, position_id: i64) -> Result<PointPayload, Error> {
        self.as_ref().position_payload(position_id).await
    }
}

/// Owned SQL parameter, so the dynamically built search query stays Send.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    Text(String),
    Int(i32),
    Big(i64),
}

impl Param {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Param::Text(v) => v,
            Param::Int(v) => v,
            Param::Big(v) => v,
        }
    }
}

/// Metadata search statement assembled from a plan. Opening filters are a
/// disjunction; rating constraints are conjunctive.
pub(crate) struct SearchQuery {
    pub sql: String,
    pub params: Vec<Param>,
}

impl SearchQuery {
    pub fn from_plan(plan: &Plan) -> Self {
        let mut params = Vec::<Param>::new();
        let mut clauses = Vec::<String>::new();
        let mut opening = Vec::<String>::new();
        for slug in plan.opening_slugs() {
            params.push(Param::Text(slug.to_string()));
            opening.push(format!("g.opening_slug = ${}", params.len()));
        }
        for (lo, hi) in plan.eco_ranges() {
            params.push(Param::Text(lo.to_string()));
            let lo_at = params.len();
            params.push(Param::Text(hi.to_string()));
            opening.push(format!(
                "(g.eco_code >= ${lo_at} AND g.eco_code <= ${})",
                params.len()
            ));
        }
        if !opening.is_empty() {
            clauses.push(format!("({})", opening.join(" OR ")));
        }
        for filter in &plan.filters {
            if filter.field == "result" {
                params.push(Param::Text(filter.value.clone()));
                clauses.push(format!("g.result = ${}", params.len()));
            }
        }
        if let Some(white) = plan.rating.white_min {
            params.push(Param::Int(white));
            clauses.push(format!("g.white_elo >= ${}", params.len()));
        }
        if let Some(black) = plan.rating.black_min {
            params.push(Param::Int(black));
            clauses.push(format!("g.black_elo >= ${}", params.len()));
        }
        if let Some(delta) = plan.rating.max_rating_delta {
            params.push(Param::Int(delta));
            clauses.push(format!("ABS(g.white_elo - g.black_elo) <= ${}", params.len()));
        }
        let overfetch = std::cmp::max(plan.limit * OVERFETCH_FACTOR, OVERFETCH_FLOOR);
        params.push(Param::Big(overfetch as i64));
        let mut sql = concatcp!(
            "SELECT g.id, w.name, b.name, g.event, g.played_on, g.result, ",
            "       g.eco_code, g.opening_slug, g.opening_name, ",
            "       g.white_elo, g.black_elo ",
            "FROM   ", GAMES, " g ",
            "JOIN   ", PLAYERS, " w ON w.id = g.white_id ",
            "JOIN   ", PLAYERS, " b ON b.id = g.black_id "
        )
        .to_string();
        if !clauses.is_empty() {
            sql.push_str("WHERE  ");
            sql.push_str(&clauses.join(" AND "));
            sql.push(' ');
        }
        sql.push_str(&format!(
            "ORDER BY g.played_on DESC NULLS LAST, g.id ASC LIMIT ${}",
            params.len()
        ));
        Self { sql, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::PlanFilter;
    use crate::search::RatingFilter;

    fn plan() -> Plan {
        Plan {
            cleaned_text: "find 3 kings indian games".into(),
            limit: 3,
            filters: vec![
                PlanFilter::new("opening", "kings_indian_defense"),
                PlanFilter::new("eco_range", "E60-E99"),
            ],
            rating: RatingFilter {
                white_min: Some(2500),
                black_min: None,
                max_rating_delta: Some(100),
            },
            keywords: vec![],
        }
    }

    #[test]
    fn opening_filters_are_disjunctive() {
        let query = SearchQuery::from_plan(&plan());
        assert!(
            query
                .sql
                .contains("(g.opening_slug = $1 OR (g.eco_code >= $2 AND g.eco_code <= $3))")
        );
    }

    #[test]
    fn rating_filters_are_conjunctive() {
        let query = SearchQuery::from_plan(&plan());
        assert!(query.sql.contains("g.white_elo >= $4"));
        assert!(query.sql.contains("ABS(g.white_elo - g.black_elo) <= $5"));
        assert!(query.sql.contains("AND"));
    }

    #[test]
    fn overfetch_has_a_floor() {
        let query = SearchQuery::from_plan(&plan());
        assert_eq!(query.params.last(), Some(&Param::Big(50)));
        let mut wide = plan();
        wide.limit = 40;
        let query = SearchQuery::from_plan(&wide);
        assert_eq!(query.params.last(), Some(&Param::Big(400)));
    }

    #[test]
    fn no_filters_means_no_where_clause() {
        let empty = Plan {
            cleaned_text: String::new(),
            limit: 5,
            filters: vec![],
            rating: RatingFilter::default(),
            keywords: vec![],
        };
        let query = SearchQuery::from_plan(&empty);
        assert!(!query.sql.contains("WHERE"));
        assert!(query.sql.contains("ORDER BY g.played_on DESC NULLS LAST"));
    }
}

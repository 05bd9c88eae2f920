use crate::Elo;
use crate::Error;
use crate::chess::GameStream;
use crate::chess::RawGame;
use crate::chess::replay;
use crate::openings::Catalogue;
use crate::store::Enqueue;
use crate::store::GameHeader;
use crate::store::JobStatus;
use crate::store::Metadata;
use crate::store::Queue;
use chrono::NaiveDate;
use std::path::Path;
use tokio_postgres::Client;

/// Totals for one ingest run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub games: usize,
    pub positions: usize,
    pub skipped: usize,
}

/// Feeds parsed games through the repository and the job queue. Each game
/// commits in its own transaction, so a failed game never leaks partial rows.
pub struct Ingestor {
    client: Client,
    catalogue: Catalogue,
    max_pending: i64,
}

impl Ingestor {
    pub fn new(client: Client, catalogue: Catalogue, max_pending: i64) -> Self {
        Self {
            client,
            catalogue,
            max_pending,
        }
    }

    pub async fn run(&mut self, path: &Path) -> Result<IngestReport, Error> {
        let bytes = std::fs::read(path)?;
        let games = GameStream::new(&bytes)?.collect::<Vec<RawGame>>();
        let mut report = IngestReport::default();
        for raw in games {
            self.admit(&report).await?;
            match self.store(&raw).await {
                Ok((game_id, positions)) => {
                    println!("Stored game {game_id} with {positions} positions");
                    report.games += 1;
                    report.positions += positions;
                }
                Err(e) if e.skippable() => {
                    log::warn!(
                        "skipping game {} - {}: {}",
                        raw.tag("White").unwrap_or("?"),
                        raw.tag("Black").unwrap_or("?"),
                        e
                    );
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        log::info!(
            "ingest complete: {} games, {} positions, {} skipped",
            report.games,
            report.positions,
            report.skipped
        );
        Ok(report)
    }

    /// admission control: refuse to enqueue into a saturated backlog
    async fn admit(&self, report: &IngestReport) -> Result<(), Error> {
        if self.max_pending <= 0 {
            return Ok(());
        }
        let counts = self.client.count_by_status().await?;
        let pending = counts.get(&JobStatus::Pending).copied().unwrap_or(0);
        if pending > self.max_pending {
            log::error!(
                "aborting ingest with {} games already committed: {} pending embeddings",
                report.games,
                pending
            );
            return Err(Error::QueueSaturated { pending });
        }
        Ok(())
    }

    async fn store(&mut self, raw: &RawGame) -> Result<(i64, usize), Error> {
        let plies = replay(raw)?;
        let header = self.header(raw);
        let txn = self.client.transaction().await?;
        let white_id = txn
            .upsert_player(
                &player_name(raw.tag("White")),
                raw.tag("WhiteFideId"),
                parse_elo(raw.tag("WhiteElo")),
            )
            .await?;
        let black_id = txn
            .upsert_player(
                &player_name(raw.tag("Black")),
                raw.tag("BlackFideId"),
                parse_elo(raw.tag("BlackElo")),
            )
            .await?;
        let header = GameHeader {
            white_id,
            black_id,
            ..header
        };
        let game_id = txn.insert_game(&header, &raw.text).await?;
        let position_ids = txn.insert_positions(game_id, &plies).await?;
        for (position_id, ply) in position_ids.iter().zip(plies.iter()) {
            txn.enqueue(*position_id, &ply.fen).await?;
        }
        txn.commit().await?;
        Ok((game_id, position_ids.len()))
    }

    fn header(&self, raw: &RawGame) -> GameHeader {
        let eco_code = raw
            .tag("ECO")
            .map(str::trim)
            .filter(|eco| is_eco(eco))
            .map(str::to_string);
        let opening_name = raw
            .tag("Opening")
            .map(str::trim)
            .filter(|o| !o.is_empty() && *o != "?")
            .map(str::to_string);
        let opening_slug = eco_code
            .as_deref()
            .and_then(|eco| self.catalogue.slug_for_eco(eco))
            .or_else(|| {
                opening_name
                    .as_deref()
                    .and_then(|name| {
                        self.catalogue
                            .filters_for_text(name)
                            .first()
                            .map(|hit| hit.slug)
                    })
            })
            .map(str::to_string);
        GameHeader {
            white_id: 0,
            black_id: 0,
            event: clean_tag(raw.tag("Event")),
            site: clean_tag(raw.tag("Site")),
            round: clean_tag(raw.tag("Round")),
            played_on: parse_date(raw.tag("Date")),
            result: raw.result(),
            eco_code,
            opening_slug,
            opening_name,
            white_elo: parse_elo(raw.tag("WhiteElo")),
            black_elo: parse_elo(raw.tag("BlackElo")),
        }
    }
}

/// Queue depth summary for the stats surface.
pub async fn queue_stats(client: &Client) -> Result<Vec<(JobStatus, i64)>, Error> {
    Ok(client.count_by_status().await?.into_iter().collect())
}

fn player_name(tag: Option<&str>) -> String {
    let name = tag.unwrap_or("?").trim();
    let collapsed = name.split_whitespace().collect::<Vec<&str>>().join(" ");
    if collapsed.is_empty() {
        "?".to_string()
    } else {
        collapsed
    }
}

fn clean_tag(tag: Option<&str>) -> Option<String> {
    tag.map(str::trim)
        .filter(|t| !t.is_empty() && *t != "?")
        .map(str::to_string)
}

fn parse_elo(tag: Option<&str>) -> Option<Elo> {
    tag.and_then(|t| t.trim().parse::<Elo>().ok())
        .filter(|elo| *elo > 0)
}

/// `YYYY.MM.DD`; any `?` component makes the date unknown
fn parse_date(tag: Option<&str>) -> Option<NaiveDate> {
    let tag = tag?;
    let mut parts = tag.split('.');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn is_eco(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 3
        && bytes[0].is_ascii_uppercase()
        && bytes[0] <= b'E'
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_with_unknown_parts_are_dropped() {
        assert_eq!(parse_date(Some("2023.??.??")), None);
        assert_eq!(
            parse_date(Some("1985.11.09")),
            NaiveDate::from_ymd_opt(1985, 11, 9)
        );
        assert_eq!(parse_date(None), None);
    }

    #[test]
    fn elo_tags_tolerate_placeholders() {
        assert_eq!(parse_elo(Some("2851")), Some(2851));
        assert_eq!(parse_elo(Some("-")), None);
        assert_eq!(parse_elo(Some("")), None);
        assert_eq!(parse_elo(Some("0")), None);
    }

    #[test]
    fn eco_codes_validate_shape() {
        assert!(is_eco("E97"));
        assert!(is_eco("A00"));
        assert!(!is_eco("F10"));
        assert!(!is_eco("E9"));
        assert!(!is_eco("e97"));
    }

    #[test]
    fn player_names_collapse_whitespace() {
        assert_eq!(player_name(Some("  Kasparov,   Garry ")), "Kasparov, Garry");
        assert_eq!(player_name(None), "?");
        assert_eq!(player_name(Some("   ")), "?");
    }
}

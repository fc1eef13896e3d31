//! # Carga de dimensões e fatos
//!
//! Os transformadores só conhecem o trait [`RowSink`]: inserir uma linha
//! e buscar o par `(song_id, artist_id)` de uma reprodução. A implementação
//! SQLite trabalha sobre a transação do arquivo corrente; o commit fica com
//! o driver.

use rusqlite::{Connection, params};
use tracing::warn;

use crate::errors::EtlError;
use crate::records::{Row, format_start_time};

/// Resultado de uma inserção.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Chave natural já existente numa dimensão; a linha antiga prevalece.
    Ignored,
}

/// Identificadores resolvidos para uma reprodução.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongMatch {
    pub song_id: String,
    pub artist_id: String,
}

/// Capacidade de escrita usada pelos transformadores.
pub trait RowSink {
    fn insert(&self, row: &Row) -> Result<InsertOutcome, EtlError>;

    /// Busca pontual por título, nome do artista e duração exatos.
    ///
    /// `None` quando não há correspondência ou quando há mais de uma.
    fn find_song(
        &self,
        title: &str,
        artist: &str,
        duration: f64,
    ) -> Result<Option<SongMatch>, EtlError>;
}

const SONG_INSERT: &str = "INSERT INTO songs (song_id, title, artist_id, year, duration)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (song_id) DO NOTHING";

const ARTIST_INSERT: &str = "INSERT INTO artists (artist_id, name, location, latitude, longitude)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (artist_id) DO NOTHING";

const TIME_INSERT: &str = "INSERT INTO time (start_time, hour, day, week, month, year, weekday)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (start_time) DO NOTHING";

const USER_INSERT: &str = "INSERT INTO users (user_id, first_name, last_name, gender, level)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (user_id) DO NOTHING";

const SONGPLAY_INSERT: &str = "INSERT INTO songplays
     (start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const SONG_SELECT: &str = "SELECT s.song_id, a.artist_id
     FROM songs s
     JOIN artists a ON s.artist_id = a.artist_id
     WHERE s.title = ?1 AND a.name = ?2 AND s.duration = ?3
     LIMIT 2";

/// [`RowSink`] sobre uma conexão (na prática, a `Transaction` do arquivo).
pub struct SqliteSink<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteSink<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl RowSink for SqliteSink<'_> {
    fn insert(&self, row: &Row) -> Result<InsertOutcome, EtlError> {
        let changed = match row {
            Row::Song(s) => self.conn.prepare_cached(SONG_INSERT)?.execute(params![
                s.song_id,
                s.title,
                s.artist_id,
                s.year,
                s.duration
            ])?,
            Row::Artist(a) => self.conn.prepare_cached(ARTIST_INSERT)?.execute(params![
                a.artist_id,
                a.name,
                a.location,
                a.latitude,
                a.longitude
            ])?,
            Row::Time(t) => self.conn.prepare_cached(TIME_INSERT)?.execute(params![
                format_start_time(&t.start_time),
                t.hour,
                t.day,
                t.week,
                t.month,
                t.year,
                t.weekday
            ])?,
            Row::User(u) => self.conn.prepare_cached(USER_INSERT)?.execute(params![
                u.user_id,
                u.first_name,
                u.last_name,
                u.gender,
                u.level
            ])?,
            Row::SongPlay(p) => self.conn.prepare_cached(SONGPLAY_INSERT)?.execute(params![
                format_start_time(&p.start_time),
                p.user_id,
                p.level,
                p.song_id,
                p.artist_id,
                p.session_id,
                p.location,
                p.user_agent
            ])?,
        };

        Ok(if changed == 0 {
            InsertOutcome::Ignored
        } else {
            InsertOutcome::Inserted
        })
    }

    fn find_song(
        &self,
        title: &str,
        artist: &str,
        duration: f64,
    ) -> Result<Option<SongMatch>, EtlError> {
        let mut stmt = self.conn.prepare_cached(SONG_SELECT)?;
        let mut matches = stmt
            .query_map(params![title, artist, duration], |r| {
                Ok(SongMatch {
                    song_id: r.get(0)?,
                    artist_id: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if matches.len() > 1 {
            warn!(
                "Busca ambígua para '{}' / '{}' ({}s): reprodução fica sem ids",
                title, artist, duration
            );
            return Ok(None);
        }
        Ok(matches.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ArtistRecord, SongPlayRecord, SongRecord, TimeRecord, UserRecord};
    use crate::schema::reset_schema;

    fn db() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        reset_schema(&mut conn).unwrap();
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    fn song(id: &str, artist_id: &str, duration: f64) -> Row {
        Row::Song(SongRecord {
            song_id: id.into(),
            title: "Test".into(),
            artist_id: artist_id.into(),
            year: 2000,
            duration,
        })
    }

    fn artist(id: &str, name: &str) -> Row {
        Row::Artist(ArtistRecord {
            artist_id: id.into(),
            name: name.into(),
            location: Some("NYC".into()),
            latitude: Some(40.7),
            longitude: None,
        })
    }

    fn user(level: &str) -> Row {
        Row::User(UserRecord {
            user_id: "1".into(),
            first_name: Some("Ann".into()),
            last_name: Some("Lee".into()),
            gender: Some("F".into()),
            level: level.into(),
        })
    }

    fn play() -> Row {
        Row::SongPlay(SongPlayRecord {
            start_time: TimeRecord::from_epoch_millis(1000).unwrap().start_time,
            user_id: "1".into(),
            level: "free".into(),
            song_id: None,
            artist_id: None,
            session_id: 7,
            location: None,
            user_agent: None,
        })
    }

    #[test]
    fn duplicate_dimension_key_is_ignored() {
        let conn = db();
        let sink = SqliteSink::new(&conn);

        assert_eq!(sink.insert(&song("S1", "A1", 1.0)).unwrap(), InsertOutcome::Inserted);
        assert_eq!(sink.insert(&song("S1", "A1", 2.0)).unwrap(), InsertOutcome::Ignored);

        let duration: f64 = conn
            .query_row("SELECT duration FROM songs WHERE song_id = 'S1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(duration, 1.0);
    }

    #[test]
    fn first_user_level_wins() {
        let conn = db();
        let sink = SqliteSink::new(&conn);
        sink.insert(&user("free")).unwrap();
        assert_eq!(sink.insert(&user("paid")).unwrap(), InsertOutcome::Ignored);

        let level: String = conn
            .query_row("SELECT level FROM users WHERE user_id = '1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(level, "free");
    }

    #[test]
    fn time_row_is_keyed_by_start_time() {
        let conn = db();
        let sink = SqliteSink::new(&conn);
        let t = Row::Time(TimeRecord::from_epoch_millis(1000).unwrap());

        sink.insert(&t).unwrap();
        assert_eq!(sink.insert(&t).unwrap(), InsertOutcome::Ignored);

        let start: String = conn
            .query_row("SELECT start_time FROM time", [], |r| r.get(0))
            .unwrap();
        assert_eq!(start, "1970-01-01 00:00:01.000");
    }

    #[test]
    fn songplays_are_always_appended() {
        let conn = db();
        let sink = SqliteSink::new(&conn);
        sink.insert(&play()).unwrap();
        sink.insert(&play()).unwrap();

        assert_eq!(count(&conn, "songplays"), 2);
    }

    #[test]
    fn null_artist_coordinates_stay_null() {
        let conn = db();
        SqliteSink::new(&conn).insert(&artist("A1", "Art")).unwrap();

        let lon: Option<f64> = conn
            .query_row("SELECT longitude FROM artists", [], |r| r.get(0))
            .unwrap();
        assert_eq!(lon, None);
    }

    #[test]
    fn unexpected_constraint_violation_is_fatal() {
        let conn = db();
        let err = SqliteSink::new(&conn).insert(&user("gold")).unwrap_err();

        assert!(matches!(err, EtlError::Constraint(_)));
    }

    #[test]
    fn lookup_resolves_exact_match() {
        let conn = db();
        let sink = SqliteSink::new(&conn);
        sink.insert(&song("S1", "A1", 210.5)).unwrap();
        sink.insert(&artist("A1", "Art")).unwrap();

        assert_eq!(
            sink.find_song("Test", "Art", 210.5).unwrap(),
            Some(SongMatch {
                song_id: "S1".into(),
                artist_id: "A1".into()
            })
        );
        assert_eq!(sink.find_song("Test", "Art", 210.6).unwrap(), None);
        assert_eq!(sink.find_song("Test", "Other", 210.5).unwrap(), None);
    }

    #[test]
    fn ambiguous_lookup_resolves_to_none() {
        let conn = db();
        let sink = SqliteSink::new(&conn);
        sink.insert(&song("S1", "A1", 210.5)).unwrap();
        sink.insert(&song("S2", "A2", 210.5)).unwrap();
        sink.insert(&artist("A1", "Art")).unwrap();
        sink.insert(&artist("A2", "Art")).unwrap();

        assert_eq!(sink.find_song("Test", "Art", 210.5).unwrap(), None);
    }
}

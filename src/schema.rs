//! DDL das cinco tabelas do modelo estrela e o sinal de "schema pronto".
//!
//! O pipeline não cria tabelas sozinho: `reset_schema` só roda pelo comando
//! `create-tables`, e a carga apenas confere com `ensure_ready`.

use rusqlite::Connection;
use tracing::info;

use crate::errors::EtlError;
use crate::records::Table;

const CREATE_SONGPLAYS: &str = "CREATE TABLE songplays (
    songplay_id INTEGER PRIMARY KEY AUTOINCREMENT,
    start_time  TEXT    NOT NULL,
    user_id     TEXT    NOT NULL,
    level       TEXT    NOT NULL,
    song_id     TEXT,
    artist_id   TEXT,
    session_id  INTEGER NOT NULL,
    location    TEXT,
    user_agent  TEXT
)";

const CREATE_USERS: &str = "CREATE TABLE users (
    user_id    TEXT PRIMARY KEY,
    first_name TEXT,
    last_name  TEXT,
    gender     TEXT,
    level      TEXT NOT NULL CHECK (level IN ('free', 'paid'))
)";

const CREATE_SONGS: &str = "CREATE TABLE songs (
    song_id   TEXT PRIMARY KEY,
    title     TEXT    NOT NULL,
    artist_id TEXT    NOT NULL,
    year      INTEGER,
    duration  REAL    NOT NULL
)";

const CREATE_ARTISTS: &str = "CREATE TABLE artists (
    artist_id TEXT PRIMARY KEY,
    name      TEXT NOT NULL,
    location  TEXT,
    latitude  REAL,
    longitude REAL
)";

const CREATE_TIME: &str = "CREATE TABLE time (
    start_time TEXT PRIMARY KEY,
    hour       INTEGER NOT NULL,
    day        INTEGER NOT NULL,
    week       INTEGER NOT NULL,
    month      INTEGER NOT NULL,
    year       INTEGER NOT NULL,
    weekday    INTEGER NOT NULL
)";

/// Índice da busca título + artista + duração feita a cada reprodução.
const CREATE_SONG_LOOKUP_INDEX: &str =
    "CREATE INDEX songs_title_duration_idx ON songs (title, duration)";

pub const CREATE_TABLE_QUERIES: &[&str] = &[
    CREATE_SONGPLAYS,
    CREATE_USERS,
    CREATE_SONGS,
    CREATE_ARTISTS,
    CREATE_TIME,
    CREATE_SONG_LOOKUP_INDEX,
];

/// Remove e recria todas as tabelas.
pub fn reset_schema(conn: &mut Connection) -> Result<(), EtlError> {
    let tx = conn.transaction()?;
    for table in Table::ALL {
        tx.execute(&format!("DROP TABLE IF EXISTS {}", table.name()), [])?;
    }
    for query in CREATE_TABLE_QUERIES {
        tx.execute(query, [])?;
    }
    tx.commit()?;

    info!("Schema recriado: {} tabelas", Table::ALL.len());
    Ok(())
}

/// Confere que as cinco tabelas existem antes de qualquer carga.
pub fn ensure_ready(conn: &Connection) -> Result<(), EtlError> {
    let mut stmt = conn.prepare(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
    )?;

    let mut missing = Vec::new();
    for table in Table::ALL {
        let count: i64 = stmt.query_row([table.name()], |r| r.get(0))?;
        if count == 0 {
            missing.push(table.name());
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::SchemaNotReady(missing))
    }
}

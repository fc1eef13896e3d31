//! # Registros de entrada e linhas de saída
//!
//! Modelos serde das linhas JSON brutas e as tuplas normalizadas que vão para
//! as tabelas dimensão (`songs`, `artists`, `time`, `users`) e fato
//! (`songplays`).

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde::Deserialize;
use std::collections::HashSet;
use std::hash::Hash;

/// Valor de `page` que marca uma reprodução de música.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// Formato textual de `start_time` no banco.
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/* ========================================================================== */
/* Linhas brutas                                                              */
/* ========================================================================== */

/// Uma linha do dataset de metadados de músicas.
#[derive(Debug, Deserialize, Clone)]
pub struct SongData {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
    pub artist_name: String,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

/// Uma linha do dataset de logs de atividade.
///
/// Quase tudo é opcional: eventos fora de `NextSong` (login, home) chegam sem
/// usuário nem música. A obrigatoriedade é cobrada só nas linhas retidas.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub song: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub session_id: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// `userId` aparece como texto ("39") ou número (39) dependendo da exportação.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum UserId {
    Text(String),
    Number(i64),
}

impl LogEvent {
    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }
}

impl UserId {
    /// Texto normalizado; `None` para o id vazio de usuários deslogados.
    pub fn normalized(&self) -> Option<String> {
        match self {
            UserId::Text(s) if s.trim().is_empty() => None,
            UserId::Text(s) => Some(s.trim().to_string()),
            UserId::Number(n) => Some(n.to_string()),
        }
    }
}

/* ========================================================================== */
/* Linhas de saída                                                            */
/* ========================================================================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Songs,
    Artists,
    Time,
    Users,
    SongPlays,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Songs,
        Table::Artists,
        Table::Time,
        Table::Users,
        Table::SongPlays,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Songs => "songs",
            Table::Artists => "artists",
            Table::Time => "time",
            Table::Users => "users",
            Table::SongPlays => "songplays",
        }
    }

    /// Dimensões ignoram chave natural duplicada; a fato só acumula.
    pub fn is_dimension(self) -> bool {
        !matches!(self, Table::SongPlays)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongRecord {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRecord {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRecord {
    pub start_time: NaiveDateTime,
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    pub weekday: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserRecord {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongPlayRecord {
    pub start_time: NaiveDateTime,
    pub user_id: String,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i64,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

/// Uma linha pronta para o loader, já marcada com a tabela de destino.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Song(SongRecord),
    Artist(ArtistRecord),
    Time(TimeRecord),
    User(UserRecord),
    SongPlay(SongPlayRecord),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::Song(_) => Table::Songs,
            Row::Artist(_) => Table::Artists,
            Row::Time(_) => Table::Time,
            Row::User(_) => Table::Users,
            Row::SongPlay(_) => Table::SongPlays,
        }
    }
}

/* ========================================================================== */
/* Projeções                                                                  */
/* ========================================================================== */

impl SongData {
    pub fn song(&self) -> SongRecord {
        SongRecord {
            song_id: self.song_id.clone(),
            title: self.title.clone(),
            artist_id: self.artist_id.clone(),
            year: self.year,
            duration: self.duration,
        }
    }

    pub fn artist(&self) -> ArtistRecord {
        ArtistRecord {
            artist_id: self.artist_id.clone(),
            name: self.artist_name.clone(),
            location: self.artist_location.clone(),
            latitude: self.artist_latitude,
            longitude: self.artist_longitude,
        }
    }
}

impl SongRecord {
    /// Chave de deduplicação: todos os campos, `f64` pelo padrão de bits.
    pub fn dedupe_key(&self) -> (String, String, String, i32, u64) {
        (
            self.song_id.clone(),
            self.title.clone(),
            self.artist_id.clone(),
            self.year,
            self.duration.to_bits(),
        )
    }
}

impl ArtistRecord {
    pub fn dedupe_key(&self) -> (String, String, Option<String>, Option<u64>, Option<u64>) {
        (
            self.artist_id.clone(),
            self.name.clone(),
            self.location.clone(),
            self.latitude.map(f64::to_bits),
            self.longitude.map(f64::to_bits),
        )
    }
}

impl TimeRecord {
    /// Converte epoch em milissegundos para o instante UTC e seus campos.
    ///
    /// `week` segue ISO-8601 (semana começa na segunda, semana 1 contém a
    /// primeira quinta-feira); `weekday` vai de segunda=0 a domingo=6;
    /// `year` é o ano civil, não o ano da semana ISO.
    pub fn from_epoch_millis(ts: i64) -> Option<Self> {
        let start_time = DateTime::from_timestamp_millis(ts)?.naive_utc();
        Some(Self {
            start_time,
            hour: start_time.hour(),
            day: start_time.day(),
            week: start_time.iso_week().week(),
            month: start_time.month(),
            year: start_time.year(),
            weekday: start_time.weekday().num_days_from_monday(),
        })
    }
}

pub fn format_start_time(start_time: &NaiveDateTime) -> String {
    start_time.format(START_TIME_FORMAT).to_string()
}

/// Remove duplicatas preservando a ordem da primeira ocorrência.
pub fn dedupe_by<T, K, F>(rows: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    K: Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        if seen.insert(key(&row)) {
            out.push(row);
        }
    }
    out
}

//! # Transformação JSON Lines -> modelo estrela
//!
//! ## Engenharia de Dados
//! Cada arquivo é lido por inteiro para uma sequência de registros, projetado
//! nas tabelas de destino, deduplicado por hash da tupla projetada e entregue
//! linha a linha ao [`RowSink`].
//!
//! Ordem de entrega: músicas antes de artistas; tempo, usuários e só então
//! reproduções, para que a busca de ids veja as dimensões do próprio arquivo.

use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::errors::EtlError;
use crate::loader::{InsertOutcome, RowSink};
use crate::records::{
    LogEvent, Row, SongData, SongPlayRecord, Table, TimeRecord, UserRecord,
    dedupe_by,
};

/// Assinatura comum dos dois transformadores, usada pelo driver.
pub type FileProcessor = fn(&dyn RowSink, &Path) -> Result<FileStats, EtlError>;

/// Contadores de um arquivo processado.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// Linhas JSON lidas.
    pub records: usize,
    /// Linhas que passaram pelo filtro (`NextSong` nos logs; todas nas músicas).
    pub retained: usize,
    /// Inseridas / ignoradas, na ordem de `Table::ALL`.
    pub inserted: [usize; 5],
    pub ignored: [usize; 5],
    /// Reproduções gravadas sem `song_id`/`artist_id`.
    pub unresolved_plays: usize,
}

impl FileStats {
    fn record(&mut self, table: Table, outcome: InsertOutcome) {
        let idx = table_index(table);
        match outcome {
            InsertOutcome::Inserted => self.inserted[idx] += 1,
            InsertOutcome::Ignored => self.ignored[idx] += 1,
        }
    }

    pub fn inserted_into(&self, table: Table) -> usize {
        self.inserted[table_index(table)]
    }

    pub fn ignored_in(&self, table: Table) -> usize {
        self.ignored[table_index(table)]
    }

    pub fn merge(&mut self, other: &FileStats) {
        self.records += other.records;
        self.retained += other.retained;
        self.unresolved_plays += other.unresolved_plays;
        for i in 0..self.inserted.len() {
            self.inserted[i] += other.inserted[i];
            self.ignored[i] += other.ignored[i];
        }
    }
}

fn table_index(table: Table) -> usize {
    Table::ALL
        .iter()
        .position(|t| *t == table)
        .unwrap_or_default()
}

fn load(sink: &dyn RowSink, stats: &mut FileStats, row: Row) -> Result<(), EtlError> {
    let outcome = sink.insert(&row)?;
    stats.record(row.table(), outcome);
    Ok(())
}

/// Lê um arquivo JSON Lines inteiro. Linhas em branco são puladas; qualquer
/// linha malformada invalida o arquivo.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<(usize, T)>, EtlError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| EtlError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push((idx + 1, record));
    }
    Ok(records)
}

/// Arquivo de metadados -> linhas de `songs` e `artists`.
///
/// As duas projeções são deduplicadas de forma independente.
pub fn process_song_file(sink: &dyn RowSink, path: &Path) -> Result<FileStats, EtlError> {
    let records: Vec<SongData> = read_json_lines(path)?
        .into_iter()
        .map(|(_, r)| r)
        .collect();

    let mut stats = FileStats {
        records: records.len(),
        retained: records.len(),
        ..FileStats::default()
    };

    let songs = dedupe_by(records.iter().map(SongData::song), |s| s.dedupe_key());
    for song in songs {
        load(sink, &mut stats, Row::Song(song))?;
    }

    let artists = dedupe_by(records.iter().map(SongData::artist), |a| a.dedupe_key());
    for artist in artists {
        load(sink, &mut stats, Row::Artist(artist))?;
    }

    debug!("{}: {:?}", path.display(), stats);
    Ok(stats)
}

/// Linha `NextSong` com os campos obrigatórios já validados.
struct SongPlayEvent {
    time: TimeRecord,
    user: UserRecord,
    session_id: i64,
    event: LogEvent,
}

fn required<T>(
    value: Option<T>,
    path: &Path,
    line: usize,
    field: &'static str,
) -> Result<T, EtlError> {
    value.ok_or_else(|| EtlError::MissingField {
        path: path.to_path_buf(),
        line,
        field,
    })
}

impl SongPlayEvent {
    fn from_log(path: &Path, line: usize, event: LogEvent) -> Result<Self, EtlError> {
        let ts = required(event.ts, path, line, "ts")?;
        let time =
            TimeRecord::from_epoch_millis(ts).ok_or_else(|| EtlError::InvalidTimestamp {
                path: path.to_path_buf(),
                line,
                ts,
            })?;
        let user_id = required(
            event.user_id.as_ref().and_then(|id| id.normalized()),
            path,
            line,
            "userId",
        )?;
        let level = required(event.level.clone(), path, line, "level")?;
        let session_id = required(event.session_id, path, line, "sessionId")?;

        let user = UserRecord {
            user_id,
            first_name: event.first_name.clone(),
            last_name: event.last_name.clone(),
            gender: event.gender.clone(),
            level,
        };
        Ok(Self {
            time,
            user,
            session_id,
            event,
        })
    }
}

/// Arquivo de log -> linhas de `time`, `users` e `songplays`.
///
/// Só eventos `NextSong` contribuem para qualquer tabela.
pub fn process_log_file(sink: &dyn RowSink, path: &Path) -> Result<FileStats, EtlError> {
    let records: Vec<(usize, LogEvent)> = read_json_lines(path)?;
    let total = records.len();

    let plays = records
        .into_iter()
        .filter(|(_, e)| e.is_song_play())
        .map(|(line, e)| SongPlayEvent::from_log(path, line, e))
        .collect::<Result<Vec<_>, _>>()?;

    let mut stats = FileStats {
        records: total,
        retained: plays.len(),
        ..FileStats::default()
    };

    // Tempo
    for time in dedupe_by(plays.iter().map(|p| p.time), |t| *t) {
        load(sink, &mut stats, Row::Time(time))?;
    }

    // Usuários: tuplas distintas; conflito de user_id resolvido pelo loader
    for user in dedupe_by(plays.iter().map(|p| p.user.clone()), |u| u.clone()) {
        load(sink, &mut stats, Row::User(user))?;
    }

    // Reproduções: uma por evento, sem deduplicação
    for play in &plays {
        let ids = match (&play.event.song, &play.event.artist, play.event.length) {
            (Some(song), Some(artist), Some(length)) => sink.find_song(song, artist, length)?,
            _ => None,
        };
        if ids.is_none() {
            stats.unresolved_plays += 1;
        }
        let (song_id, artist_id) = match ids {
            Some(m) => (Some(m.song_id), Some(m.artist_id)),
            None => (None, None),
        };

        let record = SongPlayRecord {
            start_time: play.time.start_time,
            user_id: play.user.user_id.clone(),
            level: play.user.level.clone(),
            song_id,
            artist_id,
            session_id: play.session_id,
            location: play.event.location.clone(),
            user_agent: play.event.user_agent.clone(),
        };
        load(sink, &mut stats, Row::SongPlay(record))?;
    }

    debug!("{}: {:?}", path.display(), stats);
    Ok(stats)
}

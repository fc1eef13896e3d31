//! # Driver do pipeline
//!
//! Descobre os arquivos de um diretório e aplica o transformador a cada um,
//! com uma transação por arquivo. Qualquer erro interrompe a execução: a
//! transação corrente é desfeita no `drop` e os arquivos anteriores ficam
//! commitados.

use std::io::Write;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::discovery::find_files;
use crate::errors::EtlError;
use crate::loader::SqliteSink;
use crate::processor::{FileProcessor, FileStats};
use crate::records::Table;

/// Totais de um diretório processado.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub stats: FileStats,
}

impl RunSummary {
    pub fn log(&self, dataset: &str) {
        info!(
            "{}: {} arquivos, {} registros lidos, {} retidos",
            dataset, self.files, self.stats.records, self.stats.retained
        );
        for table in Table::ALL {
            let inserted = self.stats.inserted_into(table);
            let ignored = self.stats.ignored_in(table);
            if inserted + ignored == 0 {
                continue;
            }
            if table.is_dimension() {
                info!(
                    "  {:<10} {} inseridas, {} já existentes",
                    table.name(),
                    inserted,
                    ignored
                );
            } else {
                info!("  {:<10} {} inseridas", table.name(), inserted);
            }
        }
        if self.stats.unresolved_plays > 0 {
            info!(
                "  {} reproduções sem música correspondente",
                self.stats.unresolved_plays
            );
        }
    }
}

fn progress_bar(total: usize, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Processa todos os arquivos de `root` com `func`, commitando após cada um.
///
/// Escreve em `out` (o stdout, no binário) `"<n> files found in <root>"` e,
/// por arquivo, `"<i>/<n> files processed."`.
///
/// # Errors
///
/// Propaga o primeiro erro de descoberta, transformação ou carga. O arquivo
/// que falhou não deixa linhas no banco.
pub fn process_data(
    conn: &mut Connection,
    root: &Path,
    extension: &str,
    func: FileProcessor,
    show_progress: bool,
    out: &mut dyn Write,
) -> Result<RunSummary, EtlError> {
    let all_files = find_files(root, extension)?;

    let num_files = all_files.len();
    writeln!(out, "{} files found in {}", num_files, root.display())?;

    let pb = progress_bar(num_files, show_progress);
    let mut summary = RunSummary::default();

    for (i, datafile) in all_files.iter().enumerate() {
        let tx = conn.transaction()?;
        let stats = func(&SqliteSink::new(&tx), datafile)?;
        tx.commit()?;

        debug!("Commit de {}", datafile.display());
        summary.files += 1;
        summary.stats.merge(&stats);

        pb.suspend(|| writeln!(out, "{}/{} files processed.", i + 1, num_files))?;
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{process_log_file, process_song_file};
    use crate::schema::reset_schema;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    const SONG_LINE: &str = r#"{"song_id": "S1", "title": "Test", "artist_id": "A1", "year": 2000, "duration": 210.5, "artist_name": "Art", "artist_location": "NYC", "artist_latitude": 40.7, "artist_longitude": -74.0}"#;

    const HOME_LINE: &str = r#"{"page": "Home", "ts": 999, "userId": "1", "firstName": "Ann", "lastName": "Lee", "gender": "F", "level": "free", "sessionId": 7}"#;

    const PLAY_LINE: &str = r#"{"page": "NextSong", "ts": 1000, "userId": "1", "firstName": "Ann", "lastName": "Lee", "gender": "F", "level": "free", "song": "Test", "artist": "Art", "length": 210.5, "sessionId": 7, "location": "Boston", "userAgent": "agent"}"#;

    struct Fixture {
        _dir: TempDir,
        songs: PathBuf,
        logs: PathBuf,
        conn: Connection,
    }

    fn fixture(song_files: &[(&str, &str)], log_files: &[(&str, &str)]) -> Fixture {
        let dir = tempdir().unwrap();
        let songs = dir.path().join("song_data");
        let logs = dir.path().join("log_data");
        for (root, files) in [(&songs, song_files), (&logs, log_files)] {
            fs::create_dir_all(root.join("nested")).unwrap();
            for (name, content) in files {
                fs::write(root.join("nested").join(name), content).unwrap();
            }
        }
        let mut conn = Connection::open_in_memory().unwrap();
        reset_schema(&mut conn).unwrap();
        Fixture {
            _dir: dir,
            songs,
            logs,
            conn,
        }
    }

    fn load(
        conn: &mut Connection,
        root: &Path,
        func: FileProcessor,
    ) -> Result<RunSummary, EtlError> {
        process_data(conn, root, "json", func, false, &mut io::sink())
    }

    fn run(f: &mut Fixture) -> (RunSummary, RunSummary) {
        let songs = load(&mut f.conn, &f.songs, process_song_file).unwrap();
        let logs = load(&mut f.conn, &f.logs, process_log_file).unwrap();
        (songs, logs)
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    fn dump_songs(conn: &Connection) -> Vec<(String, String, String, i32, f64)> {
        let mut stmt = conn
            .prepare("SELECT song_id, title, artist_id, year, duration FROM songs ORDER BY song_id")
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn end_to_end_resolves_song_and_artist() {
        let log = format!("{}\n{}\n", HOME_LINE, PLAY_LINE);
        let mut f = fixture(&[("TRA.json", SONG_LINE)], &[("events.json", log.as_str())]);

        let (songs, logs) = run(&mut f);

        assert_eq!(songs.files, 1);
        assert_eq!(logs.stats.retained, 1);
        assert_eq!(count(&f.conn, "songs"), 1);
        assert_eq!(count(&f.conn, "artists"), 1);
        assert_eq!(count(&f.conn, "time"), 1);
        assert_eq!(count(&f.conn, "users"), 1);
        assert_eq!(count(&f.conn, "songplays"), 1);

        let (song_id, artist_id, start): (Option<String>, Option<String>, String) = f
            .conn
            .query_row(
                "SELECT song_id, artist_id, start_time FROM songplays",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(song_id.as_deref(), Some("S1"));
        assert_eq!(artist_id.as_deref(), Some("A1"));
        assert_eq!(start, "1970-01-01 00:00:01.000");
    }

    #[test]
    fn logs_before_songs_leave_plays_unresolved() {
        let mut f = fixture(&[("TRA.json", SONG_LINE)], &[("events.json", PLAY_LINE)]);

        load(&mut f.conn, &f.logs, process_log_file).unwrap();
        load(&mut f.conn, &f.songs, process_song_file).unwrap();

        let unresolved: i64 = f
            .conn
            .query_row(
                "SELECT COUNT(*) FROM songplays WHERE song_id IS NULL AND artist_id IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(unresolved, 1);
    }

    #[test]
    fn rerun_keeps_dimensions_and_doubles_plays() {
        let mut f = fixture(&[("TRA.json", SONG_LINE)], &[("events.json", PLAY_LINE)]);

        run(&mut f);
        let songs_before = dump_songs(&f.conn);
        let (songs, logs) = run(&mut f);

        assert_eq!(dump_songs(&f.conn), songs_before);
        assert_eq!(count(&f.conn, "artists"), 1);
        assert_eq!(count(&f.conn, "time"), 1);
        assert_eq!(count(&f.conn, "users"), 1);
        assert_eq!(count(&f.conn, "songplays"), 2);
        assert_eq!(songs.stats.ignored_in(Table::Songs), 1);
        assert_eq!(logs.stats.inserted_into(Table::SongPlays), 1);
    }

    #[test]
    fn failing_file_rolls_back_and_halts() {
        let broken = format!("{}\n{{broken", SONG_LINE.replace("\"S1\"", "\"S2\""));
        // "a.json" é processado antes de "b.json"
        let mut f = fixture(&[("a.json", SONG_LINE), ("b.json", broken.as_str())], &[]);

        let err = load(&mut f.conn, &f.songs, process_song_file).unwrap_err();

        assert!(matches!(err, EtlError::Parse { .. }));
        assert_eq!(dump_songs(&f.conn).len(), 1);
        assert_eq!(dump_songs(&f.conn)[0].0, "S1");
    }

    #[test]
    fn loader_failure_rolls_back_whole_file() {
        let gold = PLAY_LINE.replace("\"free\"", "\"gold\"");
        let log = format!("{}\n{}", PLAY_LINE.replace("1000", "2000").replace("\"1\"", "\"2\""), gold);
        let mut f = fixture(&[], &[("events.json", log.as_str())]);

        let err = load(&mut f.conn, &f.logs, process_log_file).unwrap_err();

        assert!(matches!(err, EtlError::Constraint(_)));
        assert_eq!(count(&f.conn, "time"), 0);
        assert_eq!(count(&f.conn, "users"), 0);
        assert_eq!(count(&f.conn, "songplays"), 0);
    }

    #[test]
    fn progress_lines_follow_the_operator_format() {
        let mut f = fixture(
            &[("a.json", SONG_LINE), ("b.json", SONG_LINE)],
            &[],
        );
        let mut out = Vec::new();

        process_data(&mut f.conn, &f.songs, "json", process_song_file, false, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                format!("2 files found in {}", f.songs.display()).as_str(),
                "1/2 files processed.",
                "2/2 files processed.",
            ]
        );
    }

    #[test]
    fn empty_directory_reports_zero_files() {
        let mut f = fixture(&[], &[]);
        let mut out = Vec::new();

        process_data(&mut f.conn, &f.logs, "json", process_log_file, false, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("0 files found in {}\n", f.logs.display())
        );
    }

    #[test]
    fn empty_directory_completes_trivially() {
        let mut f = fixture(&[], &[]);
        let summary = load(&mut f.conn, &f.songs, process_song_file).unwrap();
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn missing_directory_is_fatal_before_writes() {
        let mut f = fixture(&[], &[]);
        let missing = f.songs.join("does-not-exist");

        let err = load(&mut f.conn, &missing, process_song_file).unwrap_err();
        assert!(matches!(err, EtlError::Discovery { .. }));
    }
}

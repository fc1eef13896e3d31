//! Implementações de traits para o enum de erro do pipeline
//!
//! Este módulo existe exclusivamente para desacoplar:
//! - definição de erros (enums)
//! - implementação de traits (`Display`, `Error`, `From`)

use std::error::Error as StdError;
use std::fmt;

use rusqlite::ErrorCode;

use crate::errors::EtlError;

/* ========================================================================== */
/* Display                                                                    */
/* ========================================================================== */

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtlError::Discovery { root, source } => match source {
                Some(err) => write!(f, "[Descoberta] '{}': {}", root.display(), err),
                None => write!(f, "[Descoberta] '{}' não é um diretório", root.display()),
            },

            EtlError::Parse { path, line, source } => {
                write!(f, "[JSON] {}:{}: {}", path.display(), line, source)
            }

            EtlError::MissingField { path, line, field } => {
                write!(
                    f,
                    "[JSON] {}:{}: campo obrigatório '{}' ausente",
                    path.display(),
                    line,
                    field
                )
            }

            EtlError::InvalidTimestamp { path, line, ts } => {
                write!(
                    f,
                    "[JSON] {}:{}: ts {} fora do intervalo de datas suportado",
                    path.display(),
                    line,
                    ts
                )
            }

            EtlError::Constraint(err) => {
                write!(f, "[Restrição] {}", err)
            }

            EtlError::Database(err) => {
                write!(f, "[SQLite] {}", err)
            }

            EtlError::SchemaNotReady(missing) => {
                write!(
                    f,
                    "[Schema] tabelas ausentes: {} (execute `create-tables`)",
                    missing.join(", ")
                )
            }

            EtlError::Config(msg) => {
                write!(f, "[Config] {}", msg)
            }

            EtlError::Io(err) => {
                write!(f, "[I/O] {}", err)
            }
        }
    }
}

/* ========================================================================== */
/* std::error::Error                                                          */
/* ========================================================================== */

impl StdError for EtlError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            EtlError::Discovery { source, .. } => {
                source.as_ref().map(|e| e as &(dyn StdError + 'static))
            }
            EtlError::Parse { source, .. } => Some(source),
            EtlError::Constraint(err) => Some(err),
            EtlError::Database(err) => Some(err),
            EtlError::Io(err) => Some(err),
            EtlError::MissingField { .. }
            | EtlError::InvalidTimestamp { .. }
            | EtlError::SchemaNotReady(_)
            | EtlError::Config(_) => None,
        }
    }
}

/* ========================================================================== */
/* Conversions                                                                */
/* ========================================================================== */

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        EtlError::Io(err)
    }
}

/// Separa violações de restrição das demais falhas do SQLite.
impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => EtlError::Constraint(err),
            _ => EtlError::Database(err),
        }
    }
}

//! # Definição de Erros do Domínio de Carga
//!
//! Este módulo centraliza as falhas possíveis durante descoberta, transformação
//! e carga (ETL) dos arquivos de músicas e de logs.
//!
//! # Error Handling Strategy
//! - **Tipagem:** Enums para tratamento exaustivo.
//! - **Fatalidade:** Toda variante interrompe a execução; não existe camada de retry.
//! - **Extensibilidade:** Marcado como `non_exhaustive` para permitir evolução sem quebra de contrato.

use std::path::PathBuf;

/// Enumeração central de falhas do pipeline.
#[derive(Debug)]
#[non_exhaustive]
pub enum EtlError {
    /// Diretório raiz ausente ou ilegível. Ocorre antes de qualquer escrita.
    Discovery {
        root: PathBuf,
        source: Option<walkdir::Error>,
    },

    /// Linha JSON malformada. Invalida o arquivo inteiro.
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    /// Campo obrigatório ausente numa linha que seria carregada.
    MissingField {
        path: PathBuf,
        line: usize,
        field: &'static str,
    },

    /// `ts` presente mas fora do intervalo representável.
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        ts: i64,
    },

    /// Violação de restrição não absorvida pela política de conflito.
    Constraint(rusqlite::Error),

    /// Demais falhas do banco (conexão, SQL, tipos).
    Database(rusqlite::Error),

    /// Alguma das tabelas esperadas não existe.
    SchemaNotReady(Vec<&'static str>),

    /// Arquivo de configuração inválido.
    Config(String),

    /// Falhas no sistema de arquivos fora da descoberta.
    Io(std::io::Error),
}

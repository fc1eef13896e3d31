//! Configuração do pipeline
//!
//! ## Visão Geral
//! Define onde estão os dados de entrada, qual banco recebe a carga e como o
//! progresso é exibido. Toda chave tem valor padrão, então um TOML parcial
//! (ou nenhum) é suficiente.
//!
//! ## Boas Práticas
//! - **Encapsulamento**: Validações de integridade ocorrem no momento da carga.

use crate::errors::EtlError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Caminho procurado quando nenhum `--config` é informado.
pub const DEFAULT_CONFIG_PATH: &str = "sparkify.toml";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub data: DataConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Arquivo SQLite de destino.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sparkify.db"),
        }
    }
}

/// Raízes dos dois conjuntos de dados e a extensão dos arquivos.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub song_data: PathBuf,
    pub log_data: PathBuf,
    /// Sem o ponto (ex: "json").
    pub extension: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            song_data: PathBuf::from("data/song_data"),
            log_data: PathBuf::from("data/log_data"),
            extension: "json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Barra de progresso no stderr, além das linhas de progresso no stdout.
    pub progress_bar: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { progress_bar: true }
    }
}

impl Config {
    /// Carrega e valida o ficheiro de configuração TOML.
    ///
    /// # Erros
    /// Retorna `EtlError::Io` se o ficheiro não for encontrado ou
    /// `EtlError::Config` se a estrutura for inválida.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EtlError> {
        let content = fs::read_to_string(path).map_err(EtlError::Io)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| EtlError::Config(format!("Erro no TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Usa o arquivo explícito, ou o padrão se existir, ou os defaults.
    ///
    /// Só o caminho explícito é obrigatório.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, EtlError> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                Self::load_from_file(DEFAULT_CONFIG_PATH)
            }
            None => Ok(Self::default()),
        }
    }

    /// Validação pós-carga (Fail-Fast).
    fn validate(&self) -> Result<(), EtlError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(EtlError::Config("database.path vazio".to_string()));
        }
        if self.data.extension.is_empty() || self.data.extension.starts_with('.') {
            return Err(EtlError::Config(format!(
                "data.extension inválida: '{}' (use sem ponto, ex: \"json\")",
                self.data.extension
            )));
        }
        Ok(())
    }
}

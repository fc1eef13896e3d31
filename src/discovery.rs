//! Descoberta recursiva dos arquivos de dados.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::errors::EtlError;

/// Lista, em caminhos absolutos, todo arquivo sob `root` com a extensão dada.
///
/// A ordem é a do `WalkDir` com entradas ordenadas por nome, estável entre
/// execuções. Links simbólicos são seguidos, para arquivos e diretórios.
/// Resultado vazio não é erro.
///
/// # Errors
///
/// `EtlError::Discovery` se `root` não existir, não for diretório ou se
/// alguma entrada não puder ser lida.
pub fn find_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>, EtlError> {
    let root = root.canonicalize().map_err(|_| EtlError::Discovery {
        root: root.to_path_buf(),
        source: None,
    })?;
    if !root.is_dir() {
        return Err(EtlError::Discovery { root, source: None });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| EtlError::Discovery {
            root: root.clone(),
            source: Some(e),
        })?;

        let matches = entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == extension);
        if matches {
            files.push(entry.into_path());
        }
    }

    debug!("{} arquivos '.{}' sob {}", files.len(), extension, root.display());
    Ok(files)
}

//! Publicación de salidas.
//!
//! El header de macros y la fuente de tablas se escriben primero a
//! archivos temporales en el mismo directorio que su destino final.
//! Solo cuando ambos se escribieron por completo se renombran sobre
//! sus destinos. Si la compilación se aborta antes, los temporales se
//! eliminan y los destinos permanecen intactos.

use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use bitflags::bitflags;
use log::{debug, info};
use tempfile::NamedTempFile;
use thiserror::Error;

bitflags! {
    /// Opciones a aplicar durante la publicación.
    pub struct PublishOptions: u32 {
        /// Crear directorios de destino que no existan.
        const CREATE_DIRS = 0x01;
    }
}

/// Un error al preparar o publicar salidas.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PublishError {
    /// No fue posible crear el archivo temporal para un destino.
    #[error("Failed to stage output for {path}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Falló la escritura final de contenido pendiente.
    #[error("Failed to flush staged output for {path}")]
    Flush {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No fue posible renombrar el temporal sobre su destino.
    #[error("Failed to publish {path}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Una salida en preparación.
struct Staged {
    file: BufWriter<NamedTempFile>,
    destination: PathBuf,
}

impl Staged {
    fn new(destination: &Path, opts: PublishOptions) -> Result<Self, PublishError> {
        let stage_error = |source| PublishError::Stage {
            path: destination.to_owned(),
            source,
        };

        // "include/x.h" => "include", "x.h" => "."
        let directory = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        if opts.contains(PublishOptions::CREATE_DIRS) {
            fs::create_dir_all(directory).map_err(stage_error)?;
        }

        let file = tempfile::Builder::new()
            .prefix(".smcspec")
            .suffix(".tmp")
            .tempfile_in(directory)
            .map_err(stage_error)?;

        // Los temporales se crean con permisos restringidos
        let permissions = match fs::metadata(destination) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(_) => default_permissions(),
        };

        if let Some(permissions) = permissions {
            file.as_file()
                .set_permissions(permissions)
                .map_err(stage_error)?;
        }

        debug!("staging {} in {}", destination.display(), file.path().display());

        Ok(Staged {
            file: BufWriter::new(file),
            destination: destination.to_owned(),
        })
    }

    fn flush(self) -> Result<(NamedTempFile, PathBuf), PublishError> {
        let Staged { file, destination } = self;

        match file.into_inner() {
            Ok(file) => Ok((file, destination)),
            Err(error) => Err(PublishError::Flush {
                path: destination,
                source: error.into_error(),
            }),
        }
    }
}

/// Par de salidas preparadas para publicarse juntas.
pub struct Publisher {
    header: Staged,
    tables: Staged,
}

impl Publisher {
    /// Prepara archivos temporales para ambas salidas.
    pub fn stage<H, T>(header: &H, tables: &T, opts: PublishOptions) -> Result<Self, PublishError>
    where
        H: AsRef<Path> + ?Sized,
        T: AsRef<Path> + ?Sized,
    {
        Ok(Publisher {
            header: Staged::new(header.as_ref(), opts)?,
            tables: Staged::new(tables.as_ref(), opts)?,
        })
    }

    /// Destino del header de macros.
    pub fn header(&mut self) -> &mut impl Write {
        &mut self.header.file
    }

    /// Destino de la fuente de tablas.
    pub fn tables(&mut self) -> &mut impl Write {
        &mut self.tables.file
    }

    /// Publica ambas salidas.
    ///
    /// Ambos temporales se vacían a disco antes de renombrar cualquiera
    /// de ellos.
    pub fn commit(self) -> Result<(), PublishError> {
        let staged = [self.header.flush()?, self.tables.flush()?];

        for (file, destination) in staged {
            file.persist(&destination)
                .map_err(|error| PublishError::Persist {
                    path: destination.clone(),
                    source: error.error,
                })?;

            info!("wrote {}", destination.display());
        }

        Ok(())
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<fs::Permissions> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn commit_publishes_both() -> io::Result<()> {
        let dir = TempDir::new()?;
        let header = dir.path().join("arg_struct_def.h");
        let tables = dir.path().join("field_specification.h");

        let mut publisher = Publisher::stage(&header, &tables, PublishOptions::empty()).unwrap();
        write!(publisher.header(), "header")?;
        write!(publisher.tables(), "tables")?;

        // Nada es visible antes de publicar
        assert!(!header.exists());
        assert!(!tables.exists());

        publisher.commit().unwrap();
        assert_eq!(fs::read_to_string(&header)?, "header");
        assert_eq!(fs::read_to_string(&tables)?, "tables");

        // Solo quedan los destinos, sin temporales
        assert_eq!(fs::read_dir(dir.path())?.count(), 2);
        Ok(())
    }

    #[test]
    fn dropping_leaves_destinations_untouched() -> io::Result<()> {
        let dir = TempDir::new()?;
        let header = dir.path().join("arg_struct_def.h");
        let tables = dir.path().join("field_specification.h");
        fs::write(&header, "old header")?;

        {
            let mut publisher =
                Publisher::stage(&header, &tables, PublishOptions::empty()).unwrap();
            write!(publisher.header(), "partial")?;
        }

        assert_eq!(fs::read_to_string(&header)?, "old header");
        assert!(!tables.exists());
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn missing_directories() -> io::Result<()> {
        let dir = TempDir::new()?;
        let header = dir.path().join("include/arg_struct_def.h");
        let tables = dir.path().join("include/field_specification.h");

        assert!(matches!(
            Publisher::stage(&header, &tables, PublishOptions::empty()),
            Err(PublishError::Stage { .. })
        ));

        let publisher = Publisher::stage(&header, &tables, PublishOptions::CREATE_DIRS).unwrap();
        publisher.commit().unwrap();

        assert!(header.exists());
        assert!(tables.exists());
        Ok(())
    }
}

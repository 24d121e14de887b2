use thiserror::Error;

/// Errores de la capa de planificación / ejecución de tareas.
#[derive(Debug, Error)]
pub enum GridTaskError {
    /// Falla al descargar o parsear el catálogo de tiles (fatal).
    #[error("no se pudo cargar el catálogo de tiles: {0}")]
    CatalogLoad(String),

    /// Valor de --datetime mal formado (fatal, antes de cualquier I/O).
    #[error("{0} no es un valor válido para --datetime")]
    InvalidDateRange(String),

    #[error("tile no encontrado: ({tile_id}, {country_code})")]
    NotFound {
        tile_id: String,
        country_code: String,
    },

    /// El store del log de intentos no es accesible (fatal).
    #[error("log de intentos no disponible en {path}: {message}")]
    LogUnavailable { path: String, message: String },

    /// El colaborador externo falló procesando una tarea.
    #[error("falló la tarea {task}: {message}")]
    TaskExecution { task: String, message: String },
}

pub type Result<T> = std::result::Result<T, GridTaskError>;

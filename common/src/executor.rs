use anyhow::Context;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::{
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::Arc,
};
use tracing::{error, info, warn};

use crate::attempt_log::{AttemptLog, AttemptStatus, LogStore};
use crate::error::{GridTaskError, Result};
use crate::grid::{GridCatalog, Tile};
use crate::period;
use crate::task::TaskKey;

/* =========================
   Colaboradores externos
   ========================= */

/// Handle opaco a un raster producido por el colaborador externo.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Raster {
    /// Archivo donde está el raster (temporal hasta que lo escribe el Writer).
    pub path: PathBuf,
    pub bands: Vec<String>,
    pub nodata: Option<i32>,
    /// Propiedades extra que viajan hasta la salida (ej: dep_version).
    pub attrs: Map<String, Value>,
}

/// Todo lo que necesita el loader para un tile y una ventana de tiempo.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub key: TaskKey,
    pub tile: Tile,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Carga las bandas de un tile para la ventana pedida.
pub trait Loader: Send + Sync {
    fn load(&self, input: &TaskInput) -> anyhow::Result<Raster>;
}

/// Estrategia de composición: raster de entrada -> raster de salida.
pub trait Processor: Send + Sync {
    fn process(&self, raster: Raster) -> anyhow::Result<Raster>;
}

/// Escribe el raster en el destino durable y devuelve las rutas escritas.
pub trait Writer: Send + Sync {
    fn write(&self, key: &TaskKey, raster: &Raster) -> anyhow::Result<Vec<String>>;
}

impl<F> Loader for F
where
    F: Fn(&TaskInput) -> anyhow::Result<Raster> + Send + Sync,
{
    fn load(&self, input: &TaskInput) -> anyhow::Result<Raster> {
        self(input)
    }
}

impl<F> Processor for F
where
    F: Fn(Raster) -> anyhow::Result<Raster> + Send + Sync,
{
    fn process(&self, raster: Raster) -> anyhow::Result<Raster> {
        self(raster)
    }
}

impl<F> Writer for F
where
    F: Fn(&TaskKey, &Raster) -> anyhow::Result<Vec<String>> + Send + Sync,
{
    fn write(&self, key: &TaskKey, raster: &Raster) -> anyhow::Result<Vec<String>> {
        self(key, raster)
    }
}

/* =========================
   Ejecutor
   ========================= */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { paths: Vec<String> },
    Failed { message: String },
}

/// Resultado de `run_tasks` cuando se sigue ante errores.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<TaskKey>,
    pub failed: Vec<(TaskKey, String)>,
}

/// Ejecuta una tarea por vez: resuelve el tile y la ventana, llama al colaborador
/// y deja exactamente un registro en el log por cada invocación.
pub struct TaskExecutor<S: LogStore> {
    catalog: Arc<GridCatalog>,
    log: AttemptLog<S>,
    loader: Box<dyn Loader>,
    processor: Box<dyn Processor>,
    writer: Box<dyn Writer>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic sin mensaje".to_string()
    }
}

impl<S: LogStore> TaskExecutor<S> {
    pub fn new(
        catalog: Arc<GridCatalog>,
        log: AttemptLog<S>,
        loader: impl Loader + 'static,
        processor: impl Processor + 'static,
        writer: impl Writer + 'static,
    ) -> Self {
        Self {
            catalog,
            log,
            loader: Box::new(loader),
            processor: Box::new(processor),
            writer: Box::new(writer),
        }
    }

    pub fn log(&self) -> &AttemptLog<S> {
        &self.log
    }

    /// load -> process -> write. Un panic del colaborador cuenta como fallo.
    fn run_collaborators(&self, input: &TaskInput) -> anyhow::Result<Vec<String>> {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<Vec<String>> {
            let raster = self
                .loader
                .load(input)
                .with_context(|| format!("cargando {}", input.key))?;
            let raster = self
                .processor
                .process(raster)
                .with_context(|| format!("procesando {}", input.key))?;
            self.writer
                .write(&input.key, &raster)
                .with_context(|| format!("escribiendo {}", input.key))
        }));

        match attempt {
            Ok(res) => res,
            Err(payload) => Err(anyhow::anyhow!(
                "panic en el procesamiento de {}: {}",
                input.key,
                panic_message(payload.as_ref())
            )),
        }
    }

    /// Ejecuta una tarea.
    ///
    /// - Tile desconocido o período inválido: error, sin registro (no se invocó nada).
    /// - Éxito: primero termina la escritura, después se registra "success".
    /// - Fallo del colaborador: se registra "failure" con el error como comentario
    ///   y se devuelve `Outcome::Failed`.
    pub fn execute(&self, key: &TaskKey) -> Result<Outcome> {
        let tile = self.catalog.get(&key.tile_id, &key.country_code)?;
        let (start, end) = period::year_window(&key.period)?;

        let input = TaskInput {
            key: key.clone(),
            tile: tile.clone(),
            start,
            end,
        };

        info!("procesando {} ({} a {})", key, start, end);

        match self.run_collaborators(&input) {
            Ok(paths) => {
                self.log.append(key, AttemptStatus::Success, &paths, "")?;
                info!("tarea {} terminada, {} archivos", key, paths.len());
                Ok(Outcome::Succeeded { paths })
            }
            Err(e) => {
                let message = format!("{e:#}");
                self.log
                    .append(key, AttemptStatus::Failure, &[], &message)?;
                warn!("tarea {} falló: {}", key, message);
                Ok(Outcome::Failed { message })
            }
        }
    }

    /// Ejecuta varias tareas en orden.
    ///
    /// Con `continue_on_error = false` (default de la CLI) el primer fallo corta
    /// la corrida con `TaskExecution`; con `true` se registra y se sigue.
    pub fn run_tasks(&self, keys: &[TaskKey], continue_on_error: bool) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for key in keys {
            match self.execute(key)? {
                Outcome::Succeeded { .. } => summary.succeeded.push(key.clone()),
                Outcome::Failed { message } => {
                    if !continue_on_error {
                        error!("abortando la corrida por el fallo de {}", key);
                        return Err(GridTaskError::TaskExecution {
                            task: key.to_string(),
                            message,
                        });
                    }
                    summary.failed.push((key.clone(), message));
                }
            }
        }

        Ok(summary)
    }
}

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use common::config::{BASE_PRODUCT, DEFAULT_DATASET_ID};
use common::{
    AttemptLog, FileStore, GridCatalog, ItemPath, Settings, TaskExecutor, TaskKey, TaskParams,
    LOG_HEADER,
};

use crate::collaborators::{CommandLoader, LocalDsWriter, RgbaCompositeProcessor};

/// Los flags son los mismos campos que emite plan-tasks por tarea.
#[derive(Parser, Debug)]
#[command(name = "run-task")]
#[command(about = "Procesa una tarea (tile × período) y registra el resultado en el log de intentos")]
struct Cli {
    /// tile_id del tile
    #[arg(long)]
    region_code: String,

    /// country_code del tile
    #[arg(long)]
    region_index: String,

    #[arg(long)]
    datetime: String,

    #[arg(long)]
    version: String,

    #[arg(long, default_value = DEFAULT_DATASET_ID)]
    dataset_id: String,
}

impl Cli {
    fn task_key(&self) -> TaskKey {
        TaskKey::from(&TaskParams {
            region_code: self.region_code.clone(),
            region_index: self.region_index.clone(),
            datetime: self.datetime.clone(),
        })
    }
}

/// Ejecuta exactamente una tarea.
/// - Carga el catálogo y abre el log de la ventana pedida (sin truncar).
/// - Corre loader -> processor -> writer en un hilo de bloqueo.
/// - Cualquier fallo corta con exit != 0 (ya quedó registrado en el log).
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let key = cli.task_key();
    info!("worker {} con tarea {}", hostname, key);

    let loader_cmd = settings
        .loader_cmd
        .clone()
        .context("TILE_LOADER_CMD no está definida")?;

    let catalog = Arc::new(GridCatalog::load(&settings.grid_url).await?);

    let item_path = ItemPath::new(BASE_PRODUCT, &cli.dataset_id, &cli.version, &cli.datetime);
    let log_path = settings.data_root.join(item_path.log_path());
    let log = AttemptLog::open(FileStore::new(&log_path), LOG_HEADER, false)?;

    // carpeta temporal propia de esta corrida
    let scratch = settings
        .scratch_dir
        .join(format!("run-{}", uuid::Uuid::new_v4()));

    let executor = TaskExecutor::new(
        catalog,
        log,
        CommandLoader::new(loader_cmd, &scratch),
        RgbaCompositeProcessor::new(&cli.version),
        LocalDsWriter::new(settings.output_root.clone(), item_path, false),
    );

    let task = key.clone();
    let handle = tokio::task::spawn_blocking(move || executor.run_tasks(&[task], false));

    let result = match handle.await {
        Ok(res) => res,
        Err(e) => return Err(anyhow!("panic o join error en tarea {}: {:?}", key, e)),
    };

    if let Err(e) = std::fs::remove_dir_all(&scratch) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("no se pudo borrar {}: {}", scratch.display(), e);
        }
    }

    let summary = result?;
    info!(
        "tarea {} terminada ({} ok), registrada en {}",
        key,
        summary.succeeded.len(),
        log_path.display()
    );

    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use tracing::info;

use common::config::{BASE_PRODUCT, DEFAULT_DATASET_ID};
use common::{period, planner, GridCatalog, ItemPath, PlanRequest, Settings};

use crate::history;

/// Variables de entorno (ver common::config::Settings):
/// - GRID_URL: catálogo de tiles (URL o archivo local)
/// - DATA_ROOT: raíz de los logs de intentos
#[derive(Parser, Debug)]
#[command(name = "plan-tasks")]
#[command(about = "Genera la lista JSON de tareas (tile × año) pendientes según el log de intentos")]
struct Cli {
    /// "ALL" o lista de códigos de país separados por coma (ej: FJ,TO)
    #[arg(long)]
    regions: String,

    /// Año o rango de años, ej: 2022 o 2020-2022
    #[arg(long)]
    datetime: String,

    /// Versión del dataset (forma parte de la ruta del log)
    #[arg(long)]
    version: String,

    /// Máximo de tareas a emitir (las primeras del plan)
    #[arg(long)]
    limit: Option<usize>,

    /// No reintentar tareas cuyo último intento falló
    #[arg(long)]
    no_retry_errors: bool,

    #[arg(long, default_value = DEFAULT_DATASET_ID)]
    dataset_id: String,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Validamos --datetime antes de cualquier I/O
    let periods = period::expand(&cli.datetime)?;

    let settings = Settings::from_env();

    let request = PlanRequest {
        country_codes: planner::parse_regions(&cli.regions),
        datetime: cli.datetime.clone(),
        limit: cli.limit,
        include_failed: !cli.no_retry_errors,
    };

    info!(
        "planificando dataset={} version={} datetime={} ({} períodos) regiones={}",
        cli.dataset_id,
        cli.version,
        cli.datetime,
        periods.len(),
        cli.regions
    );

    let catalog = GridCatalog::load(&settings.grid_url).await?;

    let item_path = ItemPath::new(BASE_PRODUCT, &cli.dataset_id, &cli.version, &cli.datetime);
    let statuses = history::collect_statuses(&settings.data_root, &item_path)?;

    let tasks = planner::plan(&catalog, &request, &statuses)?;
    let params = planner::to_params(&tasks);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, &params).context("escribiendo tareas en stdout")?;
    writeln!(out)?;

    Ok(())
}

use std::{env, path::PathBuf};

/// Producto base de las imágenes (Sentinel-2).
pub const BASE_PRODUCT: &str = "s2";
pub const DEFAULT_DATASET_ID: &str = "cloudless";
/// Valor nodata de los rasters de salida.
pub const OUTPUT_NODATA: i32 = -32767;

const DEFAULT_GRID_URL: &str =
    "https://raw.githubusercontent.com/digitalearthpacific/dep-grid/master/grid_pacific.geojson";
const DEFAULT_DATA_ROOT: &str = "/data";
const DEFAULT_OUTPUT_ROOT: &str = "/data/output";
const DEFAULT_SCRATCH_DIR: &str = "/data/tmp";

/// Lee una variable de entorno; si no está (o está vacía) usa el default.
fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Configuración tomada del entorno. Los flags de la CLI van aparte (clap).
///
/// - GRID_URL:        catálogo de tiles (URL http(s) o ruta local)
/// - DATA_ROOT:       raíz donde se guardan los logs de intentos
/// - OUTPUT_ROOT:     raíz donde el worker escribe los rasters
/// - SCRATCH_DIR:     carpeta temporal del worker
/// - TILE_LOADER_CMD: comando externo que genera el raster de un tile
#[derive(Debug, Clone)]
pub struct Settings {
    pub grid_url: String,
    pub data_root: PathBuf,
    pub output_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub loader_cmd: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            grid_url: env_or("GRID_URL", DEFAULT_GRID_URL),
            data_root: PathBuf::from(env_or("DATA_ROOT", DEFAULT_DATA_ROOT)),
            output_root: PathBuf::from(env_or("OUTPUT_ROOT", DEFAULT_OUTPUT_ROOT)),
            scratch_dir: PathBuf::from(env_or("SCRATCH_DIR", DEFAULT_SCRATCH_DIR)),
            loader_cmd: env::var("TILE_LOADER_CMD")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

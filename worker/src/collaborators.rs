use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info};

use common::config::OUTPUT_NODATA;
use common::{ItemPath, Loader, Processor, Raster, TaskInput, TaskKey, Writer};

/// Bandas del compuesto RGB de Sentinel-2.
pub const RGB_BANDS: [&str; 3] = ["B04", "B03", "B02"];

/* =========================
   Loader: comando externo
   ========================= */

/// Delega la carga de bandas en un comando externo (`sh -c`).
///
/// El comando recibe los datos de la tarea por variables de entorno
/// (TILE_ID, COUNTRY_CODE, PERIOD, START_DATE, END_DATE, TILE_GEOMETRY) y
/// tiene que dejar el raster en OUTPUT_PATH.
pub struct CommandLoader {
    command: String,
    scratch_dir: PathBuf,
}

impl CommandLoader {
    pub fn new(command: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            scratch_dir: scratch_dir.into(),
        }
    }
}

impl Loader for CommandLoader {
    fn load(&self, input: &TaskInput) -> Result<Raster> {
        fs::create_dir_all(&self.scratch_dir)
            .with_context(|| format!("creando {}", self.scratch_dir.display()))?;

        let key = &input.key;
        let output_path = self.scratch_dir.join(format!(
            "{}_{}_{}.tif",
            key.tile_id, key.country_code, key.period
        ));

        debug!("ejecutando loader para {}: {}", key, self.command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("TILE_ID", &key.tile_id)
            .env("COUNTRY_CODE", &key.country_code)
            .env("PERIOD", &key.period)
            .env("START_DATE", input.start.to_string())
            .env("END_DATE", input.end.to_string())
            .env("TILE_GEOMETRY", input.tile.geometry.to_string())
            .env("OUTPUT_PATH", &output_path)
            .output()
            .context("no se pudo lanzar el loader")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "el loader terminó con {}: {}",
                output.status,
                stderr.trim()
            );
        }

        if !output_path.is_file() {
            bail!(
                "el loader no generó {}",
                output_path.display()
            );
        }

        Ok(Raster {
            path: output_path,
            ..Raster::default()
        })
    }
}

/* =========================
   Processor: compuesto RGBA
   ========================= */

/// Marca el raster como compuesto RGB anual: bandas, nodata y versión.
pub struct RgbaCompositeProcessor {
    version: String,
}

impl RgbaCompositeProcessor {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
        }
    }
}

impl Processor for RgbaCompositeProcessor {
    fn process(&self, mut raster: Raster) -> Result<Raster> {
        if raster.bands.is_empty() {
            raster.bands = RGB_BANDS.iter().map(|b| b.to_string()).collect();
        }
        raster.nodata = Some(OUTPUT_NODATA);
        raster
            .attrs
            .insert("dep_version".to_string(), json!(self.version));
        raster
            .attrs
            .insert("composite".to_string(), json!("annual_mean_rgba"));
        Ok(raster)
    }
}

/* =========================
   Writer: disco local / bucket montado
   ========================= */

/// Copia el raster a `<output_root>/<item path>` y escribe un JSON con sus
/// propiedades al lado. Sin `overwrite` no pisa salidas existentes.
pub struct LocalDsWriter {
    output_root: PathBuf,
    item_path: ItemPath,
    overwrite: bool,
}

impl LocalDsWriter {
    pub fn new(output_root: impl Into<PathBuf>, item_path: ItemPath, overwrite: bool) -> Self {
        Self {
            output_root: output_root.into(),
            item_path,
            overwrite,
        }
    }
}

/// Escribe en un temporal y renombra, así nunca queda un archivo a medias.
fn write_atomically(dest: &Path, write: impl FnOnce(&Path) -> std::io::Result<()>) -> Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dest.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("escribiendo {}", tmp.display()));
    }

    fs::rename(&tmp, dest).with_context(|| format!("moviendo a {}", dest.display()))?;
    Ok(())
}

impl Writer for LocalDsWriter {
    fn write(&self, key: &TaskKey, raster: &Raster) -> Result<Vec<String>> {
        let stem = self
            .output_root
            .join(self.item_path.output_stem(&key.tile_id, &key.country_code));

        let ext = raster
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("tif");
        let raster_dest = PathBuf::from(format!("{}.{}", stem.display(), ext));
        let meta_dest = PathBuf::from(format!("{}.json", stem.display()));

        if !self.overwrite && raster_dest.exists() {
            info!(
                "{} ya existe, no se sobreescribe",
                raster_dest.display()
            );
        } else {
            write_atomically(&raster_dest, |tmp| fs::copy(&raster.path, tmp).map(|_| ()))?;
        }

        let meta: Value = json!({
            "tile_id": key.tile_id,
            "country_code": key.country_code,
            "datetime": key.period,
            "bands": raster.bands,
            "nodata": raster.nodata,
            "properties": raster.attrs,
        });

        if self.overwrite || !meta_dest.exists() {
            let body = serde_json::to_vec_pretty(&meta)?;
            write_atomically(&meta_dest, |tmp| fs::write(tmp, &body))?;
        }

        Ok(vec![
            raster_dest.to_string_lossy().to_string(),
            meta_dest.to_string_lossy().to_string(),
        ])
    }
}

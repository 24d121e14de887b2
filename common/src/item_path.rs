use std::path::{Path, PathBuf};

/// Rutas de un dataset: log de intentos y salidas por tile.
///
/// Layout (relativo a una raíz):
///   dep_<producto>_<dataset>/<version>/logs/dep_<producto>_<dataset>_<version>_<datetime>_log.csv
///   dep_<producto>_<dataset>/<version>/<tile>/<país>/<datetime>/dep_<producto>_<dataset>_<tile>_<país>_<datetime>
///
/// Los puntos de la versión se reemplazan por guiones ("0.1.0" -> "0-1-0").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPath {
    pub base_product: String,
    pub dataset_id: String,
    pub version: String,
    pub datetime: String,
}

impl ItemPath {
    pub fn new(base_product: &str, dataset_id: &str, version: &str, datetime: &str) -> Self {
        Self {
            base_product: base_product.to_string(),
            dataset_id: dataset_id.to_string(),
            version: version.replace('.', "-"),
            datetime: datetime.to_string(),
        }
    }

    fn item_prefix(&self) -> String {
        format!("dep_{}_{}", self.base_product, self.dataset_id)
    }

    fn version_dir(&self) -> PathBuf {
        Path::new(&self.item_prefix()).join(&self.version)
    }

    /// Carpeta donde viven todos los logs de este dataset + versión.
    pub fn log_dir(&self) -> PathBuf {
        self.version_dir().join("logs")
    }

    pub fn log_file_name(&self) -> String {
        format!(
            "{}_{}_{}_log.csv",
            self.item_prefix(),
            self.version,
            self.datetime
        )
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir().join(self.log_file_name())
    }

    /// Prefijo (sin extensión) de los archivos de salida de un tile.
    pub fn output_stem(&self, tile_id: &str, country_code: &str) -> PathBuf {
        self.version_dir()
            .join(tile_id)
            .join(country_code)
            .join(&self.datetime)
            .join(format!(
                "{}_{}_{}_{}",
                self.item_prefix(),
                tile_id,
                country_code,
                self.datetime
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_path_incluye_dataset_version_y_ventana() {
        let p = ItemPath::new("s2", "cloudless", "0.1.0", "2021-2022");
        assert_eq!(
            p.log_path(),
            PathBuf::from("dep_s2_cloudless/0-1-0/logs/dep_s2_cloudless_0-1-0_2021-2022_log.csv")
        );
    }

    #[test]
    fn ventanas_distintas_comparten_carpeta_de_logs() {
        let a = ItemPath::new("s2", "cloudless", "1", "2021");
        let b = ItemPath::new("s2", "cloudless", "1", "2021-2023");
        assert_eq!(a.log_dir(), b.log_dir());
        assert_ne!(a.log_path(), b.log_path());
    }

    #[test]
    fn output_stem_separa_por_tile_pais_y_periodo() {
        let p = ItemPath::new("s2", "cloudless", "1", "2021");
        assert_eq!(
            p.output_stem("T1", "FJ"),
            PathBuf::from("dep_s2_cloudless/1/T1/FJ/2021/dep_s2_cloudless_T1_FJ_2021")
        );
    }
}

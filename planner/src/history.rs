use anyhow::{Context, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use common::{AttemptLog, AttemptRecord, FileStore, ItemPath, StatusMap, LOG_HEADER};

/// Reconstruye el estado de las tareas para una planificación.
///
/// Abre (o crea) el log de la ventana pedida y además lee los demás logs
/// `*_log.csv` del mismo dataset y versión: `run-task` registra con la ventana
/// de un solo año, así que un plan "2021-2023" tiene que ver también esos logs.
/// Los registros llevan la clave completa, así que mezclarlos es seguro.
pub fn collect_statuses(data_root: &Path, item_path: &ItemPath) -> Result<StatusMap> {
    let own_path = data_root.join(item_path.log_path());

    let own_log = AttemptLog::open(FileStore::new(&own_path), LOG_HEADER, false)?;
    let mut records: Vec<AttemptRecord> = own_log.records()?;
    debug!("{} registros en {}", records.len(), own_path.display());

    for sibling in sibling_logs(data_root, item_path, &own_path)? {
        match read_existing(&sibling) {
            Ok(mut recs) => {
                debug!("{} registros en {}", recs.len(), sibling.display());
                records.append(&mut recs);
            }
            // historia parcial es mejor que no planificar
            Err(e) => warn!("no se pudo leer {}, se ignora: {:#}", sibling.display(), e),
        }
    }

    Ok(StatusMap::from_records(records))
}

fn sibling_logs(data_root: &Path, item_path: &ItemPath, own_path: &Path) -> Result<Vec<PathBuf>> {
    let pattern = data_root.join(item_path.log_dir()).join("*_log.csv");
    let pattern = pattern.to_string_lossy().to_string();

    let mut out = Vec::new();
    for entry in glob(&pattern).with_context(|| format!("patrón inválido {pattern}"))? {
        match entry {
            Ok(path) if path.is_file() && path != own_path => out.push(path),
            Ok(_) => {}
            Err(e) => warn!("no se pudo listar {}: {}", pattern, e),
        }
    }
    Ok(out)
}

/// Lee un log que ya existe sin crear ni modificar nada.
fn read_existing(path: &Path) -> Result<Vec<AttemptRecord>> {
    let log = AttemptLog::open(FileStore::new(path), LOG_HEADER, false)?;
    Ok(log.records()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AttemptStatus, TaskKey};
    use std::{env, fs};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("planner_history_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[test]
    fn collect_statuses_crea_el_log_pedido_si_no_existe() {
        let root = temp_dir("crea");
        let item = ItemPath::new("s2", "cloudless", "1", "2021-2022");

        let statuses = collect_statuses(&root, &item).unwrap();
        assert!(statuses.is_empty());

        let text = fs::read_to_string(root.join(item.log_path())).unwrap();
        assert_eq!(text, format!("{LOG_HEADER}\n"));
    }

    #[test]
    fn collect_statuses_incluye_logs_de_un_solo_anio() {
        let root = temp_dir("hermanos");
        let done = TaskKey::new("T1", "FJ", "2021");
        let failed = TaskKey::new("T2", "FJ", "2022");

        // lo que dejaría run-task con --datetime 2021 y 2022
        for (year, key, status) in [
            ("2021", &done, AttemptStatus::Success),
            ("2022", &failed, AttemptStatus::Failure),
        ] {
            let item = ItemPath::new("s2", "cloudless", "1", year);
            let log = AttemptLog::open(
                FileStore::new(root.join(item.log_path())),
                LOG_HEADER,
                false,
            )
            .unwrap();
            log.append(key, status, &[], "").unwrap();
        }

        let range = ItemPath::new("s2", "cloudless", "1", "2021-2022");
        let statuses = collect_statuses(&root, &range).unwrap();

        assert_eq!(statuses.status(&done), Some(&AttemptStatus::Success));
        assert_eq!(statuses.status(&failed), Some(&AttemptStatus::Failure));
    }

    #[test]
    fn collect_statuses_ignora_otras_versiones() {
        let root = temp_dir("versiones");
        let key = TaskKey::new("T1", "FJ", "2021");

        let old = ItemPath::new("s2", "cloudless", "0.1", "2021");
        let log = AttemptLog::open(FileStore::new(root.join(old.log_path())), LOG_HEADER, false)
            .unwrap();
        log.append(&key, AttemptStatus::Success, &[], "").unwrap();

        let current = ItemPath::new("s2", "cloudless", "0.2", "2021");
        let statuses = collect_statuses(&root, &current).unwrap();
        assert_eq!(statuses.status(&key), None);
    }
}

use std::collections::HashSet;
use tracing::{debug, info};

use crate::attempt_log::{AttemptStatus, StatusMap};
use crate::error::Result;
use crate::grid::GridCatalog;
use crate::period;
use crate::task::{TaskKey, TaskParams};

/// Parámetros de una planificación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    /// None = todos los países del catálogo.
    pub country_codes: Option<HashSet<String>>,
    /// Expresión de --datetime ("2021" o "2021-2023").
    pub datetime: String,
    pub limit: Option<usize>,
    /// Reintentar tareas cuyo último intento falló.
    pub include_failed: bool,
}

/// "ALL" (sin importar mayúsculas) -> None; si no, lista separada por comas.
pub fn parse_regions(raw: &str) -> Option<HashSet<String>> {
    if raw.trim().eq_ignore_ascii_case("ALL") {
        return None;
    }

    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Decide si una tarea candidata se vuelve a ejecutar según su último intento.
fn should_run(status: Option<&AttemptStatus>, include_failed: bool) -> bool {
    match status {
        None => true,
        Some(AttemptStatus::Success) => false,
        Some(AttemptStatus::Failure) => include_failed,
        Some(AttemptStatus::Other(_)) => true,
    }
}

/// Genera la lista ordenada de tareas a ejecutar:
/// tiles del subconjunto × períodos (tile afuera, período adentro),
/// sin las ya exitosas (ni las fallidas si `include_failed` es false),
/// truncada a las primeras `limit`.
pub fn plan(
    catalog: &GridCatalog,
    request: &PlanRequest,
    statuses: &StatusMap,
) -> Result<Vec<TaskKey>> {
    let periods = period::expand(&request.datetime)?;
    let tiles = catalog.subset(request.country_codes.as_ref());

    let candidates = tiles.len() * periods.len();
    let mut skipped = 0usize;
    let mut tasks = Vec::new();

    'outer: for tile in &tiles {
        for p in &periods {
            let key = TaskKey::for_tile(tile, p);

            if !should_run(statuses.status(&key), request.include_failed) {
                debug!("salteando {}: último estado {:?}", key, statuses.status(&key));
                skipped += 1;
                continue;
            }

            tasks.push(key);

            if request.limit.is_some_and(|limit| tasks.len() >= limit) {
                break 'outer;
            }
        }
    }

    // limit = 0 no deja pasar nada
    if let Some(limit) = request.limit {
        tasks.truncate(limit);
    }

    info!(
        "plan: {} tiles × {} períodos = {} candidatas, {} salteadas por el log, {} a ejecutar",
        tiles.len(),
        periods.len(),
        candidates,
        skipped,
        tasks.len()
    );

    Ok(tasks)
}

/// Forma JSON que consume el orquestador.
pub fn to_params(tasks: &[TaskKey]) -> Vec<TaskParams> {
    tasks.iter().map(TaskParams::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt_log::{AttemptLog, MemoryStore, LOG_HEADER};
    use crate::grid::tests::sample_catalog;

    fn request(regions: &str, datetime: &str) -> PlanRequest {
        PlanRequest {
            country_codes: parse_regions(regions),
            datetime: datetime.to_string(),
            limit: None,
            include_failed: true,
        }
    }

    fn keys(list: &[(&str, &str, &str)]) -> Vec<TaskKey> {
        list.iter()
            .map(|(t, c, p)| TaskKey::new(t, c, p))
            .collect()
    }

    fn empty_log() -> AttemptLog<MemoryStore> {
        AttemptLog::open(MemoryStore::new(), LOG_HEADER, false).unwrap()
    }

    #[test]
    fn parse_regions_all_es_none() {
        assert_eq!(parse_regions("ALL"), None);
        assert_eq!(parse_regions("all"), None);
    }

    #[test]
    fn parse_regions_separa_por_comas() {
        let codes = parse_regions("FJ, TO,,WS").unwrap();
        assert_eq!(codes.len(), 3);
        assert!(codes.contains("TO"));
    }

    #[test]
    fn plan_sin_log_genera_producto_tile_por_periodo() {
        let cat = sample_catalog();
        let out = plan(&cat, &request("FJ", "2021-2022"), &StatusMap::default()).unwrap();

        assert_eq!(
            out,
            keys(&[
                ("T1", "FJ", "2021"),
                ("T1", "FJ", "2022"),
                ("T2", "FJ", "2021"),
                ("T2", "FJ", "2022"),
            ])
        );
    }

    #[test]
    fn plan_excluye_tareas_exitosas_del_log() {
        let cat = sample_catalog();
        let log = empty_log();
        log.append(
            &TaskKey::new("T1", "FJ", "2021"),
            AttemptStatus::Success,
            &[],
            "",
        )
        .unwrap();

        let out = plan(
            &cat,
            &request("FJ", "2021-2022"),
            &log.current_statuses().unwrap(),
        )
        .unwrap();

        assert_eq!(
            out,
            keys(&[
                ("T1", "FJ", "2022"),
                ("T2", "FJ", "2021"),
                ("T2", "FJ", "2022"),
            ])
        );
    }

    #[test]
    fn plan_fallidas_se_reintentan_solo_si_include_failed() {
        let cat = sample_catalog();
        let log = empty_log();
        let failed = TaskKey::new("T3", "TO", "2020");
        log.append(&failed, AttemptStatus::Failure, &[], "boom")
            .unwrap();
        let statuses = log.current_statuses().unwrap();

        let mut req = request("TO", "2020");
        req.include_failed = false;
        assert!(plan(&cat, &req, &statuses).unwrap().is_empty());

        req.include_failed = true;
        assert_eq!(plan(&cat, &req, &statuses).unwrap(), vec![failed]);
    }

    #[test]
    fn plan_estado_desconocido_se_vuelve_a_planificar() {
        let cat = sample_catalog();
        let log = empty_log();
        let key = TaskKey::new("T3", "TO", "2020");
        log.append(&key, AttemptStatus::Other("wrote".into()), &[], "")
            .unwrap();

        let mut req = request("TO", "2020");
        req.include_failed = false;
        let out = plan(&cat, &req, &log.current_statuses().unwrap()).unwrap();
        assert_eq!(out, vec![key]);
    }

    #[test]
    fn plan_limit_es_prefijo_del_plan_completo() {
        let cat = sample_catalog();
        let log = empty_log();
        log.append(
            &TaskKey::new("T1", "FJ", "2021"),
            AttemptStatus::Success,
            &[],
            "",
        )
        .unwrap();
        let statuses = log.current_statuses().unwrap();

        let full = plan(&cat, &request("ALL", "2020-2022"), &statuses).unwrap();
        assert!(full.len() >= 3);

        let mut limited_req = request("ALL", "2020-2022");
        limited_req.limit = Some(3);
        let limited = plan(&cat, &limited_req, &statuses).unwrap();

        assert_eq!(limited, full[..3].to_vec());
    }

    #[test]
    fn plan_limit_cero_no_devuelve_tareas() {
        let cat = sample_catalog();
        let mut req = request("ALL", "2021");
        req.limit = Some(0);
        assert!(plan(&cat, &req, &StatusMap::default()).unwrap().is_empty());
    }

    #[test]
    fn plan_es_determinista() {
        let cat = sample_catalog();
        let log = empty_log();
        log.append(
            &TaskKey::new("T2", "FJ", "2022"),
            AttemptStatus::Failure,
            &[],
            "",
        )
        .unwrap();
        let statuses = log.current_statuses().unwrap();
        let req = request("ALL", "2021-2022");

        let a = plan(&cat, &req, &statuses).unwrap();
        let b = plan(&cat, &req, &statuses).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn plan_datetime_invalido_falla() {
        let cat = sample_catalog();
        let res = plan(&cat, &request("ALL", "2020-2021-2022"), &StatusMap::default());
        assert!(matches!(
            res,
            Err(crate::error::GridTaskError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn plan_region_inexistente_devuelve_vacio() {
        let cat = sample_catalog();
        let out = plan(&cat, &request("NZ", "2021"), &StatusMap::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn to_params_respeta_el_orden() {
        let tasks = keys(&[("T1", "FJ", "2021"), ("T2", "FJ", "2021")]);
        let params = to_params(&tasks);
        assert_eq!(params[0].region_code, "T1");
        assert_eq!(params[1].region_code, "T2");
        assert_eq!(params[1].region_index, "FJ");
    }
}

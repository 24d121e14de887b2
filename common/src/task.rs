use serde::{Deserialize, Serialize};
use std::fmt;

use crate::grid::Tile;
use crate::period::TimePeriod;

/// Identidad de una unidad de trabajo: (tile_id, country_code, período).
/// Dos tareas con la misma clave son la misma tarea.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub tile_id: String,
    pub country_code: String,
    pub period: TimePeriod,
}

impl TaskKey {
    pub fn new(tile_id: &str, country_code: &str, period: &str) -> Self {
        Self {
            tile_id: tile_id.to_string(),
            country_code: country_code.to_string(),
            period: period.to_string(),
        }
    }

    pub fn for_tile(tile: &Tile, period: &str) -> Self {
        Self::new(&tile.tile_id, &tile.country_code, period)
    }

    /// Codificación usada en la columna `index` del log: "tile_id,country_code,período".
    pub fn encode(&self) -> String {
        format!("{},{},{}", self.tile_id, self.country_code, self.period)
    }

    /// Inverso de `encode`. Devuelve None si la columna no tiene tres partes no vacías.
    pub fn decode(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.trim().split(',').map(str::trim).collect();
        match parts.as_slice() {
            [tile_id, country_code, period]
                if !tile_id.is_empty() && !country_code.is_empty() && !period.is_empty() =>
            {
                Some(Self::new(tile_id, country_code, period))
            }
            _ => None,
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.tile_id, self.country_code, self.period)
    }
}

/// Forma JSON de una tarea planificada, tal como la consume el orquestador
/// (y como la recibe `run-task` en sus flags).
///
/// `region-code` lleva el primer componente de la clave (tile_id) y
/// `region-index` el segundo (country_code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    #[serde(rename = "region-code")]
    pub region_code: String,
    #[serde(rename = "region-index")]
    pub region_index: String,
    pub datetime: String,
}

impl From<&TaskKey> for TaskParams {
    fn from(key: &TaskKey) -> Self {
        Self {
            region_code: key.tile_id.clone(),
            region_index: key.country_code.clone(),
            datetime: key.period.clone(),
        }
    }
}

impl From<&TaskParams> for TaskKey {
    fn from(params: &TaskParams) -> Self {
        TaskKey::new(&params.region_code, &params.region_index, &params.datetime)
    }
}

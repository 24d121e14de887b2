use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::{GridTaskError, Result};

/// Un tile de la grilla. Inmutable una vez cargado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub tile_id: String,
    pub country_code: String,
    /// Geometría GeoJSON tal cual viene del catálogo (opaca para el planner).
    pub geometry: Value,
}

impl Tile {
    pub fn key(&self) -> (&str, &str) {
        (&self.tile_id, &self.country_code)
    }
}

/// Catálogo de tiles, ordenado e indexado por (tile_id, country_code).
#[derive(Debug, Clone, Default)]
pub struct GridCatalog {
    tiles: Vec<Tile>,
    by_key: HashMap<(String, String), usize>,
}

/* --------- Formato GeoJSON del catálogo remoto --------- */

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    geometry: Value,
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
}

/// Los ids pueden venir como texto o como número; siempre los guardamos como texto.
fn property_as_string(props: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    match props.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl GridCatalog {
    /// Construye el catálogo validando que no haya claves repetidas.
    pub fn from_tiles(tiles: Vec<Tile>) -> Result<Self> {
        let mut by_key = HashMap::with_capacity(tiles.len());

        for (idx, tile) in tiles.iter().enumerate() {
            let key = (tile.tile_id.clone(), tile.country_code.clone());
            if by_key.insert(key, idx).is_some() {
                return Err(GridTaskError::CatalogLoad(format!(
                    "tile duplicado ({}, {})",
                    tile.tile_id, tile.country_code
                )));
            }
        }

        Ok(Self { tiles, by_key })
    }

    /// Parsea una FeatureCollection con propiedades `tile_id` y `country_code`.
    pub fn from_geojson(text: &str) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(text)
            .map_err(|e| GridTaskError::CatalogLoad(format!("GeoJSON inválido: {e}")))?;

        let mut tiles = Vec::with_capacity(collection.features.len());

        for (idx, feature) in collection.features.into_iter().enumerate() {
            let tile_id = property_as_string(&feature.properties, "tile_id").ok_or_else(|| {
                GridTaskError::CatalogLoad(format!("feature {idx} sin propiedad tile_id"))
            })?;
            let country_code = property_as_string(&feature.properties, "country_code")
                .ok_or_else(|| {
                    GridTaskError::CatalogLoad(format!("feature {idx} sin propiedad country_code"))
                })?;

            tiles.push(Tile {
                tile_id,
                country_code,
                geometry: feature.geometry,
            });
        }

        Self::from_tiles(tiles)
    }

    /// Carga el catálogo desde una URL http(s) o desde un archivo local.
    /// Se llama una sola vez al arrancar el proceso; el resultado se pasa por referencia.
    pub async fn load(source: &str) -> Result<Self> {
        let text = if source.starts_with("http://") || source.starts_with("https://") {
            debug!("descargando catálogo de tiles desde {}", source);
            let resp = reqwest::get(source)
                .await
                .map_err(|e| GridTaskError::CatalogLoad(format!("error HTTP: {e}")))?;

            if !resp.status().is_success() {
                return Err(GridTaskError::CatalogLoad(format!(
                    "{} devolvió status {}",
                    source,
                    resp.status()
                )));
            }

            resp.text()
                .await
                .map_err(|e| GridTaskError::CatalogLoad(format!("error leyendo respuesta: {e}")))?
        } else {
            let path = source.strip_prefix("file://").unwrap_or(source);
            std::fs::read_to_string(path)
                .map_err(|e| GridTaskError::CatalogLoad(format!("{path}: {e}")))?
        };

        let catalog = Self::from_geojson(&text)?;
        info!("catálogo cargado: {} tiles desde {}", catalog.len(), source);
        Ok(catalog)
    }

    /// Tiles cuyo country_code está en `country_codes`, en el orden del catálogo.
    /// Con `None` devuelve todos.
    pub fn subset(&self, country_codes: Option<&HashSet<String>>) -> Vec<&Tile> {
        match country_codes {
            None => self.tiles.iter().collect(),
            Some(codes) => self
                .tiles
                .iter()
                .filter(|t| codes.contains(&t.country_code))
                .collect(),
        }
    }

    pub fn get(&self, tile_id: &str, country_code: &str) -> Result<&Tile> {
        self.by_key
            .get(&(tile_id.to_string(), country_code.to_string()))
            .map(|&idx| &self.tiles[idx])
            .ok_or_else(|| GridTaskError::NotFound {
                tile_id: tile_id.to_string(),
                country_code: country_code.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

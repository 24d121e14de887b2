use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::{
    collections::HashMap,
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::{debug, warn};

use crate::error::{GridTaskError, Result};
use crate::task::TaskKey;

/// Encabezado fijo del log de intentos.
pub const LOG_HEADER: &str = "time|index|status|paths|comment";

const DELIMITER: u8 = b'|';

/* =========================
   Registros
   ========================= */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    Success,
    Failure,
    /// Cualquier otro estado escrito por otra herramienta. No cuenta como
    /// éxito ni como fallo: la tarea se vuelve a planificar.
    Other(String),
}

impl AttemptStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "success" => AttemptStatus::Success,
            "failure" => AttemptStatus::Failure,
            other => AttemptStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
            AttemptStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Una línea de historia. Una vez escrita no se edita ni se borra.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub key: TaskKey,
    pub status: AttemptStatus,
    pub output_paths: Vec<String>,
    pub comment: String,
}

impl AttemptRecord {
    pub fn new(
        key: TaskKey,
        status: AttemptStatus,
        output_paths: Vec<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            key,
            status,
            output_paths,
            comment: comment.into(),
        }
    }

    /// Serializa el registro como una línea delimitada por '|', terminada en '\n'.
    /// El writer de csv se encarga de citar comentarios con '|', comillas o saltos.
    fn to_line(&self) -> io::Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        let time = self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
        let index = self.key.encode();
        let paths = self.output_paths.join(",");

        writer
            .write_record([
                time.as_str(),
                index.as_str(),
                self.status.as_str(),
                paths.as_str(),
                self.comment.as_str(),
            ])
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let bytes = writer
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Interpreta una fila ya separada en columnas. None si está mal formada.
    fn from_row(row: &csv::StringRecord) -> Option<Self> {
        if row.len() < 3 || row.len() > 5 {
            return None;
        }

        let timestamp = parse_timestamp(row.get(0)?)?;
        let key = TaskKey::decode(row.get(1)?)?;
        let status = AttemptStatus::parse(row.get(2)?);
        let output_paths = row
            .get(3)
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let comment = row.get(4).unwrap_or("").to_string();

        Some(Self {
            timestamp,
            key,
            status,
            output_paths,
            comment,
        })
    }
}

/// Acepta RFC 3339 y también "YYYY-MM-DD HH:MM:SS[.ffffff]" (se asume UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/* =========================
   Estado actual por tarea
   ========================= */

/// Último registro por TaskKey ("el último gana").
#[derive(Debug, Clone, Default)]
pub struct StatusMap {
    latest: HashMap<TaskKey, AttemptRecord>,
}

impl StatusMap {
    /// Fold explícito sobre los registros: para cada clave se queda el de mayor
    /// timestamp; a igual timestamp gana el que aparece después (orden de append).
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = AttemptRecord>,
    {
        let mut latest: HashMap<TaskKey, AttemptRecord> = HashMap::new();

        for rec in records {
            let newer_exists = latest
                .get(&rec.key)
                .map_or(false, |current| current.timestamp > rec.timestamp);
            if !newer_exists {
                latest.insert(rec.key.clone(), rec);
            }
        }

        Self { latest }
    }

    pub fn status(&self, key: &TaskKey) -> Option<&AttemptStatus> {
        self.latest.get(key).map(|r| &r.status)
    }

    pub fn latest(&self, key: &TaskKey) -> Option<&AttemptRecord> {
        self.latest.get(key)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/* =========================
   Stores durables
   ========================= */

/// Almacenamiento durable del log: sólo crear, agregar y leer completo.
pub trait LogStore: Send + Sync {
    /// Descripción legible de dónde vive el log (para mensajes de error).
    fn location(&self) -> String;

    fn exists(&self) -> io::Result<bool>;

    /// Crea el log con `contents`. Falla con `AlreadyExists` si ya existe.
    fn create(&self, contents: &str) -> io::Result<()>;

    /// Reemplaza el log completo (sólo para overwrite_on_create).
    fn overwrite(&self, contents: &str) -> io::Result<()>;

    /// Agrega una línea completa de una sola vez.
    fn append(&self, line: &str) -> io::Result<()>;

    fn read_all(&self) -> io::Result<String>;
}

/// Log en el sistema de archivos (disco local o un bucket montado).
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl LogStore for FileStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn exists(&self) -> io::Result<bool> {
        self.path.try_exists()
    }

    fn create(&self, contents: &str) -> io::Result<()> {
        self.ensure_parent()?;
        // create_new: si otro proceso lo creó primero, devolvemos AlreadyExists
        // append: el encabezado no pisa una fila que otro worker ya agregó
        let mut file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&self.path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    }

    fn overwrite(&self, contents: &str) -> io::Result<()> {
        self.ensure_parent()?;
        fs::write(&self.path, contents)
    }

    fn append(&self, line: &str) -> io::Result<()> {
        // sin create: el log tiene que haberse abierto (con encabezado) antes
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()
    }

    fn read_all(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

/// Log en memoria, compartido entre clones. Útil para tests y dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.contents
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock memory store"))
    }
}

impl LogStore for MemoryStore {
    fn location(&self) -> String {
        "memory://attempt-log".to_string()
    }

    fn exists(&self) -> io::Result<bool> {
        Ok(self.lock()?.is_some())
    }

    fn create(&self, contents: &str) -> io::Result<()> {
        let mut guard = self.lock()?;
        if guard.is_some() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "log ya existe"));
        }
        *guard = Some(contents.to_string());
        Ok(())
    }

    fn overwrite(&self, contents: &str) -> io::Result<()> {
        *self.lock()? = Some(contents.to_string());
        Ok(())
    }

    fn append(&self, line: &str) -> io::Result<()> {
        match self.lock()?.as_mut() {
            Some(buf) => {
                buf.push_str(line);
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "log no creado")),
        }
    }

    fn read_all(&self) -> io::Result<String> {
        self.lock()?
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "log no creado"))
    }
}

/* =========================
   AttemptLog
   ========================= */

fn is_header(row: &csv::StringRecord) -> bool {
    row.iter()
        .map(str::trim)
        .eq(LOG_HEADER.split(DELIMITER as char))
}

/// Log append-only de intentos de tareas sobre un `LogStore`.
pub struct AttemptLog<S: LogStore> {
    store: S,
}

impl<S: LogStore> AttemptLog<S> {
    /// Abre el log. Si no existe lo crea con `header`; si existe y
    /// `overwrite_on_create` es false, se reutiliza tal cual (nunca se trunca).
    pub fn open(store: S, header: &str, overwrite_on_create: bool) -> Result<Self> {
        let mut header = header.to_string();
        if !header.ends_with('\n') {
            header.push('\n');
        }

        let unavailable = |e: io::Error| GridTaskError::LogUnavailable {
            path: store.location(),
            message: e.to_string(),
        };

        if overwrite_on_create {
            store.overwrite(&header).map_err(unavailable)?;
            debug!("log {} reiniciado", store.location());
        } else if !store.exists().map_err(unavailable)? {
            match store.create(&header) {
                Ok(()) => debug!("log {} creado", store.location()),
                // otro worker lo creó entre exists() y create()
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(unavailable(e)),
            }
        }

        Ok(Self { store })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn unavailable(&self, e: impl fmt::Display) -> GridTaskError {
        GridTaskError::LogUnavailable {
            path: self.store.location(),
            message: e.to_string(),
        }
    }

    /// Lee todas las filas válidas en orden de archivo. Las filas mal formadas
    /// se reportan y se saltean. El encabezado puede faltar o repetirse: toda
    /// fila igual a LOG_HEADER se descarta, esté donde esté.
    pub fn records(&self) -> Result<Vec<AttemptRecord>> {
        let text = self.store.read_all().map_err(|e| self.unavailable(e))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut out = Vec::new();

        for row in reader.records() {
            match row {
                Ok(row) => {
                    if is_header(&row) {
                        continue;
                    }
                    match AttemptRecord::from_row(&row) {
                        Some(rec) => out.push(rec),
                        None => warn!(
                            "fila {} mal formada en {}, se ignora: {:?}",
                            row.position().map_or(0, |p| p.line()),
                            self.store.location(),
                            row
                        ),
                    }
                }
                Err(e) => warn!(
                    "fila {} ilegible en {}, se ignora: {}",
                    e.position().map_or(0, |p| p.line()),
                    self.store.location(),
                    e
                ),
            }
        }

        Ok(out)
    }

    /// Estado actual de cada tarea según el último registro.
    pub fn current_statuses(&self) -> Result<StatusMap> {
        Ok(StatusMap::from_records(self.records()?))
    }

    /// Agrega un registro nuevo con la hora actual.
    pub fn append(
        &self,
        key: &TaskKey,
        status: AttemptStatus,
        output_paths: &[String],
        comment: &str,
    ) -> Result<AttemptRecord> {
        let record = AttemptRecord::new(key.clone(), status, output_paths.to_vec(), comment);
        self.append_record(&record)?;
        Ok(record)
    }

    /// Cada registro arranca con '\n': si la última fila quedó cortada por un
    /// crash, queda sola en su línea (y se descarta) en vez de pegarse a esta.
    /// Las líneas vacías no cuentan al leer.
    pub fn append_record(&self, record: &AttemptRecord) -> Result<()> {
        let line = record.to_line().map_err(|e| self.unavailable(e))?;
        self.store
            .append(&format!("\n{line}"))
            .map_err(|e| self.unavailable(e))?;
        debug!(
            "registrado {} para {} en {}",
            record.status,
            record.key,
            self.store.location()
        );
        Ok(())
    }
}

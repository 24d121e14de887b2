use chrono::NaiveDate;

use crate::error::{GridTaskError, Result};

/// Período de tiempo canónico, ej: "2022".
pub type TimePeriod = String;

/// Máxima cantidad de años que puede cubrir un rango "Y1-Y2".
pub const MAX_RANGE_YEARS: i64 = 200;

/// Expande una expresión de --datetime a la lista ordenada de períodos.
///
/// - "2020"       -> ["2020"] (el token tal cual)
/// - "2020-2022"  -> ["2020", "2021", "2022"] (ambos extremos incluidos)
/// - "a-b-c"      -> error
/// - rangos de `MAX_RANGE_YEARS` años o más -> error
pub fn expand(datetime: &str) -> Result<Vec<TimePeriod>> {
    let invalid = || GridTaskError::InvalidDateRange(datetime.to_string());

    let tokens: Vec<&str> = datetime.split('-').collect();

    match tokens.as_slice() {
        [single] => {
            if single.trim().is_empty() {
                return Err(invalid());
            }
            Ok(vec![single.to_string()])
        }
        [first, last] => {
            let start: i32 = first.trim().parse().map_err(|_| invalid())?;
            let end: i32 = last.trim().parse().map_err(|_| invalid())?;
            if start > end || i64::from(end) - i64::from(start) >= MAX_RANGE_YEARS {
                return Err(invalid());
            }
            Ok((start..=end).map(|y| y.to_string()).collect())
        }
        _ => Err(invalid()),
    }
}

/// Ventana concreta (inclusive) de un período: "2022" -> 2022-01-01..=2022-12-31.
/// También acepta rangos "Y1-Y2" (del 1 de enero de Y1 al 31 de diciembre de Y2).
pub fn year_window(period: &str) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || GridTaskError::InvalidDateRange(period.to_string());

    let years = expand(period)?;
    let first: i32 = years
        .first()
        .and_then(|y| y.trim().parse().ok())
        .ok_or_else(invalid)?;
    let last: i32 = years
        .last()
        .and_then(|y| y.trim().parse().ok())
        .ok_or_else(invalid)?;

    let start = NaiveDate::from_ymd_opt(first, 1, 1).ok_or_else(invalid)?;
    let end = NaiveDate::from_ymd_opt(last, 12, 31).ok_or_else(invalid)?;
    Ok((start, end))
}

//! Browser profile cookie store (Firefox `moz_cookies` layout).

use std::collections::BTreeMap;
use std::path::Path;

use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite;
use tokio_rusqlite::rusqlite::types::Value;

use super::{Cookie, urldecode};
use crate::Error;

/// One result row, column name to raw SQLite value.
pub type ProfileRow = BTreeMap<String, Value>;

/// `sameSite` column index to attribute value.
const SAMESITE: [&str; 3] = ["None", "Lax", "Strict"];

/// Translate a profile row into a cookie.
///
/// Unknown columns, NULLs and out-of-range `sameSite` values are skipped.
pub fn from_profile_row(row: &ProfileRow) -> Cookie {
    let mut cookie = Cookie::default();

    for (column, value) in row {
        match column.as_str() {
            "name" => {
                if let Some(v) = as_text(value) {
                    cookie.name = v;
                }
            }
            "value" => {
                if let Some(v) = as_text(value) {
                    cookie.value = urldecode(&v);
                }
            }
            "host" => cookie.domain = as_text(value).map(|v| v.trim_start_matches('.').to_string()),
            "path" => cookie.path = as_text(value),
            "expiry" => cookie.expires = as_int(value),
            "isSecure" => cookie.secure = as_int(value).map(|v| v != 0),
            "isHttpOnly" => cookie.httponly = as_int(value).map(|v| v != 0),
            "sameSite" => {
                cookie.samesite = as_int(value)
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| SAMESITE.get(i))
                    .map(|s| s.to_string());
            }
            _ => {}
        }
    }

    cookie
}

/// Run `query` against the cookie database at `db_path` and translate every row.
pub async fn load_profile_cookies(db_path: impl AsRef<Path>, query: &str) -> Result<Vec<Cookie>, Error> {
    let path = db_path.as_ref().to_path_buf();
    let conn = Connection::open(&path).await?;

    let query = query.to_string();
    let rows = conn
        .call(move |conn| -> Result<Vec<ProfileRow>, rusqlite::Error> {
            let mut stmt = conn.prepare(&query)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

            let rows = stmt.query_map([], |row| {
                let mut map = ProfileRow::new();
                for (i, column) in columns.iter().enumerate() {
                    map.insert(column.clone(), row.get::<_, Value>(i)?);
                }
                Ok(map)
            })?;
            rows.collect()
        })
        .await?;

    tracing::debug!("loaded {} profile cookies from {}", rows.len(), path.display());
    Ok(rows.iter().map(from_profile_row).collect())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Null | Value::Real(_) => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Real(f) => Some(*f as i64),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Null | Value::Blob(_) => None,
    }
}

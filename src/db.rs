use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ToSql};

/// Stored in place of an absent zipcode, website or phone.
pub const SENTINEL: &str = "NULL";

pub fn connect(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

const CREATE_STATES: &str = r#"
    CREATE TABLE IF NOT EXISTS "states" (
        "ID"      INTEGER PRIMARY KEY AUTOINCREMENT UNIQUE,
        "State"   TEXT NOT NULL,
        "Website" TEXT NOT NULL
    );
"#;

const CREATE_THEATRES: &str = r#"
    CREATE TABLE IF NOT EXISTS "theatres" (
        "ID"       INTEGER PRIMARY KEY AUTOINCREMENT UNIQUE,
        "State_ID" INT NOT NULL,
        "Name"     TEXT NOT NULL,
        "Address"  TEXT NOT NULL,
        "Zipcode"  TEXT NOT NULL,
        "Screen"   INTEGER NOT NULL,
        "Phone"    TEXT NOT NULL,
        "Website"  TEXT NOT NULL,
        FOREIGN KEY ("State_ID") REFERENCES "states"("ID")
    );
"#;

/// Create both tables if missing. Used by read-only commands on a fresh file.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_STATES)?;
    conn.execute_batch(CREATE_THEATRES)?;
    Ok(())
}

// ── Records ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateListing {
    /// Lowercase, e.g. "new york".
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRow {
    pub id: i64,
    pub name: String,
    pub url: String,
}

/// Screen count as parsed from the detail page. Text the parser could not
/// read as a number is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screens {
    Count(i64),
    Raw(String),
}

impl fmt::Display for Screens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Screens::Count(n) => write!(f, "{}", n),
            Screens::Raw(s) => f.write_str(s),
        }
    }
}

impl ToSql for Screens {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Screens::Count(n) => n.to_sql(),
            Screens::Raw(s) => s.to_sql(),
        }
    }
}

impl FromSql for Screens {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(n) => Ok(Screens::Count(n)),
            ValueRef::Text(t) => Ok(Screens::Raw(String::from_utf8_lossy(t).into_owned())),
            // INTEGER affinity turns decimal-looking text such as "2.5" into REAL.
            ValueRef::Real(f) => Ok(Screens::Raw(f.to_string())),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theatre {
    pub name: String,
    pub address: String,
    pub zipcode: Option<String>,
    pub screens: Screens,
    pub website: Option<String>,
    pub phone: Option<String>,
}

fn or_sentinel(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or(SENTINEL)
}

fn from_sentinel(v: String) -> Option<String> {
    (v != SENTINEL).then_some(v)
}

// ── States ──

/// Drop and recreate `states` (and `theatres`, whose state ids would dangle),
/// then insert `states` in order. Returns the number of rows inserted.
pub fn rebuild_states(conn: &Connection, states: &[StateListing]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(r#"DROP TABLE IF EXISTS "theatres"; DROP TABLE IF EXISTS "states";"#)?;
    tx.execute_batch(CREATE_STATES)?;
    tx.execute_batch(CREATE_THEATRES)?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(r#"INSERT INTO "states" VALUES (NULL, ?1, ?2)"#)?;
        for s in states {
            count += stmt.execute(params![s.name, s.url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_states(conn: &Connection) -> Result<Vec<StateRow>> {
    let mut stmt = conn.prepare(r#"SELECT ID, State, Website FROM "states" ORDER BY ID"#)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StateRow {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Theatres ──

/// Drop and recreate an empty `theatres` table.
pub fn reset_theatres(conn: &Connection) -> Result<()> {
    conn.execute_batch(r#"DROP TABLE IF EXISTS "theatres";"#)?;
    conn.execute_batch(CREATE_THEATRES)?;
    Ok(())
}

/// Remove one state's theatres ahead of re-crawling just that state.
pub fn delete_state_theatres(conn: &Connection, state_id: i64) -> Result<usize> {
    let n = conn.execute(r#"DELETE FROM "theatres" WHERE State_ID = ?1"#, params![state_id])?;
    Ok(n)
}

pub fn insert_theatres(conn: &Connection, state_id: i64, theatres: &[Theatre]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            r#"INSERT INTO "theatres" VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        )?;
        for t in theatres {
            count += stmt.execute(params![
                state_id,
                t.name,
                t.address,
                or_sentinel(&t.zipcode),
                t.screens,
                or_sentinel(&t.phone),
                or_sentinel(&t.website),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Theatres of one state (name matched lowercase), in insertion order.
pub fn fetch_theatres(conn: &Connection, state_name: &str) -> Result<Vec<Theatre>> {
    let mut stmt = conn.prepare(
        r#"SELECT t.Name, t.Address, t.Zipcode, t.Screen, t.Phone, t.Website
           FROM "states" s
           JOIN "theatres" t ON s.ID = t.State_ID
           WHERE s.State = ?1
           ORDER BY t.ID"#,
    )?;
    let rows = stmt
        .query_map(params![state_name.to_lowercase()], |row| {
            Ok(Theatre {
                name: row.get(0)?,
                address: row.get(1)?,
                zipcode: from_sentinel(row.get(2)?),
                screens: row.get(3)?,
                phone: from_sentinel(row.get(4)?),
                website: from_sentinel(row.get(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Zipcodes of every theatre whose name matches case-insensitively. Absent
/// zipcodes are skipped.
pub fn fetch_zipcodes_by_name(conn: &Connection, theatre_name: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"SELECT Zipcode FROM "theatres" WHERE upper(Name) = upper(?1) ORDER BY ID"#,
    )?;
    let rows = stmt
        .query_map(params![theatre_name], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().filter_map(from_sentinel).collect())
}

// ── Stats ──

pub struct Stats {
    pub states: usize,
    pub theatres: usize,
    pub without_zipcode: usize,
    pub raw_screens: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let states: usize = conn.query_row(r#"SELECT COUNT(*) FROM "states""#, [], |r| r.get(0))?;
    let theatres: usize =
        conn.query_row(r#"SELECT COUNT(*) FROM "theatres""#, [], |r| r.get(0))?;
    let without_zipcode: usize = conn.query_row(
        r#"SELECT COUNT(*) FROM "theatres" WHERE Zipcode = ?1"#,
        params![SENTINEL],
        |r| r.get(0),
    )?;
    let raw_screens: usize = conn.query_row(
        r#"SELECT COUNT(*) FROM "theatres" WHERE typeof(Screen) != 'integer'"#,
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        states,
        theatres,
        without_zipcode,
        raw_screens,
    })
}

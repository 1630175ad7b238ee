use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{named_params, Connection, Error as SQLiteError, OptionalExtension, Result as SQLiteResult, Row};

const DB_VERSION: u32 = 1;

/// At most this many diver names are stored.
pub const MAX_NAMES: usize = 10;

/// Longer names are cut to this many characters.
pub const MAX_NAME_LEN: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sqlite(#[from] SQLiteError),

    #[error("Version mismatch: expected {DB_VERSION}, got {0}. Please migrate!")]
    VersionMismatch(u32),

    #[error("The name list is full ({MAX_NAMES} names).")]
    TooManyNames,

    #[error("The name \"{0}\" is already stored.")]
    DuplicateName(String),

    #[error("An empty name cannot be stored.")]
    EmptyName,
}

/// One printed label.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintEntry {
    pub date: DateTime<Utc>,
    pub name: String,
    pub oxygen: f64,
    pub helium: f64,
    pub mod_m: f64,
}

impl PrintEntry {
    pub fn new(date: DateTime<Utc>, name: String, oxygen: f64, helium: f64, mod_m: f64) -> Self {
        Self {
            date,
            name,
            oxygen,
            helium,
            mod_m,
        }
    }

    fn load(row: &Row) -> SQLiteResult<Self> {
        let date_rfc2822: String = row.get("date_2822")?;

        let date = DateTime::parse_from_rfc2822(&date_rfc2822)
            .map_err(|err| SQLiteError::FromSqlConversionFailure(0, Type::Text, Box::new(err)))?
            .into();

        Ok(Self {
            date,
            name: row.get("name")?,
            oxygen: row.get("oxygen")?,
            helium: row.get("helium")?,
            mod_m: row.get("mod_m")?,
        })
    }

    fn load_all(con: &Connection, prints: &mut Vec<Self>) -> SQLiteResult<()> {
        let mut stmt = con.prepare(
            "SELECT
                date_2822,
                name,
                oxygen,
                helium,
                mod_m
            FROM prints
            ORDER BY id",
        )?;

        prints.clear();

        for print in stmt.query_map((), Self::load)? {
            prints.push(print?);
        }

        Ok(())
    }

    fn store(&self, con: &Connection) -> SQLiteResult<()> {
        con.execute(
            "INSERT INTO prints (
                date_2822,
                name,
                oxygen,
                helium,
                mod_m
            ) VALUES (
                :date_2822,
                :name,
                :oxygen,
                :helium,
                :mod_m
            )",
            named_params! {
                ":date_2822": self.date.to_rfc2822(),
                ":name": self.name,
                ":oxygen": self.oxygen,
                ":helium": self.helium,
                ":mod_m": self.mod_m,
            },
        )?;

        Ok(())
    }
}

/// Cut a name to the stored length (in characters, not bytes).
fn truncate_name(name: &str) -> String {
    name.trim().chars().take(MAX_NAME_LEN).collect()
}

/// Diver names, the current selection and the print log.
pub struct Database {
    con: Connection,
    names: Vec<String>,
    current_name: Option<String>,
}

impl Database {
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::init(Connection::open(path.as_ref())?)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(con: Connection) -> Result<Self, Error> {
        // Create the tables if they do not exist yet.
        con.execute(
            "CREATE TABLE IF NOT EXISTS info (
                _lock INTEGER NOT NULL PRIMARY KEY,
                version INTEGER NOT NULL,
                current_name TEXT
            )",
            (),
        )?;

        con.execute(
            "CREATE TABLE IF NOT EXISTS names (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )",
            (),
        )?;

        con.execute(
            "CREATE TABLE IF NOT EXISTS prints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date_2822 TEXT NOT NULL,
                name TEXT NOT NULL,
                oxygen REAL NOT NULL,
                helium REAL NOT NULL,
                mod_m REAL NOT NULL
            )",
            (),
        )?;

        // Validate the version if there is one. No row yet means a fresh DB.
        let version = con
            .query_row("SELECT version FROM info", (), |row| row.get::<_, u32>("version"))
            .optional()?;

        if let Some(version) = version {
            if version != DB_VERSION {
                return Err(Error::VersionMismatch(version));
            }
        }

        con.execute(
            "INSERT OR IGNORE INTO info (_lock, version, current_name) VALUES (:_lock, :version, NULL)",
            named_params! {
                ":_lock": 0,
                ":version": DB_VERSION,
            },
        )?;

        let current_name = con.query_row("SELECT current_name FROM info", (), |row| {
            row.get::<_, Option<String>>("current_name")
        })?;

        let mut db = Self {
            con,
            names: Vec::new(),
            current_name,
        };

        db.reload_names()?;

        Ok(db)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn reload_names(&mut self) -> SQLiteResult<()> {
        let mut stmt = self.con.prepare("SELECT name FROM names ORDER BY id")?;

        let names = stmt
            .query_map((), |row| row.get::<_, String>("name"))?
            .collect::<SQLiteResult<Vec<_>>>()?;

        self.names = names;

        Ok(())
    }

    /// Store a new name. Returns the name as stored (trimmed and truncated).
    pub fn add_name(&mut self, name: &str) -> Result<String, Error> {
        let name = truncate_name(name);

        if name.is_empty() {
            return Err(Error::EmptyName);
        }

        if self.names.contains(&name) {
            return Err(Error::DuplicateName(name));
        }

        if self.names.len() >= MAX_NAMES {
            return Err(Error::TooManyNames);
        }

        self.con.execute(
            "INSERT INTO names (name) VALUES (:name)",
            named_params! {":name": name},
        )?;

        self.names.push(name.clone());

        Ok(name)
    }

    pub fn remove_name(&mut self, name: &str) -> Result<(), Error> {
        self.con.execute(
            "DELETE FROM names WHERE name = :name",
            named_params! {":name": name},
        )?;

        self.names.retain(|stored| stored != name);

        if self.current_name.as_deref() == Some(name) {
            self.select_name(None)?;
        }

        Ok(())
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current_name.as_deref()
    }

    /// Make `name` the current name (`None` clears the selection).
    pub fn select_name(&mut self, name: Option<&str>) -> Result<(), Error> {
        let name = name.map(truncate_name);

        self.con.execute(
            "UPDATE info SET current_name = :current_name WHERE _lock = 0",
            named_params! {":current_name": name},
        )?;

        self.current_name = name;

        Ok(())
    }

    /// Select the stored name after the current one, wrapping around.
    pub fn cycle_name(&mut self) -> Result<Option<&str>, Error> {
        if self.names.is_empty() {
            return Ok(self.current_name());
        }

        let next = match self
            .current_name
            .as_ref()
            .and_then(|current| self.names.iter().position(|name| name == current))
        {
            Some(idx) => (idx + 1) % self.names.len(),
            None => 0,
        };

        let name = self.names[next].clone();
        self.select_name(Some(&name))?;

        Ok(self.current_name())
    }

    pub fn prints(&self, prints: &mut Vec<PrintEntry>) -> SQLiteResult<()> {
        PrintEntry::load_all(&self.con, prints)
    }

    pub fn add_print(&self, new_print: &PrintEntry) -> SQLiteResult<()> {
        new_print.store(&self.con)
    }
}

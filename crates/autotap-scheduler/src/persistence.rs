//! SQLite-backed persistence for configurations and click points.
//! Survives restarts; the scheduler reads it through [`DbSource`](crate::db_source::DbSource).

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use autotap_core::config::PointLimits;
use autotap_core::error::{AutoTapError, Result};
use autotap_core::types::validate_points;
use autotap_core::{
    ActivationWindow, ClickPoint, ConfigId, Configuration, ConfigurationSnapshot, PointId,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

const CONFIG_COLUMNS: &str =
    "id, name, is_active, window, repeat_count, global_delay_ms, created_at";
const POINT_COLUMNS: &str =
    "id, configuration_id, name, x, y, size, delay_ms, \"order\", window";

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> AutoTapError {
    move |e| AutoTapError::Database(format!("{context}: {e}"))
}

/// Milliseconds as stored in an INTEGER column.
fn millis_column(field: &str, ms: u64) -> Result<i64> {
    i64::try_from(ms)
        .map_err(|_| AutoTapError::Database(format!("{field} {ms}ms does not fit in storage")))
}

fn millis_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn window_json(window: &Option<ActivationWindow>) -> Result<Option<String>> {
    window
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(AutoTapError::from)
}

fn parse_window(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<ActivationWindow>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn configuration_from_row(row: &Row<'_>) -> rusqlite::Result<Configuration> {
    let created_at: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    Ok(Configuration {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get::<_, i32>(2)? != 0,
        window: parse_window(3, row.get(3)?)?,
        repeat_count: row.get(4)?,
        global_delay_ms: millis_from_row(row, 5)?,
        created_at,
    })
}

fn point_from_row(row: &Row<'_>) -> rusqlite::Result<ClickPoint> {
    Ok(ClickPoint {
        id: row.get(0)?,
        configuration_id: row.get(1)?,
        name: row.get(2)?,
        x: row.get::<_, f64>(3)? as f32,
        y: row.get::<_, f64>(4)? as f32,
        size: row.get::<_, f64>(5)? as f32,
        delay_ms: millis_from_row(row, 6)?,
        order: row.get(7)?,
        window: parse_window(8, row.get(8)?)?,
    })
}

/// SQLite store for every configuration and its click points.
pub struct ConfigDb {
    conn: Mutex<Connection>,
    limits: PointLimits,
}

impl ConfigDb {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    /// Private database that lives as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
            limits: PointLimits::default(),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Validate points against these limits instead of the defaults.
    pub fn with_limits(mut self, limits: PointLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &PointLimits {
        &self.limits
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AutoTapError::Database("connection lock poisoned".into()))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS click_configurations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                window TEXT,                        -- JSON ActivationWindow
                repeat_count INTEGER NOT NULL DEFAULT 0,
                global_delay_ms INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            -- Order uniqueness is enforced in code so reorders can shift rows freely.
            CREATE TABLE IF NOT EXISTS click_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                configuration_id INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                x REAL NOT NULL,
                y REAL NOT NULL,
                size REAL NOT NULL,
                delay_ms INTEGER NOT NULL,
                \"order\" INTEGER NOT NULL,
                window TEXT,
                FOREIGN KEY (configuration_id) REFERENCES click_configurations(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_click_points_configuration
                ON click_points(configuration_id, \"order\");
         ",
            )
            .map_err(db_err("Migration"))
    }

    // ─── Configurations ──────────────────────────────────────

    /// Store a new configuration; returns its id.
    pub fn insert_configuration(&self, configuration: &Configuration) -> Result<ConfigId> {
        configuration.validate()?;
        let conn = self.conn()?;
        Self::insert_configuration_row(&conn, configuration)
    }

    fn insert_configuration_row(conn: &Connection, c: &Configuration) -> Result<ConfigId> {
        conn.execute(
            "INSERT INTO click_configurations
             (name, is_active, window, repeat_count, global_delay_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                c.name,
                c.is_active as i32,
                window_json(&c.window)?,
                c.repeat_count,
                millis_column("global delay", c.global_delay_ms)?,
                timestamp(&c.created_at),
            ],
        )
        .map_err(db_err("Insert configuration"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrite a stored configuration (matched by id).
    pub fn update_configuration(&self, c: &Configuration) -> Result<()> {
        c.validate()?;
        let changed = self
            .conn()?
            .execute(
                "UPDATE click_configurations
                 SET name = ?1, is_active = ?2, window = ?3, repeat_count = ?4, global_delay_ms = ?5
                 WHERE id = ?6",
                params![
                    c.name,
                    c.is_active as i32,
                    window_json(&c.window)?,
                    c.repeat_count,
                    millis_column("global delay", c.global_delay_ms)?,
                    c.id,
                ],
            )
            .map_err(db_err("Update configuration"))?;
        if changed == 0 {
            return Err(AutoTapError::ConfigurationNotFound(c.id));
        }
        Ok(())
    }

    /// Delete a configuration and all of its points.
    pub fn delete_configuration(&self, id: ConfigId) -> Result<()> {
        let changed = self
            .conn()?
            .execute("DELETE FROM click_configurations WHERE id = ?1", [id])
            .map_err(db_err("Delete configuration"))?;
        if changed == 0 {
            return Err(AutoTapError::ConfigurationNotFound(id));
        }
        Ok(())
    }

    pub fn get_configuration(&self, id: ConfigId) -> Result<Option<Configuration>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CONFIG_COLUMNS} FROM click_configurations WHERE id = ?1"),
            [id],
            configuration_from_row,
        )
        .optional()
        .map_err(db_err("Load configuration"))
    }

    fn require_configuration(&self, id: ConfigId) -> Result<Configuration> {
        self.get_configuration(id)?
            .ok_or(AutoTapError::ConfigurationNotFound(id))
    }

    /// All configurations, newest first.
    pub fn list_configurations(&self) -> Result<Vec<Configuration>> {
        self.query_configurations("")
    }

    /// Configurations the user wants running.
    pub fn active_configurations(&self) -> Result<Vec<Configuration>> {
        self.query_configurations("WHERE is_active = 1")
    }

    /// Active set as scheduler snapshots, ordered by id.
    pub fn active_snapshots(&self) -> Result<Vec<ConfigurationSnapshot>> {
        let mut snapshots: Vec<ConfigurationSnapshot> = self
            .active_configurations()?
            .iter()
            .map(Configuration::snapshot)
            .collect();
        snapshots.sort_by_key(|s| s.id);
        Ok(snapshots)
    }

    fn query_configurations(&self, filter: &str) -> Result<Vec<Configuration>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CONFIG_COLUMNS} FROM click_configurations {filter}
                 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(db_err("List configurations"))?;
        let rows = stmt
            .query_map([], configuration_from_row)
            .map_err(db_err("List configurations"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("List configurations"))
    }

    pub fn set_active(&self, id: ConfigId, active: bool) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE click_configurations SET is_active = ?1 WHERE id = ?2",
                params![active as i32, id],
            )
            .map_err(db_err("Set active"))?;
        if changed == 0 {
            return Err(AutoTapError::ConfigurationNotFound(id));
        }
        Ok(())
    }

    /// Flip `is_active`; returns the new value.
    pub fn toggle_active(&self, id: ConfigId) -> Result<bool> {
        let active = !self.require_configuration(id)?.is_active;
        self.set_active(id, active)?;
        Ok(active)
    }

    /// Copy a configuration with its points. The copy starts inactive.
    pub fn duplicate_configuration(&self, id: ConfigId) -> Result<ConfigId> {
        let original = self.require_configuration(id)?;
        let points = self.points_for(id)?;

        let mut copy = original.clone();
        copy.id = 0;
        copy.name = format!("{} (Copy)", original.name);
        copy.is_active = false;
        copy.created_at = Utc::now();
        self.insert_with_points(&copy, &points)
    }

    /// Store a configuration together with its points, atomically.
    ///
    /// Point ids and owners are reassigned; their orders are kept.
    pub fn insert_with_points(
        &self,
        configuration: &Configuration,
        points: &[ClickPoint],
    ) -> Result<ConfigId> {
        configuration.validate()?;
        validate_points(points, &self.limits)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("Begin transaction"))?;
        let id = Self::insert_configuration_row(&tx, configuration)?;
        for point in points {
            Self::insert_point_row(&tx, id, point)?;
        }
        tx.commit().map_err(db_err("Commit"))?;
        Ok(id)
    }

    // ─── Click points ──────────────────────────────────────

    /// Points of one configuration, ascending by order.
    pub fn points_for(&self, configuration_id: ConfigId) -> Result<Vec<ClickPoint>> {
        let conn = self.conn()?;
        Self::load_points(&conn, configuration_id)
    }

    fn load_points(conn: &Connection, configuration_id: ConfigId) -> Result<Vec<ClickPoint>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {POINT_COLUMNS} FROM click_points
                 WHERE configuration_id = ?1 ORDER BY \"order\" ASC, id ASC"
            ))
            .map_err(db_err("Load points"))?;
        let rows = stmt
            .query_map([configuration_id], point_from_row)
            .map_err(db_err("Load points"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Load points"))
    }

    pub fn get_point(&self, id: PointId) -> Result<Option<ClickPoint>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {POINT_COLUMNS} FROM click_points WHERE id = ?1"),
            [id],
            point_from_row,
        )
        .optional()
        .map_err(db_err("Load point"))
    }

    /// Highest order value in use, if the configuration has points.
    pub fn max_order(&self, configuration_id: ConfigId) -> Result<Option<u32>> {
        self.conn()?
            .query_row(
                "SELECT MAX(\"order\") FROM click_points WHERE configuration_id = ?1",
                [configuration_id],
                |row| row.get::<_, Option<u32>>(0),
            )
            .map_err(db_err("Max order"))
    }

    /// Order value for a point appended at the end.
    pub fn next_order(&self, configuration_id: ConfigId) -> Result<u32> {
        Ok(self.max_order(configuration_id)?.map_or(0, |max| max + 1))
    }

    /// Store a new point; returns its id.
    pub fn insert_point(&self, point: &ClickPoint) -> Result<PointId> {
        point.validate(&self.limits)?;
        self.require_configuration(point.configuration_id)?;
        let conn = self.conn()?;
        Self::ensure_order_free(&conn, point.configuration_id, point.order, None)?;
        Self::insert_point_row(&conn, point.configuration_id, point)
    }

    fn insert_point_row(conn: &Connection, configuration_id: ConfigId, p: &ClickPoint) -> Result<PointId> {
        conn.execute(
            "INSERT INTO click_points
             (configuration_id, name, x, y, size, delay_ms, \"order\", window)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                configuration_id,
                p.name,
                p.x as f64,
                p.y as f64,
                p.size as f64,
                millis_column("delay", p.delay_ms)?,
                p.order,
                window_json(&p.window)?,
            ],
        )
        .map_err(db_err("Insert point"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrite a stored point (matched by id).
    pub fn update_point(&self, p: &ClickPoint) -> Result<()> {
        p.validate(&self.limits)?;
        let conn = self.conn()?;
        Self::ensure_order_free(&conn, p.configuration_id, p.order, Some(p.id))?;
        let changed = conn
            .execute(
                "UPDATE click_points
                 SET name = ?1, x = ?2, y = ?3, size = ?4, delay_ms = ?5, \"order\" = ?6, window = ?7
                 WHERE id = ?8 AND configuration_id = ?9",
                params![
                    p.name,
                    p.x as f64,
                    p.y as f64,
                    p.size as f64,
                    millis_column("delay", p.delay_ms)?,
                    p.order,
                    window_json(&p.window)?,
                    p.id,
                    p.configuration_id,
                ],
            )
            .map_err(db_err("Update point"))?;
        if changed == 0 {
            return Err(AutoTapError::PointNotFound(p.id));
        }
        Ok(())
    }

    /// Delete a point and close the gap in the order sequence.
    pub fn delete_point(&self, id: PointId) -> Result<()> {
        let point = self.get_point(id)?.ok_or(AutoTapError::PointNotFound(id))?;
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("Begin transaction"))?;
        tx.execute("DELETE FROM click_points WHERE id = ?1", [id])
            .map_err(db_err("Delete point"))?;
        tx.execute(
            "UPDATE click_points SET \"order\" = \"order\" - 1
             WHERE configuration_id = ?1 AND \"order\" > ?2",
            params![point.configuration_id, point.order],
        )
        .map_err(db_err("Shift orders"))?;
        tx.commit().map_err(db_err("Commit"))
    }

    /// Move a point to position `new_order`, renumbering its siblings 0..n.
    pub fn reorder_point(&self, id: PointId, new_order: u32) -> Result<()> {
        let point = self.get_point(id)?.ok_or(AutoTapError::PointNotFound(id))?;
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("Begin transaction"))?;

        let mut ids: Vec<PointId> = Self::load_points(&tx, point.configuration_id)?
            .into_iter()
            .map(|p| p.id)
            .filter(|pid| *pid != id)
            .collect();
        let position = (new_order as usize).min(ids.len());
        ids.insert(position, id);

        for (order, pid) in ids.iter().enumerate() {
            tx.execute(
                "UPDATE click_points SET \"order\" = ?1 WHERE id = ?2",
                params![order as u32, pid],
            )
            .map_err(db_err("Reorder point"))?;
        }
        tx.commit().map_err(db_err("Commit"))
    }

    fn ensure_order_free(
        conn: &Connection,
        configuration_id: ConfigId,
        order: u32,
        except: Option<PointId>,
    ) -> Result<()> {
        let taken: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM click_points
                 WHERE configuration_id = ?1 AND \"order\" = ?2 AND id != ?3",
                params![configuration_id, order, except.unwrap_or(-1)],
                |row| row.get(0),
            )
            .map_err(db_err("Check order"))?;
        if taken > 0 {
            return Err(AutoTapError::InvalidPoint(format!(
                "duplicate order value {order}"
            )));
        }
        Ok(())
    }
}

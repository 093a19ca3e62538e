/// Schema migration runner
///
/// Migrations are plain SQL scripts named `<version>_<name>.up.sql` with an
/// optional `<version>_<name>.down.sql` counterpart. Applied versions are
/// recorded in the `schema_migrations` ledger:
///
/// ```sql
/// CREATE TABLE schema_migrations (
///     version BIGINT PRIMARY KEY,
///     name TEXT NOT NULL,
///     applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Each migration runs in its own transaction together with its ledger
/// write, so a failed script leaves neither schema changes nor a ledger row
/// behind. Running the runner twice against the same database is a no-op the
/// second time.
///
/// # Example
///
/// ```no_run
/// use prepilot_shared::db::migrations::{MigrationRunner, MigrationSet};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let runner = MigrationRunner::new(&pool, MigrationSet::embedded()?);
///
/// // Apply everything pending
/// let applied = runner.run().await?;
/// println!("Applied {} migrations", applied.len());
///
/// // Check where we are
/// let status = runner.status().await?;
/// println!("Schema at version {}", status.current_version);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPool, Executor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CREATE_LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Scripts compiled into the binary, in file-name form
const EMBEDDED: &[(&str, &str)] = &[
    (
        "000001_create_users.up.sql",
        include_str!("../../migrations/000001_create_users.up.sql"),
    ),
    (
        "000001_create_users.down.sql",
        include_str!("../../migrations/000001_create_users.down.sql"),
    ),
    (
        "000002_create_study_plans.up.sql",
        include_str!("../../migrations/000002_create_study_plans.up.sql"),
    ),
    (
        "000002_create_study_plans.down.sql",
        include_str!("../../migrations/000002_create_study_plans.down.sql"),
    ),
    (
        "000003_create_study_tasks.up.sql",
        include_str!("../../migrations/000003_create_study_tasks.up.sql"),
    ),
    (
        "000003_create_study_tasks.down.sql",
        include_str!("../../migrations/000003_create_study_tasks.down.sql"),
    ),
];

/// Errors raised while loading or applying migrations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Failed to read migrations from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid migration file name: {0}")]
    InvalidFileName(String),

    #[error("Duplicate {direction} script for migration {version}")]
    Duplicate { version: i64, direction: Direction },

    #[error("Migration {0} has a down script but no up script")]
    MissingUp(i64),

    #[error("Migration {0} has no down script and cannot be rolled back")]
    MissingDown(i64),

    #[error("Applied migration {0} is not in the available migration set")]
    UnknownVersion(i64),

    #[error("Migration {version} ({name}) failed: {source}")]
    Failed {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Which half of a migration a script belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A single versioned migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up: String,
    pub down: Option<String>,
}

/// A row of the `schema_migrations` ledger
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Where the schema stands relative to the available migrations
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Highest applied version, 0 when nothing has run
    pub current_version: i64,

    pub applied: Vec<AppliedMigration>,

    /// Versions available but not yet applied, ascending
    pub pending: Vec<i64>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Splits `000001_create_users.up.sql` into `(1, "create_users", Up)`
///
/// Returns None for anything that is not a migration script.
pub fn parse_migration_filename(file_name: &str) -> Option<(i64, String, Direction)> {
    let (stem, direction) = if let Some(stem) = file_name.strip_suffix(".up.sql") {
        (stem, Direction::Up)
    } else if let Some(stem) = file_name.strip_suffix(".down.sql") {
        (stem, Direction::Down)
    } else {
        return None;
    };

    let (version, name) = stem.split_once('_')?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
        return None;
    }

    let version = version.parse::<i64>().ok()?;
    Some((version, name.to_string(), direction))
}

/// An ordered, validated collection of migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// The scripts shipped in `prepilot-shared/migrations`
    pub fn embedded() -> Result<Self, MigrationError> {
        Self::from_files(
            EMBEDDED
                .iter()
                .map(|(file, sql)| (file.to_string(), sql.to_string())),
        )
    }

    /// Builds a set from `(file name, contents)` pairs
    ///
    /// # Errors
    ///
    /// Fails on a malformed name, a duplicated script, or a down script
    /// without a matching up script.
    pub fn from_files<I>(files: I) -> Result<Self, MigrationError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut ups: BTreeMap<i64, (String, String)> = BTreeMap::new();
        let mut downs: BTreeMap<i64, String> = BTreeMap::new();

        for (file_name, sql) in files {
            let (version, name, direction) = parse_migration_filename(&file_name)
                .ok_or_else(|| MigrationError::InvalidFileName(file_name.clone()))?;

            let duplicate = match direction {
                Direction::Up => ups.insert(version, (name, sql)).is_some(),
                Direction::Down => downs.insert(version, sql).is_some(),
            };
            if duplicate {
                return Err(MigrationError::Duplicate { version, direction });
            }
        }

        if let Some(orphan) = downs.keys().find(|v| !ups.contains_key(v)) {
            return Err(MigrationError::MissingUp(*orphan));
        }

        let migrations = ups
            .into_iter()
            .map(|(version, (name, up))| Migration {
                version,
                name,
                up,
                down: downs.remove(&version),
            })
            .collect();

        Ok(Self { migrations })
    }

    /// Reads every `*.up.sql` / `*.down.sql` file in `dir`
    ///
    /// Other files are ignored.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let dir = dir.as_ref();
        let io_err = |source| MigrationError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if parse_migration_filename(file_name).is_none() {
                debug!(file = file_name, "Skipping non-migration file");
                continue;
            }

            let sql = std::fs::read_to_string(&path).map_err(|source| MigrationError::Io {
                path: path.clone(),
                source,
            })?;
            files.push((file_name.to_string(), sql));
        }

        Self::from_files(files)
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    /// Migrations not present in `applied`, ascending by version
    pub fn pending(&self, applied: &[i64]) -> Vec<&Migration> {
        self.migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .collect()
    }

    /// Migrations to undo to bring the schema down to `target`
    ///
    /// Covers every applied version greater than `target`, in strictly
    /// descending order. The whole plan is checked up front: an applied
    /// version that is unknown, or that has no down script, fails before
    /// anything is executed.
    pub fn rollback_plan(&self, applied: &[i64], target: i64) -> Result<Vec<&Migration>, MigrationError> {
        let mut versions: Vec<i64> = applied.iter().copied().filter(|v| *v > target).collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions.dedup();

        versions
            .into_iter()
            .map(|version| {
                let migration = self
                    .migrations
                    .iter()
                    .find(|m| m.version == version)
                    .ok_or(MigrationError::UnknownVersion(version))?;
                if migration.down.is_none() {
                    return Err(MigrationError::MissingDown(version));
                }
                Ok(migration)
            })
            .collect()
    }
}

/// Applies and rolls back a `MigrationSet` against a database
pub struct MigrationRunner<'a> {
    pool: &'a PgPool,
    set: MigrationSet,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(pool: &'a PgPool, set: MigrationSet) -> Self {
        Self { pool, set }
    }

    /// Creates `schema_migrations` if it does not exist yet
    pub async fn ensure_ledger(&self) -> Result<(), MigrationError> {
        self.pool.execute(CREATE_LEDGER).await?;
        Ok(())
    }

    /// Ledger rows, ascending by version
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        let rows = sqlx::query_as::<_, AppliedMigration>(
            r#"
            SELECT version, name, applied_at
            FROM schema_migrations
            ORDER BY version ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Highest applied version, 0 when the ledger is empty
    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        self.ensure_ledger().await?;

        let (version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0)::BIGINT FROM schema_migrations")
                .fetch_one(self.pool)
                .await?;

        Ok(version)
    }

    /// Applies every pending migration in ascending order
    ///
    /// Returns the versions that were applied by this call.
    ///
    /// # Errors
    ///
    /// Stops at the first failing migration. Earlier migrations from the
    /// same call stay applied; the failing one is rolled back.
    pub async fn run(&self) -> Result<Vec<i64>, MigrationError> {
        self.ensure_ledger().await?;

        let applied: Vec<i64> = self.applied().await?.iter().map(|m| m.version).collect();
        for version in &applied {
            if !self.set.migrations.iter().any(|m| m.version == *version) {
                warn!(version, "Ledger holds a migration that is not available locally");
            }
        }

        let pending = self.set.pending(&applied);
        if pending.is_empty() {
            info!(current_version = applied.last().copied().unwrap_or(0), "Database schema is up to date");
            return Ok(Vec::new());
        }

        let mut done = Vec::with_capacity(pending.len());
        for migration in pending {
            self.apply(migration).await?;
            done.push(migration.version);
        }

        info!(count = done.len(), "Database migrations applied");
        Ok(done)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |source| MigrationError::Failed {
            version: migration.version,
            name: migration.name.clone(),
            source,
        };

        info!(version = migration.version, name = %migration.name, "Applying migration");

        let mut tx = self.pool.begin().await?;
        (&mut *tx).execute(migration.up.as_str()).await.map_err(failed)?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        Ok(())
    }

    /// Rolls the schema back until `target` is the highest applied version
    ///
    /// Returns the versions that were undone, newest first.
    pub async fn rollback_to(&self, target: i64) -> Result<Vec<i64>, MigrationError> {
        self.ensure_ledger().await?;

        let applied: Vec<i64> = self.applied().await?.iter().map(|m| m.version).collect();
        let plan = self.set.rollback_plan(&applied, target)?;

        let mut undone = Vec::with_capacity(plan.len());
        for migration in plan {
            self.revert(migration).await?;
            undone.push(migration.version);
        }

        info!(target, count = undone.len(), "Database rollback finished");
        Ok(undone)
    }

    async fn revert(&self, migration: &Migration) -> Result<(), MigrationError> {
        let script = migration
            .down
            .as_deref()
            .ok_or(MigrationError::MissingDown(migration.version))?;
        let failed = |source| MigrationError::Failed {
            version: migration.version,
            name: migration.name.clone(),
            source,
        };

        info!(version = migration.version, name = %migration.name, "Reverting migration");

        let mut tx = self.pool.begin().await?;
        (&mut *tx).execute(script).await.map_err(failed)?;
        sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        Ok(())
    }

    pub async fn status(&self) -> Result<MigrationStatus, MigrationError> {
        self.ensure_ledger().await?;

        let applied = self.applied().await?;
        let versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

        Ok(MigrationStatus {
            current_version: versions.iter().copied().max().unwrap_or(0),
            pending: self.set.pending(&versions).iter().map(|m| m.version).collect(),
            applied,
        })
    }
}

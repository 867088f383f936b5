use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::{OptimizerError, Result, ResultExt};
use crate::optimizer::state::OptimizerState;
use crate::rng::RngState;

use super::{check_next_generation, CheckpointStore, GenerationCheckpoint, IndividualRecord};

// Fitness is stored as the raw IEEE-754 bits: SQLite turns NaN REALs into
// NULL, and resumed runs must see bit-identical fitness values.
const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS optimizer_state (
        process_id          INTEGER NOT NULL,
        generation_index    INTEGER NOT NULL,
        rng_state           TEXT NOT NULL,
        simulation_time     INTEGER NOT NULL,
        sampling_frequency  REAL NOT NULL,
        control_frequency   REAL NOT NULL,
        num_generations     INTEGER NOT NULL,
        population_size     INTEGER NOT NULL,
        offspring_size      INTEGER NOT NULL,
        fitness_function    TEXT NOT NULL,
        body_name           TEXT NOT NULL,
        next_individual_id  INTEGER NOT NULL,
        PRIMARY KEY (process_id, generation_index)
    );
    CREATE TABLE IF NOT EXISTS individual (
        process_id          INTEGER NOT NULL,
        generation_index    INTEGER NOT NULL,
        ordinal             INTEGER NOT NULL,
        individual_id       INTEGER NOT NULL,
        genotype            TEXT NOT NULL,
        fitness_bits        INTEGER,
        parent_ids          TEXT NOT NULL,
        PRIMARY KEY (process_id, generation_index, ordinal)
    );";

const STATE_COLUMNS: &str = "process_id, generation_index, rng_state, simulation_time,
    sampling_frequency, control_frequency, num_generations, population_size,
    offspring_size, fitness_function, body_name, next_individual_id";

/// SQLite-backed checkpoint store.
///
/// Each generation is written in one transaction, so a crash mid-append
/// leaves the previous generation as the latest checkpoint.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .context(format!("Failed to open SQLite at {}", path.display()))?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA synchronous=FULL;")?;
        debug!(path = %path.display(), journal_mode = %journal_mode, "Opened checkpoint database");
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(
            Connection::open_in_memory().context("Failed to open in-memory SQLite")?,
        )
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| OptimizerError::Storage("SQLite connection mutex poisoned".to_string()))
    }
}

fn to_sql_int<T>(value: T, what: &str) -> Result<i64>
where
    i64: TryFrom<T>,
{
    i64::try_from(value)
        .map_err(|_| OptimizerError::Storage(format!("{} does not fit in an SQLite integer", what)))
}

fn from_sql_int<T: TryFrom<i64>>(value: i64, what: &str) -> Result<T> {
    T::try_from(value)
        .map_err(|_| OptimizerError::Storage(format!("Stored {} is out of range: {}", what, value)))
}

fn latest_generation(conn: &Connection, process_id: i64) -> Result<Option<u64>> {
    let latest: Option<i64> = conn.query_row(
        "SELECT MAX(generation_index) FROM optimizer_state WHERE process_id = ?1",
        params![process_id],
        |row| row.get(0),
    )?;
    latest
        .map(|g| from_sql_int(g, "generation index"))
        .transpose()
}

struct RawStateRow {
    process_id: i64,
    generation_index: i64,
    rng_state: String,
    simulation_time: i64,
    sampling_frequency: f64,
    control_frequency: f64,
    num_generations: i64,
    population_size: i64,
    offspring_size: i64,
    fitness_function: String,
    body_name: String,
    next_individual_id: i64,
}

impl RawStateRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            process_id: row.get(0)?,
            generation_index: row.get(1)?,
            rng_state: row.get(2)?,
            simulation_time: row.get(3)?,
            sampling_frequency: row.get(4)?,
            control_frequency: row.get(5)?,
            num_generations: row.get(6)?,
            population_size: row.get(7)?,
            offspring_size: row.get(8)?,
            fitness_function: row.get(9)?,
            body_name: row.get(10)?,
            next_individual_id: row.get(11)?,
        })
    }

    fn into_state(self) -> Result<OptimizerState> {
        let rng_state: RngState = serde_json::from_str(&self.rng_state)?;
        Ok(OptimizerState {
            process_id: from_sql_int(self.process_id, "process id")?,
            generation_index: from_sql_int(self.generation_index, "generation index")?,
            rng_state,
            simulation_time: from_sql_int(self.simulation_time, "simulation time")?,
            sampling_frequency: self.sampling_frequency,
            control_frequency: self.control_frequency,
            num_generations: from_sql_int(self.num_generations, "generation count")?,
            population_size: from_sql_int(self.population_size, "population size")?,
            offspring_size: from_sql_int(self.offspring_size, "offspring size")?,
            fitness_function: self.fitness_function,
            body_name: self.body_name,
            next_individual_id: from_sql_int(self.next_individual_id, "next individual id")?,
        })
    }
}

impl CheckpointStore for SqliteStore {
    fn append(&self, checkpoint: &GenerationCheckpoint) -> Result<()> {
        let state = &checkpoint.state;
        let process_id = to_sql_int(state.process_id, "process id")?;
        let generation_index = to_sql_int(state.generation_index, "generation index")?;
        let rng_state = serde_json::to_string(&state.rng_state)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        check_next_generation(
            state.process_id,
            latest_generation(&tx, process_id)?,
            state.generation_index,
        )?;

        tx.execute(
            &format!(
                "INSERT INTO optimizer_state ({}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                STATE_COLUMNS
            ),
            params![
                process_id,
                generation_index,
                rng_state,
                i64::from(state.simulation_time),
                state.sampling_frequency,
                state.control_frequency,
                to_sql_int(state.num_generations, "generation count")?,
                to_sql_int(state.population_size, "population size")?,
                to_sql_int(state.offspring_size, "offspring size")?,
                state.fitness_function,
                state.body_name,
                to_sql_int(state.next_individual_id, "next individual id")?,
            ],
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO individual (
                    process_id, generation_index, ordinal, individual_id,
                    genotype, fitness_bits, parent_ids
                ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?;
            for record in &checkpoint.individuals {
                insert.execute(params![
                    process_id,
                    generation_index,
                    to_sql_int(record.ordinal, "ordinal")?,
                    to_sql_int(record.individual_id, "individual id")?,
                    record.genotype,
                    record.fitness.map(|f| f.to_bits() as i64),
                    serde_json::to_string(&record.parent_ids)?,
                ])?;
            }
        }

        tx.commit()?;
        debug!(
            process_id = state.process_id,
            generation_index = state.generation_index,
            individuals = checkpoint.individuals.len(),
            "Committed checkpoint"
        );
        Ok(())
    }

    fn latest(&self, process_id: u64) -> Result<Option<OptimizerState>> {
        let process_id = to_sql_int(process_id, "process id")?;
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM optimizer_state WHERE process_id = ?1
                     ORDER BY generation_index DESC LIMIT 1",
                    STATE_COLUMNS
                ),
                params![process_id],
                RawStateRow::from_row,
            )
            .optional()?;
        raw.map(RawStateRow::into_state).transpose()
    }

    fn individuals(
        &self,
        process_id: u64,
        generation_index: u64,
    ) -> Result<Vec<IndividualRecord>> {
        let process_id = to_sql_int(process_id, "process id")?;
        let generation_index = to_sql_int(generation_index, "generation index")?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ordinal, individual_id, genotype, fitness_bits, parent_ids
             FROM individual
             WHERE process_id = ?1 AND generation_index = ?2
             ORDER BY ordinal",
        )?;
        let rows = stmt.query_map(params![process_id, generation_index], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (ordinal, individual_id, genotype, fitness_bits, parent_ids) = row?;
            records.push(IndividualRecord {
                ordinal: from_sql_int(ordinal, "ordinal")?,
                individual_id: from_sql_int(individual_id, "individual id")?,
                genotype,
                fitness: fitness_bits.map(|bits| f64::from_bits(bits as u64)),
                parent_ids: serde_json::from_str(&parent_ids)?,
            });
        }
        Ok(records)
    }

    fn generations(&self, process_id: u64) -> Result<Vec<u64>> {
        let process_id = to_sql_int(process_id, "process id")?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT generation_index FROM optimizer_state
             WHERE process_id = ?1 ORDER BY generation_index",
        )?;
        let rows = stmt.query_map(params![process_id], |row| row.get::<_, i64>(0))?;
        let mut generations = Vec::new();
        for row in rows {
            generations.push(from_sql_int(row?, "generation index")?);
        }
        Ok(generations)
    }

    fn has_individuals(&self, process_id: u64) -> Result<bool> {
        let process_id = to_sql_int(process_id, "process id")?;
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM individual WHERE process_id = ?1 LIMIT 1",
                params![process_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{checkpoint, exercise_store, state};

    #[test]
    fn test_sqlite_store_contract() {
        exercise_store(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.append(&checkpoint(3, 0)).unwrap();
            store.append(&checkpoint(3, 1)).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.latest(3).unwrap(), Some(state(3, 1)));
        assert_eq!(store.generations(3).unwrap(), vec![0, 1]);
        store.append(&checkpoint(3, 2)).unwrap();
    }

    #[test]
    fn test_nan_fitness_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut cp = checkpoint(1, 0);
        cp.individuals[0].fitness = Some(f64::NAN);
        cp.individuals[1].fitness = None;
        store.append(&cp).unwrap();

        let records = store.individuals(1, 0).unwrap();
        assert!(records[0].fitness.unwrap().is_nan());
        assert_eq!(records[1].fitness, None);
    }

    #[test]
    fn test_failed_append_leaves_no_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut cp = checkpoint(1, 0);
        // Duplicate ordinal violates the primary key after the state row was inserted.
        cp.individuals[1].ordinal = 0;
        assert!(store.append(&cp).is_err());

        assert!(store.latest(1).unwrap().is_none());
        assert!(!store.has_individuals(1).unwrap());
        store.append(&checkpoint(1, 0)).unwrap();
    }

    #[test]
    fn test_open_failure_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("checkpoints.db");
        match SqliteStore::open(&path) {
            Err(OptimizerError::Storage(msg)) => {
                assert!(msg.starts_with("Failed to open SQLite at"));
                assert!(msg.contains("missing"));
            }
            Err(other) => panic!("Expected Storage error, got {:?}", other),
            Ok(_) => panic!("Expected Storage error"),
        }
    }
}

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};
use polars::prelude::*;
use tempfile::NamedTempFile;

use crate::error::MfaError;
use crate::mineral::{Mineral, TradeFlow};
use crate::schema::{result, triplet};

/// Area × area mass matrix, kg. Every matrix in one computation shares the
/// same registry, so rows and columns are registry indices.
pub type FlowMatrix = DMatrix<f64>;

// ── Sums and shapes ─────────────────────────────────────────────────────────

pub fn row_sums(m: &FlowMatrix) -> DVector<f64> {
    DVector::from_iterator(m.nrows(), m.row_iter().map(|r| r.sum()))
}

pub fn col_sums(m: &FlowMatrix) -> DVector<f64> {
    DVector::from_iterator(m.ncols(), m.column_iter().map(|c| c.sum()))
}

pub fn ensure_square(m: &FlowMatrix, n: usize) -> Result<(), MfaError> {
    if m.nrows() != n || m.ncols() != n {
        return Err(MfaError::DimensionMismatch {
            expected: n,
            found_rows: m.nrows(),
            found_cols: m.ncols(),
        });
    }
    Ok(())
}

/// Build an n × n matrix from (row, col, value) entries. Repeated
/// positions add up.
pub fn from_triplets(
    n: usize,
    entries: impl IntoIterator<Item = (usize, usize, f64)>,
) -> Result<FlowMatrix, MfaError> {
    let mut m = FlowMatrix::zeros(n, n);
    for (row, col, value) in entries {
        if row >= n || col >= n {
            return Err(MfaError::InvalidData(format!(
                "entry ({row}, {col}) outside a {n}x{n} matrix"
            )));
        }
        m[(row, col)] += value;
    }
    Ok(m)
}

// ── Tabular conversion ──────────────────────────────────────────────────────

/// Nonzero entries as a (row_index, col_index, value) table.
pub fn to_triplet_frame(m: &FlowMatrix) -> Result<DataFrame, MfaError> {
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            let v = m[(i, j)];
            if v != 0.0 {
                rows.push(i as i64);
                cols.push(j as i64);
                values.push(v);
            }
        }
    }
    let df = DataFrame::new(vec![
        Column::new(triplet::ROW_INDEX.into(), &rows),
        Column::new(triplet::COL_INDEX.into(), &cols),
        Column::new(triplet::VALUE.into(), &values),
    ])?;
    Ok(df)
}

pub fn from_triplet_frame(df: &DataFrame, n: usize) -> Result<FlowMatrix, MfaError> {
    let rows = df.column(triplet::ROW_INDEX)?.i64()?;
    let cols = df.column(triplet::COL_INDEX)?.i64()?;
    let values = df.column(triplet::VALUE)?.f64()?;

    let mut entries = Vec::with_capacity(df.height());
    for ((r, c), v) in rows.into_iter().zip(cols).zip(values) {
        let (Some(r), Some(c)) = (r, c) else {
            return Err(MfaError::InvalidData("null index in matrix triplets".into()));
        };
        let r = usize::try_from(r)
            .map_err(|_| MfaError::InvalidData(format!("negative row index {r}")))?;
        let c = usize::try_from(c)
            .map_err(|_| MfaError::InvalidData(format!("negative column index {c}")))?;
        entries.push((r, c, v.unwrap_or(0.0)));
    }
    from_triplets(n, entries)
}

/// Nonzero entries as a (consumer, producer, quantity_kg) table labelled
/// with the given row and column names.
pub fn to_long_frame(
    m: &FlowMatrix,
    row_labels: &[String],
    col_labels: &[String],
) -> Result<DataFrame, MfaError> {
    if row_labels.len() != m.nrows() || col_labels.len() != m.ncols() {
        return Err(MfaError::InvalidData(format!(
            "{} row and {} column labels for a {}x{} matrix",
            row_labels.len(),
            col_labels.len(),
            m.nrows(),
            m.ncols()
        )));
    }
    let mut consumers = Vec::new();
    let mut producers = Vec::new();
    let mut quantities = Vec::new();
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            let v = m[(i, j)];
            if v != 0.0 {
                consumers.push(row_labels[i].as_str());
                producers.push(col_labels[j].as_str());
                quantities.push(v);
            }
        }
    }
    let df = DataFrame::new(vec![
        Column::new(result::CONSUMER.into(), &consumers),
        Column::new(result::PRODUCER.into(), &producers),
        Column::new(result::QUANTITY_KG.into(), &quantities),
    ])?;
    Ok(df)
}

// ── Cache ───────────────────────────────────────────────────────────────────

/// Parquet store of trade matrices keyed by (flow, mineral, year).
/// An entry is never rewritten once stored.
#[derive(Debug, Clone)]
pub struct TradeCache {
    dir: PathBuf,
}

impl TradeCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, flow: TradeFlow, mineral: Mineral, year: i32) -> PathBuf {
        self.dir
            .join(format!("mat_{}_{}_{}.parquet", flow, mineral, year))
    }

    pub fn contains(&self, flow: TradeFlow, mineral: Mineral, year: i32) -> bool {
        self.path(flow, mineral, year).is_file()
    }

    pub fn load(
        &self,
        flow: TradeFlow,
        mineral: Mineral,
        year: i32,
        n: usize,
    ) -> Result<Option<FlowMatrix>, MfaError> {
        let path = self.path(flow, mineral, year);
        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let df = ParquetReader::new(file).finish()?;
        tracing::debug!(path = %path.display(), entries = df.height(), "loaded cached trade matrix");
        from_triplet_frame(&df, n).map(Some)
    }

    pub fn store(
        &self,
        flow: TradeFlow,
        mineral: Mineral,
        year: i32,
        m: &FlowMatrix,
    ) -> Result<PathBuf, MfaError> {
        let path = self.path(flow, mineral, year);
        let mut df = to_triplet_frame(m)?;
        self.write_once(&path, |file| {
            ParquetWriter::new(file).finish(&mut df)?;
            Ok(())
        })?;
        tracing::debug!(path = %path.display(), entries = df.height(), "stored trade matrix");
        Ok(path)
    }

    /// Stage the content in a temporary file of the cache directory, then
    /// move it to `path` without replacing an existing entry. A failed write
    /// leaves nothing at `path`.
    fn write_once<F>(&self, path: &Path, write: F) -> Result<(), MfaError>
    where
        F: FnOnce(&mut File) -> Result<(), MfaError>,
    {
        if path.exists() {
            return Err(MfaError::CacheConflict(path.to_path_buf()));
        }
        std::fs::create_dir_all(&self.dir)?;
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        write(staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        match staged.persist_noclobber(path) {
            Ok(_) => Ok(()),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                Err(MfaError::CacheConflict(path.to_path_buf()))
            }
            Err(e) => Err(e.error.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    pub(crate) fn assert_close(actual: f64, expected: f64) {
        let tol = 1e-9 * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}"
        );
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a thread-local subscriber and return its result plus
    /// every `warn!` and `error!` line it emitted.
    pub(crate) fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        (out, logs)
    }

    #[test]
    fn sums_run_along_the_right_axis() {
        let m = FlowMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(row_sums(&m).as_slice(), &[3.0, 7.0]);
        assert_eq!(col_sums(&m).as_slice(), &[4.0, 6.0]);
    }

    #[test]
    fn triplets_add_repeated_positions() {
        let m = from_triplets(2, vec![(0, 1, 2.0), (0, 1, 3.0), (1, 0, 1.0)]).unwrap();
        assert_eq!(m[(0, 1)], 5.0);
        assert_eq!(m[(1, 0)], 1.0);
        assert!(from_triplets(2, vec![(2, 0, 1.0)]).is_err());
    }

    #[test]
    fn triplet_frame_keeps_nonzero_entries() {
        let m = FlowMatrix::from_row_slice(3, 3, &[0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 2.5, 0.0, 0.0]);
        let df = to_triplet_frame(&m).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(from_triplet_frame(&df, 3).unwrap(), m);
        assert!(ensure_square(&m, 3).is_ok());
        assert!(ensure_square(&m, 4).is_err());
    }

    #[test]
    fn long_frame_uses_labels() {
        let m = FlowMatrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]);
        let labels = vec!["A".to_string(), "B".to_string()];
        let df = to_long_frame(&m, &labels, &labels).unwrap();
        assert_eq!(df.height(), 1);
        let consumer = df.column(result::CONSUMER).unwrap().str().unwrap();
        let producer = df.column(result::PRODUCER).unwrap().str().unwrap();
        assert_eq!(consumer.get(0), Some("A"));
        assert_eq!(producer.get(0), Some("B"));
    }

    #[test]
    fn cache_entries_are_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TradeCache::new(dir.path().join("internal"));
        let m = FlowMatrix::from_row_slice(2, 2, &[0.0, 7.0, 3.0, 0.0]);

        assert!(cache
            .load(TradeFlow::Reconciled, Mineral::Bauxite, 2010, 2)
            .unwrap()
            .is_none());
        cache
            .store(TradeFlow::Reconciled, Mineral::Bauxite, 2010, &m)
            .unwrap();
        assert!(cache.contains(TradeFlow::Reconciled, Mineral::Bauxite, 2010));
        assert!(!cache.contains(TradeFlow::Imports, Mineral::Bauxite, 2010));

        let loaded = cache
            .load(TradeFlow::Reconciled, Mineral::Bauxite, 2010, 2)
            .unwrap()
            .unwrap();
        assert_eq!(loaded, m);

        let again = cache.store(TradeFlow::Reconciled, Mineral::Bauxite, 2010, &m);
        assert!(matches!(again, Err(MfaError::CacheConflict(_))));
    }

    #[test]
    fn failed_write_leaves_no_entry() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let cache = TradeCache::new(dir.path().join("internal"));
        let path = cache.path(TradeFlow::Imports, Mineral::Alumina, 2012);

        let failed = cache.write_once(&path, |file| {
            file.write_all(b"PAR1 truncated")?;
            Err(MfaError::InvalidData("disk full".into()))
        });
        assert!(matches!(failed, Err(MfaError::InvalidData(_))));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(cache.dir()).unwrap().count(), 0);

        let m = FlowMatrix::from_row_slice(2, 2, &[0.0, 1.5, 0.0, 0.0]);
        cache
            .store(TradeFlow::Imports, Mineral::Alumina, 2012, &m)
            .unwrap();
        let loaded = cache
            .load(TradeFlow::Imports, Mineral::Alumina, 2012, 2)
            .unwrap();
        assert_eq!(loaded, Some(m));
    }
}

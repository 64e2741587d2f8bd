//! 2D sample sequences.
//!
//! Four interchangeable strategies behind [`SampleSequence`]. Each worker
//! owns its own instance; nothing in here is shared mutably between
//! threads. The Halton table is immutable and shared behind an `Arc`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lumen_math::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

/// Largest f32 below 1.0.
pub const ONE_MINUS_EPSILON: f32 = 0.99999994;

/// Default number of precomputed Halton indices.
pub const DEFAULT_HALTON_LEN: usize = 100_000;

const HALTON_MAGIC: &[u8; 4] = b"LHAL";
const HALTON_VERSION: u32 = 1;

/// Which sampling strategy to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceKind {
    Random,
    Regular,
    #[default]
    Stratified,
    Halton,
}

/// A source of 2D samples in `[0,1) x [0,1)`.
pub trait SampleSequence: Send {
    /// Sample number `index`.
    fn next_2d(&mut self, index: u32) -> Vec2;

    fn kind(&self) -> SequenceKind;
}

/// Independent uniform samples; `index` is ignored.
pub struct RandomSequence {
    rng: StdRng,
}

impl RandomSequence {
    /// The generator is seeded once here, never per call.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SampleSequence for RandomSequence {
    fn next_2d(&mut self, _index: u32) -> Vec2 {
        Vec2::new(self.rng.gen(), self.rng.gen())
    }

    fn kind(&self) -> SequenceKind {
        SequenceKind::Random
    }
}

/// Grid dimension for a requested sample count: `floor(sqrt(n))`, at least 1.
pub fn grid_size(sample_count: u32) -> u32 {
    ((sample_count as f64).sqrt().floor() as u32).max(1)
}

/// Centre of grid cell number `index` in an `n x n` grid.
fn cell_center(index: u32, n: u32) -> Vec2 {
    let x = index % n;
    let y = (index / n) % n;
    Vec2::new((x as f32 + 0.5) / n as f32, (y as f32 + 0.5) / n as f32)
}

/// Cell centres of an `N x N` grid, row by row.
pub struct RegularSequence {
    n: u32,
}

impl RegularSequence {
    pub fn new(sample_count: u32) -> Self {
        Self {
            n: grid_size(sample_count),
        }
    }
}

impl SampleSequence for RegularSequence {
    fn next_2d(&mut self, index: u32) -> Vec2 {
        cell_center(index, self.n)
    }

    fn kind(&self) -> SequenceKind {
        SequenceKind::Regular
    }
}

/// Grid cell centres jittered uniformly within the cell.
pub struct StratifiedSequence {
    n: u32,
    rng: StdRng,
}

impl StratifiedSequence {
    pub fn new(sample_count: u32, seed: u64) -> Self {
        Self {
            n: grid_size(sample_count),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SampleSequence for StratifiedSequence {
    fn next_2d(&mut self, index: u32) -> Vec2 {
        let half_cell = 0.5 / self.n as f32;
        let jitter = Vec2::new(
            self.rng.gen_range(-half_cell..half_cell),
            self.rng.gen_range(-half_cell..half_cell),
        );
        (cell_center(index, self.n) + jitter)
            .clamp(Vec2::ZERO, Vec2::splat(ONE_MINUS_EPSILON))
    }

    fn kind(&self) -> SequenceKind {
        SequenceKind::Stratified
    }
}

/// Radical inverse of `index` in `base`, clamped below 1.
pub fn radical_inverse(base: u32, mut index: u64) -> f32 {
    let base64 = base as u64;
    let inv_base = 1.0 / base as f64;
    let mut inv = inv_base;
    let mut result = 0.0f64;
    while index > 0 {
        result += (index % base64) as f64 * inv;
        index /= base64;
        inv *= inv_base;
    }
    (result as f32).min(ONE_MINUS_EPSILON)
}

/// Precomputed Halton points in bases 2 and 3.
///
/// Indices past the table are computed on the fly with the same function,
/// so values are bit-identical either way.
#[derive(Clone, Debug, PartialEq)]
pub struct HaltonTable {
    base2: Vec<f32>,
    base3: Vec<f32>,
}

impl HaltonTable {
    /// Compute the first `len` points.
    pub fn compute(len: usize) -> Self {
        Self {
            base2: (0..len as u64).map(|i| radical_inverse(2, i)).collect(),
            base3: (0..len as u64).map(|i| radical_inverse(3, i)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.base2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base2.is_empty()
    }

    /// Halton point number `index`.
    pub fn get(&self, index: u32) -> Vec2 {
        let i = index as usize;
        match (self.base2.get(i), self.base3.get(i)) {
            (Some(&x), Some(&y)) => Vec2::new(x, y),
            _ => Vec2::new(
                radical_inverse(2, index as u64),
                radical_inverse(3, index as u64),
            ),
        }
    }

    /// Write the table as little-endian f32s.
    pub fn save(&self, path: &Path) -> CacheResult<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(HALTON_MAGIC)?;
        w.write_u32::<LittleEndian>(HALTON_VERSION)?;
        w.write_u64::<LittleEndian>(self.len() as u64)?;
        for &v in self.base2.iter().chain(&self.base3) {
            w.write_f32::<LittleEndian>(v)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Read a table written by [`HaltonTable::save`].
    pub fn load(path: &Path) -> CacheResult<Self> {
        let mut r = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != HALTON_MAGIC {
            return Err(CacheError::BadMagic { expected: "Halton" });
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != HALTON_VERSION {
            return Err(CacheError::Version {
                found: version,
                expected: HALTON_VERSION,
            });
        }

        let len = r.read_u64::<LittleEndian>()? as usize;
        let file_len = r.get_ref().metadata()?.len();
        if (len as u64).saturating_mul(8) + 16 != file_len {
            return Err(CacheError::Corrupt(format!(
                "Halton table of {} entries in a {} byte file",
                len, file_len
            )));
        }

        let read_column = |r: &mut BufReader<File>| -> CacheResult<Vec<f32>> {
            let mut column = vec![0.0f32; len];
            r.read_f32_into::<LittleEndian>(&mut column)?;
            Ok(column)
        };
        let base2 = read_column(&mut r)?;
        let base3 = read_column(&mut r)?;
        Ok(Self { base2, base3 })
    }

    /// Load the side file if it holds at least `len` points, otherwise
    /// compute the table and try to write it.
    pub fn load_or_compute(path: &Path, len: usize) -> Self {
        match Self::load(path) {
            Ok(table) if table.len() >= len => {
                log::debug!("Loaded {} Halton points from {}", table.len(), path.display());
                return table;
            }
            Ok(table) => log::debug!(
                "Halton side file has {} points, need {}",
                table.len(),
                len
            ),
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Ignoring Halton side file {}: {}", path.display(), e),
        }

        let table = Self::compute(len);
        if let Err(e) = table.save(path) {
            log::warn!("Could not write Halton side file {}: {}", path.display(), e);
        }
        table
    }
}

/// Halton points in bases 2 and 3.
pub struct HaltonSequence {
    table: Arc<HaltonTable>,
}

impl HaltonSequence {
    pub fn new(table: Arc<HaltonTable>) -> Self {
        Self { table }
    }
}

impl SampleSequence for HaltonSequence {
    fn next_2d(&mut self, index: u32) -> Vec2 {
        self.table.get(index)
    }

    fn kind(&self) -> SequenceKind {
        SequenceKind::Halton
    }
}

/// Creates one sequence per worker with the same configuration.
#[derive(Clone)]
pub struct SequenceFactory {
    kind: SequenceKind,
    sample_count: u32,
    halton: Option<Arc<HaltonTable>>,
}

impl SequenceFactory {
    /// Halton factories compute the default-sized table here.
    pub fn new(kind: SequenceKind, sample_count: u32) -> Self {
        let halton = (kind == SequenceKind::Halton)
            .then(|| Arc::new(HaltonTable::compute(DEFAULT_HALTON_LEN)));
        Self {
            kind,
            sample_count,
            halton,
        }
    }

    /// Use an existing (e.g. loaded) Halton table.
    pub fn with_halton_table(mut self, table: Arc<HaltonTable>) -> Self {
        self.halton = Some(table);
        self
    }

    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// A fresh sequence; `seed` only matters for the random strategies.
    pub fn create(&self, seed: u64) -> Box<dyn SampleSequence> {
        match self.kind {
            SequenceKind::Random => Box::new(RandomSequence::new(seed)),
            SequenceKind::Regular => Box::new(RegularSequence::new(self.sample_count)),
            SequenceKind::Stratified => {
                Box::new(StratifiedSequence::new(self.sample_count, seed))
            }
            SequenceKind::Halton => {
                let table = self
                    .halton
                    .clone()
                    .unwrap_or_else(|| Arc::new(HaltonTable::compute(DEFAULT_HALTON_LEN)));
                Box::new(HaltonSequence::new(table))
            }
        }
    }

    /// A sequence wrapped with its own cursor starting at `start`.
    pub fn stream(&self, seed: u64, start: u32) -> SampleStream {
        SampleStream::new(self.create(seed), start)
    }
}

/// A sequence plus the index cursor that walks it.
pub struct SampleStream {
    sequence: Box<dyn SampleSequence>,
    cursor: u32,
}

impl SampleStream {
    pub fn new(sequence: Box<dyn SampleSequence>, start: u32) -> Self {
        Self {
            sequence,
            cursor: start,
        }
    }

    /// Sample at the cursor, then advance it.
    pub fn next(&mut self) -> Vec2 {
        let s = self.sequence.next_2d(self.cursor);
        self.cursor = self.cursor.wrapping_add(1);
        s
    }

    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Move the cursor so the next sample is number `index`.
    #[inline]
    pub fn seek(&mut self, index: u32) {
        self.cursor = index;
    }

    pub fn kind(&self) -> SequenceKind {
        self.sequence.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [SequenceKind; 4] = [
        SequenceKind::Random,
        SequenceKind::Regular,
        SequenceKind::Stratified,
        SequenceKind::Halton,
    ];

    #[test]
    fn test_output_in_unit_square() {
        for kind in ALL_KINDS {
            let mut seq = SequenceFactory::new(kind, 16).create(3);
            for i in 0..10_000 {
                let s = seq.next_2d(i);
                assert!(s.x >= 0.0 && s.x < 1.0, "{:?} x = {}", kind, s.x);
                assert!(s.y >= 0.0 && s.y < 1.0, "{:?} y = {}", kind, s.y);
            }
        }
    }

    #[test]
    fn test_deterministic_strategies() {
        for kind in [SequenceKind::Regular, SequenceKind::Halton] {
            let mut a = SequenceFactory::new(kind, 64).create(1);
            let mut b = SequenceFactory::new(kind, 64).create(2);
            for i in [0, 1, 7, 63, 99_999, 100_000, 250_000] {
                assert_eq!(a.next_2d(i), b.next_2d(i));
                assert_eq!(a.next_2d(i), a.next_2d(i));
            }
        }
    }

    #[test]
    fn test_regular_grid() {
        let mut seq = RegularSequence::new(17); // floor(sqrt(17)) = 4
        assert_eq!(seq.next_2d(0), Vec2::new(0.125, 0.125));
        assert_eq!(seq.next_2d(1), Vec2::new(0.375, 0.125));
        assert_eq!(seq.next_2d(4), Vec2::new(0.125, 0.375));
        assert_eq!(seq.next_2d(16), seq.next_2d(0));
    }

    #[test]
    fn test_stratified_stays_in_cell() {
        let mut seq = StratifiedSequence::new(16, 9);
        for i in 0..1000 {
            let s = seq.next_2d(i);
            let cell = Vec2::new((i % 4) as f32, ((i / 4) % 4) as f32);
            assert!(s.x >= cell.x / 4.0 - 1e-6 && s.x <= (cell.x + 1.0) / 4.0 + 1e-6);
            assert!(s.y >= cell.y / 4.0 - 1e-6 && s.y <= (cell.y + 1.0) / 4.0 + 1e-6);
        }
    }

    #[test]
    fn test_random_seeded_once() {
        let mut a = RandomSequence::new(5);
        let mut b = RandomSequence::new(5);
        let first = a.next_2d(0);
        assert_eq!(first, b.next_2d(0));
        // Same index, new draw
        assert_ne!(first, a.next_2d(0));
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(2, 0), 0.0);
        assert_eq!(radical_inverse(2, 1), 0.5);
        assert_eq!(radical_inverse(2, 2), 0.25);
        assert_eq!(radical_inverse(2, 3), 0.75);
        assert!((radical_inverse(3, 1) - 1.0 / 3.0).abs() < 1e-7);
        assert!((radical_inverse(3, 5) - 7.0 / 9.0).abs() < 1e-7);
    }

    #[test]
    fn test_table_matches_on_the_fly() {
        let table = HaltonTable::compute(64);
        for i in 0..200u32 {
            let expected = Vec2::new(radical_inverse(2, i as u64), radical_inverse(3, i as u64));
            assert_eq!(table.get(i), expected);
        }
    }

    #[test]
    fn test_halton_side_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halton.bin");

        let computed = HaltonTable::load_or_compute(&path, 1000);
        assert!(path.exists());

        let loaded = HaltonTable::load(&path).unwrap();
        assert_eq!(loaded, computed);
        for i in [0u32, 1, 500, 999] {
            assert_eq!(loaded.get(i).x.to_bits(), computed.get(i).x.to_bits());
            assert_eq!(loaded.get(i).y.to_bits(), computed.get(i).y.to_bits());
        }

        // A larger request recomputes and rewrites
        let bigger = HaltonTable::load_or_compute(&path, 2000);
        assert_eq!(bigger.len(), 2000);
        assert_eq!(HaltonTable::load(&path).unwrap().len(), 2000);
    }

    #[test]
    fn test_halton_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halton.bin");
        std::fs::write(&path, b"not a table at all").unwrap();

        assert!(matches!(
            HaltonTable::load(&path),
            Err(CacheError::BadMagic { .. })
        ));
        assert_eq!(HaltonTable::load_or_compute(&path, 10).len(), 10);
    }

    #[test]
    fn test_stream_advances() {
        let mut stream = SequenceFactory::new(SequenceKind::Regular, 4).stream(0, 1);
        assert_eq!(stream.next(), Vec2::new(0.75, 0.25));
        assert_eq!(stream.next(), Vec2::new(0.25, 0.75));
        assert_eq!(stream.cursor(), 3);
        assert_eq!(stream.kind(), SequenceKind::Regular);

        stream.seek(1);
        assert_eq!(stream.next(), Vec2::new(0.75, 0.25));
    }
}

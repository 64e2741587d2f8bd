//! Binary caches for built hierarchies and radiosity solutions.
//!
//! Both formats are little endian and start with a magic tag, a format
//! version and the 16-byte fingerprint of the scene they were computed
//! for. A file written for another scene is rejected with
//! [`CacheError::HashMismatch`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lumen_core::{Scene, SceneHash};
use lumen_math::{Aabb, Vec3};

use crate::bvh::{Bvh, BvhConfig, BvhNode, SplitMode};
use crate::error::{BvhError, CacheError, CacheResult};

const HIERARCHY_MAGIC: &[u8; 4] = b"LBVH";
const HIERARCHY_VERSION: u32 = 1;
const RADIOSITY_MAGIC: &[u8; 4] = b"LRAD";
const RADIOSITY_VERSION: u32 = 1;

/// Child index stored for leaves.
const NO_CHILD: u32 = u32::MAX;

/// `Hierarchy-<hash>.bin`
pub fn hierarchy_file_name(hash: &SceneHash) -> String {
    format!("Hierarchy-{}.bin", hash.to_hex())
}

fn write_header<W: Write>(w: &mut W, magic: &[u8; 4], version: u32, hash: &SceneHash) -> CacheResult<()> {
    w.write_all(magic)?;
    w.write_u32::<LittleEndian>(version)?;
    w.write_all(hash.as_bytes())?;
    Ok(())
}

fn read_header<R: Read>(
    r: &mut R,
    magic: &[u8; 4],
    version: u32,
    what: &'static str,
    expected: SceneHash,
) -> CacheResult<()> {
    let mut found_magic = [0u8; 4];
    r.read_exact(&mut found_magic)?;
    if &found_magic != magic {
        return Err(CacheError::BadMagic { expected: what });
    }

    let found_version = r.read_u32::<LittleEndian>()?;
    if found_version != version {
        return Err(CacheError::Version {
            found: found_version,
            expected: version,
        });
    }

    let mut hash = [0u8; 16];
    r.read_exact(&mut hash)?;
    let found = SceneHash(hash);
    if found != expected {
        log::warn!("{} cache is for scene {}, current scene is {}", what, found, expected);
        return Err(CacheError::HashMismatch { expected, found });
    }
    Ok(())
}

fn to_u32(value: usize, what: &str) -> CacheResult<u32> {
    u32::try_from(value).map_err(|_| CacheError::Corrupt(format!("{} {} does not fit in u32", what, value)))
}

/// Refuse counts that cannot fit in the rest of the file.
fn check_count(count: u64, elem_size: u64, remaining: u64, what: &str) -> CacheResult<usize> {
    if count.saturating_mul(elem_size) > remaining {
        return Err(CacheError::Corrupt(format!(
            "{} {} entries but only {} bytes left",
            what, count, remaining
        )));
    }
    Ok(count as usize)
}

/// Write `bvh` for `scene` to `path`.
pub fn save_hierarchy(path: &Path, scene: &Scene, bvh: &Bvh) -> CacheResult<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_header(&mut w, HIERARCHY_MAGIC, HIERARCHY_VERSION, &scene.fingerprint())?;

    let config = bvh.config();
    w.write_u32::<LittleEndian>(config.mode.to_u32())?;
    w.write_u32::<LittleEndian>(to_u32(config.max_leaf_size, "leaf size")?)?;

    w.write_u64::<LittleEndian>(bvh.nodes().len() as u64)?;
    for node in bvh.nodes() {
        for v in node.bounds.min.to_array().iter().chain(&node.bounds.max.to_array()) {
            w.write_f32::<LittleEndian>(*v)?;
        }
        w.write_u32::<LittleEndian>(to_u32(node.start, "node start")?)?;
        w.write_u32::<LittleEndian>(to_u32(node.end, "node end")?)?;
        let [left, right] = match node.children {
            Some([l, r]) => [to_u32(l, "child")?, to_u32(r, "child")?],
            None => [NO_CHILD, NO_CHILD],
        };
        w.write_u32::<LittleEndian>(left)?;
        w.write_u32::<LittleEndian>(right)?;
    }

    w.write_u64::<LittleEndian>(bvh.indices().len() as u64)?;
    for &i in bvh.indices() {
        w.write_u32::<LittleEndian>(i)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a hierarchy written by [`save_hierarchy`] and validate it against
/// `scene`.
pub fn load_hierarchy(path: &Path, scene: &Scene) -> CacheResult<Bvh> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(file);
    read_header(&mut r, HIERARCHY_MAGIC, HIERARCHY_VERSION, "hierarchy", scene.fingerprint())?;

    let mode_raw = r.read_u32::<LittleEndian>()?;
    let mode = SplitMode::from_u32(mode_raw)
        .ok_or_else(|| CacheError::Corrupt(format!("unknown split mode {}", mode_raw)))?;
    let max_leaf_size = r.read_u32::<LittleEndian>()? as usize;

    // header (24) + mode/leaf (8) + node count (8)
    let node_count = r.read_u64::<LittleEndian>()?;
    let node_count = check_count(node_count, 40, file_len.saturating_sub(40), "node")?;
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let mut bounds = [0.0f32; 6];
        r.read_f32_into::<LittleEndian>(&mut bounds)?;
        let start = r.read_u32::<LittleEndian>()? as usize;
        let end = r.read_u32::<LittleEndian>()? as usize;
        let left = r.read_u32::<LittleEndian>()?;
        let right = r.read_u32::<LittleEndian>()?;

        let children = match (left, right) {
            (NO_CHILD, NO_CHILD) => None,
            (NO_CHILD, _) | (_, NO_CHILD) => {
                return Err(CacheError::Corrupt("node with a single child".into()));
            }
            (l, r) => Some([l as usize, r as usize]),
        };
        nodes.push(BvhNode {
            bounds: Aabb {
                min: Vec3::new(bounds[0], bounds[1], bounds[2]),
                max: Vec3::new(bounds[3], bounds[4], bounds[5]),
            },
            start,
            end,
            children,
        });
    }

    let index_count = r.read_u64::<LittleEndian>()?;
    let remaining = file_len.saturating_sub(48 + node_count as u64 * 40);
    let index_count = check_count(index_count, 4, remaining, "index")?;
    let mut indices = vec![0u32; index_count];
    r.read_u32_into::<LittleEndian>(&mut indices)?;

    let config = BvhConfig {
        mode,
        max_leaf_size,
    };
    Bvh::from_parts(nodes, indices, config, scene.triangle_count()).map_err(CacheError::Corrupt)
}

/// Load the cached hierarchy for `scene` from `dir`, or build and save one.
///
/// Any read failure, or a cache built with a different configuration,
/// causes a rebuild. Failing to write the new cache is only a warning.
pub fn load_or_build_hierarchy(dir: &Path, scene: &Scene, config: BvhConfig) -> Result<Bvh, BvhError> {
    let path: PathBuf = dir.join(hierarchy_file_name(&scene.fingerprint()));

    match load_hierarchy(&path, scene) {
        Ok(bvh) if bvh.config() == config => {
            log::info!("Loaded hierarchy from {}", path.display());
            return Ok(bvh);
        }
        Ok(bvh) => log::info!(
            "Cached hierarchy uses {:?}, rebuilding with {:?}",
            bvh.config(),
            config
        ),
        Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Ignoring hierarchy cache {}: {}", path.display(), e),
    }

    let bvh = Bvh::build(scene.triangles(), config)?;
    if let Err(e) = save_hierarchy(&path, scene, &bvh) {
        log::warn!("Could not write hierarchy cache {}: {}", path.display(), e);
    }
    Ok(bvh)
}

/// Write per-vertex irradiance for `scene`.
pub fn save_radiosity(path: &Path, scene: &Scene, irradiance: &[Vec3]) -> CacheResult<()> {
    if irradiance.len() != scene.vertex_count() {
        return Err(CacheError::Corrupt(format!(
            "{} irradiance values for {} vertices",
            irradiance.len(),
            scene.vertex_count()
        )));
    }

    let mut w = BufWriter::new(File::create(path)?);
    write_header(&mut w, RADIOSITY_MAGIC, RADIOSITY_VERSION, &scene.fingerprint())?;
    w.write_u64::<LittleEndian>(irradiance.len() as u64)?;
    for e in irradiance {
        w.write_f32::<LittleEndian>(e.x)?;
        w.write_f32::<LittleEndian>(e.y)?;
        w.write_f32::<LittleEndian>(e.z)?;
    }
    w.flush()?;
    Ok(())
}

/// Read per-vertex irradiance written by [`save_radiosity`] for `scene`.
pub fn load_radiosity(path: &Path, scene: &Scene) -> CacheResult<Vec<Vec3>> {
    let mut r = BufReader::new(File::open(path)?);
    read_header(&mut r, RADIOSITY_MAGIC, RADIOSITY_VERSION, "radiosity", scene.fingerprint())?;

    let count = r.read_u64::<LittleEndian>()?;
    if count != scene.vertex_count() as u64 {
        return Err(CacheError::Corrupt(format!(
            "{} irradiance values for {} vertices",
            count,
            scene.vertex_count()
        )));
    }

    let mut raw = vec![0.0f32; scene.vertex_count() * 3];
    r.read_f32_into::<LittleEndian>(&mut raw)?;
    Ok(raw
        .chunks_exact(3)
        .map(|c| Vec3::new(c[0], c[1], c[2]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{Material, SceneBuilder};
    use lumen_math::Vec2;

    fn boxed_scene(offset: f32) -> Scene {
        let mut builder = SceneBuilder::new();
        let m = builder.add_material(Material::default());
        builder.add_box(Vec3::new(offset, 0.0, 0.0), Vec3::ONE, true, m);
        builder.add_quad(Vec3::ZERO, Vec3::Y, Vec2::splat(0.3), m);
        builder.build().unwrap()
    }

    #[test]
    fn test_hierarchy_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let scene = boxed_scene(0.0);
        let config = BvhConfig {
            mode: SplitMode::Sah,
            max_leaf_size: 2,
        };
        let bvh = Bvh::build(scene.triangles(), config).unwrap();

        let path = dir.path().join(hierarchy_file_name(&scene.fingerprint()));
        save_hierarchy(&path, &scene, &bvh).unwrap();
        let loaded = load_hierarchy(&path, &scene).unwrap();

        assert_eq!(loaded.nodes(), bvh.nodes());
        assert_eq!(loaded.indices(), bvh.indices());
        assert_eq!(loaded.config(), config);
    }

    #[test]
    fn test_hierarchy_rejects_other_scene() {
        let dir = tempfile::tempdir().unwrap();
        let a = boxed_scene(0.0);
        let b = boxed_scene(0.5);
        let bvh = Bvh::build(a.triangles(), BvhConfig::default()).unwrap();

        let path = dir.path().join("h.bin");
        save_hierarchy(&path, &a, &bvh).unwrap();
        match load_hierarchy(&path, &b) {
            Err(CacheError::HashMismatch { expected, found }) => {
                assert_eq!(expected, b.fingerprint());
                assert_eq!(found, a.fingerprint());
            }
            other => panic!("expected hash mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_truncated_hierarchy_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let scene = boxed_scene(0.0);
        let bvh = Bvh::build(scene.triangles(), BvhConfig::default()).unwrap();
        let path = dir.path().join("h.bin");
        save_hierarchy(&path, &scene, &bvh).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();
        assert!(load_hierarchy(&path, &scene).is_err());

        std::fs::write(&path, b"nope").unwrap();
        assert!(load_hierarchy(&path, &scene).is_err());
    }

    #[test]
    fn test_load_or_build_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let scene = boxed_scene(0.0);
        let path = dir.path().join(hierarchy_file_name(&scene.fingerprint()));

        let built = load_or_build_hierarchy(dir.path(), &scene, BvhConfig::default()).unwrap();
        assert!(path.exists());

        let cached = load_or_build_hierarchy(dir.path(), &scene, BvhConfig::default()).unwrap();
        assert_eq!(cached.nodes(), built.nodes());

        // Different configuration is rebuilt and overwrites the file
        let sah = BvhConfig {
            mode: SplitMode::Sah,
            ..Default::default()
        };
        let rebuilt = load_or_build_hierarchy(dir.path(), &scene, sah).unwrap();
        assert_eq!(rebuilt.config(), sah);
        assert_eq!(load_hierarchy(&path, &scene).unwrap().config(), sah);

        // Garbage is replaced
        std::fs::write(&path, b"garbage").unwrap();
        let fixed = load_or_build_hierarchy(dir.path(), &scene, sah).unwrap();
        assert_eq!(fixed.nodes(), rebuilt.nodes());
    }

    #[test]
    fn test_radiosity_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let scene = boxed_scene(0.0);
        let values: Vec<Vec3> = (0..scene.vertex_count())
            .map(|i| Vec3::new(i as f32, 0.5, -1.0))
            .collect();

        let path = dir.path().join("radiosity.bin");
        save_radiosity(&path, &scene, &values).unwrap();
        assert_eq!(load_radiosity(&path, &scene).unwrap(), values);

        let other = boxed_scene(0.25);
        assert!(matches!(
            load_radiosity(&path, &other),
            Err(CacheError::HashMismatch { .. })
        ));
        assert!(matches!(
            save_radiosity(&path, &scene, &values[1..]),
            Err(CacheError::Corrupt(_))
        ));
    }
}

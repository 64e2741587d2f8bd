//! Content hash of a scene's vertex buffer.
//!
//! The hash keys every on-disk cache (BVH, radiosity solution); a cache
//! whose stored hash differs from the live scene's is stale.

use std::fmt;

use lumen_math::Vec3;
use md5::{Digest, Md5};

/// 128-bit MD5 digest of the raw vertex position bytes.
#[derive(Clone, Copy, Hash, Eq, PartialEq)]
pub struct SceneHash(pub [u8; 16]);

impl SceneHash {
    /// Hash a vertex buffer.
    pub fn of_positions(positions: &[Vec3]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(bytemuck::cast_slice::<Vec3, u8>(positions));
        Self(hasher.finalize().into())
    }

    /// Get the digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex rendering, 32 characters.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for SceneHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SceneHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneHash({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_content_based() {
        let a = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let b = a.clone();
        let mut c = a.clone();
        c[2].z = 1e-3;

        assert_eq!(SceneHash::of_positions(&a), SceneHash::of_positions(&b));
        assert_ne!(SceneHash::of_positions(&a), SceneHash::of_positions(&c));
    }

    #[test]
    fn test_hex_rendering() {
        // MD5 of the empty input
        let empty = SceneHash::of_positions(&[]);
        assert_eq!(empty.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(empty.to_string().len(), 32);
    }
}

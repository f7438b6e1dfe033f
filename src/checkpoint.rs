//! Parameter checkpoints
//!
//! Layout (all little-endian):
//!
//! ```text
//! magic   b"HCOL"
//! version u32
//! count   u32                 number of tensors
//! count × { len u64, len × f32 }
//! ```
//!
//! Tensors are written in `Network::parameters` order followed by
//! `Network::buffers` (running statistics). Files are replaced
//! atomically: the blob goes to a temp file in the target directory which is
//! then renamed over the destination.

use crate::error::{Error, Result};
use crate::network::Network;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const MAGIC: &[u8; 4] = b"HCOL";
const VERSION: u32 = 2;

fn checkpoint_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Checkpoint {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes every trainable parameter and buffer of `network` to `path`.
pub fn save_params(network: &Network, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let tmp = NamedTempFile::new_in(parent).map_err(checkpoint_err(path))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        let parameters = network.parameters();
        let buffers = network.buffers();

        let mut write = || -> std::io::Result<()> {
            writer.write_all(MAGIC)?;
            writer.write_all(&VERSION.to_le_bytes())?;
            writer.write_all(&((parameters.len() + buffers.len()) as u32).to_le_bytes())?;
            for tensor in parameters
                .iter()
                .copied()
                .chain(buffers.iter().map(Vec::as_slice))
            {
                writer.write_all(&(tensor.len() as u64).to_le_bytes())?;
                for value in tensor.iter() {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }
            writer.flush()?;
            writer.get_ref().sync_all()
        };
        write().map_err(checkpoint_err(path))?;
    }

    tmp.persist(path)
        .map_err(|err| checkpoint_err(path)(err.error))?;
    log::debug!("Saved checkpoint to {}", path.display());
    Ok(())
}

/// Restores every trainable parameter and buffer of `network` from `path`.
///
/// The network is left untouched unless the whole file matches its topology.
pub fn load_params(network: &mut Network, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(checkpoint_err(path))?;
    let mismatch = |reason: String| Error::CheckpointMismatch {
        path: path.to_path_buf(),
        reason,
    };

    let mut cursor = Cursor { bytes: &bytes, pos: 0 };
    if cursor.take(4) != Some(&MAGIC[..]) {
        return Err(mismatch("not a checkpoint file".to_string()));
    }
    let version = cursor
        .u32()
        .ok_or_else(|| mismatch("truncated header".to_string()))?;
    if version != VERSION {
        return Err(mismatch(format!("unsupported version {}", version)));
    }
    let count = cursor
        .u32()
        .ok_or_else(|| mismatch("truncated header".to_string()))? as usize;

    let expected: Vec<usize> = network
        .parameters()
        .iter()
        .map(|t| t.len())
        .chain(network.buffers().iter().map(Vec::len))
        .collect();
    if count != expected.len() {
        return Err(mismatch(format!(
            "file has {} tensors, network has {}",
            count,
            expected.len()
        )));
    }

    let mut tensors = Vec::with_capacity(count);
    for (index, &len) in expected.iter().enumerate() {
        let stored = cursor
            .u64()
            .ok_or_else(|| mismatch(format!("truncated at tensor {}", index)))?
            as usize;
        if stored != len {
            return Err(mismatch(format!(
                "tensor {} has {} values, network expects {}",
                index, stored, len
            )));
        }
        let raw = cursor
            .take(len * 4)
            .ok_or_else(|| mismatch(format!("truncated at tensor {}", index)))?;
        tensors.push(raw);
    }
    if cursor.pos != bytes.len() {
        return Err(mismatch("trailing bytes after last tensor".to_string()));
    }

    let (param_raw, buffer_raw) = tensors.split_at(network.parameters().len());
    for (params, raw) in network.parameters_mut().into_iter().zip(param_raw) {
        fill_le(params, raw);
    }
    for (buffer, raw) in network.buffers_mut().into_iter().zip(buffer_raw) {
        fill_le(buffer, raw);
    }

    log::info!("Loaded checkpoint from {}", path.display());
    Ok(())
}

fn fill_le(target: &mut [f32], raw: &[u8]) {
    for (value, chunk) in target.iter_mut().zip(raw.chunks_exact(4)) {
        *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Some(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::{build_model, ArchitectureConfig, LayerConfig};
    use crate::layers::LayerShape;
    use crate::utils::{Activation, SimpleRng};
    use tempfile::tempdir;

    fn network(seed: u64, units: usize) -> Network {
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::conv(3),
                LayerConfig::max_pool(),
                LayerConfig::dense(units, Activation::Softmax),
            ],
        };
        let input = LayerShape::Spatial {
            channels: 1,
            height: 4,
            width: 4,
        };
        build_model(&config, input, &mut SimpleRng::new(seed)).unwrap()
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.params");

        let source = network(1, 2);
        save_params(&source, &path).unwrap();

        let mut target = network(2, 2);
        assert_ne!(source.parameters(), target.parameters());
        load_params(&mut target, &path).unwrap();

        for (a, b) in source.parameters().iter().zip(target.parameters()) {
            let a_bits: Vec<u32> = a.iter().map(|v| v.to_bits()).collect();
            let b_bits: Vec<u32> = b.iter().map(|v| v.to_bits()).collect();
            assert_eq!(a_bits, b_bits);
        }
    }

    #[test]
    fn test_overwrite_replaces_previous() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.params");

        save_params(&network(1, 2), &path).unwrap();
        let newer = network(3, 2);
        save_params(&newer, &path).unwrap();

        let mut target = network(4, 2);
        load_params(&mut target, &path).unwrap();
        assert_eq!(target.parameters(), newer.parameters());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_topology_mismatch_leaves_network_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.params");
        save_params(&network(1, 2), &path).unwrap();

        let mut target = network(5, 3);
        let before: Vec<Vec<f32>> = target.parameters().iter().map(|t| t.to_vec()).collect();
        assert!(matches!(
            load_params(&mut target, &path),
            Err(Error::CheckpointMismatch { .. })
        ));
        let after: Vec<Vec<f32>> = target.parameters().iter().map(|t| t.to_vec()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let mut target = network(1, 2);
        assert!(matches!(
            load_params(&mut target, dir.path().join("absent.params")),
            Err(Error::Checkpoint { .. })
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.params");
        std::fs::write(&path, b"not a model").unwrap();
        let mut target = network(1, 2);
        assert!(matches!(
            load_params(&mut target, &path),
            Err(Error::CheckpointMismatch { .. })
        ));
    }
}

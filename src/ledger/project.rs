//! プロジェクトファイル (`.glmks`)
//!
//! `b"SKGT"` + バージョン (u16 LE) + bincode で書いた
//! 動画ID → フレーム番号 → 骨格 のマップ。undo/redo 履歴は保存しない。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{AnnotationError, Result};
use crate::pose::Skeleton;

pub const MAGIC: &[u8; 4] = b"SKGT";
pub const FORMAT_VERSION: u16 = 1;
pub const EXTENSION: &str = "glmks";

pub type Entries = BTreeMap<String, BTreeMap<usize, Skeleton>>;

const HEADER_LEN: usize = MAGIC.len() + 2;

pub fn encode(entries: &Entries) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(HEADER_LEN);
    data.extend_from_slice(MAGIC);
    data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bincode::serialize_into(&mut data, entries)?;
    Ok(data)
}

pub fn decode(data: &[u8]) -> Result<Entries> {
    if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
        return Err(AnnotationError::Format("not a project file".to_string()));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != FORMAT_VERSION {
        return Err(AnnotationError::Format(format!(
            "unsupported project version {version} (expected {FORMAT_VERSION})"
        )));
    }
    Ok(bincode::deserialize(&data[HEADER_LEN..])?)
}

pub fn write(path: &Path, entries: &Entries) -> Result<()> {
    let data = encode(entries)?;
    fs::write(path, data)?;
    Ok(())
}

pub fn read(path: &Path) -> Result<Entries> {
    if !path.is_file() {
        return Err(AnnotationError::MissingFile(path.to_path_buf()));
    }
    decode(&fs::read(path)?)
}

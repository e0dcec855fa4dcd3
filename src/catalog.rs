//! 송신측 페이로드 저장소
//!
//! 수신자가 요청한 이름을 실제 바이트열로 바꿔줌.
//! 이미지 디코딩 같은 해석은 하지 않고, 메타데이터는 그대로 CONNECT-REPLY에 실림

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::message::PayloadMeta;
use crate::Result;

/// 전송할 페이로드
#[derive(Debug, Clone)]
pub struct Payload {
    pub data: Bytes,
    pub meta: PayloadMeta,
}

impl Payload {
    pub fn new(data: impl Into<Bytes>, meta: PayloadMeta) -> Self {
        Self {
            data: data.into(),
            meta,
        }
    }

    /// 메타데이터 없는 일반 바이트열
    pub fn raw(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let meta = PayloadMeta::raw(data.len());
        Self { data, meta }
    }
}

/// 이름 → 페이로드 조회
///
/// 세션 태스크마다 공유되므로 `Send + Sync`
pub trait Catalog: Send + Sync {
    /// 없으면 `Ok(None)`
    fn lookup(&self, name: &str) -> Result<Option<Payload>>;
}

/// 메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: HashMap<String, Payload>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, payload: Payload) {
        self.entries.insert(name.into(), payload);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for MemoryCatalog {
    fn lookup(&self, name: &str) -> Result<Option<Payload>> {
        Ok(self.entries.get(name).cloned())
    }
}

/// 디렉토리 저장소: 루트 아래 파일을 그대로 보냄
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 루트 밖을 가리키는 이름은 거부
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !plain {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl Catalog for DirectoryCatalog {
    fn lookup(&self, name: &str) -> Result<Option<Payload>> {
        let Some(path) = self.resolve(name) else {
            debug!("허용되지 않는 이름: {:?}", name);
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }

        let data = std::fs::read(&path)?;
        debug!("파일 로드: {} ({} bytes)", path.display(), data.len());
        Ok(Some(Payload::raw(data)))
    }
}

//! BIP32/BIP44 派生路径
//!
//! 格式：`m/44'/60'/0'/0/0`，硬化标记支持 `'` 与 `h`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EngineError, Result};

/// 硬化索引偏移量（2^31）
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// 默认 EVM 路径（BIP44, coin type 60）
pub const DEFAULT_EVM_PATH: &str = "m/44'/60'/0'/0/0";

/// 路径中的单个层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildIndex {
    /// 不含硬化偏移的索引，必定 < 2^31
    pub index: u32,
    pub hardened: bool,
}

impl ChildIndex {
    pub fn normal(index: u32) -> Result<Self> {
        Self::checked(index, false)
    }

    pub fn hardened(index: u32) -> Result<Self> {
        Self::checked(index, true)
    }

    fn checked(index: u32, hardened: bool) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(EngineError::InvalidPath(format!(
                "index {} out of range (must be < 2^31)",
                index
            )));
        }
        Ok(Self { index, hardened })
    }

    /// BIP32 编码后的索引（硬化时加上 2^31）
    pub fn raw(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED_OFFSET
        } else {
            self.index
        }
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// 派生路径（纯值类型）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath {
    segments: Vec<ChildIndex>,
}

impl DerivationPath {
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        let mut parts = path.split('/');

        match parts.next() {
            Some("m") | Some("M") => {}
            _ => {
                return Err(EngineError::InvalidPath(format!(
                    "path must start with 'm': {}",
                    path
                )))
            }
        }

        let mut segments = Vec::new();
        for part in parts {
            segments.push(parse_segment(part, path)?);
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[ChildIndex] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// 在末尾追加一个非硬化子索引
    pub fn child(&self, index: u32) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(ChildIndex::normal(index)?);
        Ok(Self { segments })
    }

    /// 在末尾追加一个硬化子索引
    pub fn hardened_child(&self, index: u32) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(ChildIndex::hardened(index)?);
        Ok(Self { segments })
    }

    pub fn is_fully_hardened(&self) -> bool {
        self.segments.iter().all(|s| s.hardened)
    }

    pub fn default_evm() -> Self {
        Self {
            segments: vec![
                ChildIndex { index: 44, hardened: true },
                ChildIndex { index: 60, hardened: true },
                ChildIndex { index: 0, hardened: true },
                ChildIndex { index: 0, hardened: false },
                ChildIndex { index: 0, hardened: false },
            ],
        }
    }
}

fn parse_segment(part: &str, path: &str) -> Result<ChildIndex> {
    if part.is_empty() {
        return Err(EngineError::InvalidPath(format!(
            "empty segment in {}",
            path
        )));
    }

    let (digits, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
        Some(rest) => (rest, true),
        None => (part, false),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::InvalidPath(format!(
            "segment '{}' is not a number in {}",
            part, path
        )));
    }

    let index: u32 = digits.parse().map_err(|_| {
        EngineError::InvalidPath(format!("segment '{}' out of range in {}", part, path))
    })?;

    ChildIndex::checked(index, hardened)
}

impl FromStr for DerivationPath {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

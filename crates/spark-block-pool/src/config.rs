//! 多尺寸池配置。
//!
//! # 模块定位（Why）
//! - 部署代码只需给出一组有序的 `(块尺寸, 块数量)` 与一个统一的租借等待时限，
//!   [`SizeRoutedPool`](crate::SizeRoutedPool) 据此为每个尺寸构建一个定长子池；
//! - 同一份配置既能用构建器在代码中拼装，也能经 `serde` 从 TOML/JSON 读入。
//!
//! # 契约（What）
//! - 尺寸以升序保存，重复添加同一尺寸会覆盖其数量；
//! - 尺寸与数量的合法性（正数、4 字节对齐、总内存非零）在池构造时校验，而非在此处；
//! - 序列化形态：`{ blocks = [{ size, count }, ...], alloc_timeout_ms = <可选> }`，
//!   缺省 `alloc_timeout_ms` 表示无限期等待。

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{BufferError, Result};

/// 多尺寸池配置。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPoolConfiguration", into = "RawPoolConfiguration")]
pub struct PoolConfiguration {
    blocks: BTreeMap<usize, usize>,
    alloc_timeout: Option<Duration>,
}

impl PoolConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加（或覆盖）一个尺寸的块数量。
    #[must_use = "builder methods must be chained or built"]
    pub fn add(mut self, block_size: usize, block_count: usize) -> Self {
        self.blocks.insert(block_size, block_count);
        self
    }

    /// 设置所有子池共享的租借等待时限。
    #[must_use = "builder methods must be chained or built"]
    pub fn with_alloc_timeout(mut self, timeout: Duration) -> Self {
        self.alloc_timeout = Some(timeout);
        self
    }

    /// 共享的租借等待时限，`None` 表示无限期。
    pub fn alloc_timeout(&self) -> Option<Duration> {
        self.alloc_timeout
    }

    /// 升序排列的已配置尺寸。
    pub fn supported_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.keys().copied()
    }

    /// 升序排列的 `(尺寸, 数量)`。
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.blocks.iter().map(|(size, count)| (*size, *count))
    }

    pub fn block_count(&self, block_size: usize) -> Option<usize> {
        self.blocks.get(&block_size).copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 全部子池预留的总字节数 Σ(尺寸 × 数量)；溢出时返回 `None`。
    pub fn total_memory_size(&self) -> Option<usize> {
        self.blocks
            .iter()
            .try_fold(0usize, |total, (size, count)| {
                size.checked_mul(*count)
                    .and_then(|bytes| total.checked_add(bytes))
            })
    }

    /// 从 TOML 文本解析配置。
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source)
            .map_err(|err| BufferError::configuration(format!("malformed pool configuration: {err}")))
    }
}

/// 序列化形态。
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPoolConfiguration {
    #[serde(default)]
    blocks: Vec<RawBlockEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alloc_timeout_ms: Option<u64>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBlockEntry {
    size: usize,
    count: usize,
}

impl From<RawPoolConfiguration> for PoolConfiguration {
    fn from(raw: RawPoolConfiguration) -> Self {
        let mut config = raw
            .blocks
            .into_iter()
            .fold(Self::new(), |config, entry| config.add(entry.size, entry.count));
        config.alloc_timeout = raw.alloc_timeout_ms.map(Duration::from_millis);
        config
    }
}

impl From<PoolConfiguration> for RawPoolConfiguration {
    fn from(config: PoolConfiguration) -> Self {
        Self {
            alloc_timeout_ms: config
                .alloc_timeout
                .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
            blocks: config
                .blocks
                .into_iter()
                .map(|(size, count)| RawBlockEntry { size, count })
                .collect(),
        }
    }
}

use crate::{
    block::Block,
    config::PoolConfiguration,
    error::{BufferError, Result},
    fixed::{FixedSizePool, PoolStats},
    provider::BlockProvider,
};

/// `SizeRoutedPool` 聚合多个同构的 [`FixedSizePool`]，按请求尺寸选择子池。
///
/// # 教案式说明
/// - **意图 (Why)**：消息尺寸跨度较大时，单一块尺寸要么浪费内存、要么装不下；
///   按尺寸分档预留，再把请求路由到合适的档位。
/// - **路由 (How)**：按升序扫描已配置尺寸，选中**第一个** `block_size >= size` 的子池（首个适配）。
///   对升序集合而言，这恰好也是最紧的适配。
/// - **契约 (What)**：
///   - 没有任何尺寸足够：[`BufferError::AllocationFailure`]，不会惰性创建新池；
///   - 选中子池在共享时限内耗尽：[`BufferError::OutOfMemory`]；
///   - 路由层不支持 [`dealloc`](BlockProvider::dealloc)（[`BufferError::NotImplemented`]）。
///     块在租借时已记录所属子池，应通过 [`Block::release`] 归还。
pub struct SizeRoutedPool {
    pools: Vec<FixedSizePool>,
    config: PoolConfiguration,
}

impl SizeRoutedPool {
    /// 按配置为每个尺寸构建恰好一个子池。
    pub fn new(config: PoolConfiguration) -> Result<Self> {
        if config.is_empty() {
            return Err(BufferError::configuration("no block sizes configured"));
        }
        match config.total_memory_size() {
            Some(0) => {
                return Err(BufferError::configuration("required memory size is zero"));
            }
            None => {
                return Err(BufferError::configuration(
                    "required memory size overflows the address space",
                ));
            }
            Some(_) => {}
        }

        let pools = config
            .entries()
            .map(|(size, count)| FixedSizePool::with_timeout(size, count, config.alloc_timeout()))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            sizes = ?config.supported_sizes().collect::<Vec<_>>(),
            alloc_timeout = ?config.alloc_timeout(),
            "size-routed block pool created"
        );

        Ok(Self { pools, config })
    }

    /// 首个能容纳 `size` 字节的子池。
    pub fn pool_for(&self, size: usize) -> Option<&FixedSizePool> {
        self.pools.iter().find(|pool| pool.can_support(size))
    }

    /// 按尺寸升序排列的子池。
    pub fn pools(&self) -> &[FixedSizePool] {
        &self.pools
    }

    pub fn configuration(&self) -> &PoolConfiguration {
        &self.config
    }

    /// 每个子池的统计快照，按尺寸升序。
    pub fn stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(FixedSizePool::stats).collect()
    }

    fn largest_block_size(&self) -> usize {
        self.pools.last().map_or(0, FixedSizePool::block_size)
    }
}

impl BlockProvider for SizeRoutedPool {
    fn alloc(&self, size: usize) -> Result<Block> {
        let Some(pool) = self.pool_for(size) else {
            return Err(BufferError::AllocationFailure {
                requested: size,
                largest: self.largest_block_size(),
            });
        };
        tracing::trace!(requested = size, block_size = pool.block_size(), "routed allocation");
        pool.alloc_with_timeout(size, self.config.alloc_timeout())
            .map_err(|err| match err {
                BufferError::Unavailable { block_size, .. } => BufferError::OutOfMemory {
                    requested: size,
                    block_size,
                },
                other => other,
            })
    }

    /// 路由层不接收归还；传入的块在丢弃时自行回到其所属子池。
    fn dealloc(&self, block: Block) -> Result<()> {
        drop(block);
        Err(BufferError::NotImplemented {
            operation: "SizeRoutedPool::dealloc",
        })
    }
}

impl std::fmt::Debug for SizeRoutedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizeRoutedPool")
            .field("pools", &self.pools)
            .field("alloc_timeout", &self.config.alloc_timeout())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn three_tier() -> SizeRoutedPool {
        SizeRoutedPool::new(
            PoolConfiguration::new()
                .add(1024, 1)
                .add(64, 2)
                .add(256, 2)
                .with_alloc_timeout(Duration::ZERO),
        )
        .unwrap()
    }

    #[test]
    fn builds_one_pool_per_size_in_ascending_order() {
        let pool = three_tier();
        let sizes: Vec<usize> = pool.pools().iter().map(FixedSizePool::block_size).collect();
        assert_eq!(sizes, vec![64, 256, 1024]);
        assert!(
            pool.pools()
                .iter()
                .all(|p| p.alloc_timeout() == Some(Duration::ZERO))
        );
    }

    #[test]
    fn exhausted_tier_reports_out_of_memory() {
        let pool = three_tier();
        let _held = pool.alloc(1000).unwrap();
        assert_eq!(
            pool.alloc(512).unwrap_err(),
            BufferError::OutOfMemory {
                requested: 512,
                block_size: 1024
            }
        );
    }

    #[test]
    fn pool_for_exposes_routing_without_allocating() {
        let pool = three_tier();
        assert_eq!(pool.pool_for(64).map(FixedSizePool::block_size), Some(64));
        assert_eq!(pool.pool_for(65).map(FixedSizePool::block_size), Some(256));
        assert!(pool.pool_for(1025).is_none());
        assert!(pool.stats().iter().all(|s| s.outstanding == 0));
    }
}

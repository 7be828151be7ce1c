//! `spark-block-pool` 提供面向二进制编解码的定长内存块、游标视图与池化提供者。
//!
//! # 模块定位（Why）
//! - 编解码热路径需要可复用的定长字节区域：预先一次性分配，按块租借、归还，
//!   避免每条消息都经过全局分配器；
//! - 容量耗尽时调用方应当**等待或得到明确的失败**，而不是让池无限膨胀。
//!
//! # 设计概要（How）
//! - [`Block`]：定长字节区域，携带回收句柄，`release` 或 `Drop` 时回到所属提供者；
//! - [`InboundView`] / [`OutboundView`]：基于游标的大端读写视图，前者向前生长，后者向后生长，
//!   共享 [`BinaryWriter`] 中的编码原语；
//! - [`BlockProvider`]：租借契约，由 [`UnpooledProvider`]、[`FixedSizePool`]、[`SizeRoutedPool`] 实现；
//! - [`PoolConfiguration`]：多尺寸池的构建器与 `serde` 配置形态。
//!
//! # 使用示例
//! ```
//! use std::time::Duration;
//! use spark_block_pool::{BinaryWriter, InboundView, PoolConfiguration, SizeRoutedPool};
//!
//! let pool = SizeRoutedPool::new(
//!     PoolConfiguration::new()
//!         .add(64, 4)
//!         .add(256, 2)
//!         .with_alloc_timeout(Duration::from_millis(10)),
//! )?;
//! let mut view = InboundView::with_block_size(&pool, 100)?;
//! view.add_string("hello")?;
//! assert_eq!(view.read_string()?, "hello");
//! assert_eq!(pool.stats()[1].outstanding, 1);
//! # Ok::<(), spark_block_pool::BufferError>(())
//! ```
//!
//! # 命名约定（Consistency）
//! - 错误统一为 [`BufferError`]，稳定错误码见 [`codes`]；
//! - 统计快照（[`PoolStats`]、[`UnpooledStats`]）只读且按值返回，不持有锁。

mod block;
mod codec;
mod config;
mod error;
mod fixed;
mod inbound;
mod outbound;
mod provider;
mod routed;

pub use block::{Block, BlockRecycler};
pub use codec::{BinaryWriter, STRING_PREFIX_LEN};
pub use config::PoolConfiguration;
pub use error::{BufferError, Result, codes};
pub use fixed::{FixedSizePool, PoolStats};
pub use inbound::InboundView;
pub use outbound::OutboundView;
pub use provider::{BlockProvider, UnpooledProvider, UnpooledStats};
pub use routed::SizeRoutedPool;

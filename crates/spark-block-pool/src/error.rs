//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义内存块、游标视图与池化提供者的全部失败语义，调用方只需面对一个错误类型；
//! - 区分“编程错误”（越界读写、释放后使用）与“容量契约内的正常结果”（限时等待超时），
//!   便于上层决定是快速失败还是削峰重试。
//!
//! ## 设计要求（What）
//! - 所有变体派生 [`thiserror::Error`]，并实现 `Clone + Eq`，方便在测试中直接断言；
//! - 每个变体映射到稳定的 `<领域>.<语义>` 错误码（见 [`codes`]），用于日志检索与告警聚合。

use std::time::Duration;

use thiserror::Error;

/// 稳定错误码集合。
///
/// 命名遵循 `<领域>.<语义>`：`buffer.*` 来自游标视图，`pool.*` 来自提供者与池。
pub mod codes {
    /// 读取越过写游标。
    pub const BUFFER_OUT_OF_RANGE: &str = "buffer.out_of_range";
    /// 写入超出块容量。
    pub const BUFFER_OUT_OF_CAPACITY: &str = "buffer.out_of_capacity";
    /// 字符串长度前缀非法。
    pub const BUFFER_MALFORMED_STRING: &str = "buffer.malformed_string";
    /// 字符串负载不是合法 UTF-8。
    pub const BUFFER_INVALID_UTF8: &str = "buffer.invalid_utf8";
    /// 视图已释放其内存块。
    pub const BUFFER_RELEASED: &str = "buffer.released";
    /// 池配置非法。
    pub const POOL_CONFIGURATION: &str = "pool.configuration";
    /// 请求尺寸超出所有可用块。
    pub const POOL_ALLOCATION_FAILURE: &str = "pool.allocation_failure";
    /// 单尺寸池限时等待超时。
    pub const POOL_UNAVAILABLE: &str = "pool.unavailable";
    /// 多尺寸池中被选中的子池限时等待超时。
    pub const POOL_OUT_OF_MEMORY: &str = "pool.out_of_memory";
    /// 池已关闭。
    pub const POOL_CLOSED: &str = "pool.closed";
    /// 归还的块不属于该提供者，或该槽位并未处于租借状态。
    pub const POOL_FOREIGN_BLOCK: &str = "pool.foreign_block";
    /// 操作未实现。
    pub const POOL_NOT_IMPLEMENTED: &str = "pool.not_implemented";
}

/// 缓冲子系统的统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：游标视图与提供者共享同一错误类型，`?` 可在编解码与分配之间直接传播。
/// - **契约 (What)**：
///   - `OutOfRange` / `OutOfCapacity` / `Released` / `ForeignBlock` 属于调用方编程错误，不应重试；
///   - `Configuration` / `AllocationFailure` 在构造或首次分配时即刻暴露，池不会为此惰性扩容；
///   - `Unavailable` / `OutOfMemory` 是容量契约的正常结果，调用方需显式处理（削峰、稍后重试）。
/// - **设计权衡 (Trade-offs)**：`Configuration` 使用 `String` 承载原因，牺牲一次堆分配换取可读性；
///   该路径只出现在构造阶段，不影响热路径。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// 读取会越过写游标（不能读取尚未写入的数据）。
    #[error("read of {requested} byte(s) is out of range: only {available} byte(s) readable")]
    OutOfRange { requested: usize, available: usize },

    /// 写入会超过块容量。
    #[error("write of {requested} byte(s) exceeds capacity: only {remaining} byte(s) writable")]
    OutOfCapacity { requested: usize, remaining: usize },

    /// 字符串长度前缀为负数。
    #[error("string length prefix {length} is negative")]
    MalformedString { length: i32 },

    /// 字符串负载不是合法 UTF-8。
    #[error("string payload of {length} byte(s) is not valid UTF-8")]
    InvalidUtf8 { length: usize },

    /// 视图已经释放了内存块，禁止继续使用。
    #[error("buffer view used after its block was released")]
    Released,

    /// 池或配置参数非法。
    #[error("invalid pool configuration: {reason}")]
    Configuration { reason: String },

    /// 没有任何块能够满足请求尺寸。
    #[error("requested block size {requested} is not supported (largest block is {largest})")]
    AllocationFailure { requested: usize, largest: usize },

    /// 单尺寸池在限时等待内没有可用块。
    #[error("no {block_size}-byte block became available within {waited:?}")]
    Unavailable { block_size: usize, waited: Duration },

    /// 多尺寸池选中的子池在限时等待内耗尽。
    #[error("out of memory: no {block_size}-byte block available for a {requested}-byte request")]
    OutOfMemory { requested: usize, block_size: usize },

    /// 池已关闭，不再出借内存块。
    #[error("{block_size}-byte block pool is closed")]
    PoolClosed { block_size: usize },

    /// 归还的块不属于当前提供者，或该槽位并未处于租借状态。
    #[error("block does not belong to this provider or is not currently lent")]
    ForeignBlock,

    /// 操作在该提供者上未实现。
    #[error("`{operation}` is not implemented by this provider")]
    NotImplemented { operation: &'static str },
}

impl BufferError {
    /// 以任意可显示原因构造配置错误。
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => codes::BUFFER_OUT_OF_RANGE,
            Self::OutOfCapacity { .. } => codes::BUFFER_OUT_OF_CAPACITY,
            Self::MalformedString { .. } => codes::BUFFER_MALFORMED_STRING,
            Self::InvalidUtf8 { .. } => codes::BUFFER_INVALID_UTF8,
            Self::Released => codes::BUFFER_RELEASED,
            Self::Configuration { .. } => codes::POOL_CONFIGURATION,
            Self::AllocationFailure { .. } => codes::POOL_ALLOCATION_FAILURE,
            Self::Unavailable { .. } => codes::POOL_UNAVAILABLE,
            Self::OutOfMemory { .. } => codes::POOL_OUT_OF_MEMORY,
            Self::PoolClosed { .. } => codes::POOL_CLOSED,
            Self::ForeignBlock => codes::POOL_FOREIGN_BLOCK,
            Self::NotImplemented { .. } => codes::POOL_NOT_IMPLEMENTED,
        }
    }

    /// 是否属于可恢复的容量结果（限时等待超时）。
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::OutOfMemory { .. })
    }
}

/// 本 crate 统一的结果别名。
pub type Result<T, E = BufferError> = core::result::Result<T, E>;

//! 大端二进制编码原语。
//!
//! # 线格式（What）
//! - 整数与浮点：大端、定宽（1/2/4/8 字节）；
//! - 布尔：单字节，`0` 为假，任意非零为真；
//! - 字符串：4 字节大端长度前缀（空串或缺省为 `0`），随后是同样长度的 UTF-8 字节。
//!
//! # 组织方式（How）
//! - [`BinaryWriter`] 只要求实现者提供 [`prepare_writing`](BinaryWriter::prepare_writing)，
//!   所有定型写入都建立在它之上；入站视图向前生长、出站视图向后生长，二者共享同一套编码。
//! - 每个字段都通过**一次** `prepare_writing` 预留完整宽度（字符串为前缀加负载），
//!   失败时游标不动，不会留下半个字段。

use bytes::BufMut;

use crate::error::{BufferError, Result};

/// 字符串长度前缀宽度。
pub const STRING_PREFIX_LEN: usize = 4;

/// 基于游标预留的大端写入器。
pub trait BinaryWriter {
    /// 预留 `count` 字节并返回该区域；容量不足时返回 [`BufferError::OutOfCapacity`]。
    fn prepare_writing(&mut self, count: usize) -> Result<&mut [u8]>;

    /// 写入原始字节。
    fn add_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.prepare_writing(data.len())?.copy_from_slice(data);
        Ok(())
    }

    fn add_u8(&mut self, value: u8) -> Result<()> {
        self.prepare_writing(1)?.put_u8(value);
        Ok(())
    }

    fn add_i16(&mut self, value: i16) -> Result<()> {
        self.prepare_writing(2)?.put_i16(value);
        Ok(())
    }

    fn add_i32(&mut self, value: i32) -> Result<()> {
        self.prepare_writing(4)?.put_i32(value);
        Ok(())
    }

    fn add_i64(&mut self, value: i64) -> Result<()> {
        self.prepare_writing(8)?.put_i64(value);
        Ok(())
    }

    fn add_f32(&mut self, value: f32) -> Result<()> {
        self.prepare_writing(4)?.put_f32(value);
        Ok(())
    }

    fn add_f64(&mut self, value: f64) -> Result<()> {
        self.prepare_writing(8)?.put_f64(value);
        Ok(())
    }

    fn add_bool(&mut self, value: bool) -> Result<()> {
        self.add_u8(u8::from(value))
    }

    /// 写入长度前缀字符串；最终布局恒为“前缀在前、负载在后”，与写入方向无关。
    fn add_string(&mut self, value: &str) -> Result<()> {
        let payload = value.as_bytes();
        let prefix = string_prefix(payload.len())?;
        let mut dst = self.prepare_writing(STRING_PREFIX_LEN + payload.len())?;
        dst.put_i32(prefix);
        dst.put_slice(payload);
        Ok(())
    }

    /// 写入可缺省字符串，`None` 与空串编码相同。
    fn add_optional_string(&mut self, value: Option<&str>) -> Result<()> {
        self.add_string(value.unwrap_or_default())
    }
}

/// 计算字符串长度前缀；超出 `i32` 表示范围的负载无法编码。
fn string_prefix(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| BufferError::OutOfCapacity {
        requested: len,
        remaining: i32::MAX as usize,
    })
}

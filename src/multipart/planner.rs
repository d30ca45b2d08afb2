//! Part planner / 分片规划
//!
//! Splits `[0, total_size)` into contiguous parts. Every part but the last has
//! the same length; that length grows from the preferred size until the part
//! count fits the backend limits.

use crate::error::{OssError, Result};

/// OSS minimum size of a non-final part (100KB) / 非末尾分片最小值
pub const MIN_PART_SIZE: u64 = 100 * 1024;

/// OSS maximum number of parts per upload / 最大分片数
pub const MAX_PART_COUNT: u64 = 10_000;

/// OSS maximum size of one part (5GB) / 单片最大值
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default preferred part size (10MB) / 默认分片大小
pub const DEFAULT_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Backend part limits / 后端分片限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    pub min_part_size: u64,
    pub max_part_count: u64,
    pub max_part_size: u64,
}

impl Default for PartLimits {
    fn default() -> Self {
        Self {
            min_part_size: MIN_PART_SIZE,
            max_part_count: MAX_PART_COUNT,
            max_part_size: MAX_PART_SIZE,
        }
    }
}

/// One unit of upload work / 分片任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartTask {
    /// 1-based part number / 分片号（从1开始）
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
}

impl PartTask {
    /// Exclusive end offset / 结束偏移（不含）
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Ordered part list for one object / 分片计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    pub total_size: u64,
    pub part_size: u64,
    pub tasks: Vec<PartTask>,
}

impl PartPlan {
    pub fn part_count(&self) -> u32 {
        self.tasks.len() as u32
    }
}

/// Effective part size for `total_size` / 确定分片大小
pub fn determine_part_size(total_size: u64, preferred_size: u64, limits: &PartLimits) -> Result<u64> {
    if total_size == 0 {
        return Err(OssError::invalid_input("total size must be greater than 0"));
    }
    if preferred_size == 0 {
        return Err(OssError::invalid_input("preferred part size must be greater than 0"));
    }

    // Small object: one part holds everything
    if total_size < preferred_size {
        if total_size > limits.max_part_size {
            return Err(OssError::invalid_input(format!(
                "object of {} bytes exceeds the maximum part size {}",
                total_size, limits.max_part_size
            )));
        }
        return Ok(total_size);
    }

    let mut part_size = preferred_size;
    while part_size.saturating_mul(limits.max_part_count) < total_size
        || part_size < limits.min_part_size
    {
        part_size = part_size.checked_mul(2).ok_or_else(|| {
            OssError::invalid_input(format!("cannot find a part size for {} bytes", total_size))
        })?;
    }

    if part_size > limits.max_part_size {
        return Err(OssError::invalid_input(format!(
            "object of {} bytes needs {}-byte parts, above the maximum {}",
            total_size, part_size, limits.max_part_size
        )));
    }

    Ok(part_size)
}

/// Plan contiguous parts covering `[0, total_size)` / 生成分片计划
pub fn plan_parts(total_size: u64, preferred_size: u64, limits: &PartLimits) -> Result<PartPlan> {
    let part_size = determine_part_size(total_size, preferred_size, limits)?;
    let count = total_size.div_ceil(part_size);

    let mut tasks = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    let mut part_number = 1u32;
    while offset < total_size {
        let length = part_size.min(total_size - offset);
        tasks.push(PartTask {
            part_number,
            offset,
            length,
        });
        offset += length;
        part_number += 1;
    }

    Ok(PartPlan {
        total_size,
        part_size,
        tasks,
    })
}

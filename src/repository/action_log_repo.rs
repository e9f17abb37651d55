// ==========================================
// 化工批次排产系统 - 操作日志数据仓储
// ==========================================
// 红线: 所有写入用例必须记录
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ActionLogRepository;

//! 执行轨迹记录（结构化 JSON 事件）
//!
//! 设计目标：
//! - **结构化**：用 JSON 事件而不是解析文本日志
//! - **轻量**：存内存，仿真结束一次性写文件
//! - **可回放**：同一 profile + seed 产生逐字节相同的事件流

mod types;

pub use types::{FlowEvent, FlowEventKind, FlowEventLogger};

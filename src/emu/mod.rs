//! 流量程序执行模块
//!
//! 在虚拟时间上确定性地执行成对的 client/server 程序：每个流实例拥有
//! 独立的指令指针与变量绑定，经由内存传输通道交换字节计数。
//! 不模拟分段/重传/拥塞控制，只模拟程序可见的传输契约。

// 子模块声明
mod config;
mod events;
mod exec;
mod flow;
mod stats;
mod transport;
mod world;

// 重新导出公共接口
pub use config::EmuConfig;
pub use events::{
    ConnEstablished, Deliver, FlowWatchdog, PeerClosed, PeerReset, Resume, ResumeKind, StartFlow,
};
pub use flow::{EndReason, FlowId, FlowInstance};
pub use stats::EmuStats;
pub use world::EmuWorld;

//! 仿真核心模块
//!
//! 事件驱动仿真的核心组件：虚拟时间、事件、世界与仿真器。
//! 流量程序的执行（`emu` 模块）完全运行在这套虚拟时间之上。

// 子模块声明
mod event;
mod simulator;
mod time;
mod world;

// 重新导出公共接口
pub use event::{Event, ScheduledEvent};
pub use simulator::Simulator;
pub use time::SimTime;
pub use world::World;

//! 流量程序模块
//!
//! 单侧（client/server）流量程序的指令集、构建器与循环拆分工具。
//! 程序构建完成后不可变，由 `emu` 模块按每流实例独立执行。

// 子模块声明
mod builder;
mod error;
mod instruction;
mod loops;
mod program;

// 重新导出公共接口
pub use builder::ProgramBuilder;
pub use error::ProgramError;
pub use instruction::{BufId, Instruction, MAX_FLOW_VARS, VarId};
pub use loops::{DEFAULT_LOOP_BYTE_CEILING, LoopSplit, emit_chunk_loop, split_chunk_loop};
pub use program::{Mode, Program, Side};

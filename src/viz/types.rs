use crate::emu::EndReason;
use crate::prog::Side;
use serde::{Deserialize, Serialize};

/// 轨迹事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowEventKind {
    /// 运行元信息（建议作为 t=0 的第一条事件）
    Meta {
        flows_per_template: u64,
        templates: usize,
        latency_ns: u64,
        seed: u64,
    },
    /// 流启动（地址由 IP 生成器抽取）
    FlowStart {
        client_ip: String,
        server_ip: String,
        port: u16,
    },
    /// 传输建立完成（握手一个往返后）
    Established,
    /// 一次 send 指令完成入队
    Tx { bytes: u64, blocking: bool },
    /// 一条 recv 指令得到满足
    RxSatisfied { min_bytes: u64, partial: bool },
    /// delay / delay_rand 挂起开始
    DelayStart { usec: u64 },
    /// 跳转指令执行（taken=false 表示顺序落下）
    Jump { target: usize, taken: bool },
    /// set_var / set_tick_var 写入变量
    VarSet { id: u8, val: u64 },
    /// 一侧程序走完，半关闭
    HalfClose,
    /// reset 指令触发硬中止
    Reset,
    /// 双侧终止，流结束
    FlowDone { reason: EndReason },
    /// 看门狗杀死停滞流；`unmet_rx_bytes` 为未满足的接收水位
    Stalled { unmet_rx_bytes: u64 },
}

/// 一个可回放的事件（JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEvent {
    /// 仿真时间（纳秒，和 `SimTime.0` 同口径）
    pub t_ns: u64,
    pub flow_id: Option<u64>,
    pub side: Option<Side>,
    #[serde(flatten)]
    pub kind: FlowEventKind,
}

/// 一个简单的事件收集器（存内存，仿真结束写 JSON 文件）
#[derive(Debug, Default)]
pub struct FlowEventLogger {
    pub events: Vec<FlowEvent>,
}

impl FlowEventLogger {
    pub fn push(&mut self, ev: FlowEvent) {
        self.events.push(ev);
    }
}

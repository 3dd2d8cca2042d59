//! 流量配置模块
//!
//! 将 client/server 程序、IP 生成策略与端口关联规则组装成 Profile，
//! 并编译为引擎可加载的 JSON 数据库。

// 子模块声明
mod compile;
mod error;
mod ip_gen;
mod profile;
mod spec;
mod template;

// 重新导出公共接口
pub use compile::{
    CompiledAssocRule, CompiledClientTemplate, CompiledIpGenDist, CompiledProfile,
    CompiledProgram, CompiledServerTemplate, CompiledTemplate, compile,
};
pub use error::ProfileError;
pub use ip_gen::{IpDistribution, IpGen, IpGenDist, IpRange};
pub(crate) use ip_gen::mix64;
pub use profile::Profile;
pub use spec::{
    IpGenDistSpec, IpGenSpec, OpSpec, ProfileSpec, SpecDefaults, SpecError, SpecMeta,
    TemplateSpec, build_profile,
};
pub use template::{AssocRule, Association, ClientTemplate, ServerTemplate, TemplatePair};

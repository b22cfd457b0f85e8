// ==========================================
// 动态配置 - 配置提供者
// ==========================================
// 职责: 定义可插拔配置单元的能力契约
//       {标识, 生成快照, 应用快照, 是否自动应用}
// ==========================================

pub mod globals;
pub mod registry;

pub use globals::{GlobalState, GlobalValueCodec, GlobalsProvider, NativeCodec};
pub use registry::{
    build_providers, ProviderFactory, ProviderFactoryRegistry,
    ProviderSpecs, RegisterConfigsHook, GLOBALS_FACTORY,
};

use thiserror::Error;

/// 提供者生成快照时的错误
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("无法原生序列化全局变量 {name}: 请提供自定义编解码器")]
    UnsupportedValue { name: String },

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 配置提供者
///
/// - `key` 在提供者生命周期内不可变且全局唯一
/// - `apply` 对“坏数据”只返回 false，不 panic；如何暴露失败由宿主决定
pub trait ConfigProvider: Send + Sync {
    fn key(&self) -> &str;

    /// 读取当前状态并序列化为可持久化的载荷
    fn serialize(&self, additional_data: Option<&serde_json::Value>) -> Result<String, ProviderError>;

    /// 用之前序列化的载荷恢复状态
    fn apply(&self, serialized: &str) -> bool;

    /// 加载后是否立即自动应用
    fn should_auto_apply(&self) -> bool;
}

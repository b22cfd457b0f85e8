// ==========================================
// 动态配置 - 全局变量型提供者
// ==========================================
// 全局状态通过 GlobalState 显式注入，提供者不直接访问进程级可变状态
// 载荷格式: JSON 对象 {全局变量名: 值}
// ==========================================

use crate::provider::{ConfigProvider, ProviderError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ==========================================
// GlobalState - 宿主全局变量容器
// ==========================================

/// 宿主范围的具名全局变量（可克隆的共享句柄）
#[derive(Debug, Clone, Default)]
pub struct GlobalState {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.write().insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.write().remove(name)
    }

    /// 当前全部全局变量的拷贝
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.read().clone()
    }

    // 锁中毒时继续使用内部数据：写入都是单条 insert，不存在半更新状态
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ==========================================
// GlobalValueCodec - 单个全局变量的编解码
// ==========================================

pub trait GlobalValueCodec: Send + Sync {
    fn encode(&self, name: &str, value: &Value) -> Result<Value, ProviderError>;

    fn decode(&self, name: &str, value: Value) -> Value;
}

/// 原生编解码：只接受字符串、数组与空值
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec;

impl GlobalValueCodec for NativeCodec {
    fn encode(&self, name: &str, value: &Value) -> Result<Value, ProviderError> {
        match value {
            Value::Null | Value::String(_) | Value::Array(_) => Ok(value.clone()),
            _ => Err(ProviderError::UnsupportedValue {
                name: name.to_string(),
            }),
        }
    }

    fn decode(&self, _name: &str, value: Value) -> Value {
        value
    }
}

// ==========================================
// GlobalsProvider
// ==========================================

pub struct GlobalsProvider {
    key: String,
    supported_globals: Vec<String>,
    auto_apply: bool,
    globals: GlobalState,
    codec: Box<dyn GlobalValueCodec>,
}

impl GlobalsProvider {
    pub fn new(key: &str, supported_globals: Vec<String>, globals: GlobalState) -> Self {
        Self {
            key: key.to_string(),
            supported_globals,
            auto_apply: false,
            globals,
            codec: Box::new(NativeCodec),
        }
    }

    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn GlobalValueCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn supported_globals(&self) -> &[String] {
        &self.supported_globals
    }
}

impl ConfigProvider for GlobalsProvider {
    fn key(&self) -> &str {
        &self.key
    }

    fn serialize(&self, _additional_data: Option<&Value>) -> Result<String, ProviderError> {
        let mut payload = Map::new();
        for name in &self.supported_globals {
            let current = self.globals.get(name).unwrap_or(Value::Null);
            payload.insert(name.clone(), self.codec.encode(name, &current)?);
        }
        Ok(serde_json::to_string(&Value::Object(payload))?)
    }

    fn apply(&self, serialized: &str) -> bool {
        let parsed: Map<String, Value> = match serde_json::from_str(serialized) {
            Ok(map) => map,
            Err(e) => {
                tracing::debug!(config_key = %self.key, error = %e, "全局变量载荷解析失败");
                return false;
            }
        };

        for (name, value) in parsed {
            let decoded = self.codec.decode(&name, value);
            self.globals.set(&name, decoded);
        }
        true
    }

    fn should_auto_apply(&self) -> bool {
        self.auto_apply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(globals: &GlobalState) -> GlobalsProvider {
        GlobalsProvider::new(
            "skin",
            vec!["wgDefaultSkin".to_string(), "wgSkipSkins".to_string()],
            globals.clone(),
        )
    }

    #[test]
    fn test_serialize_supported_globals_only() {
        let globals = GlobalState::new();
        globals.set("wgDefaultSkin", json!("vector"));
        globals.set("wgSkipSkins", json!(["monobook"]));
        globals.set("wgSitename", json!("Wiki"));

        let raw = provider(&globals).serialize(None).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            parsed,
            json!({"wgDefaultSkin": "vector", "wgSkipSkins": ["monobook"]})
        );
    }

    #[test]
    fn test_serialize_missing_global_as_null() {
        let globals = GlobalState::new();
        let raw = provider(&globals).serialize(None).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!({"wgDefaultSkin": null, "wgSkipSkins": null}));
    }

    #[test]
    fn test_native_codec_rejects_scalars() {
        let globals = GlobalState::new();
        globals.set("wgDefaultSkin", json!(42));

        let err = provider(&globals).serialize(None).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedValue { ref name } if name == "wgDefaultSkin"));
    }

    #[test]
    fn test_apply_writes_back_into_globals() {
        let source = GlobalState::new();
        source.set("wgDefaultSkin", json!("timeless"));
        let raw = provider(&source).serialize(None).unwrap();

        let target = GlobalState::new();
        assert!(provider(&target).apply(&raw));
        assert_eq!(target.get("wgDefaultSkin"), Some(json!("timeless")));
        assert_eq!(target.get("wgSkipSkins"), Some(Value::Null));
    }

    #[test]
    fn test_apply_rejects_bad_payload() {
        let globals = GlobalState::new();
        let p = provider(&globals);
        assert!(!p.apply("not json"));
        assert!(!p.apply("[1, 2]"));
        assert!(globals.snapshot().is_empty());
    }

    struct NumberCodec;

    impl GlobalValueCodec for NumberCodec {
        fn encode(&self, _name: &str, value: &Value) -> Result<Value, ProviderError> {
            Ok(Value::String(value.to_string()))
        }

        fn decode(&self, _name: &str, value: Value) -> Value {
            value
                .as_str()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or(Value::Null)
        }
    }

    #[test]
    fn test_custom_codec_round_trip() {
        let source = GlobalState::new();
        source.set("wgMaxUploadSize", json!(1024));
        let p = GlobalsProvider::new("upload", vec!["wgMaxUploadSize".to_string()], source)
            .with_codec(Box::new(NumberCodec));
        let raw = p.serialize(None).unwrap();

        let target = GlobalState::new();
        let q = GlobalsProvider::new("upload", vec!["wgMaxUploadSize".to_string()], target.clone())
            .with_codec(Box::new(NumberCodec));
        assert!(q.apply(&raw));
        assert_eq!(target.get("wgMaxUploadSize"), Some(json!(1024)));
    }
}

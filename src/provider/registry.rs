// ==========================================
// 动态配置 - 提供者注册
// ==========================================
// 输入: 宿主提供的 { key: spec } 声明
// 流程: 解析声明 → 工厂创建提供者 → 扩展钩子追加/修改 → 一致性校验
// 失败: 任一环节出错均记录 error 日志并中止启动
// ==========================================

use crate::error::RegistrationError;
use crate::provider::globals::{GlobalState, GlobalsProvider};
use crate::provider::ConfigProvider;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// 内置工厂名: 全局变量型提供者
pub const GLOBALS_FACTORY: &str = "globals";

/// 提供者工厂
///
/// 参数: (spec 中声明的 key, spec 对象, 宿主全局状态)
pub type ProviderFactory = Box<
    dyn Fn(&str, &Map<String, Value>, &GlobalState) -> Result<Arc<dyn ConfigProvider>, String>
        + Send
        + Sync,
>;

/// 扩展钩子：在管理器冻结注册表之前追加或修改提供者列表
pub trait RegisterConfigsHook {
    fn on_register_configs(&self, configs: &mut Vec<Arc<dyn ConfigProvider>>);
}

// ==========================================
// ProviderSpecs - 提供者声明
// ==========================================

/// 有序的提供者声明集合（保持声明顺序）
///
/// 重复的 key 原样保留，由管理器按 `DuplicateKeyPolicy` 统一处理。
#[derive(Debug, Clone, Default)]
pub struct ProviderSpecs {
    entries: Vec<(String, Value)>,
}

impl ProviderSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 文档解析（逐条读取，不经过 Map 去重）
    pub fn from_json_str(raw: &str) -> Result<Self, RegistrationError> {
        let specs: ProviderSpecs = serde_json::from_str(raw).map_err(|e| {
            tracing::error!(error = %e, "Invalid spec for dynamic config");
            RegistrationError::InvalidSpec {
                key: String::new(),
                reason: e.to_string(),
            }
        })?;

        for key in specs.duplicate_keys() {
            tracing::warn!(config_key = %key, "提供者声明中出现重复的 key");
        }
        Ok(specs)
    }

    pub fn from_value(value: Value) -> Result<Self, RegistrationError> {
        match value {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().collect(),
            }),
            other => {
                tracing::error!(spec = %other, "Invalid spec for dynamic config");
                Err(RegistrationError::InvalidSpec {
                    key: String::new(),
                    reason: "provider specs must be a JSON object".to_string(),
                })
            }
        }
    }

    pub fn push(&mut self, key: &str, spec: Value) {
        self.entries.push((key.to_string(), spec));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按声明顺序返回的 key（含重复）
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// 出现多次的 key（按首次重复出现的顺序，不重复列出）
    pub fn duplicate_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for key in self.keys() {
            if !seen.insert(key) && !duplicates.iter().any(|d| d == key) {
                duplicates.push(key.to_string());
            }
        }
        duplicates
    }
}

impl<'de> Deserialize<'de> for ProviderSpecs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SpecsVisitor;

        impl<'de> Visitor<'de> for SpecsVisitor {
            type Value = ProviderSpecs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object of provider specs")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, spec)) = access.next_entry::<String, Value>()? {
                    entries.push((key, spec));
                }
                Ok(ProviderSpecs { entries })
            }
        }

        deserializer.deserialize_map(SpecsVisitor)
    }
}

// ==========================================
// ProviderFactoryRegistry - 工厂注册表
// ==========================================

pub struct ProviderFactoryRegistry {
    factories: HashMap<String, ProviderFactory>,
    globals: GlobalState,
}

impl ProviderFactoryRegistry {
    /// 创建注册表，内置 `globals` 工厂
    ///
    /// `globals` 工厂读取:
    /// - globals: [全局变量名]
    /// - auto_apply: bool（可选，默认 false）
    pub fn new(globals: GlobalState) -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            globals,
        };
        registry.register(GLOBALS_FACTORY, Box::new(globals_factory));
        registry
    }

    pub fn register(&mut self, name: &str, factory: ProviderFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn globals(&self) -> &GlobalState {
        &self.globals
    }

    fn create(&self, key: &str, spec: &Map<String, Value>) -> Result<Arc<dyn ConfigProvider>, RegistrationError> {
        let factory_name = spec
            .get("factory")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistrationError::InvalidSpec {
                key: key.to_string(),
                reason: "missing string field `factory`".to_string(),
            })?;

        let factory = self
            .factories
            .get(factory_name)
            .ok_or_else(|| RegistrationError::InvalidObject {
                key: key.to_string(),
                reason: format!("unknown factory `{}`", factory_name),
            })?;

        factory(key, spec, &self.globals).map_err(|reason| RegistrationError::InvalidObject {
            key: key.to_string(),
            reason,
        })
    }
}

fn globals_factory(
    key: &str,
    spec: &Map<String, Value>,
    globals: &GlobalState,
) -> Result<Arc<dyn ConfigProvider>, String> {
    let names = spec
        .get("globals")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing array field `globals`".to_string())?;

    let mut supported = Vec::with_capacity(names.len());
    for name in names {
        match name.as_str() {
            Some(s) if !s.trim().is_empty() => supported.push(s.to_string()),
            _ => return Err(format!("invalid global name: {}", name)),
        }
    }

    let auto_apply = spec
        .get("auto_apply")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(Arc::new(
        GlobalsProvider::new(key, supported, globals.clone()).with_auto_apply(auto_apply),
    ))
}

// ==========================================
// build_providers - 解析声明并运行扩展钩子
// ==========================================

/// 根据声明构建提供者列表
///
/// # 错误
/// - InvalidKey: key 为空
/// - InvalidSpec: spec 不是 JSON 对象或缺少 factory
/// - InvalidObject: 工厂不存在/创建失败/提供者 key 与声明不一致
pub fn build_providers(
    specs: &ProviderSpecs,
    factories: &ProviderFactoryRegistry,
    hooks: &[&dyn RegisterConfigsHook],
) -> Result<Vec<Arc<dyn ConfigProvider>>, RegistrationError> {
    let mut providers: Vec<Arc<dyn ConfigProvider>> = Vec::with_capacity(specs.len());

    for (key, spec) in &specs.entries {
        if key.trim().is_empty() {
            tracing::error!(key = %key, "Invalid key for dynamic config");
            return Err(RegistrationError::InvalidKey { key: key.clone() });
        }

        let spec_map = match spec {
            Value::Object(map) => map,
            other => {
                tracing::error!(key = %key, spec = %other, "Invalid spec for dynamic config");
                return Err(RegistrationError::InvalidSpec {
                    key: key.clone(),
                    reason: "spec must be a JSON object".to_string(),
                });
            }
        };

        let provider = factories.create(key, spec_map).map_err(|e| {
            tracing::error!(key = %key, error = %e, "Invalid object for dynamic config");
            e
        })?;

        if provider.key() != key {
            tracing::error!(
                key = %key,
                provider_key = provider.key(),
                "Invalid object for dynamic config"
            );
            return Err(RegistrationError::InvalidObject {
                key: key.clone(),
                reason: format!("provider reports key `{}`", provider.key()),
            });
        }

        providers.push(provider);
    }

    for hook in hooks {
        hook.on_register_configs(&mut providers);
    }

    // 钩子可能追加任意提供者，冻结前再校验一次
    for provider in &providers {
        if provider.key().trim().is_empty() {
            tracing::error!("Invalid object for dynamic config: provider with blank key");
            return Err(RegistrationError::InvalidKey {
                key: provider.key().to_string(),
            });
        }
    }

    Ok(providers)
}

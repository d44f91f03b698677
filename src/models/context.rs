//! 执行上下文
//!
//! 每次运行新建，只由富化步骤写入，由模板替换读取。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 上下文中的值（字符串或数字）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Number(f64),
    Text(String),
}

impl ContextValue {
    /// 作为选项文本比较时使用的字符串形式
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Text(s) => f.write_str(s),
            ContextValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            ContextValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Text(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Text(s)
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Number(n)
    }
}

/// 变量替换用的键值表
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionContext {
    values: BTreeMap<String, ContextValue>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/*
 * Patchbay - Audio Signal Routing Simulator
 * Copyright (c) 2025 MACHIKO LAB
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// パラメーターエラー型
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter '{name}' is required")]
    NotFound { name: String },

    #[error("parameter '{name}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("parameter '{name}' has invalid type: expected {expected}, found {found}")]
    InvalidType {
        name: String,
        expected: &'static str,
        found: String,
    },
}

/// パラメーター記述子トレイト
pub trait ParameterDescriptor {
    fn name(&self) -> &'static str;
    fn min_value(&self) -> f32;
    fn max_value(&self) -> f32;
    fn default_value(&self) -> f32;

    /// 単位（Hz, dB, ms など）
    fn unit(&self) -> &'static str {
        ""
    }

    /// 値の検証
    fn validate(&self, value: f32) -> Result<f32, ParameterError> {
        if value < self.min_value() || value > self.max_value() {
            Err(ParameterError::OutOfRange {
                name: self.name().to_string(),
                value,
                min: self.min_value(),
                max: self.max_value(),
            })
        } else {
            Ok(value)
        }
    }

    /// 表示用の値フォーマット
    fn format_value(&self, value: f32) -> String {
        if self.unit().is_empty() {
            format!("{:.2}", value)
        } else {
            format!("{:.2} {}", value, self.unit())
        }
    }
}

/// 基本的なパラメーター記述子の実装
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicParameter {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub unit: &'static str,
}

impl BasicParameter {
    pub const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self {
            name,
            min,
            max,
            default,
            unit: "",
        }
    }

    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Read this parameter from `params`, falling back to the default, and
    /// reject values outside `[min, max]`.
    pub fn read(&self, params: &NodeParams) -> Result<f32, ParameterError> {
        let value = params.f32_or(self.name, self.default)?;
        self.validate(value)
    }

    /// Like [`read`](Self::read) but clamps into range instead of failing.
    pub fn read_clamped(&self, params: &NodeParams) -> Result<f32, ParameterError> {
        let value = params.f32_or(self.name, self.default)?;
        Ok(value.clamp(self.min, self.max))
    }
}

impl ParameterDescriptor for BasicParameter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn min_value(&self) -> f32 {
        self.min
    }

    fn max_value(&self) -> f32 {
        self.max
    }

    fn default_value(&self) -> f32 {
        self.default
    }

    fn unit(&self) -> &'static str {
        self.unit
    }
}

/// Per-node configuration mapping, already parsed from the routing file.
///
/// Values keep their loose JSON typing; the typed getters coerce numeric
/// strings and report anything else as [`ParameterError::InvalidType`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeParams(Map<String, Value>);

impl NodeParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Copy of the mapping with `key` removed.
    pub fn without(&self, key: &str) -> Self {
        let mut map = self.0.clone();
        map.remove(key);
        Self(map)
    }

    /// Finite float, or `default` when absent.
    pub fn f32_or(&self, key: &str, default: f32) -> Result<f32, ParameterError> {
        let value = match self.get(key) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };

        match value {
            Some(v) if v.is_finite() => Ok(v as f32),
            _ => Err(self.invalid(key, "finite number")),
        }
    }

    /// Non-negative integer, or `default` when absent.
    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, ParameterError> {
        let value = match self.get(key) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };

        value
            .map(|v| v as usize)
            .ok_or_else(|| self.invalid(key, "non-negative integer"))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ParameterError> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(self.invalid(key, "boolean")),
            },
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(self.invalid(key, "boolean")),
            },
            Some(_) => Err(self.invalid(key, "boolean")),
        }
    }

    /// String value. Numbers are rendered so that `device: 2` and `device: "2"` agree.
    pub fn text(&self, key: &str) -> Result<Option<String>, ParameterError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(self.invalid(key, "string")),
        }
    }

    pub fn required_text(&self, key: &str) -> Result<String, ParameterError> {
        self.text(key)?.ok_or_else(|| ParameterError::NotFound {
            name: key.to_string(),
        })
    }

    /// Nested mapping, e.g. the legacy `plugin: {module, class}` reference.
    pub fn object(&self, key: &str) -> Result<Option<NodeParams>, ParameterError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(NodeParams(map.clone()))),
            Some(_) => Err(self.invalid(key, "mapping")),
        }
    }

    fn invalid(&self, key: &str, expected: &'static str) -> ParameterError {
        let found = match self.0.get(key) {
            Some(Value::Null) | None => "null".to_string(),
            Some(Value::Bool(b)) => format!("boolean {}", b),
            Some(Value::Number(n)) => format!("number {}", n),
            Some(Value::String(s)) => format!("string {:?}", s),
            Some(Value::Array(_)) => "sequence".to_string(),
            Some(Value::Object(_)) => "mapping".to_string(),
        };
        ParameterError::InvalidType {
            name: key.to_string(),
            expected,
            found,
        }
    }
}

impl From<Map<String, Value>> for NodeParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// dB値をリニアゲインに変換: `10^(dB/20)`
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

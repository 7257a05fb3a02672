use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;

const SETTINGS_KEY: &str = "engine.config";

/// What to do with a student who has no recorded sessions yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroSessionPolicy {
    /// Not yet assessable; grade entry is refused until a session exists.
    Block,
    /// Ratio counts as 1.0 and the student passes the attendance gate.
    Allow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub attendance_threshold: f64,
    pub lock_floor_score: f64,
    pub zero_session_policy: ZeroSessionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            attendance_threshold: 0.75,
            lock_floor_score: 60.0,
            zero_session_policy: ZeroSessionPolicy::Block,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), String> {
        let t = self.attendance_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(format!("attendanceThreshold must be in (0, 1], got {}", t));
        }
        if !crate::grade_scale::is_valid_score(self.lock_floor_score) {
            return Err(format!(
                "lockFloorScore must be in [0, 100], got {}",
                self.lock_floor_score
            ));
        }
        Ok(())
    }

    /// Applies the keys present in `patch` on top of `self`.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<EngineConfig, String> {
        let Some(patch_obj) = patch.as_object() else {
            return Err("config patch must be an object".to_string());
        };
        let mut base = serde_json::to_value(self).map_err(|e| e.to_string())?;
        if let Some(base_obj) = base.as_object_mut() {
            for (k, v) in patch_obj {
                if !base_obj.contains_key(k) {
                    return Err(format!("unknown config key: {}", k));
                }
                base_obj.insert(k.clone(), v.clone());
            }
        }
        let next: EngineConfig = serde_json::from_value(base).map_err(|e| e.to_string())?;
        next.validate()?;
        Ok(next)
    }
}

pub fn load(conn: &Connection) -> anyhow::Result<EngineConfig> {
    let Some(raw) = db::settings_get_json(conn, SETTINGS_KEY)? else {
        return Ok(EngineConfig::default());
    };
    let cfg: EngineConfig = serde_json::from_value(raw)?;
    cfg.validate().map_err(anyhow::Error::msg)?;
    Ok(cfg)
}

pub fn save(conn: &Connection, cfg: &EngineConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, SETTINGS_KEY, &serde_json::to_value(cfg)?)
}

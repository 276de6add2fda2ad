//! Capture and restore of variable values as nested JSON objects.
//!
//! Devices map to nested objects keyed by child name and variables map to their values.
//! Commands are not captured; on restore a command whose name appears is called with the
//! stored value as argument.

use crate::{
    error::{RegError, RegResult},
    node::{Node, NodeKind},
    value::{ModeFilter, Value},
};
use serde_json::{Map, Value as Json};

impl Node {
    /// Cached values of the variables below a device whose mode is in `modes`.
    pub fn snapshot(&self, modes: ModeFilter) -> RegResult<Json> {
        self.device_or_err()?;
        let mut map = Map::new();
        for child in self.nodes() {
            match child.kind() {
                NodeKind::Device(_) => {
                    map.insert(child.name().into(), child.snapshot(modes)?);
                }
                NodeKind::Variable(var) => {
                    if !modes.matches(var.mode()) {
                        continue;
                    }
                    if var.is_remote() && var.block().is_none() {
                        continue;
                    }
                    map.insert(child.name().into(), child.value()?.to_json());
                }
                NodeKind::Command(_) => {}
            }
        }
        Ok(Json::Object(map))
    }

    /// Apply a snapshot. Variables are written one by one with `write_each`; otherwise their
    /// blocks are only marked stale. Unknown keys are skipped.
    pub fn restore(&self, snapshot: &Json, write_each: bool, modes: ModeFilter) -> RegResult<()> {
        self.device_or_err()?;
        let map = snapshot.as_object().ok_or_else(|| RegError::InvalidValue {
            path: self.path(),
            value: snapshot.to_string(),
        })?;
        for (key, json) in map {
            let Ok(child) = self.node(key) else {
                log::warn!("Skipping unknown entry '{}' in '{}'", key, self.path());
                continue;
            };
            match child.kind() {
                NodeKind::Device(_) if json.is_object() => {
                    child.restore(json, write_each, modes)?;
                }
                NodeKind::Device(_) => {}
                NodeKind::Command(_) => child.call(Value::from_json(json))?,
                NodeKind::Variable(var) => {
                    if !modes.matches(var.mode()) {
                        continue;
                    }
                    let value = Value::from_json(json).ok_or_else(|| RegError::InvalidValue {
                        path: child.path(),
                        value: json.to_string(),
                    })?;
                    child.set(value, write_each)?;
                }
            }
        }
        Ok(())
    }
}

use crate::core::config::settings::{UserSettings, SETTING_KEYS};
use serde_json::Value;

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "(unset)".to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

impl UserSettings {
    pub fn display_lines(&self) -> Vec<String> {
        let record = serde_json::to_value(self).unwrap_or(Value::Null);
        SETTING_KEYS
            .iter()
            .map(|key| {
                let value = record.get(*key).unwrap_or(&Value::Null);
                format!("  {key}: {}", display_value(value))
            })
            .collect()
    }

    pub fn print_all(&self) {
        println!("Current settings:");
        for line in self.display_lines() {
            println!("{line}");
        }
    }
}

pub fn format_setting_value(value: &Value) -> String {
    display_value(value)
}

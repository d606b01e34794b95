use std::time::Duration;

use v_utils::macros::{MyConfigPrimitives, Settings};

#[derive(Clone, Debug, MyConfigPrimitives, PartialEq, Settings)]
pub struct AppConfig {
	/// Pause after each answered question, letting the page reveal the next one; 0 disables it (default: 1500)
	#[serde(default = "default_settle_delay_ms")]
	pub settle_delay_ms: u64,
	/// Click the quiz's submit button once every question has been handled (default: true)
	#[serde(default = "default_true")]
	pub submit_after_solve: bool,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Reported viewport of pages loaded from a file (default: 1280)
	#[serde(default = "default_viewport_width")]
	pub viewport_width: u32,
	/// (default: 720)
	#[serde(default = "default_viewport_height")]
	pub viewport_height: u32,
	/// Save every capture taken while solving under the state dir's `persist_htmls/`, for debugging
	#[serde(default)]
	pub persist_html: bool,
}

fn default_settle_delay_ms() -> u64 {
	1500
}

fn default_true() -> bool {
	true
}

fn default_viewport_width() -> u32 {
	1280
}

fn default_viewport_height() -> u32 {
	720
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			settle_delay_ms: default_settle_delay_ms(),
			submit_after_solve: true,
			visible: false,
			viewport_width: default_viewport_width(),
			viewport_height: default_viewport_height(),
			persist_html: false,
		}
	}
}

impl AppConfig {
	pub fn settle_delay(&self) -> Duration {
		Duration::from_millis(self.settle_delay_ms)
	}
}

#[cfg(test)]
mod tests {
	use v_utils::io::ExpandedPath;

	use super::*;

	fn write_config(name: &str, contents: &str) -> ExpandedPath {
		let dir = std::env::temp_dir().join(format!("page_pilot_config_{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let path = dir.join(name);
		std::fs::write(&path, contents).unwrap();
		ExpandedPath(path)
	}

	#[test]
	fn missing_fields_take_defaults() {
		let config: AppConfig = serde_json::from_str(r#"{"settle_delay_ms": 0}"#).unwrap();
		assert_eq!(config.settle_delay(), Duration::ZERO);
		assert!(config.submit_after_solve);
		assert_eq!((config.viewport_width, config.viewport_height), (1280, 720));
		assert_eq!(serde_json::from_str::<AppConfig>("{}").unwrap(), AppConfig::default());
	}

	#[test]
	fn flags_override_the_file() {
		let path = write_config("override.json", r#"{"settle_delay_ms": 200, "submit_after_solve": false}"#);
		let flags = SettingsFlags {
			config: Some(path),
			settle_delay_ms: Some("0".to_string()),
			visible: Some(true),
			..Default::default()
		};
		let config = AppConfig::try_build(flags).unwrap();
		assert_eq!(config.settle_delay(), Duration::ZERO);
		assert!(!config.submit_after_solve);
		assert!(config.visible);
		assert_eq!(config.viewport_width, 1280);
	}

	#[test]
	fn missing_explicit_file_is_an_error() {
		let flags = SettingsFlags {
			config: Some(ExpandedPath("/nonexistent/page_pilot.json".into())),
			..Default::default()
		};
		assert!(AppConfig::try_build(flags).is_err());
	}
}

//! Configuration for the Auto-DJ
//!
//! - [`AutoDjSettings`]: the user-facing preference record shared with the
//!   settings store (enabled, harmonic preference, strict BPM, energy style,
//!   recency window, score weights)
//! - [`AutoDjConfig`]: the full file-level configuration, adding engine,
//!   deck, crossfader, transition and monitor tuning
//! - Generic YAML load/save helpers and default paths

mod autodj;
mod io;
mod paths;
mod settings;

pub use autodj::*;
pub use io::{load_config, read_yaml, save_config};
pub use paths::{default_config_dir, default_config_path, default_settings_path};
pub use settings::*;
